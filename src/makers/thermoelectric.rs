// src/makers/thermoelectric.rs

//! Thermoelectric figure-of-merit (ZT) workflows.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::json;
use tracing::debug;

use crate::dag::{Flow, Input, Job, Node};
use crate::errors::{FlowdagError, Result};
use crate::makers::calc::{BandsMaker, PhononMaker, ScfMaker, TransportMaker, settings_from};
use crate::makers::screening::{NodeBuilder, ScreeningMaker};
use crate::makers::{CalculationKind, MakeContext, MakeInput, Maker};

/// SCF, bands, phonons, transport, then ZT = S²σT/κ.
///
/// Output: `structure`, `scf_results`, `band_structure`,
/// `phonon_properties`, `transport_properties`, `zt_results`, `max_zt`,
/// `optimal_temperature`.
#[derive(Debug, Clone, PartialEq)]
pub struct ZtMaker {
    pub name: String,
    pub scf: ScfMaker,
    pub bands: BandsMaker,
    pub phonon: PhononMaker,
    pub transport: TransportMaker,
}

impl Default for ZtMaker {
    fn default() -> Self {
        Self {
            name: "thermoelectric ZT calculation".to_string(),
            scf: ScfMaker::default(),
            bands: BandsMaker::default(),
            phonon: PhononMaker::default(),
            transport: TransportMaker::default(),
        }
    }
}

impl ZtMaker {
    /// Cheap pre-screening variant: coarser k-grid, lower cutoff, looser
    /// convergence and a unit supercell.
    pub fn coarse(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            scf: ScfMaker::default().with_settings(settings_from(json!({
                "kpts": [4, 4, 4],
                "ecutwfc": 30.0,
                "conv_thr": 1e-6,
            }))),
            phonon: PhononMaker::default().with_settings(settings_from(json!({
                "supercell_matrix": [[1, 0, 0], [0, 1, 0], [0, 0, 1]],
            }))),
            ..Self::default()
        }
    }

    pub fn make_flow(&self, input: &MakeInput, ctx: &MakeContext) -> Result<Flow> {
        let mut scf = self.scf.make_job(input, ctx)?;
        scf.set_name("scf calculation");

        let from_scf =
            MakeInput::new(input.structure.clone()).with_prev_dir(scf.output_at("dir_name"));

        let mut bands = self.bands.make_job(&from_scf, ctx)?;
        bands.set_name("bands calculation");

        let mut phonon = self.phonon.make_job(&from_scf, ctx)?;
        phonon.set_name("phonon calculation");

        let band_data: BTreeMap<String, Input> =
            BTreeMap::from([("bands".to_string(), Input::Ref(bands.output()))]);
        let transport_input = MakeInput::new(input.structure.clone())
            .with_extra("band_structure_data", Input::Map(band_data));
        let mut transport = self.transport.make_job(&transport_input, ctx)?;
        transport.set_name("transport properties");

        let zt = Job::new("ZT calculation", ctx.calculators.get(CalculationKind::FigureOfMerit)?)
            .with_input("transport_props", transport.output())
            .with_input("phonon_props", phonon.output());

        debug!(run_id = %ctx.run_id, flow = %self.name, "built ZT flow");

        Ok(Flow::new(&self.name)
            .with_output("structure", input.structure.clone())
            .with_output("scf_results", scf.output())
            .with_output("band_structure", bands.output())
            .with_output("phonon_properties", phonon.output())
            .with_output("transport_properties", transport.output())
            .with_output("zt_results", zt.output())
            .with_output("max_zt", zt.output_at("max_zt"))
            .with_output("optimal_temperature", zt.output_at("optimal_temperature"))
            .with_nodes([scf, bands, phonon, transport, zt]))
    }
}

impl Maker for ZtMaker {
    fn name(&self) -> &str {
        &self.name
    }

    fn make(&self, input: &MakeInput, ctx: &MakeContext) -> Result<Node> {
        Ok(self.make_flow(input, ctx)?.into())
    }
}

/// Coarse ZT for every candidate structure, then full ZT flows only for
/// candidates whose coarse `max_zt` exceeds the threshold.
///
/// Input: a list of structures. Output: the screening summary and the full
/// results keyed by candidate label.
#[derive(Debug, Clone, PartialEq)]
pub struct HighThroughputZtMaker {
    pub name: String,
    pub screening_threshold: f64,
    pub zt: ZtMaker,
}

impl Default for HighThroughputZtMaker {
    fn default() -> Self {
        Self {
            name: "high-throughput ZT screening".to_string(),
            screening_threshold: 0.5,
            zt: ZtMaker::default(),
        }
    }
}

impl HighThroughputZtMaker {
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.screening_threshold = threshold;
        self
    }

    pub fn make_flow(&self, structures: Vec<Input>, ctx: &MakeContext) -> Result<Flow> {
        if structures.is_empty() {
            return Err(FlowdagError::config(format!(
                "maker '{}' needs at least one structure",
                self.name
            )));
        }

        let scorer: NodeBuilder = {
            let ctx = ctx.clone();
            Arc::new(move |index: usize, structure: Input| -> Result<Node> {
                let mut flow = ZtMaker::coarse(format!("coarse_zt_{index}"))
                    .make_flow(&MakeInput::new(structure), &ctx)?;
                flow.set_name(format!("screening_{index}"));
                Ok(flow.into())
            })
        };

        let expander: NodeBuilder = {
            let ctx = ctx.clone();
            let zt = self.zt.clone();
            Arc::new(move |index: usize, structure: Input| -> Result<Node> {
                let mut flow = zt.make_flow(&MakeInput::new(structure), &ctx)?;
                flow.set_name(format!("full_zt_{index}"));
                Ok(flow.into())
            })
        };

        ScreeningMaker::new(&self.name, self.screening_threshold, scorer, expander)
            .with_score_path("max_zt")
            .make_flow(structures)
    }
}

impl Maker for HighThroughputZtMaker {
    fn name(&self) -> &str {
        &self.name
    }

    fn make(&self, input: &MakeInput, ctx: &MakeContext) -> Result<Node> {
        Ok(self.make_flow(input.candidates()?, ctx)?.into())
    }
}
