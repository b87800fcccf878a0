// src/makers/flows.rs

//! Band-gap workflows composed from the single-job makers.

use crate::dag::{Flow, Node};
use crate::errors::Result;
use crate::makers::calc::{BandsMaker, RelaxMaker, ScfMaker};
use crate::makers::{MakeContext, MakeInput, Maker};

/// SCF followed by a bands calculation seeded from the SCF directory.
///
/// Output: `scf`, `bands`, `band_gap`, `structure`.
#[derive(Debug, Clone, PartialEq)]
pub struct BandGapMaker {
    pub name: String,
    pub scf: ScfMaker,
    pub bands: BandsMaker,
}

impl Default for BandGapMaker {
    fn default() -> Self {
        Self {
            name: "band gap".to_string(),
            scf: ScfMaker::default(),
            bands: BandsMaker::default(),
        }
    }
}

impl BandGapMaker {
    pub fn make_flow(&self, input: &MakeInput, ctx: &MakeContext) -> Result<Flow> {
        let mut scf = self.scf.make_job(input, ctx)?;
        scf.set_name("scf calculation");

        let bands_input =
            MakeInput::new(scf.output_at("structure")).with_prev_dir(scf.output_at("dir_name"));
        let mut bands = self.bands.make_job(&bands_input, ctx)?;
        bands.set_name("bands calculation");

        let flow = Flow::new(&self.name)
            .with_output("scf", scf.output())
            .with_output("bands", bands.output())
            .with_output("band_gap", bands.output_at("band_gap"))
            .with_output("structure", bands.output_at("structure"))
            .with_node(scf)
            .with_node(bands);
        Ok(flow)
    }
}

impl Maker for BandGapMaker {
    fn name(&self) -> &str {
        &self.name
    }

    fn make(&self, input: &MakeInput, ctx: &MakeContext) -> Result<Node> {
        Ok(self.make_flow(input, ctx)?.into())
    }
}

/// Optional relaxation, then a band-gap flow on the relaxed structure.
///
/// Output: the band-gap flow's output.
#[derive(Debug, Clone, PartialEq)]
pub struct RelaxBandGapMaker {
    pub name: String,
    pub relax: Option<RelaxMaker>,
    pub band_gap: BandGapMaker,
}

impl Default for RelaxBandGapMaker {
    fn default() -> Self {
        Self {
            name: "relax and band gap".to_string(),
            relax: None,
            band_gap: BandGapMaker::default(),
        }
    }
}

impl RelaxBandGapMaker {
    pub fn with_relax(mut self, relax: RelaxMaker) -> Self {
        self.relax = Some(relax);
        self
    }

    pub fn make_flow(&self, input: &MakeInput, ctx: &MakeContext) -> Result<Flow> {
        let mut flow = Flow::new(&self.name);

        let band_gap_input = match &self.relax {
            Some(relax) => {
                let mut job = relax.make_job(input, ctx)?;
                job.set_name("structure relaxation");
                let next = MakeInput::new(job.output_at("structure"))
                    .with_prev_dir(job.output_at("dir_name"));
                flow.push(job);
                next
            }
            None => input.clone(),
        };

        let band_gap = self.band_gap.make_flow(&band_gap_input, ctx)?;
        let output = band_gap.output().clone();
        flow.push(band_gap);
        Ok(flow.with_output_map(output))
    }
}

impl Maker for RelaxBandGapMaker {
    fn name(&self) -> &str {
        &self.name
    }

    fn make(&self, input: &MakeInput, ctx: &MakeContext) -> Result<Node> {
        Ok(self.make_flow(input, ctx)?.into())
    }
}
