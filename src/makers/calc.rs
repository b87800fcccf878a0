// src/makers/calc.rs

//! Single-job makers over external calculators.
//!
//! Each job receives `structure`, `calculation`, `settings` and, when
//! given, `prev_dir`. Calculators are expected to return an object with at
//! least `structure` and `dir_name`; band calculations add `band_gap`.

use serde_json::{Map, Value, json};
use tracing::debug;

use crate::dag::{Job, Node};
use crate::errors::{FlowdagError, Result};
use crate::makers::{CalculationKind, MakeContext, MakeInput, Maker};

/// Free-form calculator settings.
pub type Settings = Map<String, Value>;

/// Settings from a JSON object literal; anything else yields no settings.
pub(crate) fn settings_from(value: Value) -> Settings {
    match value {
        Value::Object(map) => map,
        _ => Settings::new(),
    }
}

fn calc_job(
    name: &str,
    kind: CalculationKind,
    calculation: &str,
    settings: Settings,
    input: &MakeInput,
    ctx: &MakeContext,
) -> Result<Job> {
    let callable = ctx.calculators.get(kind)?;
    debug!(run_id = %ctx.run_id, job = name, %kind, "building calculation job");

    let mut job = Job::new(name, callable)
        .with_input("structure", input.structure.clone())
        .with_input("calculation", calculation)
        .with_input("settings", Value::Object(settings));
    if let Some(prev_dir) = &input.prev_dir {
        job = job.with_input("prev_dir", prev_dir.clone());
    }
    Ok(job)
}

/// Ground-state self-consistent field calculation.
#[derive(Debug, Clone, PartialEq)]
pub struct ScfMaker {
    pub name: String,
    pub settings: Settings,
}

impl Default for ScfMaker {
    fn default() -> Self {
        Self {
            name: "scf".to_string(),
            settings: settings_from(json!({
                "pseudopotentials": { "Si": "Si.pbe-n-rrkjus_psl.1.0.0.UPF" },
                "kpts": [8, 8, 8],
                "ecutwfc": 50.0,
                "conv_thr": 1e-8,
                "mixing_beta": 0.7,
                "occupations": "fixed",
            })),
        }
    }
}

impl ScfMaker {
    /// Replace the settings wholesale.
    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    pub fn make_job(&self, input: &MakeInput, ctx: &MakeContext) -> Result<Job> {
        calc_job(
            &self.name,
            CalculationKind::Espresso,
            "scf",
            self.settings.clone(),
            input,
            ctx,
        )
    }
}

impl Maker for ScfMaker {
    fn name(&self) -> &str {
        &self.name
    }

    fn make(&self, input: &MakeInput, ctx: &MakeContext) -> Result<Node> {
        Ok(self.make_job(input, ctx)?.into())
    }
}

/// Non-self-consistent band structure calculation on a denser k-grid.
#[derive(Debug, Clone, PartialEq)]
pub struct BandsMaker {
    pub name: String,
    pub settings: Settings,
}

impl Default for BandsMaker {
    fn default() -> Self {
        Self {
            name: "bands".to_string(),
            settings: settings_from(json!({
                "kpts": [12, 12, 12],
                "nbnd": 20,
            })),
        }
    }
}

impl BandsMaker {
    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    /// Build the bands job. A `calculation` setting other than `bands`
    /// contradicts what this maker does and is rejected.
    pub fn make_job(&self, input: &MakeInput, ctx: &MakeContext) -> Result<Job> {
        let mut settings = self.settings.clone();
        match settings.get("calculation") {
            None => {}
            Some(Value::String(s)) if s == "bands" => {}
            Some(other) => {
                return Err(FlowdagError::config(format!(
                    "maker '{}' runs a bands calculation but settings ask for calculation = {}",
                    self.name, other
                )));
            }
        }
        settings.insert("calculation".to_string(), json!("bands"));

        calc_job(
            &self.name,
            CalculationKind::Espresso,
            "bands",
            settings,
            input,
            ctx,
        )
    }
}

impl Maker for BandsMaker {
    fn name(&self) -> &str {
        &self.name
    }

    fn make(&self, input: &MakeInput, ctx: &MakeContext) -> Result<Node> {
        Ok(self.make_job(input, ctx)?.into())
    }
}

/// Structure relaxation.
#[derive(Debug, Clone, PartialEq)]
pub struct RelaxMaker {
    pub name: String,
    pub settings: Settings,
}

impl Default for RelaxMaker {
    fn default() -> Self {
        Self {
            name: "relax".to_string(),
            settings: Settings::new(),
        }
    }
}

impl RelaxMaker {
    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    pub fn make_job(&self, input: &MakeInput, ctx: &MakeContext) -> Result<Job> {
        calc_job(
            &self.name,
            CalculationKind::Relax,
            "relax",
            self.settings.clone(),
            input,
            ctx,
        )
    }
}

impl Maker for RelaxMaker {
    fn name(&self) -> &str {
        &self.name
    }

    fn make(&self, input: &MakeInput, ctx: &MakeContext) -> Result<Node> {
        Ok(self.make_job(input, ctx)?.into())
    }
}

/// Finite-displacement phonon calculation.
#[derive(Debug, Clone, PartialEq)]
pub struct PhononMaker {
    pub name: String,
    pub settings: Settings,
}

impl Default for PhononMaker {
    fn default() -> Self {
        Self {
            name: "phonon calculation".to_string(),
            settings: settings_from(json!({
                "pseudopotentials": { "Si": "Si.pbe-n-rrkjus_psl.1.0.0.UPF" },
                "kpts": [8, 8, 8],
                "ecutwfc": 50.0,
                "conv_thr": 1e-8,
                "supercell_matrix": [[2, 0, 0], [0, 2, 0], [0, 0, 2]],
                "displacement": 0.01,
            })),
        }
    }
}

impl PhononMaker {
    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    fn check_settings(&self) -> Result<()> {
        if let Some(d) = self.settings.get("displacement") {
            match d.as_f64() {
                Some(d) if d > 0.0 && d.is_finite() => {}
                _ => {
                    return Err(FlowdagError::config(format!(
                        "maker '{}': displacement must be a positive number, got {}",
                        self.name, d
                    )));
                }
            }
        }

        if let Some(m) = self.settings.get("supercell_matrix") {
            let square = m.as_array().is_some_and(|rows| {
                rows.len() == 3
                    && rows
                        .iter()
                        .all(|r| r.as_array().is_some_and(|r| r.len() == 3))
            });
            if !square {
                return Err(FlowdagError::config(format!(
                    "maker '{}': supercell_matrix must be 3x3",
                    self.name
                )));
            }
        }
        Ok(())
    }

    pub fn make_job(&self, input: &MakeInput, ctx: &MakeContext) -> Result<Job> {
        self.check_settings()?;
        calc_job(
            &self.name,
            CalculationKind::Phonon,
            "phonon",
            self.settings.clone(),
            input,
            ctx,
        )
    }
}

impl Maker for PhononMaker {
    fn name(&self) -> &str {
        &self.name
    }

    fn make(&self, input: &MakeInput, ctx: &MakeContext) -> Result<Node> {
        Ok(self.make_job(input, ctx)?.into())
    }
}

/// Electronic transport properties from a band structure.
///
/// Requires the extra input `band_structure_data`.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportMaker {
    pub name: String,
    pub settings: Settings,
}

impl Default for TransportMaker {
    fn default() -> Self {
        Self {
            name: "transport properties".to_string(),
            settings: Settings::new(),
        }
    }
}

impl TransportMaker {
    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    pub fn make_job(&self, input: &MakeInput, ctx: &MakeContext) -> Result<Job> {
        let bands = input.extra.get("band_structure_data").ok_or_else(|| {
            FlowdagError::config(format!(
                "maker '{}' needs a 'band_structure_data' input",
                self.name
            ))
        })?;

        let job = calc_job(
            &self.name,
            CalculationKind::Transport,
            "transport",
            self.settings.clone(),
            input,
            ctx,
        )?;
        Ok(job.with_input("band_structure_data", bands.clone()))
    }
}

impl Maker for TransportMaker {
    fn name(&self) -> &str {
        &self.name
    }

    fn make(&self, input: &MakeInput, ctx: &MakeContext) -> Result<Node> {
        Ok(self.make_job(input, ctx)?.into())
    }
}
