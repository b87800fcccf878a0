// src/makers/mod.rs

//! Makers: pure builders that turn domain inputs into jobs and flows.
//!
//! A maker never executes anything. Calling [`Maker::make`] twice with the
//! same configuration and input yields structurally identical graphs (see
//! [`Flow::fingerprint`](crate::dag::Flow::fingerprint)), with fresh job ids.
//!
//! - [`calc`] holds the single-job makers wrapping external calculators.
//! - [`flows`] composes them into band-gap workflows.
//! - [`thermoelectric`] builds the ZT workflow and its high-throughput variant.
//! - [`screening`] is the generic threshold screening maker.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use crate::dag::{Callable, Input, Node};
use crate::errors::{FlowdagError, Result};
use crate::types::RunId;

pub mod calc;
pub mod flows;
pub mod screening;
pub mod thermoelectric;

pub use calc::{BandsMaker, PhononMaker, RelaxMaker, ScfMaker, Settings, TransportMaker};
pub use flows::{BandGapMaker, RelaxBandGapMaker};
pub use screening::{NodeBuilder, ScreeningMaker};
pub use thermoelectric::{HighThroughputZtMaker, ZtMaker};

/// External calculation routines a maker can wire into jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CalculationKind {
    /// Electronic structure (scf, bands).
    Espresso,
    Relax,
    Phonon,
    Transport,
    FigureOfMerit,
}

impl CalculationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CalculationKind::Espresso => "espresso",
            CalculationKind::Relax => "relax",
            CalculationKind::Phonon => "phonon",
            CalculationKind::Transport => "transport",
            CalculationKind::FigureOfMerit => "figure_of_merit",
        }
    }
}

impl fmt::Display for CalculationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Registry of calculators keyed by kind.
#[derive(Clone, Default)]
pub struct Calculators {
    by_kind: HashMap<CalculationKind, Arc<dyn Callable>>,
}

impl fmt::Debug for Calculators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<_> = self.by_kind.keys().collect();
        kinds.sort();
        f.debug_struct("Calculators").field("kinds", &kinds).finish()
    }
}

impl Calculators {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, kind: CalculationKind, callable: Arc<dyn Callable>) -> Self {
        self.register(kind, callable);
        self
    }

    pub fn register(&mut self, kind: CalculationKind, callable: Arc<dyn Callable>) {
        self.by_kind.insert(kind, callable);
    }

    pub fn contains(&self, kind: CalculationKind) -> bool {
        self.by_kind.contains_key(&kind)
    }

    /// Look up a calculator; a missing one is a configuration error.
    pub fn get(&self, kind: CalculationKind) -> Result<Arc<dyn Callable>> {
        self.by_kind.get(&kind).cloned().ok_or_else(|| {
            FlowdagError::config(format!("no calculator registered for '{kind}'"))
        })
    }
}

/// Context threaded through every `make` call.
#[derive(Debug, Clone, Default)]
pub struct MakeContext {
    pub run_id: RunId,
    pub calculators: Calculators,
}

impl MakeContext {
    pub fn new(calculators: Calculators) -> Self {
        Self {
            run_id: RunId::new(),
            calculators,
        }
    }

    pub fn with_run_id(mut self, run_id: RunId) -> Self {
        self.run_id = run_id;
        self
    }
}

/// Domain input of a maker: a structure plus an optional previous
/// calculation directory, both possibly references to upstream outputs.
#[derive(Debug, Clone)]
pub struct MakeInput {
    pub structure: Input,
    pub prev_dir: Option<Input>,
    /// Additional named inputs some makers require.
    pub extra: BTreeMap<String, Input>,
}

impl MakeInput {
    pub fn new(structure: impl Into<Input>) -> Self {
        Self {
            structure: structure.into(),
            prev_dir: None,
            extra: BTreeMap::new(),
        }
    }

    pub fn with_prev_dir(mut self, prev_dir: impl Into<Input>) -> Self {
        self.prev_dir = Some(prev_dir.into());
        self
    }

    pub fn with_extra(mut self, name: impl Into<String>, input: impl Into<Input>) -> Self {
        self.extra.insert(name.into(), input.into());
        self
    }

    /// The structure input as a list of candidates.
    pub fn candidates(&self) -> Result<Vec<Input>> {
        match &self.structure {
            Input::List(items) => Ok(items.clone()),
            Input::Literal(serde_json::Value::Array(items)) => {
                Ok(items.iter().cloned().map(Input::Literal).collect())
            }
            _ => Err(FlowdagError::config(
                "expected a list of structures as maker input",
            )),
        }
    }
}

/// A stateless builder of jobs or flows.
pub trait Maker {
    fn name(&self) -> &str;

    fn make(&self, input: &MakeInput, ctx: &MakeContext) -> Result<Node>;
}

/// Every maker shipped with the crate, as one value type.
#[derive(Clone)]
pub enum AnyMaker {
    Scf(ScfMaker),
    Bands(BandsMaker),
    Relax(RelaxMaker),
    Phonon(PhononMaker),
    Transport(TransportMaker),
    BandGap(BandGapMaker),
    RelaxBandGap(RelaxBandGapMaker),
    Zt(ZtMaker),
    HighThroughputZt(HighThroughputZtMaker),
    Screening(ScreeningMaker),
}

impl AnyMaker {
    fn inner(&self) -> &dyn Maker {
        match self {
            AnyMaker::Scf(m) => m,
            AnyMaker::Bands(m) => m,
            AnyMaker::Relax(m) => m,
            AnyMaker::Phonon(m) => m,
            AnyMaker::Transport(m) => m,
            AnyMaker::BandGap(m) => m,
            AnyMaker::RelaxBandGap(m) => m,
            AnyMaker::Zt(m) => m,
            AnyMaker::HighThroughputZt(m) => m,
            AnyMaker::Screening(m) => m,
        }
    }
}

impl Maker for AnyMaker {
    fn name(&self) -> &str {
        self.inner().name()
    }

    fn make(&self, input: &MakeInput, ctx: &MakeContext) -> Result<Node> {
        self.inner().make(input, ctx)
    }
}

impl fmt::Debug for AnyMaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AnyMaker").field(&self.name()).finish()
    }
}
