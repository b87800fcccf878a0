// src/makers/screening.rs

//! Threshold screening with data-dependent expansion.
//!
//! A scoring node is built per candidate. A single screening job then reads
//! every score and returns an [`Expansion`] containing one expansion node per
//! candidate whose score is strictly greater than the threshold. Candidates
//! at or below the threshold are reported as filtered, not failed.
//!
//! Scores are wired as optional inputs: a candidate whose scoring node failed
//! is reported as `failed` and the remaining candidates are still screened.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use anyhow::Context;
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::dag::{Callable, Flow, Input, Job, Node, fn_callable};
use crate::errors::{FlowdagError, Result};
use crate::makers::{MakeContext, MakeInput, Maker};
use crate::response::Expansion;

/// Builds the node for candidate `index` from its input.
pub type NodeBuilder = Arc<dyn Fn(usize, Input) -> Result<Node> + Send + Sync>;

/// Label under which a candidate is reported.
pub fn candidate_label(index: usize) -> String {
    format!("candidate_{index}")
}

#[derive(Clone)]
pub struct ScreeningMaker {
    pub name: String,
    pub threshold: f64,
    /// Attribute of the scoring node's output holding the score. `None`
    /// uses the whole output.
    pub score_path: Option<String>,
    scorer: NodeBuilder,
    expander: NodeBuilder,
}

impl fmt::Debug for ScreeningMaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScreeningMaker")
            .field("name", &self.name)
            .field("threshold", &self.threshold)
            .field("score_path", &self.score_path)
            .finish_non_exhaustive()
    }
}

impl ScreeningMaker {
    pub fn new(
        name: impl Into<String>,
        threshold: f64,
        scorer: NodeBuilder,
        expander: NodeBuilder,
    ) -> Self {
        Self {
            name: name.into(),
            threshold,
            score_path: None,
            scorer,
            expander,
        }
    }

    pub fn with_score_path(mut self, path: impl Into<String>) -> Self {
        self.score_path = Some(path.into());
        self
    }

    /// Build the screening flow over `candidates`.
    ///
    /// Output: `screening` (per-candidate summary) and `results` (expansion
    /// outputs keyed by candidate label).
    pub fn make_flow(&self, candidates: Vec<Input>) -> Result<Flow> {
        if !self.threshold.is_finite() {
            return Err(FlowdagError::config(format!(
                "screening threshold must be finite, got {}",
                self.threshold
            )));
        }

        let mut flow = Flow::new(&self.name);
        let mut scores = Vec::with_capacity(candidates.len());

        for (index, candidate) in candidates.iter().enumerate() {
            let node = (self.scorer)(index, candidate.clone())?;
            let score = match &self.score_path {
                Some(path) => node.output_at(path).ok_or_else(|| {
                    FlowdagError::config(format!(
                        "scoring node '{}' has no output '{}'",
                        node.name(),
                        path
                    ))
                })?,
                None => node.output(),
            };
            scores.push(score);
            flow.push(node);
        }

        let screen = self.make_job(candidates, scores)?;
        let flow = flow
            .with_output("screening", screen.output_at("screening"))
            .with_output("results", screen.output_at("results"))
            .with_node(screen);
        Ok(flow)
    }

    /// Build only the screening job, given candidates and their scores.
    pub fn make_job(&self, candidates: Vec<Input>, scores: Vec<Input>) -> Result<Job> {
        if candidates.len() != scores.len() {
            return Err(FlowdagError::config(format!(
                "screening '{}' got {} candidates but {} scores",
                self.name,
                candidates.len(),
                scores.len()
            )));
        }

        Ok(
            Job::new(format!("{} screen", self.name), screen_callable(Arc::clone(&self.expander)))
                .with_input("candidates", Input::List(candidates))
                .with_input(
                    "scores",
                    Input::List(scores.into_iter().map(Input::optional).collect()),
                )
                .with_input("threshold", self.threshold),
        )
    }
}

impl Maker for ScreeningMaker {
    fn name(&self) -> &str {
        &self.name
    }

    fn make(&self, input: &MakeInput, _ctx: &MakeContext) -> Result<Node> {
        Ok(self.make_flow(input.candidates()?)?.into())
    }
}

fn screen_callable(expander: NodeBuilder) -> Arc<dyn Callable> {
    fn_callable("screen", move |inputs| {
        let candidates = inputs
            .require("candidates")?
            .as_array()
            .context("'candidates' is not a list")?;
        let scores = inputs
            .require("scores")?
            .as_array()
            .context("'scores' is not a list")?;
        let threshold = inputs.f64("threshold")?;

        let mut expansions = Flow::new("screened candidates");
        let mut results = BTreeMap::new();
        let mut summary = Vec::with_capacity(candidates.len());
        let mut filtered = Vec::new();

        for (index, (candidate, score)) in candidates.iter().zip(scores).enumerate() {
            let label = candidate_label(index);
            if score.is_null() {
                warn!(candidate = %label, "no score for candidate; scoring did not succeed");
                summary.push(json!({ "label": label, "score": null, "status": "failed" }));
                continue;
            }
            let score = score
                .as_f64()
                .with_context(|| format!("score of {label} is not a number: {score}"))?;

            if score > threshold {
                info!(candidate = %label, score, threshold, "candidate passed screening");
                let node = expander(index, Input::Literal(candidate.clone()))?;
                results.insert(label.clone(), node.output());
                expansions.push(node);
                summary.push(json!({ "label": label, "score": score, "status": "passed" }));
            } else {
                info!(candidate = %label, score, threshold, "candidate filtered out");
                summary.push(json!({ "label": label, "score": score, "status": "filtered" }));
                filtered.push(label);
            }
        }

        let expansions = expansions
            .with_output("screening", Input::literal(Value::Array(summary)))
            .with_output("results", Input::Map(results));
        Ok(Expansion::new(expansions).with_filtered(filtered))
    })
}
