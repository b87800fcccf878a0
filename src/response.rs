// src/response.rs

//! What a callable hands back to the runner.

use serde_json::Value;

use crate::dag::Flow;

/// Result of a single callable invocation.
///
/// - `Done(value)` terminates the job with `value` as its result.
/// - `Expand(expansion)` splices `expansion.replace` into the running graph.
///   The originating job only succeeds once that subgraph has completed, and
///   its final result becomes the subgraph's declared output.
#[derive(Debug, Clone)]
pub enum Response {
    Done(Value),
    Expand(Expansion),
}

/// Dynamic graph growth requested by a job.
#[derive(Debug, Clone)]
pub struct Expansion {
    /// Flow whose jobs are inserted as children of the originating job.
    pub replace: Flow,
    /// Result used when `replace` declares no output.
    pub value: Option<Value>,
    /// Labels of candidates the job deliberately did not expand.
    pub filtered: Vec<String>,
}

impl Response {
    pub fn done(value: impl Into<Value>) -> Self {
        Response::Done(value.into())
    }

    pub fn replace(flow: Flow) -> Self {
        Response::Expand(Expansion {
            replace: flow,
            value: None,
            filtered: Vec::new(),
        })
    }
}

impl Expansion {
    pub fn new(replace: Flow) -> Self {
        Self {
            replace,
            value: None,
            filtered: Vec::new(),
        }
    }

    pub fn with_value(mut self, value: impl Into<Value>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn with_filtered(mut self, filtered: Vec<String>) -> Self {
        self.filtered = filtered;
        self
    }
}

impl From<Value> for Response {
    fn from(value: Value) -> Self {
        Response::Done(value)
    }
}

impl From<Expansion> for Response {
    fn from(expansion: Expansion) -> Self {
        Response::Expand(expansion)
    }
}
