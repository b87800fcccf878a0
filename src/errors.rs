// src/errors.rs

//! Crate-wide error aliases and helpers.
//!
//! [`FlowdagError`] covers everything that can go wrong while *building* or
//! *configuring* a graph. Failures of individual jobs during a run are not
//! errors in this sense; they are recorded as [`JobFailure`] data in the
//! result store and surfaced through the run report.

use std::fmt;

use thiserror::Error;

use crate::dag::JobId;

#[derive(Error, Debug)]
pub enum FlowdagError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Cycle detected in job graph: {0}")]
    DagCycle(String),

    #[error("Dangling reference: job '{job}' references output of job {producer} which is not part of the graph")]
    DanglingReference { job: String, producer: JobId },

    #[error("Unresolvable reference: {0}")]
    UnresolvableReference(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl FlowdagError {
    pub fn config(msg: impl Into<String>) -> Self {
        FlowdagError::Configuration(msg.into())
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, FlowdagError>;

/// Classification of a per-job failure recorded during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// A reference in the job's inputs could not be resolved (missing
    /// producer, failed producer, or missing attribute).
    UnresolvableReference,
    /// An ancestor failed, so this job was never executed.
    UpstreamFailure,
    /// The wrapped callable returned an error after all retries.
    CallableError,
    /// The run was cancelled before this job reached a terminal state.
    Cancelled,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::UnresolvableReference => "UnresolvableReference",
            FailureKind::UpstreamFailure => "UpstreamFailure",
            FailureKind::CallableError => "CallableError",
            FailureKind::Cancelled => "Cancelled",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure record stored for a job that did not succeed.
#[derive(Debug, Clone, PartialEq)]
pub struct JobFailure {
    pub kind: FailureKind,
    pub message: String,
    /// Number of times the callable was invoked (0 if it never ran).
    pub attempts: u32,
    /// The upstream job whose failure caused this one, if any.
    pub cause: Option<JobId>,
}

impl JobFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            attempts: 0,
            cause: None,
        }
    }

    pub fn with_cause(mut self, cause: JobId) -> Self {
        self.cause = Some(cause);
        self
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }
}
