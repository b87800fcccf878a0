// src/engine/mod.rs

//! Orchestration engine for flowdag.
//!
//! This module ties together:
//! - the job scheduler
//! - the retry policy applied to failing callables
//! - the main runtime event loop that reacts to:
//!   - job completion events (success, expansion or error)
//!   - cancellation requests
//!
//! The pure core state machine lives in [`core`]; the async/IO shell is
//! implemented in [`runtime`]. [`runner`] is the user-facing entry point and
//! [`report`] describes what a finished run hands back.

use crate::response::Response;
use crate::types::JobId;

/// Final outcome of a job's callable, after retries, for the scheduler.
#[derive(Debug, Clone)]
pub enum JobOutcome {
    Completed(Response),
    Failed { message: String, attempts: u32 },
}

/// Events flowing into the runtime from executors and cancel handles.
#[derive(Debug, Clone)]
pub enum RuntimeEvent {
    /// One invocation of a job's callable returned.
    JobFinished {
        job: JobId,
        attempt: u32,
        result: Result<Response, String>,
    },
    /// Cooperative cancellation requested (e.g. Ctrl-C).
    CancelRequested,
}

pub mod core;
pub mod event_handlers;
pub mod report;
pub mod retry;
pub mod runner;
pub mod runtime;

pub use core::CoreRuntime;
pub use event_handlers::{CoreCommand, CoreStep};
pub use report::{FailureEntry, RunReport, RunStatus};
pub use retry::RetryPolicy;
pub use runner::{CancelHandle, Runner, RunnerConfig};
pub use runtime::Runtime;
