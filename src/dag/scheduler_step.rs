// src/dag/scheduler_step.rs

//! Step-by-step execution result types for the scheduler.

use crate::dag::job_info::ScheduledJob;
use crate::types::JobId;

/// Structured result of a single scheduler "step".
///
/// This is useful for tests that want to manually step the graph and make
/// assertions about what changed.
#[derive(Debug, Clone, Default)]
pub struct SchedulerStep {
    /// Jobs dispatched as a result of this step.
    pub newly_scheduled: Vec<ScheduledJob>,
    /// Jobs newly marked as failed in this step (including the job that
    /// failed and any dependents).
    pub newly_failed: Vec<JobId>,
    /// Jobs that reached `Succeeded` in this step, including expansion
    /// origins whose subgraph completed.
    pub newly_succeeded: Vec<JobId>,
    /// Whether this step left every job in a terminal state.
    pub run_just_finished: bool,
}
