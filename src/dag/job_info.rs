// src/dag/job_info.rs

//! Per-run job state and the scheduled-job handoff type.

use std::sync::Arc;
use std::time::Duration;

use crate::dag::job::{Callable, Job, JobContext, JobInputs};
use crate::errors::FailureKind;
use crate::types::{JobId, RunId};

/// Lifecycle state of a job within a run.
///
/// `Pending -> Ready -> Running -> {Succeeded | Failed | Expanding -> Succeeded}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    /// Waiting on at least one producer.
    Pending,
    /// All references resolved; waiting for a worker slot.
    Ready,
    /// Dispatched to the executor (including retries).
    Running,
    /// Returned an expansion; waiting for the spliced subgraph.
    Expanding,
    Succeeded,
    Failed(FailureKind),
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Failed(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, JobState::Failed(_))
    }
}

/// Static job definition plus per-run bookkeeping.
#[derive(Clone)]
pub(crate) struct JobInfo {
    pub job: Job,
    /// Registration order; the deterministic tie-break among ready jobs.
    pub seq: u64,
    pub deps: Vec<JobId>,
    /// Subset of `deps` whose failure fails this job.
    pub required: Vec<JobId>,
    pub state: JobState,
    /// Number of callable invocations so far.
    pub attempts: u32,
    /// Inputs resolved when the job became ready.
    pub resolved: Option<JobInputs>,
    /// Job whose expansion introduced this one, if any.
    pub parent: Option<JobId>,
    /// Whether the result was taken from a previous run's store.
    pub reused: bool,
}

impl JobInfo {
    pub fn new(job: Job, seq: u64, parent: Option<JobId>) -> Self {
        let deps = job.dependencies();
        let required = job.required_dependencies();
        Self {
            job,
            seq,
            deps,
            required,
            state: JobState::Pending,
            attempts: 0,
            resolved: None,
            parent,
            reused: false,
        }
    }

    pub fn id(&self) -> JobId {
        self.job.id()
    }

    pub fn name(&self) -> &str {
        self.job.name()
    }
}

/// A job the scheduler wants the executor to run now.
#[derive(Clone)]
pub struct ScheduledJob {
    pub id: JobId,
    pub name: String,
    pub callable: Arc<dyn Callable>,
    pub inputs: JobInputs,
    /// 1-based attempt number.
    pub attempt: u32,
    /// Delay before invoking the callable (non-zero for retries).
    pub delay: Duration,
    pub run_id: RunId,
}

impl std::fmt::Debug for ScheduledJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScheduledJob")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("attempt", &self.attempt)
            .field("delay", &self.delay)
            .finish_non_exhaustive()
    }
}

impl ScheduledJob {
    pub(crate) fn from_job_info(info: &JobInfo, run_id: RunId, delay: Duration) -> Self {
        Self {
            id: info.id(),
            name: info.name().to_string(),
            callable: Arc::clone(info.job.callable()),
            inputs: info.resolved.clone().unwrap_or_default(),
            attempt: info.attempts,
            delay,
            run_id,
        }
    }

    pub fn context(&self) -> JobContext {
        JobContext {
            run_id: self.run_id,
            job_id: self.id,
            job_name: self.name.clone(),
            attempt: self.attempt,
        }
    }
}
