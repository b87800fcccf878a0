// src/engine/event_handlers.rs

//! Event handling logic for the core runtime.

use tracing::{debug, warn};

use crate::dag::{ScheduledJob, Scheduler, SchedulerStep};
use crate::engine::{JobOutcome, RetryPolicy};
use crate::response::Response;
use crate::types::JobId;

/// Command produced by the pure core, to be executed by the outer IO shell.
#[derive(Debug, Clone)]
pub enum CoreCommand {
    /// Send these jobs to the executor.
    DispatchJobs(Vec<ScheduledJob>),
    /// Every job is terminal; the run is over.
    Finish,
}

/// Decision returned by the core after handling a single `RuntimeEvent`.
#[derive(Debug, Clone)]
pub struct CoreStep {
    /// Commands the IO shell should execute (dispatch jobs, finish).
    pub commands: Vec<CoreCommand>,
    /// Whether the outer runtime loop should keep running.
    pub keep_running: bool,
}

impl CoreStep {
    fn from_scheduler_step(step: SchedulerStep) -> Self {
        let mut commands = Vec::new();
        if !step.newly_scheduled.is_empty() {
            commands.push(CoreCommand::DispatchJobs(step.newly_scheduled));
        }
        if step.run_just_finished {
            commands.push(CoreCommand::Finish);
        }
        Self {
            commands,
            keep_running: !step.run_just_finished,
        }
    }

    /// Jobs dispatched by this step, in dispatch order.
    pub fn dispatched(&self) -> Vec<&ScheduledJob> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                CoreCommand::DispatchJobs(jobs) => Some(jobs.iter()),
                CoreCommand::Finish => None,
            })
            .flatten()
            .collect()
    }
}

/// Seed the run: dispatch every job whose inputs are already concrete.
pub fn handle_start(scheduler: &mut Scheduler) -> CoreStep {
    CoreStep::from_scheduler_step(scheduler.start())
}

/// Handle one returned invocation of a job's callable.
///
/// - A value or expansion completes the job.
/// - An error is retried with backoff while the policy allows it; the job
///   keeps its worker slot in the meantime. Once retries are exhausted the
///   job fails with `CallableError` and its dependents are failed.
pub fn handle_job_finished(
    scheduler: &mut Scheduler,
    retry: &RetryPolicy,
    job: JobId,
    attempt: u32,
    result: Result<Response, String>,
) -> CoreStep {
    if scheduler.attempts_of(&job) != Some(attempt) {
        warn!(
            job_id = %job.short(),
            attempt,
            "completion for a stale or unknown attempt; ignoring"
        );
        return CoreStep {
            commands: Vec::new(),
            keep_running: !scheduler.is_finished(),
        };
    }

    let outcome = match result {
        Ok(response) => JobOutcome::Completed(response),
        Err(message) => {
            if retry.should_retry(attempt) && !scheduler.is_cancelled() {
                let delay = retry.backoff_for(attempt);
                warn!(
                    job = scheduler.job_name(&job).unwrap_or("<unknown>"),
                    attempt,
                    error = %message,
                    ?delay,
                    "job callable failed; retrying"
                );
                if let Some(retried) = scheduler.retry(job, delay) {
                    return CoreStep {
                        commands: vec![CoreCommand::DispatchJobs(vec![retried])],
                        keep_running: true,
                    };
                }
            }
            debug!(job_id = %job.short(), attempt, "no retries left");
            JobOutcome::Failed {
                message,
                attempts: attempt,
            }
        }
    };

    CoreStep::from_scheduler_step(scheduler.step_completion(job, outcome))
}

/// Handle a cancellation request.
///
/// Not-yet-started jobs are cancelled; the loop keeps running until the
/// jobs already in flight have reported back.
pub fn handle_cancel(scheduler: &mut Scheduler) -> CoreStep {
    CoreStep::from_scheduler_step(scheduler.step_cancel())
}
