// src/dag/state_manager.rs

//! Per-run state management for jobs in the scheduler.

use std::collections::{BTreeMap, HashMap};

use tracing::{debug, info, warn};

use crate::dag::JobGraph;
use crate::dag::job::JobInputs;
use crate::dag::job_info::{JobInfo, JobState, ScheduledJob};
use crate::errors::{FailureKind, JobFailure};
use crate::store::{JobRecord, ResultStore};
use crate::types::{JobId, RunId};

/// Outcome of checking one job's producers.
enum Readiness {
    Waiting,
    Satisfied,
    Unresolvable(JobFailure),
}

/// Manages per-run state transitions for jobs.
pub struct StateManager<'a> {
    graph: &'a JobGraph,
    jobs: &'a mut HashMap<JobId, JobInfo>,
    store: &'a mut ResultStore,
}

impl<'a> StateManager<'a> {
    pub(crate) fn new(
        graph: &'a JobGraph,
        jobs: &'a mut HashMap<JobId, JobInfo>,
        store: &'a mut ResultStore,
    ) -> Self {
        Self { graph, jobs, store }
    }

    /// Mark a job as failed, record the failure, and fail every pending
    /// dependent with `UpstreamFailure`.
    ///
    /// Returns all newly failed jobs, the root first.
    pub fn mark_failed(&mut self, id: JobId, failure: JobFailure) -> Vec<JobId> {
        let Some(info) = self.jobs.get_mut(&id) else {
            warn!(job_id = %id.short(), "failure for unknown job; ignoring");
            return Vec::new();
        };

        if info.state.is_terminal() {
            debug!(job = %info.name(), "job already terminal; ignoring failure");
            return Vec::new();
        }

        warn!(
            job = %info.name(),
            job_id = %id.short(),
            kind = %failure.kind,
            error = %failure.message,
            "job failed; failing dependents"
        );
        info.state = JobState::Failed(failure.kind);
        self.store.insert(id, JobRecord::Failed(failure));

        let mut newly_failed = vec![id];
        newly_failed.append(&mut self.mark_dependents_failed(id));
        newly_failed
    }

    /// Mark all non-terminal dependents (transitively) of a failed job as
    /// `Failed(UpstreamFailure)`, except those that only reference it
    /// through an optional input.
    ///
    /// Each dependent records the producer it was waiting on as its cause, so
    /// the dependency chain can be reconstructed for reporting.
    pub fn mark_dependents_failed(&mut self, failed_job: JobId) -> Vec<JobId> {
        let mut stack: Vec<(JobId, JobId)> = self
            .graph
            .dependents_of(&failed_job)
            .iter()
            .map(|d| (*d, failed_job))
            .collect();

        let mut newly_failed = Vec::new();

        while let Some((id, cause)) = stack.pop() {
            let Some(info) = self.jobs.get_mut(&id) else {
                continue;
            };
            // Optional inputs tolerate the failure; readiness handles them.
            if !info.required.contains(&cause) {
                continue;
            }

            match info.state {
                JobState::Pending | JobState::Ready => {
                    let cause_name = self
                        .store
                        .failure_of(&cause)
                        .map(|f| f.kind.to_string())
                        .unwrap_or_default();
                    let failure = JobFailure::new(
                        FailureKind::UpstreamFailure,
                        format!("upstream job {} did not succeed ({})", cause.short(), cause_name),
                    )
                    .with_cause(cause);

                    debug!(
                        job = %info.name(),
                        "marking dependent as failed due to upstream failure"
                    );
                    info.state = JobState::Failed(FailureKind::UpstreamFailure);
                    info.resolved = None;
                    self.store.insert(id, JobRecord::Failed(failure));
                    newly_failed.push(id);

                    stack.extend(self.graph.dependents_of(&id).iter().map(|d| (*d, id)));
                }
                JobState::Running
                | JobState::Expanding
                | JobState::Succeeded
                | JobState::Failed(_) => {
                    // Either already terminal or cannot depend on a failed job.
                }
            }
        }

        newly_failed
    }

    /// Move pending jobs whose producers all succeeded to `Ready`, resolving
    /// their inputs against the result store.
    ///
    /// Jobs whose references cannot be resolved fail with
    /// `UnresolvableReference`. Returns the jobs newly marked as failed.
    pub fn promote_pending(&mut self) -> Vec<JobId> {
        let mut newly_failed = Vec::new();

        // Decide first, then mutate to avoid borrowing issues.
        let mut candidates: Vec<(u64, JobId)> = self
            .jobs
            .values()
            .filter(|info| info.state == JobState::Pending)
            .map(|info| (info.seq, info.id()))
            .collect();
        candidates.sort();

        for (_, id) in candidates {
            // An earlier candidate's failure may already have reached this one.
            if self.jobs.get(&id).map(|i| i.state) != Some(JobState::Pending) {
                continue;
            }

            match self.readiness(&id) {
                Readiness::Waiting => {}
                Readiness::Unresolvable(failure) => {
                    newly_failed.append(&mut self.mark_failed(id, failure));
                }
                Readiness::Satisfied => match self.resolve_inputs(&id) {
                    Ok(inputs) => {
                        if let Some(info) = self.jobs.get_mut(&id) {
                            debug!(job = %info.name(), "references resolved; marking Ready");
                            info.resolved = Some(inputs);
                            info.state = JobState::Ready;
                        }
                    }
                    Err(failure) => {
                        newly_failed.append(&mut self.mark_failed(id, failure));
                    }
                },
            }
        }

        newly_failed
    }

    fn readiness(&self, id: &JobId) -> Readiness {
        let Some(info) = self.jobs.get(id) else {
            return Readiness::Waiting;
        };

        for dep in &info.deps {
            let required = info.required.contains(dep);
            match self.jobs.get(dep).map(|d| d.state) {
                Some(JobState::Succeeded) => {}
                Some(JobState::Failed(_)) if !required => {}
                Some(JobState::Failed(_)) => {
                    return Readiness::Unresolvable(
                        JobFailure::new(
                            FailureKind::UnresolvableReference,
                            format!("producer {} failed", dep.short()),
                        )
                        .with_cause(*dep),
                    );
                }
                Some(_) => return Readiness::Waiting,
                None if !required => {}
                None => {
                    return Readiness::Unresolvable(
                        JobFailure::new(
                            FailureKind::UnresolvableReference,
                            format!("producer {} was never scheduled", dep.short()),
                        )
                        .with_cause(*dep),
                    );
                }
            }
        }

        Readiness::Satisfied
    }

    fn resolve_inputs(&self, id: &JobId) -> Result<JobInputs, JobFailure> {
        let info = self.jobs.get(id).ok_or_else(|| {
            JobFailure::new(FailureKind::UnresolvableReference, "job missing from state map")
        })?;

        let mut values = BTreeMap::new();
        for (name, input) in info.job.inputs() {
            let value = input.resolve(&*self.store).map_err(|e| {
                JobFailure::new(
                    FailureKind::UnresolvableReference,
                    format!("input '{}': {}", name, e),
                )
                .with_cause(e.producer())
            })?;
            values.insert(name.clone(), value);
        }

        Ok(JobInputs::new(values))
    }

    /// Mark up to `slots` ready jobs as `Running`, in registration order, and
    /// return them for dispatch.
    pub fn dispatch_ready(&mut self, slots: usize, run_id: RunId) -> Vec<ScheduledJob> {
        let mut ready: Vec<(u64, JobId)> = self
            .jobs
            .values()
            .filter(|info| info.state == JobState::Ready)
            .map(|info| (info.seq, info.id()))
            .collect();
        ready.sort();

        let mut scheduled = Vec::new();
        for (_, id) in ready.into_iter().take(slots) {
            if let Some(info) = self.jobs.get_mut(&id) {
                info.state = JobState::Running;
                info.attempts += 1;
                info!(
                    job = %info.name(),
                    job_id = %id.short(),
                    %run_id,
                    "dependencies satisfied; dispatching job"
                );
                scheduled.push(ScheduledJob::from_job_info(
                    info,
                    run_id,
                    std::time::Duration::ZERO,
                ));
            }
        }

        scheduled
    }

    /// Check if all jobs are in a terminal state.
    pub fn all_jobs_terminal(&self) -> bool {
        self.jobs.values().all(|info| info.state.is_terminal())
    }
}

/// A read-only view used when only shared access to the jobs map exists
/// (e.g. in `Scheduler::deps_satisfied`).
pub struct ReadOnlyStateManager<'a> {
    jobs: &'a HashMap<JobId, JobInfo>,
}

impl<'a> ReadOnlyStateManager<'a> {
    pub(crate) fn new(jobs: &'a HashMap<JobId, JobInfo>) -> Self {
        Self { jobs }
    }

    /// Whether every producer of `id` has succeeded.
    pub fn deps_satisfied(&self, id: &JobId) -> Option<bool> {
        let info = self.jobs.get(id)?;
        Some(info.deps.iter().all(|dep| {
            matches!(
                self.jobs.get(dep).map(|d| d.state),
                Some(JobState::Succeeded)
            )
        }))
    }

    pub fn running_count(&self) -> usize {
        self.jobs
            .values()
            .filter(|info| info.state == JobState::Running)
            .count()
    }
}
