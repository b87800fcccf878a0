// src/dag/scheduler.rs

use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Duration;

use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::dag::flow::Flow;
use crate::dag::graph::JobGraph;
use crate::dag::input::Input;
use crate::dag::job::Job;
use crate::dag::job_info::{JobInfo, JobState, ScheduledJob};
use crate::dag::reference::ResolveError;
use crate::dag::scheduler_step::SchedulerStep;
use crate::dag::state_manager::{ReadOnlyStateManager, StateManager};
use crate::engine::JobOutcome;
use crate::errors::{FailureKind, FlowdagError, JobFailure, Result};
use crate::response::{Expansion, Response};
use crate::store::{JobRecord, ResultStore};
use crate::types::{JobId, RunId};

/// Bookkeeping for a job that returned an expansion.
#[derive(Debug, Clone)]
struct ExpansionState {
    origin_seq: u64,
    members: Vec<JobId>,
    output: BTreeMap<String, Input>,
    value: Option<Value>,
}

/// Scheduler holds the (growing) job graph plus mutable per-run state.
///
/// It is responsible for:
/// - registering the jobs of a flow and of every spliced expansion
/// - deciding when a job is "ready" (all references resolved)
/// - handing out ready jobs while respecting the worker limit
/// - recording successes and failures in the result store
/// - failing dependents when a job fails
/// - completing expansion origins once their subgraph has finished
///
/// The scheduler is synchronous and performs no IO; the engine drives it.
pub struct Scheduler {
    graph: JobGraph,
    jobs: HashMap<JobId, JobInfo>,
    store: ResultStore,
    expansions: HashMap<JobId, ExpansionState>,
    filtered: Vec<String>,
    next_seq: u64,
    max_workers: usize,
    run_id: RunId,
    cancelled: bool,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("run_id", &self.run_id)
            .field("jobs", &self.jobs.len())
            .field("max_workers", &self.max_workers)
            .field("cancelled", &self.cancelled)
            .finish_non_exhaustive()
    }
}

impl Scheduler {
    pub fn new(run_id: RunId, max_workers: usize) -> Self {
        Self {
            graph: JobGraph::new(),
            jobs: HashMap::new(),
            store: ResultStore::new(),
            expansions: HashMap::new(),
            filtered: Vec::new(),
            next_seq: 0,
            max_workers: max_workers.max(1),
            run_id,
            cancelled: false,
        }
    }

    /// Construct a scheduler for a validated flow.
    pub fn from_flow(flow: &Flow, run_id: RunId, max_workers: usize) -> Result<Self> {
        let mut scheduler = Self::new(run_id, max_workers);
        scheduler.register_flow(flow)?;
        Ok(scheduler)
    }

    /// Seed the result store with a previous run's results.
    ///
    /// Jobs registered afterwards whose ids already succeeded there are
    /// marked `Succeeded` without being executed. Failure records are dropped.
    pub fn with_store(mut self, mut store: ResultStore) -> Self {
        store.retain_succeeded();
        self.store = store;
        self
    }

    /// Validate `flow` and add its jobs to the graph.
    pub fn register_flow(&mut self, flow: &Flow) -> Result<()> {
        let known: HashSet<JobId> = self.jobs.keys().copied().collect();
        flow.validate_against(&known)?;
        let jobs: Vec<Job> = flow.jobs().into_iter().cloned().collect();
        self.add_jobs(jobs, None);
        Ok(())
    }

    fn add_jobs(&mut self, jobs: Vec<Job>, parent: Option<JobId>) -> Vec<JobId> {
        self.graph.add_jobs(jobs.iter());

        let mut ids = Vec::with_capacity(jobs.len());
        for job in jobs {
            let id = job.id();
            let mut info = JobInfo::new(job, self.next_seq, parent);
            self.next_seq += 1;

            if self.store.is_succeeded(&id) {
                debug!(job = %info.name(), "result already in store; reusing");
                info.state = JobState::Succeeded;
                info.reused = true;
            }

            self.jobs.insert(id, info);
            ids.push(id);
        }
        ids
    }

    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Read-only view of a job's state.
    pub fn state_of(&self, id: &JobId) -> Option<JobState> {
        self.jobs.get(id).map(|info| info.state)
    }

    pub fn job_name(&self, id: &JobId) -> Option<&str> {
        self.jobs.get(id).map(|info| info.name())
    }

    /// Number of callable invocations recorded for a job.
    pub fn attempts_of(&self, id: &JobId) -> Option<u32> {
        self.jobs.get(id).map(|info| info.attempts)
    }

    /// The job whose expansion introduced `id`, if any.
    pub fn parent_of(&self, id: &JobId) -> Option<JobId> {
        self.jobs.get(id).and_then(|info| info.parent)
    }

    pub fn was_reused(&self, id: &JobId) -> bool {
        self.jobs.get(id).is_some_and(|info| info.reused)
    }

    /// All registered job ids in registration order.
    pub fn job_ids(&self) -> Vec<JobId> {
        let mut ids: Vec<(u64, JobId)> = self
            .jobs
            .values()
            .map(|info| (info.seq, info.id()))
            .collect();
        ids.sort();
        ids.into_iter().map(|(_, id)| id).collect()
    }

    pub fn job_count(&self) -> usize {
        self.jobs.len()
    }

    pub fn graph(&self) -> &JobGraph {
        &self.graph
    }

    pub fn store(&self) -> &ResultStore {
        &self.store
    }

    pub fn into_store(self) -> ResultStore {
        self.store
    }

    /// Candidate labels that expansion jobs chose not to expand.
    pub fn filtered(&self) -> &[String] {
        &self.filtered
    }

    /// Whether all producers of `id` have succeeded.
    ///
    /// Returns `None` if the job is unknown.
    pub fn deps_satisfied(&self, id: &JobId) -> Option<bool> {
        ReadOnlyStateManager::new(&self.jobs).deps_satisfied(id)
    }

    pub fn running_count(&self) -> usize {
        ReadOnlyStateManager::new(&self.jobs).running_count()
    }

    /// Whether every registered job is in a terminal state.
    pub fn is_finished(&self) -> bool {
        self.jobs.values().all(|info| info.state.is_terminal())
    }

    /// Begin execution: promote jobs with no pending producers and dispatch
    /// as many as the worker limit allows.
    pub fn start(&mut self) -> SchedulerStep {
        info!(run_id = %self.run_id, jobs = self.jobs.len(), "scheduler: starting run");
        self.advance(SchedulerStep::default())
    }

    /// Handle completion of a job with a concrete outcome (production API).
    pub fn handle_completion(&mut self, id: JobId, outcome: JobOutcome) -> Vec<ScheduledJob> {
        self.step_completion(id, outcome).newly_scheduled
    }

    /// Manual-step variant of `handle_completion` that returns a rich [`SchedulerStep`].
    pub fn step_completion(&mut self, id: JobId, outcome: JobOutcome) -> SchedulerStep {
        let mut step = SchedulerStep::default();

        match self.jobs.get(&id).map(|info| info.state) {
            Some(JobState::Running) => {}
            Some(state) => {
                warn!(job_id = %id.short(), ?state, "completion for job that is not running; ignoring");
                return self.advance(step);
            }
            None => {
                warn!(job_id = %id.short(), "completion for unknown job; ignoring");
                return self.advance(step);
            }
        }

        match outcome {
            JobOutcome::Completed(Response::Done(value)) => {
                self.mark_succeeded(id, value, &mut step);
            }
            JobOutcome::Completed(Response::Expand(expansion)) => {
                self.begin_expansion(id, expansion, &mut step);
            }
            JobOutcome::Failed { message, attempts } => {
                let failure =
                    JobFailure::new(FailureKind::CallableError, message).with_attempts(attempts);
                let mut failed = self.manager().mark_failed(id, failure);
                step.newly_failed.append(&mut failed);
            }
        }

        self.advance(step)
    }

    /// Re-dispatch a running job after a retryable failure.
    ///
    /// The job keeps its worker slot and stays `Running`. Returns `None` if
    /// the job is not running or the run has been cancelled.
    pub fn retry(&mut self, id: JobId, delay: Duration) -> Option<ScheduledJob> {
        if self.cancelled {
            return None;
        }
        let info = self.jobs.get_mut(&id)?;
        if info.state != JobState::Running {
            return None;
        }
        info.attempts += 1;
        debug!(job = %info.name(), attempt = info.attempts, ?delay, "re-dispatching job");
        Some(ScheduledJob::from_job_info(info, self.run_id, delay))
    }

    /// Cancel the run.
    ///
    /// Every job that has not started is marked `Failed(Cancelled)`. Running
    /// jobs are left to finish; their results are still recorded, but no
    /// further jobs are dispatched and no new expansions are spliced.
    pub fn step_cancel(&mut self) -> SchedulerStep {
        let mut step = SchedulerStep::default();

        if !self.cancelled {
            info!(run_id = %self.run_id, "scheduler: cancellation requested");
        }
        self.cancelled = true;

        for id in self.job_ids() {
            let Some(info) = self.jobs.get_mut(&id) else {
                continue;
            };
            if matches!(info.state, JobState::Pending | JobState::Ready) {
                debug!(job = %info.name(), "cancelling job before it started");
                info.state = JobState::Failed(FailureKind::Cancelled);
                info.resolved = None;
                self.store.insert(
                    id,
                    JobRecord::Failed(JobFailure::new(
                        FailureKind::Cancelled,
                        "run cancelled before the job started",
                    )),
                );
                step.newly_failed.push(id);
            }
        }

        self.advance(step)
    }

    /// Resolve a declared output mapping against the current store.
    ///
    /// Returns the resolved entries plus the entries that could not be
    /// resolved, with the reason.
    pub fn resolve_output(
        &self,
        output: &BTreeMap<String, Input>,
    ) -> (BTreeMap<String, Value>, Vec<(String, ResolveError)>) {
        let mut resolved = BTreeMap::new();
        let mut unresolved = Vec::new();

        for (key, input) in output {
            match input.resolve(&self.store) {
                Ok(v) => {
                    resolved.insert(key.clone(), v);
                }
                Err(e) => unresolved.push((key.clone(), e)),
            }
        }

        (resolved, unresolved)
    }

    fn manager(&mut self) -> StateManager<'_> {
        StateManager::new(&self.graph, &mut self.jobs, &mut self.store)
    }

    /// Propagate the consequences of the last state change: promote ready
    /// jobs, complete finished expansions, then dispatch.
    fn advance(&mut self, mut step: SchedulerStep) -> SchedulerStep {
        loop {
            loop {
                let mut failed = self.manager().promote_pending();
                step.newly_failed.append(&mut failed);

                // Completing an expansion can unblock further pending jobs.
                if !self.settle_expansions(&mut step) {
                    break;
                }
            }
            if !self.fail_stalled(&mut step) {
                break;
            }
        }

        if !self.cancelled {
            let slots = self.max_workers.saturating_sub(self.running_count());
            let run_id = self.run_id;
            let mut scheduled = self.manager().dispatch_ready(slots, run_id);
            step.newly_scheduled.append(&mut scheduled);
        }

        step.run_just_finished = self.manager().all_jobs_terminal();
        if step.run_just_finished {
            info!(run_id = %self.run_id, "scheduler: all jobs terminal; run finished");
        }
        step
    }

    fn mark_succeeded(&mut self, id: JobId, value: Value, step: &mut SchedulerStep) {
        if let Some(info) = self.jobs.get_mut(&id) {
            info!(
                job = %info.name(),
                job_id = %id.short(),
                attempts = info.attempts,
                "job succeeded"
            );
            info.state = JobState::Succeeded;
            info.resolved = None;
            self.store.insert(id, JobRecord::Succeeded(value));
            step.newly_succeeded.push(id);
        }
    }

    fn begin_expansion(&mut self, id: JobId, expansion: Expansion, step: &mut SchedulerStep) {
        if self.cancelled {
            let failure = JobFailure::new(
                FailureKind::Cancelled,
                "expansion discarded because the run was cancelled",
            );
            let mut failed = self.manager().mark_failed(id, failure);
            step.newly_failed.append(&mut failed);
            return;
        }

        let known: HashSet<JobId> = self.jobs.keys().copied().collect();
        let checked = expansion
            .replace
            .validate_against(&known)
            .and_then(|()| self.check_not_awaiting_origin(id, &expansion.replace));
        if let Err(e) = checked {
            let failure = JobFailure::new(
                FailureKind::UnresolvableReference,
                format!("invalid expansion: {e}"),
            );
            let mut failed = self.manager().mark_failed(id, failure);
            step.newly_failed.append(&mut failed);
            return;
        }

        let Expansion {
            replace,
            value,
            filtered,
        } = expansion;

        let origin_seq = match self.jobs.get_mut(&id) {
            Some(info) => {
                info!(
                    job = %info.name(),
                    job_id = %id.short(),
                    children = replace.job_count(),
                    filtered = filtered.len(),
                    "job requested expansion; splicing subgraph"
                );
                info.state = JobState::Expanding;
                info.resolved = None;
                info.seq
            }
            None => return,
        };

        self.filtered.extend(filtered);
        let output = replace.output().clone();
        let members = self.add_jobs(replace.into_jobs(), Some(id));

        self.expansions.insert(
            id,
            ExpansionState {
                origin_seq,
                members,
                output,
                value,
            },
        );
    }

    /// Reject an expansion that references a job which cannot finish before
    /// the expansion does.
    ///
    /// The origin stays `Expanding` until its members are terminal, and so
    /// does every enclosing origin. Those jobs, and everything downstream of
    /// them, are off limits to the spliced subgraph.
    fn check_not_awaiting_origin(&self, origin: JobId, replace: &Flow) -> Result<()> {
        let mut blocked: HashSet<JobId> = HashSet::new();
        let mut current = Some(origin);
        while let Some(id) = current {
            blocked.insert(id);
            blocked.extend(self.graph.descendants_of(&id));
            current = self.parent_of(&id);
        }

        let producers = replace
            .jobs()
            .into_iter()
            .flat_map(|job| job.dependencies())
            .chain(replace.output_producers());
        for producer in producers {
            if blocked.contains(&producer) {
                let name = self.job_name(&producer).unwrap_or("<unknown>");
                return Err(FlowdagError::UnresolvableReference(format!(
                    "expansion references job '{name}', which waits on the expansion itself"
                )));
            }
        }
        Ok(())
    }

    /// Fail jobs that can never make progress.
    ///
    /// Only triggers when nothing is running or ready while some jobs are
    /// still pending or expanding. Returns `true` if anything was failed.
    fn fail_stalled(&mut self, step: &mut SchedulerStep) -> bool {
        let active = self
            .jobs
            .values()
            .any(|info| matches!(info.state, JobState::Running | JobState::Ready));
        if active {
            return false;
        }

        let mut stuck: Vec<(u64, JobId)> = self
            .jobs
            .values()
            .filter(|info| matches!(info.state, JobState::Pending | JobState::Expanding))
            .map(|info| (info.seq, info.id()))
            .collect();
        if stuck.is_empty() {
            return false;
        }
        stuck.sort();

        warn!(run_id = %self.run_id, stuck = stuck.len(), "no job can make progress; failing stalled jobs");
        for (_, id) in stuck {
            self.expansions.remove(&id);
            let failure = JobFailure::new(
                FailureKind::UnresolvableReference,
                "waiting on a job that can never finish",
            );
            let mut failed = self.manager().mark_failed(id, failure);
            step.newly_failed.append(&mut failed);
        }
        true
    }

    /// Complete every expansion whose members are all terminal.
    ///
    /// Returns `true` if at least one expansion was completed.
    fn settle_expansions(&mut self, step: &mut SchedulerStep) -> bool {
        let mut done: Vec<(u64, JobId)> = self
            .expansions
            .iter()
            .filter(|(_, exp)| {
                exp.members.iter().all(|m| {
                    self.jobs
                        .get(m)
                        .is_some_and(|info| info.state.is_terminal())
                })
            })
            .map(|(origin, exp)| (exp.origin_seq, *origin))
            .collect();

        if done.is_empty() {
            return false;
        }
        done.sort();

        for (_, origin) in done {
            self.finish_expansion(origin, step);
        }
        true
    }

    fn finish_expansion(&mut self, origin: JobId, step: &mut SchedulerStep) {
        let Some(exp) = self.expansions.remove(&origin) else {
            return;
        };

        let result = if exp.output.is_empty() {
            Ok(exp.value.unwrap_or(Value::Null))
        } else {
            let mut map = Map::new();
            let mut err = None;
            for (key, input) in &exp.output {
                match input.resolve(&self.store) {
                    Ok(v) => {
                        map.insert(key.clone(), v);
                    }
                    Err(e) => {
                        err = Some((key.clone(), e));
                        break;
                    }
                }
            }
            match err {
                None => Ok(Value::Object(map)),
                Some(e) => Err(e),
            }
        };

        match result {
            Ok(value) => {
                debug!(job_id = %origin.short(), "expanded subgraph complete");
                self.mark_succeeded(origin, value, step);
            }
            Err((key, e)) => {
                let kind = if self.cancelled {
                    FailureKind::Cancelled
                } else {
                    FailureKind::UpstreamFailure
                };
                let failure =
                    JobFailure::new(kind, format!("expansion output '{key}' unreachable: {e}"))
                        .with_cause(e.producer());
                let mut failed = self.manager().mark_failed(origin, failure);
                step.newly_failed.append(&mut failed);
            }
        }
    }
}
