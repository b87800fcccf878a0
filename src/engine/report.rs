// src/engine/report.rs

//! What a finished run hands back to its driver.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde_json::{Value, json};

use crate::dag::{Flow, JobState, Scheduler};
use crate::errors::FailureKind;
use crate::store::ResultStore;
use crate::types::{JobId, RunId};

/// Overall verdict of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// Every declared flow output resolved. Individual jobs may still have
    /// failed on branches the outputs do not depend on.
    Succeeded,
    /// At least one declared flow output is unreachable.
    Failed,
    /// The run was cancelled before it finished.
    Cancelled,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Succeeded => "succeeded",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
        }
    }
}

/// One failed job, with the chain of jobs that led to it.
#[derive(Debug, Clone, PartialEq)]
pub struct FailureEntry {
    pub job_id: JobId,
    pub job: String,
    pub kind: FailureKind,
    pub message: String,
    pub attempts: u32,
    /// Job names from the root cause down to this job.
    pub chain: Vec<String>,
}

/// Result of a run: resolved outputs plus a per-job account of what failed.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: RunId,
    pub flow: String,
    pub status: RunStatus,
    /// Declared flow outputs that resolved.
    pub outputs: BTreeMap<String, Value>,
    /// Declared flow outputs that did not resolve, with the reason.
    pub unreachable: BTreeMap<String, String>,
    /// Failed jobs in registration order.
    pub failures: Vec<FailureEntry>,
    /// Candidate labels that screening jobs chose not to expand.
    pub filtered: Vec<String>,
    pub states: HashMap<JobId, JobState>,
    /// Callable invocations per job (0 for reused or never-started jobs).
    pub attempts: HashMap<JobId, u32>,
    pub reused: HashSet<JobId>,
    pub job_names: HashMap<JobId, String>,
    pub store: ResultStore,
}

impl RunReport {
    /// Build the report for `flow` from a scheduler whose run has ended.
    pub fn from_scheduler(flow: &Flow, scheduler: Scheduler) -> Self {
        let (outputs, unresolved) = scheduler.resolve_output(flow.output());
        let unreachable: BTreeMap<String, String> = unresolved
            .into_iter()
            .map(|(key, err)| (key, err.to_string()))
            .collect();

        let order = scheduler.job_ids();
        let mut states = HashMap::new();
        let mut attempts = HashMap::new();
        let mut reused = HashSet::new();
        let mut job_names = HashMap::new();

        for id in &order {
            if let Some(state) = scheduler.state_of(id) {
                states.insert(*id, state);
            }
            attempts.insert(*id, scheduler.attempts_of(id).unwrap_or(0));
            if scheduler.was_reused(id) {
                reused.insert(*id);
            }
            if let Some(name) = scheduler.job_name(id) {
                job_names.insert(*id, name.to_string());
            }
        }

        let store = scheduler.store();
        let failures = order
            .iter()
            .filter_map(|id| {
                let failure = store.failure_of(id)?;
                Some(FailureEntry {
                    job_id: *id,
                    job: job_names.get(id).cloned().unwrap_or_else(|| id.short()),
                    kind: failure.kind,
                    message: failure.message.clone(),
                    attempts: failure.attempts,
                    chain: failure_chain(store, &job_names, *id),
                })
            })
            .collect();

        let status = if scheduler.is_cancelled() {
            RunStatus::Cancelled
        } else if !unreachable.is_empty() {
            RunStatus::Failed
        } else {
            RunStatus::Succeeded
        };

        let run_id = scheduler.run_id();
        let filtered = scheduler.filtered().to_vec();
        let store = scheduler.into_store();

        Self {
            run_id,
            flow: flow.name().to_string(),
            status,
            outputs,
            unreachable,
            failures,
            filtered,
            states,
            attempts,
            reused,
            job_names,
            store,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Succeeded
    }

    pub fn output(&self, name: &str) -> Option<&Value> {
        self.outputs.get(name)
    }

    pub fn value_of(&self, id: &JobId) -> Option<&Value> {
        self.store.value_of(id)
    }

    pub fn state_of(&self, id: &JobId) -> Option<JobState> {
        self.states.get(id).copied()
    }

    pub fn attempts_of(&self, id: &JobId) -> u32 {
        self.attempts.get(id).copied().unwrap_or(0)
    }

    pub fn failure_of(&self, id: &JobId) -> Option<&FailureEntry> {
        self.failures.iter().find(|f| f.job_id == *id)
    }

    /// Failures that originated in the job itself rather than upstream.
    pub fn root_failures(&self) -> impl Iterator<Item = &FailureEntry> {
        self.failures
            .iter()
            .filter(|f| f.kind != FailureKind::UpstreamFailure)
    }

    /// Number of callable invocations across the whole run.
    pub fn total_attempts(&self) -> u32 {
        self.attempts.values().sum()
    }

    /// JSON rendering for the CLI.
    pub fn to_json(&self) -> Value {
        let failures: Vec<Value> = self
            .failures
            .iter()
            .map(|f| {
                json!({
                    "job": f.job,
                    "job_id": f.job_id.to_string(),
                    "kind": f.kind.as_str(),
                    "message": f.message,
                    "attempts": f.attempts,
                    "chain": f.chain,
                })
            })
            .collect();

        json!({
            "run_id": self.run_id.to_string(),
            "flow": self.flow,
            "status": self.status.as_str(),
            "outputs": self.outputs,
            "unreachable": self.unreachable,
            "failures": failures,
            "filtered": self.filtered,
            "jobs": self.states.len(),
            "reused": self.reused.len(),
        })
    }
}

/// Follow `cause` links from `id` back to the root failure.
fn failure_chain(
    store: &ResultStore,
    names: &HashMap<JobId, String>,
    id: JobId,
) -> Vec<String> {
    let mut chain = Vec::new();
    let mut seen = HashSet::new();
    let mut current = Some(id);

    while let Some(job) = current {
        if !seen.insert(job) {
            break;
        }
        chain.push(names.get(&job).cloned().unwrap_or_else(|| job.short()));
        current = store.failure_of(&job).and_then(|f| f.cause);
    }

    chain.reverse();
    chain
}
