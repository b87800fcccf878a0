// src/store.rs

//! Run-scoped result store.
//!
//! Maps each job id to its terminal record. Entries are write-once: the
//! scheduler records a job exactly once, when it reaches a terminal state,
//! and never overwrites it afterwards. Once a run has finished the store is
//! handed out by value (inside the run report) and can be shared freely
//! between readers.

use std::collections::HashMap;

use serde_json::Value;
use tracing::warn;

use crate::errors::JobFailure;
use crate::types::JobId;

/// Terminal record for one job.
#[derive(Debug, Clone, PartialEq)]
pub enum JobRecord {
    Succeeded(Value),
    Failed(JobFailure),
}

#[derive(Debug, Clone, Default)]
pub struct ResultStore {
    records: HashMap<JobId, JobRecord>,
}

impl ResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the terminal result of a job.
    ///
    /// Returns `false` (and leaves the store untouched) if the job already
    /// has a record.
    pub fn insert(&mut self, job: JobId, record: JobRecord) -> bool {
        if self.records.contains_key(&job) {
            warn!(job_id = %job.short(), "result store already holds a record; ignoring write");
            return false;
        }
        self.records.insert(job, record);
        true
    }

    pub fn get(&self, job: &JobId) -> Option<&JobRecord> {
        self.records.get(job)
    }

    /// The successful result of `job`, if any.
    pub fn value_of(&self, job: &JobId) -> Option<&Value> {
        match self.records.get(job) {
            Some(JobRecord::Succeeded(v)) => Some(v),
            _ => None,
        }
    }

    /// The failure record of `job`, if any.
    pub fn failure_of(&self, job: &JobId) -> Option<&JobFailure> {
        match self.records.get(job) {
            Some(JobRecord::Failed(f)) => Some(f),
            _ => None,
        }
    }

    pub fn is_succeeded(&self, job: &JobId) -> bool {
        matches!(self.records.get(job), Some(JobRecord::Succeeded(_)))
    }

    pub fn contains(&self, job: &JobId) -> bool {
        self.records.contains_key(job)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&JobId, &JobRecord)> {
        self.records.iter()
    }

    /// Drop every failure record, keeping successful results.
    ///
    /// Used when a previous run's store seeds a new run: succeeded jobs are
    /// reused, failed ones get another chance.
    pub fn retain_succeeded(&mut self) {
        self.records
            .retain(|_, record| matches!(record, JobRecord::Succeeded(_)));
    }
}
