// src/engine/core.rs

//! Pure core runtime state machine.
//!
//! This module contains a synchronous, deterministic "core runtime" that
//! consumes [`RuntimeEvent`]s and produces:
//! - an updated core state
//! - a list of "commands" describing what the IO shell should do next
//!
//! The async/IO-heavy shell (`engine::runtime::Runtime`) is responsible for:
//! - reading events from channels
//! - sending `ScheduledJob`s to the executor
//! - turning the finished scheduler into a run report
//!
//! The core is intended to be extensively unit tested without any Tokio,
//! channels or callables being run.

use crate::dag::Scheduler;
use crate::engine::event_handlers::{
    CoreStep, handle_cancel, handle_job_finished, handle_start,
};
use crate::engine::{RetryPolicy, RuntimeEvent};

/// Pure core runtime state.
///
/// This owns the job scheduler and the retry policy. It has **no** channels,
/// no Tokio types, and does not perform any IO.
#[derive(Debug)]
pub struct CoreRuntime {
    scheduler: Scheduler,
    retry: RetryPolicy,
}

impl CoreRuntime {
    pub fn new(scheduler: Scheduler, retry: RetryPolicy) -> Self {
        Self { scheduler, retry }
    }

    /// Dispatch the initial wave of jobs.
    pub fn start(&mut self) -> CoreStep {
        handle_start(&mut self.scheduler)
    }

    /// Handle a single runtime event, updating core state and returning the
    /// resulting commands for the IO shell.
    pub fn step(&mut self, event: RuntimeEvent) -> CoreStep {
        match event {
            RuntimeEvent::JobFinished {
                job,
                attempt,
                result,
            } => handle_job_finished(&mut self.scheduler, &self.retry, job, attempt, result),
            RuntimeEvent::CancelRequested => handle_cancel(&mut self.scheduler),
        }
    }

    /// Expose whether every job is terminal (for tests).
    pub fn is_finished(&self) -> bool {
        self.scheduler.is_finished()
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn into_scheduler(self) -> Scheduler {
        self.scheduler
    }
}
