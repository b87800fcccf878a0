// src/dag/mod.rs

//! Job graph representation and scheduling.
//!
//! - [`reference`] and [`input`] describe how a job's inputs point at other
//!   jobs' (future) outputs.
//! - [`job`] and [`flow`] are the user-facing building blocks.
//! - [`graph`] holds the job dependency graph and the acyclicity check.
//! - [`scheduler`] contains the per-run state machine that decides
//!   which jobs are ready to run, and splices in dynamic expansions.
//! - [`job_info`] provides per-job run state and scheduled job types.
//! - [`scheduler_step`] defines the result type for scheduler steps.
//! - [`state_manager`] manages per-run state transitions.

pub mod flow;
pub mod graph;
pub mod input;
pub mod job;
pub mod job_info;
pub mod reference;
pub mod scheduler;
pub mod scheduler_step;
pub mod state_manager;

pub use crate::types::{JobId, RunId};
pub use flow::{Flow, Node};
pub use graph::{JobGraph, check_acyclic};
pub use input::Input;
pub use job::{Callable, Job, JobContext, JobInputs, async_callable, fn_callable};
pub use job_info::{JobState, ScheduledJob};
pub use reference::{AttrPath, OutputReference, ResolveError};
pub use scheduler::Scheduler;
pub use scheduler_step::SchedulerStep;
