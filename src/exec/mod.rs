// src/exec/mod.rs

//! Callable execution layer.
//!
//! This module is responsible for actually invoking the callables behind
//! scheduled jobs on the Tokio runtime, and reporting back to the
//! orchestration runtime via `RuntimeEvent`s.
//!
//! - [`executor_loop`] owns the main executor loop which tracks in-flight jobs.
//! - [`job_runner`] handles a single callable invocation.
//! - [`backend`] provides the `ExecutorBackend` trait and a concrete
//!   `TokioExecutor` that the runtime uses in production, and which
//!   tests can replace with a fake implementation.

pub mod backend;
pub mod executor_loop;
pub mod job_runner;

pub use backend::{ExecutorBackend, TokioExecutor};
pub use executor_loop::spawn_executor;
pub use job_runner::invoke;
