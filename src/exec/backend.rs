// src/exec/backend.rs

//! Pluggable executor backend abstraction.
//!
//! The runtime talks to an `ExecutorBackend` instead of a raw mpsc sender.
//! This makes it easy to swap in a fake executor in tests while keeping the
//! production executor implementation in [`executor_loop`](super::executor_loop).
//!
//! - `TokioExecutor` is the default implementation used by `Runner`.
//!   It wraps the `spawn_executor` loop and just forwards scheduled jobs
//!   over an mpsc channel.
//! - Tests can provide their own `ExecutorBackend` that, for example, records
//!   which jobs were scheduled and directly emits `JobFinished` events.

use std::future::Future;
use std::pin::Pin;

use tokio::sync::mpsc;

use crate::dag::ScheduledJob;
use crate::engine::RuntimeEvent;
use crate::errors::{FlowdagError, Result};

use super::executor_loop::spawn_executor;

/// Trait abstracting how scheduled jobs are executed.
///
/// Production code uses [`TokioExecutor`]; tests can provide their own
/// implementation.
pub trait ExecutorBackend: Send {
    /// Dispatch the given jobs for execution.
    ///
    /// Every dispatched job must eventually produce exactly one
    /// `RuntimeEvent::JobFinished` carrying the job's attempt number.
    fn dispatch(
        &mut self,
        jobs: Vec<ScheduledJob>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Executor backend that runs each callable on its own Tokio task.
pub struct TokioExecutor {
    tx: mpsc::Sender<ScheduledJob>,
}

impl TokioExecutor {
    /// Create a new executor backend, wiring it to the given runtime
    /// event sender.
    ///
    /// This spawns the background executor loop immediately.
    pub fn new(runtime_tx: mpsc::Sender<RuntimeEvent>) -> Self {
        let tx = spawn_executor(runtime_tx);
        Self { tx }
    }
}

impl ExecutorBackend for TokioExecutor {
    fn dispatch(
        &mut self,
        jobs: Vec<ScheduledJob>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        // Clone the sender so the future doesn't borrow `self` across `await`.
        let tx = self.tx.clone();

        Box::pin(async move {
            for job in jobs {
                tx.send(job).await.map_err(|e| {
                    FlowdagError::Other(anyhow::anyhow!(
                        "executor loop stopped; could not dispatch job '{}'",
                        e.0.name
                    ))
                })?;
            }
            Ok(())
        })
    }
}
