use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use flowdag::dag::ScheduledJob;
use flowdag::engine::RuntimeEvent;
use flowdag::errors::{FlowdagError, Result};
use flowdag::exec::{ExecutorBackend, invoke};
use tokio::sync::mpsc;

/// One dispatch seen by the fake executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatch {
    pub name: String,
    pub attempt: u32,
}

/// A fake executor that:
/// - records which jobs were dispatched, in order
/// - runs each callable inline, one at a time, and reports `JobFinished`.
///
/// Running inline makes the dispatch order fully deterministic.
pub struct FakeExecutor {
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    dispatched: Arc<Mutex<Vec<Dispatch>>>,
}

impl FakeExecutor {
    pub fn new(runtime_tx: mpsc::Sender<RuntimeEvent>, dispatched: Arc<Mutex<Vec<Dispatch>>>) -> Self {
        Self {
            runtime_tx,
            dispatched,
        }
    }

    /// Factory for `Runner::run_with_backend`, sharing the dispatch log.
    pub fn factory(
        dispatched: Arc<Mutex<Vec<Dispatch>>>,
    ) -> impl FnOnce(mpsc::Sender<RuntimeEvent>) -> FakeExecutor {
        move |tx| FakeExecutor::new(tx, dispatched)
    }
}

impl ExecutorBackend for FakeExecutor {
    fn dispatch(
        &mut self,
        jobs: Vec<ScheduledJob>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let tx = self.runtime_tx.clone();
        let dispatched = Arc::clone(&self.dispatched);

        Box::pin(async move {
            for job in jobs {
                {
                    let mut guard = dispatched.lock().unwrap();
                    guard.push(Dispatch {
                        name: job.name.clone(),
                        attempt: job.attempt,
                    });
                }

                let id = job.id;
                let attempt = job.attempt;
                let result = invoke(job).await;

                tx.send(RuntimeEvent::JobFinished {
                    job: id,
                    attempt,
                    result,
                })
                .await
                .map_err(|e| FlowdagError::Other(anyhow::anyhow!("runtime gone: {e}")))?;
            }
            Ok(())
        })
    }
}

/// Names of the dispatched jobs, in order.
pub fn dispatched_names(log: &Arc<Mutex<Vec<Dispatch>>>) -> Vec<String> {
    log.lock().unwrap().iter().map(|d| d.name.clone()).collect()
}
