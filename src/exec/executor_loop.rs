// src/exec/executor_loop.rs

//! Main executor loop that manages in-flight callable invocations.

use std::collections::HashMap;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::dag::ScheduledJob;
use crate::engine::RuntimeEvent;
use crate::exec::job_runner::run_job;
use crate::types::JobId;

/// Internal handle for a currently-running invocation.
struct ActiveJob {
    attempt: u32,
    handle: JoinHandle<()>,
}

/// Spawn the background executor loop.
///
/// The returned `mpsc::Sender<ScheduledJob>` is what `TokioExecutor` uses to
/// hand over jobs. Each scheduled job is executed in its own Tokio task, and
/// **per job id there is never more than one invocation in flight**: a
/// request for an attempt that is already running is ignored.
pub fn spawn_executor(runtime_tx: mpsc::Sender<RuntimeEvent>) -> mpsc::Sender<ScheduledJob> {
    let (tx, mut rx) = mpsc::channel::<ScheduledJob>(64);

    tokio::spawn(async move {
        info!("executor loop started");

        let mut active: HashMap<JobId, ActiveJob> = HashMap::new();

        while let Some(job) = rx.recv().await {
            active.retain(|_, a| !a.handle.is_finished());
            handle_scheduled_job(job, &mut active, &runtime_tx);
        }

        info!("executor loop finished (channel closed)");
    });

    tx
}

/// Handle a newly scheduled job.
fn handle_scheduled_job(
    job: ScheduledJob,
    active: &mut HashMap<JobId, ActiveJob>,
    runtime_tx: &mpsc::Sender<RuntimeEvent>,
) {
    if let Some(existing) = active.get(&job.id) {
        if existing.attempt >= job.attempt {
            warn!(
                job = %job.name,
                attempt = job.attempt,
                running_attempt = existing.attempt,
                "job attempt already in flight; ignoring duplicate dispatch"
            );
            return;
        }
    }

    let id = job.id;
    let attempt = job.attempt;
    let name = job.name.clone();
    let rt_tx = runtime_tx.clone();

    let handle = tokio::spawn(async move {
        run_job(job, rt_tx).await;
        debug!(job = %name, attempt, "job runner future finished");
    });

    active.insert(id, ActiveJob { attempt, handle });
}
