// src/exec/job_runner.rs

//! Individual callable invocation.

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::dag::ScheduledJob;
use crate::engine::RuntimeEvent;
use crate::response::Response;

/// Run one attempt of a job and emit its `JobFinished` event.
pub async fn run_job(job: ScheduledJob, runtime_tx: mpsc::Sender<RuntimeEvent>) {
    let id = job.id;
    let attempt = job.attempt;
    let name = job.name.clone();

    let result = invoke(job).await;

    if let Err(e) = runtime_tx
        .send(RuntimeEvent::JobFinished {
            job: id,
            attempt,
            result,
        })
        .await
    {
        error!(
            job = %name,
            attempt,
            error = %e,
            "failed to report job completion to runtime"
        );
    }
}

/// Wait for the job's backoff delay, then invoke its callable.
///
/// The callable runs on its own Tokio task so that a panic is reported as
/// an ordinary callable error instead of tearing down the executor.
pub async fn invoke(job: ScheduledJob) -> Result<Response, String> {
    if !job.delay.is_zero() {
        debug!(job = %job.name, delay = ?job.delay, "waiting before retry");
        tokio::time::sleep(job.delay).await;
    }

    info!(
        job = %job.name,
        job_id = %job.id.short(),
        run_id = %job.run_id,
        attempt = job.attempt,
        "invoking callable"
    );

    let ctx = job.context();
    let callable = job.callable;
    let inputs = job.inputs;

    match tokio::spawn(async move { callable.call(inputs, ctx).await }).await {
        Ok(Ok(response)) => Ok(response),
        Ok(Err(err)) => {
            warn!(job = %job.name, attempt = job.attempt, error = %err, "callable returned an error");
            Err(format!("{err:#}"))
        }
        Err(join_err) => {
            error!(job = %job.name, attempt = job.attempt, error = %join_err, "callable panicked");
            Err(format!("callable panicked: {join_err}"))
        }
    }
}
