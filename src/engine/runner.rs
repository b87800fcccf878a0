// src/engine/runner.rs

//! User-facing entry point for executing a flow.

use tokio::sync::mpsc;
use tracing::info;

use crate::dag::{Flow, Scheduler};
use crate::engine::core::CoreRuntime;
use crate::engine::report::RunReport;
use crate::engine::retry::RetryPolicy;
use crate::engine::runtime::Runtime;
use crate::engine::RuntimeEvent;
use crate::errors::Result;
use crate::exec::{ExecutorBackend, TokioExecutor};
use crate::store::ResultStore;
use crate::types::RunId;

/// Tunables for a run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunnerConfig {
    /// Maximum number of jobs running at once.
    pub max_workers: usize,
    pub retry: RetryPolicy,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_workers: 4,
            retry: RetryPolicy::default(),
        }
    }
}

/// Requests cooperative cancellation of a run from another task.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: mpsc::Sender<RuntimeEvent>,
}

impl CancelHandle {
    /// Ask the run to stop. Returns `false` if the run already ended.
    pub async fn cancel(&self) -> bool {
        self.tx.send(RuntimeEvent::CancelRequested).await.is_ok()
    }

    /// Non-async variant for signal handlers and synchronous callers.
    pub fn try_cancel(&self) -> bool {
        self.tx.try_send(RuntimeEvent::CancelRequested).is_ok()
    }
}

/// Executes flows.
///
/// A runner drives exactly one run; obtain a [`CancelHandle`] before
/// calling one of the `run*` methods if the run may need to be stopped.
pub struct Runner {
    config: RunnerConfig,
    run_id: RunId,
    event_tx: mpsc::Sender<RuntimeEvent>,
    event_rx: mpsc::Receiver<RuntimeEvent>,
}

impl std::fmt::Debug for Runner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runner")
            .field("config", &self.config)
            .field("run_id", &self.run_id)
            .finish_non_exhaustive()
    }
}

impl Default for Runner {
    fn default() -> Self {
        Self::new(RunnerConfig::default())
    }
}

impl Runner {
    pub fn new(config: RunnerConfig) -> Self {
        let (event_tx, event_rx) = mpsc::channel::<RuntimeEvent>(256);
        Self {
            config,
            run_id: RunId::new(),
            event_tx,
            event_rx,
        }
    }

    pub fn with_run_id(mut self, run_id: RunId) -> Self {
        self.run_id = run_id;
        self
    }

    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            tx: self.event_tx.clone(),
        }
    }

    /// Execute `flow` from scratch.
    pub async fn run(self, flow: &Flow) -> Result<RunReport> {
        self.run_with_store(flow, ResultStore::new()).await
    }

    /// Execute `flow`, reusing every job that already succeeded in `store`.
    pub async fn run_with_store(self, flow: &Flow, store: ResultStore) -> Result<RunReport> {
        self.run_with_backend(flow, store, TokioExecutor::new).await
    }

    /// Execute `flow` on a custom executor backend.
    ///
    /// `make_backend` receives the sender the backend must report
    /// `RuntimeEvent::JobFinished` events on.
    pub async fn run_with_backend<E, F>(
        self,
        flow: &Flow,
        store: ResultStore,
        make_backend: F,
    ) -> Result<RunReport>
    where
        E: ExecutorBackend,
        F: FnOnce(mpsc::Sender<RuntimeEvent>) -> E,
    {
        let Runner {
            config,
            run_id,
            event_tx,
            event_rx,
        } = self;

        let mut scheduler = Scheduler::new(run_id, config.max_workers).with_store(store);
        scheduler.register_flow(flow)?;

        info!(
            %run_id,
            flow = %flow.name(),
            jobs = scheduler.job_count(),
            max_workers = config.max_workers,
            fingerprint = %flow.fingerprint(),
            "starting run"
        );

        let backend = make_backend(event_tx);
        let core = CoreRuntime::new(scheduler, config.retry);
        let scheduler = Runtime::new(core, event_rx, backend).run().await?;

        let report = RunReport::from_scheduler(flow, scheduler);
        info!(
            %run_id,
            status = report.status.as_str(),
            failures = report.failures.len(),
            filtered = report.filtered.len(),
            "run finished"
        );
        Ok(report)
    }
}
