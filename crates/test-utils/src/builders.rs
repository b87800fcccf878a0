#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;

use flowdag::config::{ConfigFile, RawConfigFile};
use flowdag::dag::{Callable, Job, JobInputs, async_callable, fn_callable};
use flowdag::engine::{RetryPolicy, RunnerConfig};
use serde_json::{Value, json};

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile::default(),
        }
    }

    pub fn with_max_workers(mut self, n: usize) -> Self {
        self.config.runner.max_workers = n;
        self
    }

    pub fn with_retries(mut self, n: u32) -> Self {
        self.config.runner.max_retries = n;
        self
    }

    pub fn with_backoff_ms(mut self, initial: u64, max: u64) -> Self {
        self.config.runner.retry_backoff_ms = initial;
        self.config.runner.max_backoff_ms = max;
        self
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.config.screening.threshold = threshold;
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Runner config with immediate retries, so tests never sleep on backoff.
pub fn fast_config(max_workers: usize, max_retries: u32) -> RunnerConfig {
    RunnerConfig {
        max_workers,
        retry: RetryPolicy::immediate(max_retries),
    }
}

/// Callable returning a fixed value.
pub fn value_callable(value: Value) -> Arc<dyn Callable> {
    fn_callable("value", move |_| Ok(value.clone()))
}

/// Job returning a fixed value.
pub fn value_job(name: &str, value: Value) -> Job {
    Job::new(name, value_callable(value))
}

/// Callable returning twice its numeric input `x`.
pub fn doubling_callable() -> Arc<dyn Callable> {
    fn_callable("double", |inputs: JobInputs| Ok(json!(inputs.f64("x")? * 2.0)))
}

/// Callable summing every numeric input.
pub fn sum_callable() -> Arc<dyn Callable> {
    fn_callable("sum", |inputs: JobInputs| {
        let total: f64 = inputs.iter().filter_map(|(_, v)| v.as_f64()).sum();
        Ok(json!(total))
    })
}

/// Callable that always errors.
pub fn failing_callable(message: &'static str) -> Arc<dyn Callable> {
    fn_callable("fail", move |_| -> anyhow::Result<Value> { Err(anyhow::anyhow!(message)) })
}

/// Shared invocation counter.
#[derive(Debug, Clone, Default)]
pub struct CallCounter(Arc<AtomicU32>);

impl CallCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> u32 {
        self.0.load(Ordering::SeqCst)
    }

    fn bump(&self) -> u32 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }
}

/// Callable returning `value` and counting its invocations.
pub fn counting_callable(counter: CallCounter, value: Value) -> Arc<dyn Callable> {
    fn_callable("counting", move |_| {
        counter.bump();
        Ok(value.clone())
    })
}

/// Callable that errors on its first `failures` invocations, then returns `value`.
pub fn flaky_callable(counter: CallCounter, failures: u32, value: Value) -> Arc<dyn Callable> {
    fn_callable("flaky", move |_| {
        let call = counter.bump();
        if call <= failures {
            anyhow::bail!("transient failure #{call}");
        }
        Ok(value.clone())
    })
}

/// Callable that sleeps before returning `value`.
pub fn sleepy_callable(delay: Duration, value: Value) -> Arc<dyn Callable> {
    async_callable("sleepy", move |_, _| {
        let value = value.clone();
        async move {
            tokio::time::sleep(delay).await;
            Ok::<_, anyhow::Error>(value)
        }
    })
}

/// Tracks how many gauged callables run at the same time.
#[derive(Debug, Clone, Default)]
pub struct ConcurrencyGauge {
    active: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl ConcurrencyGauge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// Callable that holds a slot for `delay` while recording concurrency.
    pub fn callable(&self, delay: Duration) -> Arc<dyn Callable> {
        let gauge = self.clone();
        async_callable("gauge", move |_, _| {
            let gauge = gauge.clone();
            async move {
                let now = gauge.active.fetch_add(1, Ordering::SeqCst) + 1;
                gauge.peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(delay).await;
                gauge.active.fetch_sub(1, Ordering::SeqCst);
                Ok::<_, anyhow::Error>(json!(now))
            }
        })
    }
}
