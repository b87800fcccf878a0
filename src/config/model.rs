// src/config/model.rs

use std::time::Duration;

use serde::Deserialize;

use crate::engine::{RetryPolicy, RunnerConfig};

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [runner]
/// max_workers = 4
/// max_retries = 2
/// retry_backoff_ms = 100
/// backoff_multiplier = 2.0
/// max_backoff_ms = 5000
///
/// [screening]
/// threshold = 0.5
/// ```
///
/// All sections are optional and have reasonable defaults. This is the
/// unvalidated form; convert it with `ConfigFile::try_from`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfigFile {
    #[serde(default)]
    pub runner: RunnerSection,

    #[serde(default)]
    pub screening: ScreeningSection,
}

/// `[runner]` section: concurrency and retry behaviour.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunnerSection {
    /// Maximum number of jobs running at once.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Retries for a failing callable after its first attempt.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

fn default_max_workers() -> usize {
    4
}

fn default_max_retries() -> u32 {
    2
}

fn default_retry_backoff_ms() -> u64 {
    100
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_max_backoff_ms() -> u64 {
    5000
}

impl Default for RunnerSection {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

/// `[screening]` section.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScreeningSection {
    /// Candidates pass when their score is strictly greater than this.
    #[serde(default = "default_threshold")]
    pub threshold: f64,
}

fn default_threshold() -> f64 {
    0.5
}

impl Default for ScreeningSection {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
        }
    }
}

/// Validated configuration.
///
/// Only constructible through `TryFrom<RawConfigFile>` (or `Default`), so
/// holding one means the invariants in `validate.rs` hold.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigFile {
    pub runner: RunnerSection,
    pub screening: ScreeningSection,
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self::new_unchecked(RunnerSection::default(), ScreeningSection::default())
    }
}

impl ConfigFile {
    pub(crate) fn new_unchecked(runner: RunnerSection, screening: ScreeningSection) -> Self {
        Self { runner, screening }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.runner.max_retries,
            initial_backoff: Duration::from_millis(self.runner.retry_backoff_ms),
            multiplier: self.runner.backoff_multiplier,
            max_backoff: Duration::from_millis(self.runner.max_backoff_ms),
        }
    }

    pub fn runner_config(&self) -> RunnerConfig {
        RunnerConfig {
            max_workers: self.runner.max_workers,
            retry: self.retry_policy(),
        }
    }
}
