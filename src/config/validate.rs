// src/config/validate.rs

use crate::config::model::{ConfigFile, RawConfigFile, RunnerSection, ScreeningSection};
use crate::errors::{FlowdagError, Result};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = FlowdagError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw.runner, raw.screening))
    }
}

/// Check every invariant of a raw config.
pub fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    validate_runner(&cfg.runner)?;
    validate_screening(&cfg.screening)?;
    Ok(())
}

fn validate_runner(runner: &RunnerSection) -> Result<()> {
    if runner.max_workers == 0 {
        return Err(FlowdagError::config(
            "[runner].max_workers must be >= 1 (got 0)",
        ));
    }

    if !runner.backoff_multiplier.is_finite() || runner.backoff_multiplier < 1.0 {
        return Err(FlowdagError::config(format!(
            "[runner].backoff_multiplier must be a finite number >= 1.0 (got {})",
            runner.backoff_multiplier
        )));
    }

    if runner.max_backoff_ms < runner.retry_backoff_ms {
        return Err(FlowdagError::config(format!(
            "[runner].max_backoff_ms ({}) must be >= retry_backoff_ms ({})",
            runner.max_backoff_ms, runner.retry_backoff_ms
        )));
    }

    Ok(())
}

fn validate_screening(screening: &ScreeningSection) -> Result<()> {
    if !screening.threshold.is_finite() {
        return Err(FlowdagError::config(format!(
            "[screening].threshold must be finite (got {})",
            screening.threshold
        )));
    }
    Ok(())
}
