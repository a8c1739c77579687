//! # Orchestrator Configuration
//!
//! Layered configuration for the job engine: built-in defaults, then an optional
//! file (`jobs.toml` unless a path is given), then `JOBS_*` environment variables
//! (nested keys use `__`, e.g. `JOBS_RETRY__MAX_ATTEMPTS=5`).

use crate::constants::defaults;
use crate::error::{JobsError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Bounded exponential retry applied to infrastructure failures
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: defaults::RETRY_MAX_ATTEMPTS,
            base_delay_ms: defaults::RETRY_BASE_DELAY_MS,
            max_delay_ms: defaults::RETRY_MAX_DELAY_MS,
            multiplier: defaults::RETRY_MULTIPLIER,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Workers available to a job with normal parallelism
    pub worker_count: usize,
    /// Workers available to a job with limited parallelism
    pub limited_worker_count: usize,
    /// Object references per batch handed to `Plugin::execute`
    pub batch_size: usize,
    /// Identifiers fetched per index page while resolving a selection
    pub index_page_size: usize,
    /// Abort a batch whose `execute` runs longer than this
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_timeout_ms: Option<u64>,
    /// Flush pending index writes before reads that depend on them
    pub commit_index_before_resolve: bool,
    /// Finished jobs kept in memory; older ones are answered from the job store
    pub retained_finished_jobs: usize,
    pub retry: RetryConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            worker_count: defaults::WORKER_COUNT,
            limited_worker_count: defaults::LIMITED_WORKER_COUNT,
            batch_size: defaults::BATCH_SIZE,
            index_page_size: defaults::INDEX_PAGE_SIZE,
            batch_timeout_ms: None,
            commit_index_before_resolve: true,
            retained_finished_jobs: defaults::RETAINED_FINISHED_JOBS,
            retry: RetryConfig::default(),
        }
    }
}

impl OrchestratorConfig {
    /// Load defaults, `jobs.toml` from the working directory if present, then the environment
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load with an explicit configuration file
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let default_source = config::Config::try_from(&OrchestratorConfig::default())?;

        let file = match path {
            Some(path) => config::File::from(path).required(true),
            None => config::File::with_name(defaults::CONFIG_FILE).required(false),
        };

        let loaded: OrchestratorConfig = config::Config::builder()
            .add_source(default_source)
            .add_source(file)
            .add_source(
                config::Environment::with_prefix(defaults::ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        loaded.validate()?;
        debug!(config = ?loaded, "Orchestrator configuration loaded");
        Ok(loaded)
    }

    pub fn validate(&self) -> Result<()> {
        if self.worker_count == 0 || self.limited_worker_count == 0 {
            return Err(JobsError::Configuration(
                "worker counts must be greater than zero".to_string(),
            ));
        }
        if self.batch_size == 0 {
            return Err(JobsError::Configuration(
                "batch_size must be greater than zero".to_string(),
            ));
        }
        if self.index_page_size == 0 {
            return Err(JobsError::Configuration(
                "index_page_size must be greater than zero".to_string(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(JobsError::Configuration(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.retry.multiplier < 1.0 {
            return Err(JobsError::Configuration(format!(
                "retry.multiplier must be >= 1.0, got {}",
                self.retry.multiplier
            )));
        }
        Ok(())
    }

    pub fn batch_timeout(&self) -> Option<Duration> {
        self.batch_timeout_ms.map(Duration::from_millis)
    }
}
