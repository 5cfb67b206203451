//! Orchestrator configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::errors::ConfigError;
use crate::generation::{CallOptions, RetryConfig};
use crate::scoring::ScoringConfig;

/// Tunables for one orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Number of specs generated concurrently in stage 3.
    #[serde(default = "default_spec_batch_size")]
    pub spec_batch_size: usize,
    /// Sampling options per structured call kind.
    #[serde(default)]
    pub generation: CallOptions,
    /// How long stage 4 waits for specs before substituting placeholders.
    #[serde(default = "default_spec_wait_timeout_ms")]
    pub spec_wait_timeout_ms: u64,
    /// How long stage 5 waits for evaluations before a fallback selection.
    #[serde(default = "default_evaluation_wait_timeout_ms")]
    pub evaluation_wait_timeout_ms: u64,
    /// Delay before stage 6 completes.
    #[serde(default = "default_packaging_delay_ms")]
    pub packaging_delay_ms: u64,
    /// Composite score weights and penalties.
    #[serde(default)]
    pub scoring: ScoringConfig,
    /// Rate-limit retry policy for provider calls.
    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_spec_batch_size() -> usize {
    3
}

fn default_spec_wait_timeout_ms() -> u64 {
    3000
}

fn default_evaluation_wait_timeout_ms() -> u64 {
    3000
}

fn default_packaging_delay_ms() -> u64 {
    500
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            spec_batch_size: default_spec_batch_size(),
            generation: CallOptions::default(),
            spec_wait_timeout_ms: default_spec_wait_timeout_ms(),
            evaluation_wait_timeout_ms: default_evaluation_wait_timeout_ms(),
            packaging_delay_ms: default_packaging_delay_ms(),
            scoring: ScoringConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

impl OrchestratorConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the UI spec batch size.
    #[must_use]
    pub fn with_spec_batch_size(mut self, size: usize) -> Self {
        self.spec_batch_size = size;
        self
    }

    /// Sets the per-call generation options.
    #[must_use]
    pub fn with_generation(mut self, generation: CallOptions) -> Self {
        self.generation = generation;
        self
    }

    /// Sets the UI spec wait timeout.
    #[must_use]
    pub fn with_spec_wait_timeout_ms(mut self, ms: u64) -> Self {
        self.spec_wait_timeout_ms = ms;
        self
    }

    /// Sets the evaluation wait timeout.
    #[must_use]
    pub fn with_evaluation_wait_timeout_ms(mut self, ms: u64) -> Self {
        self.evaluation_wait_timeout_ms = ms;
        self
    }

    /// Sets the packaging delay.
    #[must_use]
    pub fn with_packaging_delay_ms(mut self, ms: u64) -> Self {
        self.packaging_delay_ms = ms;
        self
    }

    /// Sets the scoring configuration.
    #[must_use]
    pub fn with_scoring(mut self, scoring: ScoringConfig) -> Self {
        self.scoring = scoring;
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Parses and validates a JSON configuration.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON configuration file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Checks every field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.spec_batch_size == 0 {
            return Err(ConfigError::invalid("spec_batch_size", "must be at least 1"));
        }
        self.generation.validate()?;
        self.scoring.validate()?;
        self.retry.validate()
    }

    /// Stage 4 wait as a duration.
    #[must_use]
    pub const fn spec_wait_timeout(&self) -> Duration {
        Duration::from_millis(self.spec_wait_timeout_ms)
    }

    /// Stage 5 wait as a duration.
    #[must_use]
    pub const fn evaluation_wait_timeout(&self) -> Duration {
        Duration::from_millis(self.evaluation_wait_timeout_ms)
    }

    /// Stage 6 delay as a duration.
    #[must_use]
    pub const fn packaging_delay(&self) -> Duration {
        Duration::from_millis(self.packaging_delay_ms)
    }
}
