//! Configuration for colloquy.
//!
//! Provides the [`ColloquyConfig`] struct, constructible manually or from the
//! environment via [`ColloquyConfig::from_env`]. All numeric settings are
//! validated to be positive at startup; a missing provider credential is not
//! an error — it degrades the generation driver to disabled mode.

use std::env;
use std::error::Error;
use std::fmt;
use std::time::Duration;

use crate::colloquy::scheduler::SchedulerConfig;

/// Environment variable holding the generation-provider credential.
pub const ENV_API_KEY: &str = "OPEN_AI_SECRET";
/// Environment variable overriding the model identifier.
pub const ENV_MODEL: &str = "COLLOQUY_MODEL";
/// Environment variable overriding the per-conversation advance interval (ms).
pub const ENV_MIN_ADVANCE_INTERVAL_MS: &str = "COLLOQUY_MIN_ADVANCE_INTERVAL_MS";
/// Environment variable overriding the scheduler sweep interval (ms).
pub const ENV_SWEEP_INTERVAL_MS: &str = "COLLOQUY_SWEEP_INTERVAL_MS";
/// Environment variable overriding the goal-check cadence (message count).
pub const ENV_GOAL_CHECK_EVERY: &str = "COLLOQUY_GOAL_CHECK_EVERY";
/// Environment variable overriding the self-disable failure threshold.
pub const ENV_MAX_CONSECUTIVE_FAILURES: &str = "COLLOQUY_MAX_CONSECUTIVE_FAILURES";

/// Errors produced while validating configuration.
#[derive(Debug, Clone)]
pub enum ConfigError {
    /// A setting was present but malformed or non-positive.
    Invalid { variable: &'static str, value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Invalid { variable, value } => {
                write!(f, "{} must be a positive integer, got '{}'", variable, value)
            }
        }
    }
}

impl Error for ConfigError {}

/// Startup configuration for the scheduler and generation driver.
#[derive(Clone, Debug)]
pub struct ColloquyConfig {
    /// Minimum time between two generation steps of one conversation, in ms.
    pub min_advance_interval_ms: u64,
    /// How often the scheduler sweeps, in ms.
    pub sweep_interval_ms: u64,
    /// Issue a goal-evaluation request every N appended messages.
    pub goal_check_every: usize,
    /// Disable the generation driver after this many consecutive failures.
    pub max_consecutive_failures: usize,
    /// Provider credential. `None` degrades generation to disabled mode.
    pub api_key: Option<String>,
    /// Model identifier passed to the provider client.
    pub model: String,
}

impl Default for ColloquyConfig {
    fn default() -> Self {
        Self {
            min_advance_interval_ms: 5_000,
            sweep_interval_ms: 1_000,
            goal_check_every: 5,
            max_consecutive_failures: 3,
            api_key: None,
            model: "gpt-4.1-mini".to_string(),
        }
    }
}

impl ColloquyConfig {
    /// Read and validate configuration from the environment. Unset variables
    /// fall back to the defaults; set-but-invalid variables are rejected.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            min_advance_interval_ms: read_positive(
                ENV_MIN_ADVANCE_INTERVAL_MS,
                defaults.min_advance_interval_ms,
            )?,
            sweep_interval_ms: read_positive(ENV_SWEEP_INTERVAL_MS, defaults.sweep_interval_ms)?,
            goal_check_every: read_positive(ENV_GOAL_CHECK_EVERY, defaults.goal_check_every as u64)?
                as usize,
            max_consecutive_failures: read_positive(
                ENV_MAX_CONSECUTIVE_FAILURES,
                defaults.max_consecutive_failures as u64,
            )? as usize,
            api_key: env::var(ENV_API_KEY).ok().filter(|k| !k.trim().is_empty()),
            model: env::var(ENV_MODEL).unwrap_or(defaults.model),
        })
    }

    /// Scheduler timing derived from this configuration.
    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            sweep_interval: Duration::from_millis(self.sweep_interval_ms),
            min_advance_interval: Duration::from_millis(self.min_advance_interval_ms),
        }
    }
}

fn read_positive(variable: &'static str, default: u64) -> Result<u64, ConfigError> {
    match env::var(variable) {
        Ok(raw) => match raw.trim().parse::<u64>() {
            Ok(value) if value > 0 => Ok(value),
            _ => Err(ConfigError::Invalid {
                variable,
                value: raw,
            }),
        },
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_positive() {
        let config = ColloquyConfig::default();
        assert!(config.min_advance_interval_ms > 0);
        assert!(config.sweep_interval_ms > 0);
        assert!(config.goal_check_every > 0);
        assert!(config.max_consecutive_failures > 0);
        assert!(config.api_key.is_none());
    }

    #[test]
    fn scheduler_config_carries_intervals() {
        let config = ColloquyConfig {
            min_advance_interval_ms: 250,
            sweep_interval_ms: 100,
            ..Default::default()
        };
        let scheduler = config.scheduler_config();
        assert_eq!(scheduler.sweep_interval, Duration::from_millis(100));
        assert_eq!(scheduler.min_advance_interval, Duration::from_millis(250));
    }
}
