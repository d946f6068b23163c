//! Reward stage configuration loaded from TOML or JSON.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tau_reward_metrics::ReduceOptions;
use tau_reward_scoring::ConcurrencyMode;
use tau_reward_types::{ConfigError, RewardFunctionConfig};

/// Settings for reward collection and metrics reduction in the training loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardStageConfig {
    pub custom_reward_function: RewardFunctionConfig,
    /// Overlap training-step scoring with the next rollout.
    pub launch_reward_fn_async: bool,
    /// Report `score` statistics from the reward vector alongside sub-rewards.
    pub include_main_score: bool,
    /// Emit a `count` statistic per signal.
    pub emit_count: bool,
    /// Upper bound on blocking scorer workers in overlapped mode.
    pub max_parallel_scorers: Option<usize>,
}

impl Default for RewardStageConfig {
    fn default() -> Self {
        Self {
            custom_reward_function: RewardFunctionConfig::default(),
            launch_reward_fn_async: false,
            include_main_score: true,
            emit_count: false,
            max_parallel_scorers: None,
        }
    }
}

impl RewardStageConfig {
    /// Loads a config file; `.json` files are parsed as JSON, everything else as TOML.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let origin = path.display().to_string();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: origin.clone(),
            source,
        })?;
        let is_json = path
            .extension()
            .and_then(|extension| extension.to_str())
            .is_some_and(|extension| extension.eq_ignore_ascii_case("json"));
        if is_json {
            Self::from_json_str(&raw, &origin)
        } else {
            Self::from_toml_str(&raw, &origin)
        }
    }

    /// Parses and validates a TOML document.
    pub fn from_toml_str(raw: &str, origin: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw).map_err(|error| ConfigError::Parse {
            path: origin.to_string(),
            reason: error.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Parses and validates a JSON document.
    pub fn from_json_str(raw: &str, origin: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw).map_err(|error| ConfigError::Parse {
            path: origin.to_string(),
            reason: error.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.custom_reward_function.name.trim().is_empty() {
            return Err(ConfigError::InvalidField {
                field: "custom_reward_function.name",
                reason: "must not be empty".to_string(),
            });
        }
        if self.max_parallel_scorers == Some(0) {
            return Err(ConfigError::InvalidField {
                field: "max_parallel_scorers",
                reason: "must be greater than 0".to_string(),
            });
        }
        Ok(())
    }

    /// Collector mode used for training steps; validation is always sequential.
    pub fn training_mode(&self) -> ConcurrencyMode {
        if self.launch_reward_fn_async {
            ConcurrencyMode::Overlapped
        } else {
            ConcurrencyMode::Sequential
        }
    }

    pub fn reduce_options(&self) -> ReduceOptions {
        ReduceOptions {
            include_count: self.emit_count,
        }
    }
}
