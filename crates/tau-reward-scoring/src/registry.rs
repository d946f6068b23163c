//! Name-keyed scorer registry used to bind `custom_reward_function.name`.

use crate::{KeywordLengthScorer, LengthScorer, RewardScorer, SubRewardScorer};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tau_reward_types::{ConfigError, RewardFunctionConfig, DEFAULT_SCORER_NAME};

/// Resolves configured scorer names to shared scorer instances.
#[derive(Clone, Default)]
pub struct ScorerRegistry {
    scorers: BTreeMap<String, Arc<dyn RewardScorer>>,
}

impl ScorerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding the reference scorers.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        let sub_rewards: Arc<dyn RewardScorer> = Arc::new(SubRewardScorer);
        registry.register("custom_reward_with_subrewards", sub_rewards.clone());
        registry.register(DEFAULT_SCORER_NAME, sub_rewards);
        registry.register("simple_custom_reward", Arc::new(LengthScorer));
        registry.register("test_reward_with_subrewards", Arc::new(KeywordLengthScorer));
        registry
    }

    /// Binds `name` to `scorer`, returning the scorer it replaced.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        scorer: Arc<dyn RewardScorer>,
    ) -> Option<Arc<dyn RewardScorer>> {
        self.scorers.insert(name.into(), scorer)
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn RewardScorer>> {
        self.scorers.get(name).cloned()
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> Vec<&str> {
        self.scorers.keys().map(String::as_str).collect()
    }

    /// Resolves the scorer named by `config`.
    ///
    /// Path-based bindings belong to an external module loader and are rejected.
    pub fn resolve(
        &self,
        config: &RewardFunctionConfig,
    ) -> Result<Arc<dyn RewardScorer>, ConfigError> {
        if let Some(path) = config.path.as_deref().filter(|path| !path.trim().is_empty()) {
            return Err(ConfigError::PathLoadingUnsupported {
                name: config.name.clone(),
                path: path.to_string(),
            });
        }
        self.get(&config.name)
            .ok_or_else(|| ConfigError::UnknownScorer {
                name: config.name.clone(),
                registered: self.names().join(", "),
            })
    }
}

impl fmt::Debug for ScorerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScorerRegistry")
            .field("scorers", &self.names())
            .finish()
    }
}
