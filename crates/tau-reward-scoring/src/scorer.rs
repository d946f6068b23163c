//! Scorer contract shared by built-in and externally loaded reward functions.

use anyhow::{bail, Result};
use std::fmt;
use tau_reward_types::{RewardKwargs, RewardValue, Sample};

/// A reward function mapping one sample to a number or a structured result.
///
/// Implementations must not mutate shared state; the same scorer instance is
/// called concurrently from several scoring workers.
pub trait RewardScorer: Send + Sync {
    fn compute_score(&self, sample: &Sample, reward_kwargs: &RewardKwargs) -> Result<RewardValue>;
}

type ScoreFn = dyn Fn(&Sample, &RewardKwargs) -> Result<RewardValue> + Send + Sync;

/// Adapts a closure to the scorer contract.
pub struct FnScorer {
    score: Box<ScoreFn>,
}

impl FnScorer {
    pub fn new<F>(score: F) -> Self
    where
        F: Fn(&Sample, &RewardKwargs) -> Result<RewardValue> + Send + Sync + 'static,
    {
        Self {
            score: Box::new(score),
        }
    }
}

impl fmt::Debug for FnScorer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnScorer").finish_non_exhaustive()
    }
}

impl RewardScorer for FnScorer {
    fn compute_score(&self, sample: &Sample, reward_kwargs: &RewardKwargs) -> Result<RewardValue> {
        (self.score)(sample, reward_kwargs)
    }
}

/// Reads a numeric keyword argument, falling back to `default` when absent.
pub fn kwarg_f64(reward_kwargs: &RewardKwargs, name: &str, default: f64) -> Result<f64> {
    match reward_kwargs.get(name) {
        None => Ok(default),
        Some(RewardValue::Number(value)) if value.is_finite() => Ok(*value),
        Some(other) => bail!(
            "reward kwarg '{name}' must be a finite number, got {}",
            other.kind_name()
        ),
    }
}

/// Reads a non-negative integer keyword argument, falling back to `default` when absent.
pub fn kwarg_usize(reward_kwargs: &RewardKwargs, name: &str, default: usize) -> Result<usize> {
    match reward_kwargs.get(name) {
        None => Ok(default),
        Some(RewardValue::Number(value))
            if value.is_finite() && *value >= 0.0 && value.fract() == 0.0 =>
        {
            Ok(*value as usize)
        }
        Some(other) => bail!(
            "reward kwarg '{name}' must be a non-negative integer, got {}",
            other.kind_name()
        ),
    }
}
