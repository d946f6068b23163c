//! Per-step metrics mapping with collision-checked merges.

use serde::Serialize;
use std::collections::BTreeMap;
use tau_reward_types::MetricsReport;
use thiserror::Error;

/// Error raised when two producers write the same metrics key in one step.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MetricsMergeError {
    #[error("metrics key '{0}' is already set for this step")]
    KeyCollision(String),
}

/// Flat metrics for one training or validation step.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct StepMetrics {
    values: BTreeMap<String, f64>,
}

impl StepMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets one key; an existing key is a collision.
    pub fn insert(&mut self, key: impl Into<String>, value: f64) -> Result<(), MetricsMergeError> {
        let key = key.into();
        if self.values.contains_key(&key) {
            return Err(MetricsMergeError::KeyCollision(key));
        }
        self.values.insert(key, value);
        Ok(())
    }

    /// Merges a reducer report; nothing is written when any key collides.
    pub fn merge_report(&mut self, report: MetricsReport) -> Result<(), MetricsMergeError> {
        if let Some(key) = report.keys().find(|key| self.values.contains_key(*key)) {
            return Err(MetricsMergeError::KeyCollision(key.clone()));
        }
        self.values.extend(report);
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        self.values.get(key).copied()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
