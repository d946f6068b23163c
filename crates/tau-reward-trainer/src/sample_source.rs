//! Batch sources feeding samples into the reward stage.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::Path;
use tau_reward_types::Sample;

/// Supplies scored-sample batches in rollout order.
#[async_trait]
pub trait SampleSource: Send {
    /// Returns up to `batch_size` samples, or `None` once exhausted.
    async fn next_batch(&mut self, batch_size: usize) -> Result<Option<Vec<Sample>>>;
}

fn take_front(pending: &mut VecDeque<Sample>, batch_size: usize) -> Result<Option<Vec<Sample>>> {
    if batch_size == 0 {
        bail!("batch_size must be greater than 0");
    }
    if pending.is_empty() {
        return Ok(None);
    }
    let take = batch_size.min(pending.len());
    Ok(Some(pending.drain(..take).collect()))
}

#[async_trait]
impl SampleSource for VecDeque<Sample> {
    async fn next_batch(&mut self, batch_size: usize) -> Result<Option<Vec<Sample>>> {
        take_front(self, batch_size)
    }
}

/// Newline-delimited JSON samples read from disk.
#[derive(Debug)]
pub struct JsonlSampleSource {
    pending: VecDeque<Sample>,
}

impl JsonlSampleSource {
    /// Reads and parses every non-blank line of `path`.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read samples from {}", path.display()))?;

        let mut pending = VecDeque::new();
        for (index, line) in raw.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let sample = serde_json::from_str::<Sample>(line).with_context(|| {
                format!("{}:{}: invalid sample record", path.display(), index + 1)
            })?;
            pending.push_back(sample);
        }
        tracing::debug!(path = %path.display(), samples = pending.len(), "loaded sample file");
        Ok(Self { pending })
    }

    pub fn remaining(&self) -> usize {
        self.pending.len()
    }
}

#[async_trait]
impl SampleSource for JsonlSampleSource {
    async fn next_batch(&mut self, batch_size: usize) -> Result<Option<Vec<Sample>>> {
        take_front(&mut self.pending, batch_size)
    }
}
