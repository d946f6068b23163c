//! Reward stage of the training loop.
//!
//! Collects batch rewards for training and validation steps, reduces the
//! auxiliary signals into namespaced metrics and merges them into each
//! step's metrics mapping.

pub mod config;
mod sample_source;
mod step_metrics;

pub use config::RewardStageConfig;
pub use sample_source::{JsonlSampleSource, SampleSource};
pub use step_metrics::{MetricsMergeError, StepMetrics};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tau_reward_metrics::{append_signal_metrics, reduce_with_options};
use tau_reward_scoring::{
    ConcurrencyMode, PendingBatchReward, RewardCollector, RewardScorer, ScorerRegistry,
};
use tau_reward_types::{
    BatchRewardResult, ConfigError, ExtraSlot, MetricsReport, RewardValue, Sample,
    MAIN_SCORE_KEY, TRAIN_REWARD_NAMESPACE, VAL_REWARD_NAMESPACE,
};

/// Binds a configured scorer to the training and validation steps.
#[derive(Clone)]
pub struct RewardStage {
    collector: RewardCollector,
    config: RewardStageConfig,
}

impl RewardStage {
    pub fn new(
        scorer: Arc<dyn RewardScorer>,
        config: RewardStageConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let mut collector =
            RewardCollector::new(scorer, config.custom_reward_function.reward_kwargs.clone());
        if let Some(limit) = config.max_parallel_scorers.and_then(NonZeroUsize::new) {
            collector = collector.with_max_parallel_scorers(limit);
        }
        Ok(Self { collector, config })
    }

    /// Resolves `custom_reward_function` against `registry`.
    pub fn from_registry(
        registry: &ScorerRegistry,
        config: RewardStageConfig,
    ) -> Result<Self, ConfigError> {
        let scorer = registry.resolve(&config.custom_reward_function)?;
        Self::new(scorer, config)
    }

    pub fn config(&self) -> &RewardStageConfig {
        &self.config
    }

    pub fn training_mode(&self) -> ConcurrencyMode {
        self.config.training_mode()
    }

    /// Starts reward collection for a training batch in the configured mode.
    pub fn launch_training(&self, batch: Vec<Sample>) -> PendingBatchReward {
        tracing::debug!(
            batch_size = batch.len(),
            mode = ?self.training_mode(),
            "launching training reward collection"
        );
        self.collector.collect(batch, self.training_mode())
    }

    /// Awaits a launched batch and merges its `reward/*` metrics into `metrics`.
    ///
    /// Returns the reward vector for the policy update.
    pub async fn complete_training(
        &self,
        pending: PendingBatchReward,
        metrics: &mut StepMetrics,
    ) -> Result<Vec<f64>> {
        let result = pending.wait().await?;
        self.merge_metrics(result, TRAIN_REWARD_NAMESPACE, metrics)
    }

    /// Launches and completes one training batch without overlap.
    pub async fn train_step(
        &self,
        batch: Vec<Sample>,
        metrics: &mut StepMetrics,
    ) -> Result<Vec<f64>> {
        let pending = self.launch_training(batch);
        self.complete_training(pending, metrics).await
    }

    /// Scores a validation batch sequentially and merges `val-reward/*` metrics.
    #[tracing::instrument(level = "debug", skip_all, fields(batch_size = batch.len()))]
    pub fn validate(&self, batch: &[Sample], metrics: &mut StepMetrics) -> Result<Vec<f64>> {
        let result = self.collector.collect_sequential(batch)?;
        self.merge_metrics(result, VAL_REWARD_NAMESPACE, metrics)
    }

    /// Reduces a batch result under `namespace`, adding `score` statistics when enabled.
    pub fn reward_metrics(&self, result: &BatchRewardResult, namespace: &str) -> MetricsReport {
        let options = self.config.reduce_options();
        let mut report = reduce_with_options(&result.extras_by_name, namespace, options);
        if self.config.include_main_score {
            let scores = result
                .reward_vector
                .iter()
                .map(|score| ExtraSlot::Reported(RewardValue::Number(*score)))
                .collect::<Vec<_>>();
            append_signal_metrics(&mut report, namespace, MAIN_SCORE_KEY, &scores, options);
        }
        report
    }

    fn merge_metrics(
        &self,
        result: BatchRewardResult,
        namespace: &str,
        metrics: &mut StepMetrics,
    ) -> Result<Vec<f64>> {
        let report = self.reward_metrics(&result, namespace);
        tracing::debug!(
            namespace,
            batch_size = result.batch_size(),
            signals = result.extras_by_name.len(),
            keys = report.len(),
            "merging reward metrics"
        );
        metrics.merge_report(report)?;
        Ok(result.reward_vector)
    }
}

/// Which loop phase produced a [`StepReport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepPhase {
    Train,
    Validation,
}

/// Rewards and metrics recorded for one step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepReport {
    pub phase: StepPhase,
    pub step: usize,
    pub generated_at: DateTime<Utc>,
    pub rewards: Vec<f64>,
    pub metrics: StepMetrics,
}

/// Aggregate outcome from a reward training run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TrainingSummary {
    pub steps: Vec<StepReport>,
    pub validation: Option<StepReport>,
}

/// Step loop that overlaps reward collection with fetching the next batch.
#[derive(Clone)]
pub struct RewardTrainer {
    stage: RewardStage,
    batch_size: NonZeroUsize,
}

impl RewardTrainer {
    pub fn new(stage: RewardStage, batch_size: NonZeroUsize) -> Self {
        Self { stage, batch_size }
    }

    pub fn stage(&self) -> &RewardStage {
        &self.stage
    }

    /// Runs every training batch, then validation over the whole `val` source.
    pub async fn fit<STrain, SVal>(
        &self,
        train: Option<STrain>,
        val: Option<SVal>,
    ) -> Result<TrainingSummary>
    where
        STrain: SampleSource,
        SVal: SampleSource,
    {
        self.fit_with(train, val, |_| Ok(())).await
    }

    /// [`RewardTrainer::fit`] that hands each report to `on_report` as soon as it exists.
    pub async fn fit_with<STrain, SVal, F>(
        &self,
        train: Option<STrain>,
        val: Option<SVal>,
        mut on_report: F,
    ) -> Result<TrainingSummary>
    where
        STrain: SampleSource,
        SVal: SampleSource,
        F: FnMut(&StepReport) -> Result<()>,
    {
        let batch_size = self.batch_size.get();
        let mut summary = TrainingSummary::default();

        if let Some(mut train) = train {
            let mut next = train
                .next_batch(batch_size)
                .await
                .context("failed to read training batch 1")?;
            let mut step = 0;
            while let Some(batch) = next.take() {
                step += 1;
                let step_batch_size = batch.len();
                let pending = self.stage.launch_training(batch);

                // The next rollout is fetched while the reward job is in flight.
                next = train
                    .next_batch(batch_size)
                    .await
                    .with_context(|| format!("failed to read training batch {}", step + 1))?;

                let mut metrics = StepMetrics::new();
                metrics.insert("training/batch_size", step_batch_size as f64)?;
                let rewards = self
                    .stage
                    .complete_training(pending, &mut metrics)
                    .await
                    .with_context(|| format!("training step {step} failed"))?;
                tracing::info!(step, batch_size = step_batch_size, "completed training step");

                let report = StepReport {
                    phase: StepPhase::Train,
                    step,
                    generated_at: Utc::now(),
                    rewards,
                    metrics,
                };
                on_report(&report)?;
                summary.steps.push(report);
            }
        }

        if let Some(mut val) = val {
            let mut samples = Vec::new();
            while let Some(batch) = val
                .next_batch(batch_size)
                .await
                .context("failed to read validation batch")?
            {
                samples.extend(batch);
            }

            if samples.is_empty() {
                tracing::warn!("validation source produced no samples");
            } else {
                let mut metrics = StepMetrics::new();
                metrics.insert("validation/batch_size", samples.len() as f64)?;
                let rewards = self
                    .stage
                    .validate(&samples, &mut metrics)
                    .context("validation failed")?;
                tracing::info!(batch_size = samples.len(), "completed validation");

                let report = StepReport {
                    phase: StepPhase::Validation,
                    step: summary.steps.len(),
                    generated_at: Utc::now(),
                    rewards,
                    metrics,
                };
                on_report(&report)?;
                summary.validation = Some(report);
            }
        }

        Ok(summary)
    }
}
