//! Batch reward collection with sequential and overlapped execution.

use crate::{invoke, RewardScorer};
use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use tau_reward_types::{
    BatchRewardResult, CanonicalRecord, ExtraSlot, RewardKwargs, Sample, ScoringError,
    ScoringFailure,
};
use tokio::runtime::Handle;
use tokio::task::{JoinHandle, JoinSet};

type SlotOutcome = (usize, Result<CanonicalRecord, ScoringError>);

/// How a batch is scored relative to the caller's training loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConcurrencyMode {
    /// Scores every sample before `collect` returns.
    #[default]
    Sequential,
    /// Dispatches scoring to blocking workers; the caller awaits the handle later.
    Overlapped,
}

/// Runs a scorer across batches and assembles index-aligned results.
#[derive(Clone)]
pub struct RewardCollector {
    scorer: Arc<dyn RewardScorer>,
    reward_kwargs: Arc<RewardKwargs>,
    max_parallel_scorers: usize,
}

impl RewardCollector {
    /// Creates a collector; overlapped mode uses one worker per available core.
    pub fn new(scorer: Arc<dyn RewardScorer>, reward_kwargs: RewardKwargs) -> Self {
        let max_parallel_scorers = thread::available_parallelism()
            .map(NonZeroUsize::get)
            .unwrap_or(1);
        Self {
            scorer,
            reward_kwargs: Arc::new(reward_kwargs),
            max_parallel_scorers,
        }
    }

    /// Caps the number of blocking workers used in overlapped mode.
    pub fn with_max_parallel_scorers(mut self, max_parallel_scorers: NonZeroUsize) -> Self {
        self.max_parallel_scorers = max_parallel_scorers.get();
        self
    }

    /// Starts collecting rewards for `batch` in the requested mode.
    ///
    /// Overlapped collection outside a Tokio runtime degrades to sequential
    /// scoring; the result is the same either way.
    pub fn collect(&self, batch: Vec<Sample>, mode: ConcurrencyMode) -> PendingBatchReward {
        match mode {
            ConcurrencyMode::Sequential => PendingBatchReward::ready(self.collect_sequential(&batch)),
            ConcurrencyMode::Overlapped => match Handle::try_current() {
                Ok(runtime) => self.spawn_overlapped(&runtime, batch),
                Err(_) => {
                    tracing::warn!(
                        batch_size = batch.len(),
                        "no tokio runtime available; scoring overlapped batch sequentially"
                    );
                    PendingBatchReward::ready(self.collect_sequential(&batch))
                }
            },
        }
    }

    /// Scores `batch` on the calling thread in batch order.
    #[tracing::instrument(level = "debug", skip_all, fields(batch_size = batch.len()))]
    pub fn collect_sequential(&self, batch: &[Sample]) -> Result<BatchRewardResult, ScoringError> {
        let mut records = Vec::with_capacity(batch.len());
        for (index, sample) in batch.iter().enumerate() {
            let record = invoke(sample, self.scorer.as_ref(), &self.reward_kwargs)
                .map_err(|error| error.with_sample_index(index))?;
            records.push(record);
        }
        Ok(assemble_batch(records))
    }

    fn spawn_overlapped(&self, runtime: &Handle, batch: Vec<Sample>) -> PendingBatchReward {
        let batch: Arc<[Sample]> = batch.into();
        let worker_count = self.max_parallel_scorers.clamp(1, batch.len().max(1));
        let scorer = self.scorer.clone();
        let reward_kwargs = self.reward_kwargs.clone();
        let cancelled = Arc::new(AtomicBool::new(false));
        tracing::debug!(
            batch_size = batch.len(),
            worker_count,
            "dispatching overlapped reward collection"
        );

        let task = runtime.spawn(collect_overlapped(
            batch,
            scorer,
            reward_kwargs,
            worker_count,
            cancelled.clone(),
        ));

        PendingBatchReward {
            state: PendingState::InFlight { task, cancelled },
        }
    }
}

async fn collect_overlapped(
    batch: Arc<[Sample]>,
    scorer: Arc<dyn RewardScorer>,
    reward_kwargs: Arc<RewardKwargs>,
    worker_count: usize,
    cancelled: Arc<AtomicBool>,
) -> Result<BatchRewardResult, ScoringError> {
    let mut workers = JoinSet::new();
    for worker in 0..worker_count {
        let batch = batch.clone();
        let scorer = scorer.clone();
        let reward_kwargs = reward_kwargs.clone();
        let cancelled = cancelled.clone();
        workers.spawn_blocking(move || {
            score_strided(
                &batch,
                worker,
                worker_count,
                scorer.as_ref(),
                &reward_kwargs,
                &cancelled,
            )
        });
    }

    let mut slots: Vec<Option<Result<CanonicalRecord, ScoringError>>> =
        (0..batch.len()).map(|_| None).collect();
    while let Some(joined) = workers.join_next().await {
        let scored = joined.map_err(|error| {
            ScoringError::batch(ScoringFailure::WorkerTerminated {
                message: error.to_string(),
            })
        })?;
        for (index, outcome) in scored {
            slots[index] = Some(outcome);
        }
    }

    // Lowest failing index wins regardless of worker completion order.
    let mut records = Vec::with_capacity(slots.len());
    for (index, slot) in slots.into_iter().enumerate() {
        let Some(outcome) = slot else {
            return Err(ScoringError::batch(ScoringFailure::WorkerTerminated {
                message: format!("no result recorded for sample {index}"),
            }));
        };
        records.push(outcome?);
    }
    Ok(assemble_batch(records))
}

fn score_strided(
    batch: &[Sample],
    offset: usize,
    stride: usize,
    scorer: &dyn RewardScorer,
    reward_kwargs: &RewardKwargs,
    cancelled: &AtomicBool,
) -> Vec<SlotOutcome> {
    (offset..batch.len())
        .step_by(stride)
        .take_while(|_| !cancelled.load(Ordering::Relaxed))
        .map(|index| {
            let outcome = invoke(&batch[index], scorer, reward_kwargs)
                .map_err(|error| error.with_sample_index(index));
            (index, outcome)
        })
        .collect()
}

/// Builds the reward vector and the name-keyed extras table from records in batch order.
///
/// Names reported by any sample get one slot per sample; samples that did not
/// report a name hold [`ExtraSlot::NotReported`].
pub fn assemble_batch(records: Vec<CanonicalRecord>) -> BatchRewardResult {
    let batch_size = records.len();
    let mut reward_vector = Vec::with_capacity(batch_size);
    let mut extras_by_name: BTreeMap<String, Vec<ExtraSlot>> = BTreeMap::new();

    for (index, record) in records.into_iter().enumerate() {
        reward_vector.push(record.main_score);
        for (name, value) in record.extras {
            let slots = extras_by_name
                .entry(name)
                .or_insert_with(|| vec![ExtraSlot::NotReported; batch_size]);
            slots[index] = ExtraSlot::Reported(value);
        }
    }

    BatchRewardResult {
        reward_vector,
        extras_by_name,
    }
}

/// Handle to a batch reward computation that may still be running.
///
/// Dropping an unfinished handle cancels the job: workers stop before their
/// next sample and the collecting task is aborted.
#[derive(Debug)]
pub struct PendingBatchReward {
    state: PendingState,
}

#[derive(Debug)]
enum PendingState {
    Ready(Option<Result<BatchRewardResult, ScoringError>>),
    InFlight {
        task: JoinHandle<Result<BatchRewardResult, ScoringError>>,
        cancelled: Arc<AtomicBool>,
    },
}

impl PendingBatchReward {
    fn ready(result: Result<BatchRewardResult, ScoringError>) -> Self {
        Self {
            state: PendingState::Ready(Some(result)),
        }
    }

    /// Returns true once `wait` will not suspend.
    pub fn is_finished(&self) -> bool {
        match &self.state {
            PendingState::Ready(_) => true,
            PendingState::InFlight { task, .. } => task.is_finished(),
        }
    }

    /// Waits for the batch result.
    pub async fn wait(mut self) -> Result<BatchRewardResult, ScoringError> {
        match &mut self.state {
            PendingState::Ready(result) => result.take().unwrap_or_else(|| {
                Err(ScoringError::batch(ScoringFailure::WorkerTerminated {
                    message: "batch result was already taken".to_string(),
                }))
            }),
            PendingState::InFlight { task, .. } => task.await.map_err(|error| {
                ScoringError::batch(ScoringFailure::WorkerTerminated {
                    message: error.to_string(),
                })
            })?,
        }
    }
}

impl Drop for PendingBatchReward {
    fn drop(&mut self) {
        if let PendingState::InFlight { task, cancelled } = &self.state {
            if !task.is_finished() {
                tracing::debug!("cancelling unfinished reward batch");
                cancelled.store(true, Ordering::Relaxed);
                task.abort();
            }
        }
    }
}
