//! Scorer invocation and batch reward collection.
//!
//! Turns heterogeneous scorer output into canonical per-sample records and
//! assembles them into index-aligned batch results, either on the calling
//! thread or overlapped with the caller's next rollout.

mod builtin;
mod collector;
mod invoker;
mod registry;
mod scorer;

pub use builtin::{KeywordLengthScorer, LengthScorer, SubRewardScorer};
pub use collector::{assemble_batch, ConcurrencyMode, PendingBatchReward, RewardCollector};
pub use invoker::{invoke, normalize_score_value};
pub use registry::ScorerRegistry;
pub use scorer::{kwarg_f64, kwarg_usize, FnScorer, RewardScorer};
