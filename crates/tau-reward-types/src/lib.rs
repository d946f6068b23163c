//! Shared data types for Tau reward scoring and metrics reduction.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Reserved name of the main reward inside a structured scorer result.
pub const MAIN_SCORE_KEY: &str = "score";
/// Metrics namespace used for training-step reward statistics.
pub const TRAIN_REWARD_NAMESPACE: &str = "reward";
/// Metrics namespace used for validation reward statistics.
pub const VAL_REWARD_NAMESPACE: &str = "val-reward";
/// Scorer symbol bound when configuration does not name one.
pub const DEFAULT_SCORER_NAME: &str = "compute_score";

const SCORER_CONTRACT: &str = "scorers must return a number or a mapping with a numeric 'score' key";

/// Keyword arguments forwarded unchanged to every scorer invocation.
pub type RewardKwargs = BTreeMap<String, RewardValue>;

/// Flat `namespace/signal/statistic -> value` mapping ready for a logging sink.
pub type MetricsReport = BTreeMap<String, f64>;

/// Dynamically-shaped value produced by a scorer.
///
/// Mirrors JSON but keeps NaN and infinities representable so that
/// non-finite scorer output survives until metrics reduction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum RewardValue {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    List(Vec<RewardValue>),
    Map(BTreeMap<String, RewardValue>),
}

impl RewardValue {
    /// Returns the numeric payload for `Number` values.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(value) => Some(*value),
            _ => None,
        }
    }

    /// Short shape name used in diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Number(_) => "number",
            Self::Text(_) => "text",
            Self::List(_) => "list",
            Self::Map(_) => "mapping",
        }
    }
}

impl From<Value> for RewardValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(flag) => Self::Bool(flag),
            Value::Number(number) => number.as_f64().map_or(Self::Null, Self::Number),
            Value::String(text) => Self::Text(text),
            Value::Array(items) => Self::List(items.into_iter().map(Self::from).collect()),
            Value::Object(entries) => Self::Map(
                entries
                    .into_iter()
                    .map(|(key, value)| (key, Self::from(value)))
                    .collect(),
            ),
        }
    }
}

impl From<f64> for RewardValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<i64> for RewardValue {
    fn from(value: i64) -> Self {
        Self::Number(value as f64)
    }
}

impl From<usize> for RewardValue {
    fn from(value: usize) -> Self {
        Self::Number(value as f64)
    }
}

impl From<bool> for RewardValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<&str> for RewardValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for RewardValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl<T: Into<RewardValue>> From<Vec<T>> for RewardValue {
    fn from(values: Vec<T>) -> Self {
        Self::List(values.into_iter().map(Into::into).collect())
    }
}

/// One generated response awaiting a reward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub data_source: String,
    #[serde(alias = "solution_str")]
    pub response_text: String,
    pub ground_truth: String,
    #[serde(default)]
    pub extra_info: Option<BTreeMap<String, RewardValue>>,
}

impl Sample {
    /// Creates a sample without auxiliary metadata.
    pub fn new(
        data_source: impl Into<String>,
        response_text: impl Into<String>,
        ground_truth: impl Into<String>,
    ) -> Self {
        Self {
            data_source: data_source.into(),
            response_text: response_text.into(),
            ground_truth: ground_truth.into(),
            extra_info: None,
        }
    }

    /// Attaches auxiliary metadata such as turn counts.
    pub fn with_extra_info(mut self, extra_info: BTreeMap<String, RewardValue>) -> Self {
        self.extra_info = Some(extra_info);
        self
    }
}

/// Shape of a scorer return value after inspection.
#[derive(Debug, Clone, PartialEq)]
pub enum ScoreResult {
    Scalar(f64),
    Structured {
        score: f64,
        extras: BTreeMap<String, RewardValue>,
    },
}

/// Normalized per-sample scoring record.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalRecord {
    pub main_score: f64,
    pub extras: BTreeMap<String, RewardValue>,
}

impl From<ScoreResult> for CanonicalRecord {
    fn from(result: ScoreResult) -> Self {
        match result {
            ScoreResult::Scalar(main_score) => Self {
                main_score,
                extras: BTreeMap::new(),
            },
            ScoreResult::Structured { score, extras } => Self {
                main_score: score,
                extras,
            },
        }
    }
}

/// One sample's slot for a named extra signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", content = "value", rename_all = "snake_case")]
pub enum ExtraSlot {
    /// The sample's scorer did not return this name.
    NotReported,
    Reported(RewardValue),
}

impl ExtraSlot {
    /// Returns the reported value, if any.
    pub fn value(&self) -> Option<&RewardValue> {
        match self {
            Self::NotReported => None,
            Self::Reported(value) => Some(value),
        }
    }
}

/// Batch-level scoring output aligned to the input batch order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchRewardResult {
    pub reward_vector: Vec<f64>,
    pub extras_by_name: BTreeMap<String, Vec<ExtraSlot>>,
}

impl BatchRewardResult {
    /// Number of samples the result covers.
    pub fn batch_size(&self) -> usize {
        self.reward_vector.len()
    }

    /// Returns true when every extras sequence has one slot per sample.
    pub fn is_index_aligned(&self) -> bool {
        let expected = self.batch_size();
        self.extras_by_name
            .values()
            .all(|slots| slots.len() == expected)
    }
}

/// Reason a single scorer invocation violated the scorer contract.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScoringFailure {
    #[error("scorer failed: {message}")]
    ScorerFailed { message: String },
    #[error("scorer returned a non-numeric main score ({found})")]
    NonNumericScore { found: &'static str },
    #[error("scorer returned a non-finite main score ({value})")]
    NonFiniteScore { value: f64 },
    #[error("scorer returned a mapping without a 'score' key (keys: {keys:?})")]
    MissingScore { keys: Vec<String> },
    #[error("scoring worker terminated: {message}")]
    WorkerTerminated { message: String },
}

/// Fatal scoring error for a batch; names the offending sample when known.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{location}: {failure}; {}", SCORER_CONTRACT)]
pub struct ScoringError {
    pub location: SampleLocation,
    pub failure: ScoringFailure,
}

impl ScoringError {
    /// Creates an error for a sample whose batch index is not yet known.
    pub fn for_sample(sample: &Sample, failure: ScoringFailure) -> Self {
        Self {
            location: SampleLocation {
                index: None,
                data_source: Some(sample.data_source.clone()),
            },
            failure,
        }
    }

    /// Creates an error that is not attributable to a single sample.
    pub fn batch(failure: ScoringFailure) -> Self {
        Self {
            location: SampleLocation::default(),
            failure,
        }
    }

    /// Records the batch index of the offending sample.
    pub fn with_sample_index(mut self, index: usize) -> Self {
        self.location.index = Some(index);
        self
    }

    /// Batch index of the offending sample, if known.
    pub fn sample_index(&self) -> Option<usize> {
        self.location.index
    }
}

/// Position of a sample inside a batch, used for error reporting.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SampleLocation {
    pub index: Option<usize>,
    pub data_source: Option<String>,
}

impl fmt::Display for SampleLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.index, self.data_source.as_deref()) {
            (Some(index), Some(source)) => write!(f, "sample {index} (data_source '{source}')"),
            (Some(index), None) => write!(f, "sample {index}"),
            (None, Some(source)) => write!(f, "sample (data_source '{source}')"),
            (None, None) => f.write_str("batch"),
        }
    }
}

/// Scorer binding: where the external loader finds the function and what it passes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardFunctionConfig {
    /// Module/file path resolved by an external loader.
    pub path: Option<String>,
    /// Symbol name bound as the scorer.
    pub name: String,
    pub reward_kwargs: RewardKwargs,
}

impl Default for RewardFunctionConfig {
    fn default() -> Self {
        Self {
            path: None,
            name: DEFAULT_SCORER_NAME.to_string(),
            reward_kwargs: RewardKwargs::new(),
        }
    }
}

/// Errors raised while resolving or validating reward configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown scorer '{name}' (registered: {registered})")]
    UnknownScorer { name: String, registered: String },
    #[error("loading scorer '{name}' from path '{path}' requires an external loader")]
    PathLoadingUnsupported { name: String, path: String },
    #[error("invalid reward config field '{field}': {reason}")]
    InvalidField { field: &'static str, reason: String },
    #[error("failed to read reward config '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse reward config '{path}': {reason}")]
    Parse { path: String, reason: String },
}
