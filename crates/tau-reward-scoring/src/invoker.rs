//! Single-sample scorer invocation and return-value normalization.

use crate::RewardScorer;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use tau_reward_types::{
    CanonicalRecord, RewardKwargs, RewardValue, Sample, ScoreResult, ScoringError, ScoringFailure,
    MAIN_SCORE_KEY,
};

/// Scores one sample and normalizes the result into a canonical record.
///
/// A scorer error or panic, a non-numeric or non-finite main score, and a
/// mapping without `score` all surface as [`ScoringError`]. Extras are passed
/// through unexamined.
#[tracing::instrument(level = "debug", skip_all, fields(data_source = %sample.data_source))]
pub fn invoke(
    sample: &Sample,
    scorer: &dyn RewardScorer,
    reward_kwargs: &RewardKwargs,
) -> Result<CanonicalRecord, ScoringError> {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        scorer.compute_score(sample, reward_kwargs)
    }));
    let raw = match outcome {
        Ok(Ok(value)) => value,
        Ok(Err(error)) => {
            return Err(ScoringError::for_sample(
                sample,
                ScoringFailure::ScorerFailed {
                    message: format!("{error:#}"),
                },
            ));
        }
        Err(payload) => {
            return Err(ScoringError::for_sample(
                sample,
                ScoringFailure::ScorerFailed {
                    message: format!("scorer panicked: {}", panic_message(payload.as_ref())),
                },
            ));
        }
    };

    let result =
        normalize_score_value(raw).map_err(|failure| ScoringError::for_sample(sample, failure))?;
    let record = CanonicalRecord::from(result);
    tracing::debug!(
        main_score = record.main_score,
        extras = record.extras.len(),
        "sample scored"
    );
    Ok(record)
}

/// Classifies a raw scorer return value as scalar or structured.
pub fn normalize_score_value(value: RewardValue) -> Result<ScoreResult, ScoringFailure> {
    match value {
        RewardValue::Number(score) => Ok(ScoreResult::Scalar(ensure_finite(score)?)),
        RewardValue::Map(mut entries) => {
            let Some(score) = entries.remove(MAIN_SCORE_KEY) else {
                return Err(ScoringFailure::MissingScore {
                    keys: entries.into_keys().collect(),
                });
            };
            let score = match score {
                RewardValue::Number(score) => ensure_finite(score)?,
                other => {
                    return Err(ScoringFailure::NonNumericScore {
                        found: other.kind_name(),
                    });
                }
            };
            Ok(ScoreResult::Structured {
                score,
                extras: entries,
            })
        }
        other => Err(ScoringFailure::NonNumericScore {
            found: other.kind_name(),
        }),
    }
}

fn ensure_finite(score: f64) -> Result<f64, ScoringFailure> {
    if score.is_finite() {
        Ok(score)
    } else {
        Err(ScoringFailure::NonFiniteScore { value: score })
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        return (*message).to_string();
    }
    if let Some(message) = payload.downcast_ref::<String>() {
        return message.clone();
    }
    "non-string panic payload".to_string()
}

#[cfg(test)]
mod tests {
    use super::{invoke, normalize_score_value};
    use crate::FnScorer;
    use anyhow::anyhow;
    use serde_json::json;
    use std::collections::BTreeMap;
    use tau_reward_types::{RewardKwargs, RewardValue, Sample, ScoreResult, ScoringFailure};

    fn sample() -> Sample {
        Sample::new("geography", "The capital of France is Paris.", "Paris")
    }

    #[test]
    fn spec_bare_number_normalizes_to_scalar() {
        assert_eq!(
            normalize_score_value(RewardValue::Number(0.75)),
            Ok(ScoreResult::Scalar(0.75))
        );
    }

    #[test]
    fn spec_mapping_promotes_score_and_keeps_other_keys_as_extras() {
        let value = RewardValue::from(json!({
            "score": 0.9,
            "fluency": 1.0,
            "label": "geo",
        }));
        let mut extras = BTreeMap::new();
        extras.insert("fluency".to_string(), RewardValue::Number(1.0));
        extras.insert("label".to_string(), RewardValue::from("geo"));

        assert_eq!(
            normalize_score_value(value),
            Ok(ScoreResult::Structured { score: 0.9, extras })
        );
    }

    #[test]
    fn spec_mapping_without_score_is_a_contract_violation() {
        let value = RewardValue::from(json!({ "fluency": 1.0, "safety": 0.5 }));
        assert_eq!(
            normalize_score_value(value),
            Err(ScoringFailure::MissingScore {
                keys: vec!["fluency".to_string(), "safety".to_string()],
            })
        );
    }

    #[test]
    fn spec_non_numeric_main_scores_are_rejected() {
        assert_eq!(
            normalize_score_value(RewardValue::from("0.5")),
            Err(ScoringFailure::NonNumericScore { found: "text" })
        );
        assert_eq!(
            normalize_score_value(RewardValue::from(json!({ "score": null }))),
            Err(ScoringFailure::NonNumericScore { found: "null" })
        );
        assert_eq!(
            normalize_score_value(RewardValue::Bool(true)),
            Err(ScoringFailure::NonNumericScore { found: "bool" })
        );
    }

    #[test]
    fn regression_non_finite_main_score_is_rejected() {
        let failure = normalize_score_value(RewardValue::Number(f64::NAN)).expect_err("nan");
        assert!(matches!(failure, ScoringFailure::NonFiniteScore { .. }));
    }

    #[test]
    fn invoke_wraps_scorer_errors_with_sample_context() {
        let scorer = FnScorer::new(|_, _| Err(anyhow!("judge backend unavailable")));
        let error = invoke(&sample(), &scorer, &RewardKwargs::new()).expect_err("scorer error");

        assert_eq!(error.location.data_source.as_deref(), Some("geography"));
        assert!(error.to_string().contains("judge backend unavailable"));
    }

    #[test]
    fn regression_invoke_converts_scorer_panics_into_scoring_errors() {
        let scorer = FnScorer::new(|_, _| panic!("index out of range in user scorer"));
        let error = invoke(&sample(), &scorer, &RewardKwargs::new()).expect_err("panic");

        assert!(matches!(
            error.failure,
            ScoringFailure::ScorerFailed { ref message } if message.contains("index out of range")
        ));
    }

    #[test]
    fn invoke_returns_canonical_record_for_structured_scores() {
        let scorer = FnScorer::new(|sample, _| {
            Ok(RewardValue::from(json!({
                "score": 0.5,
                "word_count": sample.response_text.split_whitespace().count(),
            })))
        });
        let record = invoke(&sample(), &scorer, &RewardKwargs::new()).expect("record");

        assert_eq!(record.main_score, 0.5);
        assert_eq!(record.extras["word_count"], RewardValue::Number(6.0));
    }
}
