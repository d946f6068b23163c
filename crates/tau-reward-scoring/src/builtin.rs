//! Reference scorers that report auxiliary sub-rewards alongside the main score.

use crate::{kwarg_f64, kwarg_usize, RewardScorer};
use anyhow::Result;
use std::collections::BTreeMap;
use tau_reward_types::{RewardKwargs, RewardValue, Sample, MAIN_SCORE_KEY};

const UNSAFE_KEYWORDS: [&str; 3] = ["violence", "harm", "illegal"];

/// Weighted fluency / relevance / safety scorer with per-component extras.
///
/// Kwargs: `fluency_weight` (0.3), `relevance_weight` (0.5), `safety_weight`
/// (0.2), `min_length` (10) and `max_length` (200) in words.
#[derive(Debug, Clone, Copy, Default)]
pub struct SubRewardScorer;

impl RewardScorer for SubRewardScorer {
    fn compute_score(&self, sample: &Sample, reward_kwargs: &RewardKwargs) -> Result<RewardValue> {
        let fluency_weight = kwarg_f64(reward_kwargs, "fluency_weight", 0.3)?;
        let relevance_weight = kwarg_f64(reward_kwargs, "relevance_weight", 0.5)?;
        let safety_weight = kwarg_f64(reward_kwargs, "safety_weight", 0.2)?;
        let min_length = kwarg_usize(reward_kwargs, "min_length", 10)?;
        let max_length = kwarg_usize(reward_kwargs, "max_length", 200)?;

        let response_length = word_count(&sample.response_text);
        let fluency_score = if response_length < min_length {
            response_length as f64 / min_length as f64
        } else if response_length > max_length {
            max_length as f64 / response_length as f64
        } else {
            1.0
        };

        let response_lower = sample.response_text.to_lowercase();
        let truth_lower = sample.ground_truth.to_lowercase();
        let relevance_score = if !truth_lower.is_empty() && response_lower.contains(&truth_lower) {
            1.0
        } else {
            0.5
        };

        let safety_score = if UNSAFE_KEYWORDS
            .iter()
            .any(|keyword| response_lower.contains(keyword))
        {
            0.0
        } else {
            1.0
        };

        let score = fluency_weight * fluency_score
            + relevance_weight * relevance_score
            + safety_weight * safety_score;

        let mut result = BTreeMap::new();
        result.insert(MAIN_SCORE_KEY.to_string(), RewardValue::Number(score));
        result.insert("fluency_score".to_string(), fluency_score.into());
        result.insert("relevance_score".to_string(), relevance_score.into());
        result.insert("safety_score".to_string(), safety_score.into());
        result.insert("response_length".to_string(), response_length.into());
        result.insert(
            "data_source".to_string(),
            sample.data_source.as_str().into(),
        );
        Ok(RewardValue::Map(result))
    }
}

/// Length-only scorer returning a bare number, `min(words / 50, 1)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LengthScorer;

impl RewardScorer for LengthScorer {
    fn compute_score(&self, sample: &Sample, _reward_kwargs: &RewardKwargs) -> Result<RewardValue> {
        let words = word_count(&sample.response_text) as f64;
        Ok(RewardValue::Number((words / 50.0).min(1.0)))
    }
}

/// Smoke-test scorer preferring 10-50 word answers that mention a ground-truth word.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordLengthScorer;

impl RewardScorer for KeywordLengthScorer {
    fn compute_score(&self, sample: &Sample, _reward_kwargs: &RewardKwargs) -> Result<RewardValue> {
        let response_length = word_count(&sample.response_text);
        let length_score = if response_length < 10 {
            response_length as f64 / 10.0
        } else if response_length > 50 {
            50.0 / response_length as f64
        } else {
            1.0
        };

        let response_lower = sample.response_text.to_lowercase();
        let relevance_score = if sample
            .ground_truth
            .split_whitespace()
            .any(|word| response_lower.contains(&word.to_lowercase()))
        {
            1.0
        } else {
            0.3
        };

        let mut result = BTreeMap::new();
        result.insert(
            MAIN_SCORE_KEY.to_string(),
            RewardValue::Number(0.5 * length_score + 0.5 * relevance_score),
        );
        result.insert("length_score".to_string(), length_score.into());
        result.insert("relevance_score".to_string(), relevance_score.into());
        result.insert("word_count".to_string(), response_length.into());
        Ok(RewardValue::Map(result))
    }
}

fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

#[cfg(test)]
mod tests {
    use super::{KeywordLengthScorer, LengthScorer, SubRewardScorer};
    use crate::RewardScorer;
    use tau_reward_types::{RewardKwargs, RewardValue, Sample};

    fn field(value: &RewardValue, name: &str) -> RewardValue {
        let RewardValue::Map(entries) = value else {
            panic!("expected structured result");
        };
        entries[name].clone()
    }

    #[test]
    fn sub_reward_scorer_combines_weighted_components() {
        let sample = Sample::new(
            "geography",
            "The capital of France is Paris, a beautiful city with rich history.",
            "Paris",
        );
        let value = SubRewardScorer
            .compute_score(&sample, &RewardKwargs::new())
            .expect("score");

        assert_eq!(field(&value, "fluency_score"), RewardValue::Number(1.0));
        assert_eq!(field(&value, "relevance_score"), RewardValue::Number(1.0));
        assert_eq!(field(&value, "safety_score"), RewardValue::Number(1.0));
        assert_eq!(field(&value, "response_length"), RewardValue::Number(12.0));
        assert_eq!(field(&value, "data_source"), RewardValue::from("geography"));
        let score = field(&value, "score").as_f64().expect("numeric score");
        assert!((score - 1.0).abs() < 1e-12);
    }

    #[test]
    fn sub_reward_scorer_penalizes_short_unsafe_answers_and_honors_kwargs() {
        let sample = Sample::new("misc", "illegal plan", "something else");
        let mut kwargs = RewardKwargs::new();
        kwargs.insert("min_length".to_string(), RewardValue::Number(4.0));
        kwargs.insert("fluency_weight".to_string(), RewardValue::Number(1.0));
        kwargs.insert("relevance_weight".to_string(), RewardValue::Number(0.0));
        kwargs.insert("safety_weight".to_string(), RewardValue::Number(0.0));

        let value = SubRewardScorer.compute_score(&sample, &kwargs).expect("score");
        assert_eq!(field(&value, "fluency_score"), RewardValue::Number(0.5));
        assert_eq!(field(&value, "relevance_score"), RewardValue::Number(0.5));
        assert_eq!(field(&value, "safety_score"), RewardValue::Number(0.0));
        assert_eq!(field(&value, "score"), RewardValue::Number(0.5));
    }

    #[test]
    fn sub_reward_scorer_rejects_malformed_kwargs() {
        let mut kwargs = RewardKwargs::new();
        kwargs.insert("max_length".to_string(), RewardValue::from("long"));
        let error = SubRewardScorer
            .compute_score(&Sample::new("ds", "text", "truth"), &kwargs)
            .expect_err("malformed kwarg");
        assert!(error.to_string().contains("max_length"));
    }

    #[test]
    fn length_scorer_returns_bare_number() {
        let sample = Sample::new("ds", "one two three four five", "");
        assert_eq!(
            LengthScorer
                .compute_score(&sample, &RewardKwargs::new())
                .expect("score"),
            RewardValue::Number(0.1)
        );
    }

    #[test]
    fn keyword_length_scorer_matches_any_ground_truth_word() {
        let sample = Sample::new("colors", "red is a primary color", "red blue yellow");
        let value = KeywordLengthScorer
            .compute_score(&sample, &RewardKwargs::new())
            .expect("score");

        assert_eq!(field(&value, "length_score"), RewardValue::Number(0.5));
        assert_eq!(field(&value, "relevance_score"), RewardValue::Number(1.0));
        assert_eq!(field(&value, "word_count"), RewardValue::Number(5.0));
        assert_eq!(field(&value, "score"), RewardValue::Number(0.75));
    }
}
