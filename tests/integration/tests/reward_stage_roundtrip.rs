use std::{
    collections::VecDeque,
    num::NonZeroUsize,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::json;
use tau_reward_scoring::{FnScorer, RewardScorer, ScorerRegistry};
use tau_reward_trainer::{
    RewardStage, RewardStageConfig, RewardTrainer, SampleSource, StepPhase,
};
use tau_reward_types::{RewardValue, Sample};

/// Source that records how many batches were handed out.
struct CountingSource {
    samples: VecDeque<Sample>,
    batches_served: Arc<AtomicUsize>,
}

#[async_trait]
impl SampleSource for CountingSource {
    async fn next_batch(&mut self, batch_size: usize) -> Result<Option<Vec<Sample>>> {
        let batch = self.samples.next_batch(batch_size).await?;
        if batch.is_some() {
            self.batches_served.fetch_add(1, Ordering::SeqCst);
        }
        Ok(batch)
    }
}

fn rollout(step: usize, index: usize) -> Sample {
    Sample::new(
        if index % 2 == 0 { "math" } else { "qa" },
        format!("answer {index} for step {step} mentions the keyword"),
        format!("step-{step}"),
    )
}

fn rollouts(steps: usize, per_step: usize) -> VecDeque<Sample> {
    (1..=steps)
        .flat_map(|step| (0..per_step).map(move |index| rollout(step, index)))
        .collect()
}

fn structured_scorer() -> Arc<dyn RewardScorer> {
    Arc::new(FnScorer::new(|sample, kwargs| {
        let weight = kwargs
            .get("weight")
            .and_then(RewardValue::as_f64)
            .unwrap_or(1.0);
        let words = sample.response_text.split_whitespace().count() as f64;
        let mut result = json!({
            "score": weight * words / 10.0,
            "word_count": words,
            "per_token": [[0.1, 0.2], [0.3]],
            "label": sample.data_source,
        });
        if sample.data_source == "math" {
            result["math_bonus"] = json!(true);
        }
        Ok(RewardValue::from(result))
    }))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn integration_overlapped_scoring_runs_while_next_batch_is_fetched() {
    let batches_served = Arc::new(AtomicUsize::new(0));
    let observed_overlap = Arc::new(AtomicBool::new(false));

    let scorer = {
        let batches_served = batches_served.clone();
        let observed_overlap = observed_overlap.clone();
        Arc::new(FnScorer::new(move |sample, _| {
            if sample.ground_truth == "step-1" {
                let deadline = Instant::now() + Duration::from_secs(5);
                while batches_served.load(Ordering::SeqCst) < 2 && Instant::now() < deadline {
                    std::thread::sleep(Duration::from_millis(5));
                }
                if batches_served.load(Ordering::SeqCst) >= 2 {
                    observed_overlap.store(true, Ordering::SeqCst);
                }
            }
            Ok(RewardValue::Number(1.0))
        }))
    };

    let config = RewardStageConfig {
        launch_reward_fn_async: true,
        max_parallel_scorers: Some(2),
        ..RewardStageConfig::default()
    };
    let trainer = RewardTrainer::new(
        RewardStage::new(scorer, config).expect("stage"),
        NonZeroUsize::new(2).expect("non-zero"),
    );
    let source = CountingSource {
        samples: rollouts(2, 2),
        batches_served: batches_served.clone(),
    };

    let summary = trainer
        .fit(Some(source), None::<VecDeque<Sample>>)
        .await
        .expect("fit");
    assert_eq!(summary.steps.len(), 2);
    assert!(observed_overlap.load(Ordering::SeqCst));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn integration_train_and_validate_report_identical_metrics_in_both_modes() {
    let mut summaries = Vec::new();
    for launch_reward_fn_async in [false, true] {
        let mut config = RewardStageConfig {
            launch_reward_fn_async,
            emit_count: true,
            ..RewardStageConfig::default()
        };
        config
            .custom_reward_function
            .reward_kwargs
            .insert("weight".to_string(), RewardValue::Number(0.5));
        let trainer = RewardTrainer::new(
            RewardStage::new(structured_scorer(), config).expect("stage"),
            NonZeroUsize::new(3).expect("non-zero"),
        );
        summaries.push(
            trainer
                .fit(Some(rollouts(3, 3)), Some(rollouts(1, 4)))
                .await
                .expect("fit"),
        );
    }

    let (sequential, overlapped) = (&summaries[0], &summaries[1]);
    assert_eq!(sequential.steps.len(), 3);
    for (left, right) in sequential.steps.iter().zip(&overlapped.steps) {
        assert_eq!(left.rewards, right.rewards);
        assert_eq!(left.metrics, right.metrics);
    }

    let step = &overlapped.steps[0];
    assert_eq!(step.phase, StepPhase::Train);
    assert_eq!(step.metrics.get("reward/math_bonus/count"), Some(2.0));
    assert_eq!(step.metrics.get("reward/math_bonus/mean"), Some(1.0));
    assert_eq!(step.metrics.get("reward/per_token/count"), Some(9.0));
    assert!(!step.metrics.contains_key("reward/label/mean"));
    assert_eq!(step.metrics.get("reward/score/count"), Some(3.0));

    let validation = overlapped.validation.as_ref().expect("validation");
    assert_eq!(validation.rewards.len(), 4);
    assert!(validation.metrics.keys().all(|key| !key.starts_with("reward/")));
    assert_eq!(validation.metrics.get("val-reward/word_count/count"), Some(4.0));
}

#[tokio::test]
async fn integration_missing_score_aborts_without_partial_metrics() {
    let scorer = Arc::new(FnScorer::new(|sample, _| {
        if sample.response_text.starts_with("answer 1 ") && sample.ground_truth == "step-2" {
            Ok(RewardValue::from(json!({ "fluency": 0.5 })))
        } else {
            Ok(RewardValue::Number(0.25))
        }
    }));
    let trainer = RewardTrainer::new(
        RewardStage::new(scorer, RewardStageConfig::default()).expect("stage"),
        NonZeroUsize::new(2).expect("non-zero"),
    );

    let mut completed = Vec::new();
    let error = trainer
        .fit_with(Some(rollouts(3, 2)), None::<VecDeque<Sample>>, |report| {
            completed.push(report.step);
            Ok(())
        })
        .await
        .expect_err("missing score");
    let rendered = format!("{error:#}");
    assert!(rendered.contains("training step 2 failed"), "{rendered}");
    assert!(rendered.contains("sample 1"), "{rendered}");
    assert!(rendered.contains("'score'"), "{rendered}");
    assert_eq!(completed, vec![1]);
}

#[tokio::test]
async fn integration_registry_scorer_runs_with_configured_kwargs() {
    let mut registry = ScorerRegistry::with_builtins();
    registry.register(
        "always_fails",
        Arc::new(FnScorer::new(|_, _| Err(anyhow!("judge offline")))),
    );

    let config = RewardStageConfig::from_toml_str(
        r#"
[custom_reward_function]
name = "test_reward_with_subrewards"
"#,
        "inline.toml",
    )
    .expect("config");
    let trainer = RewardTrainer::new(
        RewardStage::from_registry(&registry, config).expect("stage"),
        NonZeroUsize::new(4).expect("non-zero"),
    );
    let summary = trainer
        .fit(Some(rollouts(1, 4)), None::<VecDeque<Sample>>)
        .await
        .expect("fit");
    let metrics = &summary.steps[0].metrics;
    assert!(metrics.contains_key("reward/length_score/mean"));
    assert!(metrics.contains_key("reward/word_count/max"));

    let mut failing = RewardStageConfig::default();
    failing.custom_reward_function.name = "always_fails".to_string();
    let trainer = RewardTrainer::new(
        RewardStage::from_registry(&registry, failing).expect("stage"),
        NonZeroUsize::new(4).expect("non-zero"),
    );
    let error = trainer
        .fit(Some(rollouts(1, 1)), None::<VecDeque<Sample>>)
        .await
        .expect_err("scorer failure");
    assert!(format!("{error:#}").contains("judge offline"));
}
