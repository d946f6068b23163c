use std::collections::BTreeMap;
use std::io::Write;
use std::num::NonZeroUsize;

use anyhow::{bail, Context, Result};
use serde_json::Value;
use tau_reward_metrics::{reduce_with_options, ReduceOptions};
use tau_reward_scoring::ScorerRegistry;
use tau_reward_trainer::{JsonlSampleSource, RewardStage, RewardStageConfig, RewardTrainer};
use tau_reward_types::{ExtraSlot, MetricsReport, RewardValue};

use crate::cli_args::{ReduceArgs, RunArgs};

pub(crate) async fn execute_run(args: RunArgs, registry: &ScorerRegistry) -> Result<()> {
    let config = match &args.config {
        Some(path) => RewardStageConfig::load(path)?,
        None => RewardStageConfig::default(),
    };
    let stage = RewardStage::from_registry(registry, config)?;
    let batch_size =
        NonZeroUsize::new(args.batch_size).context("batch size must be greater than 0")?;
    let trainer = RewardTrainer::new(stage, batch_size);
    tracing::info!(
        scorer = %trainer.stage().config().custom_reward_function.name,
        mode = ?trainer.stage().training_mode(),
        batch_size = args.batch_size,
        "starting reward run"
    );

    let train = JsonlSampleSource::open(&args.train).await?;
    let val = match &args.val {
        Some(path) => Some(JsonlSampleSource::open(path).await?),
        None => None,
    };

    let stdout = std::io::stdout();
    let summary = trainer
        .fit_with(Some(train), val, |report| {
            let line = serde_json::to_string(report).context("failed to encode step report")?;
            let mut handle = stdout.lock();
            writeln!(handle, "{line}").context("failed to write step report")?;
            Ok(())
        })
        .await?;
    tracing::info!(
        steps = summary.steps.len(),
        validated = summary.validation.is_some(),
        "reward run finished"
    );
    Ok(())
}

pub(crate) fn execute_reduce(args: ReduceArgs) -> Result<()> {
    let extras = parse_extras(&args.extras)?;
    let report = reduce_with_options(
        &extras,
        &args.namespace,
        ReduceOptions {
            include_count: args.count,
        },
    );
    println!("{}", render_report(&report)?);
    Ok(())
}

pub(crate) fn execute_scorers(registry: &ScorerRegistry) {
    for name in registry.names() {
        println!("{name}");
    }
}

fn parse_extras(raw: &str) -> Result<BTreeMap<String, Vec<ExtraSlot>>> {
    let parsed: Value = serde_json::from_str(raw).context("--extras must be valid JSON")?;
    let Value::Object(entries) = parsed else {
        bail!("--extras must be a JSON object mapping signal names to value lists");
    };

    let mut extras = BTreeMap::new();
    for (name, values) in entries {
        let Value::Array(values) = values else {
            bail!("--extras signal '{name}' must be a JSON array");
        };
        let slots = values
            .into_iter()
            .map(|value| ExtraSlot::Reported(RewardValue::from(value)))
            .collect();
        extras.insert(name, slots);
    }
    Ok(extras)
}

fn render_report(report: &MetricsReport) -> Result<String> {
    serde_json::to_string_pretty(report).context("failed to encode metrics report")
}

#[cfg(test)]
mod tests {
    use super::parse_extras;
    use tau_reward_types::{ExtraSlot, RewardValue};

    #[test]
    fn parse_extras_keeps_every_value_as_reported() {
        let extras = parse_extras(r#"{"fluency": [0.8, "bad", null]}"#).expect("parse");
        assert_eq!(
            extras["fluency"],
            vec![
                ExtraSlot::Reported(RewardValue::Number(0.8)),
                ExtraSlot::Reported(RewardValue::from("bad")),
                ExtraSlot::Reported(RewardValue::Null),
            ]
        );
    }

    #[test]
    fn parse_extras_rejects_non_array_signals() {
        let error = parse_extras(r#"{"fluency": 0.8}"#).expect_err("scalar signal");
        assert!(error.to_string().contains("'fluency' must be a JSON array"));
        assert!(parse_extras("[1, 2]").is_err());
    }
}
