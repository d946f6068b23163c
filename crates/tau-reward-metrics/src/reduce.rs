//! Summary statistics over per-sample signal values.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tau_reward_types::{ExtraSlot, MetricsReport, RewardValue};

/// Optional outputs of the reducer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReduceOptions {
    /// Also emit `<namespace>/<signal>/count`.
    pub include_count: bool,
}

/// Statistics for one named signal after filtering.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SignalSummary {
    pub count: usize,
    pub mean: f64,
    pub max: f64,
    pub min: f64,
    /// Population standard deviation; zero with fewer than two values.
    pub std: f64,
}

impl SignalSummary {
    /// Summarizes the finite entries of `values`; `None` when none are finite.
    pub fn from_values(values: &[f64]) -> Option<Self> {
        let finite = values
            .iter()
            .copied()
            .filter(|value| value.is_finite())
            .collect::<Vec<_>>();
        if finite.is_empty() {
            return None;
        }

        let count = finite.len();
        let max = finite.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let min = finite.iter().copied().fold(f64::INFINITY, f64::min);
        let scale = max.abs().max(min.abs());
        if scale == 0.0 {
            return Some(Self {
                count,
                mean: 0.0,
                max,
                min,
                std: 0.0,
            });
        }

        // Welford's running mean and M2 over values scaled into [-1, 1].
        let mut scaled_mean = 0.0_f64;
        let mut scaled_m2 = 0.0_f64;
        for (index, value) in finite.iter().enumerate() {
            let scaled = value / scale;
            let delta = scaled - scaled_mean;
            scaled_mean += delta / (index + 1) as f64;
            scaled_m2 += delta * (scaled - scaled_mean);
        }

        let sum = finite.iter().sum::<f64>();
        let mean = if sum.is_finite() {
            sum / count as f64
        } else {
            scaled_mean * scale
        }
        .clamp(min, max);
        let std = if count < 2 {
            0.0
        } else {
            (scaled_m2 / count as f64).max(0.0).sqrt() * scale
        };

        Some(Self {
            count,
            mean,
            max,
            min,
            std,
        })
    }
}

/// Builds a `namespace/signal/statistic` metrics key.
pub fn metric_key(namespace: &str, signal: &str, statistic: &str) -> String {
    format!("{namespace}/{signal}/{statistic}")
}

/// Flattens nested lists and coerces leaves to numbers, preserving order.
///
/// Numbers pass through (including non-finite ones), booleans become 1.0 or
/// 0.0, and every other leaf is dropped.
pub fn numeric_values<'a, I>(values: I) -> Vec<f64>
where
    I: IntoIterator<Item = &'a RewardValue>,
{
    let mut numbers = Vec::new();
    let mut pending = values.into_iter().collect::<Vec<_>>();
    pending.reverse();

    while let Some(value) = pending.pop() {
        match value {
            RewardValue::Number(number) => numbers.push(*number),
            RewardValue::Bool(flag) => numbers.push(if *flag { 1.0 } else { 0.0 }),
            RewardValue::List(items) => pending.extend(items.iter().rev()),
            RewardValue::Null | RewardValue::Text(_) | RewardValue::Map(_) => {}
        }
    }
    numbers
}

/// Numeric view of one signal's slots; not-reported slots contribute nothing.
pub fn signal_values(slots: &[ExtraSlot]) -> Vec<f64> {
    numeric_values(slots.iter().filter_map(ExtraSlot::value))
}

/// Summarizes one signal, or `None` when nothing numeric and finite remains.
pub fn summarize_signal(slots: &[ExtraSlot]) -> Option<SignalSummary> {
    SignalSummary::from_values(&signal_values(slots))
}

/// Appends the statistics of one signal to `report`; skipped signals add nothing.
pub fn append_signal_metrics(
    report: &mut MetricsReport,
    namespace: &str,
    signal: &str,
    slots: &[ExtraSlot],
    options: ReduceOptions,
) {
    let Some(summary) = summarize_signal(slots) else {
        tracing::debug!(
            namespace,
            signal,
            slots = slots.len(),
            "skipping reward signal without finite numeric values"
        );
        return;
    };

    report.insert(metric_key(namespace, signal, "mean"), summary.mean);
    report.insert(metric_key(namespace, signal, "max"), summary.max);
    report.insert(metric_key(namespace, signal, "min"), summary.min);
    report.insert(metric_key(namespace, signal, "std"), summary.std);
    if options.include_count {
        report.insert(metric_key(namespace, signal, "count"), summary.count as f64);
    }
}

/// Reduces every named signal into mean/max/min/std metrics under `namespace`.
pub fn reduce(extras_by_name: &BTreeMap<String, Vec<ExtraSlot>>, namespace: &str) -> MetricsReport {
    reduce_with_options(extras_by_name, namespace, ReduceOptions::default())
}

/// [`reduce`] with optional outputs such as per-signal counts.
#[tracing::instrument(level = "debug", skip(extras_by_name))]
pub fn reduce_with_options(
    extras_by_name: &BTreeMap<String, Vec<ExtraSlot>>,
    namespace: &str,
    options: ReduceOptions,
) -> MetricsReport {
    let mut report = MetricsReport::new();
    for (signal, slots) in extras_by_name {
        append_signal_metrics(&mut report, namespace, signal, slots, options);
    }
    report
}
