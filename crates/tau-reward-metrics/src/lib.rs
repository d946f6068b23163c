//! Metrics reduction for auxiliary reward signals.
//!
//! Reduction never fails: values that cannot be read as finite numbers are
//! dropped, and signals left with nothing to summarize emit no keys.

mod reduce;

pub use reduce::{
    append_signal_metrics, metric_key, numeric_values, reduce, reduce_with_options,
    signal_values, summarize_signal, ReduceOptions, SignalSummary,
};
