//! Counters and timings emitted through the `metrics` facade.
//!
//! Nothing is recorded unless the host process installs a recorder.

use metrics::{counter, describe_counter, describe_histogram, histogram};
use std::time::Duration;

pub const RANK_CYCLES: &str = "referral_rank_cycles_total";
pub const METRICS_COMPUTED: &str = "referral_metrics_computed_total";
pub const SWEEP_ERRORS: &str = "referral_sweep_errors_total";
pub const SWEEP_DURATION: &str = "referral_sweep_duration_seconds";

/// Register descriptions with the installed recorder
pub fn describe() {
    describe_counter!(RANK_CYCLES, "Cycles detected while walking the recruitment graph");
    describe_counter!(METRICS_COMPUTED, "Metrics snapshots computed and cached");
    describe_counter!(SWEEP_ERRORS, "Partners that failed during a bulk recompute");
    describe_histogram!(SWEEP_DURATION, "Wall time of a bulk recompute");
}

pub(crate) fn record_cycle() {
    counter!(RANK_CYCLES).increment(1);
}

pub(crate) fn record_metrics_computed() {
    counter!(METRICS_COMPUTED).increment(1);
}

pub(crate) fn record_sweep(errors: usize, elapsed: Duration) {
    counter!(SWEEP_ERRORS).increment(errors as u64);
    histogram!(SWEEP_DURATION).record(elapsed.as_secs_f64());
}
