//! Metrics Module - Prometheus Instrumentation
//!
//! - Prometheus registry
//! - Counters per pipeline stage
//! - Stage duration histogram
//! - Clean helper API

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use lazy_static::lazy_static;
use std::time::Instant;

use crate::error::Result;

/// Standard latency buckets for histograms (seconds)
const LATENCY_BUCKETS: &[f64] = &[0.001, 0.01, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 300.0, 1800.0];

lazy_static! {
    /// Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // ========================================================================
    // 1. LOADING
    // ========================================================================

    /// Records bound successfully
    /// Labels: dataset (transactions, blocks)
    pub static ref RECORDS_LOADED: IntCounterVec = IntCounterVec::new(
        Opts::new("whaleblox_records_loaded_total", "Records loaded by dataset"),
        &["dataset"]
    ).unwrap();

    /// Lines skipped because they failed schema binding or validation
    pub static ref RECORDS_REJECTED: IntCounterVec = IntCounterVec::new(
        Opts::new("whaleblox_records_rejected_total", "Malformed records skipped by dataset"),
        &["dataset"]
    ).unwrap();

    // ========================================================================
    // 2. DERIVATION
    // ========================================================================

    /// Flat rows produced by the exploder
    /// Labels: kind (inputs, outputs), row (element, placeholder)
    pub static ref ROWS_EXPLODED: IntCounterVec = IntCounterVec::new(
        Opts::new("whaleblox_rows_exploded_total", "Flat rows produced by the exploder"),
        &["kind", "row"]
    ).unwrap();

    /// Distinct spent references of the last UTXO run
    pub static ref SPENT_REFERENCES: IntGauge = IntGauge::new(
        "whaleblox_spent_references",
        "Distinct (transaction_hash, output_index) pairs spent by non-coinbase inputs"
    ).unwrap();

    /// Size of the last computed UTXO set
    pub static ref UTXO_SET_SIZE: IntGauge = IntGauge::new(
        "whaleblox_utxo_set_size",
        "Rows in the last computed UTXO set"
    ).unwrap();

    /// Spent references with no output row (partial-history signal)
    pub static ref DANGLING_SPENDS: IntGauge = IntGauge::new(
        "whaleblox_dangling_spends",
        "Spent references without a matching output in the supplied data"
    ).unwrap();

    /// Clustering rows by address source
    /// Labels: source (source_output, embedded)
    pub static ref CLUSTER_ROWS: IntCounterVec = IntCounterVec::new(
        Opts::new("whaleblox_cluster_rows_total", "Clustering rows emitted by address source"),
        &["source"]
    ).unwrap();

    /// Inputs dropped because no address could be resolved
    pub static ref CLUSTER_UNRESOLVED: IntCounter = IntCounter::new(
        "whaleblox_cluster_unresolved_total",
        "Qualifying inputs dropped without a resolvable address"
    ).unwrap();

    // ========================================================================
    // 3. LATENCY
    // ========================================================================

    /// Stage duration
    /// Labels: stage (load_transactions, load_blocks, explode_outputs, utxo_set, clustering_inputs)
    pub static ref STAGE_DURATION: HistogramVec = HistogramVec::new(
        HistogramOpts::new("whaleblox_stage_duration_seconds", "Duration of pipeline stages")
            .buckets(LATENCY_BUCKETS.to_vec()),
        &["stage"]
    ).unwrap();
}

lazy_static! {
    /// Outcome of the one-time registration, replayed to every caller
    static ref REGISTERED: std::result::Result<(), String> =
        register_all().map_err(|e| e.to_string());
}

/// Register all metrics with the global registry.
///
/// Registration runs once. Later calls return the first outcome, so a failed
/// registration keeps failing instead of reporting success.
pub fn init_metrics() -> Result<()> {
    REGISTERED
        .clone()
        .map_err(|msg| prometheus::Error::Msg(msg).into())
}

fn register_all() -> prometheus::Result<()> {
    REGISTRY.register(Box::new(RECORDS_LOADED.clone()))?;
    REGISTRY.register(Box::new(RECORDS_REJECTED.clone()))?;
    REGISTRY.register(Box::new(ROWS_EXPLODED.clone()))?;
    REGISTRY.register(Box::new(SPENT_REFERENCES.clone()))?;
    REGISTRY.register(Box::new(UTXO_SET_SIZE.clone()))?;
    REGISTRY.register(Box::new(DANGLING_SPENDS.clone()))?;
    REGISTRY.register(Box::new(CLUSTER_ROWS.clone()))?;
    REGISTRY.register(Box::new(CLUSTER_UNRESOLVED.clone()))?;
    REGISTRY.register(Box::new(STAGE_DURATION.clone()))?;
    Ok(())
}

/// Gather metrics in Prometheus text format
pub fn gather_metrics() -> Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = vec![];
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

/// Timer for measuring durations
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }

    /// Record elapsed time for a stage and consume the timer
    pub fn observe_stage(self, stage: &str) -> f64 {
        let elapsed = self.elapsed_secs();
        STAGE_DURATION.with_label_values(&[stage]).observe(elapsed);
        elapsed
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

pub fn increment_records_loaded(dataset: &str, count: u64) {
    RECORDS_LOADED.with_label_values(&[dataset]).inc_by(count);
}

pub fn increment_records_rejected(dataset: &str, count: u64) {
    RECORDS_REJECTED.with_label_values(&[dataset]).inc_by(count);
}

pub fn increment_rows_exploded(kind: &str, row: &str, count: u64) {
    ROWS_EXPLODED.with_label_values(&[kind, row]).inc_by(count);
}

pub fn set_spent_references(count: usize) {
    SPENT_REFERENCES.set(count as i64);
}

pub fn set_utxo_set_size(count: usize) {
    UTXO_SET_SIZE.set(count as i64);
}

pub fn set_dangling_spends(count: usize) {
    DANGLING_SPENDS.set(count as i64);
}

pub fn increment_cluster_rows(source: &str, count: u64) {
    CLUSTER_ROWS.with_label_values(&[source]).inc_by(count);
}

pub fn increment_cluster_unresolved(count: u64) {
    CLUSTER_UNRESOLVED.inc_by(count);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_metrics_is_idempotent() {
        init_metrics().unwrap();
        init_metrics().unwrap();
    }

    #[test]
    fn test_registration_outcome_is_replayed() {
        init_metrics().unwrap();

        // Registering the same collectors again is the failure a second
        // registration pass would hit
        let again = register_all();
        assert!(again.is_err());

        // The recorded outcome is not overwritten by it
        assert!(init_metrics().is_ok());
        assert_eq!(*REGISTERED, Ok(()));
    }

    #[test]
    fn test_gather_metrics() {
        init_metrics().unwrap();

        increment_records_loaded("transactions", 10);
        set_utxo_set_size(42);

        let output = gather_metrics().unwrap();
        assert!(output.contains("whaleblox_records_loaded_total"));
        assert!(output.contains("whaleblox_utxo_set_size"));
    }

    #[test]
    fn test_timer() {
        let timer = Timer::new();
        std::thread::sleep(std::time::Duration::from_millis(10));
        assert!(timer.elapsed_secs() >= 0.01);
    }
}
