//! Prometheus metrics for registry traffic
//!
//! Tracks committed/failed cut batches, selector churn and the number of
//! storage words each batch reads and writes.

use crate::registry::CutReport;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use std::sync::Once;
use tracing::{error, info};

lazy_static::lazy_static! {
    /// Global metrics registry
    pub static ref METRICS_REGISTRY: Registry = Registry::new();

    pub static ref BATCHES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("facetdb_cut_batches_total", "Cut batches by outcome"),
        &["status"]
    ).unwrap();

    pub static ref SELECTORS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("facetdb_selectors_total", "Selectors changed by action"),
        &["action"]
    ).unwrap();

    pub static ref WORD_READS: IntCounter = IntCounter::new(
        "facetdb_word_reads_total",
        "Slot words read by cut batches"
    ).unwrap();

    pub static ref WORD_WRITES: IntCounter = IntCounter::new(
        "facetdb_word_writes_total",
        "Slot words written by cut batches"
    ).unwrap();

    pub static ref LIVE_SELECTORS: IntGauge = IntGauge::new(
        "facetdb_live_selectors",
        "Selectors currently bound to a facet"
    ).unwrap();
}

static INIT: Once = Once::new();

/// Register all metrics with the global registry
pub fn init_metrics() {
    INIT.call_once(|| {
        info!("Initializing Prometheus metrics");

        METRICS_REGISTRY.register(Box::new(BATCHES_TOTAL.clone())).ok();
        METRICS_REGISTRY.register(Box::new(SELECTORS_TOTAL.clone())).ok();
        METRICS_REGISTRY.register(Box::new(WORD_READS.clone())).ok();
        METRICS_REGISTRY.register(Box::new(WORD_WRITES.clone())).ok();
        METRICS_REGISTRY.register(Box::new(LIVE_SELECTORS.clone())).ok();
    });
}

/// Record a committed batch
pub fn record_commit(report: &CutReport, live: usize) {
    BATCHES_TOTAL.with_label_values(&["committed"]).inc();
    SELECTORS_TOTAL
        .with_label_values(&["added"])
        .inc_by(report.added as u64);
    SELECTORS_TOTAL
        .with_label_values(&["replaced"])
        .inc_by(report.replaced as u64);
    SELECTORS_TOTAL
        .with_label_values(&["removed"])
        .inc_by(report.removed as u64);
    WORD_READS.inc_by(report.word_reads);
    WORD_WRITES.inc_by(report.word_writes);
    LIVE_SELECTORS.set(live as i64);
}

/// Record a rejected or failed batch
pub fn record_failure() {
    BATCHES_TOTAL.with_label_values(&["failed"]).inc();
}

/// Export all metrics in Prometheus text format
pub fn export_metrics() -> String {
    init_metrics();

    let encoder = TextEncoder::new();
    let metric_families = METRICS_REGISTRY.gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!(error = %e, "Failed to encode metrics");
        return String::from("# Error encoding metrics\n");
    }

    String::from_utf8(buffer).unwrap_or_else(|_| String::from("# Error converting metrics\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_metrics_twice() {
        init_metrics();
        init_metrics();
    }

    #[test]
    fn test_record_commit_exported() {
        let report = CutReport {
            added: 3,
            replaced: 1,
            word_writes: 4,
            ..CutReport::default()
        };
        record_commit(&report, 3);
        let text = export_metrics();
        assert!(text.contains("facetdb_cut_batches_total"));
        assert!(text.contains("facetdb_word_writes_total"));
    }

    #[test]
    fn test_record_failure() {
        let before = BATCHES_TOTAL.with_label_values(&["failed"]).get();
        record_failure();
        assert!(BATCHES_TOTAL.with_label_values(&["failed"]).get() > before);
    }
}
