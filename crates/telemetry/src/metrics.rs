//! Prometheus metrics for MEV Shield.

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};

/// Metrics collector shared by the walker, scanner and protection service.
///
/// Each instance owns its registry, so several collectors can coexist in
/// one process (tests build one per case). Clones share the same series.
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    blocks_processed: IntCounter,
    transactions_processed: IntCounter,
    mev_detections: IntCounterVec,
    ledger_errors: IntCounter,
    ledger_latency: HistogramVec,
    scans: IntCounterVec,
    alerts_published: IntCounter,
    subscribers_pruned: IntCounter,
}

impl Metrics {
    /// Create a new metrics instance.
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let blocks_processed = IntCounter::new(
            "mev_shield_blocks_processed_total",
            "Total number of blocks classified",
        )?;
        registry.register(Box::new(blocks_processed.clone()))?;

        let transactions_processed = IntCounter::new(
            "mev_shield_transactions_processed_total",
            "Total number of transactions classified",
        )?;
        registry.register(Box::new(transactions_processed.clone()))?;

        let mev_detections = IntCounterVec::new(
            Opts::new(
                "mev_shield_mev_detections_total",
                "MEV classifications by kind",
            ),
            &["kind"],
        )?;
        registry.register(Box::new(mev_detections.clone()))?;

        let ledger_errors = IntCounter::new(
            "mev_shield_ledger_errors_total",
            "Total number of failed ledger calls",
        )?;
        registry.register(Box::new(ledger_errors.clone()))?;

        let ledger_latency = HistogramVec::new(
            HistogramOpts::new(
                "mev_shield_ledger_latency_seconds",
                "Ledger call latency in seconds",
            ),
            &["operation"],
        )?;
        registry.register(Box::new(ledger_latency.clone()))?;

        let scans = IntCounterVec::new(
            Opts::new(
                "mev_shield_contract_scans_total",
                "Contract scans by lifecycle event",
            ),
            &["status"],
        )?;
        registry.register(Box::new(scans.clone()))?;

        let alerts_published = IntCounter::new(
            "mev_shield_alerts_published_total",
            "Total number of protection alerts published",
        )?;
        registry.register(Box::new(alerts_published.clone()))?;

        let subscribers_pruned = IntCounter::new(
            "mev_shield_subscribers_pruned_total",
            "Subscriber handles dropped after a failed or closed delivery",
        )?;
        registry.register(Box::new(subscribers_pruned.clone()))?;

        Ok(Self {
            registry,
            blocks_processed,
            transactions_processed,
            mev_detections,
            ledger_errors,
            ledger_latency,
            scans,
            alerts_published,
            subscribers_pruned,
        })
    }

    /// Increment the blocks processed counter.
    pub fn inc_blocks_processed(&self) {
        self.blocks_processed.inc();
    }

    /// Increment the transactions processed counter.
    pub fn inc_transactions_processed(&self, count: u64) {
        self.transactions_processed.inc_by(count);
    }

    /// Count one MEV classification of the given kind.
    pub fn inc_mev_detection(&self, kind: &str) {
        self.mev_detections.with_label_values(&[kind]).inc();
    }

    /// Increment the ledger errors counter.
    pub fn inc_ledger_errors(&self) {
        self.ledger_errors.inc();
    }

    /// Record ledger call latency.
    pub fn observe_ledger_latency(&self, operation: &str, duration_secs: f64) {
        self.ledger_latency
            .with_label_values(&[operation])
            .observe(duration_secs);
    }

    /// Count a scan lifecycle event ("submitted", "completed", "failed").
    pub fn inc_scans(&self, status: &str) {
        self.scans.with_label_values(&[status]).inc();
    }

    pub fn inc_alerts_published(&self) {
        self.alerts_published.inc();
    }

    pub fn inc_subscribers_pruned(&self, count: u64) {
        self.subscribers_pruned.inc_by(count);
    }

    /// Get Prometheus metrics as a string.
    pub fn gather(&self) -> anyhow::Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}
