//! Production metrics using native Prometheus client.
//!
//! Metrics are domain-specific rather than generic event counters.
//! Use traces for event-level granularity during investigations.

use prometheus::{
    register_counter, register_counter_vec, register_gauge, register_histogram,
    register_histogram_vec, Counter, CounterVec, Encoder, Gauge, Histogram, HistogramVec,
    TextEncoder,
};
use std::sync::OnceLock;
use tallyscan_classifier::Rejection;
use tallyscan_engine::{
    BlockOutcome, EngineObserver, InterpretResult, Interpretation, Progress, RecoveryOutcome,
};
use tallyscan_types::{BlockHeader, BlockHeight, Hash, Intent};

static METRICS: OnceLock<Metrics> = OnceLock::new();

/// Domain-specific metrics for production monitoring.
pub struct Metrics {
    // === Scanning ===
    pub blocks_processed: Counter,
    pub blocks_skipped: Counter,
    pub block_processing_latency: Histogram,
    pub watermark: Gauge,
    pub scan_progress_percent: Gauge,

    // === Transactions ===
    pub transactions_classified: CounterVec,
    pub transactions_rejected: CounterVec,

    // === State ===
    pub checkpoints_written: Counter,
    pub recoveries: CounterVec,
    pub state_invalidations: Counter,
    pub shutdown_requests: Counter,

    // === Storage ===
    pub kv_latency: HistogramVec,
}

impl Metrics {
    fn new() -> Self {
        // Latency buckets: 100us to 10s
        let latency_buckets = vec![
            0.0001, 0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 10.0,
        ];

        Self {
            blocks_processed: register_counter!(
                "tallyscan_blocks_processed_total",
                "Total number of blocks applied to the ledger"
            )
            .unwrap(),

            blocks_skipped: register_counter!(
                "tallyscan_blocks_skipped_total",
                "Blocks at or below the watermark, or deferred during shutdown"
            )
            .unwrap(),

            block_processing_latency: register_histogram!(
                "tallyscan_block_processing_latency_seconds",
                "Time from block connect to block finalization",
                latency_buckets.clone()
            )
            .unwrap(),

            watermark: register_gauge!(
                "tallyscan_watermark_height",
                "Height of the last block whose effects are applied"
            )
            .unwrap(),

            scan_progress_percent: register_gauge!(
                "tallyscan_scan_progress_percent",
                "Share of chain transactions scanned during a catch-up scan"
            )
            .unwrap(),

            transactions_classified: register_counter_vec!(
                "tallyscan_transactions_classified_total",
                "Intents handed to the interpreter, by result",
                &["result"]
            )
            .unwrap(),

            transactions_rejected: register_counter_vec!(
                "tallyscan_transactions_rejected_total",
                "Transactions that produced no intent, by reason",
                &["reason"]
            )
            .unwrap(),

            checkpoints_written: register_counter!(
                "tallyscan_checkpoints_written_total",
                "Checkpoint file pairs written"
            )
            .unwrap(),

            recoveries: register_counter_vec!(
                "tallyscan_recoveries_total",
                "State loads and reorg recoveries, by outcome",
                &["outcome"]
            )
            .unwrap(),

            state_invalidations: register_counter!(
                "tallyscan_state_invalidations_total",
                "Times derived state was replaced"
            )
            .unwrap(),

            shutdown_requests: register_counter!(
                "tallyscan_shutdown_requests_total",
                "Forced shutdowns requested by the engine"
            )
            .unwrap(),

            kv_latency: register_histogram_vec!(
                "tallyscan_kv_latency_seconds",
                "Index store operation latency",
                &["op"],
                latency_buckets
            )
            .unwrap(),
        }
    }
}

/// Get or initialize the global metrics instance.
pub fn metrics() -> &'static Metrics {
    METRICS.get_or_init(Metrics::new)
}

/// Record index store read latency.
pub fn record_kv_read(latency_secs: f64) {
    metrics()
        .kv_latency
        .with_label_values(&["read"])
        .observe(latency_secs);
}

/// Record index store write latency.
pub fn record_kv_write(latency_secs: f64) {
    metrics()
        .kv_latency
        .with_label_values(&["write"])
        .observe(latency_secs);
}

pub fn set_watermark(height: Option<BlockHeight>) {
    metrics()
        .watermark
        .set(height.map_or(-1.0, |h| h.0 as f64));
}

/// Text exposition of every registered metric.
pub fn gather_text() -> Result<String, prometheus::Error> {
    // Make sure our metrics are registered before gathering.
    metrics();
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&prometheus::gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}

fn result_label(result: InterpretResult) -> &'static str {
    match result {
        InterpretResult::Valid => "valid",
        InterpretResult::Invalid(_) => "invalid",
        InterpretResult::Malformed => "malformed",
    }
}

/// [`EngineObserver`] feeding the global metrics.
///
/// Rejection reasons use [`Rejection::label`], a fixed set, so label
/// cardinality stays bounded.
#[derive(Debug, Default)]
pub struct MetricsObserver {
    block_started: parking_lot::Mutex<Option<std::time::Instant>>,
}

impl MetricsObserver {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EngineObserver for MetricsObserver {
    fn on_block_connected(&self, _header: &BlockHeader) {
        *self.block_started.lock() = Some(std::time::Instant::now());
    }

    fn on_transaction_classified(&self, _intent: &Intent, interpretation: &Interpretation) {
        metrics()
            .transactions_classified
            .with_label_values(&[result_label(interpretation.result)])
            .inc();
    }

    fn on_transaction_rejected(&self, _txid: &Hash, rejection: &Rejection) {
        metrics()
            .transactions_rejected
            .with_label_values(&[rejection.label()])
            .inc();
    }

    fn on_block_finalized(&self, header: &BlockHeader, outcome: &BlockOutcome) {
        let m = metrics();
        if outcome.skipped {
            m.blocks_skipped.inc();
            return;
        }
        m.blocks_processed.inc();
        m.watermark.set(header.height.0 as f64);
        if let Some(started) = self.block_started.lock().take() {
            m.block_processing_latency
                .observe(started.elapsed().as_secs_f64());
        }
    }

    fn on_checkpoint_written(&self, _height: BlockHeight, _block_hash: &Hash) {
        metrics().checkpoints_written.inc();
    }

    fn on_state_invalidated(&self) {
        metrics().state_invalidations.inc();
    }

    fn on_progress(&self, progress: &Progress) {
        metrics().scan_progress_percent.set(progress.percent);
    }

    fn on_recovery(&self, outcome: &RecoveryOutcome) {
        metrics()
            .recoveries
            .with_label_values(&[outcome.label()])
            .inc();
    }

    fn on_shutdown_requested(&self, _reason: &str) {
        metrics().shutdown_requests.inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tallyscan_types::test_utils::test_hash;

    fn header(height: u64) -> BlockHeader {
        BlockHeader {
            height: BlockHeight(height),
            hash: test_hash(height as u8),
            prev_hash: Hash::ZERO,
            time: 0,
            chain_tx: 0,
        }
    }

    // Metrics are process-global and tests run in parallel, so only
    // monotonic increases are asserted.
    #[test]
    fn test_observer_counts_blocks_and_recoveries() {
        let observer = MetricsObserver::new();
        let m = metrics();
        let processed = m.blocks_processed.get();
        let skipped = m.blocks_skipped.get();
        let reparses = m.recoveries.with_label_values(&["full_reparse"]).get();

        let h = header(7);
        observer.on_block_connected(&h);
        observer.on_block_finalized(&h, &BlockOutcome::default());
        observer.on_block_finalized(
            &h,
            &BlockOutcome {
                skipped: true,
                ..Default::default()
            },
        );
        observer.on_recovery(&RecoveryOutcome::FullReparse {
            reason: "test".into(),
        });

        assert!(m.blocks_processed.get() >= processed + 1.0);
        assert!(m.blocks_skipped.get() >= skipped + 1.0);
        assert!(m.recoveries.with_label_values(&["full_reparse"]).get() >= reparses + 1.0);
    }

    #[test]
    fn test_rejections_use_fixed_labels() {
        let observer = MetricsObserver::new();
        observer.on_transaction_rejected(&Hash::ZERO, &Rejection::NoMarker);
        let count = metrics()
            .transactions_rejected
            .with_label_values(&[Rejection::NoMarker.label()])
            .get();
        assert!(count >= 1.0);
    }

    #[test]
    fn test_exposition_contains_metrics() {
        record_kv_read(0.001);
        let text = gather_text().unwrap();
        assert!(text.contains("tallyscan_kv_latency_seconds"));
    }
}
