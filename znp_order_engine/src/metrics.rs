//! Prometheus metrics for the order and wallet engine.
//!
//! The metrics live in their own [`Registry`] owned by [`EngineMetrics`], so several engines (or several tests) in one
//! process never collide on metric names.
use std::time::Instant;

use log::*;
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};

use crate::db_types::TransactionType;

pub const OUTCOME_OK: &str = "ok";
pub const OUTCOME_ERROR: &str = "error";

#[derive(Clone)]
pub struct EngineMetrics {
    registry: Registry,
    /// Order operations by operation (create, cancel, admin_cancel, mark_paid, refund, callback) and outcome.
    orders_total: IntCounterVec,
    operation_duration: HistogramVec,
    /// Wallet movements by ledger type and outcome.
    wallet_transactions_total: IntCounterVec,
    /// Webhook verification attempts by outcome.
    webhooks_total: IntCounterVec,
}

impl EngineMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();
        let orders_total = IntCounterVec::new(
            Opts::new("znp_orders_total", "Total number of order operations"),
            &["operation", "outcome"],
        )?;
        let operation_duration = HistogramVec::new(
            HistogramOpts::new("znp_order_operation_duration_seconds", "Order operation duration in seconds")
                .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
            &["operation"],
        )?;
        let wallet_transactions_total = IntCounterVec::new(
            Opts::new("znp_wallet_transactions_total", "Total number of wallet transactions"),
            &["type", "outcome"],
        )?;
        let webhooks_total =
            IntCounterVec::new(Opts::new("znp_webhooks_total", "Total number of payment webhooks"), &["outcome"])?;
        registry.register(Box::new(orders_total.clone()))?;
        registry.register(Box::new(operation_duration.clone()))?;
        registry.register(Box::new(wallet_transactions_total.clone()))?;
        registry.register(Box::new(webhooks_total.clone()))?;
        Ok(Self { registry, orders_total, operation_duration, wallet_transactions_total, webhooks_total })
    }

    /// Records the outcome and the elapsed time of one order operation.
    pub fn record_order_operation(&self, operation: &str, ok: bool, started: Instant) {
        let outcome = if ok { OUTCOME_OK } else { OUTCOME_ERROR };
        self.orders_total.with_label_values(&[operation, outcome]).inc();
        self.operation_duration.with_label_values(&[operation]).observe(started.elapsed().as_secs_f64());
    }

    pub fn record_wallet_transaction(&self, tx_type: TransactionType, ok: bool) {
        let outcome = if ok { OUTCOME_OK } else { OUTCOME_ERROR };
        self.wallet_transactions_total.with_label_values(&[tx_type.as_str(), outcome]).inc();
    }

    /// `outcome` is a short, low-cardinality label such as `ok`, `unauthorized` or `forbidden`.
    pub fn record_webhook(&self, outcome: &str) {
        self.webhooks_total.with_label_values(&[outcome]).inc();
    }

    pub fn order_operation_count(&self, operation: &str, outcome: &str) -> u64 {
        self.orders_total.with_label_values(&[operation, outcome]).get()
    }

    pub fn wallet_transaction_count(&self, tx_type: TransactionType, outcome: &str) -> u64 {
        self.wallet_transactions_total.with_label_values(&[tx_type.as_str(), outcome]).get()
    }

    pub fn webhook_count(&self, outcome: &str) -> u64 {
        self.webhooks_total.with_label_values(&[outcome]).get()
    }

    /// Renders every engine metric in the Prometheus text exposition format.
    pub fn gather(&self) -> String {
        let encoder = TextEncoder::new();
        encoder.encode_to_string(&self.registry.gather()).unwrap_or_else(|e| {
            error!("📊️ Could not encode metrics: {e}");
            String::default()
        })
    }
}

impl std::fmt::Debug for EngineMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EngineMetrics")
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn counters_and_export() {
        let metrics = EngineMetrics::new().unwrap();
        metrics.record_order_operation("create", true, Instant::now());
        metrics.record_order_operation("create", false, Instant::now());
        metrics.record_order_operation("create", true, Instant::now());
        metrics.record_wallet_transaction(TransactionType::Purchase, true);
        metrics.record_webhook("unauthorized");
        assert_eq!(metrics.order_operation_count("create", OUTCOME_OK), 2);
        assert_eq!(metrics.order_operation_count("create", OUTCOME_ERROR), 1);
        assert_eq!(metrics.wallet_transaction_count(TransactionType::Purchase, OUTCOME_OK), 1);
        assert_eq!(metrics.webhook_count("unauthorized"), 1);
        let text = metrics.gather();
        assert!(text.contains("znp_orders_total{operation=\"create\",outcome=\"ok\"} 2"));
        assert!(text.contains("znp_order_operation_duration_seconds_count{operation=\"create\"} 3"));
        assert!(text.contains("# TYPE znp_wallet_transactions_total counter"));
    }

    #[test]
    fn registries_are_independent() {
        let a = EngineMetrics::new().unwrap();
        let b = EngineMetrics::new().unwrap();
        a.record_webhook("ok");
        assert_eq!(a.webhook_count("ok"), 1);
        assert_eq!(b.webhook_count("ok"), 0);
    }
}
