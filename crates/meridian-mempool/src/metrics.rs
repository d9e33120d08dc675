//! Prometheus metrics for the mempool subsystem.
//!
//! Metric names follow the convention `meridian_<subsystem>_<metric>_<unit>`.

use prometheus::{
    exponential_buckets, Histogram, HistogramOpts, IntCounter, IntGauge, Registry,
};

/// Metrics emitted by the mempool. A pure sink: nothing in the mempool
/// reads these back for decisions.
#[derive(Debug, Clone)]
pub struct MempoolMetrics {
    /// Number of resident transactions.
    pub size: IntGauge,
    /// Aggregate payload size of resident transactions, in bytes.
    pub size_bytes: IntGauge,
    /// Distribution of admitted transaction payload sizes.
    pub tx_size_bytes: Histogram,
    /// Transactions rejected by the validator (or post-check).
    pub failed_txs: IntCounter,
    /// Valid transactions turned away because the mempool was full and no
    /// lower-priority resident could be evicted.
    pub rejected_txs: IntCounter,
    /// Residents evicted to admit a higher-priority newcomer.
    pub evicted_txs: IntCounter,
    /// Recheck responses processed.
    pub recheck_times: IntCounter,
}

impl MempoolMetrics {
    fn build() -> Result<Self, prometheus::Error> {
        Ok(Self {
            size: IntGauge::new(
                "meridian_mempool_transactions_pending",
                "Number of resident transactions in the mempool",
            )?,
            size_bytes: IntGauge::new(
                "meridian_mempool_size_bytes",
                "Aggregate payload size of resident transactions in bytes",
            )?,
            tx_size_bytes: Histogram::with_opts(
                HistogramOpts::new(
                    "meridian_mempool_tx_size_bytes",
                    "Distribution of admitted transaction payload sizes",
                )
                .buckets(exponential_buckets(32.0, 4.0, 10)?),
            )?,
            failed_txs: IntCounter::new(
                "meridian_mempool_failed_txs_total",
                "Transactions rejected by validation",
            )?,
            rejected_txs: IntCounter::new(
                "meridian_mempool_rejected_txs_total",
                "Valid transactions turned away with the mempool full",
            )?,
            evicted_txs: IntCounter::new(
                "meridian_mempool_evicted_txs_total",
                "Residents evicted for higher-priority newcomers",
            )?,
            recheck_times: IntCounter::new(
                "meridian_mempool_recheck_total",
                "Recheck responses processed",
            )?,
        })
    }

    /// Creates the metrics and registers them with `registry`.
    pub fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let metrics = Self::build()?;
        registry.register(Box::new(metrics.size.clone()))?;
        registry.register(Box::new(metrics.size_bytes.clone()))?;
        registry.register(Box::new(metrics.tx_size_bytes.clone()))?;
        registry.register(Box::new(metrics.failed_txs.clone()))?;
        registry.register(Box::new(metrics.rejected_txs.clone()))?;
        registry.register(Box::new(metrics.evicted_txs.clone()))?;
        registry.register(Box::new(metrics.recheck_times.clone()))?;
        Ok(metrics)
    }

    /// Creates metrics that are not exported anywhere. Used as the no-op
    /// sink in tests and when telemetry is disabled.
    pub fn unregistered() -> Self {
        Self::build().expect("metric creation failed")
    }
}

impl Default for MempoolMetrics {
    fn default() -> Self {
        Self::unregistered()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_register_cleanly() {
        let registry = Registry::new();
        let metrics = MempoolMetrics::new(&registry).unwrap();
        metrics.size.set(3);
        metrics.evicted_txs.inc();

        let families = registry.gather();
        assert!(families
            .iter()
            .any(|f| f.get_name() == "meridian_mempool_transactions_pending"));
    }

    #[test]
    fn test_unregistered_metrics_still_count() {
        let metrics = MempoolMetrics::unregistered();
        metrics.rejected_txs.inc();
        metrics.rejected_txs.inc();
        assert_eq!(metrics.rejected_txs.get(), 2);
    }
}
