//! Prometheus instrumentation (§4.9): block throughput, validation
//! rejections, chain-tip gauges, rollback depth, and request latency.

use lazy_static::lazy_static;
use prometheus::{
    Encoder, Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts,
    Registry, TextEncoder,
};

/// Standard latency buckets, seconds.
const LATENCY_BUCKETS: &[f64] = &[0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0];

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    /// Blocks accepted by the validator.
    pub static ref BLOCKS_ACCEPTED: IntCounter = IntCounter::new(
        "indexer_blocks_accepted_total",
        "Total blocks accepted and applied"
    ).unwrap();

    /// Blocks rejected, by the §7 reason kind.
    pub static ref BLOCKS_REJECTED: IntCounterVec = IntCounterVec::new(
        Opts::new("indexer_blocks_rejected_total", "Total blocks rejected by reason"),
        &["reason"]
    ).unwrap();

    /// Current chain tip height.
    pub static ref CURRENT_HEIGHT: IntGauge = IntGauge::new(
        "indexer_current_height",
        "Height of the most recently accepted block"
    ).unwrap();

    /// Size of the in-memory UTXO set.
    pub static ref UTXO_SET_SIZE: IntGauge = IntGauge::new(
        "indexer_utxo_set_size",
        "Number of unspent outputs currently tracked"
    ).unwrap();

    /// Number of addresses with a tracked balance.
    pub static ref BALANCES_TRACKED: IntGauge = IntGauge::new(
        "indexer_balances_tracked",
        "Number of addresses with a non-default balance entry"
    ).unwrap();

    /// Blocks undone per rollback call.
    pub static ref ROLLBACK_DEPTH: Histogram = Histogram::with_opts(
        HistogramOpts::new("indexer_rollback_depth", "Blocks undone per rollback")
            .buckets(vec![1.0, 2.0, 5.0, 10.0, 50.0, 100.0, 1000.0])
    ).unwrap();

    /// Request latency by route.
    pub static ref REQUEST_DURATION: HistogramVec = HistogramVec::new(
        HistogramOpts::new("indexer_request_duration_seconds", "HTTP request latency by route")
            .buckets(LATENCY_BUCKETS.to_vec()),
        &["route"]
    ).unwrap();
}

/// Register every metric with [`REGISTRY`]. Must run once at startup before
/// `/metrics` is served.
pub fn register_all() -> Result<(), prometheus::Error> {
    REGISTRY.register(Box::new(BLOCKS_ACCEPTED.clone()))?;
    REGISTRY.register(Box::new(BLOCKS_REJECTED.clone()))?;
    REGISTRY.register(Box::new(CURRENT_HEIGHT.clone()))?;
    REGISTRY.register(Box::new(UTXO_SET_SIZE.clone()))?;
    REGISTRY.register(Box::new(BALANCES_TRACKED.clone()))?;
    REGISTRY.register(Box::new(ROLLBACK_DEPTH.clone()))?;
    REGISTRY.register(Box::new(REQUEST_DURATION.clone()))?;
    Ok(())
}

/// Render the registry in the Prometheus text exposition format.
pub fn render() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buf = Vec::new();
    encoder.encode(&metric_families, &mut buf)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_all_is_idempotent_safe_once() {
        register_all().unwrap();
        BLOCKS_ACCEPTED.inc();
        let rendered = render().unwrap();
        assert!(rendered.contains("indexer_blocks_accepted_total"));
    }
}
