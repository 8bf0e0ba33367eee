//! Wires one `prometheus::Registry` across the gossip and consensus
//! metrics sinks those crates define, plus a health-check round duration
//! histogram that neither of those crates has a natural home for
//! (health-check has no scheduling manager of its own in this core).

use gossipd_consensus::metrics::PrometheusConsensusMetrics;
use gossipd_consensus::metrics::MetricsError as ConsensusMetricsError;
use prometheus::{Histogram, HistogramOpts, Registry};

pub struct Metrics {
    pub registry: Registry,
    pub consensus: PrometheusConsensusMetrics,
    pub gossip: gossipd_consensus::metrics::GossipMetrics,
    pub healthcheck_round_duration: Histogram,
}

impl Metrics {
    pub fn new() -> Result<Self, ConsensusMetricsError> {
        let registry = Registry::new();
        let consensus = PrometheusConsensusMetrics::new(registry.clone())?;
        let gossip = gossipd_consensus::metrics::GossipMetrics::new(&registry)?;

        let healthcheck_round_duration = Histogram::with_opts(HistogramOpts::new(
            "healthcheck_round_duration",
            "Wall-clock seconds from a health-check round's first proposal to is_finished",
        ))
        .map_err(ConsensusMetricsError::from_prometheus)?;
        registry
            .register(Box::new(healthcheck_round_duration.clone()))
            .map_err(ConsensusMetricsError::from_prometheus)?;

        Ok(Self { registry, consensus, gossip, healthcheck_round_duration })
    }
}
