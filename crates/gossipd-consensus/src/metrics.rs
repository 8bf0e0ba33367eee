//! Prometheus-backed metrics for the consensus manager.
//!
//! Mirrors the registry-of-counters/histograms idiom the pack's
//! `amunchain-amunchain/src/monitoring/metrics.rs` uses: a `Metrics` struct
//! holding already-registered collectors, constructed once and cloned
//! (cheaply, `prometheus` collectors are `Arc`-backed) into every
//! collaborator that needs to record a sample.

use gossipd_consensus_core::state::Trigger;
use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry};
use std::time::Duration;

/// Where [`crate::manager::ConsensusManager`] reports round-completion
/// samples. Kept as a trait (rather than requiring `PrometheusConsensusMetrics`
/// directly) so a caller without a Prometheus registry on hand — a unit
/// test, say — can pass `None` instead.
pub trait ConsensusMetricsSink: Send + Sync + 'static {
    fn record_round_finished(&self, duration: Duration, trigger: Trigger);
}

/// Reference [`ConsensusMetricsSink`] wired to a `prometheus::Registry`.
///
/// `dag_consensus_duration` records every successful `Finished` round's
/// wall-clock latency from `created_at`; `consensus_rounds_finished_total`
/// is broken down by [`Trigger`] so a time-triggered round and an
/// event-triggered one are distinguishable in a dashboard.
#[derive(Clone)]
pub struct PrometheusConsensusMetrics {
    registry: Registry,
    dag_consensus_duration: Histogram,
    rounds_finished_total: IntCounterVec,
}

#[derive(Debug, snafu::Snafu)]
#[snafu(display("failed to register consensus metric"))]
pub struct MetricsError {
    source: prometheus::Error,
}

impl MetricsError {
    /// Lets embedders building up a shared registry out of several crates'
    /// metrics (e.g. the `gossipd` binary's [`crate::metrics`] wiring, or a
    /// hypothetical `gossipd::metrics` front-end) surface a `prometheus`
    /// registration failure through this same error type.
    pub fn from_prometheus(source: prometheus::Error) -> Self {
        Self { source }
    }
}

impl PrometheusConsensusMetrics {
    pub fn new(registry: Registry) -> Result<Self, MetricsError> {
        let dag_consensus_duration = Histogram::with_opts(HistogramOpts::new(
            "dag_consensus_duration",
            "Wall-clock seconds from a round's facilitation start to its Finished status",
        ))
        .map_err(|source| MetricsError { source })?;
        let rounds_finished_total = IntCounterVec::new(
            Opts::new(
                "consensus_rounds_finished_total",
                "Count of consensus rounds that reached Finished, by trigger",
            ),
            &["trigger"],
        )
        .map_err(|source| MetricsError { source })?;

        registry
            .register(Box::new(dag_consensus_duration.clone()))
            .map_err(|source| MetricsError { source })?;
        registry
            .register(Box::new(rounds_finished_total.clone()))
            .map_err(|source| MetricsError { source })?;

        Ok(Self {
            registry,
            dag_consensus_duration,
            rounds_finished_total,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

impl ConsensusMetricsSink for PrometheusConsensusMetrics {
    fn record_round_finished(&self, duration: Duration, trigger: Trigger) {
        self.dag_consensus_duration.observe(duration.as_secs_f64());
        let label = match trigger {
            Trigger::EventTrigger => "event",
            Trigger::TimeTrigger => "time",
        };
        self.rounds_finished_total.with_label_values(&[label]).inc();
    }
}

/// Counters the gossip daemon's embedder increments directly (the daemon
/// itself has no metrics dependency — see [`gossipd_gossip`]'s own
/// ambient-stack notes — so this lives alongside the consensus metrics
/// rather than inside `gossipd-gossip`, and the `gossipd` binary wires both
/// into one registry).
#[derive(Clone)]
pub struct GossipMetrics {
    pub rumors_received_total: IntCounter,
    pub round_duration: Histogram,
}

impl GossipMetrics {
    pub fn new(registry: &Registry) -> Result<Self, MetricsError> {
        let rumors_received_total = IntCounter::with_opts(Opts::new(
            "gossip_rumors_received_total",
            "Rumors accepted into active/seen storage after validation",
        ))
        .map_err(|source| MetricsError { source })?;
        let round_duration = Histogram::with_opts(HistogramOpts::new(
            "gossip_round_duration",
            "Wall-clock seconds for one push-pull gossip round with a single peer",
        ))
        .map_err(|source| MetricsError { source })?;

        registry
            .register(Box::new(rumors_received_total.clone()))
            .map_err(|source| MetricsError { source })?;
        registry
            .register(Box::new(round_duration.clone()))
            .map_err(|source| MetricsError { source })?;

        Ok(Self {
            rumors_received_total,
            round_duration,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_round_finished_against_the_right_trigger_label() {
        let registry = Registry::new();
        let metrics = PrometheusConsensusMetrics::new(registry).expect("registers");

        metrics.record_round_finished(Duration::from_millis(5), Trigger::TimeTrigger);
        metrics.record_round_finished(Duration::from_millis(7), Trigger::EventTrigger);

        let families = metrics.registry().gather();
        let rounds = families
            .iter()
            .find(|f| f.name() == "consensus_rounds_finished_total")
            .expect("metric registered");
        assert_eq!(rounds.get_metric().len(), 2);
    }
}
