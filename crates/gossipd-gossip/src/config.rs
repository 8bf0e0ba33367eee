use std::time::Duration;

/// Retention windows for [`crate::storage::RumorStorage`]'s two-tier set.
#[derive(Debug, Clone, Copy)]
pub struct RumorStorageConfig {
    /// How long a hash stays in the active set, eligible for re-gossip.
    pub active_retention: Duration,
    /// How long a hash stays in the seen set after leaving active, still
    /// counted for dedup purposes but no longer offered to peers.
    pub seen_retention: Duration,
    /// Interval between background sweeps that age entries out of the two
    /// sets. Left unspecified by the module this is ported from; the sweep
    /// itself has to run on *some* cadence, distinct from the retention
    /// windows it enforces.
    pub sweep_interval: Duration,
}

impl Default for RumorStorageConfig {
    fn default() -> Self {
        Self {
            active_retention: Duration::from_secs(2),
            seen_retention: Duration::from_secs(120),
            sweep_interval: Duration::from_millis(500),
        }
    }
}

/// Tuning for the gossip daemon's periodic push-pull rounds.
#[derive(Debug, Clone, Copy)]
pub struct GossipDaemonConfig {
    /// Interval between spreader rounds.
    pub round_interval: Duration,
    /// Number of peers contacted per round.
    pub fanout: usize,
    /// Upper bound on rumor handlers dispatched concurrently.
    pub max_concurrent_handlers: usize,
}

impl Default for GossipDaemonConfig {
    fn default() -> Self {
        Self {
            round_interval: Duration::from_millis(200),
            fanout: 3,
            max_concurrent_handlers: 32,
        }
    }
}
