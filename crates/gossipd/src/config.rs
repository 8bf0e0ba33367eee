//! `serde`-deserializable configuration for the gossip and consensus tuning
//! knobs.
//!
//! Loading a config *file* is this binary's own concern; the struct and its
//! `Default` impl are ambient enough to carry regardless.

use std::time::Duration;

use serde::Deserialize;

/// Tuning for [`gossipd_gossip`]'s daemon and rumor storage.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct GossipConfig {
    /// Milliseconds between spreader rounds (`gossip.daemon.interval`).
    pub daemon_interval_ms: u64,
    /// Peers contacted per round (`gossip.daemon.fanout`).
    pub daemon_fanout: usize,
    /// Upper bound on concurrently dispatched rumor handlers
    /// (`gossip.daemon.max_concurrent_handlers`).
    pub daemon_max_concurrent_handlers: usize,
    /// Seconds a hash stays active (`gossip.storage.active_retention`).
    pub storage_active_retention_secs: u64,
    /// Seconds a hash stays in `seen` after leaving `active`
    /// (`gossip.storage.seen_retention`).
    pub storage_seen_retention_secs: u64,
    /// Milliseconds between background TTL sweeps, on its own cadence
    /// distinct from the retention durations above.
    pub storage_sweep_interval_ms: u64,
}

impl Default for GossipConfig {
    fn default() -> Self {
        Self {
            daemon_interval_ms: 200,
            daemon_fanout: 2,
            daemon_max_concurrent_handlers: 20,
            storage_active_retention_secs: 2,
            storage_seen_retention_secs: 120,
            storage_sweep_interval_ms: 500,
        }
    }
}

impl GossipConfig {
    pub fn daemon_config(&self) -> gossipd_gossip::config::GossipDaemonConfig {
        gossipd_gossip::config::GossipDaemonConfig {
            round_interval: Duration::from_millis(self.daemon_interval_ms),
            fanout: self.daemon_fanout,
            max_concurrent_handlers: self.daemon_max_concurrent_handlers,
        }
    }

    pub fn storage_config(&self) -> gossipd_gossip::config::RumorStorageConfig {
        gossipd_gossip::config::RumorStorageConfig {
            active_retention: Duration::from_secs(self.storage_active_retention_secs),
            seen_retention: Duration::from_secs(self.storage_seen_retention_secs),
            sweep_interval: Duration::from_millis(self.storage_sweep_interval_ms),
        }
    }
}

/// Tuning for [`gossipd_consensus`]'s manager. `consensus.time_trigger_interval`
/// is genuinely environment-specific; this picks a default anyway so the
/// struct is usable out of the box, but embedders running a real federation
/// are expected to override it.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct ConsensusConfig {
    pub time_trigger_interval_ms: u64,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self { time_trigger_interval_ms: 5_000 }
    }
}

impl ConsensusConfig {
    pub fn manager_config(&self) -> gossipd_consensus::manager::ConsensusManagerConfig {
        gossipd_consensus::manager::ConsensusManagerConfig {
            time_trigger_interval: Duration::from_millis(self.time_trigger_interval_ms),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub gossip: GossipConfig,
    pub consensus: ConsensusConfig,
}

impl Config {
    pub fn from_toml_str(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }
}
