// SPDX-License-Identifier: MIT

//! Illustrative wiring of the gossip daemon and consensus manager into one
//! running process.
//!
//! Transport, configuration *loading*, keystore I/O, and peer
//! handshake/session management are all out of scope for this crate:
//! `Gossipd` exists only to show how an embedder plugs its own
//! implementations of those boundaries into the `gossipd-gossip`/
//! `gossipd-consensus` crates that make up the actual protocol surface. The
//! reference `Key`/`Artifact` choices below (`EpochKey`, a raw `Vec<u8>`
//! artifact) are this binary's own pick, not a constraint the core crates
//! impose — an embedder with a real ledger artifact type builds its own thin
//! binary the same way instead of linking this one.

mod logging;
mod opts;

pub mod config;
pub mod metrics;

use std::collections::BTreeSet;
use std::sync::Arc;

use clap::Parser as _;
use config::Config;
use gossipd_consensus::handler::{ConsensusRumorHandler, ConsensusRumorKind};
use gossipd_consensus::manager::ConsensusManager;
use gossipd_consensus::transport::{ClusterView, ConsensusGossipSink, RegistrationTransport};
use gossipd_consensus_core::functions::ConsensusFunctions;
use gossipd_consensus_core::key::EpochKey;
use gossipd_gossip::daemon::GossipDaemon;
use gossipd_gossip::handler::RumorHandlerRegistry;
use gossipd_gossip::storage::RumorStorage;
use gossipd_gossip::transport::GossipTransport;
use gossipd_rumor_core::hash::Hashable;
use gossipd_rumor_core::peer::{PeerId, PeerPubkey, PeerSeckey};
use gossipd_rumor_core::rumor::{CommonRumor, ContentTypeTag, PeerRumor, Rumor, RumorBatch};
use gossipd_rumor_core::signed::Signed;
use gossipd_util_error::WhateverResult;
use opts::{Commands, Opts};
use snafu::{OptionExt as _, ResultExt as _, Snafu};

/// Reference artifact type for the illustrative `Run` wiring: an opaque
/// byte blob an embedder's real `ConsensusFunctions` would replace with
/// whatever its ledger actually agrees on (a block, a checkpoint, ...).
pub type Artifact = Vec<u8>;

type Daemon = GossipDaemon<Arc<dyn GossipTransport>, tokio::sync::watch::Receiver<Vec<PeerId>>>;

/// A `ConsensusGossipSink` that turns an effect straight back into a
/// self-signed [`RumorBatch`] enqueued on the same daemon it came from —
/// the daemon's own spreader picks it up on the next round.
///
/// Holds the daemon behind a [`std::sync::OnceLock`] rather than an `Arc`
/// directly: the daemon's own `RumorHandlerRegistry` must already contain a
/// [`ConsensusRumorHandler`] wired to this round's [`ConsensusManager`]
/// before the daemon can be constructed, so the manager (and this sink) are
/// necessarily built first. The cell is filled in immediately afterwards,
/// strictly before any round is started, so `enqueue` never observes it
/// empty.
struct DaemonGossipSink {
    daemon_cell: Arc<std::sync::OnceLock<Arc<Daemon>>>,
    self_id: PeerId,
    next_ordinal: std::sync::atomic::AtomicU64,
    self_seckey: PeerSeckey,
}

impl DaemonGossipSink {
    fn enqueue(&self, rumor: Rumor) {
        let hash = rumor.hash();
        let signed = Signed::new_signed_by_one(rumor, self.self_seckey);
        self.daemon_cell
            .get()
            .expect("daemon wired before any round can start")
            .enqueue_inbound(RumorBatch::new(vec![(hash, signed)]));
    }
}

impl ConsensusGossipSink for DaemonGossipSink {
    fn emit_peer_rumor(&self, content_type_tag: ContentTypeTag, payload: Vec<u8>) {
        let ordinal = self.next_ordinal.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        self.enqueue(Rumor::Peer(PeerRumor {
            origin: self.self_id,
            ordinal,
            content_type_tag,
            payload: payload.into(),
        }));
    }

    fn emit_common_rumor(&self, content_type_tag: ContentTypeTag, payload: Vec<u8>) {
        self.enqueue(Rumor::Common(CommonRumor { content_type_tag, payload: payload.into() }));
    }
}

/// CLI-driven entry point wiring a gossip daemon and a consensus manager
/// together: a near-empty marker type whose real work happens in its single
/// builder-driven `build`/`run` method.
pub struct Gossipd {
    _private: (),
}

#[bon::bon]
impl Gossipd {
    #[builder(finish_fn = run, start_fn = builder)]
    pub async fn build(
        #[builder(field)] handlers: RumorHandlerRegistry,
        gossip_transport: Arc<dyn GossipTransport>,
        peer_set: tokio::sync::watch::Receiver<Vec<PeerId>>,
        whitelist: Option<BTreeSet<PeerPubkey>>,
        consensus_fns: Arc<dyn ConsensusFunctions<EpochKey, Artifact>>,
        registration_transport: Arc<dyn RegistrationTransport<EpochKey>>,
        cluster: Arc<dyn ClusterView<EpochKey>>,
    ) -> WhateverResult<()> {
        logging::init_logging()?;
        let opts = Opts::parse();

        let self_seckey = if let Some(secret_path) = &opts.secret_path {
            parse_seckey(
                tokio::fs::read_to_string(secret_path)
                    .await
                    .whatever_context("Failed to read secret file")?
                    .trim(),
            )
            .whatever_context("Failed to parse secret")?
        } else {
            PeerSeckey::generate()
        };

        match opts.command {
            Commands::GenSecret => {
                eprintln!("PeerId: {}", PeerId::from_pubkey(self_seckey.pubkey()));
                eprintln!();
                println!("{}", self_seckey.pubkey());
                return Ok(());
            }
            Commands::Run => {}
        }

        let config = if let Some(config_path) = &opts.config_path {
            Config::from_toml_str(
                &tokio::fs::read_to_string(config_path)
                    .await
                    .whatever_context("Failed to read config file")?,
            )
            .whatever_context("Failed to parse config")?
        } else {
            Config::default()
        };

        let metrics = metrics::Metrics::new().whatever_context("Failed to register metrics")?;

        let self_id = PeerId::from_pubkey(self_seckey.pubkey());
        let storage = Arc::new(RumorStorage::new(config.gossip.storage_config()));

        let daemon_cell: Arc<std::sync::OnceLock<Arc<Daemon>>> = Arc::new(std::sync::OnceLock::new());
        let sink = Arc::new(DaemonGossipSink {
            daemon_cell: daemon_cell.clone(),
            self_id,
            next_ordinal: std::sync::atomic::AtomicU64::new(0),
            self_seckey,
        });

        let consensus_storage =
            Arc::new(gossipd_consensus::storage::ConsensusStorage::<EpochKey, Artifact>::new());
        let consensus_metrics: Arc<dyn gossipd_consensus::metrics::ConsensusMetricsSink> =
            Arc::new(metrics.consensus.clone());
        let manager = ConsensusManager::new(
            self_id,
            self_seckey,
            consensus_storage,
            consensus_fns,
            sink,
            registration_transport,
            cluster,
            Some(consensus_metrics),
            config.consensus.manager_config(),
        );

        let mut handlers = handlers;
        for (tag, kind) in [
            (ContentTypeTag::CONSENSUS_FACILITY, ConsensusRumorKind::Facility),
            (ContentTypeTag::CONSENSUS_PROPOSAL, ConsensusRumorKind::Proposal),
            (ContentTypeTag::MAJORITY_SIGNATURE, ConsensusRumorKind::Signature),
            (ContentTypeTag::DEREGISTRATION, ConsensusRumorKind::Deregistration),
            (ContentTypeTag::CONSENSUS_ARTIFACT, ConsensusRumorKind::Artifact),
            (ContentTypeTag::CONSENSUS_FINAL_ARTIFACT, ConsensusRumorKind::FinalArtifact),
        ] {
            handlers.register(tag, ConsensusRumorHandler::new(manager.clone(), kind));
        }

        let gossip_daemon = GossipDaemon::new(
            self_id,
            storage.clone(),
            gossip_transport,
            peer_set,
            handlers,
            whitelist,
            config.gossip.daemon_config(),
        );
        daemon_cell.set(gossip_daemon.clone()).ok().expect("daemon cell set exactly once");

        // A bare `gossipd run` has no prior epoch history to resume from
        // (persistence across restarts is out of scope, and adding it is
        // this binary's own concern); it always starts facilitating fresh
        // from epoch zero.
        let (_registration_handle, _time_trigger_handle) =
            manager.start_facilitating_after(EpochKey::default(), None).await;

        tokio::spawn(gossipd_gossip::storage::run_sweeper(
            Arc::downgrade(gossip_daemon.storage()),
            config.gossip.storage_config().sweep_interval,
        ));
        tokio::spawn(gossip_daemon.clone().run_consumer());
        tokio::spawn(gossip_daemon.run_spreader());

        std::future::pending::<()>().await;
        Ok(())
    }
}

/// Registers a [`RumorHandler`] for a content type, an extension method on
/// the generated builder state for accumulating a pluggable registry across
/// builder calls.
///
/// [`RumorHandler`]: gossipd_gossip::handler::RumorHandler
impl<S: gossipd_build_builder::State> GossipdBuildBuilder<S> {
    pub fn handler(mut self, tag: ContentTypeTag, handler: impl gossipd_gossip::handler::RumorHandler) -> Self {
        self.handlers.register(tag, handler);
        self
    }
}

#[derive(Debug, Snafu)]
pub enum ParseSeckeyError {
    Base32 { source: data_encoding::DecodeError },
    #[snafu(display("decoded secret is not 32 bytes"))]
    WrongLength,
}

/// Unlike every other array-backed id in this workspace, `PeerSeckey` does
/// not derive `array_type_impl_base32_str!` (a seckey is never meant to be
/// logged); decode it by hand from the same base32 alphabet instead.
fn parse_seckey(s: &str) -> Result<PeerSeckey, ParseSeckeyError> {
    let bytes = data_encoding::BASE32_DNSCURVE.decode(s.as_bytes()).context(Base32Snafu)?;
    let arr: [u8; 32] = bytes.try_into().ok().context(WrongLengthSnafu)?;
    Ok(PeerSeckey::from(arr))
}
