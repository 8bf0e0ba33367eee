use std::collections::BTreeSet;
use std::sync::Arc;

use gossipd_rumor_core::hash::Hash;
use gossipd_rumor_core::peer::{PeerId, PeerPubkey};
use gossipd_rumor_core::rumor::{Rumor, RumorBatch, canonical_rumor_order};
use gossipd_rumor_core::validate;
use gossipd_util_core::is_env_var_set;
use gossipd_util_error::fmt::FmtCompact as _;
use rand::seq::SliceRandom as _;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use tracing::{debug, instrument, trace, warn};

use crate::LOG_TARGET;
use crate::config::GossipDaemonConfig;
use crate::handler::RumorHandlerRegistry;
use crate::messages::{
    EndGossipRoundRequest, EndGossipRoundResponse, StartGossipRoundRequest, StartGossipRoundResponse,
};
use crate::receiver;
use crate::storage::RumorStorage;
use crate::transport::{GossipTransport, PeerSetSnapshot};

/// Drives rumor dissemination: a consumer task validating and dispatching
/// inbound batches, and a spreader task running periodic push-pull rounds
/// against a fanout subset of the current peer set.
pub struct GossipDaemon<T, P> {
    self_id: PeerId,
    storage: Arc<RumorStorage>,
    transport: T,
    peer_set: P,
    handlers: RumorHandlerRegistry,
    whitelist: Option<BTreeSet<PeerPubkey>>,
    config: GossipDaemonConfig,
    inbound_tx: mpsc::UnboundedSender<RumorBatch>,
    inbound_rx: Mutex<mpsc::UnboundedReceiver<RumorBatch>>,
}

impl<T, P> GossipDaemon<T, P>
where
    T: GossipTransport,
    P: PeerSetSnapshot,
{
    pub fn new(
        self_id: PeerId,
        storage: Arc<RumorStorage>,
        transport: T,
        peer_set: P,
        handlers: RumorHandlerRegistry,
        whitelist: Option<BTreeSet<PeerPubkey>>,
        config: GossipDaemonConfig,
    ) -> Arc<Self> {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            self_id,
            storage,
            transport,
            peer_set,
            handlers,
            whitelist,
            config,
            inbound_tx,
            inbound_rx: Mutex::new(inbound_rx),
        })
    }

    pub fn storage(&self) -> &Arc<RumorStorage> {
        &self.storage
    }

    /// Queues a batch (received over the wire, or pushed locally) for
    /// validation and dispatch by the consumer task.
    pub fn enqueue_inbound(&self, batch: RumorBatch) {
        // Only fails if the consumer task has been dropped, which only
        // happens alongside the daemon itself.
        let _ = self.inbound_tx.send(batch);
    }

    /// Handles an incoming round-open request from a peer.
    pub fn handle_start_round(&self, req: StartGossipRoundRequest) -> StartGossipRoundResponse {
        receiver::handle_start_round(&self.storage, req)
    }

    /// Handles an incoming round-close request: enqueues the peer's answer
    /// for validation, and returns the content they asked for.
    pub fn handle_end_round(&self, req: EndGossipRoundRequest) -> EndGossipRoundResponse {
        let EndGossipRoundRequest { answer, inquiry } = req;
        self.enqueue_inbound(answer);
        receiver::handle_end_round(&self.storage, &inquiry)
    }

    /// Runs the consumer loop until the daemon is dropped.
    pub async fn run_consumer(self: Arc<Self>) {
        loop {
            let batch = {
                let mut rx = self.inbound_rx.lock().await;
                rx.recv().await
            };
            match batch {
                Some(batch) => self.process_inbound_batch(batch).await,
                None => return,
            }
        }
    }

    #[instrument(name = "process_inbound_batch", target = LOG_TARGET, skip_all, fields(len = batch.len()))]
    async fn process_inbound_batch(&self, batch: RumorBatch) {
        let mut valid = Vec::new();
        for (hash, signed) in batch {
            match validate::validate(hash, &signed, self.whitelist.as_ref()) {
                Ok(()) => valid.push((hash, signed)),
                Err(err) => {
                    warn!(target: LOG_TARGET, %hash, err = %err, "Dropping invalid rumor");
                }
            }
        }

        let mut new_rumors = self.storage.add_rumors(RumorBatch::new(valid)).into_inner();
        new_rumors.sort_by(canonical_rumor_order);

        for (hash, signed) in new_rumors {
            self.dispatch(hash, &signed.value);
        }
    }

    fn dispatch(&self, hash: Hash, rumor: &Rumor) {
        if rumor.origin() == Some(self.self_id) {
            trace!(target: LOG_TARGET, %hash, "Skipping dispatch of our own rumor");
            return;
        }

        let Some(handler) = self.handlers.get(rumor.content_type_tag()) else {
            debug!(target: LOG_TARGET, %hash, tag = %rumor.content_type_tag(), "No handler registered for rumor");
            return;
        };

        if handler.handle(rumor, &self.storage).is_none() {
            warn!(target: LOG_TARGET, %hash, tag = %rumor.content_type_tag(), "Handler rejected rumor payload");
        }
    }

    /// Runs the spreader loop until the daemon is dropped.
    pub async fn run_spreader(self: Arc<Self>) {
        let mut interval = tokio::time::interval(self.config.round_interval);
        loop {
            interval.tick().await;
            self.clone().run_spreader_round().await;
        }
    }

    #[instrument(name = "run_spreader_round", target = LOG_TARGET, skip_all)]
    async fn run_spreader_round(self: Arc<Self>) {
        let active = self.storage.get_active_hashes();
        // GOSSIPD_FORCE_ROUND lets a test drive a round against a cluster
        // with nothing active yet, without wiring a dedicated test hook.
        if active.is_empty() && !is_env_var_set("GOSSIPD_FORCE_ROUND") {
            return;
        }

        let mut peers = self.peer_set.current_peers();
        peers.retain(|peer| *peer != self.self_id);
        if peers.is_empty() {
            return;
        }
        peers.shuffle(&mut rand::thread_rng());
        peers.truncate(self.config.fanout);

        let seen = self.storage.get_seen_hashes();

        let mut round_tasks = JoinSet::new();
        for peer in peers {
            round_tasks.spawn(Self::gossip_round_with_peer(
                self.clone(),
                peer,
                active.clone(),
                seen.clone(),
            ));
        }

        while let Some(result) = round_tasks.join_next().await {
            match result {
                Ok(Some(answer)) => self.enqueue_inbound(answer),
                Ok(None) => {}
                Err(err) => warn!(target: LOG_TARGET, err = %err, "Gossip round task panicked"),
            }
        }
    }

    async fn gossip_round_with_peer(
        self: Arc<Self>,
        peer: PeerId,
        our_offer: Vec<Hash>,
        our_seen: Vec<Hash>,
    ) -> Option<RumorBatch> {
        let our_seen: BTreeSet<Hash> = our_seen.into_iter().collect();

        let start_resp = match self
            .transport
            .start_round(peer, StartGossipRoundRequest { offer: our_offer })
            .await
        {
            Ok(resp) => resp,
            Err(err) => {
                debug!(target: LOG_TARGET, %peer, err = %err.fmt_compact(), "Gossip round start failed");
                return None;
            }
        };

        let inquiry: Vec<Hash> = start_resp
            .offer
            .into_iter()
            .filter(|hash| !our_seen.contains(hash))
            .collect();
        let answer = self.storage.get_rumors(&start_resp.inquiry);

        let end_resp = match self
            .transport
            .end_round(peer, EndGossipRoundRequest { answer, inquiry })
            .await
        {
            Ok(resp) => resp,
            Err(err) => {
                debug!(target: LOG_TARGET, %peer, err = %err.fmt_compact(), "Gossip round end failed");
                return None;
            }
        };

        Some(end_resp.answer)
    }
}
