//! Schedules rounds and drives the per-key updater from storage.
//!
//! The manager owns nothing about transport, peer discovery, or signing
//! identity beyond a seckey: every external capability it needs — gossiping
//! an effect, exchanging registrations, reading cluster membership — comes
//! in as a [`crate::transport`] trait object, mirroring how
//! [`gossipd_gossip::daemon::GossipDaemon`] is itself generic over its
//! transport and peer-set collaborators.

use std::sync::Arc;
use std::time::Duration;

use backon::{FibonacciBuilder, Retryable as _};
use bincode::{Decode, Encode};
use gossipd_consensus_core::event::{Bound, Event};
use gossipd_consensus_core::facilitator_set::FacilitatorSet;
use gossipd_consensus_core::functions::ConsensusFunctions;
use gossipd_consensus_core::key::Successor;
use gossipd_consensus_core::msg::{
    ConsensusArtifact, ConsensusFacility, ConsensusProposal, Deregistration, MajoritySignature,
    RegistrationExchangeRequest, RegistrationExchangeResponse,
};
use gossipd_consensus_core::state::{ConsensusStatus, Trigger};
use gossipd_rumor_core::hash::Hashable;
use gossipd_rumor_core::peer::{PeerId, PeerSeckey};
use gossipd_rumor_core::rumor::{ContentTypeTag, Rumor};
use gossipd_rumor_core::signed::{Signed, SignatureProof};
use gossipd_util_error::fmt::FmtCompact as _;
use gossipd_util_error::Whatever;
use gossipd_util_fmt_opt::AsFmtOption as _;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tracing::{debug, info, instrument, warn};

use crate::metrics::ConsensusMetricsSink;
use crate::storage::ConsensusStorage;
use crate::transport::{ClusterView, ConsensusGossipSink, PeerLifecycleState, RegistrationTransport};
use crate::updater::{self, OutboundEffect};
use crate::LOG_TARGET;

/// Bounded, unlike a generic RPC backoff: a registration-exchange peer can
/// be gone for good, so giving up lets the queue move on to the next one
/// instead of retrying a dead peer forever.
const REG_EXCHANGE_BACKOFF: FibonacciBuilder = FibonacciBuilder::new()
    .with_jitter()
    .with_max_times(5)
    .with_max_delay(Duration::from_secs(30));

/// Knobs that are genuinely environment-specific and have no sane built-in
/// default.
#[derive(Debug, Clone, Copy)]
pub struct ConsensusManagerConfig {
    pub time_trigger_interval: Duration,
}

/// Drives one `(Key, Artifact)` instantiation of the consensus round
/// ladder. Generic only over the two type parameters the rest of this
/// crate is generic over; every collaborator is held as a trait object so
/// the generic surface doesn't grow with the number of pluggable concerns.
pub struct ConsensusManager<Key, Artifact> {
    self_id: PeerId,
    self_seckey: PeerSeckey,
    storage: Arc<ConsensusStorage<Key, Artifact>>,
    consensus_fns: Arc<dyn ConsensusFunctions<Key, Artifact>>,
    gossip_sink: Arc<dyn ConsensusGossipSink>,
    registration_transport: Arc<dyn RegistrationTransport<Key>>,
    cluster: Arc<dyn ClusterView<Key>>,
    metrics_sink: Option<Arc<dyn ConsensusMetricsSink>>,
    config: ConsensusManagerConfig,
    registration_queue_tx: mpsc::UnboundedSender<PeerId>,
    registration_queue_rx: AsyncMutex<mpsc::UnboundedReceiver<PeerId>>,
}

impl<Key, Artifact> ConsensusManager<Key, Artifact>
where
    Key: Successor + Ord + Clone + std::hash::Hash + Eq + std::fmt::Display + Encode + Decode<()> + Send + Sync + 'static,
    Artifact: Hashable + Clone + Encode + Decode<()> + Send + Sync + 'static,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        self_id: PeerId,
        self_seckey: PeerSeckey,
        storage: Arc<ConsensusStorage<Key, Artifact>>,
        consensus_fns: Arc<dyn ConsensusFunctions<Key, Artifact>>,
        gossip_sink: Arc<dyn ConsensusGossipSink>,
        registration_transport: Arc<dyn RegistrationTransport<Key>>,
        cluster: Arc<dyn ClusterView<Key>>,
        metrics_sink: Option<Arc<dyn ConsensusMetricsSink>>,
        config: ConsensusManagerConfig,
    ) -> Arc<Self> {
        let (registration_queue_tx, registration_queue_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            self_id,
            self_seckey,
            storage,
            consensus_fns,
            gossip_sink,
            registration_transport,
            cluster,
            metrics_sink,
            config,
            registration_queue_tx,
            registration_queue_rx: AsyncMutex::new(registration_queue_rx),
        })
    }

    /// Bootstraps as the node that starts facilitating from genesis (or from
    /// whatever epoch this deployment was seeded at); spawns the
    /// registration-exchange and time-trigger background loops.
    pub async fn start_facilitating_after(
        self: &Arc<Self>,
        last_key: Key,
        last_artifact: Option<Signed<Artifact>>,
    ) -> (tokio::task::JoinHandle<()>, tokio::task::JoinHandle<()>) {
        self.storage
            .try_update_last_key_and_artifact_with_cleanup(None, last_key.clone(), last_artifact);
        self.storage.set_own_registration(last_key.next());

        let registration_handle = tokio::spawn(self.clone().run_registration_exchange_loop());
        let time_trigger_handle = tokio::spawn(self.clone().run_time_trigger_loop());
        (registration_handle, time_trigger_handle)
    }

    /// Bootstraps as a node joining an already-running cluster: learns
    /// `peer`'s own registration, registers our own (two epochs out, to give
    /// the round we'd otherwise race against time to converge), and installs
    /// observer state for the very next round if we've already heard a
    /// facilitator declare it.
    pub async fn start_observing_after(self: &Arc<Self>, last_key: Key, peer: PeerId) {
        let own_registration = last_key.next().next();
        self.storage.set_own_registration(own_registration.clone());

        let req = RegistrationExchangeRequest { maybe_key: Some(own_registration) };
        match self.registration_transport.exchange_registration(peer, req).await {
            Ok(resp) => {
                if let Some(key) = resp.maybe_key {
                    self.storage.register_peer(peer, key);
                }
            }
            Err(err) => {
                warn!(
                    target: LOG_TARGET,
                    %peer,
                    err = %err.fmt_compact(),
                    "registration exchange with bootstrap peer failed"
                );
            }
        }

        self.storage.try_update_last_key_and_artifact_with_cleanup(None, last_key.clone(), None);
        self.maybe_observe(last_key.next(), peer);
    }

    /// Called whenever an embedder's own event-content handler buffers an
    /// event via [`Self::ingest_event`] and that event is marked a trigger;
    /// dispatches to internal facilitation with [`Trigger::EventTrigger`].
    pub async fn facilitate_on_event(self: Arc<Self>) {
        loop {
            self.internal_facilitate_with(Trigger::EventTrigger).await;
            if !self.storage.contains_trigger_event() {
                break;
            }
        }
    }

    /// Buffers an event arriving via a `PeerRumor` whose content type is
    /// opaque to this crate (the application events ConsensusFunctions
    /// consumes); embedders call this from their own [`RumorHandler`]
    /// implementation for that content type.
    ///
    /// [`RumorHandler`]: gossipd_gossip::handler::RumorHandler
    pub fn ingest_event(self: &Arc<Self>, peer: PeerId, ordinal: u64, event: Event) {
        let is_trigger = event.is_trigger;
        self.storage.add_event(peer, ordinal, event);
        if is_trigger {
            tokio::spawn(self.clone().facilitate_on_event());
        }
    }

    /// Announces our departure and releases our facilitator slots at and
    /// after whichever round we haven't yet finished.
    pub fn on_node_leaving(&self) {
        let last_key = self.storage.get_last_key_and_artifact().map(|(k, _)| k);
        let own_registration = self.storage.get_own_registration();
        let key = match (last_key.map(|k| k.next()), own_registration.clone()) {
            (Some(a), Some(b)) => {
                if a > b {
                    a
                } else {
                    b
                }
            }
            (Some(a), None) => a,
            (None, Some(b)) => b,
            (None, None) => return,
        };
        debug!(
            target: LOG_TARGET,
            %key,
            prior_registration = %own_registration.fmt_option(),
            "announcing deregistration"
        );
        self.emit_peer_msg(ContentTypeTag::DEREGISTRATION, &Deregistration { key });
    }

    /// Receiving side of `consensus/registration/exchange`.
    pub fn handle_registration_exchange_request(
        &self,
        req: RegistrationExchangeRequest<Key>,
        peer: PeerId,
    ) -> RegistrationExchangeResponse<Key> {
        if let Some(key) = req.maybe_key {
            self.storage.register_peer(peer, key);
        }
        RegistrationExchangeResponse { maybe_key: self.storage.get_own_registration() }
    }

    /// Enqueues `peer` for registration exchange if we're the side expected
    /// to initiate it (`self.id < peer.id`, so exactly one side acts).
    pub fn enqueue_peer_for_registration(&self, peer: PeerId) {
        if self.self_id < peer && self.cluster.should_initiate_exchange(self.self_id, peer) {
            let _ = self.registration_queue_tx.send(peer);
        }
    }

    pub fn on_facility_rumor(self: &Arc<Self>, rumor: &Rumor) -> Option<()> {
        let Rumor::Peer(peer_rumor) = rumor else { return None };
        let msg: ConsensusFacility<Key> = decode(&peer_rumor.payload)?;
        self.storage.add_peer_declaration(
            msg.key.clone(),
            peer_rumor.origin,
            gossipd_consensus_core::resources::PeerDeclaration {
                upper_bound: Some(msg.upper_bound),
                ..Default::default()
            },
        );
        self.maybe_observe(msg.key.clone(), peer_rumor.origin);
        self.check_for_state_update(msg.key);
        Some(())
    }

    pub fn on_proposal_rumor(self: &Arc<Self>, rumor: &Rumor) -> Option<()> {
        let Rumor::Peer(peer_rumor) = rumor else { return None };
        let msg: ConsensusProposal<Key> = decode(&peer_rumor.payload)?;
        self.storage.add_peer_declaration(
            msg.key.clone(),
            peer_rumor.origin,
            gossipd_consensus_core::resources::PeerDeclaration {
                proposal: Some(msg.proposal_hash),
                ..Default::default()
            },
        );
        self.check_for_state_update(msg.key);
        Some(())
    }

    pub fn on_signature_rumor(self: &Arc<Self>, rumor: &Rumor) -> Option<()> {
        let Rumor::Peer(peer_rumor) = rumor else { return None };
        let msg: MajoritySignature<Key> = decode(&peer_rumor.payload)?;
        let signer_pubkey = self.cluster.pubkey_of(peer_rumor.origin)?;
        self.storage.add_peer_declaration(
            msg.key.clone(),
            peer_rumor.origin,
            gossipd_consensus_core::resources::PeerDeclaration {
                signature: Some(SignatureProof { signer_pubkey, signature: msg.signature }),
                ..Default::default()
            },
        );
        self.check_for_state_update(msg.key);
        Some(())
    }

    pub fn on_deregistration_rumor(&self, rumor: &Rumor) -> Option<()> {
        let Rumor::Peer(peer_rumor) = rumor else { return None };
        let msg: Deregistration<Key> = decode(&peer_rumor.payload)?;
        self.storage.deregister_peer(peer_rumor.origin, msg.key);
        Some(())
    }

    pub fn on_artifact_rumor(self: &Arc<Self>, rumor: &Rumor) -> Option<()> {
        let Rumor::Common(common) = rumor else { return None };
        let msg: ConsensusArtifact<Key, Artifact> = decode(&common.payload)?;
        let hash = msg.artifact.hash();
        self.storage.add_artifact(msg.key.clone(), hash, msg.artifact);
        self.check_for_state_update(msg.key);
        Some(())
    }

    pub fn on_final_artifact_rumor(&self, rumor: &Rumor) -> Option<()> {
        let Rumor::Common(common) = rumor else { return None };
        let msg: ConsensusArtifact<Key, Signed<Artifact>> = decode(&common.payload)?;
        self.observe_final_artifact(msg.key, msg.artifact);
        Some(())
    }

    /// Installs observer state for `key` the first time we see a
    /// declaration for it with no local state yet. A no-op once state for
    /// `key` exists, and a no-op before we know any `(last_key,
    /// last_artifact)` at all.
    fn maybe_observe(self: &Arc<Self>, key: Key, source_peer: PeerId) {
        let Some((last_key, last_artifact)) = self.storage.get_last_key_and_artifact() else {
            return;
        };
        let ready_peers = self.cluster.ready_peer_ids();
        let facilitators = select_facilitators_excluding_self(&ready_peers, &self.storage, self.self_id, &key);
        self.storage.cond_modify_state(key.clone(), |current| {
            updater::try_observe_consensus(
                current,
                key.clone(),
                (last_key.clone(), last_artifact.clone()),
                facilitators.clone(),
                source_peer,
            )
            .map(|state| (state, ()))
        });
    }

    /// A final signed artifact broadcast by whichever facilitator finished
    /// first; advances our own `(last_key, last_artifact)` pointer even if we
    /// never locally reached `Finished` for `key` ourselves (observers never
    /// do).
    fn observe_final_artifact(&self, key: Key, signed_artifact: Signed<Artifact>) {
        let current_last = self.storage.get_last_key_and_artifact().map(|(k, _)| k);
        if current_last.as_ref() == Some(&key) {
            return;
        }
        if self.storage.try_update_last_key_and_artifact_with_cleanup(current_last, key.clone(), Some(signed_artifact)) {
            if matches!(self.cluster.own_state(), PeerLifecycleState::Observing) {
                self.cluster.advance_self_to_ready();
            }
            info!(target: LOG_TARGET, %key, "advanced last key from an observed final artifact");
        }
    }

    /// Pumps `try_advance_consensus` for `key` until it stops transitioning.
    /// Each call to `cond_modify_state` here is one ladder step; the loop
    /// re-checks after every step rather than assuming a fixed number of
    /// steps.
    pub fn check_for_state_update(&self, key: Key) {
        loop {
            let resources = self.storage.get_resources(key.clone());
            let self_id = self.self_id;
            let step = self.storage.cond_modify_state(key.clone(), |current| {
                let state = current?;
                if !state.facilitators.contains(self_id) {
                    // We are observing this round, not facilitating it: we
                    // track declarations/artifacts as they arrive but never
                    // drive the ladder ourselves past Facilitated.
                    return None;
                }
                let (new_status, effects) = updater::try_advance_consensus(
                    &self.storage,
                    self_id,
                    self.self_seckey,
                    self.consensus_fns.as_ref(),
                    state,
                    &resources,
                )?;
                let finished = match &new_status {
                    ConsensusStatus::Finished { signed_artifact, majority_trigger } => {
                        let duration = gossipd_consensus_core::timestamp::Timestamp::now()
                            .elapsed_since(state.created_at);
                        Some((signed_artifact.clone(), *majority_trigger, duration))
                    }
                    _ => None,
                };
                let mut new_state = state.clone();
                new_state.set_status(new_status);
                Some((new_state, (effects, finished)))
            });
            let Some((effects, finished)) = step else { break };
            self.emit_effects(effects);
            match finished {
                Some((signed_artifact, trigger, duration)) => {
                    self.on_round_finished(key, signed_artifact, trigger, duration);
                    break;
                }
                None => continue,
            }
        }
    }

    fn on_round_finished(&self, key: Key, signed_artifact: Signed<Artifact>, trigger: Trigger, duration: Duration) {
        let current_last = self.storage.get_last_key_and_artifact().map(|(k, _)| k);
        if !self
            .storage
            .try_update_last_key_and_artifact_with_cleanup(current_last, key.clone(), Some(signed_artifact))
        {
            debug!(target: LOG_TARGET, %key, "last_key_and_artifact CAS lost a race, another path already advanced it");
        }
        if matches!(self.cluster.own_state(), PeerLifecycleState::Observing) {
            self.cluster.advance_self_to_ready();
        }
        if let Some(metrics) = &self.metrics_sink {
            metrics.record_round_finished(duration, trigger);
        }
        info!(
            target: LOG_TARGET,
            %key,
            ?trigger,
            duration_millis = duration.as_millis(),
            "finished consensus round"
        );
    }

    /// The facilitation pipeline: computes the next key, this node's view of
    /// who facilitates it, and attempts the `None -> Facilitated` transition.
    #[instrument(name = "consensus_facilitate", target = LOG_TARGET, level = "debug", skip_all, fields(trigger = ?trigger))]
    async fn internal_facilitate_with(self: &Arc<Self>, trigger: Trigger) {
        let Some((last_key, last_artifact)) = self.storage.get_last_key_and_artifact() else {
            return;
        };
        let next_key = last_key.next();
        let upper_bound = self.storage.get_upper_bound();
        let ready_peers = self.cluster.ready_peer_ids();
        let facilitators = select_facilitators(&ready_peers, &self.storage, self.self_id, &next_key);

        let transitioned = self.storage.cond_modify_state(next_key.clone(), |current| {
            updater::try_facilitate_consensus(
                &self.storage,
                self.self_id,
                current,
                next_key.clone(),
                (last_key.clone(), last_artifact.clone()),
                facilitators.clone(),
                upper_bound.clone(),
                trigger,
            )
        });

        if let Some(effect) = transitioned {
            self.emit_effects(vec![effect]);
            self.check_for_state_update(next_key);
        }
    }

    async fn run_time_trigger_loop(self: Arc<Self>) {
        loop {
            let next_time = gossipd_consensus_core::timestamp::Timestamp::now().after(self.config.time_trigger_interval);
            self.storage.set_time_trigger(Some(next_time));
            tokio::time::sleep(self.config.time_trigger_interval).await;

            self.internal_facilitate_with(Trigger::TimeTrigger).await;
            if self.storage.contains_trigger_event() {
                self.clone().facilitate_on_event().await;
            }
        }
    }

    async fn run_registration_exchange_loop(self: Arc<Self>) {
        loop {
            let peer = {
                let mut rx = self.registration_queue_rx.lock().await;
                match rx.recv().await {
                    Some(peer) => peer,
                    None => return,
                }
            };
            if !self.cluster.is_responsive(peer) {
                continue;
            }
            let own_registration = self.storage.get_own_registration();
            let req = RegistrationExchangeRequest { maybe_key: own_registration };
            let result = (|| self.registration_transport.exchange_registration(peer, req.clone()))
                .retry(REG_EXCHANGE_BACKOFF)
                .notify(|err: &Whatever, dur| {
                    debug!(target: LOG_TARGET, %peer, err = %err.fmt_compact(), ?dur, "retrying registration exchange");
                })
                .await;
            match result {
                Ok(resp) => {
                    if let Some(key) = resp.maybe_key {
                        self.storage.register_peer(peer, key);
                    }
                }
                Err(err) => {
                    warn!(target: LOG_TARGET, %peer, err = %err.fmt_compact(), "registration exchange exhausted retries");
                }
            }
        }
    }

    fn emit_effects(&self, effects: Vec<OutboundEffect<Key, Artifact>>) {
        for effect in effects {
            match effect {
                OutboundEffect::Facility(msg) => self.emit_peer_msg(ContentTypeTag::CONSENSUS_FACILITY, &msg),
                OutboundEffect::Proposal(msg) => self.emit_peer_msg(ContentTypeTag::CONSENSUS_PROPOSAL, &msg),
                OutboundEffect::Signature(msg) => self.emit_peer_msg(ContentTypeTag::MAJORITY_SIGNATURE, &msg),
                OutboundEffect::Artifact(msg) => self.emit_common_msg(ContentTypeTag::CONSENSUS_ARTIFACT, &msg),
                OutboundEffect::FinalArtifact(msg) => {
                    self.emit_common_msg(ContentTypeTag::CONSENSUS_FINAL_ARTIFACT, &msg)
                }
            }
        }
    }

    fn emit_peer_msg<M: Encode>(&self, tag: ContentTypeTag, msg: &M) {
        let bytes = encode(msg);
        self.gossip_sink.emit_peer_rumor(tag, bytes);
    }

    fn emit_common_msg<M: Encode>(&self, tag: ContentTypeTag, msg: &M) {
        let bytes = encode(msg);
        self.gossip_sink.emit_common_rumor(tag, bytes);
    }
}

/// `{self} ∪ {peer : peer is Ready and registered_at <= key and not
/// deregistered at or before key}`.
fn select_facilitators<Key, Artifact>(
    ready_peers: &[PeerId],
    storage: &ConsensusStorage<Key, Artifact>,
    self_id: PeerId,
    key: &Key,
) -> FacilitatorSet
where
    Key: Successor + Ord + Clone + std::hash::Hash + Eq,
{
    let mut ids = vec![self_id];
    ids.extend(eligible_peers(ready_peers, storage, key));
    ids.into_iter().collect()
}

/// Same eligibility rule as [`select_facilitators`], but for a node
/// observing a round it is not itself facilitating: self is never included,
/// regardless of whether it happens to be in `ready_peers`.
fn select_facilitators_excluding_self<Key, Artifact>(
    ready_peers: &[PeerId],
    storage: &ConsensusStorage<Key, Artifact>,
    self_id: PeerId,
    key: &Key,
) -> FacilitatorSet
where
    Key: Successor + Ord + Clone + std::hash::Hash + Eq,
{
    eligible_peers(ready_peers, storage, key)
        .into_iter()
        .filter(|peer| *peer != self_id)
        .collect()
}

fn eligible_peers<Key, Artifact>(
    ready_peers: &[PeerId],
    storage: &ConsensusStorage<Key, Artifact>,
    key: &Key,
) -> Vec<PeerId>
where
    Key: Successor + Ord + Clone + std::hash::Hash + Eq,
{
    ready_peers
        .iter()
        .copied()
        .filter(|peer| {
            let Some(registered_at) = storage.get_registered_peer(*peer) else { return false };
            if registered_at > *key {
                return false;
            }
            if let Some(deregistered_at) = storage.get_deregistration(*peer) {
                if *key >= deregistered_at {
                    return false;
                }
            }
            true
        })
        .collect()
}

fn encode<M: Encode>(msg: &M) -> Vec<u8> {
    bincode::encode_to_vec(msg, gossipd_rumor_core::bincode::RUMOR_BINCODE_CONFIG)
        .expect("encoding an in-memory value can't fail")
}

fn decode<M: Decode<()>>(bytes: &[u8]) -> Option<M> {
    bincode::decode_from_slice(bytes, gossipd_rumor_core::bincode::RUMOR_BINCODE_CONFIG)
        .ok()
        .map(|(value, _)| value)
}
