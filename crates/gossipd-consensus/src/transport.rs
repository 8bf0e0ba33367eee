//! Abstract boundaries the manager is driven through: none of these are
//! implemented by this crate, mirroring [`gossipd_gossip::transport`]'s
//! treatment of the same concern for the gossip daemon.

use async_trait::async_trait;
use gossipd_consensus_core::msg::{RegistrationExchangeRequest, RegistrationExchangeResponse};
use gossipd_rumor_core::peer::{PeerId, PeerPubkey};
use gossipd_rumor_core::rumor::ContentTypeTag;
use gossipd_util_error::WhateverResult;

/// `consensus/registration/exchange` RPC, transport-agnostic.
#[async_trait]
pub trait RegistrationTransport<Key>: Send + Sync + 'static {
    async fn exchange_registration(
        &self,
        peer: PeerId,
        req: RegistrationExchangeRequest<Key>,
    ) -> WhateverResult<RegistrationExchangeResponse<Key>>;
}

/// Where a transition's [`crate::updater::OutboundEffect`] goes once the
/// manager has applied the corresponding state change.
///
/// The manager encodes the effect's payload itself and hands the sink only
/// bytes plus a content-type tag; the sink's job is solely to get those
/// bytes signed, stored, and offered in the next gossip round — in
/// practice, an embedder's sink is almost always a thin wrapper around
/// [`gossipd_gossip::daemon::GossipDaemon::enqueue_inbound`], which is why
/// `PeerRumor`s we originate are never re-dispatched to our own handlers
/// (the daemon's dispatch step skips rumors whose origin is `self`).
pub trait ConsensusGossipSink: Send + Sync + 'static {
    /// Gossips a value that must carry our own origin (a declaration).
    fn emit_peer_rumor(&self, content_type_tag: ContentTypeTag, payload: Vec<u8>);
    /// Gossips a value with no origin constraint (a candidate/final artifact).
    fn emit_common_rumor(&self, content_type_tag: ContentTypeTag, payload: Vec<u8>);
}

/// A peer's lifecycle state as tracked by the (out-of-scope) cluster/session
/// layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerLifecycleState {
    /// Joined but has not yet been accepted as a facilitator candidate.
    Observing,
    /// Eligible to be selected as a facilitator.
    Ready,
    /// Currently participating in at least one round as a facilitator.
    InConsensus,
    /// Exiting the cluster; its facilitator slots should be released.
    Leaving,
}

/// Abstract view onto cluster membership and liveness; peer handshake and
/// session management are an external collaborator this crate never touches.
///
/// The manager never discovers peers or dials connections itself; it only
/// ever asks this view what it currently believes, and reports back
/// observed lifecycle transitions that are its own responsibility (e.g.
/// "we finished observing, promote us to `Ready`").
pub trait ClusterView<Key>: Send + Sync + 'static {
    /// Our own lifecycle state, as understood by the cluster layer.
    fn own_state(&self) -> PeerLifecycleState;

    /// Peers currently in [`PeerLifecycleState::Ready`], candidates for
    /// facilitator selection.
    fn ready_peer_ids(&self) -> Vec<PeerId>;

    /// Whether `peer` currently looks reachable; gates whether the
    /// registration-exchange background task bothers enqueueing it.
    fn is_responsive(&self, peer: PeerId) -> bool;

    /// Called once a terminal round's `try_update_last_key_and_artifact_with_cleanup`
    /// succeeds while we were `Observing`.
    fn advance_self_to_ready(&self);

    /// Unused by the reference registration-exchange initiation rule, kept
    /// as a hook so embedders with their own peer id allocation can still
    /// enforce a consistent tiebreaker; default implementation defers
    /// entirely to `self_id < peer` at the call site.
    fn should_initiate_exchange(&self, _self_id: PeerId, _peer: PeerId) -> bool {
        true
    }

    /// Recovers `peer`'s pubkey from its id, needed to turn a received
    /// `MajoritySignature` into a verifiable [`gossipd_rumor_core::signed::SignatureProof`]
    /// (`PeerId` is a one-way hash of the pubkey, so this crate cannot do it
    /// alone). The cluster/session layer already has this from the handshake.
    fn pubkey_of(&self, peer: PeerId) -> Option<PeerPubkey>;
}
