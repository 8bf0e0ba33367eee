use bincode::{Decode, Encode};
use gossipd_rumor_core::hash::Hash;
use gossipd_rumor_core::signed::Signature;

use crate::event::Bound;

/// Declares a round's facilitator-visible upper bound; gossiped as a
/// `PeerRumor` (origin = declaring facilitator).
#[derive(Debug, Clone, Encode, Decode)]
pub struct ConsensusFacility<Key> {
    pub key: Key,
    pub upper_bound: Bound,
}

/// Declares a facilitator's proposal hash for a round.
#[derive(Debug, Clone, Copy, Encode, Decode)]
pub struct ConsensusProposal<Key> {
    pub key: Key,
    pub proposal_hash: Hash,
}

/// Declares a facilitator's signature over the round's selected majority
/// hash.
#[derive(Debug, Clone, Copy, Encode, Decode)]
pub struct MajoritySignature<Key> {
    pub key: Key,
    pub signature: Signature,
}

/// Releases a peer's claim on facilitator slots at and after `key`, emitted
/// when the peer is leaving the cluster.
#[derive(Debug, Clone, Copy, Encode, Decode)]
pub struct Deregistration<Key> {
    pub key: Key,
}

/// Carries a round's candidate or final artifact content, gossiped as a
/// `CommonRumor` (no origin: any facilitator may be the one to broadcast
/// it).
#[derive(Debug, Clone, Encode, Decode)]
pub struct ConsensusArtifact<Key, Artifact> {
    pub key: Key,
    pub artifact: Artifact,
}

/// `consensus/registration/exchange` request: a peer's own first key of
/// interest, if it has committed to one.
#[derive(Debug, Clone, Copy, Encode, Decode, Default)]
pub struct RegistrationExchangeRequest<Key> {
    pub maybe_key: Option<Key>,
}

/// `consensus/registration/exchange` response, symmetric to the request.
#[derive(Debug, Clone, Copy, Encode, Decode, Default)]
pub struct RegistrationExchangeResponse<Key> {
    pub maybe_key: Option<Key>,
}
