use std::collections::BTreeMap;

use gossipd_rumor_core::hash::Hash;
use gossipd_rumor_core::peer::PeerId;
use gossipd_rumor_core::signed::SignatureProof;

use crate::event::Bound;

/// One peer's contribution toward the round in progress.
///
/// Fields are set-monotonic: once `Some`, a field is never overwritten by a
/// later declaration for the same `(key, peer)`.
///
/// `signature` carries the full [`SignatureProof`] rather than a bare
/// `Signature`: assembling the final `Signed<Artifact>` needs each
/// facilitator's `PeerPubkey`, which is otherwise unrecoverable from a
/// `PeerId` alone.
#[derive(Debug, Clone, Default)]
pub struct PeerDeclaration {
    pub upper_bound: Option<Bound>,
    pub proposal: Option<Hash>,
    pub signature: Option<SignatureProof>,
}

impl PeerDeclaration {
    /// Fills in whichever of `other`'s fields are set and not yet present on
    /// `self`; a field already set on `self` is left untouched.
    pub fn fill_from(&mut self, other: &PeerDeclaration) {
        if self.upper_bound.is_none() {
            self.upper_bound = other.upper_bound.clone();
        }
        if self.proposal.is_none() {
            self.proposal = other.proposal;
        }
        if self.signature.is_none() {
            self.signature = other.signature;
        }
    }
}

/// Everything collected so far for a single round's key, as declarations
/// and candidate artifacts arrive out of order from facilitators.
#[derive(Debug, Clone)]
pub struct ConsensusResources<Artifact> {
    pub peer_declarations: BTreeMap<PeerId, PeerDeclaration>,
    pub artifacts: BTreeMap<Hash, Artifact>,
}

impl<Artifact> Default for ConsensusResources<Artifact> {
    fn default() -> Self {
        Self {
            peer_declarations: BTreeMap::new(),
            artifacts: BTreeMap::new(),
        }
    }
}

impl<Artifact> ConsensusResources<Artifact> {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peer_declaration_is_first_writer_wins() {
        let mut decl = PeerDeclaration::default();
        let hash_a = Hash::default();
        decl.proposal = Some(hash_a);

        let mut incoming = PeerDeclaration::default();
        incoming.proposal = Some(Hash::from_bytes([1u8; 32]));

        decl.fill_from(&incoming);
        assert_eq!(decl.proposal, Some(hash_a));
    }
}
