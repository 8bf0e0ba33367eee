//! Pure(-ish) per-key state transitions: `(State?, Resources) ->
//! (State', OutboundEffect)`.
//!
//! "Pure" here means idempotent and free of network I/O: a transition only
//! ever reads `ConsensusStorage`'s event buffer and writes back the
//! declarations/artifacts our own transitions produce, so the gossip daemon
//! skipping dispatch of our own rumors (it never delivers our own outbound
//! traffic back to our own handlers) never leaves our local view of a round
//! short of our own contribution.

use std::collections::BTreeMap;

use gossipd_consensus_core::event::{merge_bounds, Bound};
use gossipd_consensus_core::facilitator_set::FacilitatorSet;
use gossipd_consensus_core::functions::ConsensusFunctions;
use gossipd_consensus_core::key::Successor;
use gossipd_consensus_core::msg::{ConsensusArtifact, ConsensusFacility, ConsensusProposal, MajoritySignature};
use gossipd_consensus_core::resources::{ConsensusResources, PeerDeclaration};
use gossipd_consensus_core::sign::MajorityHash;
use gossipd_consensus_core::state::{ConsensusState, ConsensusStatus, Trigger};
use gossipd_rumor_core::hash::{Hash, Hashable};
use gossipd_rumor_core::peer::{PeerId, PeerSeckey};
use gossipd_rumor_core::signed::{Signable, Signed, SignatureProof};

use crate::storage::ConsensusStorage;

/// A side effect a transition wants gossiped; the caller (the consensus
/// manager) is responsible for actually broadcasting these.
#[derive(Debug, Clone)]
pub enum OutboundEffect<Key, Artifact> {
    Facility(ConsensusFacility<Key>),
    Proposal(ConsensusProposal<Key>),
    Artifact(ConsensusArtifact<Key, Artifact>),
    Signature(MajoritySignature<Key>),
    FinalArtifact(ConsensusArtifact<Key, Signed<Artifact>>),
}

/// Applicable only when per-key state is absent; starts a new round as
/// facilitator.
///
/// Records our own `upper_bound` declaration in `storage` before returning:
/// our own `ConsensusFacility` rumor is gossiped to other peers but never
/// dispatched back to ourselves (the daemon skips dispatch of our own
/// rumors), so without this the `Facilitated -> ProposalMade` step would
/// wait forever on a self-declaration nobody ever supplies.
pub fn try_facilitate_consensus<Key, Artifact>(
    storage: &ConsensusStorage<Key, Artifact>,
    self_id: PeerId,
    current: Option<&ConsensusState<Key, Artifact>>,
    key: Key,
    last_key_and_artifact: (Key, Option<Signed<Artifact>>),
    facilitators: FacilitatorSet,
    upper_bound: Bound,
    trigger: Trigger,
) -> Option<(ConsensusState<Key, Artifact>, OutboundEffect<Key, Artifact>)>
where
    Key: Successor + Ord + Clone + std::hash::Hash + Eq,
{
    if current.is_some() {
        return None;
    }
    let state = ConsensusState::new(key.clone(), last_key_and_artifact, facilitators, trigger);
    storage.add_peer_declaration(
        key.clone(),
        self_id,
        PeerDeclaration {
            upper_bound: Some(upper_bound.clone()),
            ..Default::default()
        },
    );
    let effect = OutboundEffect::Facility(ConsensusFacility { key, upper_bound });
    Some((state, effect))
}

/// Installs state for a round already under way elsewhere, without
/// proposing anything ourselves; used by a joining/observing node
/// (`start_observing_after`).
///
/// `source_peer` is the peer whose registration exchange we observed this
/// round through; it carries no weight in the transition itself and exists
/// only so callers can log provenance.
pub fn try_observe_consensus<Key, Artifact>(
    current: Option<&ConsensusState<Key, Artifact>>,
    key: Key,
    last_key_and_artifact: (Key, Option<Signed<Artifact>>),
    facilitators: FacilitatorSet,
    source_peer: PeerId,
) -> Option<ConsensusState<Key, Artifact>> {
    if current.is_some() {
        return None;
    }
    tracing::debug!(
        target: crate::LOG_TARGET,
        peer = %source_peer,
        "observing consensus round from peer"
    );
    Some(ConsensusState::new(
        key,
        last_key_and_artifact,
        facilitators,
        Trigger::TimeTrigger,
    ))
}

/// Attempts the single next step of the `Facilitated -> ProposalMade ->
/// MajoritySelected -> MajoritySigned -> Finished` ladder for `state`,
/// given the resources collected so far.
///
/// Returns `None` when no condition for the next step is met yet (including
/// when `state` is already `Finished`); re-calling with unchanged resources
/// is always a no-op, satisfying the idempotence requirement.
#[allow(clippy::too_many_arguments)]
pub fn try_advance_consensus<Key, Artifact>(
    storage: &ConsensusStorage<Key, Artifact>,
    self_id: PeerId,
    self_seckey: PeerSeckey,
    consensus_fns: &dyn ConsensusFunctions<Key, Artifact>,
    state: &ConsensusState<Key, Artifact>,
    resources: &ConsensusResources<Artifact>,
) -> Option<(ConsensusStatus<Artifact>, Vec<OutboundEffect<Key, Artifact>>)>
where
    Key: Successor + Ord + Clone + std::hash::Hash + Eq,
    Artifact: Hashable + Clone,
{
    match &state.status {
        ConsensusStatus::Facilitated => {
            facilitated_to_proposal_made(storage, self_id, consensus_fns, state, resources)
        }
        ConsensusStatus::ProposalMade { .. } => {
            proposal_made_to_majority_selected(storage, self_id, self_seckey, state, resources)
        }
        ConsensusStatus::MajoritySelected { .. } => {
            majority_selected_to_majority_signed(consensus_fns, state, resources)
        }
        ConsensusStatus::MajoritySigned { signed_artifact } => Some((
            ConsensusStatus::Finished {
                signed_artifact: signed_artifact.clone(),
                majority_trigger: state.trigger,
            },
            Vec::new(),
        )),
        ConsensusStatus::Finished { .. } => None,
    }
}

fn facilitated_to_proposal_made<Key, Artifact>(
    storage: &ConsensusStorage<Key, Artifact>,
    self_id: PeerId,
    consensus_fns: &dyn ConsensusFunctions<Key, Artifact>,
    state: &ConsensusState<Key, Artifact>,
    resources: &ConsensusResources<Artifact>,
) -> Option<(ConsensusStatus<Artifact>, Vec<OutboundEffect<Key, Artifact>>)>
where
    Key: Successor + Ord + Clone + std::hash::Hash + Eq,
    Artifact: Hashable + Clone,
{
    let declared_bounds: Vec<Bound> = state
        .facilitators
        .iter()
        .map(|peer| resources.peer_declarations.get(peer).and_then(|d| d.upper_bound.clone()))
        .collect::<Option<_>>()?;

    let bound = merge_bounds(declared_bounds);
    let pulled = storage.pull_events(&bound);

    let last = state
        .last_key_and_artifact
        .1
        .as_ref()
        .map(|signed| (state.last_key_and_artifact.0.clone(), signed.clone()));
    let (artifact, consumed) = consensus_fns.create_proposal_artifact(last.as_ref(), &pulled);

    let mut leftover = pulled;
    for (peer, ordinals) in &consumed {
        if let Some(per_peer) = leftover.get_mut(peer) {
            per_peer.retain(|(ordinal, _)| !ordinals.contains(ordinal));
        }
    }
    leftover.retain(|_, events| !events.is_empty());
    storage.add_events(leftover);

    let hash = artifact.hash();
    storage.add_artifact(state.key.clone(), hash, artifact.clone());
    storage.add_peer_declaration(
        state.key.clone(),
        self_id,
        PeerDeclaration {
            proposal: Some(hash),
            ..Default::default()
        },
    );

    let effects = vec![
        OutboundEffect::Proposal(ConsensusProposal {
            key: state.key.clone(),
            proposal_hash: hash,
        }),
        OutboundEffect::Artifact(ConsensusArtifact {
            key: state.key.clone(),
            artifact: artifact.clone(),
        }),
    ];
    Some((ConsensusStatus::ProposalMade { hash, artifact }, effects))
}

fn proposal_made_to_majority_selected<Key, Artifact>(
    storage: &ConsensusStorage<Key, Artifact>,
    self_id: PeerId,
    self_seckey: PeerSeckey,
    state: &ConsensusState<Key, Artifact>,
    resources: &ConsensusResources<Artifact>,
) -> Option<(ConsensusStatus<Artifact>, Vec<OutboundEffect<Key, Artifact>>)>
where
    Key: Clone,
    Artifact: Clone,
{
    let ConsensusStatus::ProposalMade { hash: our_hash, artifact: our_artifact } = &state.status else {
        return None;
    };

    let declared_hashes: Vec<Hash> = state
        .facilitators
        .iter()
        .map(|peer| resources.peer_declarations.get(peer).and_then(|d| d.proposal))
        .collect::<Option<_>>()?;

    let mut counts: BTreeMap<Hash, usize> = BTreeMap::new();
    for hash in declared_hashes {
        *counts.entry(hash).or_insert(0) += 1;
    }
    // argmax by count, ties broken by lexicographically smallest hash.
    let majority = counts
        .into_iter()
        .max_by(|(hash_a, count_a), (hash_b, count_b)| count_a.cmp(count_b).then(hash_b.cmp(hash_a)))
        .map(|(hash, _)| hash)
        .expect("facilitators is non-empty and every facilitator has declared a proposal");

    let signature = MajorityHash(majority).sign_with(self_seckey);
    let proof = SignatureProof {
        signer_pubkey: self_seckey.pubkey(),
        signature,
    };
    storage.add_peer_declaration(
        state.key.clone(),
        self_id,
        PeerDeclaration {
            signature: Some(proof),
            ..Default::default()
        },
    );

    let mut effects = vec![OutboundEffect::Signature(MajoritySignature {
        key: state.key.clone(),
        signature,
    })];
    if majority == *our_hash {
        effects.push(OutboundEffect::Artifact(ConsensusArtifact {
            key: state.key.clone(),
            artifact: our_artifact.clone(),
        }));
    }
    Some((ConsensusStatus::MajoritySelected { hash: majority }, effects))
}

fn majority_selected_to_majority_signed<Key, Artifact>(
    consensus_fns: &dyn ConsensusFunctions<Key, Artifact>,
    state: &ConsensusState<Key, Artifact>,
    resources: &ConsensusResources<Artifact>,
) -> Option<(ConsensusStatus<Artifact>, Vec<OutboundEffect<Key, Artifact>>)>
where
    Key: Clone,
    Artifact: Clone,
{
    let ConsensusStatus::MajoritySelected { hash: majority } = &state.status else {
        return None;
    };
    let majority = *majority;

    let proofs: Vec<SignatureProof> = state
        .facilitators
        .iter()
        .map(|peer| resources.peer_declarations.get(peer).and_then(|d| d.signature.clone()))
        .collect::<Option<_>>()?;
    let artifact = resources.artifacts.get(&majority)?.clone();

    let signed = Signed {
        value: artifact,
        proofs,
    };
    consensus_fns.consume_signed_majority_artifact(&state.key, &signed);

    let effect = OutboundEffect::FinalArtifact(ConsensusArtifact {
        key: state.key.clone(),
        artifact: signed.clone(),
    });
    Some((ConsensusStatus::MajoritySigned { signed_artifact: signed }, vec![effect]))
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use gossipd_consensus_core::event::Event;
    use gossipd_consensus_core::key::EpochKey;
    use gossipd_rumor_core::peer::PeerSeckey;

    use super::*;

    #[derive(Debug)]
    struct CountingArtifact(Vec<u8>);

    impl bincode::Encode for CountingArtifact {
        fn encode<E: bincode::enc::Encoder>(&self, encoder: &mut E) -> Result<(), bincode::error::EncodeError> {
            self.0.encode(encoder)
        }
    }
    impl Hashable for CountingArtifact {}
    impl Clone for CountingArtifact {
        fn clone(&self) -> Self {
            Self(self.0.clone())
        }
    }

    struct EchoFunctions {
        consumed: Mutex<Vec<EpochKey>>,
    }

    impl ConsensusFunctions<EpochKey, CountingArtifact> for EchoFunctions {
        fn create_proposal_artifact(
            &self,
            _last_key_and_artifact: Option<&(EpochKey, Signed<CountingArtifact>)>,
            events: &BTreeMap<PeerId, Vec<(u64, Event)>>,
        ) -> (CountingArtifact, BTreeMap<PeerId, Vec<u64>>) {
            let mut bytes = Vec::new();
            let mut consumed = BTreeMap::new();
            for (peer, per_peer) in events {
                let ordinals: Vec<u64> = per_peer.iter().map(|(ordinal, _)| *ordinal).collect();
                for (_, event) in per_peer {
                    bytes.extend_from_slice(&event.payload);
                }
                consumed.insert(*peer, ordinals);
            }
            (CountingArtifact(bytes), consumed)
        }

        fn consume_signed_majority_artifact(&self, key: &EpochKey, _signed: &Signed<CountingArtifact>) {
            self.consumed.lock().expect("poisoned").push(*key);
        }
    }

    fn new_facilitator_set(ids: &[PeerId]) -> FacilitatorSet {
        ids.iter().copied().collect()
    }

    #[test]
    fn facilitate_then_advance_through_proposal_with_single_facilitator() {
        let storage: ConsensusStorage<EpochKey, CountingArtifact> = ConsensusStorage::new();
        let seckey = PeerSeckey::generate();
        let self_id = PeerId::from_pubkey(seckey.pubkey());
        let fns = EchoFunctions { consumed: Mutex::new(Vec::new()) };

        let key = EpochKey::from(1);
        let facilitators = new_facilitator_set(&[self_id]);
        let (mut state, _facility_effect) = try_facilitate_consensus(
            &storage,
            self_id,
            None,
            key,
            (EpochKey::from(0), None),
            facilitators,
            Bound::new(),
            Trigger::TimeTrigger,
        )
        .expect("no existing state");

        // try_facilitate_consensus already recorded our own upper_bound
        // declaration; the round should advance without any further input.
        let resources = storage.get_resources(key);
        let (status, effects) =
            try_advance_consensus(&storage, self_id, seckey, &fns, &state, &resources).expect("should advance");
        assert!(matches!(status, ConsensusStatus::ProposalMade { .. }));
        assert_eq!(effects.len(), 2);
        state.set_status(status);

        // idempotent: resources unchanged except for what we just wrote; the
        // proposal step itself must not re-fire.
        let resources = storage.get_resources(key);
        assert!(try_advance_consensus(&storage, self_id, seckey, &fns, &state, &resources).is_some());
    }

    #[test]
    fn majority_tie_break_prefers_lexicographically_smaller_hash() {
        let storage: ConsensusStorage<EpochKey, CountingArtifact> = ConsensusStorage::new();
        let fns = EchoFunctions { consumed: Mutex::new(Vec::new()) };
        let key = EpochKey::from(1);

        let seckeys: Vec<PeerSeckey> = (0..4).map(|_| PeerSeckey::generate()).collect();
        let ids: Vec<PeerId> = seckeys.iter().map(|sk| PeerId::from_pubkey(sk.pubkey())).collect();
        let facilitators = new_facilitator_set(&ids);

        let low = Hash::from_bytes([0x01; 32]);
        let high = Hash::from_bytes([0xff; 32]);
        let hashes = [high, high, low, low];
        for (peer, hash) in ids.iter().zip(hashes) {
            storage.add_peer_declaration(
                key,
                *peer,
                PeerDeclaration {
                    proposal: Some(hash),
                    ..Default::default()
                },
            );
        }
        let state = ConsensusState {
            key,
            last_key_and_artifact: (EpochKey::from(0), None),
            facilitators,
            status: ConsensusStatus::ProposalMade {
                hash: high,
                artifact: CountingArtifact(vec![]),
            },
            trigger: Trigger::TimeTrigger,
            created_at: gossipd_consensus_core::timestamp::Timestamp::now(),
            status_updated_at: gossipd_consensus_core::timestamp::Timestamp::now(),
        };

        let resources = storage.get_resources(key);
        let (status, _effects) =
            try_advance_consensus(&storage, ids[0], seckeys[0], &fns, &state, &resources).expect("should advance");
        match status {
            ConsensusStatus::MajoritySelected { hash } => assert_eq!(hash, low),
            other => panic!("expected MajoritySelected, got {other:?}"),
        }
    }
}
