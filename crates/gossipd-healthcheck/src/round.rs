use std::collections::{BTreeMap, BTreeSet};

use gossipd_rumor_core::peer::PeerId;

use crate::status::RoundId;

/// `(subject, round_id)`: the peer being checked for liveness, and which
/// run of the protocol this bookkeeping instance belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HealthCheckKey {
    pub subject: PeerId,
    pub round_id: RoundId,
}

/// Per-`HealthCheckKey` bookkeeping: who is expected to vote, which
/// `RoundId`s have been folded in, and what each voter has proposed so far.
///
/// `proposals` is set-monotonic exactly like [`gossipd_consensus_core::resources::PeerDeclaration`]:
/// a voter's first submission wins, later ones for the same voter are
/// dropped.
#[derive(Debug, Clone)]
pub struct HealthCheckRound<Status> {
    participants: BTreeSet<PeerId>,
    round_ids: BTreeSet<RoundId>,
    proposals: BTreeMap<PeerId, Status>,
}

impl<Status> Default for HealthCheckRound<Status> {
    fn default() -> Self {
        Self {
            participants: BTreeSet::new(),
            round_ids: BTreeSet::new(),
            proposals: BTreeMap::new(),
        }
    }
}

impl<Status> HealthCheckRound<Status> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `owner`'s proposal iff `owner` has not already submitted one
    /// for this key; returns whether the insert happened. On a successful
    /// first insert, merges `round_id` into the accumulated set and adds
    /// `owner` to the participant set.
    pub fn add_proposal(&mut self, owner: PeerId, round_id: RoundId, status: Status) -> bool {
        if self.proposals.contains_key(&owner) {
            return false;
        }
        self.proposals.insert(owner, status);
        self.round_ids.insert(round_id);
        self.participants.insert(owner);
        true
    }

    /// Reconciles the expected participant set against the cluster's
    /// current membership: a peer absent from `current_cluster_peers` is
    /// dropped unless it already submitted a proposal; every peer present
    /// in `current_cluster_peers` is (re-)tracked as expected to vote.
    pub fn manage_peers(&mut self, current_cluster_peers: &[PeerId]) {
        let current: BTreeSet<PeerId> = current_cluster_peers.iter().copied().collect();
        self.participants
            .retain(|peer| current.contains(peer) || self.proposals.contains_key(peer));
        self.participants.extend(current);
    }

    /// True once every currently expected participant has submitted a
    /// proposal.
    pub fn is_finished(&self) -> bool {
        self.participants.iter().all(|peer| self.proposals.contains_key(peer))
    }

    pub fn participants(&self) -> &BTreeSet<PeerId> {
        &self.participants
    }

    pub fn round_ids(&self) -> &BTreeSet<RoundId> {
        &self.round_ids
    }

    /// Proposals restricted to the current participant set. A proposal from
    /// a peer since pruned out of `participants` (it left the cluster
    /// before ever voting — impossible by construction, since only owners
    /// who *have* voted survive pruning) is filtered out defensively rather
    /// than assumed away.
    pub fn proposals_in_participant_set(&self) -> BTreeMap<PeerId, Status>
    where
        Status: Clone,
    {
        self.proposals
            .iter()
            .filter(|(peer, _)| self.participants.contains(peer))
            .map(|(peer, status)| (*peer, status.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use gossipd_rumor_core::peer::PeerSeckey;

    use super::*;

    fn peer() -> PeerId {
        PeerId::from_pubkey(PeerSeckey::generate().pubkey())
    }

    #[test]
    fn first_proposal_wins_and_seeds_bookkeeping() {
        let mut round: HealthCheckRound<bool> = HealthCheckRound::new();
        let owner = peer();
        let round_id = RoundId::from(1);

        assert!(round.add_proposal(owner, round_id, true));
        assert!(!round.add_proposal(owner, RoundId::from(2), false));

        assert_eq!(round.proposals_in_participant_set().get(&owner), Some(&true));
        assert!(round.round_ids().contains(&round_id));
        assert!(!round.round_ids().contains(&RoundId::from(2)));
    }

    #[test]
    fn manage_peers_prunes_absent_non_voters_but_keeps_voters() {
        let mut round: HealthCheckRound<bool> = HealthCheckRound::new();
        let voter = peer();
        let silent = peer();
        let newcomer = peer();

        round.manage_peers(&[voter, silent]);
        round.add_proposal(voter, RoundId::from(1), true);

        round.manage_peers(&[newcomer]);

        assert!(round.participants().contains(&voter));
        assert!(!round.participants().contains(&silent));
        assert!(round.participants().contains(&newcomer));
    }

    #[test]
    fn is_finished_requires_every_participant_to_have_voted() {
        let mut round: HealthCheckRound<bool> = HealthCheckRound::new();
        let a = peer();
        let b = peer();
        round.manage_peers(&[a, b]);
        assert!(!round.is_finished());

        round.add_proposal(a, RoundId::from(1), true);
        assert!(!round.is_finished());

        round.add_proposal(b, RoundId::from(1), true);
        assert!(round.is_finished());
    }
}
