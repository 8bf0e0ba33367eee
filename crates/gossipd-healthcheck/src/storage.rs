use dashmap::DashMap;
use gossipd_rumor_core::peer::PeerId;
use tracing::trace;

use crate::outcome::HealthCheckOutcomeFn;
use crate::round::{HealthCheckKey, HealthCheckRound};
use crate::status::RoundId;
use crate::LOG_TARGET;

/// Keyed registry of in-flight [`HealthCheckRound`]s, one per
/// [`HealthCheckKey`] — mirrors [`gossipd_consensus::storage::ConsensusStorage`]'s
/// per-key `DashMap` sharding, but without the CAS-style `cond_modify_state`
/// the consensus ladder needs: a health-check round has no ladder of
/// statuses to advance through, just monotonic proposal accumulation.
///
/// [`gossipd_consensus::storage::ConsensusStorage`]: https://docs.rs/gossipd-consensus
pub struct HealthCheckStorage<Status> {
    rounds: DashMap<HealthCheckKey, HealthCheckRound<Status>>,
}

impl<Status> Default for HealthCheckStorage<Status> {
    fn default() -> Self {
        Self { rounds: DashMap::new() }
    }
}

impl<Status> HealthCheckStorage<Status> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `owner`'s proposal for `key`, creating the round's
    /// bookkeeping on first touch. Returns whether the insert happened
    /// (`false` if `owner` already declared for this key).
    pub fn add_proposal(&self, key: HealthCheckKey, owner: PeerId, round_id: RoundId, status: Status) -> bool {
        self.rounds.entry(key).or_default().add_proposal(owner, round_id, status)
    }

    pub fn manage_peers(&self, key: HealthCheckKey, current_cluster_peers: &[PeerId]) {
        self.rounds.entry(key).or_default().manage_peers(current_cluster_peers);
    }

    pub fn is_finished(&self, key: HealthCheckKey) -> bool {
        self.rounds.get(&key).is_some_and(|round| round.is_finished())
    }

    /// Evaluates `driver` against `key`'s current bookkeeping; `None` if
    /// `key` has never had a proposal or `manage_peers` call.
    pub fn calculate_outcome<Decision>(
        &self,
        key: HealthCheckKey,
        own_status: &Status,
        self_id: PeerId,
        driver: &dyn HealthCheckOutcomeFn<Status, Decision>,
    ) -> Option<Decision>
    where
        Status: Clone,
    {
        let round = self.rounds.get(&key)?;
        let received = round.proposals_in_participant_set();
        Some(driver.calculate_consensus_outcome(key, own_status, self_id, &received))
    }

    /// Drops bookkeeping for a finished or abandoned key; rounds have no
    /// TTL of their own (everything here is in-memory, with no
    /// cross-restart persistence to worry about), so an embedder's
    /// scheduler is responsible for calling this once it has consumed a
    /// round's outcome.
    pub fn remove(&self, key: HealthCheckKey) {
        if self.rounds.remove(&key).is_some() {
            trace!(target: LOG_TARGET, subject = %key.subject, "dropped health-check round bookkeeping");
        }
    }
}

#[cfg(test)]
mod tests {
    use gossipd_rumor_core::peer::PeerSeckey;

    use super::*;

    fn peer() -> PeerId {
        PeerId::from_pubkey(PeerSeckey::generate().pubkey())
    }

    struct MajorityAlive;
    impl HealthCheckOutcomeFn<bool, bool> for MajorityAlive {
        fn calculate_consensus_outcome(
            &self,
            _key: HealthCheckKey,
            _own_status: &bool,
            _self_id: PeerId,
            received: &std::collections::BTreeMap<PeerId, bool>,
        ) -> bool {
            received.values().filter(|alive| **alive).count() * 2 > received.len()
        }
    }

    #[test]
    fn calculate_outcome_sees_only_current_participants() {
        let storage: HealthCheckStorage<bool> = HealthCheckStorage::new();
        let subject = peer();
        let key = HealthCheckKey { subject, round_id: RoundId::from(1) };
        let a = peer();
        let b = peer();
        let c = peer();

        storage.manage_peers(key, &[a, b, c]);
        storage.add_proposal(key, a, RoundId::from(1), true);
        storage.add_proposal(key, b, RoundId::from(1), true);
        storage.add_proposal(key, c, RoundId::from(1), false);
        assert!(storage.is_finished(key));

        let outcome = storage
            .calculate_outcome(key, &true, a, &MajorityAlive)
            .expect("round exists");
        assert!(outcome);
    }
}
