use std::collections::BTreeMap;

use gossipd_rumor_core::peer::PeerId;

use crate::round::HealthCheckKey;

/// The pluggable boundary where the outcome-selection policy for health
/// checks lives: deliberately left to the embedder. This crate builds every
/// piece of bookkeeping up to the point a decision is needed
/// ([`crate::round::HealthCheckRound::is_finished`],
/// `proposals_in_participant_set`) and stops there; an embedder supplies the
/// actual policy.
pub trait HealthCheckOutcomeFn<Status, Decision>: Send + Sync + 'static {
    /// `received` is already filtered to the round's current participant
    /// set by the caller.
    fn calculate_consensus_outcome(
        &self,
        key: HealthCheckKey,
        own_status: &Status,
        self_id: PeerId,
        received: &BTreeMap<PeerId, Status>,
    ) -> Decision;
}
