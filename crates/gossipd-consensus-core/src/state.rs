use gossipd_rumor_core::hash::Hash;
use gossipd_rumor_core::signed::Signed;

use crate::facilitator_set::FacilitatorSet;
use crate::timestamp::Timestamp;

/// What caused a round to start facilitating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    EventTrigger,
    TimeTrigger,
}

/// Where a single key's round currently stands in the `Facilitated ->
/// ProposalMade -> MajoritySelected -> MajoritySigned -> Finished` ladder.
/// Ordered so `<` expresses the monotone advancement invariant without
/// depending on the payload each variant carries.
#[derive(Debug, Clone)]
pub enum ConsensusStatus<Artifact> {
    Facilitated,
    ProposalMade { hash: Hash, artifact: Artifact },
    MajoritySelected { hash: Hash },
    MajoritySigned { signed_artifact: Signed<Artifact> },
    Finished { signed_artifact: Signed<Artifact>, majority_trigger: Trigger },
}

impl<Artifact> ConsensusStatus<Artifact> {
    /// Ordinal used to check the monotone-advancement invariant; variant
    /// payloads are deliberately ignored.
    pub fn rank(&self) -> u8 {
        match self {
            ConsensusStatus::Facilitated => 0,
            ConsensusStatus::ProposalMade { .. } => 1,
            ConsensusStatus::MajoritySelected { .. } => 2,
            ConsensusStatus::MajoritySigned { .. } => 3,
            ConsensusStatus::Finished { .. } => 4,
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, ConsensusStatus::Finished { .. })
    }
}

/// The full state of one key's consensus round.
pub struct ConsensusState<Key, Artifact> {
    pub key: Key,
    /// The previous finalized epoch; `None` artifact at genesis, before any
    /// round has ever finished.
    pub last_key_and_artifact: (Key, Option<Signed<Artifact>>),
    pub facilitators: FacilitatorSet,
    pub status: ConsensusStatus<Artifact>,
    /// What started this round; carried through to `Finished` as
    /// `majority_trigger`.
    pub trigger: Trigger,
    pub created_at: Timestamp,
    pub status_updated_at: Timestamp,
}

impl<Key: Clone, Artifact: Clone> Clone for ConsensusState<Key, Artifact> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            last_key_and_artifact: self.last_key_and_artifact.clone(),
            facilitators: self.facilitators.clone(),
            status: self.status.clone(),
            trigger: self.trigger,
            created_at: self.created_at,
            status_updated_at: self.status_updated_at,
        }
    }
}

impl<Key, Artifact> ConsensusState<Key, Artifact> {
    pub fn new(
        key: Key,
        last_key_and_artifact: (Key, Option<Signed<Artifact>>),
        facilitators: FacilitatorSet,
        trigger: Trigger,
    ) -> Self {
        let now = Timestamp::now();
        Self {
            key,
            last_key_and_artifact,
            facilitators,
            status: ConsensusStatus::Facilitated,
            trigger,
            created_at: now,
            status_updated_at: now,
        }
    }

    pub fn set_status(&mut self, status: ConsensusStatus<Artifact>) {
        debug_assert!(
            status.rank() >= self.status.rank(),
            "consensus state must not regress"
        );
        self.status = status;
        self.status_updated_at = Timestamp::now();
    }
}
