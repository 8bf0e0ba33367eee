use bincode::{Decode, Encode};
use gossipd_util_array_type::{array_type_fixed_size_define, array_type_fixed_size_impl_serde};

array_type_fixed_size_define! {
    /// Identifies one run of the health-check protocol for a given subject
    /// peer; a subject may be checked by more than one concurrently running
    /// round (`RoundId` is the hook a scheduler that runs several rounds in
    /// parallel would key them by), so round bookkeeping is keyed on
    /// `(peer, round_id)`, not `peer` alone.
    #[derive(Encode, Decode, Clone, Copy)]
    pub struct RoundId(u64);
}
array_type_fixed_size_impl_serde!(RoundId);

/// Reference `Status` payload: an embedder is free to use its own type
/// instead, the way [`gossipd_consensus_core::key::EpochKey`] is a
/// reference `Key`, not a requirement.
///
/// Carries the subject's own view of how far it has progressed (`as_of_key`)
/// alongside a liveness bit, so a `calculate_consensus_outcome` driver can
/// distinguish "dead" from "alive but stalled at an old key".
#[derive(Debug, Clone, Copy, Encode, Decode, PartialEq, Eq)]
pub struct ConsensusHealthStatus<Key> {
    pub as_of_key: Key,
    pub alive: bool,
}
