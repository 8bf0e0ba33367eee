use std::collections::BTreeMap;

use gossipd_rumor_core::peer::PeerId;
use gossipd_rumor_core::signed::Signed;

use crate::event::Event;

/// The pluggable boundary between the generic round-advancement ladder and
/// whatever the embedder's ledger/block application logic does with an
/// agreed-upon artifact.
///
/// Implementations are called synchronously from within a per-key state
/// transition; they should not block on network I/O.
pub trait ConsensusFunctions<Key, Artifact>: Send + Sync + 'static {
    /// Builds this round's candidate artifact from the previous epoch's
    /// result and the events pulled up to the round's upper bound.
    ///
    /// Returns the artifact alongside the subset of `events`, by ordinal per
    /// peer, that were actually incorporated; ordinals not returned are
    /// re-buffered by the caller rather than dropped.
    fn create_proposal_artifact(
        &self,
        last_key_and_artifact: Option<&(Key, Signed<Artifact>)>,
        events: &BTreeMap<PeerId, Vec<(u64, Event)>>,
    ) -> (Artifact, BTreeMap<PeerId, Vec<u64>>);

    /// Applies a fully majority-signed artifact.
    ///
    /// Whether this is safe to invoke more than once for the same `key` is
    /// left to the implementation — the consensus state updater calls it at
    /// most once per key under normal operation, but a restart observing an
    /// already-`Finished` key may call it again, so implementations should
    /// make it idempotent.
    fn consume_signed_majority_artifact(&self, key: &Key, signed: &Signed<Artifact>);
}
