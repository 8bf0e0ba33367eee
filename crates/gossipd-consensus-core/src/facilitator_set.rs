use std::ops;

use bincode::{Decode, Encode};
use gossipd_rumor_core::peer::PeerId;

/// Sorted, deduplicated set of facilitator identities for a round.
///
/// Signature order in `MajoritySigned`/`Finished` depends on this sort
/// order being fixed across every facilitator.
#[derive(Debug, Clone, Encode, Decode, Default, PartialEq, Eq)]
pub struct FacilitatorSet(Vec<PeerId>);

impl ops::Deref for FacilitatorSet {
    type Target = [PeerId];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl FacilitatorSet {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn contains(&self, peer: PeerId) -> bool {
        self.0.binary_search(&peer).is_ok()
    }
}

impl FromIterator<PeerId> for FacilitatorSet {
    fn from_iter<T: IntoIterator<Item = PeerId>>(iter: T) -> Self {
        let mut items: Vec<PeerId> = iter.into_iter().collect();
        items.sort_unstable();
        items.dedup();
        Self(items)
    }
}
