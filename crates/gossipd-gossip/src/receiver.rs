use std::collections::BTreeSet;

use gossipd_rumor_core::hash::Hash;

use crate::messages::{EndGossipRoundResponse, StartGossipRoundRequest, StartGossipRoundResponse};
use crate::storage::RumorStorage;

/// Handles an incoming [`StartGossipRoundRequest`].
///
/// Symmetric to the initiating side's own inquiry computation: we offer our
/// active set, and ask back for whatever of the peer's offer we don't
/// already have (active or seen).
pub fn handle_start_round(
    storage: &RumorStorage,
    req: StartGossipRoundRequest,
) -> StartGossipRoundResponse {
    let our_seen: BTreeSet<_> = storage.get_seen_hashes().into_iter().collect();
    let inquiry = req
        .offer
        .into_iter()
        .filter(|hash| !our_seen.contains(hash))
        .collect();

    StartGossipRoundResponse {
        offer: storage.get_active_hashes(),
        inquiry,
    }
}

/// Returns the content a peer's `inquiry` asked for.
///
/// The peer's `answer` payload is the caller's concern (validation and
/// enqueueing go through the daemon's inbound queue, which this module has
/// no reference to).
pub fn handle_end_round(storage: &RumorStorage, inquiry: &[Hash]) -> EndGossipRoundResponse {
    EndGossipRoundResponse {
        answer: storage.get_rumors(inquiry),
    }
}
