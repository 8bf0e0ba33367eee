use bincode::{Decode, Encode};
use gossipd_rumor_core::hash::Hash;
use gossipd_rumor_core::rumor::RumorBatch;

/// Opens a gossip round: "here's what I have active".
#[derive(Encode, Decode, Clone, Debug, Default)]
pub struct StartGossipRoundRequest {
    pub offer: Vec<Hash>,
}

/// Responds with our own offer, plus which of the peer's offered hashes we
/// still need.
#[derive(Encode, Decode, Clone, Debug, Default)]
pub struct StartGossipRoundResponse {
    pub offer: Vec<Hash>,
    pub inquiry: Vec<Hash>,
}

/// Closes the round: pushes the content the peer asked for, and repeats our
/// own inquiry so the peer can answer in its response.
#[derive(Encode, Decode, Clone, Debug, Default)]
pub struct EndGossipRoundRequest {
    pub answer: RumorBatch,
    pub inquiry: Vec<Hash>,
}

/// Final leg: the content we asked for, from the peer.
#[derive(Encode, Decode, Clone, Debug, Default)]
pub struct EndGossipRoundResponse {
    pub answer: RumorBatch,
}
