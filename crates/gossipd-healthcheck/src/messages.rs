use std::collections::BTreeSet;

use bincode::{Decode, Encode};

use crate::status::RoundId;

/// `healthcheck/peer-declaration` request: the sender's view of which
/// `RoundId`s are currently live, plus its own proposal.
#[derive(Debug, Clone, Encode, Decode)]
pub struct HealthcheckPeerDeclarationRequest<Status> {
    pub round_ids: BTreeSet<RoundId>,
    pub status: Status,
}

/// Response carries the receiver's own proposal back, if it has one to
/// share yet.
#[derive(Debug, Clone, Encode, Decode)]
pub struct HealthcheckPeerDeclarationResponse<Status> {
    pub status: Option<Status>,
}
