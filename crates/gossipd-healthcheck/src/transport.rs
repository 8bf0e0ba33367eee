use async_trait::async_trait;
use gossipd_rumor_core::peer::PeerId;
use gossipd_util_error::WhateverResult;

use crate::messages::{HealthcheckPeerDeclarationRequest, HealthcheckPeerDeclarationResponse};

/// `healthcheck/peer-declaration` RPC, transport-agnostic like every other
/// boundary this core is driven through (transport is an external
/// collaborator).
#[async_trait]
pub trait HealthCheckTransport<Status>: Send + Sync + 'static {
    async fn peer_declaration(
        &self,
        peer: PeerId,
        req: HealthcheckPeerDeclarationRequest<Status>,
    ) -> WhateverResult<HealthcheckPeerDeclarationResponse<Status>>;
}
