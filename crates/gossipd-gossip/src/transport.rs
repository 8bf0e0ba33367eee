use std::sync::Arc;

use gossipd_rumor_core::peer::PeerId;
use gossipd_util_error::WhateverResult;

use crate::messages::{
    EndGossipRoundRequest, EndGossipRoundResponse, StartGossipRoundRequest, StartGossipRoundResponse,
};

/// Abstract RPC boundary a gossip round is driven over.
///
/// The daemon never opens connections itself; an embedder supplies the
/// concrete transport (HTTP, iroh, an in-process channel for tests).
#[async_trait::async_trait]
pub trait GossipTransport: Send + Sync + 'static {
    async fn start_round(
        &self,
        peer: PeerId,
        req: StartGossipRoundRequest,
    ) -> WhateverResult<StartGossipRoundResponse>;

    async fn end_round(
        &self,
        peer: PeerId,
        req: EndGossipRoundRequest,
    ) -> WhateverResult<EndGossipRoundResponse>;
}

/// Lets an embedder hand `GossipDaemon` a `dyn GossipTransport` instead of
/// being generic over the concrete transport type itself (the daemon is
/// already generic over `T: GossipTransport`, but a long-lived process
/// assembling its daemon from CLI-selected pieces, as `gossipd`'s binary
/// crate does, would otherwise have to be generic too).
#[async_trait::async_trait]
impl GossipTransport for Arc<dyn GossipTransport> {
    async fn start_round(
        &self,
        peer: PeerId,
        req: StartGossipRoundRequest,
    ) -> WhateverResult<StartGossipRoundResponse> {
        (**self).start_round(peer, req).await
    }

    async fn end_round(&self, peer: PeerId, req: EndGossipRoundRequest) -> WhateverResult<EndGossipRoundResponse> {
        (**self).end_round(peer, req).await
    }
}

/// Snapshot of the peers currently eligible for gossip fanout.
///
/// Liveness/membership is the cluster layer's concern; the gossip daemon
/// only ever sees the set it's handed, never discovers peers itself.
pub trait PeerSetSnapshot: Send + Sync + 'static {
    fn current_peers(&self) -> Vec<PeerId>;
}

impl PeerSetSnapshot for tokio::sync::watch::Receiver<Vec<PeerId>> {
    fn current_peers(&self) -> Vec<PeerId> {
        self.borrow().clone()
    }
}
