use gossipd::Gossipd;
use gossipd_util_error::WhateverResult;

#[tokio::main]
#[snafu::report]
async fn main() -> WhateverResult<()> {
    // An embedder with a real transport and `ConsensusFunctions` calls
    // `Gossipd::builder()` itself with those wired in; this binary has
    // none of its own to offer, so `run` against bare defaults only ever
    // reaches `gen-secret` meaningfully — `run` will hang forever on
    // `std::future::pending` once past `GenSecret`, which is the point: it
    // proves the wiring, not a deployable node.
    Gossipd::builder()
        .gossip_transport(std::sync::Arc::new(NoopTransport))
        .peer_set(tokio::sync::watch::channel(Vec::new()).1)
        .consensus_fns(std::sync::Arc::new(NoopConsensusFunctions))
        .registration_transport(std::sync::Arc::new(NoopRegistrationTransport))
        .cluster(std::sync::Arc::new(NoopCluster))
        .run()
        .await?;
    Ok(())
}

struct NoopTransport;

#[async_trait::async_trait]
impl gossipd_gossip::transport::GossipTransport for NoopTransport {
    async fn start_round(
        &self,
        _peer: gossipd_rumor_core::peer::PeerId,
        _req: gossipd_gossip::messages::StartGossipRoundRequest,
    ) -> WhateverResult<gossipd_gossip::messages::StartGossipRoundResponse> {
        snafu::whatever!("no transport wired into this binary");
    }

    async fn end_round(
        &self,
        _peer: gossipd_rumor_core::peer::PeerId,
        _req: gossipd_gossip::messages::EndGossipRoundRequest,
    ) -> WhateverResult<gossipd_gossip::messages::EndGossipRoundResponse> {
        snafu::whatever!("no transport wired into this binary");
    }
}

struct NoopConsensusFunctions;

impl gossipd_consensus_core::functions::ConsensusFunctions<gossipd_consensus_core::key::EpochKey, gossipd::Artifact>
    for NoopConsensusFunctions
{
    fn create_proposal_artifact(
        &self,
        _last_key_and_artifact: Option<&(gossipd_consensus_core::key::EpochKey, gossipd_rumor_core::signed::Signed<gossipd::Artifact>)>,
        _events: &std::collections::BTreeMap<gossipd_rumor_core::peer::PeerId, Vec<(u64, gossipd_consensus_core::event::Event)>>,
    ) -> (gossipd::Artifact, std::collections::BTreeMap<gossipd_rumor_core::peer::PeerId, Vec<u64>>) {
        (Vec::new(), std::collections::BTreeMap::new())
    }

    fn consume_signed_majority_artifact(
        &self,
        _key: &gossipd_consensus_core::key::EpochKey,
        _signed: &gossipd_rumor_core::signed::Signed<gossipd::Artifact>,
    ) {
    }
}

struct NoopRegistrationTransport;

#[async_trait::async_trait]
impl gossipd_consensus::transport::RegistrationTransport<gossipd_consensus_core::key::EpochKey> for NoopRegistrationTransport {
    async fn exchange_registration(
        &self,
        _peer: gossipd_rumor_core::peer::PeerId,
        _req: gossipd_consensus_core::msg::RegistrationExchangeRequest<gossipd_consensus_core::key::EpochKey>,
    ) -> WhateverResult<gossipd_consensus_core::msg::RegistrationExchangeResponse<gossipd_consensus_core::key::EpochKey>> {
        snafu::whatever!("no registration transport wired into this binary");
    }
}

struct NoopCluster;

impl gossipd_consensus::transport::ClusterView<gossipd_consensus_core::key::EpochKey> for NoopCluster {
    fn own_state(&self) -> gossipd_consensus::transport::PeerLifecycleState {
        gossipd_consensus::transport::PeerLifecycleState::Observing
    }

    fn ready_peer_ids(&self) -> Vec<gossipd_rumor_core::peer::PeerId> {
        Vec::new()
    }

    fn is_responsive(&self, _peer: gossipd_rumor_core::peer::PeerId) -> bool {
        false
    }

    fn advance_self_to_ready(&self) {}

    fn pubkey_of(&self, _peer: gossipd_rumor_core::peer::PeerId) -> Option<gossipd_rumor_core::peer::PeerPubkey> {
        None
    }
}
