//! End-to-end epoch consensus across a small in-process cluster, wired
//! through direct manager-to-manager dispatch rather than a real gossip
//! daemon (mirrors `gossipd-gossip`'s own `tests/convergence.rs` loopback
//! style, one layer up the stack).

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use bincode::{Decode, Encode};
use gossipd_consensus::manager::{ConsensusManager, ConsensusManagerConfig};
use gossipd_consensus::storage::ConsensusStorage;
use gossipd_consensus::transport::{ClusterView, ConsensusGossipSink, PeerLifecycleState, RegistrationTransport};
use gossipd_consensus_core::event::Event;
use gossipd_consensus_core::functions::ConsensusFunctions;
use gossipd_consensus_core::key::EpochKey;
use gossipd_consensus_core::msg::{RegistrationExchangeRequest, RegistrationExchangeResponse};
use gossipd_rumor_core::hash::Hashable;
use gossipd_rumor_core::peer::{PeerId, PeerPubkey, PeerSeckey};
use gossipd_rumor_core::rumor::{CommonRumor, ContentTypeTag, PeerRumor, Rumor};
use gossipd_rumor_core::signed::Signed;
use gossipd_util_error::WhateverResult;

/// A trivially content-addressable artifact: the concatenation, in peer
/// order, of every buffered event payload pulled for the round. Lets tests
/// assert on consensus outcomes without a real ledger/block type — block
/// application logic is only ever reachable through `ConsensusFunctions`.
#[derive(Debug, Clone, Encode, Decode, PartialEq, Eq)]
struct TestArtifact(Vec<u8>);

impl Hashable for TestArtifact {}

struct ConcatEvents;

impl ConsensusFunctions<EpochKey, TestArtifact> for ConcatEvents {
    fn create_proposal_artifact(
        &self,
        _last_key_and_artifact: Option<&(EpochKey, Signed<TestArtifact>)>,
        events: &BTreeMap<PeerId, Vec<(u64, Event)>>,
    ) -> (TestArtifact, BTreeMap<PeerId, Vec<u64>>) {
        let mut bytes = Vec::new();
        let mut consumed = BTreeMap::new();
        for (peer, per_peer) in events {
            for (_, event) in per_peer {
                bytes.extend_from_slice(&event.payload);
            }
            consumed.insert(*peer, per_peer.iter().map(|(ordinal, _)| *ordinal).collect());
        }
        (TestArtifact(bytes), consumed)
    }

    fn consume_signed_majority_artifact(&self, _key: &EpochKey, _signed: &Signed<TestArtifact>) {}
}

type Manager = ConsensusManager<EpochKey, TestArtifact>;

/// Dispatches an emitted effect straight into every other manager's
/// `on_*_rumor` callback, the way [`gossipd_consensus::handler::ConsensusRumorHandler`]
/// would after a real gossip daemon delivered it — skipping the daemon
/// itself since wiring `gossipd-gossip` end to end is already covered by
/// that crate's own `tests/convergence.rs`.
struct LoopbackSink {
    self_id: PeerId,
    ordinal: AtomicU64,
    managers: Arc<OnceLock<BTreeMap<PeerId, Arc<Manager>>>>,
}

impl ConsensusGossipSink for LoopbackSink {
    fn emit_peer_rumor(&self, content_type_tag: ContentTypeTag, payload: Vec<u8>) {
        let ordinal = self.ordinal.fetch_add(1, Ordering::SeqCst);
        let rumor = Rumor::Peer(PeerRumor {
            origin: self.self_id,
            ordinal,
            content_type_tag,
            payload: payload.into(),
        });
        self.dispatch(content_type_tag, &rumor);
    }

    fn emit_common_rumor(&self, content_type_tag: ContentTypeTag, payload: Vec<u8>) {
        let rumor = Rumor::Common(CommonRumor { content_type_tag, payload: payload.into() });
        self.dispatch(content_type_tag, &rumor);
    }
}

impl LoopbackSink {
    fn dispatch(&self, tag: ContentTypeTag, rumor: &Rumor) {
        let managers = self.managers.get().expect("cluster wired before use");
        for (peer, manager) in managers {
            if *peer == self.self_id {
                // We already recorded our own contribution synchronously
                // when the effect was produced; re-delivering it to
                // ourselves would be harmless (first-writer-wins) but a
                // real gossip daemon never dispatches our own rumors back
                // to us, so the loopback doesn't either.
                continue;
            }
            match tag {
                ContentTypeTag::CONSENSUS_FACILITY => {
                    manager.on_facility_rumor(rumor);
                }
                ContentTypeTag::CONSENSUS_PROPOSAL => {
                    manager.on_proposal_rumor(rumor);
                }
                ContentTypeTag::MAJORITY_SIGNATURE => {
                    manager.on_signature_rumor(rumor);
                }
                ContentTypeTag::DEREGISTRATION => {
                    manager.on_deregistration_rumor(rumor);
                }
                ContentTypeTag::CONSENSUS_ARTIFACT => {
                    manager.on_artifact_rumor(rumor);
                }
                ContentTypeTag::CONSENSUS_FINAL_ARTIFACT => {
                    manager.on_final_artifact_rumor(rumor);
                }
                other => panic!("unexpected content type tag in consensus loopback: {other}"),
            };
        }
    }
}

/// No peer ever needs registration-exchange retried in these tests: every
/// peer's registration is seeded directly on `ConsensusStorage` during
/// setup instead, so this transport is never actually called.
struct UnusedRegistrationTransport;

#[async_trait]
impl RegistrationTransport<EpochKey> for UnusedRegistrationTransport {
    async fn exchange_registration(
        &self,
        _peer: PeerId,
        _req: RegistrationExchangeRequest<EpochKey>,
    ) -> WhateverResult<RegistrationExchangeResponse<EpochKey>> {
        panic!("registration exchange should not be triggered in this test setup");
    }
}

struct StaticCluster {
    ready_peers: Vec<PeerId>,
    pubkeys: BTreeMap<PeerId, PeerPubkey>,
    own_state: Mutex<PeerLifecycleState>,
}

impl ClusterView<EpochKey> for StaticCluster {
    fn own_state(&self) -> PeerLifecycleState {
        *self.own_state.lock().expect("poisoned")
    }

    fn ready_peer_ids(&self) -> Vec<PeerId> {
        self.ready_peers.clone()
    }

    fn is_responsive(&self, _peer: PeerId) -> bool {
        true
    }

    fn advance_self_to_ready(&self) {
        *self.own_state.lock().expect("poisoned") = PeerLifecycleState::Ready;
    }

    fn pubkey_of(&self, peer: PeerId) -> Option<PeerPubkey> {
        self.pubkeys.get(&peer).copied()
    }
}

struct Node {
    id: PeerId,
    manager: Arc<Manager>,
    storage: Arc<ConsensusStorage<EpochKey, TestArtifact>>,
}

fn fast_config() -> ConsensusManagerConfig {
    ConsensusManagerConfig { time_trigger_interval: Duration::from_millis(15) }
}

fn build_cluster(n: usize) -> (Vec<Node>, Vec<PeerSeckey>) {
    let mut seckeys: Vec<PeerSeckey> = (0..n).map(|_| PeerSeckey::generate()).collect();
    seckeys.sort_unstable_by_key(|s| s.pubkey());
    let ids: Vec<PeerId> = seckeys.iter().map(|s| PeerId::from_pubkey(s.pubkey())).collect();
    let pubkeys: BTreeMap<PeerId, PeerPubkey> = ids.iter().zip(&seckeys).map(|(id, s)| (*id, s.pubkey())).collect();

    let managers_cell: Arc<OnceLock<BTreeMap<PeerId, Arc<Manager>>>> = Arc::new(OnceLock::new());

    let nodes: Vec<Node> = ids
        .iter()
        .zip(&seckeys)
        .map(|(&id, &seckey)| {
            let storage = Arc::new(ConsensusStorage::new());
            let cluster = Arc::new(StaticCluster {
                ready_peers: ids.iter().copied().filter(|p| *p != id).collect(),
                pubkeys: pubkeys.clone(),
                own_state: Mutex::new(PeerLifecycleState::Ready),
            });
            let sink = Arc::new(LoopbackSink {
                self_id: id,
                ordinal: AtomicU64::new(0),
                managers: managers_cell.clone(),
            });
            let manager = ConsensusManager::new(
                id,
                seckey,
                storage.clone(),
                Arc::new(ConcatEvents),
                sink,
                Arc::new(UnusedRegistrationTransport),
                cluster,
                None,
                fast_config(),
            );
            Node { id, manager, storage }
        })
        .collect();

    managers_cell
        .set(nodes.iter().map(|n| (n.id, n.manager.clone())).collect())
        .map_err(|_| ())
        .expect("set once");

    // Every node registers every other node at epoch 1 up front, standing
    // in for a completed registration-exchange handshake so the test can
    // focus on the round-advancement ladder.
    for node in &nodes {
        for &other in &ids {
            if other != node.id {
                node.storage.register_peer(other, EpochKey::from(1));
            }
        }
    }

    (nodes, seckeys)
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn three_facilitators_converge_on_one_finished_round() {
    let (nodes, _seckeys) = build_cluster(3);

    for node in &nodes {
        node.manager.start_facilitating_after(EpochKey::from(0), None).await;
    }

    let target = EpochKey::from(1);
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if nodes.iter().all(|n| {
                n.storage
                    .get_last_key_and_artifact()
                    .is_some_and(|(key, artifact)| key == target && artifact.is_some())
            }) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("all three facilitators should reach Finished on the same key");

    let finished: Vec<_> = nodes
        .iter()
        .map(|n| n.storage.get_last_key_and_artifact().expect("finished").1.expect("signed"))
        .collect();

    // Every facilitator assembled the same signed artifact: same value,
    // same number of proofs (one per facilitator), in facilitator-sorted
    // order.
    for signed in &finished[1..] {
        assert_eq!(signed.value, finished[0].value);
        assert_eq!(signed.proofs.len(), 3);
        assert_eq!(
            signed.proofs.iter().map(|p| p.signer_id()).collect::<Vec<_>>(),
            finished[0].proofs.iter().map(|p| p.signer_id()).collect::<Vec<_>>()
        );
    }
    let mut signer_ids: Vec<_> = finished[0].proofs.iter().map(|p| p.signer_id()).collect();
    let sorted = {
        let mut s = signer_ids.clone();
        s.sort_unstable();
        s
    };
    assert_eq!(signer_ids, sorted, "facilitator signatures must be in sorted PeerId order");
    signer_ids.dedup();
    assert_eq!(signer_ids.len(), 3);
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn single_facilitator_finishes_through_every_status_in_one_tick() {
    let (nodes, _seckeys) = build_cluster(1);
    let node = &nodes[0];

    node.manager.start_facilitating_after(EpochKey::from(0), None).await;

    tokio::time::timeout(Duration::from_secs(1), async {
        loop {
            if node.storage.get_last_key_and_artifact().is_some_and(|(k, a)| k == EpochKey::from(1) && a.is_some()) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("lone facilitator should finish the round by itself");

    let (key, artifact) = node.storage.get_last_key_and_artifact().expect("finished");
    assert_eq!(key, EpochKey::from(1));
    assert_eq!(artifact.expect("signed").proofs.len(), 1);
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn events_ingested_before_facilitation_are_reflected_in_the_artifact() {
    let (nodes, _seckeys) = build_cluster(1);
    let node = &nodes[0];

    node.manager.ingest_event(
        node.id,
        0,
        Event { is_trigger: false, payload: Arc::from(b"hello".as_slice()) },
    );

    node.manager.start_facilitating_after(EpochKey::from(0), None).await;

    tokio::time::timeout(Duration::from_secs(1), async {
        loop {
            if node.storage.get_last_key_and_artifact().is_some_and(|(k, a)| k == EpochKey::from(1) && a.is_some()) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("facilitation should pick up the already-buffered event");

    let (_, artifact) = node.storage.get_last_key_and_artifact().expect("finished");
    assert_eq!(artifact.expect("signed").value, TestArtifact(b"hello".to_vec()));
}

#[test]
fn deregistered_peer_is_excluded_from_facilitator_selection_at_and_after_its_key() {
    // Unit-level check of the storage-side bookkeeping a real
    // `Deregistration` rumor handler relies on: this exercises
    // `ConsensusStorage` directly rather than routing through a rumor, since
    // the decode/dispatch path is already covered in `gossipd-consensus`'s
    // own `manager.rs` tests.
    let storage: ConsensusStorage<EpochKey, TestArtifact> = ConsensusStorage::new();
    let peer = PeerId::from_pubkey(PeerSeckey::generate().pubkey());

    storage.register_peer(peer, EpochKey::from(1));
    storage.deregister_peer(peer, EpochKey::from(5));

    assert_eq!(storage.get_registered_peer(peer), Some(EpochKey::from(1)));
    assert_eq!(storage.get_deregistration(peer), Some(EpochKey::from(5)));
    assert!(EpochKey::from(5) >= storage.get_deregistration(peer).unwrap());
    assert!(EpochKey::from(4) < storage.get_deregistration(peer).unwrap());
}
