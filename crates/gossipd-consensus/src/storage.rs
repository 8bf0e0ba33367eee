use std::collections::BTreeMap;
use std::hash::Hash as StdHash;
use std::sync::Mutex;

use dashmap::DashMap;
use gossipd_consensus_core::event::{Bound, Event, PeerEventBuffer};
use gossipd_consensus_core::key::Successor;
use gossipd_consensus_core::resources::{ConsensusResources, PeerDeclaration};
use gossipd_consensus_core::state::ConsensusState;
use gossipd_consensus_core::timestamp::Timestamp;
use gossipd_rumor_core::peer::PeerId;
use gossipd_rumor_core::signed::Signed;

/// Keyed registry of consensus round state, with fine-grained per-key
/// conditional updates.
///
/// Per-key exclusivity is provided by [`dashmap`]'s sharded locking: two
/// calls touching the same key observe serialized reads/writes, two calls
/// on different keys run concurrently.
pub struct ConsensusStorage<Key, Artifact> {
    states: DashMap<Key, Option<ConsensusState<Key, Artifact>>>,
    resources: DashMap<Key, ConsensusResources<Artifact>>,
    event_buffer: Mutex<PeerEventBuffer>,
    time_trigger: Mutex<Option<Timestamp>>,
    own_registration: Mutex<Option<Key>>,
    peer_registrations: DashMap<PeerId, Key>,
    last_key_and_artifact: Mutex<Option<(Key, Option<Signed<Artifact>>)>>,
    deregistrations: DashMap<PeerId, Key>,
}

impl<Key, Artifact> Default for ConsensusStorage<Key, Artifact>
where
    Key: Successor + Ord + Clone + StdHash + Eq,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<Key, Artifact> ConsensusStorage<Key, Artifact>
where
    Key: Successor + Ord + Clone + StdHash + Eq,
{
    pub fn new() -> Self {
        Self {
            states: DashMap::new(),
            resources: DashMap::new(),
            event_buffer: Mutex::new(PeerEventBuffer::new()),
            time_trigger: Mutex::new(None),
            own_registration: Mutex::new(None),
            peer_registrations: DashMap::new(),
            last_key_and_artifact: Mutex::new(None),
            deregistrations: DashMap::new(),
        }
    }

    /// Atomic compare-modify on the per-key state slot. `f` sees the
    /// current state (`None` if the key has never been touched) and, if it
    /// wants to transition, returns the new state plus a caller-derived
    /// result; `f` returning `None` leaves the slot untouched and the call
    /// returns `None`.
    pub fn cond_modify_state<R>(
        &self,
        key: Key,
        f: impl FnOnce(Option<&ConsensusState<Key, Artifact>>) -> Option<(ConsensusState<Key, Artifact>, R)>,
    ) -> Option<R> {
        let mut entry = self.states.entry(key).or_insert(None);
        match f(entry.as_ref()) {
            Some((new_state, result)) => {
                *entry = Some(new_state);
                Some(result)
            }
            None => None,
        }
    }

    /// Resources aggregated so far for `key`; never fails, an untouched key
    /// reads back as empty.
    pub fn get_resources(&self, key: Key) -> ConsensusResources<Artifact>
    where
        Artifact: Clone,
    {
        self.resources.get(&key).map(|r| r.clone()).unwrap_or_default()
    }

    /// Monotonically fills in `fragment`'s set fields for `(key, peer)`;
    /// fields already set are left untouched (first writer wins per field).
    pub fn add_peer_declaration(&self, key: Key, peer: PeerId, fragment: PeerDeclaration) {
        self.resources
            .entry(key)
            .or_default()
            .peer_declarations
            .entry(peer)
            .or_default()
            .fill_from(&fragment);
    }

    /// Records a candidate artifact under its hash; does not overwrite an
    /// existing entry for the same hash (artifacts are content-addressed).
    pub fn add_artifact(&self, key: Key, hash: gossipd_rumor_core::hash::Hash, artifact: Artifact) {
        self.resources
            .entry(key)
            .or_default()
            .artifacts
            .entry(hash)
            .or_insert(artifact);
    }

    /// Removes and returns every buffered `(ordinal, Event)` with
    /// `ordinal <= bound[peer]`, per peer.
    pub fn pull_events(&self, bound: &Bound) -> BTreeMap<PeerId, Vec<(u64, Event)>> {
        self.event_buffer.lock().expect("poisoned").pull(bound)
    }

    /// Re-buffers events a consensus function did not consume.
    pub fn add_events(&self, events: BTreeMap<PeerId, Vec<(u64, Event)>>) {
        self.event_buffer.lock().expect("poisoned").readd(events);
    }

    /// The pointwise-maximum bound implied by everything currently
    /// buffered.
    pub fn get_upper_bound(&self) -> Bound {
        self.event_buffer.lock().expect("poisoned").current_bound()
    }

    pub fn contains_trigger_event(&self) -> bool {
        self.event_buffer.lock().expect("poisoned").contains_trigger_event()
    }

    pub fn get_last_key_and_artifact(&self) -> Option<(Key, Option<Signed<Artifact>>)>
    where
        Artifact: Clone,
    {
        self.last_key_and_artifact.lock().expect("poisoned").clone()
    }

    /// CAS-like advance of the "previous finalized epoch" pointer: succeeds
    /// only if the caller's view of the current last key matches, then
    /// evicts all per-key state and resources at or before the superseded
    /// key.
    pub fn try_update_last_key_and_artifact_with_cleanup(
        &self,
        expected_last: Option<Key>,
        new_last: Key,
        new_artifact: Option<Signed<Artifact>>,
    ) -> bool {
        let mut guard = self.last_key_and_artifact.lock().expect("poisoned");
        let current_key = guard.as_ref().map(|(k, _)| k.clone());
        if current_key != expected_last {
            return false;
        }
        *guard = Some((new_last, new_artifact));
        drop(guard);

        if let Some(expected) = expected_last {
            self.states.retain(|key, _| *key > expected);
            self.resources.retain(|key, _| *key > expected);
        }
        true
    }

    pub fn set_time_trigger(&self, at: Option<Timestamp>) {
        *self.time_trigger.lock().expect("poisoned") = at;
    }

    pub fn get_time_trigger(&self) -> Option<Timestamp> {
        *self.time_trigger.lock().expect("poisoned")
    }

    /// Records a remote peer's declared `own_registration`; monotonic, a
    /// regressing key is rejected.
    pub fn register_peer(&self, peer: PeerId, key: Key) -> bool {
        match self.peer_registrations.entry(peer) {
            dashmap::mapref::entry::Entry::Occupied(mut occupied) => {
                if key >= *occupied.get() {
                    occupied.insert(key);
                    true
                } else {
                    false
                }
            }
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                vacant.insert(key);
                true
            }
        }
    }

    pub fn get_registered_peer(&self, peer: PeerId) -> Option<Key> {
        self.peer_registrations.get(&peer).map(|r| r.clone())
    }

    pub fn set_own_registration(&self, key: Key) {
        *self.own_registration.lock().expect("poisoned") = Some(key);
    }

    pub fn get_own_registration(&self) -> Option<Key> {
        self.own_registration.lock().expect("poisoned").clone()
    }

    /// Buffers one event a `PeerRumor` handler decoded for the consensus
    /// layer, under its origin's per-peer ordinal.
    pub fn add_event(&self, peer: PeerId, ordinal: u64, event: Event) {
        self.event_buffer.lock().expect("poisoned").insert(peer, ordinal, event);
    }

    /// Records that `peer` is leaving and should be excluded from
    /// facilitator selection at and after `key`; monotonic like
    /// [`Self::register_peer`].
    pub fn deregister_peer(&self, peer: PeerId, key: Key) {
        match self.deregistrations.entry(peer) {
            dashmap::mapref::entry::Entry::Occupied(mut occupied) => {
                if key > *occupied.get() {
                    occupied.insert(key);
                }
            }
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                vacant.insert(key);
            }
        }
    }

    /// The earliest key at and after which `peer` has declared it is
    /// leaving, if any.
    pub fn get_deregistration(&self, peer: PeerId) -> Option<Key> {
        self.deregistrations.get(&peer).map(|r| r.clone())
    }
}

#[cfg(test)]
mod tests {
    use gossipd_consensus_core::facilitator_set::FacilitatorSet;
    use gossipd_consensus_core::key::EpochKey;
    use gossipd_consensus_core::state::{ConsensusStatus, Trigger};

    use super::*;

    type TestStorage = ConsensusStorage<EpochKey, Vec<u8>>;

    #[test]
    fn cond_modify_state_is_none_until_f_transitions() {
        let storage = TestStorage::new();
        let key = EpochKey::from(1);

        let result = storage.cond_modify_state(key, |current| {
            assert!(current.is_none());
            None::<(ConsensusState<EpochKey, Vec<u8>>, ())>
        });
        assert!(result.is_none());

        let result = storage.cond_modify_state(key, |current| {
            assert!(current.is_none());
            Some((
                ConsensusState::new(
                    key,
                    (EpochKey::from(0), None),
                    FacilitatorSet::new(),
                    Trigger::TimeTrigger,
                ),
                "transitioned",
            ))
        });
        assert_eq!(result, Some("transitioned"));

        storage.cond_modify_state(key, |current| {
            assert!(matches!(current.unwrap().status, ConsensusStatus::Facilitated));
            None::<(ConsensusState<EpochKey, Vec<u8>>, ())>
        });
    }

    #[test]
    fn peer_registration_rejects_regression() {
        let storage = TestStorage::new();
        let peer = PeerId::from_pubkey(gossipd_rumor_core::peer::PeerSeckey::generate().pubkey());

        assert!(storage.register_peer(peer, EpochKey::from(5)));
        assert!(!storage.register_peer(peer, EpochKey::from(3)));
        assert!(storage.register_peer(peer, EpochKey::from(5)));
        assert_eq!(storage.get_registered_peer(peer), Some(EpochKey::from(5)));
    }

    #[test]
    fn cleanup_evicts_state_at_or_before_superseded_key() {
        let storage = TestStorage::new();
        storage.add_artifact(EpochKey::from(1), gossipd_rumor_core::hash::Hash::default(), vec![]);
        storage.add_artifact(EpochKey::from(2), gossipd_rumor_core::hash::Hash::default(), vec![]);

        assert!(storage.try_update_last_key_and_artifact_with_cleanup(None, EpochKey::from(1), None));
        assert!(!storage.get_resources(EpochKey::from(1)).artifacts.is_empty());
        assert!(!storage.get_resources(EpochKey::from(2)).artifacts.is_empty());

        assert!(storage.try_update_last_key_and_artifact_with_cleanup(
            Some(EpochKey::from(1)),
            EpochKey::from(2),
            None
        ));
        assert!(storage.get_resources(EpochKey::from(1)).artifacts.is_empty());
        assert!(!storage.get_resources(EpochKey::from(2)).artifacts.is_empty());
    }
}
