use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Instant;

use gossipd_rumor_core::hash::Hash;
use gossipd_rumor_core::rumor::{Rumor, RumorBatch};
use gossipd_rumor_core::signed::Signed;
use tracing::trace;

use crate::LOG_TARGET;
use crate::config::RumorStorageConfig;

/// Two-tier TTL store for validated rumors, keyed by content hash.
///
/// `active` hashes are offered to peers during gossip rounds; once a hash
/// ages out of `active` it moves to `seen`, where it's still tracked for
/// dedup purposes (a peer offering it again is not re-requested) but no
/// longer advertised. A hash is fully forgotten, along with its content in
/// `by_hash`, only once it ages out of `seen` too.
pub struct RumorStorage {
    inner: Mutex<Inner>,
    config: RumorStorageConfig,
}

struct Inner {
    active: BTreeMap<Hash, Instant>,
    seen: BTreeMap<Hash, Instant>,
    by_hash: BTreeMap<Hash, Signed<Rumor>>,
}

impl RumorStorage {
    pub fn new(config: RumorStorageConfig) -> Self {
        Self {
            inner: Mutex::new(Inner {
                active: BTreeMap::new(),
                seen: BTreeMap::new(),
                by_hash: BTreeMap::new(),
            }),
            config,
        }
    }

    /// Inserts rumors not already known (active or seen), returning the new
    /// subset in the same relative order as `batch`.
    pub fn add_rumors(&self, batch: RumorBatch) -> RumorBatch {
        let now = Instant::now();
        let mut inner = self.inner.lock().expect("lock poisoned");

        batch
            .into_iter()
            .filter(|(hash, signed)| {
                if inner.active.contains_key(hash) || inner.seen.contains_key(hash) {
                    false
                } else {
                    inner.active.insert(*hash, now);
                    inner.by_hash.insert(*hash, signed.clone());
                    true
                }
            })
            .collect()
    }

    /// Hashes currently offered to peers during gossip rounds.
    pub fn get_active_hashes(&self) -> Vec<Hash> {
        self.inner
            .lock()
            .expect("lock poisoned")
            .active
            .keys()
            .copied()
            .collect()
    }

    /// Every hash we know about, active or merely seen; used to decide which
    /// of a peer's offered hashes we still need.
    pub fn get_seen_hashes(&self) -> Vec<Hash> {
        let inner = self.inner.lock().expect("lock poisoned");
        inner
            .active
            .keys()
            .chain(inner.seen.keys())
            .copied()
            .collect()
    }

    /// Full content for the hashes we have, in the requested order; unknown
    /// hashes are silently dropped from the result.
    pub fn get_rumors(&self, hashes: &[Hash]) -> RumorBatch {
        let inner = self.inner.lock().expect("lock poisoned");
        hashes
            .iter()
            .filter_map(|hash| inner.by_hash.get(hash).map(|signed| (*hash, signed.clone())))
            .collect()
    }

    /// Ages `active` entries into `seen`, and forgets `seen` entries (and
    /// their content) past the seen retention window.
    pub fn sweep(&self, now: Instant) {
        let mut inner = self.inner.lock().expect("lock poisoned");

        let expired_active: Vec<Hash> = inner
            .active
            .iter()
            .filter(|(_, inserted_at)| now.duration_since(**inserted_at) >= self.config.active_retention)
            .map(|(hash, _)| *hash)
            .collect();
        for hash in expired_active {
            inner.active.remove(&hash);
            inner.seen.insert(hash, now);
        }

        let expired_seen: Vec<Hash> = inner
            .seen
            .iter()
            .filter(|(_, inserted_at)| now.duration_since(**inserted_at) >= self.config.seen_retention)
            .map(|(hash, _)| *hash)
            .collect();
        for hash in &expired_seen {
            inner.seen.remove(hash);
            inner.by_hash.remove(hash);
        }

        if !expired_seen.is_empty() {
            trace!(target: LOG_TARGET, count = expired_seen.len(), "Forgot expired rumors");
        }
    }
}

/// Runs [`RumorStorage::sweep`] on `config.sweep_interval` until the storage
/// is dropped (detected via the weak upgrade failing).
pub async fn run_sweeper(storage: std::sync::Weak<RumorStorage>, sweep_interval: std::time::Duration) {
    let mut interval = tokio::time::interval(sweep_interval);
    loop {
        interval.tick().await;
        let Some(storage) = storage.upgrade() else {
            return;
        };
        storage.sweep(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use gossipd_rumor_core::peer::PeerSeckey;
    use gossipd_rumor_core::rumor::{CommonRumor, ContentTypeTag};
    use gossipd_rumor_core::signed::Signable as _;

    use super::*;

    fn signed_common(payload: &[u8]) -> (Hash, Signed<Rumor>) {
        let rumor = Rumor::Common(CommonRumor {
            content_type_tag: ContentTypeTag::CONSENSUS_ARTIFACT,
            payload: payload.into(),
        });
        let hash = rumor.hash();
        let signed = Signed::new_signed_by_one(rumor, PeerSeckey::generate());
        (hash, signed)
    }

    #[test]
    fn add_rumors_deduplicates_and_preserves_order() {
        let storage = RumorStorage::new(RumorStorageConfig::default());
        let a = signed_common(b"a");
        let b = signed_common(b"b");

        let new = storage.add_rumors(RumorBatch::new(vec![a.clone(), b.clone()]));
        assert_eq!(new.len(), 2);

        let new_again = storage.add_rumors(RumorBatch::new(vec![a, b]));
        assert!(new_again.is_empty());
    }

    #[test]
    fn sweep_ages_active_into_seen_then_forgets() {
        let config = RumorStorageConfig {
            active_retention: Duration::from_millis(0),
            seen_retention: Duration::from_millis(0),
            sweep_interval: Duration::from_millis(1),
        };
        let storage = Arc::new(RumorStorage::new(config));
        let (hash, signed) = signed_common(b"x");
        storage.add_rumors(RumorBatch::new(vec![(hash, signed)]));

        assert_eq!(storage.get_active_hashes(), vec![hash]);

        storage.sweep(Instant::now() + Duration::from_millis(1));
        assert!(storage.get_active_hashes().is_empty());
        assert_eq!(storage.get_seen_hashes(), vec![hash]);

        storage.sweep(Instant::now() + Duration::from_millis(1));
        assert!(storage.get_seen_hashes().is_empty());
        assert!(storage.get_rumors(&[hash]).is_empty());
    }
}
