use std::collections::BTreeMap;
use std::sync::Arc;

use bincode::{Decode, Encode};
use gossipd_rumor_core::peer::PeerId;

/// One unit of data carried by a `PeerRumor` into the consensus layer,
/// keyed externally by its origin's per-peer `ordinal`.
///
/// `is_trigger` marks an event whose arrival should wake the consensus
/// manager's event-trigger path immediately, rather than waiting for the
/// next time trigger.
#[derive(Debug, Clone, Encode, Decode)]
pub struct Event {
    pub is_trigger: bool,
    pub payload: Arc<[u8]>,
}

/// Per-peer cursor into each origin's event ordinal stream: the highest
/// ordinal a peer has promised to include in its next declared bound.
pub type Bound = BTreeMap<PeerId, u64>;

/// Computes the pointwise maximum of a set of per-peer bounds, as used for
/// both a round's `upper_bound` (max across facilitators' declared bounds)
/// and the consensus storage's global "known bound".
pub fn merge_bounds(bounds: impl IntoIterator<Item = Bound>) -> Bound {
    let mut merged = Bound::new();
    for bound in bounds {
        for (peer, ordinal) in bound {
            merged
                .entry(peer)
                .and_modify(|existing| *existing = (*existing).max(ordinal))
                .or_insert(ordinal);
        }
    }
    merged
}

/// Buffered, not-yet-consumed events per origin peer, keyed by ordinal so
/// `pull_events` can cut a prefix deterministically.
#[derive(Debug, Clone, Default)]
pub struct PeerEventBuffer(BTreeMap<PeerId, BTreeMap<u64, Event>>);

impl PeerEventBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, peer: PeerId, ordinal: u64, event: Event) {
        self.0.entry(peer).or_default().insert(ordinal, event);
    }

    pub fn contains_trigger_event(&self) -> bool {
        self.0
            .values()
            .any(|per_peer| per_peer.values().any(|event| event.is_trigger))
    }

    /// The bound implied by the highest ordinal currently buffered per peer.
    pub fn current_bound(&self) -> Bound {
        self.0
            .iter()
            .filter_map(|(peer, events)| events.keys().next_back().map(|ordinal| (*peer, *ordinal)))
            .collect()
    }

    /// Removes and returns every buffered `(ordinal, Event)` with
    /// `ordinal <= bound[peer]`, per peer.
    pub fn pull(&mut self, bound: &Bound) -> BTreeMap<PeerId, Vec<(u64, Event)>> {
        let mut pulled = BTreeMap::new();
        for (peer, max_ordinal) in bound {
            let Some(events) = self.0.get_mut(peer) else {
                continue;
            };
            let remaining = events.split_off(&(max_ordinal + 1));
            let drained = std::mem::replace(events, remaining);
            if !drained.is_empty() {
                pulled.insert(*peer, drained.into_iter().collect());
            }
        }
        pulled
    }

    /// Re-inserts events a consensus function did not consume from a prior
    /// `pull`.
    pub fn readd(&mut self, events: BTreeMap<PeerId, Vec<(u64, Event)>>) {
        for (peer, per_peer) in events {
            for (ordinal, event) in per_peer {
                self.insert(peer, ordinal, event);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use gossipd_rumor_core::peer::{PeerId, PeerSeckey};

    use super::*;

    fn event(marker: u8) -> Event {
        Event {
            is_trigger: false,
            payload: vec![marker].into(),
        }
    }

    #[test]
    fn pull_then_readd_restores_exact_suffix() {
        let peer = PeerId::from_pubkey(PeerSeckey::generate().pubkey());
        let mut buffer = PeerEventBuffer::new();
        for ordinal in 0..5u64 {
            buffer.insert(peer, ordinal, event(ordinal as u8));
        }

        let bound = Bound::from([(peer, 2)]);
        let pulled = buffer.pull(&bound);
        assert_eq!(
            pulled.get(&peer).map(|v| v.iter().map(|(o, _)| *o).collect::<Vec<_>>()),
            Some(vec![0, 1, 2])
        );

        let remaining_bound = buffer.current_bound();
        assert_eq!(remaining_bound.get(&peer), Some(&4));

        let not_consumed: BTreeMap<_, _> = pulled
            .into_iter()
            .map(|(p, events)| (p, events.into_iter().filter(|(o, _)| *o != 1).collect()))
            .collect();
        buffer.readd(not_consumed);

        let all_bound = buffer.current_bound();
        assert_eq!(all_bound.get(&peer), Some(&4));
    }

    #[test]
    fn contains_trigger_event_reflects_any_marked_event() {
        let peer = PeerId::from_pubkey(PeerSeckey::generate().pubkey());
        let mut buffer = PeerEventBuffer::new();
        assert!(!buffer.contains_trigger_event());

        buffer.insert(
            peer,
            0,
            Event {
                is_trigger: true,
                payload: vec![].into(),
            },
        );
        assert!(buffer.contains_trigger_event());
    }
}
