use std::cmp::Ordering;
use std::sync::Arc;

use bincode::{Decode, Encode};
use gossipd_util_array_type::{
    array_type_define, array_type_impl_debug_as_display, array_type_impl_zero_default,
};

use crate::hash::{Hash, Hashable};
use crate::peer::PeerId;
use crate::signed::{Signable, Signed};

array_type_define! {
    /// 4-byte tag identifying the payload encoding of a rumor, analogous to
    /// the `TAG` domain separator on [`Signable`] types. Unlike `TAG`, this
    /// tag travels on the wire (it's how a receiver picks a [`RumorHandler`]
    /// without decoding the payload first).
    ///
    /// [`RumorHandler`]: crate::handler::RumorHandler
    #[derive(Encode, Decode, Copy, Clone, Hash)]
    pub struct ContentTypeTag[4];
}
array_type_impl_zero_default!(ContentTypeTag);
array_type_impl_debug_as_display!(ContentTypeTag);

impl std::fmt::Display for ContentTypeTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match std::str::from_utf8(self.as_slice()) {
            Ok(s) if s.chars().all(|c| c.is_ascii_graphic()) => f.write_str(s),
            _ => write!(f, "{:?}", self.as_slice()),
        }
    }
}

impl ContentTypeTag {
    pub const fn new(tag: [u8; 4]) -> Self {
        Self::from_bytes(tag)
    }

    pub const CONSENSUS_FACILITY: Self = Self::new(*b"cfac");
    pub const CONSENSUS_PROPOSAL: Self = Self::new(*b"cprp");
    pub const MAJORITY_SIGNATURE: Self = Self::new(*b"msig");
    pub const DEREGISTRATION: Self = Self::new(*b"dreg");
    pub const CONSENSUS_ARTIFACT: Self = Self::new(*b"cart");
    /// Distinct from `CONSENSUS_ARTIFACT` so a handler can tell a candidate
    /// (unsigned `Artifact`) apart from the round's final `Signed<Artifact>`
    /// without first decoding the payload.
    pub const CONSENSUS_FINAL_ARTIFACT: Self = Self::new(*b"cfin");
    pub const HEALTHCHECK_PROPOSAL: Self = Self::new(*b"hchk");
}

/// A rumor signed by its own originating peer; carries an `ordinal` so a
/// single origin's stream of rumors can be totally ordered and deduplicated
/// per-peer (see [`gossipd_consensus_core::event::PeerEventBuffer`]).
#[derive(Encode, Decode, Clone, Debug, PartialEq, Eq)]
pub struct PeerRumor {
    pub origin: PeerId,
    pub ordinal: u64,
    pub content_type_tag: ContentTypeTag,
    pub payload: Arc<[u8]>,
}

/// A rumor with no origin constraint beyond an optional whitelist.
#[derive(Encode, Decode, Clone, Debug, PartialEq, Eq)]
pub struct CommonRumor {
    pub content_type_tag: ContentTypeTag,
    pub payload: Arc<[u8]>,
}

#[derive(Encode, Decode, Clone, Debug, PartialEq, Eq)]
pub enum Rumor {
    Peer(PeerRumor),
    Common(CommonRumor),
}

impl Rumor {
    pub fn origin(&self) -> Option<PeerId> {
        match self {
            Rumor::Peer(p) => Some(p.origin),
            Rumor::Common(_) => None,
        }
    }

    pub fn ordinal(&self) -> Option<u64> {
        match self {
            Rumor::Peer(p) => Some(p.ordinal),
            Rumor::Common(_) => None,
        }
    }

    pub fn content_type_tag(&self) -> ContentTypeTag {
        match self {
            Rumor::Peer(p) => p.content_type_tag,
            Rumor::Common(c) => c.content_type_tag,
        }
    }

    pub fn payload(&self) -> &[u8] {
        match self {
            Rumor::Peer(p) => &p.payload,
            Rumor::Common(c) => &c.payload,
        }
    }
}

impl Hashable for Rumor {}
impl Signable for Rumor {
    const TAG: [u8; 4] = *b"rumr";
}

/// Canonical total order for deterministic gossip replay: `(origin?,
/// ordinal?, hash)`, so two nodes that apply the same batch always dispatch
/// handlers in the same order.
///
/// `Rumor::Common` (no origin/ordinal) sorts after all `Rumor::Peer` entries
/// with the same tie-break continuing on hash alone.
pub fn canonical_rumor_order(a: &(Hash, Signed<Rumor>), b: &(Hash, Signed<Rumor>)) -> Ordering {
    let (hash_a, signed_a) = a;
    let (hash_b, signed_b) = b;

    signed_a
        .value
        .origin()
        .cmp(&signed_b.value.origin())
        .then_with(|| signed_a.value.ordinal().cmp(&signed_b.value.ordinal()))
        .then_with(|| hash_a.cmp(hash_b))
}

/// Ordered sequence of `(Hash, Signed<Rumor>)` pairs.
///
/// Ordering is preserved for deterministic replay, but membership is set
/// semantics: [`RumorStorage`] de-duplicates by hash.
///
/// [`RumorStorage`]: gossipd_gossip::storage::RumorStorage
#[derive(Encode, Decode, Clone, Debug, Default)]
pub struct RumorBatch(pub Vec<(Hash, Signed<Rumor>)>);

impl RumorBatch {
    pub fn new(items: Vec<(Hash, Signed<Rumor>)>) -> Self {
        Self(items)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn into_inner(self) -> Vec<(Hash, Signed<Rumor>)> {
        self.0
    }

    pub fn sort_canonical(&mut self) {
        self.0.sort_by(canonical_rumor_order);
    }
}

impl IntoIterator for RumorBatch {
    type Item = (Hash, Signed<Rumor>);
    type IntoIter = std::vec::IntoIter<(Hash, Signed<Rumor>)>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl FromIterator<(Hash, Signed<Rumor>)> for RumorBatch {
    fn from_iter<I: IntoIterator<Item = (Hash, Signed<Rumor>)>>(iter: I) -> Self {
        Self(Vec::from_iter(iter))
    }
}
