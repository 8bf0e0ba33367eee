use bincode::Encode;
use gossipd_rumor_core::hash::{Hash, Hashable};
use gossipd_rumor_core::signed::Signable;

/// Wraps a majority hash so it can go through the same sign/verify path as
/// any other [`Signable`] value, domain-separated from every other signed
/// payload in the system by its own `TAG`.
///
/// Facilitators sign the *selected majority hash*, not the artifact bytes
/// themselves, so a facilitator that never received the winning artifact can
/// still contribute its signature once the hash is known.
#[derive(Encode, Clone, Copy)]
pub struct MajorityHash(pub Hash);

impl Hashable for MajorityHash {}

impl Signable for MajorityHash {
    const TAG: [u8; 4] = *b"msig";
}
