use gossipd_util_array_type::{
    array_type_define, array_type_impl_base32_str, array_type_impl_bytes_conv,
    array_type_impl_debug_as_display, array_type_impl_rand, array_type_impl_serde,
    array_type_impl_zero_default,
};
use bincode::{Decode, Encode};
use snafu::Snafu;

array_type_define! {
    /// Ed25519 public key identifying a peer's signing identity.
    #[derive(Encode, Decode, Clone, Copy, Hash)]
    pub struct PeerPubkey[32];
}
array_type_impl_zero_default!(PeerPubkey);
array_type_impl_base32_str!(PeerPubkey);
array_type_impl_serde!(PeerPubkey);
array_type_impl_debug_as_display!(PeerPubkey);
array_type_impl_rand!(PeerPubkey);

#[derive(Debug, Snafu)]
pub struct InvalidPubkeyError;

impl TryFrom<PeerPubkey> for ed25519_dalek::VerifyingKey {
    type Error = InvalidPubkeyError;

    fn try_from(value: PeerPubkey) -> Result<Self, Self::Error> {
        ed25519_dalek::VerifyingKey::from_bytes(&value.to_bytes()).map_err(|_| InvalidPubkeyError)
    }
}

array_type_define! {
    #[derive(Encode, Decode, Clone, Copy)]
    pub struct PeerSeckey[32];
}
array_type_impl_bytes_conv!(PeerSeckey);
array_type_impl_zero_default!(PeerSeckey);

impl PeerSeckey {
    pub fn generate() -> Self {
        Self::from(ed25519_dalek::SigningKey::generate(&mut rand::thread_rng()).to_bytes())
    }

    pub fn pubkey(self) -> PeerPubkey {
        PeerPubkey::from_bytes(
            ed25519_dalek::SigningKey::from(self)
                .verifying_key()
                .to_bytes(),
        )
    }
}

impl From<PeerSeckey> for ed25519_dalek::SigningKey {
    fn from(value: PeerSeckey) -> Self {
        ed25519_dalek::SigningKey::from_bytes(&value.to_bytes())
    }
}

array_type_define! {
    /// Opaque, totally-ordered identifier for a peer.
    ///
    /// Derived from a [`PeerPubkey`] via a 64-byte BLAKE3 extendable-output
    /// hash, rather than embedding the pubkey bytes directly, so the id stays
    /// a fixed 64 bytes independent of whatever signature scheme a future
    /// [`PeerPubkey`] variant might use.
    #[derive(Encode, Decode, Clone, Copy, Hash)]
    pub struct PeerId[64];
}
array_type_impl_zero_default!(PeerId);
array_type_impl_base32_str!(PeerId);
array_type_impl_serde!(PeerId);
array_type_impl_debug_as_display!(PeerId);

impl PeerId {
    pub fn from_pubkey(pubkey: PeerPubkey) -> Self {
        let mut xof = blake3::Hasher::new()
            .update(pubkey.as_slice())
            .finalize_xof();
        let mut out = [0u8; 64];
        xof.fill(&mut out);
        Self::from_bytes(out)
    }
}

#[test]
fn peer_id_is_deterministic_and_distinct() {
    let a = PeerSeckey::generate().pubkey();
    let b = PeerSeckey::generate().pubkey();

    assert_eq!(PeerId::from_pubkey(a), PeerId::from_pubkey(a));
    assert_ne!(PeerId::from_pubkey(a), PeerId::from_pubkey(b));
}
