use std::io::Write as _;

use bincode::{Decode, Encode};
use ed25519_dalek::ed25519::signature::SignerMut as _;
use gossipd_util_array_type::{
    array_type_define, array_type_impl_base32_str, array_type_impl_debug_as_display,
    array_type_impl_serde, array_type_impl_zero_default,
};
use snafu::{OptionExt as _, Snafu};

use crate::hash::Hashable;
use crate::peer::{PeerId, PeerPubkey, PeerSeckey};

array_type_define! {
    #[derive(Encode, Decode, Clone, Copy)]
    pub struct Signature[64];
}
array_type_impl_zero_default!(Signature);
array_type_impl_base32_str!(Signature);
array_type_impl_serde!(Signature);
array_type_impl_debug_as_display!(Signature);

impl From<Signature> for ed25519_dalek::Signature {
    fn from(value: Signature) -> Self {
        ed25519_dalek::Signature::from_bytes(&value.to_bytes())
    }
}
impl From<ed25519_dalek::Signature> for Signature {
    fn from(value: ed25519_dalek::Signature) -> Self {
        Self::from_bytes(value.to_bytes())
    }
}

#[derive(Debug, Snafu)]
pub struct InvalidSignatureError;
pub type InvalidSignatureResult<T> = Result<T, InvalidSignatureError>;

/// A value that can be signed/verified by a [`PeerPubkey`] identity.
///
/// `TAG` domain-separates the sign hash so a signature over one message
/// type can never be replayed as a valid signature over another.
pub trait Signable: Hashable {
    const TAG: [u8; 4];

    fn sign_hash(&self) -> blake3::Hash {
        let mut hasher = blake3::Hasher::new();
        hasher.write_all(b"gslp").expect("can't fail");
        hasher.write_all(&Self::TAG).expect("can't fail");
        hasher
            .write_all(self.hash().as_slice())
            .expect("can't fail");
        hasher.finalize()
    }

    fn sign_with(&self, seckey: PeerSeckey) -> Signature {
        ed25519_dalek::SigningKey::from(seckey)
            .sign(self.sign_hash().as_bytes())
            .into()
    }

    fn verify_signature(&self, pubkey: PeerPubkey, sig: Signature) -> InvalidSignatureResult<()> {
        verify_hash_signature(self.sign_hash(), pubkey, sig)
    }
}

fn verify_hash_signature(
    hash: blake3::Hash,
    pubkey: PeerPubkey,
    sig: Signature,
) -> InvalidSignatureResult<()> {
    let verifying_key =
        ed25519_dalek::VerifyingKey::try_from(pubkey).ok().context(InvalidSignatureSnafu)?;
    verifying_key
        .verify_strict(hash.as_bytes(), &sig.into())
        .ok()
        .context(InvalidSignatureSnafu)?;
    Ok(())
}

/// One signer's proof over a [`Signed`] value's content.
///
/// The proof carries the signer's full [`PeerPubkey`] (not just its
/// [`PeerId`]) because the [`PeerId`] is a one-way derivation of the
/// pubkey: verification needs the actual key, and [`SignatureProof::signer_id`]
/// recomputes the id for comparison against a rumor's declared origin or a
/// configured whitelist.
#[derive(Encode, Decode, Clone, Copy, Debug)]
pub struct SignatureProof {
    pub signer_pubkey: PeerPubkey,
    pub signature: Signature,
}

impl SignatureProof {
    pub fn signer_id(&self) -> PeerId {
        PeerId::from_pubkey(self.signer_pubkey)
    }
}

/// A value plus a non-empty list of signature proofs over it.
///
/// Validity (every proof verifies under its signer's key) is checked by
/// [`crate::validate::validate`], not by construction: a `Signed<T>`
/// received over the wire may be unvalidated, and that's the point of
/// having an explicit validation step.
#[derive(Encode, Decode, Clone, Debug)]
pub struct Signed<T> {
    pub value: T,
    pub proofs: Vec<SignatureProof>,
}

impl<T> Signed<T>
where
    T: Signable,
{
    pub fn new_signed_by_one(value: T, seckey: PeerSeckey) -> Self {
        let signature = value.sign_with(seckey);
        Self {
            value,
            proofs: vec![SignatureProof {
                signer_pubkey: seckey.pubkey(),
                signature,
            }],
        }
    }

    pub fn new_signed_by(value: T, seckeys: impl IntoIterator<Item = PeerSeckey>) -> Self {
        let proofs = seckeys
            .into_iter()
            .map(|seckey| SignatureProof {
                signer_pubkey: seckey.pubkey(),
                signature: value.sign_with(seckey),
            })
            .collect();
        Self { value, proofs }
    }

    pub fn hash(&self) -> crate::hash::Hash {
        self.value.hash()
    }
}
