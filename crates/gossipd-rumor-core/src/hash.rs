use gossipd_util_array_type::{
    array_type_define, array_type_impl_base32_str, array_type_impl_debug_as_display,
    array_type_impl_serde, array_type_impl_zero_default,
};
use bincode::{Decode, Encode};

use crate::bincode::RUMOR_BINCODE_CONFIG;

array_type_define! {
    /// Fixed-width BLAKE3 digest with content-equality, used both as the
    /// rumor's content-addressed key and as the hash being signed over.
    #[derive(Encode, Decode, Copy, Clone, Hash)]
    pub struct Hash[32];
}
array_type_impl_zero_default!(Hash);
array_type_impl_base32_str!(Hash);
array_type_impl_serde!(Hash);
array_type_impl_debug_as_display!(Hash);

impl From<blake3::Hash> for Hash {
    fn from(value: blake3::Hash) -> Self {
        Self::from_bytes(*value.as_bytes())
    }
}

impl From<Hash> for blake3::Hash {
    fn from(value: Hash) -> Self {
        blake3::Hash::from_bytes(value.to_bytes())
    }
}

/// A type whose canonical encoding can be content-addressed.
///
/// Canonical bytes are fixed as the type's [`RUMOR_BINCODE_CONFIG`] bincode
/// encoding; hashing and signing both operate on this single encoding, so a
/// rumor whose re-serialized bytes produce a different hash than provided
/// must be rejected by callers (see [`crate::validate::validate`]).
pub trait Hashable: bincode::Encode {
    fn hash(&self) -> Hash {
        let mut hasher = blake3::Hasher::new();
        bincode::encode_into_std_write(self, &mut hasher, RUMOR_BINCODE_CONFIG)
            .expect("hashing into an in-memory hasher can't fail");
        Hash::from(hasher.finalize())
    }
}
