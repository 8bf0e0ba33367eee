use std::collections::BTreeSet;

use snafu::Snafu;

use crate::hash::{Hash, Hashable as _};
use crate::peer::PeerPubkey;
use crate::rumor::Rumor;
use crate::signed::Signed;

/// A single accumulated validation failure.
///
/// Checks are accumulated rather than short-circuited: a rumor failing both
/// hash and whitelist checks reports both.
#[derive(Debug, Snafu, PartialEq, Eq, Clone)]
pub enum ValidationError {
    #[snafu(display("declared hash does not match canonical content hash"))]
    HashMismatch,
    #[snafu(display("PeerRumor origin is not among its own signature proofs"))]
    MissingOriginProof,
    #[snafu(display("invalid signature from {signer}"))]
    InvalidSignature { signer: PeerPubkey },
    #[snafu(display("signer {signer} is not in the configured whitelist"))]
    NotWhitelisted { signer: PeerPubkey },
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ValidationErrors(pub Vec<ValidationError>);

impl ValidationErrors {
    pub fn is_ok(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, err) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{err}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

pub type ValidationResult = Result<(), ValidationErrors>;

/// Validates a received `(hash, signed_rumor)` pair against its four
/// checks — hash integrity, origin proof, signature validity, whitelist
/// membership — accumulating every failure instead of stopping at the
/// first.
pub fn validate(
    hash: Hash,
    signed_rumor: &Signed<Rumor>,
    whitelist: Option<&BTreeSet<PeerPubkey>>,
) -> ValidationResult {
    let mut errors = Vec::new();

    if signed_rumor.value.hash() != hash {
        errors.push(ValidationError::HashMismatch);
    }

    if let Rumor::Peer(peer_rumor) = &signed_rumor.value {
        let origin_signed = signed_rumor
            .proofs
            .iter()
            .any(|proof| proof.signer_id() == peer_rumor.origin);
        if !origin_signed {
            errors.push(ValidationError::MissingOriginProof);
        }
    }

    for proof in &signed_rumor.proofs {
        if signed_rumor
            .value
            .verify_signature(proof.signer_pubkey, proof.signature)
            .is_err()
        {
            errors.push(ValidationError::InvalidSignature {
                signer: proof.signer_pubkey,
            });
        }
    }

    if let Some(whitelist) = whitelist {
        for proof in &signed_rumor.proofs {
            if !whitelist.contains(&proof.signer_pubkey) {
                errors.push(ValidationError::NotWhitelisted {
                    signer: proof.signer_pubkey,
                });
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ValidationErrors(errors))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peer::{PeerId, PeerSeckey};
    use crate::rumor::{CommonRumor, ContentTypeTag, PeerRumor};
    use crate::signed::Signable as _;

    fn common_rumor(payload: &[u8]) -> Rumor {
        Rumor::Common(CommonRumor {
            content_type_tag: ContentTypeTag::CONSENSUS_ARTIFACT,
            payload: payload.into(),
        })
    }

    #[test]
    fn valid_common_rumor_passes() {
        let seckey = PeerSeckey::generate();
        let rumor = common_rumor(b"hello");
        let hash = rumor.hash();
        let signed = Signed::new_signed_by_one(rumor, seckey);

        assert!(validate(hash, &signed, None).is_ok());
    }

    #[test]
    fn tampered_hash_is_rejected() {
        let seckey = PeerSeckey::generate();
        let rumor = common_rumor(b"hello");
        let signed = Signed::new_signed_by_one(rumor, seckey);

        let wrong_hash = Hash::from(blake3::hash(b"not the rumor"));
        let result = validate(wrong_hash, &signed, None);

        assert_eq!(result, Err(ValidationErrors(vec![ValidationError::HashMismatch])));
    }

    #[test]
    fn missing_origin_proof_is_rejected() {
        let origin_seckey = PeerSeckey::generate();
        let other_seckey = PeerSeckey::generate();

        let rumor = Rumor::Peer(PeerRumor {
            origin: PeerId::from_pubkey(origin_seckey.pubkey()),
            ordinal: 0,
            content_type_tag: ContentTypeTag::CONSENSUS_FACILITY,
            payload: (&b"x"[..]).into(),
        });
        let hash = rumor.hash();
        // Signed by someone other than the declared origin.
        let signed = Signed::new_signed_by_one(rumor, other_seckey);

        let result = validate(hash, &signed, None);
        assert_eq!(
            result,
            Err(ValidationErrors(vec![ValidationError::MissingOriginProof]))
        );
    }

    #[test]
    fn whitelist_rejects_unknown_signer() {
        let seckey = PeerSeckey::generate();
        let other = PeerSeckey::generate().pubkey();
        let rumor = common_rumor(b"hello");
        let hash = rumor.hash();
        let signed = Signed::new_signed_by_one(rumor, seckey);

        let whitelist = BTreeSet::from([other]);
        let result = validate(hash, &signed, Some(&whitelist));

        assert_eq!(
            result,
            Err(ValidationErrors(vec![ValidationError::NotWhitelisted {
                signer: seckey.pubkey()
            }]))
        );
    }
}
