//! Signature verification with `ring`.
//!
//! Keys arrive as raw `SubjectPublicKeyInfo` DER and algorithms as
//! `AlgorithmIdentifier`s, so the same code verifies certificate signatures
//! and CMS `SignerInfo` signatures. CMS producers often put the bare key type
//! (`rsaEncryption`, `id-ecPublicKey`) in the signature algorithm field; the
//! hash is then taken from the separate digest algorithm.
//!
//! Curves and hashes outside ring's set (brainpool, explicit-parameter EC
//! keys, ECDSA with SHA-512) return [`SignatureError::Unsupported`], whose
//! message starts with "unsupported algorithm". Callers treat that as a failed
//! check but report it apart from a signature that does not verify.

use der::asn1::ObjectIdentifier;
use der::{Decode, Reader, SliceReader, Tag, TagNumber, Tagged};
use ring::digest;
use ring::signature::{self, UnparsedPublicKey, VerificationAlgorithm};
use x509_cert::spki::{AlgorithmIdentifierOwned, SubjectPublicKeyInfoOwned};

use crate::error::SignatureError;
use crate::fallback::split_certificate;
use crate::oids;

/// Digest algorithms understood by the verifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    /// SHA-1, legacy RSA only
    Sha1,
    /// SHA-256
    Sha256,
    /// SHA-384
    Sha384,
    /// SHA-512
    Sha512,
}

impl HashAlgorithm {
    /// Look up a digest algorithm OID.
    #[must_use]
    pub fn from_oid(oid: &ObjectIdentifier) -> Option<Self> {
        [
            (oids::SHA1, Self::Sha1),
            (oids::SHA256, Self::Sha256),
            (oids::SHA384, Self::Sha384),
            (oids::SHA512, Self::Sha512),
        ]
        .into_iter()
        .find_map(|(known, hash)| (known == *oid).then_some(hash))
    }

    /// Hash `data`.
    #[must_use]
    pub fn digest(self, data: &[u8]) -> Vec<u8> {
        let algorithm = match self {
            Self::Sha1 => &digest::SHA1_FOR_LEGACY_USE_ONLY,
            Self::Sha256 => &digest::SHA256,
            Self::Sha384 => &digest::SHA384,
            Self::Sha512 => &digest::SHA512,
        };
        digest::digest(algorithm, data).as_ref().to_vec()
    }
}

/// A resolved signature scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureScheme {
    /// RSASSA-PKCS1-v1_5
    RsaPkcs1(HashAlgorithm),
    /// RSASSA-PSS with MGF1 over the same hash
    RsaPss(HashAlgorithm),
    /// ECDSA, DER-encoded signature
    Ecdsa(HashAlgorithm),
    /// Ed25519
    Ed25519,
}

impl SignatureScheme {
    /// Resolve a signature algorithm identifier. `digest` is consulted only
    /// for bare key-type identifiers.
    pub fn resolve(
        signature_algorithm: &AlgorithmIdentifierOwned,
        digest: Option<&AlgorithmIdentifierOwned>,
    ) -> Result<Self, SignatureError> {
        use HashAlgorithm::{Sha1, Sha256, Sha384, Sha512};

        let oid = signature_algorithm.oid;
        let fixed = [
            (oids::SHA1_WITH_RSA, Self::RsaPkcs1(Sha1)),
            (oids::SHA256_WITH_RSA, Self::RsaPkcs1(Sha256)),
            (oids::SHA384_WITH_RSA, Self::RsaPkcs1(Sha384)),
            (oids::SHA512_WITH_RSA, Self::RsaPkcs1(Sha512)),
            (oids::ECDSA_WITH_SHA256, Self::Ecdsa(Sha256)),
            (oids::ECDSA_WITH_SHA384, Self::Ecdsa(Sha384)),
            (oids::ECDSA_WITH_SHA512, Self::Ecdsa(Sha512)),
            (oids::ED25519, Self::Ed25519),
        ];
        if let Some(scheme) = fixed
            .into_iter()
            .find_map(|(known, scheme)| (known == oid).then_some(scheme))
        {
            return Ok(scheme);
        }

        if oid == oids::RSASSA_PSS {
            return Ok(Self::RsaPss(pss_hash(signature_algorithm)?));
        }
        if oid == oids::RSA_ENCRYPTION || oid == oids::EC_PUBLIC_KEY {
            let digest = digest
                .ok_or_else(|| SignatureError::Unsupported(format!("{oid} without digest")))?;
            let hash = HashAlgorithm::from_oid(&digest.oid)
                .ok_or_else(|| SignatureError::Unsupported(format!("digest {}", digest.oid)))?;
            return Ok(if oid == oids::RSA_ENCRYPTION {
                Self::RsaPkcs1(hash)
            } else {
                Self::Ecdsa(hash)
            });
        }

        Err(SignatureError::Unsupported(oid.to_string()))
    }
}

/// Hash named in `RSASSA-PSS-params`. An absent hash means SHA-1, which ring
/// does not offer for PSS.
fn pss_hash(algorithm: &AlgorithmIdentifierOwned) -> Result<HashAlgorithm, SignatureError> {
    let unsupported = || SignatureError::Unsupported("RSASSA-PSS with SHA-1".into());
    let Some(params) = &algorithm.parameters else {
        return Err(unsupported());
    };
    let mut reader = SliceReader::new(params.value())?;
    if reader.is_finished() {
        return Err(unsupported());
    }
    let hash_tag = Tag::ContextSpecific {
        constructed: true,
        number: TagNumber::N0,
    };
    if reader.peek_tag()? != hash_tag {
        return Err(unsupported());
    }
    let header = der::Header::decode(&mut reader)?;
    let inner = reader.read_slice(header.length)?;
    let hash_alg = AlgorithmIdentifierOwned::from_der(inner)?;
    match HashAlgorithm::from_oid(&hash_alg.oid) {
        Some(HashAlgorithm::Sha1) | None => Err(unsupported()),
        Some(hash) => Ok(hash),
    }
}

fn ring_algorithm(
    scheme: SignatureScheme,
    key: &SubjectPublicKeyInfoOwned,
) -> Result<&'static dyn VerificationAlgorithm, SignatureError> {
    use HashAlgorithm::{Sha1, Sha256, Sha384, Sha512};

    let key_oid = key.algorithm.oid;
    let mismatch = || SignatureError::Unsupported(format!("{scheme:?} with a {key_oid} key"));

    match scheme {
        SignatureScheme::RsaPkcs1(hash) | SignatureScheme::RsaPss(hash) => {
            if key_oid != oids::RSA_ENCRYPTION && key_oid != oids::RSASSA_PSS {
                return Err(mismatch());
            }
            let pss = matches!(scheme, SignatureScheme::RsaPss(_));
            Ok(match (pss, hash) {
                (false, Sha1) => &signature::RSA_PKCS1_2048_8192_SHA1_FOR_LEGACY_USE_ONLY,
                (false, Sha256) => &signature::RSA_PKCS1_2048_8192_SHA256,
                (false, Sha384) => &signature::RSA_PKCS1_2048_8192_SHA384,
                (false, Sha512) => &signature::RSA_PKCS1_2048_8192_SHA512,
                (true, Sha256) => &signature::RSA_PSS_2048_8192_SHA256,
                (true, Sha384) => &signature::RSA_PSS_2048_8192_SHA384,
                (true, Sha512) => &signature::RSA_PSS_2048_8192_SHA512,
                (true, Sha1) => return Err(mismatch()),
            })
        }
        SignatureScheme::Ecdsa(hash) => {
            if key_oid != oids::EC_PUBLIC_KEY {
                return Err(mismatch());
            }
            let curve = match &key.algorithm.parameters {
                Some(p) if p.tag() == Tag::ObjectIdentifier => p.decode_as::<ObjectIdentifier>()?,
                Some(_) => {
                    return Err(SignatureError::Unsupported(
                        "EC key with explicit curve parameters".into(),
                    ))
                }
                None => return Err(SignatureError::Malformed("EC key without curve".into())),
            };
            match (curve, hash) {
                (c, Sha256) if c == oids::SECP256R1 => Ok(&signature::ECDSA_P256_SHA256_ASN1),
                (c, Sha384) if c == oids::SECP256R1 => Ok(&signature::ECDSA_P256_SHA384_ASN1),
                (c, Sha256) if c == oids::SECP384R1 => Ok(&signature::ECDSA_P384_SHA256_ASN1),
                (c, Sha384) if c == oids::SECP384R1 => Ok(&signature::ECDSA_P384_SHA384_ASN1),
                (c, h) => Err(SignatureError::Unsupported(format!(
                    "ECDSA on curve {c} with {h:?}"
                ))),
            }
        }
        SignatureScheme::Ed25519 => {
            if key_oid != oids::ED25519 {
                return Err(mismatch());
            }
            Ok(&signature::ED25519)
        }
    }
}

/// Verify `signature` over `message` with the key in `spki_der`.
pub fn verify(
    spki_der: &[u8],
    signature_algorithm: &AlgorithmIdentifierOwned,
    digest_algorithm: Option<&AlgorithmIdentifierOwned>,
    message: &[u8],
    signature: &[u8],
) -> Result<(), SignatureError> {
    let key = SubjectPublicKeyInfoOwned::from_der(spki_der)?;
    let scheme = SignatureScheme::resolve(signature_algorithm, digest_algorithm)?;
    let algorithm = ring_algorithm(scheme, &key)?;
    let key_bytes = key
        .subject_public_key
        .as_bytes()
        .ok_or_else(|| SignatureError::Malformed("public key has unused bits".into()))?;

    UnparsedPublicKey::new(algorithm, key_bytes)
        .verify(message, signature)
        .map_err(|_| SignatureError::Mismatch)
}

/// Verify a certificate's signature under an issuer public key.
///
/// The signed bytes are the certificate's own TBS encoding, never a
/// re-encoding.
pub fn verify_certificate_signature(
    cert_der: &[u8],
    issuer_spki_der: &[u8],
) -> Result<(), SignatureError> {
    let parts =
        split_certificate(cert_der).map_err(|e| SignatureError::Malformed(e.to_string()))?;
    verify(
        issuer_spki_der,
        &parts.signature_algorithm,
        None,
        parts.tbs,
        parts.signature,
    )
}
