//! Decoded certificate payloads.
//!
//! A certificate is either fully decoded by the primary X.509 decoder or,
//! when that decoder rejects some part of it, partially decoded from the raw
//! TBS structure. Downstream code must match on [`CertificateData`] and
//! decide what to do with the degraded case.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{DistinguishedName, Fingerprint};

/// Identity and policy fields available for every decoded certificate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateSummary {
    /// SHA-256 of the DER encoding
    pub fingerprint: Fingerprint,
    /// Serial number, upper-case hex
    pub serial: String,
    /// Subject name
    pub subject: DistinguishedName,
    /// Issuer name
    pub issuer: DistinguishedName,
    /// Not valid before
    pub not_before: DateTime<Utc>,
    /// Not valid after
    pub not_after: DateTime<Utc>,
    /// Basic constraints `cA` flag; `None` when the extension is absent
    pub is_ca: Option<bool>,
}

impl CertificateSummary {
    /// Subject and issuer denote the same entity.
    #[must_use]
    pub fn is_self_issued(&self) -> bool {
        self.subject.same_entity(&self.issuer)
    }

    /// Country code from the subject, falling back to the issuer.
    #[must_use]
    pub fn country(&self) -> Option<String> {
        self.subject
            .country
            .clone()
            .or_else(|| self.issuer.country.clone())
    }
}

/// Certificate fully decoded by the primary decoder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedCertificate {
    /// Identity and policy fields
    pub summary: CertificateSummary,
    /// X.509 version (0 = v1, 2 = v3)
    pub version: u32,
    /// Basic constraints path length
    pub path_len: Option<u32>,
    /// Key usage `keyCertSign` bit; `None` when the extension is absent
    pub key_cert_sign: Option<bool>,
    /// Public key algorithm OID
    pub public_key_algorithm: String,
    /// Signature algorithm OID
    pub signature_algorithm: String,
    /// Raw `SubjectPublicKeyInfo` DER
    pub spki: Vec<u8>,
    /// Full certificate DER
    pub der: Vec<u8>,
}

/// Certificate recovered from the raw TBS structure after the primary
/// decoder failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialCertificate {
    /// Identity and policy fields recovered by the walker
    pub summary: CertificateSummary,
    /// Raw `SubjectPublicKeyInfo` DER
    pub spki: Vec<u8>,
    /// Why the primary decoder rejected the certificate
    pub reason: String,
    /// Full certificate DER
    pub der: Vec<u8>,
}

/// Outcome of decoding a certificate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decode", rename_all = "snake_case")]
pub enum CertificateData {
    /// Every field decoded
    FullyDecoded(DecodedCertificate),
    /// Identity recovered, primary decode failed
    PartiallyDecoded(PartialCertificate),
}

impl CertificateData {
    /// Identity and policy fields.
    #[must_use]
    pub const fn summary(&self) -> &CertificateSummary {
        match self {
            Self::FullyDecoded(c) => &c.summary,
            Self::PartiallyDecoded(c) => &c.summary,
        }
    }

    /// Fingerprint of the DER encoding.
    #[must_use]
    pub const fn fingerprint(&self) -> &Fingerprint {
        &self.summary().fingerprint
    }

    /// Full certificate DER.
    #[must_use]
    pub fn der(&self) -> &[u8] {
        match self {
            Self::FullyDecoded(c) => &c.der,
            Self::PartiallyDecoded(c) => &c.der,
        }
    }

    /// Raw `SubjectPublicKeyInfo` DER.
    #[must_use]
    pub fn spki(&self) -> &[u8] {
        match self {
            Self::FullyDecoded(c) => &c.spki,
            Self::PartiallyDecoded(c) => &c.spki,
        }
    }

    /// Whether this certificate came through the fallback walker.
    #[must_use]
    pub const fn is_degraded(&self) -> bool {
        matches!(self, Self::PartiallyDecoded(_))
    }

    /// Matching [`DecodeState`] tag.
    #[must_use]
    pub const fn decode_state(&self) -> DecodeState {
        match self {
            Self::FullyDecoded(_) => DecodeState::Full,
            Self::PartiallyDecoded(_) => DecodeState::Degraded,
        }
    }
}

/// How completely a stored certificate was decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecodeState {
    /// Primary decoder succeeded
    Full,
    /// Recovered by the fallback walker
    Degraded,
}
