//! Durable entities handed to the certificate store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{
    CertificateData, CertificateStatus, DecodeState, DecodedRevocationList, DistinguishedName,
    Fingerprint, Role, ValidationOutcome,
};

/// Where a stored object came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    /// Upload that introduced the object
    pub upload_id: String,
    /// Fingerprint of the signed container, for master list members
    pub container_id: Option<Fingerprint>,
    /// LDIF entry name, when there was one
    pub entry_name: Option<String>,
}

impl Provenance {
    /// Provenance for an upload with no container.
    #[must_use]
    pub fn upload(upload_id: impl Into<String>) -> Self {
        Self {
            upload_id: upload_id.into(),
            container_id: None,
            entry_name: None,
        }
    }
}

/// A validated certificate as persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateRecord {
    /// SHA-256 of the DER encoding, the natural key
    pub fingerprint: Fingerprint,
    /// Serial number, upper-case hex
    pub serial: String,
    /// Full certificate DER
    #[serde(with = "hex_bytes")]
    pub der: Vec<u8>,
    /// Raw `SubjectPublicKeyInfo` DER
    #[serde(with = "hex_bytes")]
    pub spki: Vec<u8>,
    /// Subject name
    pub subject: DistinguishedName,
    /// Issuer name
    pub issuer: DistinguishedName,
    /// `cA` flag of the resolved issuer; `None` when unresolved
    pub issuer_is_ca: Option<bool>,
    /// Own basic constraints `cA` flag
    pub is_ca: Option<bool>,
    /// Not valid before
    pub not_before: DateTime<Utc>,
    /// Not valid after
    pub not_after: DateTime<Utc>,
    /// Role assigned at parse time
    pub role: Role,
    /// Latest validation outcome
    pub outcome: ValidationOutcome,
    /// Origin of the certificate
    pub provenance: Provenance,
    /// Full or degraded decode
    pub decode_state: DecodeState,
    /// When the record was first built
    pub created_at: DateTime<Utc>,
}

impl CertificateRecord {
    /// Assemble a record from a decoded certificate and its outcome.
    #[must_use]
    pub fn from_certificate(
        cert: &CertificateData,
        role: Role,
        outcome: ValidationOutcome,
        issuer_is_ca: Option<bool>,
        provenance: Provenance,
    ) -> Self {
        let summary = cert.summary();
        Self {
            fingerprint: summary.fingerprint.clone(),
            serial: summary.serial.clone(),
            der: cert.der().to_vec(),
            spki: cert.spki().to_vec(),
            subject: summary.subject.clone(),
            issuer: summary.issuer.clone(),
            issuer_is_ca,
            is_ca: summary.is_ca,
            not_before: summary.not_before,
            not_after: summary.not_after,
            role,
            outcome,
            provenance,
            decode_state: cert.decode_state(),
            created_at: Utc::now(),
        }
    }

    /// Current lifecycle status.
    #[must_use]
    pub const fn status(&self) -> CertificateStatus {
        self.outcome.status
    }

    /// Subject and issuer denote the same entity.
    #[must_use]
    pub fn is_self_issued(&self) -> bool {
        self.subject.same_entity(&self.issuer)
    }
}

/// A revocation list as persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevocationListRecord {
    /// SHA-256 of the DER encoding
    pub fingerprint: Fingerprint,
    /// Issuing CSCA name
    pub issuer: DistinguishedName,
    /// Country of the issuer
    pub country: Option<String>,
    /// `thisUpdate`
    pub this_update: DateTime<Utc>,
    /// `nextUpdate`
    pub next_update: Option<DateTime<Utc>>,
    /// Revoked serial numbers, upper-case hex
    pub revoked_serials: Vec<String>,
    /// Full CRL DER
    #[serde(with = "hex_bytes")]
    pub der: Vec<u8>,
    /// Origin of the list
    pub provenance: Provenance,
    /// Whether `nextUpdate` had already passed when stored
    pub stale: bool,
}

impl RevocationListRecord {
    /// Assemble a record from a decoded list.
    #[must_use]
    pub fn from_decoded(
        list: &DecodedRevocationList,
        country: Option<String>,
        provenance: Provenance,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            fingerprint: list.fingerprint.clone(),
            issuer: list.issuer.clone(),
            country: country.or_else(|| list.issuer.country.clone()),
            this_update: list.this_update,
            next_update: list.next_update,
            revoked_serials: list.revoked_serials.clone(),
            der: list.der.clone(),
            provenance,
            stale: list.is_stale(now),
        }
    }
}

/// Result of an insert-or-reject store call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsertOutcome {
    /// New row created
    Inserted,
    /// Fingerprint already present, nothing written
    Duplicate,
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}
