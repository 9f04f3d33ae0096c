//! Decoded certificate revocation lists.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{DistinguishedName, Fingerprint};

/// A CRL as produced by the binary decoder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedRevocationList {
    /// SHA-256 of the DER encoding
    pub fingerprint: Fingerprint,
    /// Issuing CSCA name
    pub issuer: DistinguishedName,
    /// `thisUpdate`
    pub this_update: DateTime<Utc>,
    /// `nextUpdate`, when present
    pub next_update: Option<DateTime<Utc>>,
    /// Serial numbers of revoked certificates, upper-case hex
    pub revoked_serials: Vec<String>,
    /// Signature algorithm OID
    pub signature_algorithm: String,
    /// Full CRL DER
    pub der: Vec<u8>,
}

impl DecodedRevocationList {
    /// Whether the list has passed its `nextUpdate`.
    #[must_use]
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        self.next_update.is_some_and(|next| now > next)
    }

    /// Whether a serial (upper-case hex) appears in the list.
    #[must_use]
    pub fn lists_serial(&self, serial: &str) -> bool {
        self.revoked_serials
            .iter()
            .any(|s| s.eq_ignore_ascii_case(serial))
    }
}
