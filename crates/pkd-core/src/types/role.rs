//! Certificate roles and lifecycle statuses.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Role a certificate plays in the ICAO PKI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    /// Country Signing CA, self-signed trust anchor
    Csca,
    /// Document Signer, issued by a CSCA
    Dsc,
    /// Non-conformant Document Signer, stored for publishing only
    DscNc,
    /// Role could not be determined
    Unknown,
}

impl Role {
    /// Roles validated in the first pass.
    #[must_use]
    pub const fn is_authority(self) -> bool {
        matches!(self, Self::Csca)
    }

    /// Stable wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Csca => "CSCA",
            Self::Dsc => "DSC",
            Self::DscNc => "DSC_NC",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// All roles, in summary order.
    pub const ALL: [Self; 4] = [Self::Csca, Self::Dsc, Self::DscNc, Self::Unknown];
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a stored certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CertificateStatus {
    /// All checks passed
    Valid,
    /// Validity window ended
    Expired,
    /// Validity window has not started
    NotYetValid,
    /// Reported revoked by the revocation policy
    Revoked,
    /// Signature, constraints or another critical check failed
    Invalid,
}

impl CertificateStatus {
    /// Stable wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Valid => "VALID",
            Self::Expired => "EXPIRED",
            Self::NotYetValid => "NOT_YET_VALID",
            Self::Revoked => "REVOKED",
            Self::Invalid => "INVALID",
        }
    }
}

impl fmt::Display for CertificateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
