//! Revocation lookups.
//!
//! Revocation is fail-open: a checker that errors or does not answer within
//! the configured timeout counts as "not revoked". The only checker shipped
//! is [`StubRevocationChecker`], which never reports a revocation.

use std::time::Duration;

use async_trait::async_trait;
use pkd_core::DistinguishedName;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Answer from a revocation source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevocationStatus {
    /// Not listed
    NotRevoked,
    /// Listed as revoked
    Revoked,
}

/// What is being asked about.
#[derive(Debug, Clone, Copy)]
pub struct RevocationQuery<'a> {
    /// Upper-case hex serial
    pub serial: &'a str,
    /// Issuer of the certificate
    pub issuer: &'a DistinguishedName,
}

/// A revocation source (CRL cache, OCSP, ...).
#[async_trait]
pub trait RevocationChecker: Send + Sync {
    /// Look up one certificate.
    async fn status(&self, query: RevocationQuery<'_>) -> pkd_core::Result<RevocationStatus>;
}

/// Always answers [`RevocationStatus::NotRevoked`].
#[derive(Debug, Clone, Copy, Default)]
pub struct StubRevocationChecker;

#[async_trait]
impl RevocationChecker for StubRevocationChecker {
    async fn status(&self, _query: RevocationQuery<'_>) -> pkd_core::Result<RevocationStatus> {
        Ok(RevocationStatus::NotRevoked)
    }
}

/// Ask `checker` with a deadline. Returns `true` when the certificate is
/// not revoked, including on error or timeout.
pub async fn not_revoked(
    checker: &dyn RevocationChecker,
    query: RevocationQuery<'_>,
    timeout: Duration,
) -> bool {
    match tokio::time::timeout(timeout, checker.status(query)).await {
        Ok(Ok(status)) => status == RevocationStatus::NotRevoked,
        Ok(Err(e)) => {
            warn!(
                serial = query.serial,
                error = %e,
                "revocation lookup failed, treating as not revoked"
            );
            true
        }
        Err(_) => {
            warn!(
                serial = query.serial,
                timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                "revocation lookup timed out, treating as not revoked"
            );
            true
        }
    }
}
