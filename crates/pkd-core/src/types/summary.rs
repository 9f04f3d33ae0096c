//! Per-bundle summary returned to the caller.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{
    CertificateRecord, CertificateStatus, Fingerprint, ParseIssue, Role, ValidationError,
};

/// Status counts for one role.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleTally {
    /// `Valid`
    pub valid: usize,
    /// `Invalid`
    pub invalid: usize,
    /// `Expired`
    pub expired: usize,
    /// `NotYetValid`
    pub not_yet_valid: usize,
    /// `Revoked`
    pub revoked: usize,
    /// Validation errors raised, any severity
    pub errors: usize,
}

impl RoleTally {
    /// Certificates counted.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.valid + self.invalid + self.expired + self.not_yet_valid + self.revoked
    }
}

/// One validation finding, tied to the certificate it was raised for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Certificate fingerprint
    pub fingerprint: Fingerprint,
    /// The finding
    pub error: ValidationError,
}

/// Result of processing one upload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleSummary {
    /// Upload identifier
    pub upload_id: String,
    /// Records produced by the parser
    pub records_parsed: usize,
    /// Certificates written to the store
    pub certificates_stored: usize,
    /// Certificates skipped because the store already had them
    pub duplicates_skipped: usize,
    /// Byte-identical certificates repeated inside the bundle
    pub duplicates_in_batch: usize,
    /// Revocation lists written to the store
    pub revocation_lists_stored: usize,
    /// Certificates whose processing failed unexpectedly
    pub processing_failures: usize,
    /// Per-role status counts
    pub by_role: BTreeMap<Role, RoleTally>,
    /// Per-record parse problems
    pub parse_issues: Vec<ParseIssue>,
    /// Every validation finding, in the order raised
    pub audit: Vec<AuditEntry>,
    /// Wall time for the whole bundle, in milliseconds
    pub duration_ms: u64,
}

impl BundleSummary {
    /// Empty summary for an upload.
    #[must_use]
    pub fn new(upload_id: impl Into<String>) -> Self {
        Self {
            upload_id: upload_id.into(),
            ..Self::default()
        }
    }

    /// Count a validated certificate and append its findings to the audit list.
    pub fn record(&mut self, record: &CertificateRecord) {
        let tally = self.by_role.entry(record.role).or_default();
        match record.status() {
            CertificateStatus::Valid => tally.valid += 1,
            CertificateStatus::Invalid => tally.invalid += 1,
            CertificateStatus::Expired => tally.expired += 1,
            CertificateStatus::NotYetValid => tally.not_yet_valid += 1,
            CertificateStatus::Revoked => tally.revoked += 1,
        }
        tally.errors += record.outcome.errors.len();
        self.audit.extend(record.outcome.errors.iter().map(|error| AuditEntry {
            fingerprint: record.fingerprint.clone(),
            error: error.clone(),
        }));
    }

    /// Tally for a role; zeroes when none were seen.
    #[must_use]
    pub fn tally(&self, role: Role) -> RoleTally {
        self.by_role.get(&role).copied().unwrap_or_default()
    }

    /// Certificates validated across all roles.
    #[must_use]
    pub fn certificates_validated(&self) -> usize {
        self.by_role.values().map(RoleTally::total).sum()
    }

    /// `Valid` certificates across all roles.
    #[must_use]
    pub fn total_valid(&self) -> usize {
        self.by_role.values().map(|t| t.valid).sum()
    }

    /// `Invalid` certificates across all roles.
    #[must_use]
    pub fn total_invalid(&self) -> usize {
        self.by_role.values().map(|t| t.invalid).sum()
    }
}
