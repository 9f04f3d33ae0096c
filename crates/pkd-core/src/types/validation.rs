//! Validation errors, check flags and the immutable outcome value.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;

use super::CertificateStatus;

/// How serious a validation error is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    /// Forces the certificate to `Invalid`
    Critical,
    /// Recorded for audit, does not change the status on its own
    Warning,
}

/// Stable validation error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// CSCA self-signature does not verify
    CscaSelfSignatureInvalid,
    /// CSCA lacks the basic constraints `cA` flag
    CscaNotCa,
    /// Validity window ended
    CertExpired,
    /// Validity window has not started
    CertNotYetValid,
    /// No issuer with a matching subject name
    ChainIncomplete,
    /// DSC signature does not verify under any candidate issuer
    DscSignatureInvalid,
    /// DSC asserts the `cA` flag
    DscIsCa,
    /// Certificate was only partially decoded
    DecodeDegraded,
    /// Unexpected failure while processing the certificate
    ProcessingFailed,
    /// Byte-identical certificate earlier in the same bundle
    DuplicateInBatch,
    /// Fingerprint already present in the store
    DuplicateCertificate,
}

impl ErrorCode {
    /// Stable wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CscaSelfSignatureInvalid => "CSCA_SELF_SIGNATURE_INVALID",
            Self::CscaNotCa => "CSCA_NOT_CA",
            Self::CertExpired => "CERT_EXPIRED",
            Self::CertNotYetValid => "CERT_NOT_YET_VALID",
            Self::ChainIncomplete => "CHAIN_INCOMPLETE",
            Self::DscSignatureInvalid => "DSC_SIGNATURE_INVALID",
            Self::DscIsCa => "DSC_IS_CA",
            Self::DecodeDegraded => "DECODE_DEGRADED",
            Self::ProcessingFailed => "PROCESSING_FAILED",
            Self::DuplicateInBatch => "DUPLICATE_IN_BATCH",
            Self::DuplicateCertificate => "DUPLICATE_CERTIFICATE",
        }
    }

    /// Severity this code is raised with unless a policy overrides it.
    #[must_use]
    pub const fn default_severity(self) -> Severity {
        match self {
            Self::CscaSelfSignatureInvalid
            | Self::CscaNotCa
            | Self::ChainIncomplete
            | Self::DscSignatureInvalid
            | Self::ProcessingFailed => Severity::Critical,
            Self::CertExpired
            | Self::CertNotYetValid
            | Self::DscIsCa
            | Self::DecodeDegraded
            | Self::DuplicateInBatch
            | Self::DuplicateCertificate => Severity::Warning,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed validation finding attached to a certificate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    /// Error code
    pub code: ErrorCode,
    /// Human-readable detail
    pub message: String,
    /// Severity
    pub severity: Severity,
    /// When it was raised
    pub occurred_at: DateTime<Utc>,
}

impl ValidationError {
    /// Raise `code` at its default severity.
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::with_severity(code, code.default_severity(), message)
    }

    /// Raise `code` at an explicit severity.
    #[must_use]
    pub fn with_severity(code: ErrorCode, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            severity,
            occurred_at: Utc::now(),
        }
    }

    /// Whether this error forces `Invalid`.
    #[must_use]
    pub fn is_critical(&self) -> bool {
        self.severity == Severity::Critical
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:?}] {}: {}", self.severity, self.code, self.message)
    }
}

/// The five boolean sub-checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[allow(clippy::struct_excessive_bools)]
pub struct ValidationChecks {
    /// Signature verified (self or issuer)
    pub signature_valid: bool,
    /// Chain to a trust anchor established
    pub chain_valid: bool,
    /// Revocation policy reported not revoked
    pub not_revoked: bool,
    /// Inside the validity window
    pub validity_valid: bool,
    /// Basic constraints acceptable for the role
    pub constraints_valid: bool,
}

impl Default for ValidationChecks {
    fn default() -> Self {
        Self {
            signature_valid: true,
            chain_valid: true,
            not_revoked: true,
            validity_valid: true,
            constraints_valid: true,
        }
    }
}

/// Position of "now" relative to a validity window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidityState {
    /// Inside the window
    Current,
    /// After `not_after`
    Expired,
    /// Before `not_before`
    NotYetValid,
}

impl ValidityState {
    /// Evaluate a window against `now`.
    #[must_use]
    pub fn evaluate(
        not_before: DateTime<Utc>,
        not_after: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Self {
        if now < not_before {
            Self::NotYetValid
        } else if now > not_after {
            Self::Expired
        } else {
            Self::Current
        }
    }
}

/// Derive the lifecycle status from check flags and errors.
///
/// `Invalid` wins over everything, then `Revoked`, then the specific
/// validity cause, then `Valid`.
#[must_use]
pub fn derive_status(
    checks: &ValidationChecks,
    errors: &[ValidationError],
    validity: ValidityState,
) -> CertificateStatus {
    if !checks.signature_valid
        || !checks.constraints_valid
        || errors.iter().any(ValidationError::is_critical)
    {
        return CertificateStatus::Invalid;
    }
    if !checks.not_revoked {
        return CertificateStatus::Revoked;
    }
    match validity {
        ValidityState::Current => CertificateStatus::Valid,
        ValidityState::Expired => CertificateStatus::Expired,
        ValidityState::NotYetValid => CertificateStatus::NotYetValid,
    }
}

/// Complete, immutable result of validating one certificate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    /// Sub-check flags
    pub checks: ValidationChecks,
    /// Derived lifecycle status
    pub status: CertificateStatus,
    /// Findings, in the order they were raised
    pub errors: Vec<ValidationError>,
    /// Wall time spent validating, in milliseconds
    pub duration_ms: u64,
    /// When the outcome was produced
    pub validated_at: DateTime<Utc>,
}

impl ValidationOutcome {
    /// Start building an outcome; all checks default to passing.
    #[must_use]
    pub fn builder() -> OutcomeBuilder {
        OutcomeBuilder::new()
    }

    /// Number of critical errors.
    #[must_use]
    pub fn critical_count(&self) -> usize {
        self.errors.iter().filter(|e| e.is_critical()).count()
    }

    /// Whether an error with `code` is present.
    #[must_use]
    pub fn has(&self, code: ErrorCode) -> bool {
        self.errors.iter().any(|e| e.code == code)
    }
}

/// Accumulates check results; [`OutcomeBuilder::finish`] is the only way to
/// obtain a [`ValidationOutcome`].
#[derive(Debug)]
pub struct OutcomeBuilder {
    checks: ValidationChecks,
    validity: ValidityState,
    errors: Vec<ValidationError>,
    started: Instant,
}

impl Default for OutcomeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl OutcomeBuilder {
    /// New builder with every check passing.
    #[must_use]
    pub fn new() -> Self {
        Self {
            checks: ValidationChecks::default(),
            validity: ValidityState::Current,
            errors: Vec::new(),
            started: Instant::now(),
        }
    }

    /// Record the signature check.
    pub fn signature(&mut self, ok: bool) -> &mut Self {
        self.checks.signature_valid = ok;
        self
    }

    /// Record the chain check.
    pub fn chain(&mut self, ok: bool) -> &mut Self {
        self.checks.chain_valid = ok;
        self
    }

    /// Record the revocation check.
    pub fn not_revoked(&mut self, ok: bool) -> &mut Self {
        self.checks.not_revoked = ok;
        self
    }

    /// Record the constraints check.
    pub fn constraints(&mut self, ok: bool) -> &mut Self {
        self.checks.constraints_valid = ok;
        self
    }

    /// Record the validity window position.
    pub fn validity(&mut self, state: ValidityState) -> &mut Self {
        self.validity = state;
        self.checks.validity_valid = state == ValidityState::Current;
        self
    }

    /// Attach a finding.
    pub fn error(&mut self, error: ValidationError) -> &mut Self {
        self.errors.push(error);
        self
    }

    /// Freeze into an outcome with a derived status.
    #[must_use]
    pub fn finish(self) -> ValidationOutcome {
        let status = derive_status(&self.checks, &self.errors, self.validity);
        let duration_ms = u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX);
        ValidationOutcome {
            checks: self.checks,
            status,
            errors: self.errors,
            duration_ms,
            validated_at: Utc::now(),
        }
    }
}
