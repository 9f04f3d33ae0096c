//! Transient records produced by the bundle parsers.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::{CertificateData, DecodedRevocationList, Fingerprint, Role};

/// What a parsed record carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    /// X.509 certificate
    Certificate,
    /// Certificate revocation list
    RevocationList,
}

/// Where in the bundle a record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordPosition {
    /// 1-based line of the entry name in an LDIF stream
    Line(usize),
    /// 0-based index inside a master list certificate set
    SetIndex(usize),
}

impl fmt::Display for RecordPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Line(n) => write!(f, "line {n}"),
            Self::SetIndex(n) => write!(f, "set member {n}"),
        }
    }
}

/// Decoded content of a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecordPayload {
    /// Certificate, fully or partially decoded
    Certificate(CertificateData),
    /// Revocation list
    RevocationList(DecodedRevocationList),
}

/// One certificate or CRL extracted from a bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedRecord {
    /// Entry name from the envelope (`dn:`); empty for master list members
    pub entry_name: String,
    /// Origin inside the bundle
    pub position: RecordPosition,
    /// Role assigned by the classifier
    pub role: Role,
    /// Country code recovered for the record
    pub country: Option<String>,
    /// Decoded content
    pub payload: RecordPayload,
}

impl ParsedRecord {
    /// Record kind.
    #[must_use]
    pub const fn kind(&self) -> RecordKind {
        match self.payload {
            RecordPayload::Certificate(_) => RecordKind::Certificate,
            RecordPayload::RevocationList(_) => RecordKind::RevocationList,
        }
    }

    /// Raw DER bytes of the payload.
    #[must_use]
    pub fn raw(&self) -> &[u8] {
        match &self.payload {
            RecordPayload::Certificate(c) => c.der(),
            RecordPayload::RevocationList(l) => &l.der,
        }
    }

    /// Fingerprint of the payload.
    #[must_use]
    pub const fn fingerprint(&self) -> &Fingerprint {
        match &self.payload {
            RecordPayload::Certificate(c) => c.fingerprint(),
            RecordPayload::RevocationList(l) => &l.fingerprint,
        }
    }

    /// Certificate payload, if this record carries one.
    #[must_use]
    pub const fn certificate(&self) -> Option<&CertificateData> {
        match &self.payload {
            RecordPayload::Certificate(c) => Some(c),
            RecordPayload::RevocationList(_) => None,
        }
    }

    /// Revocation list payload, if this record carries one.
    #[must_use]
    pub const fn revocation_list(&self) -> Option<&DecodedRevocationList> {
        match &self.payload {
            RecordPayload::Certificate(_) => None,
            RecordPayload::RevocationList(l) => Some(l),
        }
    }
}

/// Machine-readable parse issue codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ParseIssueCode {
    /// Payload is not valid Base64
    InvalidBase64,
    /// Line or value is not valid UTF-8 / expected encoding
    InvalidEncoding,
    /// Certificate bytes could not be decoded
    CertificateDecode,
    /// CRL bytes could not be decoded
    RevocationListDecode,
    /// Entry had a payload but no name
    MissingName,
    /// Certificate already known to the store, not emitted
    DuplicateSkipped,
}

impl ParseIssueCode {
    /// Stable wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidBase64 => "INVALID_BASE64",
            Self::InvalidEncoding => "INVALID_ENCODING",
            Self::CertificateDecode => "CERTIFICATE_DECODE",
            Self::RevocationListDecode => "REVOCATION_LIST_DECODE",
            Self::MissingName => "MISSING_NAME",
            Self::DuplicateSkipped => "DUPLICATE_SKIPPED",
        }
    }
}

/// A per-record problem that did not stop the parse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseIssue {
    /// Issue code
    pub code: ParseIssueCode,
    /// Where it happened
    pub position: RecordPosition,
    /// Human-readable detail
    pub message: String,
}

impl ParseIssue {
    /// Build an issue.
    #[must_use]
    pub fn new(code: ParseIssueCode, position: RecordPosition, message: impl Into<String>) -> Self {
        Self {
            code,
            position,
            message: message.into(),
        }
    }
}

impl fmt::Display for ParseIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}: {}", self.code.as_str(), self.position, self.message)
    }
}
