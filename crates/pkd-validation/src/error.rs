use pkd_core::{Fingerprint, PkdError};
use pkd_parser::DecodeError;
use thiserror::Error;

use crate::chain::TrustPath;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors that escape the engine.
///
/// Certificates failing their checks are not errors; they produce outcomes
/// carrying [`ValidationError`](pkd_core::ValidationError)s. These variants
/// cover collaborator failures and missing inputs.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Store or index failure
    #[error("store error: {0}")]
    Store(#[from] PkdError),

    /// Stored certificate bytes no longer decode
    #[error("stored certificate {fingerprint} does not decode: {source}")]
    Decode {
        /// Certificate fingerprint
        fingerprint: Fingerprint,
        /// Decoder error
        #[source]
        source: DecodeError,
    },

    /// Fingerprint not in the store
    #[error("certificate {0} not found")]
    NotFound(Fingerprint),
}

/// Why a trust path could not be completed.
#[derive(Error, Debug)]
pub enum ChainError {
    /// Start certificate unknown
    #[error("certificate {0} not found")]
    NotFound(Fingerprint),

    /// More links than the configured maximum
    #[error("trust path longer than {max_depth} links")]
    TooDeep {
        /// Configured maximum
        max_depth: usize,
        /// Links walked so far
        path: TrustPath,
    },

    /// No stored certificate matches the next issuer
    #[error("issuer {issuer} not found")]
    AnchorUnreachable {
        /// Issuer name that did not resolve
        issuer: String,
        /// Links walked so far
        path: TrustPath,
    },

    /// Index lookup failed
    #[error("index error: {0}")]
    Index(#[from] PkdError),
}

impl ChainError {
    /// Partial path, when one was walked.
    #[must_use]
    pub const fn partial_path(&self) -> Option<&TrustPath> {
        match self {
            Self::TooDeep { path, .. } | Self::AnchorUnreachable { path, .. } => Some(path),
            Self::NotFound(_) | Self::Index(_) => None,
        }
    }
}
