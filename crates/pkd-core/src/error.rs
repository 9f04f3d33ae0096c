use thiserror::Error;

/// Result type alias for store and collaborator operations
pub type Result<T> = std::result::Result<T, PkdError>;

/// Errors raised by the collaborators the ingestion core depends on
#[derive(Error, Debug)]
pub enum PkdError {
    /// The backing store failed to read or write
    #[error("store error: {0}")]
    Store(String),

    /// A requested entity does not exist
    #[error("not found: {resource}")]
    NotFound {
        /// Description of the missing entity
        resource: String,
    },

    /// A fingerprint string is not 64 hex characters
    #[error("invalid fingerprint: {0}")]
    InvalidFingerprint(String),

    /// An external collaborator (oracle, index, channel) failed
    #[error("collaborator failed: {0}")]
    Collaborator(String),
}

impl PkdError {
    /// Build a [`PkdError::NotFound`] for the given resource description
    #[must_use]
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    /// Returns true if the error reports a missing entity
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
