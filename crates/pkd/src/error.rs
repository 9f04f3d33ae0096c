//! Error types for bundle ingestion.

use pkd_core::PkdError;
use pkd_parser::{AnchorError, ContainerError};
use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Failures that abort a whole bundle.
///
/// Per-record problems never surface here; they end up in the
/// [`BundleSummary`](pkd_core::BundleSummary) as parse issues or validation
/// errors.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Master List failed a structural or signature gate.
    #[error("container rejected: {0}")]
    Container(#[from] ContainerError),

    /// Configured trust anchor could not be loaded.
    #[error("trust anchor: {0}")]
    Anchor(#[from] AnchorError),

    /// Configuration is invalid or unreadable.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Store failure outside a per-certificate boundary.
    #[error("store error: {0}")]
    Store(#[from] PkdError),
}

/// Errors loading [`PipelineConfig`](crate::PipelineConfig).
#[derive(Error, Debug)]
pub enum ConfigError {
    /// File exists but could not be read.
    #[error("config io error: {0}")]
    Io(#[from] std::io::Error),

    /// File is not valid TOML for the config schema.
    #[error("config parse error: {0}")]
    Parse(String),
}
