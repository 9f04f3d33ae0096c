//! ICAO PKD bundle ingestion.
//!
//! Takes LDIF downloads and signed CSCA Master Lists, extracts every
//! certificate and revocation list, validates certificates in two passes
//! (authorities first, then document signers) and stores the results in a
//! [`CertificateStore`].
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use pkd::{MemoryStore, Pipeline, PipelineConfig, Upload};
//!
//! #[tokio::main]
//! async fn main() -> pkd::Result<()> {
//!     let config = PipelineConfig::load("pkd.toml".as_ref())?;
//!     let pipeline = Pipeline::from_config(Arc::new(MemoryStore::new()), config).await?;
//!
//!     let bytes = std::fs::read("icaopkd-001-complete.ldif").expect("bundle");
//!     let summary = pipeline.process(Upload::detect("upload-1", bytes)).await?;
//!     println!("{} stored, {} invalid", summary.certificates_stored, summary.total_invalid());
//!     Ok(())
//! }
//! ```
//!
//! # Crates
//!
//! - `pkd-core`: shared types, the store traits and [`MemoryStore`]
//! - `pkd-parser`: LDIF and Master List parsing, decoding, signatures
//! - `pkd-validation`: the two-pass engine and trust paths

pub mod config;
mod error;
pub mod pipeline;
pub mod progress;

pub use config::{PipelineConfig, ValidationPolicy};
pub use error::{ConfigError, PipelineError, Result};
pub use pipeline::{BundleFormat, Pipeline, Upload};
pub use progress::{ChannelProgress, TracingProgress};

// Re-export the building blocks
pub use pkd_core::*;
pub use pkd_parser::{ContainerError, TrustAnchor};
pub use pkd_validation::{
    ChainError, Clock, EngineConfig, FixedClock, RevocationChecker, RevocationQuery,
    RevocationStatus, StubRevocationChecker, SystemClock, TrustPath, ValidationEngine,
};

// Re-export runtime for convenience
pub use tokio;
