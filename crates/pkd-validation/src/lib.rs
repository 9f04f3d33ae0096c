//! # pkd-validation
//!
//! Validates parsed ICAO PKD certificates and stores the results.
//!
//! - [`engine`]: the two-pass [`ValidationEngine`]. Authorities (CSCAs) are
//!   validated and stored first, then document signers are checked against
//!   them. Every certificate is committed on its own.
//! - [`chain`]: [`TrustPathBuilder`] walks a stored certificate up to its
//!   self-signed anchor without touching stored outcomes.
//! - [`revocation`]: the [`RevocationChecker`] seam. Lookups are timed out
//!   and fail open.
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use pkd_core::{MemoryStore, NoopProgress};
//! use pkd_validation::{BatchContext, ValidationEngine};
//!
//! let engine = ValidationEngine::new(Arc::new(MemoryStore::new()));
//! let report = engine.run(&BatchContext::new("upload-1", &NoopProgress), &records).await;
//! ```

pub mod chain;
pub mod engine;
mod error;
pub mod revocation;

#[cfg(test)]
mod test_util;

pub use chain::{TrustLink, TrustPath, TrustPathBuilder, DEFAULT_MAX_CHAIN_DEPTH};
pub use engine::{
    AuthorityBatch, BatchContext, Clock, DependentBatch, EngineConfig, FixedClock, ItemOutcome,
    SystemClock, ValidationEngine, ValidationReport,
};
pub use error::{ChainError, EngineError, Result};
pub use revocation::{
    not_revoked, RevocationChecker, RevocationQuery, RevocationStatus, StubRevocationChecker,
};
