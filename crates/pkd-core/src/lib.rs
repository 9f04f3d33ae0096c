//! Core types and traits for ICAO PKD certificate ingestion.
//!
//! This crate provides the foundational types shared by the parser, the
//! validation engine and the pipeline facade:
//!
//! - **Types**: parsed records, durable certificate entities, validation
//!   outcomes and bundle summaries
//! - **Traits**: the collaborators the core consumes (existence oracle,
//!   certificate index, certificate store, progress sink)
//! - **Errors**: [`PkdError`] for collaborator failures
//! - **[`MemoryStore`]**: an in-process store implementing the traits
//!
//! # Example
//!
//! ```rust,ignore
//! use pkd_core::{CertificateStore, Fingerprint, Result};
//!
//! async fn known(store: &dyn CertificateStore, fp: &Fingerprint) -> Result<bool> {
//!     store.exists_by_fingerprint(fp).await
//! }
//! ```

mod error;
pub mod memory;
pub mod traits;
pub mod types;

pub use error::{PkdError, Result};
pub use memory::MemoryStore;
pub use traits::*;
pub use types::*;
