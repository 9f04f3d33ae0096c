//! # pkd-parser
//!
//! Turns ICAO PKD bundles into [`ParsedRecord`](pkd_core::ParsedRecord)s.
//!
//! Two bundle formats are understood:
//!
//! - **LDIF** downloads ([`ldif`]): line-oriented, Base64 payloads, one
//!   certificate or CRL per entry. Per-entry failures are collected and the
//!   parse continues.
//! - **CSCA Master Lists** ([`master_list`]): a CMS `SignedData` envelope
//!   around a SET of CSCA certificates. The envelope signature is a hard
//!   gate; nothing is emitted from a container that fails it.
//!
//! Both formats share the binary [`decoder`] (with the partial [`fallback`]
//! walker for certificates strict decoding rejects), the role
//! [`classify`]er and the ring-backed [`signature`] verifier, which the
//! validation engine reuses for chain checks.
//!
//! ```text
//! bytes ─┬─ ldif::LdifParser ─────────────┐
//!        └─ master_list::MasterListParser ┴─> decoder ─> classify ─> ParsedRecord
//! ```

pub mod anchor;
pub mod classify;
pub mod decoder;
mod error;
pub mod fallback;
pub mod ldif;
pub mod master_list;
pub mod oids;
pub mod signature;

#[cfg(any(test, feature = "test-util"))]
pub mod test_support;

pub use anchor::TrustAnchor;
pub use classify::{classify, Rule};
pub use decoder::{decode_certificate, decode_lenient, decode_revocation_list, fingerprint};
pub use error::{AnchorError, ContainerError, DecodeError, ParserError, Result, SignatureError};
pub use ldif::{LdifParse, LdifParser};
pub use master_list::{ContainerParse, MasterListParser, SignerSummary, DEFAULT_MIN_CONTAINER_LEN};
pub use signature::{verify_certificate_signature, HashAlgorithm, SignatureScheme};
