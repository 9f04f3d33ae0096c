//! Collaborator traits the ingestion core is written against.
//!
//! Persistence, duplicate lookup and progress transport live outside the
//! core. Implementations must be `Send + Sync` so one store can be shared by
//! concurrent pipelines.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{
    CertificateRecord, Fingerprint, InsertOutcome, ProgressEvent, RevocationListRecord, Role,
    ValidationOutcome,
};

/// Answers "have we stored this fingerprint already?"
#[async_trait]
pub trait ExistenceOracle: Send + Sync {
    /// Whether a certificate with this fingerprint is already stored.
    async fn exists_by_fingerprint(&self, fingerprint: &Fingerprint) -> Result<bool>;
}

/// Read access to stored certificates.
#[async_trait]
pub trait CertificateIndex: Send + Sync {
    /// Certificate whose subject matches `subject` under the normalized
    /// comparison key. CSCAs are preferred when several match.
    async fn find_by_subject_name(&self, subject: &str) -> Result<Option<CertificateRecord>>;

    /// Every certificate whose subject matches `subject`, CSCAs first.
    ///
    /// A country that rolls its CSCA key under an unchanged name leaves
    /// several authorities with one subject; issuer resolution has to try
    /// them all. The default returns at most the single
    /// [`find_by_subject_name`](Self::find_by_subject_name) match.
    async fn find_all_by_subject_name(&self, subject: &str) -> Result<Vec<CertificateRecord>> {
        Ok(self.find_by_subject_name(subject).await?.into_iter().collect())
    }

    /// All certificates with the given role.
    async fn find_by_role(&self, role: Role) -> Result<Vec<CertificateRecord>>;

    /// Certificate by fingerprint.
    async fn find_by_fingerprint(
        &self,
        fingerprint: &Fingerprint,
    ) -> Result<Option<CertificateRecord>>;
}

/// Insert-or-reject persistence keyed by fingerprint.
#[async_trait]
pub trait CertificateStore: CertificateIndex + ExistenceOracle {
    /// Store a certificate unless its fingerprint is already present.
    async fn insert(&self, record: CertificateRecord) -> Result<InsertOutcome>;

    /// Store a revocation list unless its fingerprint is already present.
    async fn insert_revocation_list(&self, record: RevocationListRecord) -> Result<InsertOutcome>;

    /// Replace the outcome of a stored certificate after re-validation.
    ///
    /// Returns [`PkdError::NotFound`](crate::PkdError::NotFound) when the
    /// fingerprint is unknown.
    async fn update_outcome(
        &self,
        fingerprint: &Fingerprint,
        outcome: ValidationOutcome,
    ) -> Result<()>;
}

/// Fire-and-forget progress transport. Delivery failures are the sink's
/// problem and never reach the caller.
pub trait ProgressSink: Send + Sync {
    /// Push one event.
    fn notify(&self, event: ProgressEvent);
}

/// Sink that drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopProgress;

impl ProgressSink for NoopProgress {
    fn notify(&self, _event: ProgressEvent) {}
}
