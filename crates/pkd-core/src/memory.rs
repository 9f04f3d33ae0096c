//! In-memory [`CertificateStore`].
//!
//! All state sits behind one `tokio::sync::RwLock`. Inserts check and write
//! under the same write guard, so concurrent pipelines sharing an
//! `Arc<MemoryStore>` never create two entries for one fingerprint.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::{PkdError, Result};
use crate::traits::{CertificateIndex, CertificateStore, ExistenceOracle};
use crate::types::{
    normalize_dn, CertificateRecord, Fingerprint, InsertOutcome, RevocationListRecord, Role,
    ValidationOutcome,
};

#[derive(Debug, Default)]
struct Inner {
    certificates: HashMap<Fingerprint, CertificateRecord>,
    /// Normalized subject -> fingerprints, in insertion order
    by_subject: HashMap<String, Vec<Fingerprint>>,
    revocation_lists: HashMap<Fingerprint, RevocationListRecord>,
    /// Certificate fingerprints in insertion order
    order: Vec<Fingerprint>,
}

/// Process-local store, mainly for tests and one-shot imports.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored certificates.
    pub async fn len(&self) -> usize {
        self.inner.read().await.certificates.len()
    }

    /// Whether no certificate is stored.
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.certificates.is_empty()
    }

    /// Every stored certificate, in insertion order.
    pub async fn certificates(&self) -> Vec<CertificateRecord> {
        let inner = self.inner.read().await;
        inner
            .order
            .iter()
            .filter_map(|fp| inner.certificates.get(fp).cloned())
            .collect()
    }

    /// Every stored revocation list.
    pub async fn revocation_lists(&self) -> Vec<RevocationListRecord> {
        self.inner
            .read()
            .await
            .revocation_lists
            .values()
            .cloned()
            .collect()
    }
}

#[async_trait]
impl ExistenceOracle for MemoryStore {
    async fn exists_by_fingerprint(&self, fingerprint: &Fingerprint) -> Result<bool> {
        Ok(self.inner.read().await.certificates.contains_key(fingerprint))
    }
}

#[async_trait]
impl CertificateIndex for MemoryStore {
    async fn find_by_subject_name(&self, subject: &str) -> Result<Option<CertificateRecord>> {
        Ok(self
            .find_all_by_subject_name(subject)
            .await?
            .into_iter()
            .next())
    }

    async fn find_all_by_subject_name(&self, subject: &str) -> Result<Vec<CertificateRecord>> {
        let inner = self.inner.read().await;
        let Some(fingerprints) = inner.by_subject.get(&normalize_dn(subject)) else {
            return Ok(Vec::new());
        };
        let mut matches: Vec<CertificateRecord> = fingerprints
            .iter()
            .filter_map(|fp| inner.certificates.get(fp))
            .cloned()
            .collect();
        // stable: insertion order survives within each group
        matches.sort_by_key(|r| r.role != Role::Csca);
        Ok(matches)
    }

    async fn find_by_role(&self, role: Role) -> Result<Vec<CertificateRecord>> {
        let inner = self.inner.read().await;
        Ok(inner
            .order
            .iter()
            .filter_map(|fp| inner.certificates.get(fp))
            .filter(|r| r.role == role)
            .cloned()
            .collect())
    }

    async fn find_by_fingerprint(
        &self,
        fingerprint: &Fingerprint,
    ) -> Result<Option<CertificateRecord>> {
        Ok(self.inner.read().await.certificates.get(fingerprint).cloned())
    }
}

#[async_trait]
impl CertificateStore for MemoryStore {
    async fn insert(&self, record: CertificateRecord) -> Result<InsertOutcome> {
        let mut inner = self.inner.write().await;
        if inner.certificates.contains_key(&record.fingerprint) {
            return Ok(InsertOutcome::Duplicate);
        }
        let fp = record.fingerprint.clone();
        inner
            .by_subject
            .entry(record.subject.match_key())
            .or_default()
            .push(fp.clone());
        inner.order.push(fp.clone());
        inner.certificates.insert(fp, record);
        Ok(InsertOutcome::Inserted)
    }

    async fn insert_revocation_list(&self, record: RevocationListRecord) -> Result<InsertOutcome> {
        let mut inner = self.inner.write().await;
        if inner.revocation_lists.contains_key(&record.fingerprint) {
            return Ok(InsertOutcome::Duplicate);
        }
        inner
            .revocation_lists
            .insert(record.fingerprint.clone(), record);
        Ok(InsertOutcome::Inserted)
    }

    async fn update_outcome(
        &self,
        fingerprint: &Fingerprint,
        outcome: ValidationOutcome,
    ) -> Result<()> {
        let mut inner = self.inner.write().await;
        let record = inner
            .certificates
            .get_mut(fingerprint)
            .ok_or_else(|| PkdError::not_found(format!("certificate {fingerprint}")))?;
        record.outcome = outcome;
        Ok(())
    }
}
