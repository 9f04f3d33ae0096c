//! Two-pass certificate validation.
//!
//! Pass 1 validates authorities (CSCAs) and stores each one as soon as it is
//! checked. Pass 2 validates every other certificate against the authorities
//! from pass 1, then against the store. Each certificate is committed on
//! its own, so one failing certificate never aborts the batch.
//!
//! ```text
//! records ─> validate_authorities ─> AuthorityBatch ─┐
//!        └─────────────────────────> validate_dependents ─> DependentBatch
//! ```

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use pkd_core::{
    AuditEntry, BundleSummary, CertificateData, CertificateRecord, CertificateStore, ErrorCode,
    Fingerprint, InsertOutcome, OutcomeBuilder, ParsedRecord, ProgressEvent, ProgressSink,
    ProgressTicker, Provenance, Role, Severity, Stage, ValidationError, ValidationOutcome,
    ValidityState,
};
use pkd_parser::{decode_lenient, verify_certificate_signature, SignatureError};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::chain::{TrustPath, TrustPathBuilder, DEFAULT_MAX_CHAIN_DEPTH};
use crate::error::{ChainError, EngineError, Result};
use crate::revocation::{not_revoked, RevocationChecker, RevocationQuery, StubRevocationChecker};

/// Source of "now" for validity checks.
pub trait Clock: Send + Sync {
    /// Current instant.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock pinned to one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Engine tuning.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Deadline for one revocation lookup
    pub revocation_timeout: Duration,
    /// A DSC asserting `cA` is a warning when true, critical otherwise
    pub allow_dsc_ca_flag: bool,
    /// Emit a progress event every this many certificates
    pub progress_interval: usize,
    /// Link limit for [`ValidationEngine::trust_path`]
    pub max_chain_depth: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            revocation_timeout: Duration::from_secs(5),
            allow_dsc_ca_flag: true,
            progress_interval: 50,
            max_chain_depth: DEFAULT_MAX_CHAIN_DEPTH,
        }
    }
}

/// Per-bundle data threaded through both passes.
#[derive(Clone, Copy)]
pub struct BatchContext<'a> {
    /// Upload identifier
    pub upload_id: &'a str,
    /// Fingerprint of the signed container, for master list members
    pub container_id: Option<&'a Fingerprint>,
    /// Progress transport
    pub sink: &'a dyn ProgressSink,
}

impl<'a> BatchContext<'a> {
    /// Context for an upload with no container.
    #[must_use]
    pub fn new(upload_id: &'a str, sink: &'a dyn ProgressSink) -> Self {
        Self {
            upload_id,
            container_id: None,
            sink,
        }
    }

    /// Attach the container fingerprint.
    #[must_use]
    pub const fn with_container(mut self, container_id: Option<&'a Fingerprint>) -> Self {
        self.container_id = container_id;
        self
    }

    fn provenance(&self, record: &ParsedRecord) -> Provenance {
        Provenance {
            upload_id: self.upload_id.to_string(),
            container_id: self.container_id.cloned(),
            entry_name: (!record.entry_name.is_empty()).then(|| record.entry_name.clone()),
        }
    }

    fn notify(&self, stage: Stage, processed: usize, total: usize) {
        self.sink
            .notify(ProgressEvent::new(self.upload_id, stage, processed, Some(total)));
    }
}

/// What happened to one certificate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ItemOutcome {
    /// Validated and written to the store
    Stored(CertificateRecord),
    /// The store already had this fingerprint; nothing written
    AlreadyStored {
        /// Certificate fingerprint
        fingerprint: Fingerprint,
        /// `DUPLICATE_CERTIFICATE` warning
        warning: ValidationError,
    },
    /// Repeats an earlier certificate of the same bundle; nothing written
    DuplicateInBatch {
        /// Certificate fingerprint
        fingerprint: Fingerprint,
        /// `DUPLICATE_IN_BATCH` warning
        warning: ValidationError,
    },
    /// Processing failed unexpectedly
    Failed {
        /// Certificate fingerprint
        fingerprint: Fingerprint,
        /// `PROCESSING_FAILED` error
        error: ValidationError,
        /// Best-effort record, when the store accepted it
        record: Option<CertificateRecord>,
    },
}

impl ItemOutcome {
    /// Fingerprint of the certificate this outcome is about.
    #[must_use]
    pub const fn fingerprint(&self) -> &Fingerprint {
        match self {
            Self::Stored(record) => &record.fingerprint,
            Self::AlreadyStored { fingerprint, .. }
            | Self::DuplicateInBatch { fingerprint, .. }
            | Self::Failed { fingerprint, .. } => fingerprint,
        }
    }

    /// Record written to the store, if any.
    #[must_use]
    pub const fn record(&self) -> Option<&CertificateRecord> {
        match self {
            Self::Stored(record) => Some(record),
            Self::Failed { record, .. } => record.as_ref(),
            Self::AlreadyStored { .. } | Self::DuplicateInBatch { .. } => None,
        }
    }

    fn apply_to(&self, summary: &mut BundleSummary) {
        let audit = |fingerprint: &Fingerprint, error: &ValidationError| AuditEntry {
            fingerprint: fingerprint.clone(),
            error: error.clone(),
        };
        match self {
            Self::Stored(record) => {
                summary.certificates_stored += 1;
                summary.record(record);
            }
            Self::AlreadyStored {
                fingerprint,
                warning,
            } => {
                summary.duplicates_skipped += 1;
                summary.audit.push(audit(fingerprint, warning));
            }
            Self::DuplicateInBatch {
                fingerprint,
                warning,
            } => {
                summary.duplicates_in_batch += 1;
                summary.audit.push(audit(fingerprint, warning));
            }
            Self::Failed {
                fingerprint,
                error,
                record,
            } => {
                summary.processing_failures += 1;
                match record {
                    Some(record) => {
                        summary.certificates_stored += 1;
                        summary.record(record);
                    }
                    None => summary.audit.push(audit(fingerprint, error)),
                }
            }
        }
    }
}

/// Result of pass 1.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorityBatch {
    /// One entry per authority certificate, in processing order
    pub items: Vec<ItemOutcome>,
}

impl AuthorityBatch {
    /// Authorities stored by this pass, usable as issuer candidates.
    pub fn authorities(&self) -> impl Iterator<Item = &CertificateRecord> {
        self.items.iter().filter_map(|item| match item {
            ItemOutcome::Stored(record) => Some(record),
            _ => None,
        })
    }
}

/// Result of pass 2.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependentBatch {
    /// One entry per dependent certificate, in input order
    pub items: Vec<ItemOutcome>,
}

/// Both passes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    /// Pass 1
    pub authorities: AuthorityBatch,
    /// Pass 2
    pub dependents: DependentBatch,
}

impl ValidationReport {
    /// Every item, pass 1 first.
    pub fn items(&self) -> impl Iterator<Item = &ItemOutcome> {
        self.authorities.items.iter().chain(&self.dependents.items)
    }

    /// Stored record for a fingerprint.
    #[must_use]
    pub fn record(&self, fingerprint: &Fingerprint) -> Option<&CertificateRecord> {
        self.items()
            .filter_map(ItemOutcome::record)
            .find(|r| &r.fingerprint == fingerprint)
    }

    /// Fold counts, tallies and findings into a bundle summary.
    pub fn apply_to(&self, summary: &mut BundleSummary) {
        for item in self.items() {
            item.apply_to(summary);
        }
    }
}

struct Checked {
    outcome: ValidationOutcome,
    issuer_is_ca: Option<bool>,
}

/// Validates certificates and commits each result to the store.
pub struct ValidationEngine {
    store: Arc<dyn CertificateStore>,
    revocation: Arc<dyn RevocationChecker>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
}

impl ValidationEngine {
    /// Engine with the stub revocation checker, the wall clock and default
    /// tuning.
    #[must_use]
    pub fn new(store: Arc<dyn CertificateStore>) -> Self {
        Self {
            store,
            revocation: Arc::new(StubRevocationChecker),
            clock: Arc::new(SystemClock),
            config: EngineConfig::default(),
        }
    }

    /// Replace the revocation checker.
    #[must_use]
    pub fn with_revocation(mut self, revocation: Arc<dyn RevocationChecker>) -> Self {
        self.revocation = revocation;
        self
    }

    /// Replace the clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the tuning.
    #[must_use]
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Current tuning.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Pass 1: validate and store every authority certificate in `records`.
    ///
    /// Self-issued authorities go before link certificates so links can find
    /// their issuer in the same batch.
    #[instrument(skip_all, fields(upload_id = ctx.upload_id))]
    pub async fn validate_authorities(
        &self,
        ctx: &BatchContext<'_>,
        records: &[ParsedRecord],
    ) -> AuthorityBatch {
        let mut pending: Vec<(&ParsedRecord, &CertificateData)> = records
            .iter()
            .filter(|r| r.role.is_authority())
            .filter_map(|r| r.certificate().map(|c| (r, c)))
            .collect();
        pending.sort_by_key(|(_, cert)| !cert.summary().is_self_issued());

        let total = pending.len();
        let mut ticker = ProgressTicker::new(self.config.progress_interval);
        let mut seen = HashSet::new();
        let mut stored: Vec<CertificateRecord> = Vec::new();
        let mut batch = AuthorityBatch::default();

        for (parsed, cert) in pending {
            let item = self.process(ctx, parsed, cert, &stored, &mut seen).await;
            if let ItemOutcome::Stored(record) = &item {
                stored.push(record.clone());
            }
            batch.items.push(item);
            if let Some(n) = ticker.tick() {
                ctx.notify(Stage::ValidatingAuthorities, n, total);
            }
        }

        info!(
            authorities = total,
            stored = stored.len(),
            "authority pass complete"
        );
        batch
    }

    /// Pass 2: validate and store every non-authority certificate, using the
    /// authorities from pass 1 before falling back to the store.
    #[instrument(skip_all, fields(upload_id = ctx.upload_id))]
    pub async fn validate_dependents(
        &self,
        ctx: &BatchContext<'_>,
        records: &[ParsedRecord],
        authorities: &AuthorityBatch,
    ) -> DependentBatch {
        let issuers: Vec<CertificateRecord> = authorities.authorities().cloned().collect();
        let pending: Vec<(&ParsedRecord, &CertificateData)> = records
            .iter()
            .filter(|r| !r.role.is_authority())
            .filter_map(|r| r.certificate().map(|c| (r, c)))
            .collect();

        let total = pending.len();
        let mut ticker = ProgressTicker::new(self.config.progress_interval);
        let mut seen = HashSet::new();
        let mut batch = DependentBatch::default();

        for (parsed, cert) in pending {
            batch
                .items
                .push(self.process(ctx, parsed, cert, &issuers, &mut seen).await);
            if let Some(n) = ticker.tick() {
                ctx.notify(Stage::ValidatingDependents, n, total);
            }
        }

        let stored = batch.items.iter().filter(|i| i.record().is_some()).count();
        info!(dependents = total, stored, "dependent pass complete");
        batch
    }

    /// Both passes in order.
    pub async fn run(&self, ctx: &BatchContext<'_>, records: &[ParsedRecord]) -> ValidationReport {
        let authorities = self.validate_authorities(ctx, records).await;
        let dependents = self.validate_dependents(ctx, records, &authorities).await;
        ValidationReport {
            authorities,
            dependents,
        }
    }

    /// Re-check a stored certificate against the current store and clock
    /// and replace its outcome.
    #[instrument(skip(self), fields(fingerprint = %fingerprint.short()))]
    pub async fn revalidate(&self, fingerprint: &Fingerprint) -> Result<ValidationOutcome> {
        let stored = self
            .store
            .find_by_fingerprint(fingerprint)
            .await?
            .ok_or_else(|| EngineError::NotFound(fingerprint.clone()))?;
        let cert = decode_lenient(&stored.der).map_err(|source| EngineError::Decode {
            fingerprint: fingerprint.clone(),
            source,
        })?;

        let checked = self.check(&cert, stored.role, &[]).await?;
        self.store
            .update_outcome(fingerprint, checked.outcome.clone())
            .await?;
        info!(status = %checked.outcome.status, "certificate revalidated");
        Ok(checked.outcome)
    }

    /// Trust path from a stored certificate to its anchor.
    pub async fn trust_path(
        &self,
        fingerprint: &Fingerprint,
    ) -> std::result::Result<TrustPath, ChainError> {
        TrustPathBuilder::new(self.store.as_ref())
            .with_max_depth(self.config.max_chain_depth)
            .build(fingerprint)
            .await
    }

    async fn process(
        &self,
        ctx: &BatchContext<'_>,
        parsed: &ParsedRecord,
        cert: &CertificateData,
        issuers: &[CertificateRecord],
        seen: &mut HashSet<Fingerprint>,
    ) -> ItemOutcome {
        let fingerprint = cert.fingerprint();
        if !seen.insert(fingerprint.clone()) {
            debug!(fingerprint = %fingerprint.short(), "repeated in bundle, skipped");
            return ItemOutcome::DuplicateInBatch {
                fingerprint: fingerprint.clone(),
                warning: ValidationError::new(
                    ErrorCode::DuplicateInBatch,
                    format!("byte-identical {} earlier in this bundle", parsed.role),
                ),
            };
        }

        match self.commit(ctx, parsed, cert, issuers).await {
            Ok(item) => item,
            Err(e) => self.commit_failure(ctx, parsed, cert, &e).await,
        }
    }

    async fn commit(
        &self,
        ctx: &BatchContext<'_>,
        parsed: &ParsedRecord,
        cert: &CertificateData,
        issuers: &[CertificateRecord],
    ) -> Result<ItemOutcome> {
        let fingerprint = cert.fingerprint();
        if self.store.exists_by_fingerprint(fingerprint).await? {
            return Ok(already_stored(fingerprint));
        }

        let checked = self.check(cert, parsed.role, issuers).await?;
        let record = CertificateRecord::from_certificate(
            cert,
            parsed.role,
            checked.outcome,
            checked.issuer_is_ca,
            ctx.provenance(parsed),
        );

        match self.store.insert(record.clone()).await? {
            InsertOutcome::Inserted => {
                debug!(
                    fingerprint = %fingerprint.short(),
                    role = %record.role,
                    status = %record.status(),
                    errors = record.outcome.errors.len(),
                    "certificate stored"
                );
                Ok(ItemOutcome::Stored(record))
            }
            InsertOutcome::Duplicate => Ok(already_stored(fingerprint)),
        }
    }

    async fn commit_failure(
        &self,
        ctx: &BatchContext<'_>,
        parsed: &ParsedRecord,
        cert: &CertificateData,
        cause: &EngineError,
    ) -> ItemOutcome {
        let fingerprint = cert.fingerprint().clone();
        warn!(fingerprint = %fingerprint.short(), error = %cause, "certificate processing failed");

        let error = ValidationError::new(ErrorCode::ProcessingFailed, cause.to_string());
        let mut builder = ValidationOutcome::builder();
        builder.error(error.clone());
        let record = CertificateRecord::from_certificate(
            cert,
            parsed.role,
            builder.finish(),
            None,
            ctx.provenance(parsed),
        );

        let record = match self.store.insert(record.clone()).await {
            Ok(InsertOutcome::Inserted) => Some(record),
            Ok(InsertOutcome::Duplicate) => None,
            Err(e) => {
                warn!(fingerprint = %fingerprint.short(), error = %e, "best-effort insert failed");
                None
            }
        };
        ItemOutcome::Failed {
            fingerprint,
            error,
            record,
        }
    }

    async fn check(
        &self,
        cert: &CertificateData,
        role: Role,
        issuers: &[CertificateRecord],
    ) -> Result<Checked> {
        match role {
            Role::DscNc => Ok(Checked {
                outcome: ValidationOutcome::builder().finish(),
                issuer_is_ca: None,
            }),
            Role::Csca => self.check_authority(cert, issuers).await,
            Role::Dsc | Role::Unknown => self.check_dependent(cert, issuers).await,
        }
    }

    async fn check_authority(
        &self,
        cert: &CertificateData,
        issuers: &[CertificateRecord],
    ) -> Result<Checked> {
        let summary = cert.summary();
        let mut b = ValidationOutcome::builder();

        let issuer_is_ca = if summary.is_self_issued() {
            if let Err(e) = verify_certificate_signature(cert.der(), cert.spki()) {
                let detail = match e {
                    SignatureError::Unsupported(_) => format!("self-signature not checked: {e}"),
                    _ => format!("self-signature: {e}"),
                };
                b.signature(false)
                    .error(ValidationError::new(ErrorCode::CscaSelfSignatureInvalid, detail));
            }
            summary.is_ca
        } else {
            self.resolve_issuer(&mut b, cert, issuers, ErrorCode::CscaSelfSignatureInvalid)
                .await?
        };

        if summary.is_ca != Some(true) {
            b.constraints(false).error(ValidationError::new(
                ErrorCode::CscaNotCa,
                "basic constraints do not assert cA",
            ));
        }

        self.common_checks(&mut b, cert).await;
        Ok(Checked {
            outcome: b.finish(),
            issuer_is_ca,
        })
    }

    async fn check_dependent(
        &self,
        cert: &CertificateData,
        issuers: &[CertificateRecord],
    ) -> Result<Checked> {
        let summary = cert.summary();
        let mut b = ValidationOutcome::builder();

        let issuer_is_ca = self
            .resolve_issuer(&mut b, cert, issuers, ErrorCode::DscSignatureInvalid)
            .await?;

        if summary.is_ca == Some(true) {
            if self.config.allow_dsc_ca_flag {
                b.error(ValidationError::new(
                    ErrorCode::DscIsCa,
                    "document signer asserts cA",
                ));
            } else {
                b.constraints(false).error(ValidationError::with_severity(
                    ErrorCode::DscIsCa,
                    Severity::Critical,
                    "document signer asserts cA",
                ));
            }
        }

        self.common_checks(&mut b, cert).await;
        Ok(Checked {
            outcome: b.finish(),
            issuer_is_ca,
        })
    }

    /// Find the issuer and verify the signature under it. Returns the
    /// issuer's `cA` flag when one verified.
    async fn resolve_issuer(
        &self,
        b: &mut OutcomeBuilder,
        cert: &CertificateData,
        issuers: &[CertificateRecord],
        mismatch: ErrorCode,
    ) -> Result<Option<bool>> {
        let summary = cert.summary();
        let key = summary.issuer.match_key();
        let mut candidates: Vec<CertificateRecord> = issuers
            .iter()
            .filter(|r| r.subject.match_key() == key && r.fingerprint != summary.fingerprint)
            .cloned()
            .collect();

        for found in self
            .store
            .find_all_by_subject_name(&summary.issuer.dn)
            .await?
        {
            if found.fingerprint != summary.fingerprint
                && !candidates.iter().any(|c| c.fingerprint == found.fingerprint)
            {
                candidates.push(found);
            }
        }

        if candidates.is_empty() {
            b.signature(false).chain(false).error(ValidationError::new(
                ErrorCode::ChainIncomplete,
                format!("no issuer found for {}", summary.issuer.dn),
            ));
            return Ok(None);
        }

        let mut unsupported = None;
        for candidate in &candidates {
            match verify_certificate_signature(cert.der(), &candidate.spki) {
                Ok(()) => {
                    debug!(issuer = %candidate.fingerprint.short(), "issuer signature verified");
                    return Ok(candidate.is_ca);
                }
                Err(e) => {
                    debug!(
                        issuer = %candidate.fingerprint.short(),
                        error = %e,
                        "issuer candidate rejected"
                    );
                    if matches!(e, SignatureError::Unsupported(_)) {
                        unsupported = Some(e);
                    }
                }
            }
        }

        let detail = match unsupported {
            Some(e) => format!("signature not checked under issuer {}: {e}", summary.issuer.dn),
            None => format!(
                "signature does not verify under {} candidate issuer(s) named {}",
                candidates.len(),
                summary.issuer.dn
            ),
        };
        b.signature(false)
            .chain(false)
            .error(ValidationError::new(mismatch, detail));
        Ok(None)
    }

    async fn common_checks(&self, b: &mut OutcomeBuilder, cert: &CertificateData) {
        let summary = cert.summary();

        let state =
            ValidityState::evaluate(summary.not_before, summary.not_after, self.clock.now());
        b.validity(state);
        match state {
            ValidityState::Current => {}
            ValidityState::Expired => {
                b.error(ValidationError::new(
                    ErrorCode::CertExpired,
                    format!("expired {}", summary.not_after.to_rfc3339()),
                ));
            }
            ValidityState::NotYetValid => {
                b.error(ValidationError::new(
                    ErrorCode::CertNotYetValid,
                    format!("valid from {}", summary.not_before.to_rfc3339()),
                ));
            }
        }

        if let CertificateData::PartiallyDecoded(partial) = cert {
            b.error(ValidationError::new(
                ErrorCode::DecodeDegraded,
                format!("partially decoded: {}", partial.reason),
            ));
        }

        let query = RevocationQuery {
            serial: &summary.serial,
            issuer: &summary.issuer,
        };
        b.not_revoked(
            not_revoked(
                self.revocation.as_ref(),
                query,
                self.config.revocation_timeout,
            )
            .await,
        );
    }
}

fn already_stored(fingerprint: &Fingerprint) -> ItemOutcome {
    debug!(fingerprint = %fingerprint.short(), "already stored, skipped");
    ItemOutcome::AlreadyStored {
        fingerprint: fingerprint.clone(),
        warning: ValidationError::new(
            ErrorCode::DuplicateCertificate,
            "certificate already stored",
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::revocation::RevocationStatus;
    use crate::test_util::{clock_at, parsed};
    use async_trait::async_trait;
    use pkd_core::{
        CertificateIndex, CertificateStatus, DecodeState, ExistenceOracle, MemoryStore,
        NoopProgress, PkdError, RevocationListRecord,
    };
    use pkd_parser::test_support::{self, CertSpec};
    use std::sync::Mutex;

    fn engine(store: &Arc<MemoryStore>) -> ValidationEngine {
        ValidationEngine::new(store.clone()).with_clock(clock_at(2025, 6, 1))
    }

    async fn run(engine: &ValidationEngine, records: &[ParsedRecord]) -> ValidationReport {
        let ctx = BatchContext::new("upload-1", &NoopProgress);
        engine.run(&ctx, records).await
    }

    fn stored<'a>(report: &'a ValidationReport, der: &[u8]) -> &'a CertificateRecord {
        report
            .record(&pkd_parser::fingerprint(der))
            .expect("certificate stored")
    }

    #[tokio::test]
    async fn valid_and_expired_authorities_with_signer() {
        let a = test_support::csca("KR", "CSCA-KOREA");
        let b = CertSpec::authority("KR", "CSCA-KOREA-OLD")
            .valid((2000, 1, 1), (2010, 1, 1))
            .self_signed();
        let dsc = test_support::dsc(&a, "KR", "DS Korea");
        let store = Arc::new(MemoryStore::new());

        let report = run(
            &engine(&store),
            &[
                parsed(&dsc.der, Role::Dsc),
                parsed(&a.der, Role::Csca),
                parsed(&b.der, Role::Csca),
            ],
        )
        .await;

        assert_eq!(stored(&report, &a.der).status(), CertificateStatus::Valid);
        let old = stored(&report, &b.der);
        assert_eq!(old.status(), CertificateStatus::Expired);
        assert!(old.outcome.has(ErrorCode::CertExpired));
        let signer = stored(&report, &dsc.der);
        assert_eq!(signer.status(), CertificateStatus::Valid);
        assert_eq!(signer.issuer_is_ca, Some(true));
        assert!(signer.outcome.errors.is_empty());
        assert_eq!(store.len().await, 3);
    }

    #[tokio::test]
    async fn bad_self_signature_is_invalid_even_when_expired() {
        let forged = CertSpec::authority("FR", "CSCA FR")
            .valid((2000, 1, 1), (2010, 1, 1))
            .self_issued_with_foreign_signature();
        let store = Arc::new(MemoryStore::new());

        let report = run(&engine(&store), &[parsed(&forged.der, Role::Csca)]).await;
        let record = stored(&report, &forged.der);
        assert_eq!(record.status(), CertificateStatus::Invalid);
        assert!(!record.outcome.checks.signature_valid);
        assert!(record.outcome.has(ErrorCode::CscaSelfSignatureInvalid));
        assert!(record.outcome.has(ErrorCode::CertExpired));
    }

    #[tokio::test]
    async fn authority_without_ca_flag_is_invalid() {
        let csca = CertSpec::authority("IT", "CSCA Italy").not_ca().self_signed();
        let store = Arc::new(MemoryStore::new());

        let report = run(&engine(&store), &[parsed(&csca.der, Role::Csca)]).await;
        let record = stored(&report, &csca.der);
        assert_eq!(record.status(), CertificateStatus::Invalid);
        assert!(!record.outcome.checks.constraints_valid);
        assert!(record.outcome.has(ErrorCode::CscaNotCa));
    }

    #[tokio::test]
    async fn link_certificate_verified_against_batch_authority() {
        let old = test_support::csca("NL", "CSCA NL");
        let new = test_support::link(&old, "NL", "CSCA NL 2");
        let store = Arc::new(MemoryStore::new());

        // the link comes first in the bundle but is validated after its issuer
        let report = run(
            &engine(&store),
            &[parsed(&new.der, Role::Csca), parsed(&old.der, Role::Csca)],
        )
        .await;
        assert_eq!(report.authorities.items[0].fingerprint(), &pkd_parser::fingerprint(&old.der));
        let link = stored(&report, &new.der);
        assert_eq!(link.status(), CertificateStatus::Valid);
        assert_eq!(link.issuer_is_ca, Some(true));
    }

    #[tokio::test]
    async fn signer_without_issuer_has_incomplete_chain() {
        let csca = test_support::csca("KR", "CSCA-KOREA");
        let dsc = test_support::dsc(&csca, "KR", "DS Korea");
        let store = Arc::new(MemoryStore::new());

        let report = run(&engine(&store), &[parsed(&dsc.der, Role::Dsc)]).await;
        let record = stored(&report, &dsc.der);
        assert!(!record.outcome.checks.signature_valid);
        assert!(!record.outcome.checks.chain_valid);
        let error = &record.outcome.errors[0];
        assert_eq!(error.code, ErrorCode::ChainIncomplete);
        assert_eq!(error.severity, Severity::Critical);
        assert_eq!(record.status(), CertificateStatus::Invalid);
        assert_eq!(record.issuer_is_ca, None);
    }

    #[tokio::test]
    async fn signer_resolves_issuer_from_store() {
        let csca = test_support::csca("DE", "CSCA-GERMANY");
        let dsc = test_support::dsc(&csca, "DE", "DS Germany");
        let store = Arc::new(MemoryStore::new());
        let engine = engine(&store);

        run(&engine, &[parsed(&csca.der, Role::Csca)]).await;
        let report = run(
            &engine,
            &[parsed(&csca.der, Role::Csca), parsed(&dsc.der, Role::Dsc)],
        )
        .await;

        assert!(matches!(
            &report.authorities.items[0],
            ItemOutcome::AlreadyStored { warning, .. }
                if warning.code == ErrorCode::DuplicateCertificate
        ));
        assert_eq!(stored(&report, &dsc.der).status(), CertificateStatus::Valid);
    }

    #[tokio::test]
    async fn every_candidate_issuer_is_tried() {
        let first = test_support::csca("KR", "CSCA-KOREA");
        let second = test_support::csca("KR", "CSCA-KOREA");
        let dsc = test_support::dsc(&second, "KR", "DS Korea");
        let store = Arc::new(MemoryStore::new());

        let report = run(
            &engine(&store),
            &[
                parsed(&first.der, Role::Csca),
                parsed(&second.der, Role::Csca),
                parsed(&dsc.der, Role::Dsc),
            ],
        )
        .await;
        assert_eq!(stored(&report, &dsc.der).status(), CertificateStatus::Valid);
    }

    #[tokio::test]
    async fn signer_of_rolled_over_authority_resolves_from_store() {
        let old = test_support::csca("KR", "CSCA-KOREA");
        let new = test_support::csca("KR", "CSCA-KOREA");
        let dsc = test_support::dsc(&new, "KR", "DS Korea");
        let store = Arc::new(MemoryStore::new());
        let engine = engine(&store);

        run(
            &engine,
            &[parsed(&old.der, Role::Csca), parsed(&new.der, Role::Csca)],
        )
        .await;
        let report = run(&engine, &[parsed(&dsc.der, Role::Dsc)]).await;

        let record = stored(&report, &dsc.der);
        assert_eq!(record.status(), CertificateStatus::Valid);
        assert!(record.outcome.errors.is_empty());
        assert_eq!(record.issuer_is_ca, Some(true));
    }

    #[tokio::test]
    async fn signer_under_wrong_key_is_invalid() {
        let published = test_support::csca("KR", "CSCA-KOREA");
        let unpublished = test_support::csca("KR", "CSCA-KOREA");
        let dsc = test_support::dsc(&unpublished, "KR", "DS Korea");
        let store = Arc::new(MemoryStore::new());

        let report = run(
            &engine(&store),
            &[parsed(&published.der, Role::Csca), parsed(&dsc.der, Role::Dsc)],
        )
        .await;
        let record = stored(&report, &dsc.der);
        assert_eq!(record.status(), CertificateStatus::Invalid);
        assert!(record.outcome.has(ErrorCode::DscSignatureInvalid));
        assert!(!record.outcome.has(ErrorCode::ChainIncomplete));
    }

    #[tokio::test]
    async fn unsupported_issuer_key_is_reported_as_unsupported() {
        let csca = test_support::csca("DE", "CSCA Germany");
        let dsc = test_support::dsc(&csca, "DE", "DS Germany");
        let seed = Arc::new(MemoryStore::new());
        let report = run(&engine(&seed), &[parsed(&csca.der, Role::Csca)]).await;

        let mut authority = stored(&report, &csca.der).clone();
        authority.spki = test_support::explicit_curve_ec_spki();
        let store = Arc::new(MemoryStore::new());
        store.insert(authority).await.unwrap();

        let report = run(&engine(&store), &[parsed(&dsc.der, Role::Dsc)]).await;
        let record = stored(&report, &dsc.der);
        assert_eq!(record.status(), CertificateStatus::Invalid);
        let error = &record.outcome.errors[0];
        assert_eq!(error.code, ErrorCode::DscSignatureInvalid);
        assert!(error.message.contains("unsupported algorithm"), "{}", error.message);
    }

    #[tokio::test]
    async fn degraded_authority_is_stored_with_warning() {
        let der = test_support::csca_with_duplicate_basic_constraints("NL", "CSCA NL");
        let store = Arc::new(MemoryStore::new());

        let report = run(&engine(&store), &[parsed(&der, Role::Csca)]).await;

        let record = stored(&report, &der);
        assert_eq!(record.decode_state, DecodeState::Degraded);
        assert!(record.outcome.has(ErrorCode::DecodeDegraded));
        assert!(record.outcome.checks.signature_valid);
        assert_eq!(record.status(), CertificateStatus::Valid);
    }

    #[tokio::test]
    async fn signer_ca_flag_follows_policy() {
        let csca = test_support::csca("BE", "CSCA Belgium");
        let dsc = CertSpec::signer("BE", "DS Belgium").ca_flag().issued_by(&csca);
        let records = [parsed(&csca.der, Role::Csca), parsed(&dsc.der, Role::Dsc)];

        let store = Arc::new(MemoryStore::new());
        let report = run(&engine(&store), &records).await;
        let lenient = stored(&report, &dsc.der);
        assert_eq!(lenient.status(), CertificateStatus::Valid);
        assert!(lenient.outcome.checks.constraints_valid);
        assert!(lenient.outcome.has(ErrorCode::DscIsCa));

        let store = Arc::new(MemoryStore::new());
        let strict = engine(&store).with_config(EngineConfig {
            allow_dsc_ca_flag: false,
            ..EngineConfig::default()
        });
        let report = run(&strict, &records).await;
        let record = stored(&report, &dsc.der);
        assert_eq!(record.status(), CertificateStatus::Invalid);
        assert!(!record.outcome.checks.constraints_valid);
    }

    #[tokio::test]
    async fn non_conformant_signer_bypasses_checks() {
        let csca = test_support::csca("KR", "CSCA-KOREA");
        let dsc = CertSpec::signer("KR", "DS Korea NC")
            .valid((2000, 1, 1), (2001, 1, 1))
            .issued_by(&csca);
        let store = Arc::new(MemoryStore::new());

        let report = run(&engine(&store), &[parsed(&dsc.der, Role::DscNc)]).await;
        let record = stored(&report, &dsc.der);
        assert_eq!(record.status(), CertificateStatus::Valid);
        assert_eq!(record.outcome.checks, pkd_core::ValidationChecks::default());
        assert!(record.outcome.errors.is_empty());
    }

    #[tokio::test]
    async fn repeated_certificate_in_bundle_is_skipped() {
        let csca = test_support::csca("ES", "CSCA Spain");
        let store = Arc::new(MemoryStore::new());

        let report = run(
            &engine(&store),
            &[parsed(&csca.der, Role::Csca), parsed(&csca.der, Role::Csca)],
        )
        .await;
        assert!(matches!(report.authorities.items[0], ItemOutcome::Stored(_)));
        assert!(matches!(
            report.authorities.items[1],
            ItemOutcome::DuplicateInBatch { .. }
        ));

        let mut summary = BundleSummary::new("upload-1");
        report.apply_to(&mut summary);
        assert_eq!(summary.certificates_stored, 1);
        assert_eq!(summary.duplicates_in_batch, 1);
        assert_eq!(summary.tally(Role::Csca).valid, 1);
        assert_eq!(summary.audit[0].error.code, ErrorCode::DuplicateInBatch);
        assert_eq!(store.len().await, 1);
    }

    struct AlwaysRevoked;

    #[async_trait]
    impl RevocationChecker for AlwaysRevoked {
        async fn status(&self, _q: RevocationQuery<'_>) -> pkd_core::Result<RevocationStatus> {
            Ok(RevocationStatus::Revoked)
        }
    }

    #[tokio::test]
    async fn revoked_answer_sets_status() {
        let csca = test_support::csca("KR", "CSCA-KOREA");
        let dsc = test_support::dsc(&csca, "KR", "DS Korea");
        let store = Arc::new(MemoryStore::new());
        let engine = engine(&store).with_revocation(Arc::new(AlwaysRevoked));

        let report = run(
            &engine,
            &[parsed(&csca.der, Role::Csca), parsed(&dsc.der, Role::Dsc)],
        )
        .await;
        let record = stored(&report, &dsc.der);
        assert!(!record.outcome.checks.not_revoked);
        assert_eq!(record.status(), CertificateStatus::Revoked);
    }

    /// Memory store whose subject lookups fail.
    struct BrokenIndex(MemoryStore);

    #[async_trait]
    impl ExistenceOracle for BrokenIndex {
        async fn exists_by_fingerprint(&self, fp: &Fingerprint) -> pkd_core::Result<bool> {
            self.0.exists_by_fingerprint(fp).await
        }
    }

    #[async_trait]
    impl CertificateIndex for BrokenIndex {
        async fn find_by_subject_name(
            &self,
            _subject: &str,
        ) -> pkd_core::Result<Option<CertificateRecord>> {
            Err(PkdError::Store("index offline".into()))
        }

        async fn find_by_role(&self, role: Role) -> pkd_core::Result<Vec<CertificateRecord>> {
            self.0.find_by_role(role).await
        }

        async fn find_by_fingerprint(
            &self,
            fp: &Fingerprint,
        ) -> pkd_core::Result<Option<CertificateRecord>> {
            self.0.find_by_fingerprint(fp).await
        }
    }

    #[async_trait]
    impl CertificateStore for BrokenIndex {
        async fn insert(&self, record: CertificateRecord) -> pkd_core::Result<InsertOutcome> {
            self.0.insert(record).await
        }

        async fn insert_revocation_list(
            &self,
            record: RevocationListRecord,
        ) -> pkd_core::Result<InsertOutcome> {
            self.0.insert_revocation_list(record).await
        }

        async fn update_outcome(
            &self,
            fp: &Fingerprint,
            outcome: ValidationOutcome,
        ) -> pkd_core::Result<()> {
            self.0.update_outcome(fp, outcome).await
        }
    }

    #[tokio::test]
    async fn processing_failure_is_contained() {
        let csca = test_support::csca("KR", "CSCA-KOREA");
        let first = test_support::dsc(&csca, "KR", "DS Korea 1");
        let second = test_support::dsc(&csca, "KR", "DS Korea 2");
        let store = Arc::new(BrokenIndex(MemoryStore::new()));
        let engine = ValidationEngine::new(store.clone()).with_clock(clock_at(2025, 6, 1));

        let report = run(
            &engine,
            &[parsed(&first.der, Role::Dsc), parsed(&second.der, Role::Dsc)],
        )
        .await;

        assert_eq!(report.dependents.items.len(), 2);
        for item in &report.dependents.items {
            let ItemOutcome::Failed { error, record, .. } = item else {
                panic!("expected failure, got {item:?}");
            };
            assert_eq!(error.code, ErrorCode::ProcessingFailed);
            let record = record.as_ref().expect("best-effort record stored");
            assert_eq!(record.status(), CertificateStatus::Invalid);
        }
        assert_eq!(store.0.len().await, 2);

        let mut summary = BundleSummary::new("upload-1");
        report.apply_to(&mut summary);
        assert_eq!(summary.processing_failures, 2);
        assert_eq!(summary.tally(Role::Dsc).invalid, 2);
    }

    #[tokio::test]
    async fn revalidate_replaces_stored_outcome() {
        let csca = test_support::csca("KR", "CSCA-KOREA");
        let dsc = test_support::dsc(&csca, "KR", "DS Korea");
        let store = Arc::new(MemoryStore::new());
        run(
            &engine(&store),
            &[parsed(&csca.der, Role::Csca), parsed(&dsc.der, Role::Dsc)],
        )
        .await;

        let later = ValidationEngine::new(store.clone()).with_clock(clock_at(2045, 1, 1));
        let fp = pkd_parser::fingerprint(&dsc.der);
        let outcome = later.revalidate(&fp).await.unwrap();
        assert_eq!(outcome.status, CertificateStatus::Expired);
        assert!(outcome.checks.signature_valid);

        let row = store.find_by_fingerprint(&fp).await.unwrap().unwrap();
        assert_eq!(row.outcome, outcome);

        let missing = Fingerprint::from_digest(&[0; 32]);
        assert!(matches!(
            later.revalidate(&missing).await,
            Err(EngineError::NotFound(_))
        ));
    }

    #[derive(Default)]
    struct Recorder(Mutex<Vec<ProgressEvent>>);

    impl ProgressSink for Recorder {
        fn notify(&self, event: ProgressEvent) {
            self.0.lock().unwrap().push(event);
        }
    }

    #[tokio::test]
    async fn progress_every_interval() {
        let cscas: Vec<_> = (0..4)
            .map(|i| test_support::csca("KR", &format!("CSCA {i}")))
            .collect();
        let records: Vec<_> = cscas.iter().map(|c| parsed(&c.der, Role::Csca)).collect();
        let store = Arc::new(MemoryStore::new());
        let engine = engine(&store).with_config(EngineConfig {
            progress_interval: 2,
            ..EngineConfig::default()
        });
        let recorder = Recorder::default();

        engine
            .run(&BatchContext::new("upload-1", &recorder), &records)
            .await;

        let events = recorder.0.lock().unwrap();
        let processed: Vec<_> = events.iter().map(|e| e.processed).collect();
        assert_eq!(processed, vec![2, 4]);
        assert!(events
            .iter()
            .all(|e| e.stage == Stage::ValidatingAuthorities && e.total == Some(4)));
    }

    #[tokio::test]
    async fn trust_path_through_engine() {
        let csca = test_support::csca("KR", "CSCA-KOREA");
        let dsc = test_support::dsc(&csca, "KR", "DS Korea");
        let store = Arc::new(MemoryStore::new());
        let engine = engine(&store);
        run(
            &engine,
            &[parsed(&csca.der, Role::Csca), parsed(&dsc.der, Role::Dsc)],
        )
        .await;

        let path = engine
            .trust_path(&pkd_parser::fingerprint(&dsc.der))
            .await
            .unwrap();
        assert!(path.fully_verified());
        assert_eq!(path.len(), 2);
    }
}
