//! Bundle processing: parse, store revocation lists, validate, summarize.

use std::sync::Arc;
use std::time::Instant;

use pkd_core::{
    BundleSummary, CertificateStore, Fingerprint, InsertOutcome, ParseIssue, ParsedRecord,
    ProgressEvent, ProgressSink, Provenance, RevocationListRecord, Stage,
};
use pkd_parser::{LdifParser, MasterListParser, TrustAnchor};
use pkd_validation::{BatchContext, Clock, RevocationChecker, SystemClock, ValidationEngine};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};

use crate::config::PipelineConfig;
use crate::error::Result;
use crate::progress::TracingProgress;

/// Bundle encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BundleFormat {
    /// LDIF download
    Ldif,
    /// CMS-signed CSCA Master List
    MasterList,
}

impl BundleFormat {
    /// Sniff the format: a leading DER SEQUENCE tag means a Master List.
    #[must_use]
    pub fn detect(bytes: &[u8]) -> Self {
        match bytes.first() {
            Some(0x30) => Self::MasterList,
            _ => Self::Ldif,
        }
    }
}

/// One uploaded bundle.
#[derive(Debug, Clone)]
pub struct Upload {
    /// Caller-chosen identifier, carried into provenance and progress
    pub id: String,
    /// Encoding of `bytes`
    pub format: BundleFormat,
    /// Raw bundle
    pub bytes: Vec<u8>,
}

impl Upload {
    /// Upload with an explicit format.
    #[must_use]
    pub fn new(id: impl Into<String>, format: BundleFormat, bytes: Vec<u8>) -> Self {
        Self {
            id: id.into(),
            format,
            bytes,
        }
    }

    /// Upload whose format is sniffed from the bytes.
    #[must_use]
    pub fn detect(id: impl Into<String>, bytes: Vec<u8>) -> Self {
        let format = BundleFormat::detect(&bytes);
        Self::new(id, format, bytes)
    }
}

struct Parsed {
    records: Vec<ParsedRecord>,
    issues: Vec<ParseIssue>,
    container_id: Option<Fingerprint>,
}

/// Processes uploads against one store.
pub struct Pipeline<S: CertificateStore + 'static> {
    store: Arc<S>,
    engine: ValidationEngine,
    anchor: Option<TrustAnchor>,
    sink: Arc<dyn ProgressSink>,
    clock: Arc<dyn Clock>,
    config: PipelineConfig,
}

impl<S: CertificateStore + 'static> Pipeline<S> {
    /// Pipeline without a trust anchor, logging progress through `tracing`.
    #[must_use]
    pub fn new(store: Arc<S>, config: PipelineConfig) -> Self {
        let engine = ValidationEngine::new(store.clone()).with_config(config.engine());
        Self {
            store,
            engine,
            anchor: None,
            sink: Arc::new(TracingProgress),
            clock: Arc::new(SystemClock),
            config,
        }
    }

    /// Pipeline with the trust anchor named in `config`, if any.
    #[instrument(skip_all)]
    pub async fn from_config(store: Arc<S>, config: PipelineConfig) -> Result<Self> {
        let anchor = match &config.trust_anchor_path {
            Some(path) => Some(TrustAnchor::load(path).await?),
            None => None,
        };
        let mut pipeline = Self::new(store, config);
        pipeline.anchor = anchor;
        Ok(pipeline)
    }

    /// Require Master List signers to chain to `anchor`.
    #[must_use]
    pub fn with_anchor(mut self, anchor: TrustAnchor) -> Self {
        self.anchor = Some(anchor);
        self
    }

    /// Replace the progress sink.
    #[must_use]
    pub fn with_progress(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Replace the revocation checker.
    #[must_use]
    pub fn with_revocation(mut self, revocation: Arc<dyn RevocationChecker>) -> Self {
        self.engine = self.engine.with_revocation(revocation);
        self
    }

    /// Replace the clock used for validity and CRL staleness.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.engine = self.engine.with_clock(clock.clone());
        self.clock = clock;
        self
    }

    /// The underlying store.
    #[must_use]
    pub const fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// The validation engine, for re-validation and trust paths.
    #[must_use]
    pub const fn engine(&self) -> &ValidationEngine {
        &self.engine
    }

    /// Current configuration.
    #[must_use]
    pub const fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Parse, validate and store one upload.
    ///
    /// Only structural failures of the bundle are errors. Everything that
    /// goes wrong with a single record is reported in the summary.
    #[instrument(
        skip_all,
        fields(upload_id = %upload.id, format = ?upload.format, len = upload.bytes.len())
    )]
    pub async fn process(&self, upload: Upload) -> Result<BundleSummary> {
        let started = Instant::now();
        self.notify(ProgressEvent::new(&upload.id, Stage::Parsing, 0, None));

        let parsed = match self.parse(&upload).await {
            Ok(parsed) => parsed,
            Err(e) => {
                error!(error = %e, "bundle rejected");
                self.notify(
                    ProgressEvent::new(&upload.id, Stage::Failed, 0, None)
                        .with_message(e.to_string()),
                );
                return Err(e);
            }
        };

        let mut summary = BundleSummary::new(&upload.id);
        summary.records_parsed = parsed.records.len();
        summary.parse_issues = parsed.issues;
        self.notify(ProgressEvent::new(
            &upload.id,
            Stage::Parsing,
            summary.records_parsed,
            Some(summary.records_parsed),
        ));

        summary.revocation_lists_stored = self
            .store_revocation_lists(&upload.id, parsed.container_id.as_ref(), &parsed.records)
            .await;

        let ctx = BatchContext::new(&upload.id, self.sink.as_ref())
            .with_container(parsed.container_id.as_ref());
        let report = self.engine.run(&ctx, &parsed.records).await;
        report.apply_to(&mut summary);

        summary.duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.notify(
            ProgressEvent::new(
                &upload.id,
                Stage::Completed,
                summary.certificates_validated(),
                Some(summary.records_parsed),
            )
            .with_message(format!(
                "{} stored, {} valid, {} invalid",
                summary.certificates_stored,
                summary.total_valid(),
                summary.total_invalid()
            )),
        );
        info!(
            records = summary.records_parsed,
            stored = summary.certificates_stored,
            crls = summary.revocation_lists_stored,
            duplicates = summary.duplicates_skipped + summary.duplicates_in_batch,
            failures = summary.processing_failures,
            parse_issues = summary.parse_issues.len(),
            duration_ms = summary.duration_ms,
            "bundle processed"
        );
        Ok(summary)
    }

    async fn parse(&self, upload: &Upload) -> Result<Parsed> {
        match upload.format {
            BundleFormat::Ldif => {
                let parse = LdifParser::new(&upload.id, self.sink.as_ref())
                    .with_progress_interval(self.config.progress_interval)
                    .parse(&upload.bytes);
                debug!(entries = parse.entries, records = parse.records.len(), "ldif parsed");
                Ok(Parsed {
                    records: parse.records,
                    issues: parse.issues,
                    container_id: None,
                })
            }
            BundleFormat::MasterList => {
                let parse = MasterListParser::new(self.store.as_ref())
                    .with_anchor(self.anchor.as_ref())
                    .allow_unanchored(self.config.allow_unanchored_master_lists)
                    .with_min_len(self.config.min_container_len)
                    .parse(&upload.bytes)
                    .await?;
                Ok(Parsed {
                    records: parse.records,
                    issues: parse.issues,
                    container_id: Some(parse.container_id),
                })
            }
        }
    }

    /// Store every revocation list in `records`. Returns how many were new.
    async fn store_revocation_lists(
        &self,
        upload_id: &str,
        container_id: Option<&Fingerprint>,
        records: &[ParsedRecord],
    ) -> usize {
        let now = self.clock.now();
        let mut stored = 0;
        for record in records {
            let Some(list) = record.revocation_list() else {
                continue;
            };
            let provenance = Provenance {
                upload_id: upload_id.to_string(),
                container_id: container_id.cloned(),
                entry_name: (!record.entry_name.is_empty()).then(|| record.entry_name.clone()),
            };
            let row =
                RevocationListRecord::from_decoded(list, record.country.clone(), provenance, now);
            match self.store.insert_revocation_list(row).await {
                Ok(InsertOutcome::Inserted) => stored += 1,
                Ok(InsertOutcome::Duplicate) => {
                    debug!(
                        fingerprint = %list.fingerprint.short(),
                        "revocation list already stored"
                    );
                }
                Err(e) => {
                    warn!(
                        fingerprint = %list.fingerprint.short(),
                        error = %e,
                        "revocation list not stored"
                    );
                }
            }
        }
        stored
    }

    fn notify(&self, event: ProgressEvent) {
        self.sink.notify(event);
    }
}
