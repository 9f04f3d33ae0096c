//! Shared helpers for pipeline integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use chrono::{TimeZone, Utc};
use pkd::{FixedClock, MemoryStore, Pipeline, PipelineConfig, ProgressEvent, ProgressSink};
use pkd_parser::test_support::{ldif_entry, Issued};

/// Pipeline over `store` pinned to 2025-06-01.
pub fn pipeline(store: &Arc<MemoryStore>) -> Pipeline<MemoryStore> {
    pipeline_with(store, PipelineConfig::default())
}

pub fn pipeline_with(store: &Arc<MemoryStore>, config: PipelineConfig) -> Pipeline<MemoryStore> {
    Pipeline::new(store.clone(), config).with_clock(Arc::new(FixedClock(
        Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap(),
    )))
}

/// LDIF document from pre-rendered entries.
pub fn ldif(entries: &[String]) -> Vec<u8> {
    let mut out = String::from("version: 1\n\n");
    for entry in entries {
        out.push_str(entry);
    }
    out.into_bytes()
}

pub fn csca_entry(country: &str, cert: &Issued) -> String {
    ldif_entry(
        &format!("cn={},o=csca,c={country},dc=data", pkd_parser::fingerprint(&cert.der).short()),
        "cACertificate;binary",
        &cert.der,
    )
}

pub fn dsc_entry(country: &str, cert: &Issued) -> String {
    ldif_entry(
        &format!("cn={},o=dsc,c={country},dc=data", pkd_parser::fingerprint(&cert.der).short()),
        "userCertificate;binary",
        &cert.der,
    )
}

pub fn crl_entry(country: &str, der: &[u8]) -> String {
    ldif_entry(
        &format!("cn=crl,o=crl,c={country},dc=data"),
        "certificateRevocationList;binary",
        der,
    )
}

/// Sink that keeps every event.
#[derive(Default)]
pub struct Recorder(Mutex<Vec<ProgressEvent>>);

impl Recorder {
    pub fn events(&self) -> Vec<ProgressEvent> {
        self.0.lock().unwrap().clone()
    }
}

impl ProgressSink for Recorder {
    fn notify(&self, event: ProgressEvent) {
        self.0.lock().unwrap().push(event);
    }
}
