//! Fixtures shared by this crate's unit tests.

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use pkd_core::{
    CertificateRecord, CertificateStore, MemoryStore, ParsedRecord, Provenance, RecordPayload,
    RecordPosition, Role, ValidationOutcome,
};
use pkd_parser::decode_lenient;

use crate::engine::FixedClock;

pub fn clock_at(year: i32, month: u32, day: u32) -> Arc<FixedClock> {
    Arc::new(FixedClock(
        Utc.with_ymd_and_hms(year, month, day, 0, 0, 0).unwrap(),
    ))
}

pub fn parsed(der: &[u8], role: Role) -> ParsedRecord {
    let cert = decode_lenient(der).unwrap();
    ParsedRecord {
        entry_name: format!("cn={},o={}", cert.summary().subject.dn, role),
        position: RecordPosition::Line(1),
        role,
        country: cert.summary().country(),
        payload: RecordPayload::Certificate(cert),
    }
}

pub fn record_for(der: &[u8], role: Role) -> CertificateRecord {
    let cert = decode_lenient(der).unwrap();
    CertificateRecord::from_certificate(
        &cert,
        role,
        ValidationOutcome::builder().finish(),
        None,
        Provenance::upload("fixture"),
    )
}

pub async fn stored(items: &[(&[u8], Role)]) -> MemoryStore {
    let store = MemoryStore::new();
    for (der, role) in items {
        store.insert(record_for(der, *role)).await.unwrap();
    }
    store
}
