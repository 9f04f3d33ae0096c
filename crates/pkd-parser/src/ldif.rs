//! LDIF envelope parser for ICAO PKD downloads.
//!
//! The input is processed line by line with a three-state machine:
//! `Idle` until a `dn:` line, `AccumulatingName` while the entry name is
//! (possibly) folded over continuation lines, `AccumulatingPayload` once a
//! binary certificate or CRL attribute starts. A blank line, a new `dn:` or
//! the end of input flushes the buffered entry.
//!
//! Per-entry failures never stop the parse; they are reported as
//! [`ParseIssue`]s next to the records that did decode.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use pkd_core::{
    NoopProgress, ParseIssue, ParseIssueCode, ParsedRecord, ProgressEvent, ProgressSink,
    ProgressTicker, RecordPayload, RecordPosition, Role, Stage,
};
use tracing::{debug, info, warn};

use crate::classify::classify;
use crate::decoder::{decode_lenient, decode_revocation_list};

/// Default number of records between progress events.
pub const DEFAULT_PROGRESS_INTERVAL: usize = 50;

/// Which binary attribute carried the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PayloadKind {
    Certificate,
    RevocationList,
}

impl PayloadKind {
    fn from_attribute(name: &str) -> Option<Self> {
        let name = name.trim().to_ascii_lowercase();
        let base = name.strip_suffix(";binary").unwrap_or(&name);
        match base {
            "usercertificate" | "cacertificate" => Some(Self::Certificate),
            "certificaterevocationlist" => Some(Self::RevocationList),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    AccumulatingName,
    AccumulatingPayload,
}

/// The field a continuation line extends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Name,
    Payload,
    Other,
}

#[derive(Debug, Default)]
struct Entry {
    name: String,
    name_base64: bool,
    line: usize,
    kind: Option<PayloadKind>,
    payload: String,
    poisoned: bool,
}

/// Result of parsing one LDIF stream.
#[derive(Debug, Default)]
pub struct LdifParse {
    /// Decoded records in input order
    pub records: Vec<ParsedRecord>,
    /// Per-entry problems
    pub issues: Vec<ParseIssue>,
    /// `dn:` lines seen
    pub entries: usize,
}

/// Streaming LDIF parser.
pub struct LdifParser<'a> {
    upload_id: &'a str,
    sink: &'a dyn ProgressSink,
    progress_interval: usize,
}

impl<'a> LdifParser<'a> {
    /// Parser reporting progress for `upload_id` to `sink`.
    pub fn new(upload_id: &'a str, sink: &'a dyn ProgressSink) -> Self {
        Self {
            upload_id,
            sink,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
        }
    }

    /// Records between progress events.
    #[must_use]
    pub const fn with_progress_interval(mut self, interval: usize) -> Self {
        self.progress_interval = interval;
        self
    }

    /// Parse a complete LDIF document.
    pub fn parse(&self, input: &[u8]) -> LdifParse {
        let total = count_entries(input);
        let mut run = Run {
            out: LdifParse::default(),
            ticker: ProgressTicker::new(self.progress_interval),
            total,
            parser: self,
        };

        let mut state = State::Idle;
        let mut field = Field::Other;
        let mut entry: Option<Entry> = None;

        for (idx, raw) in input.split(|b| *b == b'\n').enumerate() {
            let line_no = idx + 1;
            let raw = raw.strip_suffix(b"\r").unwrap_or(raw);

            if raw.is_empty() {
                if let Some(done) = entry.take() {
                    run.flush(done);
                }
                state = State::Idle;
                field = Field::Other;
                continue;
            }

            let Ok(line) = std::str::from_utf8(raw) else {
                run.issue(
                    ParseIssueCode::InvalidEncoding,
                    line_no,
                    "line is not valid UTF-8",
                );
                if let Some(e) = entry.as_mut() {
                    e.poisoned = true;
                }
                continue;
            };

            if let Some(rest) = line.strip_prefix(' ') {
                match (field, entry.as_mut()) {
                    (Field::Name, Some(e)) => e.name.push_str(rest),
                    (Field::Payload, Some(e)) => e.payload.push_str(rest),
                    _ => {}
                }
                continue;
            }
            if line.starts_with('#') {
                continue;
            }

            let Some((key, value)) = line.split_once(':') else {
                debug!(line = line_no, "ignoring line without attribute separator");
                field = Field::Other;
                continue;
            };
            let (value, is_base64) = match value.strip_prefix(':') {
                Some(b64) => (b64.trim(), true),
                None => (value.trim(), false),
            };

            if key.trim().eq_ignore_ascii_case("dn") {
                if let Some(done) = entry.take() {
                    run.flush(done);
                }
                run.out.entries += 1;
                entry = Some(Entry {
                    name: value.to_string(),
                    name_base64: is_base64,
                    line: line_no,
                    ..Entry::default()
                });
                state = State::AccumulatingName;
                field = Field::Name;
                continue;
            }

            if let Some(kind) = PayloadKind::from_attribute(key) {
                match (state, entry.as_mut()) {
                    (State::Idle, _) | (_, None) => {
                        run.issue(
                            ParseIssueCode::MissingName,
                            line_no,
                            "binary attribute outside of an entry",
                        );
                        field = Field::Other;
                    }
                    (_, Some(e)) => {
                        if e.kind.is_some() {
                            // multi-valued entry: emit what we have, keep the name
                            let name = e.name.clone();
                            let name_base64 = e.name_base64;
                            let line = e.line;
                            if let Some(done) = entry.take() {
                                run.flush(done);
                            }
                            entry = Some(Entry {
                                name,
                                name_base64,
                                line,
                                ..Entry::default()
                            });
                        }
                        if let Some(e) = entry.as_mut() {
                            e.kind = Some(kind);
                            e.payload = value.to_string();
                        }
                        state = State::AccumulatingPayload;
                        field = Field::Payload;
                    }
                }
                continue;
            }

            field = Field::Other;
        }

        if let Some(done) = entry.take() {
            run.flush(done);
        }

        let out = run.out;
        info!(
            upload_id = %self.upload_id,
            entries = out.entries,
            records = out.records.len(),
            issues = out.issues.len(),
            "LDIF parse complete"
        );
        out
    }
}

/// Per-call mutable state.
struct Run<'p, 'a> {
    out: LdifParse,
    ticker: ProgressTicker,
    total: usize,
    parser: &'p LdifParser<'a>,
}

impl Run<'_, '_> {
    fn issue(&mut self, code: ParseIssueCode, line: usize, message: impl Into<String>) {
        let issue = ParseIssue::new(code, RecordPosition::Line(line), message);
        warn!(code = code.as_str(), line, message = %issue.message, "LDIF entry skipped");
        self.out.issues.push(issue);
    }

    fn flush(&mut self, entry: Entry) {
        let Some(kind) = entry.kind else {
            return;
        };
        if entry.poisoned {
            return;
        }
        if entry.payload.is_empty() {
            return;
        }

        let name = if entry.name_base64 {
            match decode_base64(&entry.name).map(String::from_utf8) {
                Ok(Ok(name)) => name,
                Ok(Err(_)) => {
                    self.issue(
                        ParseIssueCode::InvalidEncoding,
                        entry.line,
                        "entry name is not valid UTF-8",
                    );
                    return;
                }
                Err(e) => {
                    self.issue(
                        ParseIssueCode::InvalidBase64,
                        entry.line,
                        format!("entry name: {e}"),
                    );
                    return;
                }
            }
        } else {
            entry.name
        };
        if name.trim().is_empty() {
            self.issue(ParseIssueCode::MissingName, entry.line, "empty entry name");
            return;
        }

        let bytes = match decode_base64(&entry.payload) {
            Ok(bytes) => bytes,
            Err(e) => {
                self.issue(ParseIssueCode::InvalidBase64, entry.line, e.to_string());
                return;
            }
        };

        let record = match kind {
            PayloadKind::Certificate => match decode_lenient(&bytes) {
                Ok(cert) => {
                    let summary = cert.summary();
                    let role = classify(&summary.subject.dn, Some(&name));
                    let country = summary
                        .subject
                        .country
                        .clone()
                        .or_else(|| country_from_entry_name(&name))
                        .or_else(|| summary.issuer.country.clone());
                    ParsedRecord {
                        entry_name: name,
                        position: RecordPosition::Line(entry.line),
                        role,
                        country,
                        payload: RecordPayload::Certificate(cert),
                    }
                }
                Err(e) => {
                    self.issue(ParseIssueCode::CertificateDecode, entry.line, e.to_string());
                    return;
                }
            },
            PayloadKind::RevocationList => match decode_revocation_list(&bytes) {
                Ok(list) => {
                    let country = list
                        .issuer
                        .country
                        .clone()
                        .or_else(|| country_from_entry_name(&name));
                    ParsedRecord {
                        entry_name: name,
                        position: RecordPosition::Line(entry.line),
                        role: Role::Unknown,
                        country,
                        payload: RecordPayload::RevocationList(list),
                    }
                }
                Err(e) => {
                    self.issue(
                        ParseIssueCode::RevocationListDecode,
                        entry.line,
                        e.to_string(),
                    );
                    return;
                }
            },
        };

        debug!(
            line = entry.line,
            fingerprint = %record.fingerprint().short(),
            role = %record.role,
            "LDIF record decoded"
        );
        self.out.records.push(record);

        if let Some(processed) = self.ticker.tick() {
            self.parser.sink.notify(ProgressEvent::new(
                self.parser.upload_id,
                Stage::Parsing,
                processed,
                Some(self.total),
            ));
        }
    }
}

/// Parse with default settings and no progress reporting.
pub fn parse_ldif(input: &[u8]) -> LdifParse {
    LdifParser::new("", &NoopProgress).parse(input)
}

fn decode_base64(value: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let compact: String = value.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    STANDARD.decode(compact)
}

/// `C=` component of an entry name.
fn country_from_entry_name(name: &str) -> Option<String> {
    name.split(',').find_map(|part| {
        let (key, value) = part.split_once('=')?;
        key.trim()
            .eq_ignore_ascii_case("c")
            .then(|| value.trim().to_ascii_uppercase())
            .filter(|c| !c.is_empty())
    })
}

/// Number of `dn:` lines, used as the progress total.
fn count_entries(input: &[u8]) -> usize {
    input
        .split(|b| *b == b'\n')
        .filter(|line| line.len() >= 3 && line[..3].eq_ignore_ascii_case(b"dn:"))
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::fingerprint;
    use crate::test_support::{self, ldif_entry};
    use pkd_core::RecordKind;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<ProgressEvent>>);

    impl ProgressSink for Recorder {
        fn notify(&self, event: ProgressEvent) {
            self.0.lock().unwrap().push(event);
        }
    }

    #[test]
    fn parses_csca_and_dsc_entries() {
        let csca = test_support::csca("KR", "CSCA-KOREA");
        let dsc = test_support::dsc(&csca, "KR", "DS Korea");
        let ldif = format!(
            "version: 1\n\n{}{}",
            ldif_entry(
                "cn=CSCA-KOREA,o=csca,c=KR,dc=data,dc=download,dc=pkd,dc=icao,dc=int",
                "cACertificate;binary",
                &csca.der
            ),
            ldif_entry(
                "cn=DS Korea,o=dsc,c=KR,dc=data,dc=download,dc=pkd,dc=icao,dc=int",
                "userCertificate;binary",
                &dsc.der
            ),
        );

        let parsed = parse_ldif(ldif.as_bytes());
        assert!(parsed.issues.is_empty(), "{:?}", parsed.issues);
        assert_eq!(parsed.records.len(), 2);
        assert_eq!(parsed.records[0].role, Role::Csca);
        assert_eq!(parsed.records[1].role, Role::Dsc);
        assert_eq!(parsed.records[1].country.as_deref(), Some("KR"));
        assert_eq!(parsed.records[0].raw(), csca.der.as_slice());
        assert_eq!(parsed.records[0].position, RecordPosition::Line(3));
    }

    #[test]
    fn payload_folded_over_three_continuation_lines() {
        let csca = test_support::csca("SE", "CSCA Sweden");
        let b64 = STANDARD.encode(&csca.der);
        let chunk = b64.len() / 4 + 1;
        let pieces: Vec<&str> = b64
            .as_bytes()
            .chunks(chunk)
            .map(|c| std::str::from_utf8(c).unwrap())
            .collect();
        assert_eq!(pieces.len(), 4);

        let ldif = format!(
            "dn: cn=CSCA Sweden,o=csca,c=SE,dc=data\r\nuserCertificate;binary:: {}\r\n {}\r\n {}\r\n {}\r\n",
            pieces[0], pieces[1], pieces[2], pieces[3]
        );
        let parsed = parse_ldif(ldif.as_bytes());

        assert_eq!(parsed.records.len(), 1);
        assert_eq!(parsed.records[0].raw(), csca.der.as_slice());
        assert_eq!(parsed.records[0].fingerprint(), &fingerprint(&csca.der));
    }

    #[test]
    fn folded_and_base64_entry_names() {
        let csca = test_support::csca("PL", "CSCA Poland");
        let name = "cn=CSCA Poland,o=csca,c=PL,dc=data";
        let encoded = STANDARD.encode(name);
        let ldif = format!(
            "dn:: {encoded}\n{}\ndn: cn=CSCA Poland,o=cs\n ca,c=PL,dc=data\n{}",
            attr_block("cACertificate;binary", &csca.der),
            attr_block("cACertificate;binary", &csca.der),
        );

        let parsed = parse_ldif(ldif.as_bytes());
        assert_eq!(parsed.records.len(), 2);
        assert_eq!(parsed.records[0].entry_name, name);
        assert_eq!(parsed.records[1].entry_name, name);
        assert!(parsed.records.iter().all(|r| r.role == Role::Csca));
    }

    fn attr_block(attr: &str, der: &[u8]) -> String {
        format!("{attr}:: {}\n", STANDARD.encode(der))
    }

    #[test]
    fn bad_records_become_issues_and_parsing_continues() {
        let csca = test_support::csca("CZ", "CSCA CZ");
        let ldif = format!(
            "dn: cn=broken,o=dsc,c=CZ\nuserCertificate;binary:: !!!notbase64!!!\n\n\
             dn: cn=garbage,o=dsc,c=CZ\nuserCertificate;binary:: {}\n\n\
             userCertificate;binary:: {}\n\n{}",
            STANDARD.encode([0x30, 0x03, 0x02, 0x01, 0x01]),
            STANDARD.encode(&csca.der),
            ldif_entry("cn=CSCA CZ,o=csca,c=CZ", "cACertificate;binary", &csca.der),
        );

        let parsed = parse_ldif(ldif.as_bytes());
        let codes: Vec<_> = parsed.issues.iter().map(|i| i.code).collect();
        assert_eq!(
            codes,
            vec![
                ParseIssueCode::InvalidBase64,
                ParseIssueCode::CertificateDecode,
                ParseIssueCode::MissingName,
            ]
        );
        assert_eq!(parsed.issues[0].position, RecordPosition::Line(1));
        assert_eq!(parsed.records.len(), 1);
        assert_eq!(parsed.records[0].role, Role::Csca);
    }

    #[test]
    fn final_entry_without_blank_line_is_emitted() {
        let csca = test_support::csca("PT", "CSCA PT");
        let ldif = format!(
            "# comment line\ndn: cn=CSCA PT,o=csca,c=PT\nobjectClass: top\ncACertificate;binary:: {}",
            STANDARD.encode(&csca.der)
        );
        let parsed = parse_ldif(ldif.as_bytes());
        assert_eq!(parsed.records.len(), 1);
        assert_eq!(parsed.entries, 1);
    }

    #[test]
    fn crl_entries_decode_as_revocation_lists() {
        let csca = test_support::csca("DE", "CSCA-GERMANY");
        let crl = test_support::crl(&csca, &[5]);
        let ldif = ldif_entry(
            "cn=CSCA-GERMANY,o=crl,c=DE,dc=data",
            "certificateRevocationList;binary",
            &crl,
        );
        let parsed = parse_ldif(ldif.as_bytes());

        assert_eq!(parsed.records.len(), 1);
        assert_eq!(parsed.records[0].kind(), RecordKind::RevocationList);
        assert_eq!(parsed.records[0].country.as_deref(), Some("DE"));
        assert_eq!(
            parsed.records[0].revocation_list().unwrap().revoked_serials,
            vec!["05".to_string()]
        );
    }

    #[test]
    fn country_falls_back_to_entry_name() {
        assert_eq!(
            country_from_entry_name("cn=x,o=dsc,c=kr,dc=data"),
            Some("KR".to_string())
        );
        assert_eq!(country_from_entry_name("cn=x,dc=data"), None);
    }

    #[test]
    fn progress_every_interval_records() {
        let csca = test_support::csca("GR", "CSCA GR");
        let entry = ldif_entry("cn=CSCA GR,o=csca,c=GR", "cACertificate;binary", &csca.der);
        let ldif = entry.repeat(5);

        let recorder = Recorder::default();
        let parsed = LdifParser::new("up-1", &recorder)
            .with_progress_interval(2)
            .parse(ldif.as_bytes());
        assert_eq!(parsed.records.len(), 5);

        let events = recorder.0.lock().unwrap();
        let processed: Vec<_> = events.iter().map(|e| e.processed).collect();
        assert_eq!(processed, vec![2, 4]);
        assert!(events.iter().all(|e| e.total == Some(5) && e.upload_id == "up-1"));
    }

    #[test]
    fn invalid_utf8_poisons_the_entry() {
        let csca = test_support::csca("HU", "CSCA HU");
        let mut ldif = b"dn: cn=x,o=dsc,c=HU\nuserCertificate;binary:: ".to_vec();
        ldif.extend_from_slice(STANDARD.encode(&csca.der).as_bytes());
        ldif.extend_from_slice(b"\n \xff\xfe\n\n");

        let parsed = parse_ldif(&ldif);
        assert!(parsed.records.is_empty());
        assert_eq!(parsed.issues[0].code, ParseIssueCode::InvalidEncoding);
        assert_eq!(parsed.issues[0].position, RecordPosition::Line(3));
    }
}
