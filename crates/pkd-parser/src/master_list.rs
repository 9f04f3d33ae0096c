//! CSCA Master List parser.
//!
//! A Master List is a CMS `SignedData` whose encapsulated content is
//!
//! ```text
//! CscaMasterList ::= SEQUENCE {
//!     version  INTEGER OPTIONAL,
//!     certList SET OF Certificate }
//! ```
//!
//! Every structural check is a hard gate: a container that fails one is
//! rejected as a whole and yields no records. Once the envelope is
//! trusted, individual members that fail to decode or are already known to
//! the store only produce [`ParseIssue`]s.

use cms::cert::CertificateChoices;
use cms::content_info::ContentInfo;
use cms::signed_data::{SignedData, SignerIdentifier, SignerInfo};
use der::asn1::{AnyRef, OctetString};
use der::{Decode, Encode, Reader, SliceReader, Tag, Tagged};
use pkd_core::{
    ExistenceOracle, Fingerprint, ParseIssue, ParseIssueCode, ParsedRecord, RecordPayload,
    RecordPosition, Role,
};
use tracing::{debug, error, info, instrument, warn};
use x509_cert::ext::pkix::SubjectKeyIdentifier;
use x509_cert::Certificate;

use crate::anchor::TrustAnchor;
use crate::decoder::{decode_lenient, fingerprint};
use crate::error::ContainerError;
use crate::oids;
use crate::signature::{self, verify_certificate_signature, HashAlgorithm};

/// Smallest byte length accepted as a container.
pub const DEFAULT_MIN_CONTAINER_LEN: usize = 100;

/// Who signed a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignerSummary {
    /// Subject of the (first) signer certificate
    pub subject: String,
    /// Fingerprint of the (first) signer certificate
    pub fingerprint: Fingerprint,
    /// Number of `SignerInfo`s, all verified
    pub signer_count: usize,
    /// Whether the signer was checked against a configured trust anchor
    pub anchored: bool,
}

/// Result of parsing one Master List.
#[derive(Debug, Clone)]
pub struct ContainerParse {
    /// Fingerprint of the whole container
    pub container_id: Fingerprint,
    /// New certificates, in set order
    pub records: Vec<ParsedRecord>,
    /// Members skipped as duplicates or undecodable
    pub issues: Vec<ParseIssue>,
    /// Signer of the envelope
    pub signer: SignerSummary,
    /// Members in the certificate set
    pub members: usize,
}

/// An embedded certificate with its DER encoding.
struct Embedded {
    cert: Certificate,
    der: Vec<u8>,
}

/// Parser for signed CSCA Master Lists.
pub struct MasterListParser<'a, O: ExistenceOracle + ?Sized> {
    oracle: &'a O,
    anchor: Option<&'a TrustAnchor>,
    allow_unanchored: bool,
    min_len: usize,
}

impl<'a, O: ExistenceOracle + ?Sized> MasterListParser<'a, O> {
    /// Parser consulting `oracle` for already-stored certificates.
    ///
    /// Containers are refused with [`ContainerError::NoTrustAnchor`] until
    /// an anchor is set or [`allow_unanchored`](Self::allow_unanchored) is
    /// turned on.
    pub const fn new(oracle: &'a O) -> Self {
        Self {
            oracle,
            anchor: None,
            allow_unanchored: false,
            min_len: DEFAULT_MIN_CONTAINER_LEN,
        }
    }

    /// Require signers to chain to `anchor`.
    #[must_use]
    pub const fn with_anchor(mut self, anchor: Option<&'a TrustAnchor>) -> Self {
        self.anchor = anchor;
        self
    }

    /// Accept containers whose signature verifies under an embedded
    /// certificate when no anchor is set.
    #[must_use]
    pub const fn allow_unanchored(mut self, allow: bool) -> Self {
        self.allow_unanchored = allow;
        self
    }

    /// Override the minimum container length.
    #[must_use]
    pub const fn with_min_len(mut self, min_len: usize) -> Self {
        self.min_len = min_len;
        self
    }

    /// Verify and unpack a Master List.
    #[instrument(skip_all, fields(len = bytes.len()))]
    pub async fn parse(&self, bytes: &[u8]) -> Result<ContainerParse, ContainerError> {
        match self.parse_inner(bytes).await {
            Ok(parsed) => {
                info!(
                    container = %parsed.container_id.short(),
                    members = parsed.members,
                    records = parsed.records.len(),
                    skipped = parsed.issues.len(),
                    signer = %parsed.signer.subject,
                    "master list parsed"
                );
                Ok(parsed)
            }
            Err(e) => {
                error!(error = %e, "master list rejected");
                Err(e)
            }
        }
    }

    async fn parse_inner(&self, bytes: &[u8]) -> Result<ContainerParse, ContainerError> {
        check_magic(bytes, self.min_len)?;

        let signed = open_envelope(bytes)?;
        let payload = encapsulated_content(&signed)?;
        let embedded = embedded_certificates(&signed)?;

        let signer_infos: Vec<&SignerInfo> = signed.signer_infos.0.iter().collect();
        if signer_infos.is_empty() {
            return Err(ContainerError::SignatureInvalid("no signer infos".into()));
        }
        let mut signers = Vec::with_capacity(signer_infos.len());
        for info in &signer_infos {
            let signer = verify_signer(info, payload, &embedded)
                .map_err(ContainerError::SignatureInvalid)?;
            signers.push(signer);
        }

        match self.anchor {
            Some(anchor) => {
                for signer in &signers {
                    if !anchored(anchor, signer, &embedded) {
                        return Err(ContainerError::UntrustedSigner(
                            signer.cert.tbs_certificate.subject.to_string(),
                        ));
                    }
                }
            }
            None if self.allow_unanchored => {
                warn!("no trust anchor configured, accepting self-asserted signer");
            }
            None => return Err(ContainerError::NoTrustAnchor),
        }

        let first = &signers[0];
        let signer = SignerSummary {
            subject: first.cert.tbs_certificate.subject.to_string(),
            fingerprint: fingerprint(&first.der),
            signer_count: signers.len(),
            anchored: self.anchor.is_some(),
        };

        let members = certificate_set(payload)?;
        let mut records = Vec::new();
        let mut issues = Vec::new();

        for (idx, der) in members.iter().enumerate() {
            let position = RecordPosition::SetIndex(idx);
            let cert = match decode_lenient(der) {
                Ok(cert) => cert,
                Err(e) => {
                    warn!(index = idx, error = %e, "master list member undecodable");
                    issues.push(ParseIssue::new(
                        ParseIssueCode::CertificateDecode,
                        position,
                        e.to_string(),
                    ));
                    continue;
                }
            };

            let fp = cert.fingerprint().clone();
            if self.oracle.exists_by_fingerprint(&fp).await? {
                debug!(index = idx, fingerprint = %fp.short(), "member already stored");
                issues.push(ParseIssue::new(
                    ParseIssueCode::DuplicateSkipped,
                    position,
                    format!("certificate {fp} already stored"),
                ));
                continue;
            }

            let summary = cert.summary();
            let country = summary
                .subject
                .country
                .clone()
                .or_else(|| summary.issuer.country.clone());
            records.push(ParsedRecord {
                entry_name: String::new(),
                position,
                role: Role::Csca,
                country,
                payload: RecordPayload::Certificate(cert),
            });
        }

        Ok(ContainerParse {
            container_id: fingerprint(bytes),
            records,
            issues,
            signer,
            members: members.len(),
        })
    }
}

fn check_magic(bytes: &[u8], min_len: usize) -> Result<(), ContainerError> {
    match bytes.first() {
        None => Err(ContainerError::TooSmall {
            len: 0,
            min: min_len,
        }),
        Some(&b) if b != 0x30 => Err(ContainerError::BadMagic(b)),
        Some(_) if bytes.len() < min_len => Err(ContainerError::TooSmall {
            len: bytes.len(),
            min: min_len,
        }),
        Some(_) => Ok(()),
    }
}

fn open_envelope(bytes: &[u8]) -> Result<SignedData, ContainerError> {
    let info = ContentInfo::from_der(bytes)
        .map_err(|e| ContainerError::Envelope(format!("ContentInfo: {e}")))?;
    if info.content_type != oids::SIGNED_DATA {
        return Err(ContainerError::Envelope(format!(
            "content type {} is not signedData",
            info.content_type
        )));
    }
    info.content
        .decode_as::<SignedData>()
        .map_err(|e| ContainerError::Envelope(format!("SignedData: {e}")))
}

fn encapsulated_content(signed: &SignedData) -> Result<&[u8], ContainerError> {
    let encap = &signed.encap_content_info;
    if encap.econtent_type != oids::CSCA_MASTER_LIST {
        warn!(content_type = %encap.econtent_type, "unexpected encapsulated content type");
    }
    let content = encap
        .econtent
        .as_ref()
        .ok_or_else(|| ContainerError::Envelope("detached content".into()))?;
    if content.tag() != Tag::OctetString {
        return Err(ContainerError::Envelope(format!(
            "encapsulated content tagged {}, expected OCTET STRING",
            content.tag()
        )));
    }
    Ok(content.value())
}

fn embedded_certificates(signed: &SignedData) -> Result<Vec<Embedded>, ContainerError> {
    let Some(set) = &signed.certificates else {
        return Ok(Vec::new());
    };
    set.0
        .iter()
        .filter_map(|choice| match choice {
            CertificateChoices::Certificate(cert) => Some(cert),
            CertificateChoices::Other(_) => None,
        })
        .map(|cert| {
            let der = cert
                .to_der()
                .map_err(|e| ContainerError::Envelope(format!("embedded certificate: {e}")))?;
            Ok(Embedded {
                cert: cert.clone(),
                der,
            })
        })
        .collect()
}

/// Find the certificate a `SignerInfo` points at.
fn find_signer<'e>(sid: &SignerIdentifier, embedded: &'e [Embedded]) -> Option<&'e Embedded> {
    embedded.iter().find(|e| {
        let tbs = &e.cert.tbs_certificate;
        match sid {
            SignerIdentifier::IssuerAndSerialNumber(ias) => {
                tbs.issuer == ias.issuer && tbs.serial_number == ias.serial_number
            }
            SignerIdentifier::SubjectKeyIdentifier(ski) => tbs
                .extensions
                .iter()
                .flatten()
                .filter(|ext| ext.extn_id == oids::SUBJECT_KEY_IDENTIFIER)
                .filter_map(|ext| SubjectKeyIdentifier::from_der(ext.extn_value.as_bytes()).ok())
                .any(|own| own.0 == ski.0),
        }
    })
}

/// Verify one `SignerInfo`; returns the signer certificate.
fn verify_signer<'e>(
    info: &SignerInfo,
    payload: &[u8],
    embedded: &'e [Embedded],
) -> Result<&'e Embedded, String> {
    let signer = find_signer(&info.sid, embedded)
        .ok_or_else(|| "signer certificate not embedded".to_string())?;
    let spki = signer
        .cert
        .tbs_certificate
        .subject_public_key_info
        .to_der()
        .map_err(|e| format!("signer key: {e}"))?;

    let message = match &info.signed_attrs {
        Some(attrs) => {
            let hash = HashAlgorithm::from_oid(&info.digest_alg.oid)
                .ok_or_else(|| format!("unsupported digest {}", info.digest_alg.oid))?;
            let claimed = attrs
                .iter()
                .find(|a| a.oid == oids::MESSAGE_DIGEST)
                .and_then(|a| a.values.iter().next())
                .ok_or_else(|| "signed attributes lack messageDigest".to_string())?
                .decode_as::<OctetString>()
                .map_err(|e| format!("messageDigest: {e}"))?;
            if claimed.as_bytes() != hash.digest(payload).as_slice() {
                return Err("messageDigest does not match content".into());
            }
            attrs.to_der().map_err(|e| format!("signed attributes: {e}"))?
        }
        None => payload.to_vec(),
    };

    signature::verify(
        &spki,
        &info.signature_algorithm,
        Some(&info.digest_alg),
        &message,
        info.signature.as_bytes(),
    )
    .map_err(|e| format!("{}: {e}", signer.cert.tbs_certificate.subject))?;

    Ok(signer)
}

/// Whether a verified signer chains to the anchor, directly or through one
/// embedded certificate the anchor vouches for.
fn anchored(anchor: &TrustAnchor, signer: &Embedded, embedded: &[Embedded]) -> bool {
    if anchor.vouches_for(&signer.der) {
        return true;
    }
    embedded
        .iter()
        .filter(|e| e.der != signer.der && anchor.vouches_for(&e.der))
        .filter_map(|e| e.cert.tbs_certificate.subject_public_key_info.to_der().ok())
        .any(|spki| verify_certificate_signature(&signer.der, &spki).is_ok())
}

/// Members of the `certList` SET, as raw DER.
fn certificate_set(payload: &[u8]) -> Result<Vec<&[u8]>, ContainerError> {
    let invalid = |msg: String| ContainerError::StructureInvalid(msg);

    let outer = AnyRef::from_der(payload).map_err(|e| invalid(e.to_string()))?;
    if outer.tag() != Tag::Sequence {
        return Err(invalid(format!("content tagged {}, expected SEQUENCE", outer.tag())));
    }

    let mut reader = SliceReader::new(outer.value()).map_err(|e| invalid(e.to_string()))?;
    let mut elements = Vec::new();
    while !reader.is_finished() {
        let tlv = reader.tlv_bytes().map_err(|e| invalid(e.to_string()))?;
        elements.push(tlv);
    }
    if !(1..=2).contains(&elements.len()) {
        return Err(invalid(format!(
            "{} top-level elements, expected 1 or 2",
            elements.len()
        )));
    }

    let last = elements[elements.len() - 1];
    let set = AnyRef::from_der(last).map_err(|e| invalid(e.to_string()))?;
    if set.tag() != Tag::Set {
        return Err(invalid(format!("last element tagged {}, expected SET", set.tag())));
    }

    let mut reader = SliceReader::new(set.value()).map_err(|e| invalid(e.to_string()))?;
    let mut members = Vec::new();
    while !reader.is_finished() {
        members.push(reader.tlv_bytes().map_err(|e| invalid(e.to_string()))?);
    }
    Ok(members)
}
