//! Partial certificate decoding straight from the raw TBS structure.
//!
//! Used when the primary decoder rejects a certificate (duplicated or
//! malformed extensions are common in national feeds). Only the fields the
//! store indexes on are recovered: serial, names, validity, public key and
//! the basic constraints `cA` flag.

use chrono::{DateTime, TimeZone, Utc};
use der::asn1::{AnyRef, BitStringRef};
use der::{Decode, Header, Reader, SliceReader, Tag, TagNumber, Tagged};
use pkd_core::{CertificateSummary, DistinguishedName, PartialCertificate};
use x509_cert::ext::pkix::BasicConstraints;
use x509_cert::ext::Extension;
use x509_cert::name::Name;
use x509_cert::spki::AlgorithmIdentifierOwned;
use x509_cert::time::{Time, Validity};
use x509_parser::prelude::FromDer;
use x509_parser::x509::X509Name;

use crate::decoder::{convert_name, fingerprint};
use crate::error::DecodeError;
use crate::oids;

/// The three top-level parts of a certificate, borrowed from the input.
#[derive(Debug)]
pub struct CertificateParts<'a> {
    /// Complete `tbsCertificate` TLV, exactly as signed
    pub tbs: &'a [u8],
    /// Outer `signatureAlgorithm`
    pub signature_algorithm: AlgorithmIdentifierOwned,
    /// `signatureValue` bit string contents
    pub signature: &'a [u8],
}

/// Split a certificate into TBS bytes, algorithm and signature without
/// re-encoding anything.
pub fn split_certificate(der: &[u8]) -> Result<CertificateParts<'_>, DecodeError> {
    let body = open(der, Tag::Sequence)?;
    let mut reader = SliceReader::new(body)?;

    let tbs = reader.tlv_bytes()?;
    let signature_algorithm = AlgorithmIdentifierOwned::decode(&mut reader)?;
    let signature = BitStringRef::decode(&mut reader)?
        .as_bytes()
        .ok_or_else(|| DecodeError::Malformed("signature has unused bits".into()))?;
    let parts = CertificateParts {
        tbs,
        signature_algorithm,
        signature,
    };
    reader.finish(parts).map_err(DecodeError::from)
}

/// Recover identity fields from a certificate the primary decoder rejected.
///
/// `reason` is the primary decoder's error, kept on the result for audit.
pub fn walk_certificate(der: &[u8], reason: &str) -> Result<PartialCertificate, DecodeError> {
    let parts = split_certificate(der)?;
    let body = open(parts.tbs, Tag::Sequence)?;
    let mut reader = SliceReader::new(body)?;

    if reader.peek_tag()? == explicit(0) {
        reader.tlv_bytes()?;
    }
    let serial = integer_hex(reader.tlv_bytes()?)?;
    // inner signature algorithm, already taken from the outer structure
    reader.tlv_bytes()?;
    let issuer = name_from_der(reader.tlv_bytes()?)?;
    let validity = Validity::from_der(reader.tlv_bytes()?)?;
    let subject = name_from_der(reader.tlv_bytes()?)?;
    let spki = reader.tlv_bytes()?.to_vec();

    let mut is_ca = None;
    while !reader.is_finished() {
        let tag = reader.peek_tag()?;
        let tlv = reader.tlv_bytes()?;
        if tag == explicit(3) {
            is_ca = basic_constraints_ca(tlv);
        }
    }

    Ok(PartialCertificate {
        summary: CertificateSummary {
            fingerprint: fingerprint(der),
            serial,
            subject,
            issuer,
            not_before: time_to_utc(validity.not_before)?,
            not_after: time_to_utc(validity.not_after)?,
            is_ca,
        },
        spki,
        reason: reason.to_string(),
        der: der.to_vec(),
    })
}

/// Contents of a single TLV with the expected tag; rejects trailing bytes.
fn open(input: &[u8], tag: Tag) -> Result<&[u8], DecodeError> {
    let mut reader = SliceReader::new(input)?;
    let header = Header::decode(&mut reader)?;
    header.tag.assert_eq(tag)?;
    let body = reader.read_slice(header.length)?;
    if !reader.is_finished() {
        return Err(DecodeError::TrailingData(usize::try_from(
            reader.remaining_len(),
        )?));
    }
    Ok(body)
}

const fn explicit(number: u8) -> Tag {
    Tag::ContextSpecific {
        constructed: true,
        number: TagNumber::new(number),
    }
}

fn integer_hex(tlv: &[u8]) -> Result<String, DecodeError> {
    let any = AnyRef::from_der(tlv)?;
    any.tag().assert_eq(Tag::Integer)?;
    Ok(hex::encode_upper(any.value()))
}

fn name_from_der(tlv: &[u8]) -> Result<DistinguishedName, DecodeError> {
    if let Ok((_, name)) = X509Name::from_der(tlv) {
        return Ok(convert_name(&name));
    }
    let name = Name::from_der(tlv)?;
    Ok(DistinguishedName::parse(&name.to_string()))
}

/// `cA` flag of the first basic constraints extension, if it decodes.
fn basic_constraints_ca(explicit_tlv: &[u8]) -> Option<bool> {
    let inner = open(explicit_tlv, explicit(3)).ok()?;
    let extensions = Vec::<Extension>::from_der(inner).ok()?;
    let ext = extensions
        .iter()
        .find(|e| e.extn_id == oids::BASIC_CONSTRAINTS)?;
    BasicConstraints::from_der(ext.extn_value.as_bytes())
        .ok()
        .map(|bc| bc.ca)
}

fn time_to_utc(time: Time) -> Result<DateTime<Utc>, DecodeError> {
    let secs = i64::try_from(time.to_unix_duration().as_secs())
        .map_err(|e| DecodeError::Malformed(e.to_string()))?;
    Utc.timestamp_opt(secs, 0)
        .single()
        .ok_or_else(|| DecodeError::Malformed(format!("time out of range: {time}")))
}
