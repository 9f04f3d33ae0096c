//! Binary decoding of X.509 certificates and CRLs.
//!
//! The primary path uses `x509-parser`. When it rejects a certificate,
//! [`decode_lenient`] retries with the raw TBS walker in [`crate::fallback`]
//! and returns a [`CertificateData::PartiallyDecoded`] value instead of
//! failing the record.

use chrono::{DateTime, TimeZone, Utc};
use pkd_core::{
    CertificateData, CertificateSummary, DecodedCertificate, DecodedRevocationList,
    DistinguishedName, Fingerprint,
};
use ring::digest::{digest, SHA256};
use tracing::debug;
use x509_parser::certificate::X509Certificate;
use x509_parser::prelude::FromDer;
use x509_parser::revocation_list::CertificateRevocationList;
use x509_parser::time::ASN1Time;
use x509_parser::x509::{AttributeTypeAndValue, X509Name};

use crate::error::DecodeError;
use crate::fallback;

/// SHA-256 fingerprint of raw DER bytes.
#[must_use]
pub fn fingerprint(bytes: &[u8]) -> Fingerprint {
    Fingerprint::from_digest(digest(&SHA256, bytes).as_ref())
}

/// Decode a DER certificate with the primary decoder.
pub fn decode_certificate(bytes: &[u8]) -> Result<DecodedCertificate, DecodeError> {
    check_sequence(bytes)?;

    let (rest, cert) =
        X509Certificate::from_der(bytes).map_err(|e| DecodeError::Malformed(e.to_string()))?;
    if !rest.is_empty() {
        return Err(DecodeError::TrailingData(rest.len()));
    }

    let (is_ca, path_len) = match cert.basic_constraints() {
        Ok(Some(bc)) => (Some(bc.value.ca), bc.value.path_len_constraint),
        Ok(None) => (None, None),
        Err(e) => return Err(DecodeError::Malformed(format!("basic constraints: {e}"))),
    };
    let key_cert_sign = match cert.key_usage() {
        Ok(ku) => ku.map(|ku| ku.value.key_cert_sign()),
        Err(e) => return Err(DecodeError::Malformed(format!("key usage: {e}"))),
    };

    let summary = CertificateSummary {
        fingerprint: fingerprint(bytes),
        serial: hex::encode_upper(cert.raw_serial()),
        subject: convert_name(cert.subject()),
        issuer: convert_name(cert.issuer()),
        not_before: asn1_to_utc(cert.validity().not_before)?,
        not_after: asn1_to_utc(cert.validity().not_after)?,
        is_ca,
    };

    Ok(DecodedCertificate {
        summary,
        version: cert.version().0,
        path_len,
        key_cert_sign,
        public_key_algorithm: cert.public_key().algorithm.algorithm.to_id_string(),
        signature_algorithm: cert.signature_algorithm.algorithm.to_id_string(),
        spki: cert.public_key().raw.to_vec(),
        der: bytes.to_vec(),
    })
}

/// Decode a certificate, falling back to the partial TBS walker.
///
/// Fails only when neither decoder can recover the identity fields. The
/// returned error is the primary decoder's, which is the more informative of
/// the two.
pub fn decode_lenient(bytes: &[u8]) -> Result<CertificateData, DecodeError> {
    let primary = match decode_certificate(bytes) {
        Ok(cert) => return Ok(CertificateData::FullyDecoded(cert)),
        Err(DecodeError::Empty) => return Err(DecodeError::Empty),
        Err(e) => e,
    };

    match fallback::walk_certificate(bytes, &primary.to_string()) {
        Ok(partial) => {
            debug!(
                fingerprint = %partial.summary.fingerprint.short(),
                reason = %primary,
                "certificate recovered by fallback walker"
            );
            Ok(CertificateData::PartiallyDecoded(partial))
        }
        Err(walk) => {
            debug!(primary = %primary, fallback = %walk, "certificate undecodable");
            Err(primary)
        }
    }
}

/// Decode a DER certificate revocation list.
pub fn decode_revocation_list(bytes: &[u8]) -> Result<DecodedRevocationList, DecodeError> {
    check_sequence(bytes)?;

    let (rest, crl) = CertificateRevocationList::from_der(bytes)
        .map_err(|e| DecodeError::Malformed(e.to_string()))?;
    if !rest.is_empty() {
        return Err(DecodeError::TrailingData(rest.len()));
    }

    Ok(DecodedRevocationList {
        fingerprint: fingerprint(bytes),
        issuer: convert_name(crl.issuer()),
        this_update: asn1_to_utc(crl.last_update())?,
        next_update: crl.next_update().map(asn1_to_utc).transpose()?,
        revoked_serials: crl
            .iter_revoked_certificates()
            .map(|r| hex::encode_upper(r.raw_serial()))
            .collect(),
        signature_algorithm: crl.signature_algorithm.algorithm.to_id_string(),
        der: bytes.to_vec(),
    })
}

fn check_sequence(bytes: &[u8]) -> Result<(), DecodeError> {
    match bytes.first() {
        None => Err(DecodeError::Empty),
        Some(0x30) => Ok(()),
        Some(tag) => Err(DecodeError::UnsupportedStructure(format!(
            "leading tag 0x{tag:02x}, expected SEQUENCE"
        ))),
    }
}

/// Convert an `x509-parser` name into the indexed form.
pub(crate) fn convert_name(name: &X509Name<'_>) -> DistinguishedName {
    DistinguishedName::new(
        name.to_string(),
        first_value(name.iter_country()),
        first_value(name.iter_organization()),
        first_value(name.iter_common_name()),
    )
}

fn first_value<'a, 'b: 'a>(
    mut attrs: impl Iterator<Item = &'a AttributeTypeAndValue<'b>>,
) -> Option<String> {
    attrs.find_map(|a| a.as_str().ok()).map(str::to_string)
}

/// Convert an ASN.1 `UTCTime` / `GeneralizedTime` to `DateTime<Utc>`.
fn asn1_to_utc(t: ASN1Time) -> Result<DateTime<Utc>, DecodeError> {
    Utc.timestamp_opt(t.timestamp(), 0)
        .single()
        .ok_or_else(|| DecodeError::Malformed(format!("time out of range: {t}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{self, Issued};
    use pkd_core::FINGERPRINT_HEX_LEN;

    #[test]
    fn fingerprint_is_deterministic_sha256() {
        let a = fingerprint(b"hello world");
        let b = fingerprint(b"hello world");
        assert_eq!(a, b);
        assert_eq!(
            a.as_str(),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
        assert_eq!(a.as_str().len(), FINGERPRINT_HEX_LEN);
        assert_eq!(Fingerprint::parse(&a.as_str().to_uppercase()).unwrap(), a);
    }

    #[test]
    fn decodes_csca_fields() {
        let csca: Issued = test_support::csca("KR", "CSCA-KOREA");
        let cert = decode_certificate(&csca.der).unwrap();

        assert_eq!(cert.summary.subject.country.as_deref(), Some("KR"));
        assert_eq!(cert.summary.subject.common_name.as_deref(), Some("CSCA-KOREA"));
        assert!(cert.summary.is_self_issued());
        assert_eq!(cert.summary.is_ca, Some(true));
        assert_eq!(cert.key_cert_sign, Some(true));
        assert_eq!(cert.version, 2);
        assert_eq!(cert.summary.fingerprint, fingerprint(&csca.der));
        assert_eq!(cert.public_key_algorithm, "1.2.840.10045.2.1");
        assert!(!cert.spki.is_empty());
    }

    #[test]
    fn decodes_dsc_without_basic_constraints() {
        let csca = test_support::csca("DE", "CSCA-GERMANY");
        let dsc = test_support::dsc(&csca, "DE", "Document Signer 1");
        let cert = decode_certificate(&dsc.der).unwrap();

        assert_eq!(cert.summary.is_ca, None);
        assert!(!cert.summary.is_self_issued());
        let issuer = decode_certificate(&csca.der).unwrap().summary;
        assert!(cert.summary.issuer.same_entity(&issuer.subject));
    }

    #[test]
    fn rejects_empty_and_garbage() {
        assert_eq!(decode_certificate(&[]), Err(DecodeError::Empty));
        assert!(matches!(
            decode_certificate(&[0x04, 0x01, 0x00]),
            Err(DecodeError::UnsupportedStructure(_))
        ));
        assert!(matches!(
            decode_certificate(&[0x30, 0x03, 0x02, 0x01, 0x01]),
            Err(DecodeError::Malformed(_))
        ));
        assert!(decode_lenient(&[0x30, 0x00]).is_err());
    }

    #[test]
    fn rejects_trailing_bytes() {
        let csca = test_support::csca("FR", "CSCA-FRANCE");
        let mut der = csca.der.clone();
        der.extend_from_slice(&[0x00, 0x00]);
        assert_eq!(decode_certificate(&der), Err(DecodeError::TrailingData(2)));
    }

    #[test]
    fn lenient_falls_back_on_duplicate_extensions() {
        let der = test_support::csca_with_duplicate_basic_constraints("NL", "CSCA NL");
        assert!(decode_certificate(&der).is_err());

        let data = decode_lenient(&der).unwrap();
        assert!(data.is_degraded());
        let summary = data.summary();
        assert_eq!(summary.subject.country.as_deref(), Some("NL"));
        assert_eq!(summary.is_ca, Some(true));
        assert!(summary.is_self_issued());
        assert_eq!(data.fingerprint(), &fingerprint(&der));
        assert!(!data.spki().is_empty());
    }

    #[test]
    fn decodes_revocation_list() {
        let csca = test_support::csca("IT", "CSCA-ITALY");
        let der = test_support::crl(&csca, &[7, 300]);
        let crl = decode_revocation_list(&der).unwrap();

        assert_eq!(crl.issuer.country.as_deref(), Some("IT"));
        assert_eq!(crl.revoked_serials, vec!["07".to_string(), "012C".to_string()]);
        assert!(crl.next_update.is_some());
        assert!(crl.lists_serial("012c"));
    }
}
