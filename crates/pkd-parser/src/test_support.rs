//! Certificate, CRL, LDIF and Master List fixtures generated at test time.
//!
//! Available to this crate's unit tests and, with the `test-util` feature,
//! to the other workspace crates.

#![allow(clippy::unwrap_used, clippy::expect_used, missing_docs)]

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use cms::cert::{CertificateChoices, IssuerAndSerialNumber};
use cms::content_info::{CmsVersion, ContentInfo};
use cms::signed_data::{
    CertificateSet, EncapsulatedContentInfo, SignedData, SignerIdentifier, SignerInfo,
    SignerInfos,
};
use der::asn1::{OctetString, SetOfVec};
use der::{Any, Decode, Encode, Tag};
use rcgen::{
    date_time_ymd, BasicConstraints, Certificate, CertificateParams,
    CertificateRevocationListParams, CustomExtension, DistinguishedName, DnType, IsCa,
    KeyIdMethod, KeyPair, KeyUsagePurpose, RevokedCertParams, SerialNumber,
};
use ring::rand::SystemRandom;
use ring::signature::{EcdsaKeyPair, ECDSA_P256_SHA256_ASN1_SIGNING};
use x509_cert::attr::Attribute;
use x509_cert::ext::pkix::SubjectKeyIdentifier;
use x509_cert::spki::AlgorithmIdentifierOwned;

use crate::oids;
use crate::signature::HashAlgorithm;

/// A generated certificate with its key.
pub struct Issued {
    pub cert: Certificate,
    pub key: KeyPair,
    pub der: Vec<u8>,
}

/// Date as `(year, month, day)`.
pub type Ymd = (i32, u8, u8);

/// Parameters for one generated certificate.
#[derive(Clone)]
pub struct CertSpec {
    country: String,
    common_name: String,
    is_ca: IsCa,
    not_before: Ymd,
    not_after: Ymd,
    serial: Option<u64>,
    p384: bool,
    duplicate_basic_constraints: bool,
}

impl CertSpec {
    /// CA certificate with certificate and CRL signing key usage.
    pub fn authority(country: &str, common_name: &str) -> Self {
        Self {
            country: country.to_string(),
            common_name: common_name.to_string(),
            is_ca: IsCa::Ca(BasicConstraints::Unconstrained),
            not_before: (2020, 1, 1),
            not_after: (2040, 1, 1),
            serial: None,
            p384: false,
            duplicate_basic_constraints: false,
        }
    }

    /// End-entity signer without basic constraints.
    pub fn signer(country: &str, common_name: &str) -> Self {
        Self {
            is_ca: IsCa::NoCa,
            ..Self::authority(country, common_name)
        }
    }

    pub fn valid(mut self, not_before: Ymd, not_after: Ymd) -> Self {
        self.not_before = not_before;
        self.not_after = not_after;
        self
    }

    pub fn serial(mut self, serial: u64) -> Self {
        self.serial = Some(serial);
        self
    }

    /// Assert `cA = TRUE` even on a signer.
    pub fn ca_flag(mut self) -> Self {
        self.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        self
    }

    /// Explicit `cA = FALSE` basic constraints.
    pub fn not_ca(mut self) -> Self {
        self.is_ca = IsCa::ExplicitNoCa;
        self
    }

    pub fn p384(mut self) -> Self {
        self.p384 = true;
        self
    }

    /// Add a second basic constraints extension, which strict decoders
    /// reject.
    pub fn duplicate_basic_constraints(mut self) -> Self {
        self.duplicate_basic_constraints = true;
        self
    }

    fn key(&self) -> KeyPair {
        if self.p384 {
            KeyPair::generate_for(&rcgen::PKCS_ECDSA_P384_SHA384).unwrap()
        } else {
            KeyPair::generate().unwrap()
        }
    }

    fn params(&self) -> CertificateParams {
        let mut params = CertificateParams::new(Vec::<String>::new()).unwrap();
        let mut dn = DistinguishedName::new();
        dn.push(DnType::CountryName, self.country.as_str());
        dn.push(DnType::CommonName, self.common_name.as_str());
        params.distinguished_name = dn;
        params.not_before = date_time_ymd(self.not_before.0, self.not_before.1, self.not_before.2);
        params.not_after = date_time_ymd(self.not_after.0, self.not_after.1, self.not_after.2);
        params.is_ca = self.is_ca.clone();
        params.key_usages = match self.is_ca {
            IsCa::Ca(_) => vec![KeyUsagePurpose::KeyCertSign, KeyUsagePurpose::CrlSign],
            _ => vec![KeyUsagePurpose::DigitalSignature],
        };
        if let Some(serial) = self.serial {
            params.serial_number = Some(SerialNumber::from(serial));
        }
        if self.duplicate_basic_constraints {
            params.custom_extensions.push(CustomExtension::from_oid_content(
                &[2, 5, 29, 19],
                vec![0x30, 0x03, 0x01, 0x01, 0xFF],
            ));
        }
        params
    }

    pub fn self_signed(self) -> Issued {
        let key = self.key();
        let cert = self.params().self_signed(&key).unwrap();
        let der = cert.der().to_vec();
        Issued { cert, key, der }
    }

    pub fn issued_by(self, issuer: &Issued) -> Issued {
        let key = self.key();
        let cert = self
            .params()
            .signed_by(&key, &issuer.cert, &issuer.key)
            .unwrap();
        let der = cert.der().to_vec();
        Issued { cert, key, der }
    }

    /// Self-issued (subject equals issuer) but signed by an unrelated key.
    pub fn self_issued_with_foreign_signature(self) -> Issued {
        let impostor = self.clone().self_signed();
        let key = self.key();
        let cert = self
            .params()
            .signed_by(&key, &impostor.cert, &impostor.key)
            .unwrap();
        let der = cert.der().to_vec();
        Issued { cert, key, der }
    }
}

pub fn csca(country: &str, cn: &str) -> Issued {
    CertSpec::authority(country, cn).self_signed()
}

pub fn csca_p384(country: &str, cn: &str) -> Issued {
    CertSpec::authority(country, cn).p384().self_signed()
}

pub fn csca_with_duplicate_basic_constraints(country: &str, cn: &str) -> Vec<u8> {
    CertSpec::authority(country, cn)
        .duplicate_basic_constraints()
        .self_signed()
        .der
}

/// Link certificate: a CA issued by another CSCA.
/// EC `SubjectPublicKeyInfo` carrying explicit curve parameters instead of a
/// named curve OID.
pub fn explicit_curve_ec_spki() -> Vec<u8> {
    let parameters = tlv(0x30, &tlv(0x02, &[0x01]));
    let algorithm = tlv(0x30, &[oids::EC_PUBLIC_KEY.to_der().unwrap(), parameters].concat());
    let key = tlv(0x03, &[0x00, 0x04, 0x00]);
    tlv(0x30, &[algorithm, key].concat())
}

pub fn link(issuer: &Issued, country: &str, cn: &str) -> Issued {
    CertSpec::authority(country, cn).issued_by(issuer)
}

pub fn dsc(issuer: &Issued, country: &str, cn: &str) -> Issued {
    CertSpec::signer(country, cn).issued_by(issuer)
}

/// CRL signed by `issuer` listing `serials`.
pub fn crl(issuer: &Issued, serials: &[u64]) -> Vec<u8> {
    let params = CertificateRevocationListParams {
        this_update: date_time_ymd(2024, 1, 1),
        next_update: date_time_ymd(2040, 1, 1),
        crl_number: SerialNumber::from(1u64),
        issuing_distribution_point: None,
        revoked_certs: serials
            .iter()
            .map(|s| RevokedCertParams {
                serial_number: SerialNumber::from(*s),
                revocation_time: date_time_ymd(2024, 1, 1),
                reason_code: None,
                invalidity_date: None,
            })
            .collect(),
        key_identifier_method: KeyIdMethod::Sha256,
    };
    params
        .signed_by(&issuer.cert, &issuer.key)
        .unwrap()
        .der()
        .to_vec()
}

/// DER TLV with a short or long form length.
pub fn tlv(tag: u8, body: &[u8]) -> Vec<u8> {
    let mut out = vec![tag];
    let len = body.len();
    if len < 0x80 {
        out.push(len as u8);
    } else {
        let bytes: Vec<u8> = len
            .to_be_bytes()
            .into_iter()
            .skip_while(|b| *b == 0)
            .collect();
        out.push(0x80 | bytes.len() as u8);
        out.extend(bytes);
    }
    out.extend_from_slice(body);
    out
}

/// One LDIF entry with the payload folded at 64 columns.
pub fn ldif_entry(name: &str, attribute: &str, der: &[u8]) -> String {
    let b64 = STANDARD.encode(der);
    let mut lines = b64.as_bytes().chunks(64).map(|c| std::str::from_utf8(c).unwrap());
    let mut out = format!("dn: {name}\n{attribute}:: {}\n", lines.next().unwrap_or(""));
    for line in lines {
        out.push(' ');
        out.push_str(line);
        out.push('\n');
    }
    out.push('\n');
    out
}

/// Assembles a CMS-signed Master List. The signer key must be P-256.
pub struct MasterListBuilder<'a> {
    signer: &'a Issued,
    members: Vec<Vec<u8>>,
    embedded: Vec<Vec<u8>>,
    payload: Option<Vec<u8>>,
    signed_attributes: bool,
    by_key_identifier: bool,
    tampered: bool,
}

impl<'a> MasterListBuilder<'a> {
    pub fn new(signer: &'a Issued, members: &[&[u8]]) -> Self {
        Self {
            signer,
            members: members.iter().map(|m| m.to_vec()).collect(),
            embedded: Vec::new(),
            payload: None,
            signed_attributes: true,
            by_key_identifier: false,
            tampered: false,
        }
    }

    /// Replace the encapsulated content wholesale.
    pub fn with_payload(mut self, payload: Vec<u8>) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Embed an extra certificate next to the signer's.
    pub fn embed(mut self, der: &[u8]) -> Self {
        self.embedded.push(der.to_vec());
        self
    }

    pub fn without_signed_attributes(mut self) -> Self {
        self.signed_attributes = false;
        self
    }

    pub fn signer_by_key_identifier(mut self) -> Self {
        self.by_key_identifier = true;
        self
    }

    /// Flip a content byte after signing.
    pub fn tampered(mut self) -> Self {
        self.tampered = true;
        self
    }

    fn default_payload(&self) -> Vec<u8> {
        let mut body = vec![0x02, 0x01, 0x00];
        body.extend(tlv(0x31, &self.members.concat()));
        tlv(0x30, &body)
    }

    pub fn build(&self) -> Vec<u8> {
        let payload = self
            .payload
            .clone()
            .unwrap_or_else(|| self.default_payload());
        let signer_cert = x509_cert::Certificate::from_der(&self.signer.der).unwrap();
        let sha256 = AlgorithmIdentifierOwned {
            oid: oids::SHA256,
            parameters: None,
        };

        let (signed_attrs, message) = if self.signed_attributes {
            let digest = HashAlgorithm::Sha256.digest(&payload);
            let attrs = SetOfVec::try_from(vec![
                Attribute {
                    oid: oids::CONTENT_TYPE,
                    values: SetOfVec::try_from(vec![Any::encode_from(&oids::CSCA_MASTER_LIST)
                        .unwrap()])
                    .unwrap(),
                },
                Attribute {
                    oid: oids::MESSAGE_DIGEST,
                    values: SetOfVec::try_from(vec![Any::encode_from(
                        &OctetString::new(digest).unwrap(),
                    )
                    .unwrap()])
                    .unwrap(),
                },
            ])
            .unwrap();
            let message = attrs.to_der().unwrap();
            (Some(attrs), message)
        } else {
            (None, payload.clone())
        };

        let rng = SystemRandom::new();
        let key = EcdsaKeyPair::from_pkcs8(
            &ECDSA_P256_SHA256_ASN1_SIGNING,
            &self.signer.key.serialize_der(),
            &rng,
        )
        .unwrap();
        let signature = key.sign(&rng, &message).unwrap();

        let tbs = &signer_cert.tbs_certificate;
        let (version, sid) = if self.by_key_identifier {
            let ski = tbs
                .extensions
                .iter()
                .flatten()
                .find(|e| e.extn_id == oids::SUBJECT_KEY_IDENTIFIER)
                .map(|e| SubjectKeyIdentifier::from_der(e.extn_value.as_bytes()).unwrap())
                .expect("signer has a subject key identifier");
            (CmsVersion::V3, SignerIdentifier::SubjectKeyIdentifier(ski))
        } else {
            (
                CmsVersion::V1,
                SignerIdentifier::IssuerAndSerialNumber(IssuerAndSerialNumber {
                    issuer: tbs.issuer.clone(),
                    serial_number: tbs.serial_number.clone(),
                }),
            )
        };

        let signer_info = SignerInfo {
            version,
            sid,
            digest_alg: sha256.clone(),
            signed_attrs,
            signature_algorithm: AlgorithmIdentifierOwned {
                oid: oids::ECDSA_WITH_SHA256,
                parameters: None,
            },
            signature: OctetString::new(signature.as_ref()).unwrap(),
            unsigned_attrs: None,
        };

        let mut content = payload;
        if self.tampered {
            if let Some(last) = content.last_mut() {
                *last ^= 0x01;
            }
        }

        let certificates: Vec<CertificateChoices> = std::iter::once(&self.signer.der)
            .chain(self.embedded.iter())
            .map(|der| {
                CertificateChoices::Certificate(x509_cert::Certificate::from_der(der).unwrap())
            })
            .collect();

        let signed = SignedData {
            version: CmsVersion::V3,
            digest_algorithms: SetOfVec::try_from(vec![sha256]).unwrap(),
            encap_content_info: EncapsulatedContentInfo {
                econtent_type: oids::CSCA_MASTER_LIST,
                econtent: Some(Any::new(Tag::OctetString, content).unwrap()),
            },
            certificates: Some(CertificateSet(SetOfVec::try_from(certificates).unwrap())),
            crls: None,
            signer_infos: SignerInfos(SetOfVec::try_from(vec![signer_info]).unwrap()),
        };

        ContentInfo {
            content_type: oids::SIGNED_DATA,
            content: Any::encode_from(&signed).unwrap(),
        }
        .to_der()
        .unwrap()
    }
}
