//! Configured trust anchor for Master List signers.

use std::path::Path;

use pkd_core::{DecodedCertificate, Fingerprint};
use tracing::{debug, instrument};

use crate::decoder::{decode_certificate, fingerprint};
use crate::error::AnchorError;
use crate::signature::verify_certificate_signature;

const PEM_CERTIFICATE_TAG: &str = "CERTIFICATE";

/// A certificate trusted to sign (or issue the signers of) Master Lists.
#[derive(Debug, Clone)]
pub struct TrustAnchor {
    certificate: DecodedCertificate,
}

impl TrustAnchor {
    /// Anchor from DER bytes.
    pub fn from_der(der: &[u8]) -> Result<Self, AnchorError> {
        Ok(Self {
            certificate: decode_certificate(der)?,
        })
    }

    /// Anchor from a PEM `CERTIFICATE` block.
    pub fn from_pem(pem_text: &[u8]) -> Result<Self, AnchorError> {
        let block = pem::parse(pem_text).map_err(|e| AnchorError::Pem(e.to_string()))?;
        if block.tag() != PEM_CERTIFICATE_TAG {
            return Err(AnchorError::NotCertificate(block.tag().to_string()));
        }
        Self::from_der(block.contents())
    }

    /// Load an anchor file, PEM or DER.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, AnchorError> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await.map_err(|source| AnchorError::Io {
            path: path.display().to_string(),
            source,
        })?;

        let start = bytes
            .iter()
            .position(|b| !b.is_ascii_whitespace())
            .unwrap_or(bytes.len());
        let anchor = if bytes[start..].starts_with(b"-----BEGIN") {
            Self::from_pem(&bytes)?
        } else {
            Self::from_der(&bytes)?
        };
        debug!(
            fingerprint = %anchor.fingerprint().short(),
            subject = %anchor.certificate.summary.subject,
            "trust anchor loaded"
        );
        Ok(anchor)
    }

    /// Decoded anchor certificate.
    #[must_use]
    pub const fn certificate(&self) -> &DecodedCertificate {
        &self.certificate
    }

    /// Anchor fingerprint.
    #[must_use]
    pub const fn fingerprint(&self) -> &Fingerprint {
        &self.certificate.summary.fingerprint
    }

    /// Anchor public key as `SubjectPublicKeyInfo` DER.
    #[must_use]
    pub fn spki(&self) -> &[u8] {
        &self.certificate.spki
    }

    /// Whether `der` is the anchor certificate itself.
    #[must_use]
    pub fn is_anchor(&self, der: &[u8]) -> bool {
        fingerprint(der) == *self.fingerprint()
    }

    /// Whether `cert_der` is the anchor or carries a signature made by it.
    #[must_use]
    pub fn vouches_for(&self, cert_der: &[u8]) -> bool {
        self.is_anchor(cert_der) || verify_certificate_signature(cert_der, self.spki()).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support;
    use std::io::Write;

    #[test]
    fn der_and_pem_agree() {
        let csca = test_support::csca("NO", "CSCA Norway");
        let pem_text = pem::encode(&pem::Pem::new("CERTIFICATE", csca.der.clone()));

        let from_der = TrustAnchor::from_der(&csca.der).unwrap();
        let from_pem = TrustAnchor::from_pem(pem_text.as_bytes()).unwrap();
        assert_eq!(from_der.fingerprint(), from_pem.fingerprint());
        assert!(from_der.is_anchor(&csca.der));
    }

    #[test]
    fn rejects_non_certificate_pem() {
        let pem_text = pem::encode(&pem::Pem::new("PRIVATE KEY", vec![0x30, 0x00]));
        assert!(matches!(
            TrustAnchor::from_pem(pem_text.as_bytes()),
            Err(AnchorError::NotCertificate(tag)) if tag == "PRIVATE KEY"
        ));
    }

    #[test]
    fn vouches_for_issued_certificates_only() {
        let root = test_support::csca("DK", "CSCA Denmark");
        let signer = test_support::dsc(&root, "DK", "Master List Signer");
        let stranger = test_support::csca("DK", "CSCA Denmark Test");

        let anchor = TrustAnchor::from_der(&root.der).unwrap();
        assert!(anchor.vouches_for(&root.der));
        assert!(anchor.vouches_for(&signer.der));
        assert!(!anchor.vouches_for(&stranger.der));
    }

    #[tokio::test]
    async fn loads_pem_and_der_files() {
        let csca = test_support::csca("FI", "CSCA Finland");
        let dir = tempfile::tempdir().unwrap();

        let der_path = dir.path().join("anchor.der");
        std::fs::write(&der_path, &csca.der).unwrap();

        let pem_path = dir.path().join("anchor.pem");
        let mut f = std::fs::File::create(&pem_path).unwrap();
        writeln!(f).unwrap();
        f.write_all(pem::encode(&pem::Pem::new("CERTIFICATE", csca.der.clone())).as_bytes())
            .unwrap();

        let a = TrustAnchor::load(&der_path).await.unwrap();
        let b = TrustAnchor::load(&pem_path).await.unwrap();
        assert_eq!(a.fingerprint(), b.fingerprint());

        let missing = TrustAnchor::load(dir.path().join("missing.pem")).await;
        assert!(matches!(missing, Err(AnchorError::Io { .. })));
    }
}
