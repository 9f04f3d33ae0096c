//! Trust path construction from a stored certificate up to a self-signed
//! anchor.
//!
//! The builder only reads from the index; stored outcomes are never
//! touched.

use pkd_core::{CertificateIndex, CertificateRecord, Fingerprint};
use pkd_parser::verify_certificate_signature;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::error::ChainError;

/// Default limit on the number of links in a path.
pub const DEFAULT_MAX_CHAIN_DEPTH: usize = 5;

/// One certificate in a trust path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustLink {
    /// Certificate fingerprint
    pub fingerprint: Fingerprint,
    /// Subject DN
    pub subject: String,
    /// Issuer DN
    pub issuer: String,
    /// Signature verified under the next link's key (own key for the anchor)
    pub signature_verified: bool,
    /// Subject equals issuer
    pub self_signed: bool,
}

impl TrustLink {
    fn new(record: &CertificateRecord, signature_verified: bool) -> Self {
        Self {
            fingerprint: record.fingerprint.clone(),
            subject: record.subject.dn.clone(),
            issuer: record.issuer.dn.clone(),
            signature_verified,
            self_signed: record.is_self_issued(),
        }
    }
}

/// Ordered links from an end entity to its anchor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustPath {
    /// End entity first
    pub links: Vec<TrustLink>,
    /// The last link is a self-signed anchor
    pub complete: bool,
}

impl TrustPath {
    /// Number of links.
    #[must_use]
    pub fn len(&self) -> usize {
        self.links.len()
    }

    /// Whether no link was walked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// The anchor of a complete path.
    #[must_use]
    pub fn anchor(&self) -> Option<&TrustLink> {
        self.complete.then(|| self.links.last()).flatten()
    }

    /// Every link's signature verified.
    #[must_use]
    pub fn fully_verified(&self) -> bool {
        self.complete && self.links.iter().all(|l| l.signature_verified)
    }
}

/// Walks issuer-by-subject through a [`CertificateIndex`].
pub struct TrustPathBuilder<'a, I: CertificateIndex + ?Sized> {
    index: &'a I,
    max_depth: usize,
}

impl<'a, I: CertificateIndex + ?Sized> TrustPathBuilder<'a, I> {
    /// Builder with the default depth limit.
    pub const fn new(index: &'a I) -> Self {
        Self {
            index,
            max_depth: DEFAULT_MAX_CHAIN_DEPTH,
        }
    }

    /// Override the depth limit.
    #[must_use]
    pub const fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Build the path starting at `fingerprint`.
    #[instrument(skip(self), fields(fingerprint = %fingerprint.short()))]
    pub async fn build(&self, fingerprint: &Fingerprint) -> Result<TrustPath, ChainError> {
        let mut current = self
            .index
            .find_by_fingerprint(fingerprint)
            .await?
            .ok_or_else(|| ChainError::NotFound(fingerprint.clone()))?;
        let mut path = TrustPath::default();

        loop {
            if path.links.len() >= self.max_depth {
                return Err(ChainError::TooDeep {
                    max_depth: self.max_depth,
                    path,
                });
            }

            if current.is_self_issued() {
                let verified = verify_certificate_signature(&current.der, &current.spki).is_ok();
                path.links.push(TrustLink::new(&current, verified));
                path.complete = true;
                debug!(links = path.links.len(), "trust path complete");
                return Ok(path);
            }

            let mut candidates = self
                .index
                .find_all_by_subject_name(&current.issuer.dn)
                .await?;
            candidates.retain(|c| c.fingerprint != current.fingerprint);
            if candidates.is_empty() {
                path.links.push(TrustLink::new(&current, false));
                return Err(ChainError::AnchorUnreachable {
                    issuer: current.issuer.dn.clone(),
                    path,
                });
            }

            // same-named issuers after a key rollover: follow the one that signed
            let signed_by = candidates
                .iter()
                .position(|c| verify_certificate_signature(&current.der, &c.spki).is_ok());
            let issuer = candidates.swap_remove(signed_by.unwrap_or(0));
            path.links.push(TrustLink::new(&current, signed_by.is_some()));
            current = issuer;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{record_for, stored};
    use pkd_core::{MemoryStore, Role};
    use pkd_parser::test_support;

    #[tokio::test]
    async fn dsc_to_csca_path() {
        let csca = test_support::csca("KR", "CSCA-KOREA");
        let dsc = test_support::dsc(&csca, "KR", "DS Korea");
        let store = stored(&[(&csca.der[..], Role::Csca), (&dsc.der[..], Role::Dsc)]).await;

        let path = TrustPathBuilder::new(&store)
            .build(&record_for(&dsc.der[..], Role::Dsc).fingerprint)
            .await
            .unwrap();

        assert_eq!(path.len(), 2);
        assert!(path.complete);
        assert!(path.fully_verified());
        assert!(!path.links[0].self_signed);
        assert!(path.anchor().unwrap().self_signed);
    }

    #[tokio::test]
    async fn rolled_over_authority_is_found_by_signature() {
        let old = test_support::csca("KR", "CSCA-KOREA");
        let new = test_support::csca("KR", "CSCA-KOREA");
        let dsc = test_support::dsc(&new, "KR", "DS Korea");
        let store = stored(&[
            (&old.der[..], Role::Csca),
            (&new.der[..], Role::Csca),
            (&dsc.der[..], Role::Dsc),
        ])
        .await;

        let path = TrustPathBuilder::new(&store)
            .build(&record_for(&dsc.der[..], Role::Dsc).fingerprint)
            .await
            .unwrap();

        assert!(path.fully_verified());
        assert_eq!(
            path.anchor().unwrap().fingerprint,
            record_for(&new.der[..], Role::Csca).fingerprint
        );
    }

    #[tokio::test]
    async fn link_certificate_extends_path() {
        let old = test_support::csca("NL", "CSCA NL");
        let new = test_support::link(&old, "NL", "CSCA NL 2");
        let dsc = test_support::dsc(&new, "NL", "DS NL");
        let store = stored(&[
            (&old.der[..], Role::Csca),
            (&new.der[..], Role::Csca),
            (&dsc.der[..], Role::Dsc),
        ])
        .await;

        let path = TrustPathBuilder::new(&store)
            .build(&record_for(&dsc.der[..], Role::Dsc).fingerprint)
            .await
            .unwrap();
        assert_eq!(path.len(), 3);
        assert!(path.fully_verified());

        let err = TrustPathBuilder::new(&store)
            .with_max_depth(2)
            .build(&record_for(&dsc.der[..], Role::Dsc).fingerprint)
            .await
            .unwrap_err();
        assert!(matches!(err, ChainError::TooDeep { max_depth: 2, .. }));
        assert_eq!(err.partial_path().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn missing_issuer_reports_partial_path() {
        let csca = test_support::csca("KR", "CSCA-KOREA");
        let dsc = test_support::dsc(&csca, "KR", "DS Korea");
        let store = stored(&[(&dsc.der[..], Role::Dsc)]).await;

        let err = TrustPathBuilder::new(&store)
            .build(&record_for(&dsc.der[..], Role::Dsc).fingerprint)
            .await
            .unwrap_err();
        let ChainError::AnchorUnreachable { issuer, path } = err else {
            panic!("expected AnchorUnreachable");
        };
        assert!(issuer.contains("CSCA-KOREA"));
        assert_eq!(path.len(), 1);
        assert!(!path.complete);
    }

    #[tokio::test]
    async fn unknown_start_is_not_found() {
        let store = MemoryStore::new();
        let fp = Fingerprint::from_digest(&[1; 32]);
        assert!(matches!(
            TrustPathBuilder::new(&store).build(&fp).await,
            Err(ChainError::NotFound(_))
        ));
    }
}
