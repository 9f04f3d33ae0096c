//! Content fingerprints used as the natural key of every stored object.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{PkdError, Result};

/// Length of a hex-encoded SHA-256 digest.
pub const FINGERPRINT_HEX_LEN: usize = 64;

/// SHA-256 fingerprint of a DER encoding, lower-case hex.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Wrap a raw 32-byte digest.
    #[must_use]
    pub fn from_digest(digest: &[u8]) -> Self {
        Self(hex::encode(digest))
    }

    /// Parse a hex fingerprint, normalizing case and surrounding whitespace.
    ///
    /// Colon separated forms (`AB:CD:...`) are accepted as well.
    pub fn parse(input: &str) -> Result<Self> {
        let normalized: String = input
            .trim()
            .chars()
            .filter(|c| *c != ':')
            .map(|c| c.to_ascii_lowercase())
            .collect();

        if normalized.len() != FINGERPRINT_HEX_LEN
            || !normalized.chars().all(|c| c.is_ascii_hexdigit())
        {
            return Err(PkdError::InvalidFingerprint(input.to_string()));
        }
        Ok(Self(normalized))
    }

    /// The hex string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 16 hex characters, for log lines.
    #[must_use]
    pub fn short(&self) -> &str {
        &self.0[..16.min(self.0.len())]
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Fingerprint {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HELLO: &str = "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9";

    #[test]
    fn parse_normalizes_case_and_colons() {
        let upper = HELLO.to_uppercase();
        assert_eq!(Fingerprint::parse(&upper).unwrap().as_str(), HELLO);

        let colons = HELLO
            .as_bytes()
            .chunks(2)
            .map(|c| std::str::from_utf8(c).unwrap())
            .collect::<Vec<_>>()
            .join(":");
        assert_eq!(Fingerprint::parse(&colons).unwrap().as_str(), HELLO);
    }

    #[test]
    fn parse_rejects_wrong_length_and_non_hex() {
        assert!(Fingerprint::parse("abcd").is_err());
        let bad = format!("{}zz", &HELLO[..62]);
        assert!(Fingerprint::parse(&bad).is_err());
    }

    #[test]
    fn from_digest_is_lower_hex() {
        let fp = Fingerprint::from_digest(&[0xAB; 32]);
        assert_eq!(fp.as_str().len(), FINGERPRINT_HEX_LEN);
        assert!(fp.as_str().starts_with("abab"));
        assert_eq!(fp.short().len(), 16);
    }
}
