//! Distinguished names and the comparison key used for issuer matching.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A subject or issuer name with the attributes the store indexes on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistinguishedName {
    /// Display form (`C=KR, O=Government, CN=CSCA-KOREA`)
    pub dn: String,
    /// ISO 3166 country code (`C`)
    pub country: Option<String>,
    /// Organization (`O`)
    pub organization: Option<String>,
    /// Common name (`CN`)
    pub common_name: Option<String>,
}

impl DistinguishedName {
    /// Build a name from already-extracted attributes.
    #[must_use]
    pub fn new(
        dn: impl Into<String>,
        country: Option<String>,
        organization: Option<String>,
        common_name: Option<String>,
    ) -> Self {
        Self {
            dn: dn.into(),
            country: country.map(|c| c.trim().to_ascii_uppercase()),
            organization,
            common_name,
        }
    }

    /// Best-effort parse of a display string, pulling `C`, `O` and `CN`.
    ///
    /// Used when only the string form of a name survived decoding.
    #[must_use]
    pub fn parse(dn: &str) -> Self {
        let mut country = None;
        let mut organization = None;
        let mut common_name = None;

        for (key, value) in components(dn) {
            match key.as_str() {
                "c" if country.is_none() => country = Some(value),
                "o" if organization.is_none() => organization = Some(value),
                "cn" if common_name.is_none() => common_name = Some(value),
                _ => {}
            }
        }

        Self::new(dn, country, organization, common_name)
    }

    /// Comparison key for subject/issuer matching.
    #[must_use]
    pub fn match_key(&self) -> String {
        normalize_dn(&self.dn)
    }

    /// Whether two names denote the same entity under [`normalize_dn`].
    #[must_use]
    pub fn same_entity(&self, other: &Self) -> bool {
        self.match_key() == other.match_key()
    }
}

impl fmt::Display for DistinguishedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.dn)
    }
}

/// Normalize a DN string so that formatting differences do not break matching.
///
/// Components are split on unescaped `,` or `+`, keys and values are trimmed
/// and lower-cased, inner whitespace is collapsed, and the components are
/// sorted so that `C=KR, CN=X` and `CN=X,C=KR` compare equal.
#[must_use]
pub fn normalize_dn(dn: &str) -> String {
    let mut parts: Vec<String> = components(dn)
        .into_iter()
        .map(|(key, value)| format!("{key}={}", value.to_lowercase()))
        .collect();
    parts.sort_unstable();
    parts.join(",")
}

/// Split a DN into `(lower-case key, trimmed value)` pairs.
fn components(dn: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut escaped = false;

    for ch in dn.chars() {
        if escaped {
            current.push(ch);
            escaped = false;
            continue;
        }
        match ch {
            '\\' => {
                current.push(ch);
                escaped = true;
            }
            ',' | '+' => {
                push_component(&mut out, &current);
                current.clear();
            }
            _ => current.push(ch),
        }
    }
    push_component(&mut out, &current);
    out
}

fn push_component(out: &mut Vec<(String, String)>, raw: &str) {
    let Some((key, value)) = raw.split_once('=') else {
        return;
    };
    let key = key.trim().to_ascii_lowercase();
    if key.is_empty() {
        return;
    }
    let value = value.split_whitespace().collect::<Vec<_>>().join(" ");
    out.push((key, value));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_ignores_order_case_and_spacing() {
        let a = normalize_dn("C=KR, O=Government,  CN=CSCA  Korea");
        let b = normalize_dn("cn=csca korea,o=GOVERNMENT,c=kr");
        assert_eq!(a, b);
    }

    #[test]
    fn normalize_keeps_escaped_commas_together() {
        let key = normalize_dn(r"CN=Signer\, Unit 1,C=DE");
        assert!(key.contains(r"cn=signer\, unit 1"));
        assert!(key.contains("c=de"));
    }

    #[test]
    fn parse_extracts_known_attributes() {
        let name = DistinguishedName::parse("C=kr, O=Gov, OU=MOFA, CN=CSCA");
        assert_eq!(name.country.as_deref(), Some("KR"));
        assert_eq!(name.organization.as_deref(), Some("Gov"));
        assert_eq!(name.common_name.as_deref(), Some("CSCA"));
    }

    #[test]
    fn same_entity_uses_match_key() {
        let a = DistinguishedName::parse("C=FR, CN=CSCA-FRANCE");
        let b = DistinguishedName::parse("CN=csca-france,C=FR");
        let c = DistinguishedName::parse("CN=csca-france,C=BE");
        assert!(a.same_entity(&b));
        assert!(!a.same_entity(&c));
    }
}
