//! Role classification for parsed certificates.
//!
//! Rules run in a fixed priority order and the first one that matches
//! decides the role. The contextual hint is the LDIF entry name, which in
//! ICAO PKD downloads encodes the directory branch (`o=csca`, `o=dsc`,
//! `dc=nc-data`).

use pkd_core::Role;

/// One classification rule, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    /// Directory branch named by the entry name
    ContextHint,
    /// Subject mentions a country signing authority
    AuthorityMarker,
    /// Subject marks a non-conformant document signer
    NonConformantMarker,
    /// Subject mentions a document signer
    SignerMarker,
    /// Nothing matched
    Default,
}

impl Rule {
    /// Every rule, highest priority first.
    pub const PRIORITY: [Self; 5] = [
        Self::ContextHint,
        Self::AuthorityMarker,
        Self::NonConformantMarker,
        Self::SignerMarker,
        Self::Default,
    ];

    /// Apply this rule alone to a lower-cased subject and hint.
    #[must_use]
    pub fn apply(self, subject: &str, hint: &str) -> Option<Role> {
        match self {
            Self::ContextHint => context_hint(hint),
            Self::AuthorityMarker => authority_marker(subject).then_some(Role::Csca),
            Self::NonConformantMarker => non_conformant_marker(subject).then_some(Role::DscNc),
            Self::SignerMarker => signer_marker(subject).then_some(Role::Dsc),
            Self::Default => Some(Role::Dsc),
        }
    }
}

/// Classify a certificate from its subject and an optional contextual hint.
#[must_use]
pub fn classify(subject: &str, hint: Option<&str>) -> Role {
    classify_with_rule(subject, hint).0
}

/// Like [`classify`], also reporting which rule decided.
#[must_use]
pub fn classify_with_rule(subject: &str, hint: Option<&str>) -> (Role, Rule) {
    let subject = subject.to_lowercase();
    let hint = hint.unwrap_or_default().to_lowercase();

    Rule::PRIORITY
        .into_iter()
        .find_map(|rule| rule.apply(&subject, &hint).map(|role| (role, rule)))
        .unwrap_or((Role::Dsc, Rule::Default))
}

fn context_hint(hint: &str) -> Option<Role> {
    let components: Vec<&str> = hint.split(',').map(str::trim).collect();

    if components.iter().any(|c| c.contains("nc-data")) {
        return Some(Role::DscNc);
    }
    if components.contains(&"o=dsc") {
        return Some(Role::Dsc);
    }
    if components.contains(&"o=csca") || components.contains(&"o=ml") {
        return Some(Role::Csca);
    }
    None
}

fn authority_marker(subject: &str) -> bool {
    ["csca", "country signing", "country signer"]
        .iter()
        .any(|m| subject.contains(m))
}

fn non_conformant_marker(subject: &str) -> bool {
    [
        "dsc_nc",
        "dsc-nc",
        "dscnc",
        "non-conformant",
        "nonconformant",
        "non conformant",
    ]
    .iter()
    .any(|m| subject.contains(m))
}

fn signer_marker(subject: &str) -> bool {
    ["dsc", "document signer", "document signing", "signer"]
        .iter()
        .any(|m| subject.contains(m))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_hint_rule() {
        let hint = |h: &str| Rule::ContextHint.apply("", &h.to_lowercase());

        assert_eq!(
            hint("cn=x,o=dsc,c=KR,dc=nc-data,dc=download,dc=pkd"),
            Some(Role::DscNc)
        );
        assert_eq!(hint("cn=x,o=dsc,c=KR,dc=data,dc=download"), Some(Role::Dsc));
        assert_eq!(hint("cn=x,o=csca,c=KR,dc=data"), Some(Role::Csca));
        assert_eq!(hint("cn=x,o=ml,c=KR,dc=data"), Some(Role::Csca));
        assert_eq!(hint("cn=x,c=KR,dc=data"), None);
        assert_eq!(hint(""), None);
    }

    #[test]
    fn authority_marker_rule() {
        let rule = |s: &str| Rule::AuthorityMarker.apply(&s.to_lowercase(), "");
        assert_eq!(rule("C=KR, CN=CSCA-KOREA"), Some(Role::Csca));
        assert_eq!(rule("C=NZ, CN=Country Signing Authority"), Some(Role::Csca));
        assert_eq!(rule("C=FI, CN=Country Signer FI"), Some(Role::Csca));
        assert_eq!(rule("C=FI, CN=Document Signer"), None);
    }

    #[test]
    fn non_conformant_marker_rule() {
        let rule = |s: &str| Rule::NonConformantMarker.apply(&s.to_lowercase(), "");
        assert_eq!(rule("CN=DSC_NC 01"), Some(Role::DscNc));
        assert_eq!(rule("CN=dsc-nc"), Some(Role::DscNc));
        assert_eq!(rule("CN=Non-Conformant Signer"), Some(Role::DscNc));
        assert_eq!(rule("CN=nonconformant"), Some(Role::DscNc));
        assert_eq!(rule("CN=DSC 01"), None);
    }

    #[test]
    fn signer_marker_rule() {
        let rule = |s: &str| Rule::SignerMarker.apply(&s.to_lowercase(), "");
        assert_eq!(rule("CN=DSC 01"), Some(Role::Dsc));
        assert_eq!(rule("CN=Document Signer 7"), Some(Role::Dsc));
        assert_eq!(rule("CN=Document Signing Key"), Some(Role::Dsc));
        assert_eq!(rule("CN=Passport Signer"), Some(Role::Dsc));
        assert_eq!(rule("CN=Ministry of Interior"), None);
    }

    #[test]
    fn default_rule_is_dsc() {
        assert_eq!(Rule::Default.apply("anything", ""), Some(Role::Dsc));
    }

    #[test]
    fn first_match_wins() {
        // hint beats subject
        assert_eq!(
            classify_with_rule("CN=CSCA-KOREA", Some("cn=x,o=dsc,c=KR,dc=data")),
            (Role::Dsc, Rule::ContextHint)
        );
        // authority beats signer ("country signer" contains "signer")
        assert_eq!(
            classify_with_rule("CN=Country Signer", None),
            (Role::Csca, Rule::AuthorityMarker)
        );
        // non-conformant beats signer ("dsc_nc" contains "dsc")
        assert_eq!(
            classify_with_rule("CN=DSC_NC", None),
            (Role::DscNc, Rule::NonConformantMarker)
        );
        assert_eq!(
            classify_with_rule("C=IS, O=Registers Iceland", None),
            (Role::Dsc, Rule::Default)
        );
    }

    #[test]
    fn classify_is_case_insensitive() {
        assert_eq!(classify("cn=csca latvia", None), Role::Csca);
        assert_eq!(classify("CN=X", Some("CN=X,O=CSCA,C=LV")), Role::Csca);
    }
}
