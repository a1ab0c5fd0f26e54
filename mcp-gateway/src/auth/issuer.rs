//! Issuer identity and the trust allow-list.

use crate::config::oauth::OAuthConfig;
use std::collections::BTreeSet;

/// Canonical form of an issuer identifier: trailing slashes removed
pub fn normalize_issuer(issuer: &str) -> String {
    issuer.trim_end_matches('/').to_string()
}

/// Audiences a token may be addressed to
#[derive(Debug, Clone, PartialEq)]
pub enum Audiences {
    Any,
    Only(BTreeSet<String>),
}

/// Issuers and audiences the gateway trusts
#[derive(Debug, Clone, Default)]
pub struct IssuerAllowList {
    issuers: Vec<String>,
    normalized: BTreeSet<String>,
    audiences: BTreeSet<String>,
}

impl IssuerAllowList {
    pub fn new<I, A>(issuers: I, audiences: A) -> Self
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
        A: IntoIterator,
        A::Item: AsRef<str>,
    {
        let issuers: Vec<String> = issuers
            .into_iter()
            .map(|issuer| issuer.as_ref().trim().to_string())
            .filter(|issuer| !issuer.is_empty())
            .collect();
        let normalized = issuers.iter().map(|i| normalize_issuer(i)).collect();
        let audiences = audiences
            .into_iter()
            .map(|aud| aud.as_ref().trim().to_string())
            .filter(|aud| !aud.is_empty())
            .collect();
        Self {
            issuers,
            normalized,
            audiences,
        }
    }

    pub fn from_config(config: &OAuthConfig) -> Self {
        Self::new(config.get_allowed_issuers(), config.get_allowed_audiences())
    }

    pub fn is_allowed(&self, issuer: &str) -> bool {
        self.normalized.contains(&normalize_issuer(issuer))
    }

    pub fn allowed_audiences(&self) -> Audiences {
        if self.audiences.is_empty() {
            Audiences::Any
        } else {
            Audiences::Only(self.audiences.clone())
        }
    }

    /// Issuers as configured, in configuration order
    pub fn issuers(&self) -> &[String] {
        &self.issuers
    }

    pub fn is_empty(&self) -> bool {
        self.issuers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_trailing_slashes() {
        assert_eq!(normalize_issuer("https://idp.example/"), "https://idp.example");
        assert_eq!(normalize_issuer("https://idp.example///"), "https://idp.example");
        assert_eq!(
            normalize_issuer("https://idp.example/tenant"),
            "https://idp.example/tenant"
        );
    }

    #[test]
    fn test_trailing_slash_variants_match() {
        let list = IssuerAllowList::new(["https://idp.example/"], Vec::<String>::new());
        assert!(list.is_allowed("https://idp.example"));
        assert!(list.is_allowed("https://idp.example/"));
        assert!(!list.is_allowed("https://idp.example.evil"));
        assert!(!list.is_allowed("https://other.example"));
    }

    #[test]
    fn test_empty_audiences_accept_any() {
        let list = IssuerAllowList::new(["https://idp.example"], [" ", ""]);
        assert_eq!(list.allowed_audiences(), Audiences::Any);

        let list = IssuerAllowList::new(["https://idp.example"], ["api://gw"]);
        assert_eq!(
            list.allowed_audiences(),
            Audiences::Only(BTreeSet::from(["api://gw".to_string()]))
        );
    }

    #[test]
    fn test_empty_allow_list() {
        let list = IssuerAllowList::from_config(&OAuthConfig::default());
        assert!(list.is_empty());
        assert!(!list.is_allowed(""));
    }
}
