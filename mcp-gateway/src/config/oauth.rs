//! Identity provider trust configuration

use serde::Deserialize;
use std::time::Duration;

/// Settings that decide which bearer tokens the gateway trusts
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct OAuthConfig {
    /// Comma-separated issuer identifiers whose tokens are accepted
    pub allowed_issuers: String,

    /// Comma-separated audiences; empty accepts any audience
    pub allowed_audiences: String,

    /// Comma-separated authorization servers advertised in resource metadata.
    /// Falls back to the allowed issuers when empty.
    pub authorization_servers: String,

    /// Public resource identifier; inferred from the request when unset
    pub resource: Option<String>,

    /// Timeout for discovery and key set fetches in milliseconds (default: 5000)
    pub http_timeout_ms: u64,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            allowed_issuers: String::new(),
            allowed_audiences: String::new(),
            authorization_servers: String::new(),
            resource: None,
            http_timeout_ms: 5000,
        }
    }
}

impl OAuthConfig {
    pub fn get_allowed_issuers(&self) -> Vec<String> {
        split_list(&self.allowed_issuers)
    }

    pub fn get_allowed_audiences(&self) -> Vec<String> {
        split_list(&self.allowed_audiences)
    }

    /// Authorization servers to advertise, defaulting to the allowed issuers
    pub fn get_authorization_servers(&self) -> Vec<String> {
        let servers = split_list(&self.authorization_servers);
        if servers.is_empty() {
            self.get_allowed_issuers()
        } else {
            servers
        }
    }

    pub fn resource(&self) -> Option<&str> {
        self.resource
            .as_deref()
            .map(str::trim)
            .filter(|resource| !resource.is_empty())
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_oauth_config() {
        let config = OAuthConfig::default();
        assert!(config.get_allowed_issuers().is_empty());
        assert!(config.get_authorization_servers().is_empty());
        assert!(config.resource().is_none());
        assert_eq!(config.http_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_get_allowed_issuers_with_spaces() {
        let config = OAuthConfig {
            allowed_issuers: " https://a.example , ,https://b.example/ ".to_string(),
            ..Default::default()
        };
        assert_eq!(
            config.get_allowed_issuers(),
            vec!["https://a.example", "https://b.example/"]
        );
    }

    #[test]
    fn test_authorization_servers_fall_back_to_issuers() {
        let config = OAuthConfig {
            allowed_issuers: "https://a.example".to_string(),
            ..Default::default()
        };
        assert_eq!(config.get_authorization_servers(), vec!["https://a.example"]);

        let config = OAuthConfig {
            allowed_issuers: "https://a.example".to_string(),
            authorization_servers: "https://login.example".to_string(),
            ..Default::default()
        };
        assert_eq!(
            config.get_authorization_servers(),
            vec!["https://login.example"]
        );
    }

    #[test]
    fn test_blank_resource_is_unset() {
        let config = OAuthConfig {
            resource: Some("  ".to_string()),
            ..Default::default()
        };
        assert!(config.resource().is_none());
    }
}
