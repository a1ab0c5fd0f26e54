use crate::config::filesystem::FilesystemConfig;
use crate::config::github::GitHubConfig;
use crate::config::oauth::OAuthConfig;
use config::{Config as ConfigCrate, ConfigError};
use serde::Deserialize;

pub mod filesystem;
pub mod github;
pub mod oauth;

/// Main configuration structure for the gateway
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct GatewayConfig {
    /// Address the HTTP listener binds to (default: 127.0.0.1)
    pub host: String,

    /// The port the gateway will listen to (default: 9100)
    pub port: u16,

    /// Optional pre-shared bearer token granting every scope
    pub auth_token: Option<String>,

    /// Identity provider trust settings
    pub oauth: OAuthConfig,

    /// GitHub tool provider configuration
    pub github: GitHubConfig,

    /// Filesystem tool provider configuration
    pub filesystem: FilesystemConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9100,
            auth_token: None,
            oauth: OAuthConfig::default(),
            github: GitHubConfig::default(),
            filesystem: FilesystemConfig::default(),
        }
    }
}

impl GatewayConfig {
    /// Creates a new Config instance from environment variables
    pub fn new() -> Result<Self, String> {
        Self::from_environment(config::Environment::with_prefix("GATEWAY"))
    }

    fn from_environment(environment: config::Environment) -> Result<Self, String> {
        ConfigCrate::builder()
            .add_source(
                environment
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e: ConfigError| e.to_string())?
            .try_deserialize()
            .map_err(|e: ConfigError| e.to_string())
    }

    /// The static token, ignoring an empty value
    pub fn static_token(&self) -> Option<&str> {
        self.auth_token
            .as_deref()
            .map(str::trim)
            .filter(|token| !token.is_empty())
    }

    #[cfg(test)]
    pub fn for_test(
        idp_issuers: &[String],
        github_mock: &wiremock::MockServer,
        filesystem_root: &std::path::Path,
    ) -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            auth_token: Some(crate::test_utils::STATIC_TOKEN.to_string()),
            oauth: OAuthConfig {
                allowed_issuers: idp_issuers.join(","),
                http_timeout_ms: 2000,
                ..Default::default()
            },
            github: GitHubConfig {
                token: Some("ghp_test".to_string()),
                api_url: github_mock.uri(),
                timeout: 5,
            },
            filesystem: FilesystemConfig {
                root: filesystem_root.display().to_string(),
            },
        }
    }
}
