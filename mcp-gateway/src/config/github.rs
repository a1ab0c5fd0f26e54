use serde::Deserialize;

/// GitHub REST API settings
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct GitHubConfig {
    /// Personal access token used for upstream calls
    pub token: Option<String>,

    /// Base URL of the GitHub REST API (default: https://api.github.com)
    pub api_url: String,

    /// Request timeout in seconds (default: 30)
    pub timeout: u64,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            token: None,
            api_url: "https://api.github.com".to_string(),
            timeout: 30,
        }
    }
}
