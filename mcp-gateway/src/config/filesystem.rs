use serde::Deserialize;

/// Filesystem tool settings
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct FilesystemConfig {
    /// Directory every filesystem tool is confined to (default: ".")
    pub root: String,
}

impl Default for FilesystemConfig {
    fn default() -> Self {
        Self {
            root: ".".to_string(),
        }
    }
}
