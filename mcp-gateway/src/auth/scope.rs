//! Tool-level scope requirements.

use super::{AuthError, AuthResult};
use serde_json::{json, Value};
use std::collections::BTreeSet;

pub type ScopeTable = &'static [(&'static str, &'static [&'static str])];

/// Scopes required by each tool; listed scopes are all required
pub const TOOL_SCOPES: ScopeTable = &[
    ("list_repositories", &["git:read"]),
    ("get_repository", &["git:read"]),
    ("list_branches", &["git:read"]),
    ("search_code", &["git:read"]),
    ("get_file_content", &["git:read"]),
    ("list_issues", &["issues:read"]),
    ("create_issue", &["issues:write"]),
    ("update_file", &["git:write"]),
    ("create_or_update_files", &["git:write"]),
    ("create_pull_request", &["git:write"]),
    ("read_file", &["files:read"]),
    ("list_directory", &["files:read"]),
    ("write_file", &["files:write"]),
    ("create_directory", &["files:write"]),
];

/// Static mapping from operation names to required scopes
#[derive(Debug, Clone, Copy)]
pub struct ScopePolicy {
    table: ScopeTable,
}

impl Default for ScopePolicy {
    fn default() -> Self {
        Self::new(TOOL_SCOPES)
    }
}

impl ScopePolicy {
    pub const fn new(table: ScopeTable) -> Self {
        Self { table }
    }

    /// Scopes an operation requires; operations without an entry require none
    pub fn required_scopes(&self, operation: &str) -> &'static [&'static str] {
        self.table
            .iter()
            .find(|(name, _)| *name == operation)
            .map(|(_, scopes)| *scopes)
            .unwrap_or(&[])
    }

    pub fn has_entry(&self, operation: &str) -> bool {
        self.table.iter().any(|(name, _)| *name == operation)
    }

    pub fn is_satisfied(auth: Option<&AuthResult>, required: &[&str]) -> bool {
        if required.is_empty() {
            return true;
        }
        let Some(auth) = auth else {
            return false;
        };
        auth.has_wildcard() || required.iter().all(|scope| auth.scopes.contains(*scope))
    }

    pub fn check(&self, operation: &str, auth: Option<&AuthResult>) -> Result<(), AuthError> {
        let required = self.required_scopes(operation);
        if Self::is_satisfied(auth, required) {
            return Ok(());
        }
        Err(AuthError::InsufficientScope {
            required: required.iter().map(|s| s.to_string()).collect(),
            granted: auth
                .map(|auth| auth.scopes.iter().cloned().collect())
                .unwrap_or_default(),
        })
    }

    /// Every distinct scope referenced by the table, sorted
    pub fn scopes_supported(&self) -> Vec<String> {
        self.table
            .iter()
            .flat_map(|(_, scopes)| scopes.iter())
            .map(|scope| scope.to_string())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Security schemes advertised for an operation in `tools/list`
    pub fn security_schemes(&self, operation: &str) -> Value {
        let required = self.required_scopes(operation);
        if required.is_empty() {
            json!([{ "type": "noauth" }])
        } else {
            json!([{ "type": "oauth2", "scopes": required }])
        }
    }
}
