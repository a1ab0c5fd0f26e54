//! Bearer credential verification and scope enforcement.

pub mod challenge;
pub mod discovery;
pub mod issuer;
pub mod jwks;
pub mod scope;
pub mod verifier;

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use thiserror::Error;

/// Scope granting every operation
pub const WILDCARD_SCOPE: &str = "*";

/// Identity established for a single request
#[derive(Debug, Clone, PartialEq)]
pub struct AuthResult {
    pub subject: String,
    pub issuer: String,
    pub audience: Option<Vec<String>>,
    pub scopes: BTreeSet<String>,
    pub claims: Map<String, Value>,
}

impl AuthResult {
    /// Identity of a caller presenting the pre-shared token
    pub fn static_token() -> Self {
        Self {
            subject: "pat".to_string(),
            issuer: "pat".to_string(),
            audience: None,
            scopes: BTreeSet::from([WILDCARD_SCOPE.to_string()]),
            claims: Map::new(),
        }
    }

    pub fn has_wildcard(&self) -> bool {
        self.scopes.contains(WILDCARD_SCOPE)
    }
}

/// Outcome of credential resolution, attached to every non-public request
#[derive(Debug, Clone)]
pub enum AuthContext {
    Authenticated(Arc<AuthResult>),
    /// No credential, or one that failed verification on a protocol path
    Unauthenticated(Option<AuthError>),
}

impl AuthContext {
    pub fn auth(&self) -> Option<&AuthResult> {
        match self {
            AuthContext::Authenticated(auth) => Some(auth),
            AuthContext::Unauthenticated(_) => None,
        }
    }
}

/// Errors raised while establishing or checking a caller's identity
#[derive(Debug, Clone, Error, PartialEq)]
pub enum AuthError {
    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Issuer not allowed: {0}")]
    IssuerNotAllowed(String),

    #[error("Discovery failed for issuer {issuer}: {reason}")]
    Discovery { issuer: String, reason: String },

    #[error("Token verification failed: {0}")]
    SignatureOrClaimInvalid(String),

    #[error("Insufficient scope: requires {}", required.join(" "))]
    InsufficientScope {
        required: Vec<String>,
        granted: Vec<String>,
    },

    #[error("Server misconfigured: {0}")]
    ServerMisconfigured(String),
}

impl AuthError {
    /// RFC 6750 error code carried in the `WWW-Authenticate` challenge
    pub fn oauth_error_code(&self) -> &'static str {
        match self {
            AuthError::InsufficientScope { .. } => "insufficient_scope",
            AuthError::ServerMisconfigured(_) => "server_error",
            _ => "invalid_token",
        }
    }
}

/// Pre-shared bearer token, stored as a digest and compared in constant time
#[derive(Clone)]
pub struct StaticToken {
    digest: [u8; 32],
}

impl StaticToken {
    pub fn new(token: &str) -> Self {
        Self {
            digest: Sha256::digest(token.as_bytes()).into(),
        }
    }

    pub fn matches(&self, candidate: &str) -> bool {
        let candidate: [u8; 32] = Sha256::digest(candidate.as_bytes()).into();
        self.digest.ct_eq(&candidate).into()
    }
}

impl std::fmt::Debug for StaticToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("StaticToken(..)")
    }
}
