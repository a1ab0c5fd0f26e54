//! Multi-issuer JWT verification.

use super::discovery::DiscoveryCache;
use super::issuer::{normalize_issuer, Audiences, IssuerAllowList};
use super::jwks::KeySetError;
use super::{AuthError, AuthResult};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use log::{debug, warn};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Clock skew tolerated on `exp` and `nbf`
const LEEWAY_SECS: u64 = 60;

const SIGNING_ALGORITHMS: &[Algorithm] = &[
    Algorithm::RS256,
    Algorithm::RS384,
    Algorithm::RS512,
    Algorithm::PS256,
    Algorithm::PS384,
    Algorithm::PS512,
    Algorithm::ES256,
    Algorithm::ES384,
    Algorithm::EdDSA,
];

/// Verifies bearer JWTs against the allow-listed issuers
#[derive(Clone)]
pub struct TokenVerifier {
    allow_list: Arc<IssuerAllowList>,
    discovery: DiscoveryCache,
}

impl TokenVerifier {
    pub fn new(allow_list: IssuerAllowList, discovery: DiscoveryCache) -> Self {
        Self {
            allow_list: Arc::new(allow_list),
            discovery,
        }
    }

    pub fn allow_list(&self) -> &IssuerAllowList {
        &self.allow_list
    }

    pub async fn verify(&self, raw: &str) -> Result<AuthResult, AuthError> {
        let issuer = unverified_issuer(raw)?;
        if !self.allow_list.is_allowed(&issuer) {
            return Err(AuthError::IssuerNotAllowed(issuer));
        }

        let header = decode_header(raw).map_err(|e| AuthError::InvalidToken(e.to_string()))?;
        if !SIGNING_ALGORITHMS.contains(&header.alg) {
            return Err(AuthError::SignatureOrClaimInvalid(format!(
                "algorithm {:?} is not accepted",
                header.alg
            )));
        }

        let key_set = self.discovery.keys_for(&issuer).await?;
        let jwk = key_set
            .signing_key(header.kid.as_deref(), header.alg)
            .await
            .map_err(|e| match e {
                KeySetError::Fetch { .. } => AuthError::Discovery {
                    issuer: issuer.clone(),
                    reason: e.to_string(),
                },
                _ => AuthError::SignatureOrClaimInvalid(e.to_string()),
            })?;

        let key = DecodingKey::from_jwk(&jwk).map_err(|e| {
            debug!("Unusable key from {}: {}", issuer, e);
            AuthError::SignatureOrClaimInvalid(e.to_string())
        })?;
        let data = decode::<Map<String, Value>>(raw, &key, &self.validation(header.alg))
            .map_err(|e| AuthError::SignatureOrClaimInvalid(describe(e.kind())))?;
        auth_result(&issuer, data.claims)
    }

    fn validation(&self, alg: Algorithm) -> Validation {
        let mut validation = Validation::new(alg);
        validation.leeway = LEEWAY_SECS;
        validation.validate_exp = true;
        validation.validate_nbf = true;
        validation.set_required_spec_claims(&["exp", "iss"]);
        match self.allow_list.allowed_audiences() {
            Audiences::Any => validation.validate_aud = false,
            Audiences::Only(audiences) => {
                validation.set_required_spec_claims(&["exp", "iss", "aud"]);
                validation.set_audience(&audiences.iter().collect::<Vec<_>>())
            }
        }
        validation
    }
}

/// Reads `iss` from the payload without checking the signature, so the
/// issuer can be allow-listed before any network access.
fn unverified_issuer(raw: &str) -> Result<String, AuthError> {
    let mut segments = raw.split('.');
    let (Some(_), Some(payload), Some(_), None) = (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) else {
        return Err(AuthError::InvalidToken("not a compact JWS".to_string()));
    };

    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| AuthError::InvalidToken(format!("payload is not base64url: {e}")))?;
    let claims: Map<String, Value> = serde_json::from_slice(&bytes)
        .map_err(|e| AuthError::InvalidToken(format!("payload is not a JSON object: {e}")))?;

    match claims.get("iss").and_then(Value::as_str) {
        Some(iss) if !iss.trim().is_empty() => Ok(normalize_issuer(iss)),
        _ => Err(AuthError::InvalidToken("missing iss claim".to_string())),
    }
}

fn auth_result(issuer: &str, claims: Map<String, Value>) -> Result<AuthResult, AuthError> {
    let verified_issuer = claims
        .get("iss")
        .and_then(Value::as_str)
        .map(normalize_issuer);
    if verified_issuer.as_deref() != Some(issuer) {
        warn!("Verified iss does not match the allow-listed issuer {}", issuer);
        return Err(AuthError::SignatureOrClaimInvalid(
            "issuer mismatch".to_string(),
        ));
    }

    Ok(AuthResult {
        subject: claims
            .get("sub")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        issuer: issuer.to_string(),
        audience: audience(&claims),
        scopes: extract_scopes(&claims),
        claims,
    })
}

fn audience(claims: &Map<String, Value>) -> Option<Vec<String>> {
    match claims.get("aud")? {
        Value::String(aud) => Some(vec![aud.clone()]),
        Value::Array(items) => Some(
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
        ),
        _ => None,
    }
}

/// Shapes in which providers publish granted scopes
enum ScopeClaim<'a> {
    Delimited(&'a str),
    List(&'a [Value]),
    Absent,
}

impl<'a> ScopeClaim<'a> {
    /// `scope` wins over `scp` when both are present and non-empty
    fn from_claims(claims: &'a Map<String, Value>) -> Self {
        if let Some(Value::String(scope)) = claims.get("scope") {
            if !scope.trim().is_empty() {
                return ScopeClaim::Delimited(scope);
            }
        }
        match claims.get("scp") {
            Some(Value::Array(items)) => ScopeClaim::List(items),
            Some(Value::String(scp)) if !scp.trim().is_empty() => ScopeClaim::Delimited(scp),
            _ => ScopeClaim::Absent,
        }
    }
}

pub(crate) fn extract_scopes(claims: &Map<String, Value>) -> BTreeSet<String> {
    match ScopeClaim::from_claims(claims) {
        ScopeClaim::Delimited(scope) => scope.split_whitespace().map(str::to_string).collect(),
        ScopeClaim::List(items) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .filter(|s| !s.is_empty())
            .collect(),
        ScopeClaim::Absent => BTreeSet::new(),
    }
}

fn describe(kind: &ErrorKind) -> String {
    match kind {
        ErrorKind::ExpiredSignature => "token expired".to_string(),
        ErrorKind::ImmatureSignature => "token not yet valid".to_string(),
        ErrorKind::InvalidAudience => "audience not allowed".to_string(),
        ErrorKind::InvalidSignature => "signature mismatch".to_string(),
        ErrorKind::InvalidAlgorithm => "algorithm does not match key".to_string(),
        ErrorKind::MissingRequiredClaim(claim) => format!("missing required claim '{claim}'"),
        other => format!("{other:?}"),
    }
}
