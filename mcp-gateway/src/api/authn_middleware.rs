use crate::auth::{AuthContext, AuthError, AuthResult};
use crate::errors::ApiError;
use crate::state::AppState;
use axum::{
    body::Body,
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use http::HeaderMap;
use log::{debug, error, warn};
use std::sync::Arc;

fn is_public_path(path: &str) -> bool {
    path == "/" || path == "/health" || path.starts_with("/.well-known")
}

/// Paths speaking the MCP protocol, which report auth failures in-band
fn is_protocol_path(path: &str) -> bool {
    path == "/mcp" || path.starts_with("/mcp/")
}

/// Extracts the bearer credential, treating a blank value as absent
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let header = headers.get(http::header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = header.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// Resolves the caller's identity from the request headers.
///
/// Returns `Ok(Unauthenticated(None))` when no bearer credential is present.
async fn resolve_credential(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<AuthContext, AuthError> {
    let Some(token) = bearer_token(headers) else {
        return Ok(AuthContext::Unauthenticated(None));
    };

    if !state.credentials_configured() {
        return Err(AuthError::ServerMisconfigured(
            "no static token or allowed issuers configured".to_string(),
        ));
    }

    if let Some(static_token) = &state.static_token {
        if static_token.matches(token) {
            return Ok(AuthContext::Authenticated(Arc::new(
                AuthResult::static_token(),
            )));
        }
    }

    if state.verifier.allow_list().is_empty() {
        return Err(AuthError::InvalidToken(
            "token does not match the static token".to_string(),
        ));
    }

    let auth = state.verifier.verify(token).await?;
    Ok(AuthContext::Authenticated(Arc::new(auth)))
}

fn log_failure(path: &str, err: &AuthError) {
    match err {
        AuthError::ServerMisconfigured(_) => error!("Rejecting request to {path}: {err}"),
        AuthError::Discovery { .. } => error!("Authentication failed for {path}: {err}"),
        AuthError::IssuerNotAllowed(_) => warn!("Authentication failed for {path}: {err}"),
        _ => debug!("Authentication failed for {path}: {err}"),
    }
}

pub(super) async fn authentication_middleware(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    if is_public_path(&path) {
        return next.run(request).await;
    }
    let protocol = is_protocol_path(&path);

    let context = match resolve_credential(&state, request.headers()).await {
        Ok(AuthContext::Unauthenticated(None)) if !protocol => {
            warn!("Missing Authorization header for {path}");
            return ApiError::unauthorized("Missing Authorization header").into_response();
        }
        Ok(context) => context,
        Err(err @ AuthError::ServerMisconfigured(_)) => {
            log_failure(&path, &err);
            return ApiError::internal("Server misconfigured").into_response();
        }
        Err(err) => {
            log_failure(&path, &err);
            if !protocol {
                return ApiError::unauthorized("Invalid token").into_response();
            }
            AuthContext::Unauthenticated(Some(err))
        }
    };

    request.extensions_mut().insert(context);
    next.run(request).await
}
