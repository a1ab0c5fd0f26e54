//! OAuth 2.0 protected resource metadata (RFC 9728).

use crate::config::GatewayConfig;
use crate::headers::presets;
use crate::openapi::METADATA_TAG;
use crate::state::AppState;
use axum::{
    extract::State,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use http::HeaderMap;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub(crate) const METADATA_PATH: &str = "/.well-known/oauth-protected-resource";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ProtectedResourceMetadata {
    /// Identifier of this gateway as a protected resource
    pub resource: String,
    pub authorization_servers: Vec<String>,
    pub scopes_supported: Vec<String>,
    pub bearer_methods_supported: Vec<String>,
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// The configured resource identifier, else one inferred from forwarding headers
pub(crate) fn resource_identifier(config: &GatewayConfig, headers: &HeaderMap) -> String {
    if let Some(resource) = config.oauth.resource() {
        return resource.trim_end_matches('/').to_string();
    }

    let proto = header(headers, "x-forwarded-proto")
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .unwrap_or("http");
    let host = header(headers, "x-forwarded-host")
        .or_else(|| header(headers, http::header::HOST.as_str()))
        .unwrap_or("localhost");
    format!("{proto}://{host}")
}

/// Absolute URL of the metadata document, used in `WWW-Authenticate` challenges
pub(crate) fn resource_metadata_url(config: &GatewayConfig, headers: &HeaderMap) -> String {
    format!("{}{}", resource_identifier(config, headers), METADATA_PATH)
}

pub(crate) fn describe(state: &AppState, headers: &HeaderMap) -> ProtectedResourceMetadata {
    ProtectedResourceMetadata {
        resource: resource_identifier(&state.config, headers),
        authorization_servers: state.config.oauth.get_authorization_servers(),
        scopes_supported: state.policy.scopes_supported(),
        bearer_methods_supported: vec!["header".to_string()],
    }
}

#[utoipa::path(
    get,
    path = "/.well-known/oauth-protected-resource",
    tag = METADATA_TAG,
    responses(
        (status = 200, description = "Protected resource metadata", body = ProtectedResourceMetadata)
    )
)]
pub(crate) async fn protected_resource_metadata(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Response {
    let mut response = Json(describe(&state, &headers)).into_response();
    presets::no_store().apply(&mut response);
    response
}

pub(super) fn router() -> Router<AppState> {
    Router::new().route(METADATA_PATH, get(protected_resource_metadata))
}
