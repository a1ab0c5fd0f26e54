use crate::api::well_known::resource_metadata_url;
use crate::auth::AuthContext;
use crate::errors::ApiError;
use crate::mcp::McpHttpRequest;
use crate::openapi::MCP_TAG;
use crate::state::AppState;
use axum::{
    body::to_bytes,
    extract::{Request, State},
    response::{IntoResponse, Response},
    routing::post,
    Router,
};
use log::debug;

/// Largest JSON-RPC payload accepted on the MCP endpoint
const MAX_BODY_BYTES: usize = 4 * 1024 * 1024;

/// MCP streamable HTTP endpoint
#[utoipa::path(
    post,
    path = "/mcp",
    tag = MCP_TAG,
    request_body(content = serde_json::Value, description = "JSON-RPC message or batch"),
    responses(
        (status = 200, description = "JSON-RPC response(s)"),
        (status = 202, description = "Notifications accepted"),
        (status = 401, description = "Missing or invalid credentials"),
        (status = 403, description = "Insufficient scope for the requested tool"),
    ),
    security(("bearer" = []))
)]
pub(crate) async fn mcp_handler(State(state): State<AppState>, request: Request) -> Response {
    let (mut parts, body) = request.into_parts();
    let body = match to_bytes(body, MAX_BODY_BYTES).await {
        Ok(body) => body,
        Err(e) => {
            debug!("Failed to read MCP request body: {e}");
            return ApiError::new("Request body too large", http::StatusCode::PAYLOAD_TOO_LARGE)
                .into_response();
        }
    };

    let auth = parts
        .extensions
        .remove::<AuthContext>()
        .unwrap_or(AuthContext::Unauthenticated(None));

    state
        .sessions
        .handle(McpHttpRequest {
            resource_metadata_url: resource_metadata_url(&state.config, &parts.headers),
            method: parts.method,
            headers: parts.headers,
            body,
            auth,
        })
        .await
}

pub(super) fn router() -> Router<AppState> {
    Router::new().route(
        "/mcp",
        post(mcp_handler).get(mcp_handler).delete(mcp_handler),
    )
}
