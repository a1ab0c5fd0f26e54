use crate::openapi::HEALTH_TAG;
use crate::state::AppState;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use utoipa::ToSchema;

/// Basic health check response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct Health {
    status: &'static str,
    timestamp: String,
    details: Option<Value>,
    #[serde(skip)]
    status_code: StatusCode,
}

impl IntoResponse for Health {
    fn into_response(self) -> Response {
        let mut body = json!({
            "status": self.status,
            "timestamp": self.timestamp,
        });

        if let Some(Value::Object(obj)) = self.details {
            for (key, value) in obj {
                body[key] = value;
            }
        }

        (self.status_code, Json(body)).into_response()
    }
}

/// Basic health check handler
#[utoipa::path(
    get,
    path = "/health",
    tag = HEALTH_TAG,
    responses(
        (status = 200, description = "Service is healthy", body = Health)
    )
)]
pub(crate) async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let stats = state.sessions.stats();
    Health {
        status: "ok",
        timestamp: chrono::Utc::now().to_rfc3339(),
        details: Some(json!({
            "service": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
            "tools": ["github", "filesystem"],
            "mode": "stateless",
            "sessions": {
                "opened": stats.opened(),
                "closed": stats.closed(),
                "active": stats.active(),
            }
        })),
        status_code: StatusCode::OK,
    }
}

/// Service description
#[utoipa::path(
    get,
    path = "/",
    tag = HEALTH_TAG,
    responses(
        (status = 200, description = "Service name, version and endpoints")
    )
)]
pub(crate) async fn service_info(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
        "authentication": {
            "static_token": state.static_token.is_some(),
            "issuers": state.verifier.allow_list().issuers(),
        },
        "tools": state.sessions.engine().tool_names().collect::<Vec<_>>(),
        "endpoints": {
            "health": "/health",
            "mcp": "/mcp",
            "protected_resource_metadata": "/.well-known/oauth-protected-resource",
            "github": "/github",
            "docs": "/scalar",
        },
    }))
}

pub(super) fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(service_info))
        .route("/health", get(health_check))
}
