mod authn_middleware;
pub(crate) mod github;
pub(crate) mod health;
pub(crate) mod mcp;
pub(crate) mod request_logger;
pub(crate) mod well_known;

use crate::api::authn_middleware::authentication_middleware;
use crate::errors::ApiError;
use crate::state::AppState;
use axum::http::Uri;
use axum::{middleware, routing::any, Router};

/// Combines all API routes into a single router
pub(super) fn router(state: &AppState) -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(well_known::router())
        .merge(protected_routes(state))
}

/// Routes behind credential resolution
fn protected_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .merge(mcp::router())
        .merge(github::router())
        .fallback(any(not_found))
        // layer rather than route_layer so the fallback is covered too
        .layer(middleware::from_fn_with_state(
            state.clone(),
            authentication_middleware,
        ))
}

async fn not_found(uri: Uri) -> ApiError {
    ApiError::not_found(format!("No route for {}", uri.path()))
}
