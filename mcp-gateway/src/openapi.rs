use crate::api::{github, health, mcp, well_known};
use crate::state::AppState;
use axum::{routing::get, Json, Router};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

pub(crate) const HEALTH_TAG: &str = "Health API";
pub(crate) const METADATA_TAG: &str = "Resource Metadata";
pub(crate) const MCP_TAG: &str = "MCP";
pub(crate) const GITHUB_TAG: &str = "GitHub API";

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        health::service_info,
        well_known::protected_resource_metadata,
        mcp::mcp_handler,
        github::list_tools,
        github::list_repositories,
        github::get_repository,
        github::list_issues,
        github::create_issue,
        github::get_file_content,
        github::list_branches,
        github::search_code,
    ),
    modifiers(&BearerAuth),
    tags(
        (name = HEALTH_TAG, description = "Health check endpoints"),
        (name = METADATA_TAG, description = "OAuth protected resource metadata"),
        (name = MCP_TAG, description = "Model Context Protocol endpoint"),
        (name = GITHUB_TAG, description = "GitHub tools over plain REST"),
    ),
    info(
        title = "MCP Gateway API",
        description = "Authenticating gateway for MCP tool servers",
        version = "0.1.0"
    )
)]
pub(crate) struct ApiDoc;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

/// Serves the generated OpenAPI document
pub(crate) fn router() -> Router<AppState> {
    Router::new().route(
        "/openapi.json",
        get(|| async { Json(ApiDoc::openapi()) }),
    )
}
