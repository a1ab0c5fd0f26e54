//! Plain REST access to the GitHub tools, outside the MCP protocol.

use crate::auth::AuthContext;
use crate::errors::ApiError;
use crate::openapi::GITHUB_TAG;
use crate::state::AppState;
use crate::tools::github::{
    BranchSummary, CodeSearchHit, CreatedIssue, FileContent, GitHubError, GitHubTools,
    IssueSummary, Labels, RepositoryDetails, RepositorySummary, DEFAULT_SEARCH_LIMIT,
};
use crate::tools::ToolProvider;
use axum::{
    extract::{Extension, Path, Query, State},
    routing::get,
    Json, Router,
};
use log::{debug, error};
use serde::Deserialize;
use serde_json::{json, Value};
use utoipa::{IntoParams, ToSchema};

type ApiResult = Result<Json<Value>, ApiError>;

/// Applies the tool's scope requirement to a REST caller
fn authorize(state: &AppState, context: &AuthContext, operation: &str) -> Result<(), ApiError> {
    state
        .policy
        .check(operation, context.auth())
        .map_err(|e| {
            debug!("Denied {operation}: {e}");
            ApiError::forbidden("insufficient_scope")
        })
}

fn upstream(operation: &str) -> impl FnOnce(GitHubError) -> ApiError + '_ {
    move |e| {
        error!("GitHub {operation} failed: {e}");
        ApiError::bad_gateway(e)
    }
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub(crate) struct IssuesQuery {
    /// open, closed or all (default: open)
    state: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub(crate) struct CreateIssueRequest {
    title: Option<String>,
    body: Option<String>,
    labels: Option<Labels>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub(crate) struct ContentsQuery {
    /// File path inside the repository
    path: Option<String>,
    branch: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub(crate) struct SearchQuery {
    /// GitHub code search query
    q: Option<String>,
    limit: Option<u32>,
}

/// Lists the GitHub tools with their input schemas
#[utoipa::path(
    get,
    path = "/github/tools",
    tag = GITHUB_TAG,
    responses((status = 200, description = "Tool descriptors")),
    security(("bearer" = []))
)]
pub(crate) async fn list_tools(State(state): State<AppState>) -> ApiResult {
    let tools = GitHubTools::new(state.github.clone()).tools();
    Ok(Json(json!({
        "success": true,
        "count": tools.len(),
        "tools": tools,
    })))
}

#[utoipa::path(
    get,
    path = "/github/repos",
    tag = GITHUB_TAG,
    responses(
        (status = 200, description = "Repositories of the token owner", body = [RepositorySummary]),
        (status = 403, description = "Missing git:read scope"),
        (status = 502, description = "GitHub request failed"),
    ),
    security(("bearer" = []))
)]
pub(crate) async fn list_repositories(
    State(state): State<AppState>,
    Extension(context): Extension<AuthContext>,
) -> ApiResult {
    authorize(&state, &context, "list_repositories")?;
    let repos = state
        .github
        .list_repositories()
        .await
        .map_err(upstream("list_repositories"))?;
    Ok(Json(json!({
        "success": true,
        "count": repos.len(),
        "repositories": repos,
    })))
}

#[utoipa::path(
    get,
    path = "/github/repos/{owner}/{repo}",
    tag = GITHUB_TAG,
    params(("owner" = String, Path), ("repo" = String, Path)),
    responses(
        (status = 200, description = "Repository details", body = RepositoryDetails),
        (status = 502, description = "GitHub request failed"),
    ),
    security(("bearer" = []))
)]
pub(crate) async fn get_repository(
    State(state): State<AppState>,
    Extension(context): Extension<AuthContext>,
    Path((owner, repo)): Path<(String, String)>,
) -> ApiResult {
    authorize(&state, &context, "get_repository")?;
    let repository = state
        .github
        .get_repository(&owner, &repo)
        .await
        .map_err(upstream("get_repository"))?;
    Ok(Json(json!({ "success": true, "repository": repository })))
}

#[utoipa::path(
    get,
    path = "/github/repos/{owner}/{repo}/issues",
    tag = GITHUB_TAG,
    params(("owner" = String, Path), ("repo" = String, Path), IssuesQuery),
    responses(
        (status = 200, description = "Repository issues", body = [IssueSummary]),
        (status = 502, description = "GitHub request failed"),
    ),
    security(("bearer" = []))
)]
pub(crate) async fn list_issues(
    State(state): State<AppState>,
    Extension(context): Extension<AuthContext>,
    Path((owner, repo)): Path<(String, String)>,
    Query(query): Query<IssuesQuery>,
) -> ApiResult {
    authorize(&state, &context, "list_issues")?;
    let issue_state = query.state.as_deref().unwrap_or("open");
    let issues = state
        .github
        .list_issues(&owner, &repo, issue_state)
        .await
        .map_err(upstream("list_issues"))?;
    Ok(Json(json!({
        "success": true,
        "count": issues.len(),
        "issues": issues,
    })))
}

#[utoipa::path(
    post,
    path = "/github/repos/{owner}/{repo}/issues",
    tag = GITHUB_TAG,
    params(("owner" = String, Path), ("repo" = String, Path)),
    request_body = CreateIssueRequest,
    responses(
        (status = 200, description = "Created issue", body = CreatedIssue),
        (status = 400, description = "Title missing"),
        (status = 502, description = "GitHub request failed"),
    ),
    security(("bearer" = []))
)]
pub(crate) async fn create_issue(
    State(state): State<AppState>,
    Extension(context): Extension<AuthContext>,
    Path((owner, repo)): Path<(String, String)>,
    Json(request): Json<CreateIssueRequest>,
) -> ApiResult {
    authorize(&state, &context, "create_issue")?;
    let title = request
        .title
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("Title is required"))?;
    let labels = request.labels.map(Labels::into_vec).unwrap_or_default();
    let issue = state
        .github
        .create_issue(&owner, &repo, &title, request.body.as_deref(), labels)
        .await
        .map_err(upstream("create_issue"))?;
    Ok(Json(json!({ "success": true, "issue": issue })))
}

#[utoipa::path(
    get,
    path = "/github/repos/{owner}/{repo}/contents",
    tag = GITHUB_TAG,
    params(("owner" = String, Path), ("repo" = String, Path), ContentsQuery),
    responses(
        (status = 200, description = "Decoded file content", body = FileContent),
        (status = 400, description = "Path missing"),
        (status = 502, description = "GitHub request failed"),
    ),
    security(("bearer" = []))
)]
pub(crate) async fn get_file_content(
    State(state): State<AppState>,
    Extension(context): Extension<AuthContext>,
    Path((owner, repo)): Path<(String, String)>,
    Query(query): Query<ContentsQuery>,
) -> ApiResult {
    authorize(&state, &context, "get_file_content")?;
    let path = query.path.filter(|p| !p.is_empty()).ok_or_else(|| {
        ApiError::bad_request("File path is required as query parameter (?path=...)")
    })?;
    let file = state
        .github
        .get_file_content(&owner, &repo, &path, query.branch.as_deref())
        .await
        .map_err(upstream("get_file_content"))?;
    Ok(Json(json!({ "success": true, "file": file })))
}

#[utoipa::path(
    get,
    path = "/github/repos/{owner}/{repo}/branches",
    tag = GITHUB_TAG,
    params(("owner" = String, Path), ("repo" = String, Path)),
    responses(
        (status = 200, description = "Repository branches", body = [BranchSummary]),
        (status = 502, description = "GitHub request failed"),
    ),
    security(("bearer" = []))
)]
pub(crate) async fn list_branches(
    State(state): State<AppState>,
    Extension(context): Extension<AuthContext>,
    Path((owner, repo)): Path<(String, String)>,
) -> ApiResult {
    authorize(&state, &context, "list_branches")?;
    let branches = state
        .github
        .list_branches(&owner, &repo)
        .await
        .map_err(upstream("list_branches"))?;
    Ok(Json(json!({
        "success": true,
        "count": branches.len(),
        "branches": branches,
    })))
}

#[utoipa::path(
    get,
    path = "/github/search/code",
    tag = GITHUB_TAG,
    params(SearchQuery),
    responses(
        (status = 200, description = "Code search hits", body = [CodeSearchHit]),
        (status = 400, description = "Query missing"),
        (status = 502, description = "GitHub request failed"),
    ),
    security(("bearer" = []))
)]
pub(crate) async fn search_code(
    State(state): State<AppState>,
    Extension(context): Extension<AuthContext>,
    Query(query): Query<SearchQuery>,
) -> ApiResult {
    authorize(&state, &context, "search_code")?;
    let q = query
        .q
        .filter(|q| !q.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("Query parameter \"q\" is required"))?;
    let results = state
        .github
        .search_code(&q, query.limit.unwrap_or(DEFAULT_SEARCH_LIMIT))
        .await
        .map_err(upstream("search_code"))?;
    Ok(Json(json!({
        "success": true,
        "count": results.len(),
        "results": results,
    })))
}

pub(super) fn router() -> Router<AppState> {
    Router::new()
        .route("/github/tools", get(list_tools))
        .route("/github/repos", get(list_repositories))
        .route("/github/repos/{owner}/{repo}", get(get_repository))
        .route(
            "/github/repos/{owner}/{repo}/issues",
            get(list_issues).post(create_issue),
        )
        .route("/github/repos/{owner}/{repo}/contents", get(get_file_content))
        .route("/github/repos/{owner}/{repo}/branches", get(list_branches))
        .route("/github/search/code", get(search_code))
}

#[cfg(test)]
mod tests {
    use crate::test_utils::{TestFixture, STATIC_TOKEN};
    use http::{Method, StatusCode};
    use serde_json::json;
    use wiremock::{matchers, Mock, ResponseTemplate};

    fn repo_json(name: &str) -> serde_json::Value {
        json!({
            "name": name,
            "full_name": format!("octo/{name}"),
            "description": null,
            "html_url": format!("https://github.com/octo/{name}"),
            "private": false,
            "updated_at": "2024-01-01T00:00:00Z",
            "stargazers_count": 3,
            "language": "Rust",
        })
    }

    #[tokio::test]
    async fn test_list_tools() {
        let fixture = TestFixture::new().await;
        let response = fixture.get("/github/tools", Some(STATIC_TOKEN)).await;
        response.assert_ok();
        assert_eq!(response.json["count"], 7);
        assert_eq!(response.json["tools"][0]["name"], "list_repositories");
    }

    #[tokio::test]
    async fn test_list_repositories() {
        let fixture = TestFixture::new().await;
        fixture
            .add_github_mock(
                Method::GET,
                "/user/repos",
                json!([repo_json("demo"), repo_json("other")]),
                StatusCode::OK,
                1,
            )
            .await;

        let response = fixture.get("/github/repos", Some(STATIC_TOKEN)).await;
        response.assert_ok();
        assert_eq!(response.json["success"], true);
        assert_eq!(response.json["count"], 2);
        assert_eq!(response.json["repositories"][0]["full_name"], "octo/demo");
        assert_eq!(response.json["repositories"][0]["stars"], 3);
    }

    #[tokio::test]
    async fn test_rest_route_enforces_scopes() {
        let fixture = TestFixture::new().await;
        fixture
            .add_github_mock(Method::GET, "/user/repos", json!([]), StatusCode::OK, 0)
            .await;
        let token = fixture.token(json!({"sub": "alice", "scope": "issues:read"}));

        let response = fixture.get("/github/repos", Some(&token)).await;
        response.assert_status(StatusCode::FORBIDDEN);
        assert_eq!(response.json["success"], false);
        assert_eq!(response.json["error"], "insufficient_scope");
    }

    #[tokio::test]
    async fn test_list_issues_forwards_state() {
        let fixture = TestFixture::new().await;
        Mock::given(matchers::method("GET"))
            .and(matchers::path("/repos/octo/demo/issues"))
            .and(matchers::query_param("state", "closed"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(1)
            .mount(&fixture.github_mock)
            .await;
        let token = fixture.token(json!({"sub": "alice", "scope": "issues:read"}));

        let response = fixture
            .get("/github/repos/octo/demo/issues?state=closed", Some(&token))
            .await;
        response.assert_ok();
        assert_eq!(response.json["count"], 0);
    }

    #[tokio::test]
    async fn test_create_issue_requires_title() {
        let fixture = TestFixture::new().await;
        let response = fixture
            .post_json(
                "/github/repos/octo/demo/issues",
                Some(STATIC_TOKEN),
                &json!({"body": "no title"}),
            )
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(response.json["error"], "Title is required");
    }

    #[tokio::test]
    async fn test_create_issue_with_csv_labels() {
        let fixture = TestFixture::new().await;
        Mock::given(matchers::method("POST"))
            .and(matchers::path("/repos/octo/demo/issues"))
            .and(matchers::body_partial_json(
                json!({"title": "Bug", "labels": ["bug", "p1"]}),
            ))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "number": 42,
                "title": "Bug",
                "state": "open",
                "html_url": "https://github.com/octo/demo/issues/42",
                "created_at": "2024-01-01T00:00:00Z",
            })))
            .expect(1)
            .mount(&fixture.github_mock)
            .await;

        let response = fixture
            .post_json(
                "/github/repos/octo/demo/issues",
                Some(STATIC_TOKEN),
                &json!({"title": "Bug", "labels": "bug, p1"}),
            )
            .await;
        response.assert_ok();
        assert_eq!(response.json["issue"]["number"], 42);
    }

    #[tokio::test]
    async fn test_contents_requires_path() {
        let fixture = TestFixture::new().await;
        let response = fixture
            .get("/github/repos/octo/demo/contents", Some(STATIC_TOKEN))
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_search_requires_query() {
        let fixture = TestFixture::new().await;
        let response = fixture.get("/github/search/code", Some(STATIC_TOKEN)).await;
        response.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(response.json["error"], "Query parameter \"q\" is required");
    }

    #[tokio::test]
    async fn test_upstream_failure_is_bad_gateway() {
        let fixture = TestFixture::new().await;
        fixture
            .add_github_mock(
                Method::GET,
                "/repos/octo/missing",
                json!({"message": "Not Found"}),
                StatusCode::NOT_FOUND,
                1,
            )
            .await;

        let response = fixture
            .get("/github/repos/octo/missing", Some(STATIC_TOKEN))
            .await;
        response.assert_status(StatusCode::BAD_GATEWAY);
        assert_eq!(response.json["success"], false);
        assert!(response.json["error"]
            .as_str()
            .unwrap()
            .contains("Not Found"));
    }
}
