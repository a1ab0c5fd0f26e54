//! GitHub REST API client and the tools built on it.

use super::{parse_args, to_output, ToolDescriptor, ToolError, ToolProvider};
use crate::config::github::GitHubConfig;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use http::header::{ACCEPT, AUTHORIZATION, USER_AGENT};
use http::{HeaderMap, HeaderValue};
use log::debug;
use reqwest::{Client, RequestBuilder, StatusCode};
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use utoipa::ToSchema;

#[derive(Debug, Error)]
pub enum GitHubError {
    #[error("GitHub request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("GitHub API returned {status}: {message}")]
    Api { status: StatusCode, message: String },

    #[error("Path is not a file")]
    NotAFile,

    #[error("Failed to decode file content: {0}")]
    Decode(String),

    #[error("Invalid GitHub configuration: {0}")]
    Config(String),
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RepositorySummary {
    pub name: String,
    pub full_name: String,
    pub description: Option<String>,
    pub url: String,
    pub private: bool,
    pub updated_at: Option<String>,
    pub stars: u64,
    pub language: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RepositoryDetails {
    pub name: String,
    pub full_name: String,
    pub description: Option<String>,
    pub url: String,
    pub private: bool,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    pub stars: u64,
    pub forks: u64,
    pub language: Option<String>,
    pub topics: Vec<String>,
    pub default_branch: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct IssueSummary {
    pub number: u64,
    pub title: String,
    pub body: Option<String>,
    pub state: String,
    pub url: String,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    pub labels: Vec<String>,
    pub assignees: Vec<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CreatedIssue {
    pub number: u64,
    pub title: String,
    pub url: String,
    pub created_at: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct FileContent {
    pub name: String,
    pub path: String,
    pub size: u64,
    pub content: String,
    pub sha: String,
    pub url: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CodeSearchHit {
    pub name: String,
    pub path: String,
    pub repository: String,
    pub url: String,
    pub score: f64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BranchSummary {
    pub name: String,
    pub protected: bool,
    pub commit_sha: String,
}

#[derive(Debug, Deserialize)]
struct ApiRepository {
    name: String,
    full_name: String,
    description: Option<String>,
    html_url: String,
    #[serde(default)]
    private: bool,
    created_at: Option<String>,
    updated_at: Option<String>,
    #[serde(default)]
    stargazers_count: u64,
    #[serde(default)]
    forks_count: u64,
    language: Option<String>,
    #[serde(default)]
    topics: Vec<String>,
    default_branch: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiIssue {
    number: u64,
    title: String,
    body: Option<String>,
    #[serde(default)]
    state: String,
    html_url: String,
    created_at: Option<String>,
    updated_at: Option<String>,
    #[serde(default)]
    labels: Vec<ApiLabel>,
    #[serde(default)]
    assignees: Vec<ApiUser>,
}

#[derive(Debug, Deserialize)]
struct ApiLabel {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ApiUser {
    login: String,
}

#[derive(Debug, Deserialize)]
struct ApiContent {
    #[serde(rename = "type")]
    kind: String,
    name: String,
    path: String,
    #[serde(default)]
    size: u64,
    content: Option<String>,
    sha: String,
    html_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiSearchResults {
    items: Vec<ApiSearchItem>,
}

#[derive(Debug, Deserialize)]
struct ApiSearchItem {
    name: String,
    path: String,
    repository: ApiRepositoryRef,
    html_url: String,
    #[serde(default)]
    score: f64,
}

#[derive(Debug, Deserialize)]
struct ApiRepositoryRef {
    full_name: String,
}

#[derive(Debug, Deserialize)]
struct ApiBranch {
    name: String,
    #[serde(default)]
    protected: bool,
    commit: ApiCommitRef,
}

#[derive(Debug, Deserialize)]
struct ApiCommitRef {
    sha: String,
}

/// Labels given either as a list or as a comma-separated string
#[derive(Debug, Clone, Deserialize, JsonSchema, ToSchema)]
#[serde(untagged)]
pub enum Labels {
    List(Vec<String>),
    Csv(String),
}

impl Labels {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            Labels::List(labels) => labels,
            Labels::Csv(labels) => labels
                .split(',')
                .map(|l| l.trim().to_string())
                .filter(|l| !l.is_empty())
                .collect(),
        }
    }
}

/// Thin client for the GitHub REST endpoints the gateway uses
#[derive(Debug, Clone)]
pub struct GitHubClient {
    client: Client,
    base_url: String,
}

impl GitHubClient {
    pub fn new(config: &GitHubConfig) -> Result<Self, GitHubError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!("mcp-gateway/", env!("CARGO_PKG_VERSION"))),
        );
        headers.insert(
            "x-github-api-version",
            HeaderValue::from_static("2022-11-28"),
        );
        if let Some(token) = config.token.as_deref().filter(|t| !t.is_empty()) {
            let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| GitHubError::Config(format!("invalid token: {e}")))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout))
            .connect_timeout(Duration::from_secs(5))
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            base_url: config.api_url.trim_end_matches('/').to_string(),
        })
    }

    pub async fn list_repositories(&self) -> Result<Vec<RepositorySummary>, GitHubError> {
        let repos: Vec<ApiRepository> = self
            .send(
                self.get("/user/repos")
                    .query(&[("sort", "updated"), ("per_page", "30")]),
            )
            .await?;
        Ok(repos
            .into_iter()
            .map(|repo| RepositorySummary {
                name: repo.name,
                full_name: repo.full_name,
                description: repo.description,
                url: repo.html_url,
                private: repo.private,
                updated_at: repo.updated_at,
                stars: repo.stargazers_count,
                language: repo.language,
            })
            .collect())
    }

    pub async fn get_repository(
        &self,
        owner: &str,
        repo: &str,
    ) -> Result<RepositoryDetails, GitHubError> {
        let repo: ApiRepository = self
            .send(self.get(&format!("/repos/{owner}/{repo}")))
            .await?;
        Ok(RepositoryDetails {
            name: repo.name,
            full_name: repo.full_name,
            description: repo.description,
            url: repo.html_url,
            private: repo.private,
            created_at: repo.created_at,
            updated_at: repo.updated_at,
            stars: repo.stargazers_count,
            forks: repo.forks_count,
            language: repo.language,
            topics: repo.topics,
            default_branch: repo.default_branch,
        })
    }

    pub async fn list_issues(
        &self,
        owner: &str,
        repo: &str,
        state: &str,
    ) -> Result<Vec<IssueSummary>, GitHubError> {
        let issues: Vec<ApiIssue> = self
            .send(
                self.get(&format!("/repos/{owner}/{repo}/issues"))
                    .query(&[("state", state), ("per_page", "30")]),
            )
            .await?;
        Ok(issues
            .into_iter()
            .map(|issue| IssueSummary {
                number: issue.number,
                title: issue.title,
                body: issue.body,
                state: issue.state,
                url: issue.html_url,
                created_at: issue.created_at,
                updated_at: issue.updated_at,
                labels: issue.labels.into_iter().map(|l| l.name).collect(),
                assignees: issue.assignees.into_iter().map(|a| a.login).collect(),
            })
            .collect())
    }

    pub async fn create_issue(
        &self,
        owner: &str,
        repo: &str,
        title: &str,
        body: Option<&str>,
        labels: Vec<String>,
    ) -> Result<CreatedIssue, GitHubError> {
        let issue: ApiIssue = self
            .send(
                self.client
                    .post(self.url(&format!("/repos/{owner}/{repo}/issues")))
                    .json(&json!({ "title": title, "body": body, "labels": labels })),
            )
            .await?;
        Ok(CreatedIssue {
            number: issue.number,
            title: issue.title,
            url: issue.html_url,
            created_at: issue.created_at,
        })
    }

    pub async fn get_file_content(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
        branch: Option<&str>,
    ) -> Result<FileContent, GitHubError> {
        let mut request = self.get(&format!(
            "/repos/{owner}/{repo}/contents/{}",
            path.trim_start_matches('/')
        ));
        if let Some(branch) = branch.filter(|b| !b.is_empty()) {
            request = request.query(&[("ref", branch)]);
        }

        // Directories come back as a JSON array
        let content: Value = self.send(request).await?;
        let content: ApiContent =
            serde_json::from_value(content).map_err(|_| GitHubError::NotAFile)?;
        if content.kind != "file" {
            return Err(GitHubError::NotAFile);
        }

        let encoded: String = content
            .content
            .unwrap_or_default()
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        let bytes = STANDARD
            .decode(encoded)
            .map_err(|e| GitHubError::Decode(e.to_string()))?;

        Ok(FileContent {
            name: content.name,
            path: content.path,
            size: content.size,
            content: String::from_utf8_lossy(&bytes).into_owned(),
            sha: content.sha,
            url: content.html_url,
        })
    }

    pub async fn search_code(
        &self,
        query: &str,
        limit: u32,
    ) -> Result<Vec<CodeSearchHit>, GitHubError> {
        let results: ApiSearchResults = self
            .send(
                self.get("/search/code")
                    .query(&[("q", query.to_string()), ("per_page", limit.to_string())]),
            )
            .await?;
        Ok(results
            .items
            .into_iter()
            .map(|item| CodeSearchHit {
                name: item.name,
                path: item.path,
                repository: item.repository.full_name,
                url: item.html_url,
                score: item.score,
            })
            .collect())
    }

    pub async fn list_branches(
        &self,
        owner: &str,
        repo: &str,
    ) -> Result<Vec<BranchSummary>, GitHubError> {
        let branches: Vec<ApiBranch> = self
            .send(
                self.get(&format!("/repos/{owner}/{repo}/branches"))
                    .query(&[("per_page", "50")]),
            )
            .await?;
        Ok(branches
            .into_iter()
            .map(|branch| BranchSummary {
                name: branch.name,
                protected: branch.protected,
                commit_sha: branch.commit.sha,
            })
            .collect())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn get(&self, path: &str) -> RequestBuilder {
        self.client.get(self.url(path))
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, GitHubError> {
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body: Value = response.json().await.unwrap_or(Value::Null);
            let message = body
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown error"))
                .to_string();
            debug!("GitHub API error {}: {}", status, message);
            return Err(GitHubError::Api { status, message });
        }
        Ok(response.json().await?)
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
struct NoArgs {}

#[derive(Debug, Deserialize, JsonSchema)]
struct RepoArgs {
    /// Repository owner
    owner: String,
    /// Repository name
    repo: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct ListIssuesArgs {
    /// Repository owner
    owner: String,
    /// Repository name
    repo: String,
    /// Issue state (default: open)
    #[serde(default)]
    state: Option<IssueState>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
enum IssueState {
    #[default]
    Open,
    Closed,
    All,
}

impl IssueState {
    fn as_str(self) -> &'static str {
        match self {
            IssueState::Open => "open",
            IssueState::Closed => "closed",
            IssueState::All => "all",
        }
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
struct CreateIssueArgs {
    /// Repository owner
    owner: String,
    /// Repository name
    repo: String,
    /// Issue title
    title: String,
    /// Issue body
    #[serde(default)]
    body: Option<String>,
    /// Issue labels, as a list or a comma-separated string
    #[serde(default)]
    labels: Option<Labels>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct FileContentArgs {
    /// Repository owner
    owner: String,
    /// Repository name
    repo: String,
    /// File path
    path: String,
    /// Branch name
    #[serde(default)]
    branch: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct SearchCodeArgs {
    /// Search query
    query: String,
    /// Result limit (default: 10)
    #[serde(default)]
    limit: Option<u32>,
}

/// Default number of code search results
pub const DEFAULT_SEARCH_LIMIT: u32 = 10;

/// GitHub tools exposed over MCP
pub struct GitHubTools {
    client: Arc<GitHubClient>,
}

impl GitHubTools {
    pub fn new(client: Arc<GitHubClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ToolProvider for GitHubTools {
    fn name(&self) -> &'static str {
        "github"
    }

    fn tools(&self) -> Vec<ToolDescriptor> {
        vec![
            ToolDescriptor::new::<NoArgs>(
                "list_repositories",
                "List repositories for authenticated user",
            ),
            ToolDescriptor::new::<RepoArgs>(
                "get_repository",
                "Get detailed information about a repository",
            ),
            ToolDescriptor::new::<ListIssuesArgs>("list_issues", "List issues for a repository"),
            ToolDescriptor::new::<CreateIssueArgs>(
                "create_issue",
                "Create a new issue in a repository",
            ),
            ToolDescriptor::new::<FileContentArgs>(
                "get_file_content",
                "Get content of a file from repository",
            ),
            ToolDescriptor::new::<SearchCodeArgs>(
                "search_code",
                "Search code across repositories",
            ),
            ToolDescriptor::new::<RepoArgs>("list_branches", "List branches for a repository"),
        ]
    }

    async fn call(&self, tool: &str, arguments: Value) -> Result<Value, ToolError> {
        let client = &self.client;
        match tool {
            "list_repositories" => {
                parse_args::<NoArgs>(arguments)?;
                to_output(client.list_repositories().await?)
            }
            "get_repository" => {
                let args: RepoArgs = parse_args(arguments)?;
                to_output(client.get_repository(&args.owner, &args.repo).await?)
            }
            "list_issues" => {
                let args: ListIssuesArgs = parse_args(arguments)?;
                let state = args.state.unwrap_or_default().as_str();
                to_output(client.list_issues(&args.owner, &args.repo, state).await?)
            }
            "create_issue" => {
                let args: CreateIssueArgs = parse_args(arguments)?;
                let labels = args.labels.map(Labels::into_vec).unwrap_or_default();
                to_output(
                    client
                        .create_issue(
                            &args.owner,
                            &args.repo,
                            &args.title,
                            args.body.as_deref(),
                            labels,
                        )
                        .await?,
                )
            }
            "get_file_content" => {
                let args: FileContentArgs = parse_args(arguments)?;
                to_output(
                    client
                        .get_file_content(
                            &args.owner,
                            &args.repo,
                            &args.path,
                            args.branch.as_deref(),
                        )
                        .await?,
                )
            }
            "search_code" => {
                let args: SearchCodeArgs = parse_args(arguments)?;
                let limit = args.limit.unwrap_or(DEFAULT_SEARCH_LIMIT);
                to_output(client.search_code(&args.query, limit).await?)
            }
            "list_branches" => {
                let args: RepoArgs = parse_args(arguments)?;
                to_output(client.list_branches(&args.owner, &args.repo).await?)
            }
            other => Err(ToolError::UnknownTool(other.to_string())),
        }
    }
}
