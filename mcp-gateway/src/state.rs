use crate::auth::discovery::DiscoveryCache;
use crate::auth::issuer::IssuerAllowList;
use crate::auth::scope::ScopePolicy;
use crate::auth::verifier::TokenVerifier;
use crate::auth::StaticToken;
use crate::config::GatewayConfig;
use crate::mcp::{McpEngine, SessionManager};
use crate::tools::filesystem::FilesystemTools;
use crate::tools::github::{GitHubClient, GitHubError, GitHubTools};
use log::{info, warn};
use std::sync::Arc;
use thiserror::Error;

const SERVER_INSTRUCTIONS: &str = "Tools for GitHub repositories and a sandboxed filesystem. \
Each tool requires the OAuth scopes listed in its securitySchemes.";

#[derive(Debug, Error)]
pub enum StateError {
    #[error("Failed to create HTTP client for discovery: {0}")]
    DiscoveryClient(#[from] reqwest::Error),

    #[error("Failed to create GitHub client: {0}")]
    GitHub(#[from] GitHubError),

    #[error("Invalid filesystem root '{root}': {source}")]
    FilesystemRoot {
        root: String,
        source: std::io::Error,
    },
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub static_token: Option<Arc<StaticToken>>,
    pub verifier: Arc<TokenVerifier>,
    pub policy: ScopePolicy,
    pub sessions: Arc<SessionManager>,
    pub github: Arc<GitHubClient>,
}

impl AppState {
    pub fn new(config: GatewayConfig) -> Result<Self, StateError> {
        let allow_list = IssuerAllowList::from_config(&config.oauth);
        let discovery = DiscoveryCache::new(config.oauth.http_timeout())?;
        let github = Arc::new(GitHubClient::new(&config.github)?);
        let filesystem =
            FilesystemTools::new(&config.filesystem).map_err(|source| StateError::FilesystemRoot {
                root: config.filesystem.root.clone(),
                source,
            })?;

        info!("Filesystem tools rooted at {}", filesystem.root().display());
        if config.github.token.is_none() {
            warn!("No GitHub token configured, GitHub tools will call the API anonymously");
        }

        let policy = ScopePolicy::default();
        let engine = McpEngine::builder(env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
            .instructions(SERVER_INSTRUCTIONS)
            .policy(policy)
            .provider(Arc::new(GitHubTools::new(github.clone())))
            .provider(Arc::new(filesystem))
            .build();

        Ok(Self::from_parts(
            config,
            TokenVerifier::new(allow_list, discovery),
            policy,
            engine,
            github,
        ))
    }

    /// Assembles state from already built components
    pub fn from_parts(
        config: GatewayConfig,
        verifier: TokenVerifier,
        policy: ScopePolicy,
        engine: McpEngine,
        github: Arc<GitHubClient>,
    ) -> Self {
        let static_token = config
            .static_token()
            .map(|token| Arc::new(StaticToken::new(token)));

        let state = Self {
            config: Arc::new(config),
            static_token,
            verifier: Arc::new(verifier),
            policy,
            sessions: Arc::new(SessionManager::new(Arc::new(engine))),
            github,
        };

        if state.credentials_configured() {
            info!(
                "Accepting static token: {}, trusted issuers: {:?}",
                state.static_token.is_some(),
                state.verifier.allow_list().issuers()
            );
        } else {
            warn!("Neither a static token nor trusted issuers are configured, every credential will be refused");
        }
        state
    }

    /// Whether any credential could ever be accepted
    pub fn credentials_configured(&self) -> bool {
        self.static_token.is_some() || !self.verifier.allow_list().is_empty()
    }
}
