//! Protocol engine shared by every transport session.

use super::protocol::{
    methods, JsonRpcError, JsonRpcRequest, LATEST_PROTOCOL_VERSION, SUPPORTED_PROTOCOL_VERSIONS,
};
use crate::auth::scope::ScopePolicy;
use crate::auth::{AuthError, AuthResult};
use crate::tools::{ToolDescriptor, ToolProvider};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Counters for per-request transport sessions
#[derive(Debug, Default)]
pub struct SessionStats {
    opened: AtomicU64,
    closed: AtomicU64,
}

impl SessionStats {
    pub fn opened(&self) -> u64 {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> u64 {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn active(&self) -> u64 {
        self.opened().saturating_sub(self.closed())
    }

    pub(crate) fn record_open(&self) {
        self.opened.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn record_close(&self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Failure of a single request, rendered as a JSON-RPC error
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Method not found: {0}")]
    MethodNotFound(String),

    #[error("Invalid params: {0}")]
    InvalidParams(String),

    #[error(transparent)]
    Denied(#[from] AuthError),
}

impl DispatchError {
    /// Scopes whose absence caused the failure
    pub fn required_scopes(&self) -> Option<&[String]> {
        match self {
            DispatchError::Denied(AuthError::InsufficientScope { required, .. }) => {
                Some(required)
            }
            _ => None,
        }
    }

    pub fn to_rpc_error(&self) -> JsonRpcError {
        match self {
            DispatchError::MethodNotFound(method) => JsonRpcError::method_not_found(method),
            DispatchError::InvalidParams(detail) => JsonRpcError::invalid_params(detail),
            DispatchError::Denied(AuthError::InsufficientScope { required, granted }) => {
                JsonRpcError::insufficient_scope(required, granted)
            }
            DispatchError::Denied(other) => JsonRpcError::unauthorized(other),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InitializeParams {
    #[serde(default)]
    protocol_version: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CallToolParams {
    name: String,
    #[serde(default)]
    arguments: Option<Value>,
}

#[derive(Debug, Serialize)]
struct TextContent {
    #[serde(rename = "type")]
    kind: &'static str,
    text: String,
}

#[derive(Debug, Serialize)]
struct CallToolResult {
    content: Vec<TextContent>,
    #[serde(rename = "isError", skip_serializing_if = "std::ops::Not::not")]
    is_error: bool,
}

impl CallToolResult {
    fn text(text: String, is_error: bool) -> Self {
        Self {
            content: vec![TextContent { kind: "text", text }],
            is_error,
        }
    }
}

struct RegisteredTool {
    descriptor: ToolDescriptor,
    provider: Arc<dyn ToolProvider>,
}

pub struct McpEngineBuilder {
    name: String,
    version: String,
    instructions: Option<String>,
    policy: ScopePolicy,
    providers: Vec<Arc<dyn ToolProvider>>,
}

impl McpEngineBuilder {
    pub fn instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    pub fn policy(mut self, policy: ScopePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn provider(mut self, provider: Arc<dyn ToolProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    pub fn build(self) -> McpEngine {
        let mut tools = BTreeMap::new();
        for provider in self.providers {
            for descriptor in provider.tools() {
                if !self.policy.has_entry(&descriptor.name) {
                    warn!(
                        "Tool '{}' has no scope requirement; any authenticated caller may invoke it",
                        descriptor.name
                    );
                }
                let name = descriptor.name.clone();
                let registered = RegisteredTool {
                    descriptor,
                    provider: Arc::clone(&provider),
                };
                if tools.insert(name.clone(), registered).is_some() {
                    warn!(
                        "Tool '{}' registered twice; provider '{}' replaces the earlier one",
                        name,
                        provider.name()
                    );
                }
            }
            debug!("Registered tool provider '{}'", provider.name());
        }
        info!("MCP engine ready with {} tool(s)", tools.len());

        McpEngine {
            name: self.name,
            version: self.version,
            instructions: self.instructions,
            policy: self.policy,
            tools,
            stats: SessionStats::default(),
        }
    }
}

/// Tool registry and method dispatch, built once at startup
pub struct McpEngine {
    name: String,
    version: String,
    instructions: Option<String>,
    policy: ScopePolicy,
    tools: BTreeMap<String, RegisteredTool>,
    stats: SessionStats,
}

impl McpEngine {
    pub fn builder(name: impl Into<String>, version: impl Into<String>) -> McpEngineBuilder {
        McpEngineBuilder {
            name: name.into(),
            version: version.into(),
            instructions: None,
            policy: ScopePolicy::default(),
            providers: Vec::new(),
        }
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    pub fn policy(&self) -> &ScopePolicy {
        &self.policy
    }

    pub fn tool_names(&self) -> impl Iterator<Item = &str> {
        self.tools.keys().map(String::as_str)
    }

    pub async fn handle_request(
        &self,
        request: &JsonRpcRequest,
        auth: &AuthResult,
    ) -> Result<Value, DispatchError> {
        match request.method.as_str() {
            methods::INITIALIZE => self.initialize(request.params.as_ref()),
            methods::PING => Ok(json!({})),
            methods::TOOLS_LIST => Ok(self.list_tools()),
            methods::TOOLS_CALL => self.call_tool(request.params.as_ref(), auth).await,
            methods::LOGGING_SET_LEVEL => {
                let level = request
                    .params
                    .as_ref()
                    .and_then(|p| p.get("level"))
                    .and_then(Value::as_str)
                    .ok_or_else(|| DispatchError::InvalidParams("missing level".to_string()))?;
                debug!("Client requested log level {}", level);
                Ok(json!({}))
            }
            other => Err(DispatchError::MethodNotFound(other.to_string())),
        }
    }

    pub fn handle_notification(&self, notification: &JsonRpcRequest) {
        match notification.method.as_str() {
            methods::INITIALIZED => debug!("Client initialized"),
            other => debug!("Ignoring notification {}", other),
        }
    }

    fn initialize(&self, params: Option<&Value>) -> Result<Value, DispatchError> {
        let params: InitializeParams = match params {
            Some(params) => serde_json::from_value(params.clone())
                .map_err(|e| DispatchError::InvalidParams(e.to_string()))?,
            None => InitializeParams {
                protocol_version: None,
            },
        };
        let protocol_version = params
            .protocol_version
            .as_deref()
            .filter(|v| SUPPORTED_PROTOCOL_VERSIONS.contains(v))
            .unwrap_or(LATEST_PROTOCOL_VERSION);

        let mut result = json!({
            "protocolVersion": protocol_version,
            "capabilities": {
                "tools": { "listChanged": false },
                "logging": {},
            },
            "serverInfo": {
                "name": self.name,
                "version": self.version,
            },
        });
        if let Some(instructions) = &self.instructions {
            result["instructions"] = json!(instructions);
        }
        Ok(result)
    }

    fn list_tools(&self) -> Value {
        let tools: Vec<Value> = self
            .tools
            .values()
            .map(|tool| {
                let mut entry = json!(tool.descriptor);
                entry["securitySchemes"] = self.policy.security_schemes(&tool.descriptor.name);
                entry
            })
            .collect();
        json!({ "tools": tools })
    }

    async fn call_tool(
        &self,
        params: Option<&Value>,
        auth: &AuthResult,
    ) -> Result<Value, DispatchError> {
        let params: CallToolParams = serde_json::from_value(params.cloned().unwrap_or(Value::Null))
            .map_err(|e| DispatchError::InvalidParams(e.to_string()))?;
        let tool = self
            .tools
            .get(&params.name)
            .ok_or_else(|| DispatchError::InvalidParams(format!("Unknown tool: {}", params.name)))?;

        if let Err(denied) = self.policy.check(&params.name, Some(auth)) {
            warn!(
                "Denied tool '{}' for subject '{}': {}",
                params.name, auth.subject, denied
            );
            return Err(denied.into());
        }

        let arguments = params.arguments.unwrap_or_else(|| json!({}));
        let result = match tool.provider.call(&params.name, arguments).await {
            Ok(output) => {
                let text = serde_json::to_string_pretty(&output).unwrap_or_else(|_| output.to_string());
                CallToolResult::text(text, false)
            }
            Err(e) => {
                warn!("Tool '{}' failed: {}", params.name, e);
                CallToolResult::text(format!("Error: {e}"), true)
            }
        };
        Ok(json!(result))
    }
}
