//! Tool providers exposed over MCP.

pub mod filesystem;
pub mod github;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;

/// Tool metadata advertised through `tools/list`
#[derive(Debug, Clone, Serialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

impl ToolDescriptor {
    /// Describes a tool whose arguments deserialize into `A`
    pub fn new<A: JsonSchema>(name: &str, description: &str) -> Self {
        let mut input_schema = serde_json::to_value(schemars::schema_for!(A))
            .unwrap_or_else(|_| json!({ "type": "object" }));
        if let Some(schema) = input_schema.as_object_mut() {
            schema.remove("$schema");
            schema.remove("title");
        }
        Self {
            name: name.to_string(),
            description: description.to_string(),
            input_schema,
        }
    }
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Invalid arguments: {0}")]
    InvalidArguments(#[from] serde_json::Error),

    #[error(transparent)]
    GitHub(#[from] github::GitHubError),

    #[error("Failed to {action}: {reason}")]
    Filesystem {
        action: &'static str,
        reason: String,
    },
}

/// A named group of tools backed by one upstream
#[async_trait]
pub trait ToolProvider: Send + Sync {
    fn name(&self) -> &'static str;

    fn tools(&self) -> Vec<ToolDescriptor>;

    async fn call(&self, tool: &str, arguments: Value) -> Result<Value, ToolError>;
}

/// Deserializes tool arguments, treating absent arguments as an empty object
pub(crate) fn parse_args<T: DeserializeOwned>(arguments: Value) -> Result<T, ToolError> {
    let arguments = match arguments {
        Value::Null => json!({}),
        other => other,
    };
    Ok(serde_json::from_value(arguments)?)
}

pub(crate) fn to_output<T: Serialize>(value: T) -> Result<Value, ToolError> {
    Ok(serde_json::to_value(value)?)
}
