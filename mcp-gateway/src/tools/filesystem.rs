//! File tools confined to a configured root directory.

use super::{parse_args, to_output, ToolDescriptor, ToolError, ToolProvider};
use crate::config::filesystem::FilesystemConfig;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::Metadata;
use std::path::{Component, Path, PathBuf};
use tokio::fs;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FileRead {
    path: String,
    full_path: String,
    content: String,
    size: u64,
    modified: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FileWritten {
    path: String,
    full_path: String,
    size: u64,
    modified: Option<String>,
    success: bool,
}

#[derive(Debug, Serialize)]
struct DirectoryEntry {
    name: String,
    #[serde(rename = "type")]
    kind: &'static str,
    size: u64,
    modified: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DirectoryListing {
    path: String,
    full_path: String,
    items: Vec<DirectoryEntry>,
    count: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DirectoryCreated {
    path: String,
    full_path: String,
    success: bool,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct ReadFileArgs {
    /// File path relative to the root directory
    path: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct WriteFileArgs {
    /// File path relative to the root directory
    path: String,
    /// Content to write
    content: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct ListDirectoryArgs {
    /// Directory path relative to the root directory (default: ".")
    #[serde(default)]
    path: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct CreateDirectoryArgs {
    /// Directory path relative to the root directory
    path: String,
    /// Create parent directories if needed (default: true)
    #[serde(default)]
    recursive: Option<bool>,
}

/// Filesystem tools exposed over MCP
#[derive(Debug, Clone)]
pub struct FilesystemTools {
    root: PathBuf,
}

impl FilesystemTools {
    pub fn new(config: &FilesystemConfig) -> Result<Self, std::io::Error> {
        Ok(Self {
            root: std::fs::canonicalize(&config.root)?,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves a caller-supplied path lexically and rejects anything
    /// outside the root.
    fn resolve(&self, user_path: &str, action: &'static str) -> Result<PathBuf, ToolError> {
        let mut resolved = PathBuf::new();
        for component in self.root.join(user_path).components() {
            match component {
                Component::ParentDir => {
                    resolved.pop();
                }
                Component::CurDir => {}
                other => resolved.push(other.as_os_str()),
            }
        }

        if !resolved.starts_with(&self.root) {
            return Err(ToolError::Filesystem {
                action,
                reason: format!(
                    "Access denied: Path must be within {}",
                    self.root.display()
                ),
            });
        }
        Ok(resolved)
    }

    async fn read_file(&self, path: String) -> Result<FileRead, ToolError> {
        const ACTION: &str = "read file";
        let full_path = self.resolve(&path, ACTION)?;
        let metadata = fs::metadata(&full_path).await.map_err(io_error(ACTION))?;
        if !metadata.is_file() {
            return Err(failure(ACTION, "Path is not a file"));
        }
        let content = fs::read_to_string(&full_path)
            .await
            .map_err(io_error(ACTION))?;

        Ok(FileRead {
            path,
            full_path: full_path.display().to_string(),
            content,
            size: metadata.len(),
            modified: modified(&metadata),
        })
    }

    async fn write_file(&self, path: String, content: String) -> Result<FileWritten, ToolError> {
        const ACTION: &str = "write file";
        let full_path = self.resolve(&path, ACTION)?;
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).await.map_err(io_error(ACTION))?;
        }
        fs::write(&full_path, content)
            .await
            .map_err(io_error(ACTION))?;
        let metadata = fs::metadata(&full_path).await.map_err(io_error(ACTION))?;

        Ok(FileWritten {
            path,
            full_path: full_path.display().to_string(),
            size: metadata.len(),
            modified: modified(&metadata),
            success: true,
        })
    }

    async fn list_directory(&self, path: String) -> Result<DirectoryListing, ToolError> {
        const ACTION: &str = "list directory";
        let full_path = self.resolve(&path, ACTION)?;
        let metadata = fs::metadata(&full_path).await.map_err(io_error(ACTION))?;
        if !metadata.is_dir() {
            return Err(failure(ACTION, "Path is not a directory"));
        }

        let mut entries = fs::read_dir(&full_path).await.map_err(io_error(ACTION))?;
        let mut items = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(io_error(ACTION))? {
            let metadata = fs::metadata(entry.path())
                .await
                .map_err(io_error(ACTION))?;
            items.push(DirectoryEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                kind: if metadata.is_dir() { "directory" } else { "file" },
                size: metadata.len(),
                modified: modified(&metadata),
            });
        }
        items.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(DirectoryListing {
            path,
            full_path: full_path.display().to_string(),
            count: items.len(),
            items,
        })
    }

    async fn create_directory(
        &self,
        path: String,
        recursive: bool,
    ) -> Result<DirectoryCreated, ToolError> {
        const ACTION: &str = "create directory";
        let full_path = self.resolve(&path, ACTION)?;
        let created = if recursive {
            fs::create_dir_all(&full_path).await
        } else {
            fs::create_dir(&full_path).await
        };
        created.map_err(io_error(ACTION))?;

        Ok(DirectoryCreated {
            path,
            full_path: full_path.display().to_string(),
            success: true,
        })
    }
}

fn failure(action: &'static str, reason: &str) -> ToolError {
    ToolError::Filesystem {
        action,
        reason: reason.to_string(),
    }
}

fn io_error(action: &'static str) -> impl Fn(std::io::Error) -> ToolError {
    move |e| ToolError::Filesystem {
        action,
        reason: e.to_string(),
    }
}

fn modified(metadata: &Metadata) -> Option<String> {
    metadata
        .modified()
        .ok()
        .map(|time| DateTime::<Utc>::from(time).to_rfc3339_opts(SecondsFormat::Millis, true))
}

#[async_trait]
impl ToolProvider for FilesystemTools {
    fn name(&self) -> &'static str {
        "filesystem"
    }

    fn tools(&self) -> Vec<ToolDescriptor> {
        let base = self.root.display();
        vec![
            ToolDescriptor::new::<ReadFileArgs>(
                "read_file",
                &format!("Read file content (base: {base})"),
            ),
            ToolDescriptor::new::<WriteFileArgs>(
                "write_file",
                &format!("Write content to file (base: {base})"),
            ),
            ToolDescriptor::new::<ListDirectoryArgs>(
                "list_directory",
                &format!("List directory contents (base: {base})"),
            ),
            ToolDescriptor::new::<CreateDirectoryArgs>(
                "create_directory",
                &format!("Create directory (base: {base})"),
            ),
        ]
    }

    async fn call(&self, tool: &str, arguments: Value) -> Result<Value, ToolError> {
        match tool {
            "read_file" => {
                let args: ReadFileArgs = parse_args(arguments)?;
                to_output(self.read_file(args.path).await?)
            }
            "write_file" => {
                let args: WriteFileArgs = parse_args(arguments)?;
                to_output(self.write_file(args.path, args.content).await?)
            }
            "list_directory" => {
                let args: ListDirectoryArgs = parse_args(arguments)?;
                let path = args.path.unwrap_or_else(|| ".".to_string());
                to_output(self.list_directory(path).await?)
            }
            "create_directory" => {
                let args: CreateDirectoryArgs = parse_args(arguments)?;
                to_output(
                    self.create_directory(args.path, args.recursive.unwrap_or(true))
                        .await?,
                )
            }
            other => Err(ToolError::UnknownTool(other.to_string())),
        }
    }
}
