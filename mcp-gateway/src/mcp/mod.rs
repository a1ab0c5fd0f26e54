//! Model Context Protocol endpoint.

pub mod engine;
pub mod protocol;
pub mod session;

pub use engine::McpEngine;
pub use session::{McpHttpRequest, SessionManager};
