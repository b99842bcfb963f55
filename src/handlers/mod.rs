//! Capability handlers: the uniform contract behind every capability.
//!
//! The registry only ever talks to a handler through [`CapabilityHandler`].
//! Concrete implementations wrap an external tool family:
//!
//! - [`code_search::CodannaHandler`] shells out to the `codanna` CLI
//! - [`docs::Context7Handler`] drives `@upstash/context7-mcp` over stdio
//! - [`browser::PlaywrightHandler`] drives `@playwright/mcp` over stdio
//! - [`memory::ClaudeMemHandler`] calls the claude-mem HTTP API
//! - [`knowledge_graph::GraphitiHandler`] keeps an embedded SQLite episode store
//!
//! Handlers are created by a [`factory::HandlerFactory`] looked up from the
//! capability's type tag, then initialized exactly once before first use.

pub mod args;
pub mod browser;
pub mod code_search;
pub mod docs;
pub mod factory;
pub mod knowledge_graph;
pub mod mcp_session;
pub mod memory;
pub mod process;

use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::Value;

use crate::discovery::ToolSchema;

pub use factory::{CapabilityType, HandlerFactories, HandlerFactory};

/// The handler contract.
///
/// Lifecycle: `initialize()` → any number of `get_tool_schema()` / `execute()`
/// calls (possibly concurrent) → `cleanup()`.
#[async_trait]
pub trait CapabilityHandler: Send + Sync {
    /// Verify external dependencies and prepare resources.
    ///
    /// Called once, before the handler is shared.
    async fn initialize(&mut self) -> Result<(), HandlerError>;

    /// Full schema for one tool this handler provides.
    async fn get_tool_schema(&self, tool_name: &str) -> Result<ToolSchema, HandlerError>;

    /// Run a tool.
    async fn execute(&self, tool_name: &str, arguments: &Value) -> Result<Value, HandlerError>;

    /// Release processes, connections and clients. Must be safe to call twice.
    async fn cleanup(&self) -> Result<(), HandlerError> {
        Ok(())
    }
}

/// Configuration handed to a factory when a capability is loaded.
#[derive(Debug, Clone, Default)]
pub struct HandlerConfig {
    pub name: String,
    pub kind: String,
    pub source: PathBuf,
    pub enabled: bool,
    pub tools: Vec<String>,
    pub description: String,
    pub api_url: Option<String>,
    /// Handler-specific settings (`auto_index`, `timeout_secs`, ...).
    pub options: BTreeMap<String, Value>,
}

impl HandlerConfig {
    pub fn option_bool(&self, key: &str) -> Option<bool> {
        self.options.get(key).and_then(|v| v.as_bool())
    }

    pub fn option_u64(&self, key: &str) -> Option<u64> {
        self.options.get(key).and_then(|v| v.as_u64())
    }

    pub fn option_str(&self, key: &str) -> Option<&str> {
        self.options.get(key).and_then(|v| v.as_str())
    }

    pub fn option_str_list(&self, key: &str) -> Option<Vec<String>> {
        self.options.get(key).and_then(|v| v.as_array()).map(|items| {
            items
                .iter()
                .filter_map(|item| item.as_str().map(String::from))
                .collect()
        })
    }
}

/// Handler error types.
///
/// Payloads are plain strings so the error can be cloned and handed to every
/// caller waiting on the same initialization.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum HandlerError {
    #[error("Dependency not found: {0}")]
    DependencyMissing(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Process error: {0}")]
    Process(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Timeout after {0}ms")]
    Timeout(u64),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<std::io::Error> for HandlerError {
    fn from(e: std::io::Error) -> Self {
        HandlerError::Process(e.to_string())
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(e: serde_json::Error) -> Self {
        HandlerError::Protocol(e.to_string())
    }
}

impl From<reqwest::Error> for HandlerError {
    fn from(e: reqwest::Error) -> Self {
        HandlerError::Http(e.to_string())
    }
}

impl From<rusqlite::Error> for HandlerError {
    fn from(e: rusqlite::Error) -> Self {
        HandlerError::Storage(e.to_string())
    }
}

/// Standard success envelope: `{"status": "success", "tool": <name>, ...fields}`.
pub(crate) fn success(tool: &str, fields: Value) -> Value {
    let mut out = serde_json::Map::new();
    out.insert("status".to_string(), Value::String("success".to_string()));
    out.insert("tool".to_string(), Value::String(tool.to_string()));
    if let Value::Object(extra) = fields {
        out.extend(extra);
    }
    Value::Object(out)
}
