//! Library documentation lookup through the Context7 MCP server.
//!
//! `resolve_library_id` → `resolve-library-id`,
//! `get_library_docs` → `get-library-docs`.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use super::args::{optional_str, required_str, u64_or, validate_tool_arguments};
use super::factory::{CapabilityType, HandlerFactory};
use super::mcp_session::McpSession;
use super::process::{find_executable, DEFAULT_COMMAND_TIMEOUT};
use super::{success, CapabilityHandler, HandlerConfig, HandlerError};
use crate::discovery::ToolSchema;

pub const CONTEXT7_PACKAGE: &str = "@upstash/context7-mcp";

/// Handler for Context7 documentation tools.
pub struct Context7Handler {
    package: String,
    timeout: Duration,
    session: Option<McpSession>,
}

impl Context7Handler {
    pub fn new(config: &HandlerConfig) -> Self {
        Self {
            package: config
                .option_str("package")
                .unwrap_or(CONTEXT7_PACKAGE)
                .to_string(),
            timeout: config
                .option_u64("timeout_secs")
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_COMMAND_TIMEOUT),
            session: None,
        }
    }

    fn attach(&mut self, npx: PathBuf) {
        self.session = Some(McpSession::new(
            "Context7 MCP",
            npx,
            vec!["-y".to_string(), self.package.clone()],
            self.timeout,
        ));
    }

    async fn call(&self, tool: &str, params: Value) -> Result<Value, HandlerError> {
        let session = self.session.as_ref().ok_or_else(|| {
            HandlerError::DependencyMissing("npx (handler not initialized)".to_string())
        })?;
        log::debug!("Calling Context7 MCP: {} with {}", tool, params);
        session.call_tool(tool, params).await
    }

    async fn resolve_library_id(&self, args: &Value) -> Result<Value, HandlerError> {
        let library_name = required_str(args, "libraryName")?;
        let results = self
            .call("resolve-library-id", json!({"libraryName": library_name}))
            .await?;
        Ok(success(
            "resolve_library_id",
            json!({"libraryName": library_name, "results": results}),
        ))
    }

    async fn get_library_docs(&self, args: &Value) -> Result<Value, HandlerError> {
        let library_id = required_str(args, "context7CompatibleLibraryID")?;
        let topic = optional_str(args, "topic");
        let page = u64_or(args, "page", 1);
        if !(1..=10).contains(&page) {
            return Err(HandlerError::InvalidArguments(format!(
                "page must be between 1 and 10, got {}",
                page
            )));
        }

        let mut params = Map::new();
        params.insert("context7CompatibleLibraryID".into(), json!(library_id));
        if let Some(topic) = topic {
            params.insert("topic".into(), json!(topic));
        }
        if page != 1 {
            params.insert("page".into(), json!(page));
        }

        let results = self.call("get-library-docs", Value::Object(params)).await?;
        Ok(success(
            "get_library_docs",
            json!({"libraryID": library_id, "topic": topic, "page": page, "results": results}),
        ))
    }
}

#[async_trait]
impl CapabilityHandler for Context7Handler {
    async fn initialize(&mut self) -> Result<(), HandlerError> {
        let npx = find_executable("npx").ok_or_else(|| {
            HandlerError::DependencyMissing(
                "npx not found. Install Node.js 18+ from https://nodejs.org/".to_string(),
            )
        })?;
        log::info!("npx found at: {}", npx.display());
        log::info!("Context7 will be installed on first use via npx");
        self.attach(npx);
        Ok(())
    }

    async fn get_tool_schema(&self, tool_name: &str) -> Result<ToolSchema, HandlerError> {
        schema(tool_name)
    }

    async fn execute(&self, tool_name: &str, arguments: &Value) -> Result<Value, HandlerError> {
        validate_tool_arguments(&schema(tool_name)?, arguments)?;
        match tool_name {
            "resolve_library_id" => self.resolve_library_id(arguments).await,
            "get_library_docs" => self.get_library_docs(arguments).await,
            other => Err(HandlerError::UnknownTool(other.to_string())),
        }
    }

    async fn cleanup(&self) -> Result<(), HandlerError> {
        if let Some(session) = &self.session {
            session.close().await;
        }
        Ok(())
    }
}

fn schema(tool_name: &str) -> Result<ToolSchema, HandlerError> {
    match tool_name {
        "resolve_library_id" => Ok(ToolSchema::new(
            "resolve_library_id",
            "Resolve a general library name into a Context7-compatible library ID. \
             Returns matching libraries with details to help select the right one.",
            json!({
                "type": "object",
                "properties": {
                    "libraryName": {
                        "type": "string",
                        "description": "Library name to search for (e.g., 'react', 'next.js', 'supabase')"
                    }
                },
                "required": ["libraryName"]
            }),
        )),
        "get_library_docs" => Ok(ToolSchema::new(
            "get_library_docs",
            "Fetch up-to-date documentation for a library using Context7-compatible library ID. \
             Returns version-specific code examples and API documentation.",
            json!({
                "type": "object",
                "properties": {
                    "context7CompatibleLibraryID": {
                        "type": "string",
                        "description": "Exact Context7-compatible library ID (e.g., '/mongodb/docs', \
                                        '/vercel/next.js'). Use resolve_library_id first to find this ID."
                    },
                    "topic": {
                        "type": "string",
                        "description": "Optional topic to focus docs on (e.g., 'routing', 'hooks')"
                    },
                    "page": {
                        "type": "integer",
                        "description": "Page number for pagination (1-10). Default: 1",
                        "default": 1,
                        "minimum": 1,
                        "maximum": 10
                    }
                },
                "required": ["context7CompatibleLibraryID"]
            }),
        )),
        other => Err(HandlerError::UnknownTool(other.to_string())),
    }
}

/// Factory for [`Context7Handler`].
pub struct Context7HandlerFactory;

impl HandlerFactory for Context7HandlerFactory {
    fn create(&self, config: &HandlerConfig) -> Result<Box<dyn CapabilityHandler>, HandlerError> {
        Ok(Box::new(Context7Handler::new(config)))
    }

    fn capability_type(&self) -> CapabilityType {
        CapabilityType::Docs
    }
}
