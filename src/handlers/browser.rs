//! Browser automation through the Playwright MCP server.
//!
//! A single `@playwright/mcp` child is kept for the lifetime of the handler
//! so the page opened by `playwright_navigate` is the one later clicks,
//! fills and screenshots act on.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::args::{as_object, validate_tool_arguments};
use super::factory::{CapabilityType, HandlerFactory};
use super::mcp_session::McpSession;
use super::process::{find_executable, DEFAULT_COMMAND_TIMEOUT};
use super::{success, CapabilityHandler, HandlerConfig, HandlerError};
use crate::discovery::ToolSchema;

pub const PLAYWRIGHT_PACKAGE: &str = "@playwright/mcp@latest";

/// Outward tool name → Playwright MCP tool name.
fn upstream_tool(tool_name: &str) -> Option<&'static str> {
    match tool_name {
        "playwright_navigate" => Some("browser_navigate"),
        "playwright_click" => Some("browser_click"),
        "playwright_screenshot" => Some("browser_take_screenshot"),
        "playwright_fill" => Some("browser_type"),
        "playwright_evaluate" => Some("browser_evaluate"),
        _ => None,
    }
}

/// Handler for Playwright browser automation tools.
pub struct PlaywrightHandler {
    package: String,
    extra_args: Vec<String>,
    timeout: Duration,
    session: Option<McpSession>,
}

impl PlaywrightHandler {
    pub fn new(config: &HandlerConfig) -> Self {
        Self {
            package: config
                .option_str("package")
                .unwrap_or(PLAYWRIGHT_PACKAGE)
                .to_string(),
            extra_args: config.option_str_list("args").unwrap_or_default(),
            timeout: config
                .option_u64("timeout_secs")
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_COMMAND_TIMEOUT),
            session: None,
        }
    }

    fn attach(&mut self, npx: PathBuf) {
        let mut args = vec!["-y".to_string(), self.package.clone()];
        args.extend(self.extra_args.iter().cloned());
        self.session = Some(McpSession::new("Playwright MCP", npx, args, self.timeout));
    }
}

#[async_trait]
impl CapabilityHandler for PlaywrightHandler {
    async fn initialize(&mut self) -> Result<(), HandlerError> {
        let npx = find_executable("npx").ok_or_else(|| {
            HandlerError::DependencyMissing(
                "npx not found. Install Node.js 18+ from https://nodejs.org/".to_string(),
            )
        })?;
        log::info!("npx found at: {}", npx.display());
        log::info!("Playwright MCP will be installed on first use via npx");
        self.attach(npx);
        Ok(())
    }

    async fn get_tool_schema(&self, tool_name: &str) -> Result<ToolSchema, HandlerError> {
        schema(tool_name)
    }

    async fn execute(&self, tool_name: &str, arguments: &Value) -> Result<Value, HandlerError> {
        validate_tool_arguments(&schema(tool_name)?, arguments)?;
        let upstream =
            upstream_tool(tool_name).ok_or_else(|| HandlerError::UnknownTool(tool_name.to_string()))?;
        let session = self.session.as_ref().ok_or_else(|| {
            HandlerError::DependencyMissing("npx (handler not initialized)".to_string())
        })?;

        let params = match tool_name {
            "playwright_navigate" => json!({"url": arguments["url"]}),
            _ => Value::Object(as_object(arguments)?.clone()),
        };
        log::debug!("Calling Playwright MCP: {} with {}", upstream, params);
        let result = session.call_tool(upstream, params).await?;

        let fields = match tool_name {
            "playwright_navigate" => json!({"url": arguments["url"], "result": result}),
            "playwright_click" => json!({"element": arguments["element"], "result": result}),
            "playwright_screenshot" => json!({
                "filename": arguments.get("filename").cloned().unwrap_or_else(|| json!("page-{timestamp}.png")),
                "result": result,
            }),
            "playwright_fill" => json!({
                "element": arguments["element"],
                "text": arguments["text"],
                "result": result,
            }),
            _ => json!({"result": result}),
        };
        Ok(success(tool_name, fields))
    }

    async fn cleanup(&self) -> Result<(), HandlerError> {
        if let Some(session) = &self.session {
            session.close().await;
        }
        Ok(())
    }
}

fn schema(tool_name: &str) -> Result<ToolSchema, HandlerError> {
    let element = json!({"type": "string", "description": "Human-readable element description"});
    let reference = json!({
        "type": "string",
        "description": "Exact target element reference from page snapshot"
    });

    let schema = match tool_name {
        "playwright_navigate" => ToolSchema::new(
            "playwright_navigate",
            "Navigate to a URL in the browser",
            json!({
                "type": "object",
                "properties": {"url": {"type": "string", "description": "The URL to navigate to"}},
                "required": ["url"]
            }),
        ),
        "playwright_click" => ToolSchema::new(
            "playwright_click",
            "Click an element on the web page",
            json!({
                "type": "object",
                "properties": {
                    "element": element,
                    "ref": reference,
                    "doubleClick": {"type": "boolean", "description": "Whether to perform a double click"}
                },
                "required": ["element", "ref"]
            }),
        ),
        "playwright_screenshot" => ToolSchema::new(
            "playwright_screenshot",
            "Take a screenshot of the current page or element",
            json!({
                "type": "object",
                "properties": {
                    "filename": {
                        "type": "string",
                        "description": "File name to save screenshot (defaults to page-{timestamp}.png)"
                    },
                    "type": {
                        "type": "string",
                        "description": "Image format: png or jpeg (default: png)",
                        "enum": ["png", "jpeg"]
                    },
                    "fullPage": {"type": "boolean", "description": "Take screenshot of full scrollable page"}
                }
            }),
        ),
        "playwright_fill" => ToolSchema::new(
            "playwright_fill",
            "Fill text into an input field",
            json!({
                "type": "object",
                "properties": {
                    "element": element,
                    "ref": reference,
                    "text": {"type": "string", "description": "Text to type into the element"},
                    "submit": {"type": "boolean", "description": "Whether to press Enter after typing"}
                },
                "required": ["element", "ref", "text"]
            }),
        ),
        "playwright_evaluate" => ToolSchema::new(
            "playwright_evaluate",
            "Evaluate JavaScript expression on page or element",
            json!({
                "type": "object",
                "properties": {
                    "function": {
                        "type": "string",
                        "description": "JavaScript function to execute: () => { /* code */ }"
                    },
                    "element": {"type": "string", "description": "Optional human-readable element description"},
                    "ref": {"type": "string", "description": "Optional exact element reference"}
                },
                "required": ["function"]
            }),
        ),
        other => return Err(HandlerError::UnknownTool(other.to_string())),
    };
    Ok(schema)
}

/// Factory for [`PlaywrightHandler`].
pub struct PlaywrightHandlerFactory;

impl HandlerFactory for PlaywrightHandlerFactory {
    fn create(&self, config: &HandlerConfig) -> Result<Box<dyn CapabilityHandler>, HandlerError> {
        Ok(Box::new(PlaywrightHandler::new(config)))
    }

    fn capability_type(&self) -> CapabilityType {
        CapabilityType::Browser
    }
}
