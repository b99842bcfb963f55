//! Memory search through the claude-mem HTTP API.
//!
//! ## Endpoints
//!
//! | tool                  | request                             |
//! |-----------------------|-------------------------------------|
//! | `mem_search`          | `POST /api/search {query, limit}`   |
//! | `mem_get_observation` | `GET /api/observation/{id}`         |
//! | `mem_recent_context`  | `GET /api/recent?limit=`            |
//! | `mem_timeline`        | `GET /api/timeline?limit=&start_date=&end_date=` |

use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{json, Value};

use super::args::{optional_str, required_str, scalar_text, u64_or, validate_tool_arguments};
use super::factory::{CapabilityType, HandlerFactory};
use super::{success, CapabilityHandler, HandlerConfig, HandlerError};
use crate::discovery::ToolSchema;

pub const DEFAULT_API_URL: &str = "http://localhost:37777";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Handler for claude-mem memory search tools.
pub struct ClaudeMemHandler {
    api_url: String,
    timeout: Duration,
    client: RwLock<Option<reqwest::Client>>,
}

impl ClaudeMemHandler {
    pub fn new(config: &HandlerConfig) -> Self {
        Self {
            api_url: config
                .api_url
                .clone()
                .unwrap_or_else(|| DEFAULT_API_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            timeout: config
                .option_u64("timeout_secs")
                .map(Duration::from_secs)
                .unwrap_or(REQUEST_TIMEOUT),
            client: RwLock::new(None),
        }
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    fn client(&self) -> Result<reqwest::Client, HandlerError> {
        self.client
            .read()
            .clone()
            .ok_or_else(|| HandlerError::Http("claude-mem client is closed".to_string()))
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Value, HandlerError> {
        let response = request.send().await.map_err(api_error)?;
        let response = response.error_for_status().map_err(api_error)?;
        response.json::<Value>().await.map_err(api_error)
    }

    async fn search(&self, args: &Value) -> Result<Value, HandlerError> {
        let query = required_str(args, "query")?;
        let limit = u64_or(args, "limit", 10);
        let request = self
            .client()?
            .post(format!("{}/api/search", self.api_url))
            .json(&json!({"query": query, "limit": limit}));
        let results = self.send(request).await?;
        Ok(success("mem_search", json!({"query": query, "results": results})))
    }

    async fn get_observation(&self, args: &Value) -> Result<Value, HandlerError> {
        let id = args
            .get("id")
            .and_then(scalar_text)
            .ok_or_else(|| HandlerError::InvalidArguments("'id' is required".to_string()))?;
        let request = self
            .client()?
            .get(format!("{}/api/observation/{}", self.api_url, id));
        let observation = self.send(request).await?;
        Ok(success(
            "mem_get_observation",
            json!({"id": args["id"], "observation": observation}),
        ))
    }

    async fn recent_context(&self, args: &Value) -> Result<Value, HandlerError> {
        let limit = u64_or(args, "limit", 20);
        let request = self
            .client()?
            .get(format!("{}/api/recent", self.api_url))
            .query(&[("limit", limit.to_string())]);
        let observations = self.send(request).await?;
        Ok(success(
            "mem_recent_context",
            json!({"limit": limit, "observations": observations}),
        ))
    }

    async fn timeline(&self, args: &Value) -> Result<Value, HandlerError> {
        let mut query = vec![("limit", u64_or(args, "limit", 50).to_string())];
        if let Some(start) = optional_str(args, "start_date") {
            query.push(("start_date", start.to_string()));
        }
        if let Some(end) = optional_str(args, "end_date") {
            query.push(("end_date", end.to_string()));
        }
        let request = self
            .client()?
            .get(format!("{}/api/timeline", self.api_url))
            .query(&query);
        let timeline = self.send(request).await?;
        Ok(success("mem_timeline", json!({"timeline": timeline})))
    }
}

fn api_error(e: reqwest::Error) -> HandlerError {
    log::error!("Claude-mem API error: {}", e);
    HandlerError::Http(format!("Claude-mem API error: {}", e))
}

#[async_trait]
impl CapabilityHandler for ClaudeMemHandler {
    async fn initialize(&mut self) -> Result<(), HandlerError> {
        let client = reqwest::Client::builder().timeout(self.timeout).build()?;

        // Reachability is advisory: the service may come up later.
        match client.get(format!("{}/health", self.api_url)).send().await {
            Ok(resp) if resp.status().is_success() => {
                log::info!("Claude-mem API accessible at {}", self.api_url);
            }
            Ok(resp) => {
                log::warn!(
                    "Claude-mem API returned status {}. Memory search may not work correctly.",
                    resp.status()
                );
            }
            Err(e) => {
                log::warn!("Could not connect to Claude-mem API at {}: {}", self.api_url, e);
            }
        }

        *self.client.write() = Some(client);
        Ok(())
    }

    async fn get_tool_schema(&self, tool_name: &str) -> Result<ToolSchema, HandlerError> {
        schema(tool_name)
    }

    async fn execute(&self, tool_name: &str, arguments: &Value) -> Result<Value, HandlerError> {
        validate_tool_arguments(&schema(tool_name)?, arguments)?;
        match tool_name {
            "mem_search" => self.search(arguments).await,
            "mem_get_observation" => self.get_observation(arguments).await,
            "mem_recent_context" => self.recent_context(arguments).await,
            "mem_timeline" => self.timeline(arguments).await,
            other => Err(HandlerError::UnknownTool(other.to_string())),
        }
    }

    async fn cleanup(&self) -> Result<(), HandlerError> {
        self.client.write().take();
        Ok(())
    }
}

fn schema(tool_name: &str) -> Result<ToolSchema, HandlerError> {
    let schema = match tool_name {
        "mem_search" => ToolSchema::new(
            "mem_search",
            "Search memory observations using semantic search. \
             Returns relevant observations from past sessions.",
            json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string", "description": "Search query (natural language)"},
                    "limit": {
                        "type": "integer",
                        "description": "Maximum number of results (default: 10)",
                        "default": 10
                    }
                },
                "required": ["query"]
            }),
        ),
        "mem_get_observation" => ToolSchema::new(
            "mem_get_observation",
            "Get a specific observation by ID",
            json!({
                "type": "object",
                "properties": {"id": {"type": "integer", "description": "Observation ID"}},
                "required": ["id"]
            }),
        ),
        "mem_recent_context" => ToolSchema::new(
            "mem_recent_context",
            "Get recent context from past sessions. \
             Returns the most recent observations and insights.",
            json!({
                "type": "object",
                "properties": {
                    "limit": {
                        "type": "integer",
                        "description": "Maximum number of observations (default: 20)",
                        "default": 20
                    }
                }
            }),
        ),
        "mem_timeline" => ToolSchema::new(
            "mem_timeline",
            "Get timeline view of observations. Returns chronological view of past sessions.",
            json!({
                "type": "object",
                "properties": {
                    "limit": {
                        "type": "integer",
                        "description": "Maximum number of timeline entries (default: 50)",
                        "default": 50
                    },
                    "start_date": {"type": "string", "description": "Start date for timeline (ISO format)"},
                    "end_date": {"type": "string", "description": "End date for timeline (ISO format)"}
                }
            }),
        ),
        other => return Err(HandlerError::UnknownTool(other.to_string())),
    };
    Ok(schema)
}

/// Factory for [`ClaudeMemHandler`].
pub struct ClaudeMemHandlerFactory;

impl HandlerFactory for ClaudeMemHandlerFactory {
    fn create(&self, config: &HandlerConfig) -> Result<Box<dyn CapabilityHandler>, HandlerError> {
        Ok(Box::new(ClaudeMemHandler::new(config)))
    }

    fn capability_type(&self) -> CapabilityType {
        CapabilityType::Memory
    }
}
