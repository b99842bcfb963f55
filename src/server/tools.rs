//! The seven outward tools a client sees in `tools/list`.
//!
//! Everything else is reached through them: `search_tools` finds a tool,
//! `describe_tools` returns its schema, `execute_tool` runs it.

use std::sync::Arc;

use once_cell::sync::Lazy;
use serde_json::{json, Value};

use crate::capabilities::Registry;
use crate::discovery::{DescribedTool, ProgressiveDiscovery, ToolSchema};
use crate::handlers::args::{optional_str, u64_or, validate_tool_arguments};
use crate::server::SERVER_NAME;

pub const DEFAULT_MAX_RESULTS: u64 = 10;

static GATEWAY_TOOLS: Lazy<Vec<ToolSchema>> = Lazy::new(|| {
    let capability_name = json!({
        "type": "object",
        "properties": {
            "capability_name": {"type": "string", "description": "Name of the capability"}
        },
        "required": ["capability_name"]
    });
    vec![
        ToolSchema::new(
            "search_tools",
            "Search for relevant tools using natural language query. Returns lightweight previews (~50 tokens for 10 tools).",
            json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "Natural language search query (e.g., 'code search', 'authentication')"
                    },
                    "max_results": {
                        "type": "integer",
                        "description": "Maximum number of results to return",
                        "default": DEFAULT_MAX_RESULTS
                    }
                },
                "required": ["query"]
            }),
        ),
        ToolSchema::new(
            "describe_tools",
            "Get full schemas for specific tools. Returns detailed schemas (~200 tokens per tool).",
            json!({
                "type": "object",
                "properties": {
                    "tool_names": {
                        "type": "array",
                        "items": {"type": "string"},
                        "description": "List of tool names to describe"
                    }
                },
                "required": ["tool_names"]
            }),
        ),
        ToolSchema::new(
            "execute_tool",
            "Execute a specific tool with given arguments.",
            json!({
                "type": "object",
                "properties": {
                    "tool_name": {"type": "string", "description": "Name of the tool to execute"},
                    "arguments": {"type": "object", "description": "Tool arguments as key-value pairs"}
                },
                "required": ["tool_name", "arguments"]
            }),
        ),
        ToolSchema::new(
            "list_capabilities",
            "List all available capabilities and their status.",
            json!({"type": "object", "properties": {}}),
        ),
        ToolSchema::new(
            "enable_capability",
            "Dynamically enable a capability at runtime.",
            capability_name.clone(),
        ),
        ToolSchema::new(
            "disable_capability",
            "Dynamically disable a capability at runtime.",
            capability_name,
        ),
        ToolSchema::new(
            "get_server_info",
            "Get information about the unified MCP server.",
            json!({"type": "object", "properties": {}}),
        ),
    ]
});

/// `tools/list` entries: `{name, description, inputSchema}`.
pub fn tool_definitions() -> Vec<Value> {
    GATEWAY_TOOLS
        .iter()
        .map(|tool| {
            json!({
                "name": tool.name,
                "description": tool.description,
                "inputSchema": tool.input_schema,
            })
        })
        .collect()
}

/// Text result of one outward tool call.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    pub text: String,
    pub is_error: bool,
}

impl ToolOutput {
    fn ok(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_error: false,
        }
    }

    fn error(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_error: true,
        }
    }
}

/// Dispatches outward tool calls onto the registry.
#[derive(Clone)]
pub struct GatewayTools {
    discovery: ProgressiveDiscovery,
}

impl GatewayTools {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            discovery: ProgressiveDiscovery::new(registry),
        }
    }

    fn registry(&self) -> &Registry {
        self.discovery.registry()
    }

    /// Run one outward tool. Never fails: every error becomes error text.
    pub async fn call(&self, name: &str, arguments: &Value) -> ToolOutput {
        log::info!("Tool called: {} with arguments: {}", name, arguments);

        let Some(schema) = GATEWAY_TOOLS.iter().find(|t| t.name == name) else {
            return ToolOutput::error(format!("Error: Unknown tool '{}'", name));
        };
        let empty = json!({});
        let arguments = if arguments.is_null() { &empty } else { arguments };
        if let Err(e) = validate_tool_arguments(schema, arguments) {
            return ToolOutput::error(format!("Error: {}", e));
        }

        match name {
            "search_tools" => self.search_tools(arguments),
            "describe_tools" => self.describe_tools(arguments).await,
            "execute_tool" => self.execute_tool(arguments).await,
            "list_capabilities" => self.list_capabilities(),
            "enable_capability" => self.set_enabled(arguments, true),
            "disable_capability" => self.set_enabled(arguments, false),
            "get_server_info" => self.server_info(),
            _ => ToolOutput::error(format!("Error: Unknown tool '{}'", name)),
        }
    }

    fn search_tools(&self, arguments: &Value) -> ToolOutput {
        let query = optional_str(arguments, "query").unwrap_or("");
        let max_results = u64_or(arguments, "max_results", DEFAULT_MAX_RESULTS) as usize;

        let previews = self.discovery.search(query, max_results);
        if previews.is_empty() {
            return ToolOutput::ok(format!("No tools found matching '{}'", query));
        }

        let mut text = format!("Found {} matching tools:\n\n", previews.len());
        for preview in &previews {
            text.push_str(&format!("• **{}** ({})\n", preview.name, preview.capability));
            text.push_str(&format!("  {}\n", preview.description));
            text.push_str(&format!("  Est. tokens: {}\n\n", preview.tokens_estimate));
        }
        text.push_str("\nNext step: Use describe_tools([names]) to get full schemas");
        ToolOutput::ok(text)
    }

    async fn describe_tools(&self, arguments: &Value) -> ToolOutput {
        let Some(requested) = arguments.get("tool_names").and_then(|v| v.as_array()) else {
            return ToolOutput::error("Error: 'tool_names' must be a list of tool names");
        };
        if requested.is_empty() {
            return ToolOutput::ok("No schemas found");
        }
        let names: Vec<String> = requested
            .iter()
            .filter_map(|v| v.as_str().map(String::from))
            .collect();

        // Non-string entries keep their slot as an error entry.
        let mut schemas = self.registry().describe_tools(&names).await.into_iter();
        let described: Vec<DescribedTool> = requested
            .iter()
            .map(|value| match value.as_str() {
                Some(name) => schemas.next().unwrap_or_else(|| DescribedTool::Error {
                    name: name.to_string(),
                    error: "no schema returned".to_string(),
                }),
                None => DescribedTool::Error {
                    name: value.to_string(),
                    error: "tool name must be a string".to_string(),
                },
            })
            .collect();
        let mut text = format!("Tool schemas ({} tools):\n\n", described.len());
        for entry in &described {
            match entry {
                DescribedTool::Schema(schema) => {
                    let input = serde_json::to_string_pretty(&schema.input_schema).unwrap_or_default();
                    text.push_str(&format!("### {}\n{}\n\n", schema.name, schema.description));
                    text.push_str(&format!("**Input Schema:**\n```json\n{}\n```\n\n", input));
                }
                DescribedTool::Error { name, error } => {
                    text.push_str(&format!("### {}\nError: {}\n\n", name, error));
                }
            }
        }
        text.push_str("\nNext step: Use execute_tool(name, args) to run a tool");
        ToolOutput::ok(text)
    }

    async fn execute_tool(&self, arguments: &Value) -> ToolOutput {
        let tool_name = optional_str(arguments, "tool_name").unwrap_or("");
        let tool_arguments = arguments.get("arguments").cloned().unwrap_or_else(|| json!({}));

        match self.discovery.execute(tool_name, tool_arguments).await {
            Ok(result) => {
                let rendered = serde_json::to_string_pretty(&result).unwrap_or_default();
                ToolOutput::ok(format!("Tool '{}' result:\n```json\n{}\n```", tool_name, rendered))
            }
            Err(e) => {
                log::error!("execute_tool failed: {}", e);
                ToolOutput::error(format!("Error executing '{}': {}", tool_name, e))
            }
        }
    }

    fn list_capabilities(&self) -> ToolOutput {
        let capabilities = self.registry().capabilities();
        let mut text = format!("Available capabilities ({}):\n\n", capabilities.len());
        for cap in &capabilities {
            let status = if cap.enabled { "✓ Enabled" } else { "✗ Disabled" };
            text.push_str(&format!("• **{}** [{}]\n", cap.name, status));
            text.push_str(&format!("  Type: {}\n", cap.kind));
            text.push_str(&format!("  Tools: {}\n", cap.tools.join(", ")));
            text.push_str(&format!("  Loaded: {}\n", if cap.loaded { "yes" } else { "no" }));
            text.push_str(&format!("  {}\n\n", cap.description));
        }
        ToolOutput::ok(text)
    }

    fn set_enabled(&self, arguments: &Value, enabled: bool) -> ToolOutput {
        let name = optional_str(arguments, "capability_name").unwrap_or("");
        let outcome = if enabled {
            self.registry().enable_capability(name)
        } else {
            self.registry().disable_capability(name)
        };
        match outcome {
            Ok(()) if enabled => ToolOutput::ok(format!("✓ Enabled capability '{}'", name)),
            Ok(()) => ToolOutput::ok(format!("✓ Disabled capability '{}'", name)),
            Err(e) => ToolOutput::error(format!("Error: {}", e)),
        }
    }

    fn server_info(&self) -> ToolOutput {
        let registry = self.registry();
        let discovery = registry.discovery_config();
        let info = json!({
            "name": SERVER_NAME,
            "version": crate::VERSION,
            "capabilities_count": registry.len(),
            "enabled_capabilities": registry.enabled_capabilities(),
            "discovery_mode": discovery.mode,
            "max_tools_in_context": discovery.max_tools_in_context,
        });
        let rendered = serde_json::to_string_pretty(&info).unwrap_or_default();
        ToolOutput::ok(format!("Unified MCP Server Info:\n```json\n{}\n```", rendered))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::testing::{write_catalog, MockFactory};

    const CATALOG: &str = r#"
capabilities:
  code_understanding:
    enabled: true
    type: codanna
    source: capabilities/codanna
    tools: [search_code, find_symbol, failing_tool]
    description: Semantic code search
  documentation:
    type: context7
    source: capabilities/context7
    tools: [get_library_docs]
    description: Library documentation
discovery:
  mode: progressive
  max_tools_in_context: 5
"#;

    fn gateway() -> (tempfile::TempDir, GatewayTools) {
        let dir = tempfile::tempdir().unwrap();
        let path = write_catalog(dir.path(), CATALOG);
        let (factories, _) = MockFactory::table();
        let registry = Arc::new(Registry::with_factories(path, factories).unwrap());
        (dir, GatewayTools::new(registry))
    }

    #[test]
    fn test_definitions_list_seven_tools() {
        let defs = tool_definitions();
        let names: Vec<&str> = defs.iter().filter_map(|d| d["name"].as_str()).collect();
        assert_eq!(
            names,
            vec![
                "search_tools",
                "describe_tools",
                "execute_tool",
                "list_capabilities",
                "enable_capability",
                "disable_capability",
                "get_server_info"
            ]
        );
        assert_eq!(defs[0]["inputSchema"]["required"], json!(["query"]));
    }

    #[tokio::test]
    async fn test_search_text() {
        let (_dir, tools) = gateway();
        let out = tools.call("search_tools", &json!({"query": "symbol"})).await;
        assert!(!out.is_error);
        assert!(out.text.starts_with("Found 1 matching tools:"));
        assert!(out.text.contains("• **find_symbol** (code_understanding)"));
        assert!(out.text.ends_with("Next step: Use describe_tools([names]) to get full schemas"));

        let none = tools.call("search_tools", &json!({"query": "library"})).await;
        assert_eq!(none.text, "No tools found matching 'library'");
    }

    #[tokio::test]
    async fn test_missing_required_argument() {
        let (_dir, tools) = gateway();
        let out = tools.call("search_tools", &json!({})).await;
        assert!(out.is_error);
        assert!(out.text.contains("query"));
    }

    #[tokio::test]
    async fn test_describe_renders_errors_inline() {
        let (_dir, tools) = gateway();
        let out = tools
            .call("describe_tools", &json!({"tool_names": ["search_code", "nope"]}))
            .await;
        assert!(out.text.starts_with("Tool schemas (2 tools):"));
        assert!(out.text.contains("### search_code\nMock tool"));
        assert!(out.text.contains("**Input Schema:**\n```json\n"));
        assert!(out.text.contains("### nope\nError: Tool 'nope' not found in any capability"));
    }

    #[tokio::test]
    async fn test_describe_keeps_non_string_names_in_order() {
        let (_dir, tools) = gateway();
        let out = tools
            .call("describe_tools", &json!({"tool_names": [42, "search_code", null]}))
            .await;
        assert!(!out.is_error);
        assert!(out.text.starts_with("Tool schemas (3 tools):"));
        let bad_number = out.text.find("### 42\nError: tool name must be a string").unwrap();
        let schema = out.text.find("### search_code\nMock tool").unwrap();
        let bad_null = out.text.find("### null\nError: tool name must be a string").unwrap();
        assert!(bad_number < schema && schema < bad_null);

        let out = tools.call("describe_tools", &json!({"tool_names": [7]})).await;
        assert!(out.text.starts_with("Tool schemas (1 tools):"));

        let out = tools.call("describe_tools", &json!({"tool_names": []})).await;
        assert_eq!(out.text, "No schemas found");
    }

    #[tokio::test]
    async fn test_execute_success_and_failure() {
        let (_dir, tools) = gateway();
        let out = tools
            .call("execute_tool", &json!({"tool_name": "search_code", "arguments": {"query": "auth"}}))
            .await;
        assert!(!out.is_error);
        assert!(out.text.starts_with("Tool 'search_code' result:\n```json\n"));
        assert!(out.text.contains("\"query\": \"auth\""));

        let out = tools
            .call("execute_tool", &json!({"tool_name": "ghost", "arguments": {}}))
            .await;
        assert!(out.is_error);
        assert_eq!(out.text, "Error executing 'ghost': Tool 'ghost' not found in any capability");
    }

    #[tokio::test]
    async fn test_enable_disable_and_listing() {
        let (_dir, tools) = gateway();
        let out = tools
            .call("enable_capability", &json!({"capability_name": "documentation"}))
            .await;
        assert_eq!(out.text, "✓ Enabled capability 'documentation'");

        let listing = tools.call("list_capabilities", &json!({})).await;
        assert!(listing.text.starts_with("Available capabilities (2):"));
        assert!(listing.text.contains("• **documentation** [✓ Enabled]"));
        assert!(listing.text.contains("  Tools: search_code, find_symbol, failing_tool\n"));

        let out = tools
            .call("disable_capability", &json!({"capability_name": "ghost"}))
            .await;
        assert!(out.is_error);
        assert_eq!(out.text, "Error: Capability 'ghost' not found");
    }

    #[tokio::test]
    async fn test_server_info() {
        let (_dir, tools) = gateway();
        let out = tools.call("get_server_info", &Value::Null).await;
        let json_text = out
            .text
            .trim_start_matches("Unified MCP Server Info:\n```json\n")
            .trim_end_matches("\n```");
        let info: Value = serde_json::from_str(json_text).unwrap();
        assert_eq!(info["name"], "unified-dynamic-mcp");
        assert_eq!(info["version"], "1.0.0");
        assert_eq!(info["capabilities_count"], 2);
        assert_eq!(info["enabled_capabilities"], json!(["code_understanding"]));
        assert_eq!(info["max_tools_in_context"], 5);
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let (_dir, tools) = gateway();
        let out = tools.call("make_coffee", &json!({})).await;
        assert!(out.is_error);
        assert_eq!(out.text, "Error: Unknown tool 'make_coffee'");
    }
}
