//! Outward MCP server over stdio.
//!
//! Clients speak line-delimited JSON-RPC 2.0 and see seven gateway tools
//! (`search_tools`, `describe_tools`, `execute_tool`, `list_capabilities`,
//! `enable_capability`, `disable_capability`, `get_server_info`). Every
//! capability tool is reached through those.

pub mod protocol;
pub mod stdio;
pub mod tools;

pub const SERVER_NAME: &str = "unified-dynamic-mcp";

pub use protocol::{CallToolResult, RpcError, RpcErrorCode, RpcRequest, RpcResponse};
pub use stdio::{run_stdio, McpServer};
pub use tools::{tool_definitions, GatewayTools, ToolOutput};
