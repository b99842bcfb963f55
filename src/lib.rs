//! # Unified MCP
//!
//! One MCP server in front of several external tool families (code search,
//! library docs, browser automation, session memory, knowledge graph).
//!
//! Instead of injecting every tool's schema upfront, clients discover tools
//! progressively:
//!
//! 1. `search_tools` returns lightweight previews
//! 2. `describe_tools` returns full schemas for the chosen few
//! 3. `execute_tool` runs one, lazy-loading its capability on first use
//!
//! The [`capabilities::Registry`] owns catalog state and handler lifecycle,
//! [`handlers`] holds the per-family implementations, [`discovery`] the
//! typed façade and token estimator, and [`server`] the stdio JSON-RPC loop.

pub mod capabilities;
pub mod discovery;
pub mod handlers;
pub mod server;

pub use capabilities::{CapabilityConfig, CapabilityInfo, DiscoveryConfig, Registry, RegistryError};
pub use discovery::{estimate_token_cost, ProgressiveDiscovery, TokenCostEstimate, ToolPreview, ToolSchema};
pub use handlers::{CapabilityHandler, HandlerConfig, HandlerError};
pub use server::McpServer;

/// Server and client version reported over MCP.
pub const VERSION: &str = "1.0.0";
