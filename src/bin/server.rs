//! Unified MCP server binary.
//!
//! Speaks MCP (line-delimited JSON-RPC 2.0) on stdin/stdout. Logs go to
//! stderr so they never corrupt the protocol stream.
//!
//! # Configuration
//!
//! - first CLI argument: catalog path
//! - `UNIFIED_MCP_CATALOG`: catalog path when no argument is given
//!   (default: `config/catalog.yaml`)
//! - `RUST_LOG`: tracing filter (default: "info,unified_mcp=debug")
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin server -- config/catalog.yaml
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use unified_mcp::{McpServer, Registry};

const DEFAULT_CATALOG: &str = "config/catalog.yaml";

fn catalog_path() -> PathBuf {
    std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("UNIFIED_MCP_CATALOG").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CATALOG))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,unified_mcp=debug".into()),
        )
        .init();

    let catalog = catalog_path();
    let registry = Registry::open(&catalog)
        .with_context(|| format!("failed to load catalog {}", catalog.display()))?;
    let registry = Arc::new(registry);

    let eager = registry.preload_eager().await;

    tracing::info!("{}", "=".repeat(60));
    tracing::info!("Unified Dynamic MCP Server v{}", unified_mcp::VERSION);
    tracing::info!("{}", "=".repeat(60));
    tracing::info!("Catalog: {}", catalog.display());
    tracing::info!(
        "Capabilities: {} ({} enabled, {} preloaded)",
        registry.len(),
        registry.enabled_capabilities().len(),
        eager
    );
    tracing::info!("Server running on stdio");

    let server = McpServer::new(Arc::clone(&registry));
    let served = unified_mcp::server::run_stdio(&server).await;

    registry.shutdown().await;
    tracing::info!("Server stopped");
    served.context("stdio server failed")
}
