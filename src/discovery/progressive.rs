//! Typed façade over the registry's three discovery phases.
//!
//! 1. [`ProgressiveDiscovery::search`]: previews, about 5 tokens each
//! 2. [`ProgressiveDiscovery::describe`]: full schemas, about 200 tokens each
//! 3. [`ProgressiveDiscovery::execute`]: run the chosen tool
//!
//! The façade holds no state of its own.

use std::sync::Arc;

use serde_json::Value;

use super::types::{TokenCostEstimate, ToolPreview, ToolSchema};
use crate::capabilities::{Registry, RegistryError};

pub const TOKENS_PER_PREVIEW: u64 = 5;
pub const TOKENS_PER_SCHEMA: u64 = 200;
pub const TOKENS_PER_EXECUTION: u64 = 50;
/// Cost of injecting every tool's full schema upfront.
pub const STATIC_LOADING_BASELINE: u64 = 10_000;

/// Progressive discovery over a shared [`Registry`].
#[derive(Clone)]
pub struct ProgressiveDiscovery {
    registry: Arc<Registry>,
}

impl ProgressiveDiscovery {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Step 1: lightweight previews.
    pub fn search(&self, query: &str, max_results: usize) -> Vec<ToolPreview> {
        log::debug!("Progressive discovery step 1: search('{}')", query);
        let previews = self.registry.search_tools(query, max_results);
        log::info!(
            "Step 1 complete: {} tools found (~{} tokens)",
            previews.len(),
            previews.len() as u64 * TOKENS_PER_PREVIEW
        );
        previews
    }

    /// Step 2: full schemas. Entries that failed to describe are logged and
    /// left out.
    pub async fn describe(&self, tool_names: &[String]) -> Vec<ToolSchema> {
        log::debug!("Progressive discovery step 2: describe({:?})", tool_names);
        let schemas: Vec<ToolSchema> = self
            .registry
            .describe_tools(tool_names)
            .await
            .into_iter()
            .filter_map(|entry| match entry.schema() {
                Some(schema) => Some(schema.clone()),
                None => {
                    log::warn!("Tool schema error for '{}'", entry.name());
                    None
                }
            })
            .collect();
        log::info!(
            "Step 2 complete: {} tools described (~{} tokens)",
            schemas.len(),
            schemas.len() as u64 * TOKENS_PER_SCHEMA
        );
        schemas
    }

    /// Step 3: run a tool.
    pub async fn execute(&self, tool_name: &str, arguments: Value) -> Result<Value, RegistryError> {
        log::debug!("Progressive discovery step 3: execute('{}')", tool_name);
        let result = self.registry.execute_tool(tool_name, arguments).await?;
        log::info!("Step 3 complete: {} executed successfully", tool_name);
        Ok(result)
    }
}

/// Estimated token cost of a discovery session.
///
/// Pure arithmetic over fixed constants; not a measurement.
pub fn estimate_token_cost(num_previews: usize, num_schemas: usize, execution: bool) -> TokenCostEstimate {
    let preview_tokens = num_previews as u64 * TOKENS_PER_PREVIEW;
    let schema_tokens = num_schemas as u64 * TOKENS_PER_SCHEMA;
    let execution_tokens = if execution { TOKENS_PER_EXECUTION } else { 0 };
    let total_tokens = preview_tokens + schema_tokens + execution_tokens;
    let reduction_factor = if total_tokens == 0 {
        0.0
    } else {
        let raw = STATIC_LOADING_BASELINE as f64 / total_tokens as f64;
        (raw * 10.0).round() / 10.0
    };

    TokenCostEstimate {
        preview_tokens,
        schema_tokens,
        execution_tokens,
        total_tokens,
        vs_static_loading: STATIC_LOADING_BASELINE,
        reduction_factor,
    }
}

/// `search_code (code_understanding) - Search codebase semantically [~200 tokens]`
pub fn format_preview(preview: &ToolPreview) -> String {
    format!(
        "{} ({}) - {} [~{} tokens]",
        preview.name, preview.capability, preview.description, preview.tokens_estimate
    )
}

/// `find_symbol(name) - Find a symbol by exact name...`
pub fn format_schema(schema: &ToolSchema) -> String {
    let params = schema.parameter_names();
    let param_list = if params.is_empty() {
        "no parameters".to_string()
    } else {
        params.join(", ")
    };
    format!("{}({}) - {}", schema.name, param_list, schema.description)
}
