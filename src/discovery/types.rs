//! Record shapes exchanged across the three discovery phases.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Estimated schema cost attached to every search preview.
pub const PREVIEW_SCHEMA_TOKENS: u64 = 200;

/// Step 1 result: just enough to decide whether a tool is worth describing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolPreview {
    pub name: String,
    pub capability: String,
    pub description: String,
    pub tokens_estimate: u64,
}

/// Step 2 result: the full contract for one tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub examples: Option<Vec<Value>>,
}

impl ToolSchema {
    /// Schema with only an input contract.
    pub fn new(name: &str, description: &str, input_schema: Value) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            input_schema,
            output_schema: None,
            examples: None,
        }
    }

    /// Property names declared by the input schema.
    pub fn parameter_names(&self) -> Vec<&str> {
        self.input_schema
            .get("properties")
            .and_then(|p| p.as_object())
            .map(|props| props.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Names listed under `required`.
    pub fn required_parameters(&self) -> Vec<&str> {
        self.input_schema
            .get("required")
            .and_then(|r| r.as_array())
            .map(|items| items.iter().filter_map(|v| v.as_str()).collect())
            .unwrap_or_default()
    }
}

/// One entry of a `describe_tools` batch.
///
/// A failed lookup is a degenerate entry carrying the tool name and the
/// error text; it never aborts the rest of the batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DescribedTool {
    Schema(ToolSchema),
    Error { name: String, error: String },
}

impl DescribedTool {
    pub fn name(&self) -> &str {
        match self {
            DescribedTool::Schema(schema) => &schema.name,
            DescribedTool::Error { name, .. } => name,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, DescribedTool::Error { .. })
    }

    pub fn schema(&self) -> Option<&ToolSchema> {
        match self {
            DescribedTool::Schema(schema) => Some(schema),
            DescribedTool::Error { .. } => None,
        }
    }
}

/// Token cost breakdown for a discovery session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenCostEstimate {
    pub preview_tokens: u64,
    pub schema_tokens: u64,
    pub execution_tokens: u64,
    pub total_tokens: u64,
    pub vs_static_loading: u64,
    pub reduction_factor: f64,
}
