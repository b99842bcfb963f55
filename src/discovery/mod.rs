//! Progressive discovery: record shapes, preview descriptions and the
//! typed façade with its token-cost estimator.

pub mod descriptions;
pub mod progressive;
pub mod types;

pub use descriptions::short_description;
pub use progressive::{estimate_token_cost, format_preview, format_schema, ProgressiveDiscovery};
pub use types::{DescribedTool, TokenCostEstimate, ToolPreview, ToolSchema, PREVIEW_SCHEMA_TOKENS};
