//! Registry error types.

use std::path::PathBuf;

use thiserror::Error;

use crate::handlers::HandlerError;

/// Errors raised by catalog loading, capability lifecycle and tool routing.
///
/// `Clone` so one failed initialization can be reported to every caller
/// that was waiting on it.
#[derive(Debug, Clone, Error)]
pub enum RegistryError {
    #[error("Catalog not found: {}", .0.display())]
    ConfigurationNotFound(PathBuf),

    #[error("Invalid catalog {}: {message}", .path.display())]
    ConfigurationInvalid { path: PathBuf, message: String },

    #[error("Unknown capability type '{kind}' for capability '{capability}'")]
    UnsupportedCapabilityType { capability: String, kind: String },

    #[error("Handler initialization failed for '{capability}': {source}")]
    CapabilityInitializationFailed {
        capability: String,
        source: HandlerError,
    },

    #[error("Tool '{0}' not found in any capability")]
    ToolNotFound(String),

    #[error("Capability '{0}' not found")]
    CapabilityNotFound(String),

    #[error("Capability '{capability}' providing tool '{tool}' is disabled")]
    CapabilityDisabled { capability: String, tool: String },

    #[error("Tool '{tool}' ({capability}) failed: {source}")]
    Execution {
        capability: String,
        tool: String,
        source: HandlerError,
    },
}

impl RegistryError {
    /// Whether retrying the same call later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RegistryError::CapabilityInitializationFailed { .. })
    }
}
