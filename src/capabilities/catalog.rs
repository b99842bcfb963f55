//! Catalog file: the YAML that declares every capability and the discovery
//! settings.
//!
//! ```yaml
//! capabilities:
//!   code_understanding:
//!     enabled: true
//!     type: codanna
//!     source: capabilities/codanna
//!     tools: [search_code, get_call_graph, find_symbol, find_implementations]
//!     lazy_load: true
//!     description: "Semantic code search and call graphs"
//!     options:
//!       auto_index: true
//!   memory:
//!     type: claude-mem
//!     source: capabilities/claude-mem
//!     api_url: "http://localhost:37777"
//!     tools: [mem_search]
//!
//! discovery:
//!   mode: progressive
//!   search_only_tokens: 50
//!   describe_only_tokens: 200
//!   max_tools_in_context: 10
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::error::RegistryError;

/// One capability entry, validated at load time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CapabilityConfig {
    /// Visible to search/describe/execute. Default: false.
    #[serde(default)]
    pub enabled: bool,

    /// Handler type tag (`codanna`, `context7`, `playwright`, `claude-mem`,
    /// `graphiti_ladybug`). Resolved when the capability is first loaded.
    #[serde(rename = "type")]
    pub kind: String,

    /// Handler-specific location (submodule path, data directory, ...).
    pub source: PathBuf,

    /// Tool names this capability provides.
    #[serde(default)]
    pub tools: Vec<String>,

    /// Default: true. When false the handler is loaded by
    /// [`Registry::preload_eager`](super::Registry::preload_eager).
    #[serde(default = "default_lazy_load")]
    pub lazy_load: bool,

    /// Free text matched by keyword search.
    #[serde(default)]
    pub description: String,

    /// Endpoint for HTTP-backed handlers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    /// Handler-specific settings.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub options: BTreeMap<String, Value>,
}

fn default_lazy_load() -> bool {
    true
}

/// The `discovery` section. Unrecognized keys are kept as-is in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    #[serde(default = "default_mode")]
    pub mode: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_only_tokens: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub describe_only_tokens: Option<u64>,

    #[serde(default = "default_max_tools")]
    pub max_tools_in_context: usize,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_mode() -> String {
    "progressive".to_string()
}

fn default_max_tools() -> usize {
    10
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            search_only_tokens: None,
            describe_only_tokens: None,
            max_tools_in_context: default_max_tools(),
            extra: Map::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    capabilities: Option<serde_yaml::Mapping>,
    #[serde(default)]
    discovery: Option<DiscoveryConfig>,
}

/// A parsed catalog. Capabilities keep their declaration order.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    pub capabilities: Vec<(String, CapabilityConfig)>,
    pub discovery: DiscoveryConfig,
}

impl Catalog {
    /// Read and validate the catalog at `path`.
    pub fn load(path: &Path) -> Result<Self, RegistryError> {
        if !path.exists() {
            return Err(RegistryError::ConfigurationNotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path).map_err(|e| invalid(path, e.to_string()))?;
        Self::from_yaml_str(&content, path)
    }

    /// Parse catalog YAML. `origin` is only used in error messages.
    pub fn from_yaml_str(content: &str, origin: &Path) -> Result<Self, RegistryError> {
        let file: CatalogFile =
            serde_yaml::from_str(content).map_err(|e| invalid(origin, format!("YAML error: {}", e)))?;

        let mut capabilities = Vec::new();
        for (key, value) in file.capabilities.unwrap_or_default() {
            let name = key
                .as_str()
                .ok_or_else(|| invalid(origin, format!("capability name must be a string: {:?}", key)))?
                .to_string();
            let config: CapabilityConfig = serde_yaml::from_value(value)
                .map_err(|e| invalid(origin, format!("capability '{}': {}", name, e)))?;
            validate(&name, &config).map_err(|msg| invalid(origin, msg))?;
            capabilities.push((name, config));
        }

        Ok(Self {
            capabilities,
            discovery: file.discovery.unwrap_or_default(),
        })
    }
}

fn validate(name: &str, config: &CapabilityConfig) -> Result<(), String> {
    if name.trim().is_empty() {
        return Err("capability name must not be empty".to_string());
    }
    if config.kind.trim().is_empty() {
        return Err(format!("capability '{}': type must not be empty", name));
    }
    if let Some(tool) = config.tools.iter().find(|t| t.trim().is_empty()) {
        return Err(format!("capability '{}': empty tool name {:?}", name, tool));
    }
    let mut seen = std::collections::HashSet::new();
    for tool in &config.tools {
        if !seen.insert(tool.as_str()) {
            log::warn!("Capability '{}' lists tool '{}' more than once", name, tool);
        }
    }
    Ok(())
}

fn invalid(path: &Path, message: String) -> RegistryError {
    RegistryError::ConfigurationInvalid {
        path: path.to_path_buf(),
        message,
    }
}
