//! Capability registry: catalog state plus the search/describe/execute flow.
//!
//! Search is a pure metadata scan. Describe and execute resolve the owning
//! capability through the tool routing table and lazy-load its handler.
//! No lock is held across an await: callers clone the `Arc<Capability>` they
//! need and release the state lock before touching the handler.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::future::join_all;
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;

use super::capability::{cleanup_handler, spawn_cleanup, Capability};
use super::catalog::{Catalog, DiscoveryConfig};
use super::error::RegistryError;
use crate::discovery::{short_description, DescribedTool, ToolPreview, ToolSchema, PREVIEW_SCHEMA_TOKENS};
use crate::handlers::{CapabilityHandler, HandlerFactories};

/// Read-only view of one capability, as listed to callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CapabilityInfo {
    pub name: String,
    pub enabled: bool,
    #[serde(rename = "type")]
    pub kind: String,
    pub tools: Vec<String>,
    pub description: String,
    pub loaded: bool,
}

struct CatalogState {
    capabilities: Vec<Arc<Capability>>,
    by_name: HashMap<String, usize>,
    tool_routes: HashMap<String, usize>,
    discovery: DiscoveryConfig,
}

impl CatalogState {
    fn build(catalog: Catalog) -> Self {
        let mut capabilities: Vec<Arc<Capability>> = Vec::with_capacity(catalog.capabilities.len());
        let mut by_name = HashMap::new();
        let mut tool_routes: HashMap<String, usize> = HashMap::new();

        for (index, (name, config)) in catalog.capabilities.into_iter().enumerate() {
            for tool in &config.tools {
                match tool_routes.get(tool) {
                    Some(&owner) if owner != index => {
                        let first = capabilities[owner].name();
                        log::warn!(
                            "Tool '{}' is claimed by both '{}' and '{}'; routing to '{}'",
                            tool,
                            first,
                            name,
                            first
                        );
                    }
                    Some(_) => {}
                    None => {
                        tool_routes.insert(tool.clone(), index);
                    }
                }
            }
            by_name.insert(name.clone(), index);
            capabilities.push(Arc::new(Capability::new(name, config)));
        }

        Self {
            capabilities,
            by_name,
            tool_routes,
            discovery: catalog.discovery,
        }
    }

    fn named(&self, name: &str) -> Option<&Arc<Capability>> {
        self.by_name.get(name).map(|&i| &self.capabilities[i])
    }

    fn owner_of(&self, tool_name: &str) -> Option<&Arc<Capability>> {
        self.tool_routes.get(tool_name).map(|&i| &self.capabilities[i])
    }
}

/// Single source of truth for capability state.
///
/// Constructed explicitly from a catalog path and shared as `Arc<Registry>`.
pub struct Registry {
    catalog_path: PathBuf,
    factories: HandlerFactories,
    state: RwLock<CatalogState>,
}

impl Registry {
    /// Load the catalog at `path` with the built-in handler factories.
    ///
    /// No handler is created here; see [`Registry::preload_eager`].
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, RegistryError> {
        Self::with_factories(path, HandlerFactories::with_defaults())
    }

    /// Load the catalog at `path` with a custom factory table.
    pub fn with_factories(path: impl Into<PathBuf>, factories: HandlerFactories) -> Result<Self, RegistryError> {
        let catalog_path = path.into();
        let catalog = Catalog::load(&catalog_path)?;
        log::info!(
            "Loaded {} capabilities from {}",
            catalog.capabilities.len(),
            catalog_path.display()
        );
        Ok(Self {
            catalog_path,
            factories,
            state: RwLock::new(CatalogState::build(catalog)),
        })
    }

    pub fn catalog_path(&self) -> &Path {
        &self.catalog_path
    }

    pub fn len(&self) -> usize {
        self.state.read().capabilities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // ========================================================================
    // Discovery
    // ========================================================================

    /// Keyword search over enabled capabilities.
    ///
    /// Matches `query` case-insensitively against tool names and capability
    /// descriptions. An empty query matches every tool. Results follow
    /// catalog order, then tool order, truncated to `max_results`.
    pub fn search_tools(&self, query: &str, max_results: usize) -> Vec<ToolPreview> {
        let needle = query.to_lowercase();
        let state = self.state.read();
        let mut previews = Vec::new();

        for (index, capability) in state.capabilities.iter().enumerate() {
            if !capability.is_enabled() {
                continue;
            }
            let description_match = capability.description().to_lowercase().contains(&needle);
            for tool in capability.tools() {
                if previews.len() >= max_results {
                    return previews;
                }
                if state.tool_routes.get(tool) != Some(&index) {
                    continue;
                }
                if description_match || tool.to_lowercase().contains(&needle) {
                    previews.push(ToolPreview {
                        name: tool.clone(),
                        capability: capability.name().to_string(),
                        description: short_description(tool).to_string(),
                        tokens_estimate: PREVIEW_SCHEMA_TOKENS,
                    });
                }
            }
        }

        log::debug!("search_tools('{}') matched {} tools", query, previews.len());
        previews
    }

    /// Full schemas for `tool_names`, one entry per name in the same order.
    ///
    /// Lookups run concurrently. A failure becomes an error entry for that
    /// name only.
    pub async fn describe_tools(&self, tool_names: &[String]) -> Vec<DescribedTool> {
        join_all(tool_names.iter().map(|name| self.describe_one(name))).await
    }

    async fn describe_one(&self, tool_name: &str) -> DescribedTool {
        match self.tool_schema(tool_name).await {
            Ok(schema) => DescribedTool::Schema(schema),
            Err(e) => {
                log::warn!("Failed to describe '{}': {}", tool_name, e);
                DescribedTool::Error {
                    name: tool_name.to_string(),
                    error: e.to_string(),
                }
            }
        }
    }

    async fn tool_schema(&self, tool_name: &str) -> Result<ToolSchema, RegistryError> {
        let capability = self.route(tool_name)?;
        let handler = capability.load(&self.factories).await?;
        handler
            .get_tool_schema(tool_name)
            .await
            .map_err(|source| RegistryError::Execution {
                capability: capability.name().to_string(),
                tool: tool_name.to_string(),
                source,
            })
    }

    /// Run a tool on its owning capability, loading the handler if needed.
    pub async fn execute_tool(&self, tool_name: &str, arguments: Value) -> Result<Value, RegistryError> {
        let capability = self.route(tool_name)?;
        let handler = capability.load(&self.factories).await?;

        log::debug!("Executing {} on {}", tool_name, capability.name());
        handler
            .execute(tool_name, &arguments)
            .await
            .map_err(|source| RegistryError::Execution {
                capability: capability.name().to_string(),
                tool: tool_name.to_string(),
                source,
            })
    }

    /// Owning capability for a tool, if any. Ignores the enabled flag.
    pub fn find_capability_for_tool(&self, tool_name: &str) -> Option<String> {
        self.state
            .read()
            .owner_of(tool_name)
            .map(|c| c.name().to_string())
    }

    fn route(&self, tool_name: &str) -> Result<Arc<Capability>, RegistryError> {
        let state = self.state.read();
        let capability = state
            .owner_of(tool_name)
            .ok_or_else(|| RegistryError::ToolNotFound(tool_name.to_string()))?;
        if !capability.is_enabled() {
            return Err(RegistryError::CapabilityDisabled {
                capability: capability.name().to_string(),
                tool: tool_name.to_string(),
            });
        }
        Ok(Arc::clone(capability))
    }

    // ========================================================================
    // Capability management
    // ========================================================================

    pub fn capability(&self, name: &str) -> Result<Arc<Capability>, RegistryError> {
        self.state
            .read()
            .named(name)
            .cloned()
            .ok_or_else(|| RegistryError::CapabilityNotFound(name.to_string()))
    }

    /// Make a capability visible again. Does not load its handler.
    pub fn enable_capability(&self, name: &str) -> Result<(), RegistryError> {
        let capability = self.capability(name)?;
        capability.set_enabled(true);
        log::info!("Enabled capability: {}", name);
        Ok(())
    }

    /// Hide a capability and release its handler.
    ///
    /// The released handler's `cleanup()` runs on a spawned task when a
    /// tokio runtime is available.
    pub fn disable_capability(&self, name: &str) -> Result<(), RegistryError> {
        let capability = self.capability(name)?;
        capability.set_enabled(false);
        if let Some(handler) = capability.unload() {
            spawn_cleanup(name.to_string(), handler);
        }
        log::info!("Disabled capability: {}", name);
        Ok(())
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.state
            .read()
            .named(name)
            .map(|c| c.is_loaded())
            .unwrap_or(false)
    }

    /// Every capability in catalog order.
    pub fn capabilities(&self) -> Vec<CapabilityInfo> {
        self.state
            .read()
            .capabilities
            .iter()
            .map(|c| CapabilityInfo {
                name: c.name().to_string(),
                enabled: c.is_enabled(),
                kind: c.kind().to_string(),
                tools: c.tools().to_vec(),
                description: c.description().to_string(),
                loaded: c.is_loaded(),
            })
            .collect()
    }

    /// Names of enabled capabilities in catalog order.
    pub fn enabled_capabilities(&self) -> Vec<String> {
        self.state
            .read()
            .capabilities
            .iter()
            .filter(|c| c.is_enabled())
            .map(|c| c.name().to_string())
            .collect()
    }

    pub fn discovery_config(&self) -> DiscoveryConfig {
        self.state.read().discovery.clone()
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Load every enabled capability declared with `lazy_load: false`.
    ///
    /// Returns how many loaded. Failures are logged and leave the capability
    /// unloaded.
    pub async fn preload_eager(&self) -> usize {
        let targets: Vec<Arc<Capability>> = self
            .state
            .read()
            .capabilities
            .iter()
            .filter(|c| c.is_enabled() && !c.config().lazy_load)
            .cloned()
            .collect();

        let outcomes = join_all(targets.iter().map(|c| c.load(&self.factories))).await;
        let mut loaded = 0;
        for (capability, outcome) in targets.iter().zip(outcomes) {
            match outcome {
                Ok(_) => loaded += 1,
                Err(e) => log::warn!("Eager load of '{}' failed: {}", capability.name(), e),
            }
        }
        loaded
    }

    /// Re-read the catalog and rebuild every capability record.
    ///
    /// A catalog that fails to load leaves the current state untouched.
    /// Otherwise handlers loaded under the old state are cleaned up after
    /// the swap.
    pub async fn reload_catalog(&self) -> Result<(), RegistryError> {
        let catalog = Catalog::load(&self.catalog_path)?;
        let count = catalog.capabilities.len();
        let fresh = CatalogState::build(catalog);
        let previous = std::mem::replace(&mut *self.state.write(), fresh);

        release_all(&previous.capabilities).await;
        log::info!("Catalog reloaded: {} capabilities", count);
        Ok(())
    }

    /// Unload every capability and clean up the released handlers.
    pub async fn shutdown(&self) {
        let capabilities = self.state.read().capabilities.clone();
        release_all(&capabilities).await;
        log::info!("Registry shut down");
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("catalog_path", &self.catalog_path)
            .field("capabilities", &self.len())
            .field("factories", &self.factories)
            .finish()
    }
}

async fn release_all(capabilities: &[Arc<Capability>]) {
    let released: Vec<(String, Arc<dyn CapabilityHandler>)> = capabilities
        .iter()
        .filter_map(|c| c.unload().map(|h| (c.name().to_string(), h)))
        .collect();
    join_all(
        released
            .into_iter()
            .map(|(name, handler)| async move { cleanup_handler(&name, handler).await }),
    )
    .await;
}
