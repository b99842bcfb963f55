//! # Capability Registry
//!
//! A capability is one configured external tool family (code search, docs,
//! browser automation, memory, knowledge graph). The catalog YAML declares
//! each capability's type, source and tools; the [`Registry`] owns the
//! resulting records and routes every tool call to exactly one of them.
//!
//! ## Lifecycle
//!
//! 1. `Registry::open(path)` parses the catalog. No handler is created.
//! 2. `search_tools` scans metadata only.
//! 3. `describe_tools` / `execute_tool` lazy-load the owning capability's
//!    handler through the factory registered for its type tag.
//! 4. `disable_capability`, `reload_catalog` and `shutdown` release handlers
//!    and run their `cleanup()`.

pub mod capability;
pub mod catalog;
pub mod error;
pub mod registry;

#[cfg(test)]
pub(crate) mod testing;

pub use capability::Capability;
pub use catalog::{Catalog, CapabilityConfig, DiscoveryConfig};
pub use error::RegistryError;
pub use registry::{CapabilityInfo, Registry};
