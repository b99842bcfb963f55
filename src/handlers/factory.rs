//! Capability type tags and the factory table that turns them into handlers.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::{CapabilityHandler, HandlerConfig, HandlerError};

/// The fixed set of capability families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CapabilityType {
    CodeSearch,
    Docs,
    Browser,
    Memory,
    KnowledgeGraph,
}

impl CapabilityType {
    pub const ALL: [CapabilityType; 5] = [
        CapabilityType::CodeSearch,
        CapabilityType::Docs,
        CapabilityType::Browser,
        CapabilityType::Memory,
        CapabilityType::KnowledgeGraph,
    ];

    /// Tag used in the catalog's `type` field.
    pub fn as_str(&self) -> &'static str {
        match self {
            CapabilityType::CodeSearch => "codanna",
            CapabilityType::Docs => "context7",
            CapabilityType::Browser => "playwright",
            CapabilityType::Memory => "claude-mem",
            CapabilityType::KnowledgeGraph => "graphiti_ladybug",
        }
    }

    pub fn from_str_opt(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == s)
    }
}

impl fmt::Display for CapabilityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Factory for creating handler instances.
pub trait HandlerFactory: Send + Sync {
    /// Build a fresh, uninitialized handler.
    fn create(&self, config: &HandlerConfig) -> Result<Box<dyn CapabilityHandler>, HandlerError>;

    /// Type tag this factory serves.
    fn capability_type(&self) -> CapabilityType;
}

/// Registration table: capability type → factory.
///
/// Adding a capability family means registering one more factory; the
/// registry's control flow never changes.
#[derive(Clone, Default)]
pub struct HandlerFactories {
    factories: HashMap<CapabilityType, Arc<dyn HandlerFactory>>,
}

impl HandlerFactories {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Table with all built-in handler factories registered.
    pub fn with_defaults() -> Self {
        let mut table = Self::new();
        table.register(Arc::new(super::code_search::CodannaHandlerFactory));
        table.register(Arc::new(super::docs::Context7HandlerFactory));
        table.register(Arc::new(super::browser::PlaywrightHandlerFactory));
        table.register(Arc::new(super::memory::ClaudeMemHandlerFactory));
        table.register(Arc::new(super::knowledge_graph::GraphitiHandlerFactory));
        table
    }

    /// Register (or replace) the factory for its type.
    pub fn register(&mut self, factory: Arc<dyn HandlerFactory>) {
        self.factories.insert(factory.capability_type(), factory);
    }

    /// Factory for a catalog type tag, if the tag is known and registered.
    pub fn resolve(&self, tag: &str) -> Option<Arc<dyn HandlerFactory>> {
        CapabilityType::from_str_opt(tag).and_then(|t| self.factories.get(&t).cloned())
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl fmt::Debug for HandlerFactories {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut types: Vec<&'static str> = self.factories.keys().map(|t| t.as_str()).collect();
        types.sort_unstable();
        f.debug_struct("HandlerFactories")
            .field("types", &types)
            .finish()
    }
}
