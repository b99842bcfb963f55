//! Counting mock handler shared by the registry tests.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::catalog::CapabilityConfig;
use crate::discovery::ToolSchema;
use crate::handlers::{
    CapabilityHandler, CapabilityType, HandlerConfig, HandlerError, HandlerFactories, HandlerFactory,
};

#[derive(Default)]
pub(crate) struct MockCounters {
    created: AtomicUsize,
    initialized: AtomicUsize,
    executed: AtomicUsize,
    cleaned: AtomicUsize,
    failing_inits: AtomicUsize,
    panicking_inits: AtomicUsize,
    init_delay_ms: AtomicU64,
}

impl MockCounters {
    pub(crate) fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub(crate) fn initialized(&self) -> usize {
        self.initialized.load(Ordering::SeqCst)
    }

    pub(crate) fn executed(&self) -> usize {
        self.executed.load(Ordering::SeqCst)
    }

    pub(crate) fn cleaned(&self) -> usize {
        self.cleaned.load(Ordering::SeqCst)
    }

    pub(crate) fn fail_next_inits(&self, n: usize) {
        self.failing_inits.store(n, Ordering::SeqCst);
    }

    pub(crate) fn panic_next_inits(&self, n: usize) {
        self.panicking_inits.store(n, Ordering::SeqCst);
    }

    pub(crate) fn set_init_delay_ms(&self, ms: u64) {
        self.init_delay_ms.store(ms, Ordering::SeqCst);
    }
}

/// Serves the `codanna` and `context7` tags with [`MockHandler`]s.
pub(crate) struct MockFactory {
    kind: CapabilityType,
    counters: Arc<MockCounters>,
}

impl MockFactory {
    pub(crate) fn table() -> (HandlerFactories, Arc<MockCounters>) {
        let counters = Arc::new(MockCounters::default());
        let mut table = HandlerFactories::new();
        for kind in [CapabilityType::CodeSearch, CapabilityType::Docs] {
            table.register(Arc::new(MockFactory {
                kind,
                counters: Arc::clone(&counters),
            }));
        }
        (table, counters)
    }
}

impl HandlerFactory for MockFactory {
    fn create(&self, config: &HandlerConfig) -> Result<Box<dyn CapabilityHandler>, HandlerError> {
        let instance = self.counters.created.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Box::new(MockHandler {
            instance,
            tools: config.tools.clone(),
            counters: Arc::clone(&self.counters),
        }))
    }

    fn capability_type(&self) -> CapabilityType {
        self.kind
    }
}

/// Echoes its arguments. `failing_tool` always fails, `broken_schema` has
/// no schema.
pub(crate) struct MockHandler {
    instance: usize,
    tools: Vec<String>,
    counters: Arc<MockCounters>,
}

#[async_trait]
impl CapabilityHandler for MockHandler {
    async fn initialize(&mut self) -> Result<(), HandlerError> {
        self.counters.initialized.fetch_add(1, Ordering::SeqCst);
        let delay = self.counters.init_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        let panics = self
            .counters
            .panicking_inits
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if panics {
            panic!("mock handler initialization panicked");
        }
        let fail = self
            .counters
            .failing_inits
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if fail {
            return Err(HandlerError::DependencyMissing("mock-cli".into()));
        }
        Ok(())
    }

    async fn get_tool_schema(&self, tool_name: &str) -> Result<ToolSchema, HandlerError> {
        if tool_name == "broken_schema" {
            return Err(HandlerError::ExecutionFailed("schema unavailable".into()));
        }
        if !self.tools.iter().any(|t| t == tool_name) {
            return Err(HandlerError::UnknownTool(tool_name.to_string()));
        }
        Ok(ToolSchema::new(
            tool_name,
            "Mock tool",
            json!({
                "type": "object",
                "properties": {"query": {"type": "string"}},
                "required": ["query"]
            }),
        ))
    }

    async fn execute(&self, tool_name: &str, arguments: &Value) -> Result<Value, HandlerError> {
        self.counters.executed.fetch_add(1, Ordering::SeqCst);
        if tool_name == "failing_tool" {
            return Err(HandlerError::ExecutionFailed("boom".into()));
        }
        Ok(json!({
            "status": "success",
            "tool": tool_name,
            "instance": self.instance,
            "arguments": arguments,
        }))
    }

    async fn cleanup(&self) -> Result<(), HandlerError> {
        self.counters.cleaned.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub(crate) fn mock_config(enabled: bool, tools: &[&str]) -> CapabilityConfig {
    CapabilityConfig {
        enabled,
        kind: "codanna".into(),
        source: PathBuf::from("capabilities/mock"),
        tools: tools.iter().map(|t| t.to_string()).collect(),
        lazy_load: true,
        description: "Mock capability".into(),
        api_url: None,
        options: Default::default(),
    }
}

pub(crate) fn write_catalog(dir: &Path, yaml: &str) -> PathBuf {
    let path = dir.join("catalog.yaml");
    std::fs::write(&path, yaml).unwrap();
    path
}
