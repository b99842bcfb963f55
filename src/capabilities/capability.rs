//! Capability record and its handler lifecycle.
//!
//! A capability moves through `Unloaded → Loading → Loaded` and back to
//! `Unloaded` on [`Capability::unload`]. Concurrent callers of
//! [`Capability::load`] share one in-flight initialization: the first caller
//! installs a shared future in the slot, everyone else awaits a clone of it.
//! The shared future settles the slot itself, exactly once, when it finishes.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;

use super::catalog::CapabilityConfig;
use super::error::RegistryError;
use crate::handlers::{CapabilityHandler, HandlerConfig, HandlerError, HandlerFactories, HandlerFactory};

type LoadOutcome = Result<Arc<dyn CapabilityHandler>, RegistryError>;
type InitFuture = Shared<BoxFuture<'static, LoadOutcome>>;

enum HandlerSlot {
    Unloaded,
    Loading { ticket: u64, init: InitFuture },
    Loaded(Arc<dyn CapabilityHandler>),
}

/// One configured tool family.
///
/// The record lives as long as the catalog it came from. Only `enabled` and
/// the handler slot change at runtime.
pub struct Capability {
    name: String,
    config: CapabilityConfig,
    enabled: AtomicBool,
    slot: Arc<Mutex<HandlerSlot>>,
    tickets: AtomicU64,
}

impl Capability {
    pub fn new(name: impl Into<String>, config: CapabilityConfig) -> Self {
        let enabled = AtomicBool::new(config.enabled);
        Self {
            name: name.into(),
            config,
            enabled,
            slot: Arc::new(Mutex::new(HandlerSlot::Unloaded)),
            tickets: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Configuration as declared in the catalog. `enabled` here is the
    /// declared default; see [`Capability::is_enabled`] for the live flag.
    pub fn config(&self) -> &CapabilityConfig {
        &self.config
    }

    pub fn kind(&self) -> &str {
        &self.config.kind
    }

    pub fn tools(&self) -> &[String] {
        &self.config.tools
    }

    pub fn description(&self) -> &str {
        &self.config.description
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Set the live flag, returning the previous value.
    pub fn set_enabled(&self, enabled: bool) -> bool {
        self.enabled.swap(enabled, Ordering::SeqCst)
    }

    pub fn is_loaded(&self) -> bool {
        matches!(*self.slot.lock(), HandlerSlot::Loaded(_))
    }

    /// Settings handed to the handler factory.
    pub fn handler_config(&self) -> HandlerConfig {
        HandlerConfig {
            name: self.name.clone(),
            kind: self.config.kind.clone(),
            source: self.config.source.clone(),
            enabled: self.is_enabled(),
            tools: self.config.tools.clone(),
            description: self.config.description.clone(),
            api_url: self.config.api_url.clone(),
            options: self.config.options.clone(),
        }
    }

    /// Return the handler, creating and initializing it on first use.
    ///
    /// At most one initialization runs at a time per capability. Callers that
    /// arrive while it is in flight receive the same handler or the same
    /// error. A failed or panicked initialization leaves the capability
    /// unloaded, so a later call retries from scratch.
    pub async fn load(&self, factories: &HandlerFactories) -> LoadOutcome {
        let init = {
            let mut slot = self.slot.lock();
            match &*slot {
                HandlerSlot::Loaded(handler) => return Ok(Arc::clone(handler)),
                HandlerSlot::Loading { init, .. } => init.clone(),
                HandlerSlot::Unloaded => {
                    let ticket = self.tickets.fetch_add(1, Ordering::Relaxed);
                    let init = settle_initialization(
                        Arc::downgrade(&self.slot),
                        ticket,
                        self.name.clone(),
                        self.handler_config(),
                        factories.resolve(&self.config.kind),
                    )
                    .boxed()
                    .shared();
                    *slot = HandlerSlot::Loading {
                        ticket,
                        init: init.clone(),
                    };
                    init
                }
            }
        };

        init.await
    }

    /// Drop the installed handler and return it so the caller can clean it up.
    ///
    /// An initialization still in flight is abandoned: its waiters receive
    /// the handler, it is never installed, and its cleanup is spawned once
    /// it finishes.
    pub fn unload(&self) -> Option<Arc<dyn CapabilityHandler>> {
        let mut slot = self.slot.lock();
        match std::mem::replace(&mut *slot, HandlerSlot::Unloaded) {
            HandlerSlot::Loaded(handler) => {
                log::info!("Capability unloaded: {}", self.name);
                Some(handler)
            }
            _ => None,
        }
    }
}

impl std::fmt::Debug for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Capability")
            .field("name", &self.name)
            .field("type", &self.config.kind)
            .field("enabled", &self.is_enabled())
            .field("loaded", &self.is_loaded())
            .field("tools", &self.config.tools)
            .finish()
    }
}

/// Run one initialization and record its outcome in the slot, if the slot is
/// still waiting for this ticket. A handler nobody will install is cleaned up.
async fn settle_initialization(
    slot: Weak<Mutex<HandlerSlot>>,
    ticket: u64,
    name: String,
    config: HandlerConfig,
    factory: Option<Arc<dyn HandlerFactory>>,
) -> LoadOutcome {
    let outcome = match AssertUnwindSafe(initialize_handler(name.clone(), config, factory))
        .catch_unwind()
        .await
    {
        Ok(outcome) => outcome,
        Err(_) => {
            log::error!("Initialization of '{}' panicked", name);
            Err(RegistryError::CapabilityInitializationFailed {
                capability: name.clone(),
                source: HandlerError::ExecutionFailed("handler panicked during initialization".into()),
            })
        }
    };

    let installed = match slot.upgrade() {
        Some(slot) => {
            let mut slot = slot.lock();
            let current = matches!(&*slot, HandlerSlot::Loading { ticket: t, .. } if *t == ticket);
            if current {
                *slot = match &outcome {
                    Ok(handler) => HandlerSlot::Loaded(Arc::clone(handler)),
                    Err(_) => HandlerSlot::Unloaded,
                };
            }
            current
        }
        None => false,
    };

    if !installed {
        if let Ok(handler) = &outcome {
            log::info!("Capability '{}' was released while loading; discarding handler", name);
            spawn_cleanup(name, Arc::clone(handler));
        }
    }
    outcome
}

async fn initialize_handler(
    name: String,
    config: HandlerConfig,
    factory: Option<Arc<dyn HandlerFactory>>,
) -> LoadOutcome {
    let factory = factory.ok_or_else(|| RegistryError::UnsupportedCapabilityType {
        capability: name.clone(),
        kind: config.kind.clone(),
    })?;

    log::info!("Loading capability: {} (type: {})", name, config.kind);
    let failed = |source| RegistryError::CapabilityInitializationFailed {
        capability: name.clone(),
        source,
    };

    let mut handler = factory.create(&config).map_err(failed)?;
    handler.initialize().await.map_err(failed)?;

    log::info!("Capability loaded: {}", name);
    Ok(Arc::from(handler))
}

pub(super) async fn cleanup_handler(name: &str, handler: Arc<dyn CapabilityHandler>) {
    if let Err(e) = handler.cleanup().await {
        log::warn!("Cleanup of '{}' failed: {}", name, e);
    }
}

pub(super) fn spawn_cleanup(name: String, handler: Arc<dyn CapabilityHandler>) {
    match tokio::runtime::Handle::try_current() {
        Ok(runtime) => {
            runtime.spawn(async move { cleanup_handler(&name, handler).await });
        }
        Err(_) => log::warn!("No async runtime; skipping cleanup of '{}'", name),
    }
}
