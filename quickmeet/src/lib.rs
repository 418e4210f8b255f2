//! Reactive automation of a calendar event editor
//!
//! Injects one action control into a host-owned dialog and, when it is
//! invoked, attaches a video conference to the event and saves it. The host
//! document is never cooperative: every node is found through fallback
//! matchers, every wait is bounded, and every captured reference is
//! re-validated before use.

use std::sync::Arc;

use tracing::instrument;

pub mod config;
pub mod control_surface;
pub mod controller;
pub mod dialog;
pub mod element;
pub mod errors;
pub mod locator;
pub mod persister;
pub mod platforms;
pub mod poller;
pub mod selector;
pub mod session;
pub mod simulation;
pub mod strategy;
#[cfg(test)]
mod tests;
pub mod watcher;

pub use config::EngineConfig;
pub use control_surface::{ControlRequest, ControlResponse, ControlSurfaceBridge};
pub use controller::{ControlState, InteractionController, Invocation};
pub use dialog::DialogHandle;
pub use element::Element;
pub use errors::AutomationError;
pub use locator::{ElementLocator, Role};
pub use persister::{OverrideHandle, OverridePersister, OverrideSpec};
pub use platforms::{DocumentEngine, MutationOptions, MutationRecord, Subscription};
pub use poller::wait_for_condition;
pub use selector::Selector;
pub use session::SessionState;
pub use strategy::{AttachOutcome, StrategyKind, StrategyRegistry};
pub use watcher::{DialogWatcher, Discovery};

/// Shared context for one watched document: the document itself, the role
/// matchers, and the tuning values.
pub struct Engine {
    document: Arc<dyn DocumentEngine>,
    locator: ElementLocator,
    config: EngineConfig,
}

impl Engine {
    /// Validates `config` and builds the calendar matchers for its provider.
    #[instrument(skip(document, config), fields(provider = %config.provider_name))]
    pub fn new(
        document: Arc<dyn DocumentEngine>,
        config: EngineConfig,
    ) -> Result<Arc<Self>, AutomationError> {
        config.validate()?;
        let locator = ElementLocator::calendar(&config.provider_name);
        Ok(Arc::new(Self {
            document,
            locator,
            config,
        }))
    }

    /// Same as [`Engine::new`] with custom matchers.
    pub fn with_locator(
        document: Arc<dyn DocumentEngine>,
        locator: ElementLocator,
        config: EngineConfig,
    ) -> Result<Arc<Self>, AutomationError> {
        config.validate()?;
        Ok(Arc::new(Self {
            document,
            locator,
            config,
        }))
    }

    pub fn document(&self) -> &dyn DocumentEngine {
        self.document.as_ref()
    }

    pub fn locator(&self) -> &ElementLocator {
        &self.locator
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}
