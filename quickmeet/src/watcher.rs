//! Watches the document for the event editor and injects the action control

use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::control_surface::{ControlRequest, ControlResponse};
use crate::controller::InteractionController;
use crate::dialog::DialogHandle;
use crate::element::Element;
use crate::errors::AutomationError;
use crate::locator::{Role, ACTION_MARKER};
use crate::persister::{OverrideHandle, OverridePersister, OverrideSpec, StyleSet};
use crate::platforms::{MutationOptions, MutationRecord};
use crate::session::SessionState;
use crate::strategy::StrategyRegistry;
use crate::Engine;

/// What one discovery pass found
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Discovery {
    NoDialog,
    DialogHidden,
    AlreadyPresent,
    /// Dialog without a visible save control: a lightweight preview
    Preview,
    Injected,
    InjectionFailed,
}

struct ActiveInjection {
    dialog: DialogHandle,
    control: Element,
    commit: Element,
    /// Commit control presentation captured before it was demoted
    presentation: StyleSet,
    controller: Arc<InteractionController>,
    demotion: OverrideHandle,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// One watcher per document, with an explicit `start`/`stop` lifecycle.
pub struct DialogWatcher {
    engine: Arc<Engine>,
    registry: StrategyRegistry,
    session: SessionState,
    active: Mutex<Option<ActiveInjection>>,
    /// Held from the presence check to the recorded injection
    injecting: Mutex<()>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl DialogWatcher {
    pub fn new(engine: Arc<Engine>) -> Arc<Self> {
        Self::with_registry(engine, StrategyRegistry::default())
    }

    pub fn with_registry(engine: Arc<Engine>, registry: StrategyRegistry) -> Arc<Self> {
        Arc::new(Self {
            engine,
            registry,
            session: SessionState::new(),
            active: Mutex::new(None),
            injecting: Mutex::new(()),
            task: Mutex::new(None),
        })
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    /// Controller of the control currently injected, if any
    pub fn controller(&self) -> Option<Arc<InteractionController>> {
        lock(&self.active).as_ref().map(|a| a.controller.clone())
    }

    /// Host reverts undone on the demoted commit control of the current dialog
    pub fn demotion_reapply_count(&self) -> Option<usize> {
        lock(&self.active).as_ref().map(|a| a.demotion.reapply_count())
    }

    pub fn is_running(&self) -> bool {
        lock(&self.task).as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Subscribes to the whole document and runs a first discovery pass.
    #[instrument(skip(self))]
    pub fn start(self: &Arc<Self>) -> Result<(), AutomationError> {
        if self.is_running() {
            debug!("watcher already running");
            return Ok(());
        }
        let root = self.engine.document().root();
        let mut subscription = self
            .engine
            .document()
            .observe(&root, MutationOptions::child_list_subtree())?;

        let weak = Arc::downgrade(self);
        let task = tokio::spawn(async move {
            while let Some(batch) = subscription.next_batch().await {
                let Some(watcher) = weak.upgrade() else {
                    break;
                };
                watcher.handle_batch(&batch);
            }
            debug!("document subscription ended");
        });
        *lock(&self.task) = Some(task);
        info!("watching document for the event dialog");

        let found = self.discover();
        debug!(?found, "initial discovery");
        Ok(())
    }

    /// Stops watching and removes the injected control.
    #[instrument(skip(self))]
    pub fn stop(&self) {
        if let Some(task) = lock(&self.task).take() {
            task.abort();
        }
        let previous = lock(&self.active).take();
        if let Some(previous) = previous {
            if previous.control.is_connected() {
                if let Err(e) = previous.control.remove() {
                    debug!(error = %e, "could not remove action control");
                }
            }
        }
        self.session.reset("watcher stopped");
        info!("watcher stopped");
    }

    /// The page navigated: nothing captured so far is trustworthy.
    pub fn on_navigation(&self) {
        let previous = lock(&self.active).take();
        drop(previous);
        self.session.reset("navigation");
    }

    fn handle_batch(&self, batch: &[MutationRecord]) {
        let closed = lock(&self.active)
            .as_ref()
            .is_some_and(|a| !a.dialog.is_connected());
        if closed {
            let previous = lock(&self.active).take();
            drop(previous);
            self.session.reset("dialog closed");
        }

        if batch.iter().any(|r| !r.added_nodes().is_empty()) {
            let found = self.discover();
            debug!(?found, records = batch.len(), "discovery after mutation batch");
        }
    }

    fn visible_dialog(&self) -> Option<Element> {
        let root = self.engine.document().root();
        self.engine
            .locator()
            .locate_where(Role::DialogRegion, &root, &Element::is_visible)
    }

    /// Finds the dialog and injects the control if it is not there yet.
    pub fn discover(&self) -> Discovery {
        let Some(dialog) = self.visible_dialog() else {
            let root = self.engine.document().root();
            return match self.engine.locator().locate(Role::DialogRegion, &root) {
                Some(_) => Discovery::DialogHidden,
                None => Discovery::NoDialog,
            };
        };

        if self
            .engine
            .locator()
            .locate(Role::ActionControl, &dialog)
            .is_some()
        {
            return Discovery::AlreadyPresent;
        }
        if self.session.is_injected() {
            debug!("control missing from the current dialog; re-injecting");
        }

        match self.inject(&dialog) {
            Ok(Some(_)) => Discovery::Injected,
            Ok(None) => Discovery::Preview,
            Err(e) => {
                warn!(error = %e, "injection failed");
                Discovery::InjectionFailed
            }
        }
    }

    /// Injects the action control next to the dialog's save control.
    ///
    /// Idempotent: a dialog that already holds the control gets no second one.
    /// Returns `Ok(None)` when the dialog has no visible save control.
    #[instrument(skip(self, dialog), fields(dialog = dialog.object_id()))]
    pub fn inject(&self, dialog: &Element) -> Result<Option<Element>, AutomationError> {
        let _serial = lock(&self.injecting);
        self.inject_serialized(dialog)
    }

    fn inject_serialized(&self, dialog: &Element) -> Result<Option<Element>, AutomationError> {
        let handle = DialogHandle::new(dialog.clone());
        handle.validate()?;
        let locator = self.engine.locator();

        if let Some(existing) = locator.locate(Role::ActionControl, dialog) {
            debug!("action control already present");
            return Ok(Some(existing));
        }
        let Some(save) = locator.locate(Role::CommitControl, dialog) else {
            debug!("no visible save control; treating dialog as a preview");
            return Ok(None);
        };
        let parent = save
            .parent()
            .ok_or_else(|| AutomationError::ElementDetached(save.describe()))?;

        let presentation = self.presentation_of(&save);
        let document = self.engine.document();
        let control = document.create_element("button")?;
        control.set_attribute(ACTION_MARKER, "true")?;
        control.set_attribute("type", "button")?;
        control.set_attribute("aria-label", &self.engine.config().labels.idle)?;
        for (property, value) in &presentation {
            control.set_style(property, value)?;
        }
        parent.insert_before(&control, Some(&save))?;

        let wired = (|| -> Result<(Arc<InteractionController>, OverrideHandle), AutomationError> {
            let controller = InteractionController::new(
                self.engine.clone(),
                self.registry.clone(),
                control.clone(),
                handle.clone(),
            );
            controller.bind()?;
            let reference = demotion_reference(&save);
            let spec = OverrideSpec::from_reference(
                save.clone(),
                reference.as_ref(),
                &self.engine.config().demoted_fallback,
            );
            let demotion = OverridePersister::start(document, spec)?;
            Ok((controller, demotion))
        })();
        let (controller, demotion) = match wired {
            Ok(wired) => wired,
            Err(e) => {
                let _ = control.remove();
                return Err(e);
            }
        };

        let previous = lock(&self.active).replace(ActiveInjection {
            dialog: handle,
            control: control.clone(),
            commit: save.clone(),
            presentation,
            controller,
            demotion,
        });
        // Replacing drops the previous dialog's override subscription and timers.
        drop(previous);
        self.session.mark_injected();
        info!(control = control.object_id(), save = %save.describe(), "action control injected");
        Ok(Some(control))
    }

    /// Presentation to copy onto the action control. A save control this
    /// watcher already demoted keeps the presentation captured before demotion.
    fn presentation_of(&self, save: &Element) -> StyleSet {
        if let Some(active) = lock(&self.active).as_ref() {
            if active.commit == *save {
                return active.presentation.clone();
            }
        }
        self.engine
            .config()
            .presentation_properties
            .iter()
            .filter_map(|p| save.computed_style(p).map(|v| (p.clone(), v)))
            .collect()
    }

    /// Answers a control-surface request.
    #[instrument(skip(self))]
    pub fn handle_request(&self, request: ControlRequest) -> ControlResponse {
        match request {
            ControlRequest::ForceCheck => self.force_check(),
        }
    }

    /// The visible dialog, as a handle to validate before each use.
    pub fn current_dialog(&self) -> Result<DialogHandle, AutomationError> {
        self.visible_dialog()
            .map(DialogHandle::new)
            .ok_or_else(|| AutomationError::DialogNotFound("no visible dialog region".into()))
    }

    fn force_check(&self) -> ControlResponse {
        let dialog = match self.current_dialog() {
            Ok(handle) => handle.element().clone(),
            Err(e) => {
                debug!(error = %e, "force check found nothing");
                return ControlResponse::checked(false, "No visible dialog found", None);
            }
        };

        let _serial = lock(&self.injecting);
        // Repeated manual checks replace the control instead of stacking them.
        if let Some(existing) = self.engine.locator().locate(Role::ActionControl, &dialog) {
            if let Err(e) = existing.remove() {
                warn!(error = %e, "could not remove stale action control");
            }
            self.session.reset("forced re-check");
        }

        let result = self.inject_serialized(&dialog);
        if !matches!(result, Ok(Some(_))) {
            let previous = lock(&self.active).take();
            drop(previous);
        }
        match result {
            Ok(Some(_)) => ControlResponse::checked(true, "Button injected", Some(true)),
            Ok(None) => ControlResponse::checked(
                true,
                "No visible save control; preview dialog",
                Some(false),
            ),
            Err(e) => ControlResponse::checked(true, &e.to_string(), Some(false)),
        }
    }
}

impl Drop for DialogWatcher {
    fn drop(&mut self) {
        if let Some(task) = lock(&self.task).take() {
            task.abort();
        }
    }
}

/// A visible sibling button of `save` to borrow the secondary look from.
fn demotion_reference(save: &Element) -> Option<Element> {
    let parent = save.parent()?;
    parent.children().into_iter().find(|node| {
        node != save
            && !node.has_attribute(ACTION_MARKER)
            && node.role().as_deref() == Some("button")
            && node.is_visible()
    })
}
