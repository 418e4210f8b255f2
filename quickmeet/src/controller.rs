use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tokio::task::JoinHandle;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::dialog::DialogHandle;
use crate::element::Element;
use crate::errors::AutomationError;
use crate::locator::Role;
use crate::strategy::{remove_veils, AttachOutcome, StrategyRegistry};
use crate::Engine;

/// Attribute mirroring the controller state onto the control, for styling and tests
pub const STATE_ATTRIBUTE: &str = "data-quickmeet-state";

/// Visible state of the injected action control
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlState {
    Idle,
    Working,
    Success,
    /// Carries the short label shown on the control
    Error(String),
}

impl ControlState {
    fn tag(&self) -> &'static str {
        match self {
            ControlState::Idle => "idle",
            ControlState::Working => "working",
            ControlState::Success => "success",
            ControlState::Error(_) => "error",
        }
    }
}

/// Result of one call to [`InteractionController::invoke`]
#[derive(Debug, Clone, PartialEq)]
pub enum Invocation {
    /// Another invocation was running, or one already succeeded
    Ignored,
    Completed(AttachOutcome),
    Failed(AutomationError),
}

/// Owns the action control's state machine and runs
/// classify -> execute -> commit for each invocation.
pub struct InteractionController {
    engine: Arc<Engine>,
    registry: StrategyRegistry,
    control: Element,
    dialog: DialogHandle,
    state: Mutex<ControlState>,
    reset_task: Mutex<Option<JoinHandle<()>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl InteractionController {
    pub fn new(
        engine: Arc<Engine>,
        registry: StrategyRegistry,
        control: Element,
        dialog: DialogHandle,
    ) -> Arc<Self> {
        let controller = Arc::new(Self {
            engine,
            registry,
            control,
            dialog,
            state: Mutex::new(ControlState::Idle),
            reset_task: Mutex::new(None),
        });
        controller.render(&ControlState::Idle);
        controller
    }

    /// Wires clicks on the control to [`InteractionController::invoke`].
    ///
    /// The listener holds only a weak reference, so a discarded controller is
    /// not kept alive by the host's node.
    pub fn bind(self: &Arc<Self>) -> Result<(), AutomationError> {
        let weak: Weak<Self> = Arc::downgrade(self);
        self.control.add_click_listener(Arc::new(move || {
            let Some(controller) = weak.upgrade() else {
                debug!("click on a control whose controller is gone");
                return;
            };
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    handle.spawn(async move {
                        let _ = controller.invoke().await;
                    });
                }
                Err(_) => warn!("action control clicked outside a runtime; ignored"),
            }
        }))
    }

    pub fn control(&self) -> &Element {
        &self.control
    }

    pub fn dialog(&self) -> &DialogHandle {
        &self.dialog
    }

    pub fn state(&self) -> ControlState {
        lock(&self.state).clone()
    }

    /// Runs one invocation. A call while one is working, or after one has
    /// succeeded, is a no-op.
    pub async fn invoke(self: &Arc<Self>) -> Invocation {
        {
            let mut state = lock(&self.state);
            if matches!(*state, ControlState::Working | ControlState::Success) {
                debug!(state = state.tag(), "invocation ignored");
                return Invocation::Ignored;
            }
            *state = ControlState::Working;
        }
        if let Some(pending) = lock(&self.reset_task).take() {
            pending.abort();
        }
        self.render(&ControlState::Working);

        let invocation_id = Uuid::new_v4();
        let result = self
            .run()
            .instrument(info_span!("invocation", id = %invocation_id))
            .await;

        // Runs on every exit from Working, whatever the outcome.
        let leftover = remove_veils(&self.engine);
        if leftover > 0 {
            debug!(leftover, "removed leftover submenu veils");
        }

        match result {
            Ok(outcome) => {
                info!(%invocation_id, reason = outcome.reason(), "invocation succeeded");
                self.transition(ControlState::Success);
                Invocation::Completed(outcome)
            }
            Err(e) => {
                warn!(%invocation_id, error = %e, "invocation failed");
                self.transition(ControlState::Error(e.short_label()));
                self.schedule_reset();
                Invocation::Failed(e)
            }
        }
    }

    async fn run(&self) -> Result<AttachOutcome, AutomationError> {
        let dialog = self.dialog.validate()?.clone();
        let strategy = self.registry.classify(&self.engine, &dialog)?;
        let outcome = strategy.execute(&self.engine, &self.dialog).await?;
        self.commit()?;
        Ok(outcome)
    }

    fn commit(&self) -> Result<(), AutomationError> {
        let dialog = self.dialog.validate()?;
        let save = self
            .engine
            .locator()
            .locate(Role::CommitControl, dialog)
            .ok_or_else(|| AutomationError::not_found(Role::CommitControl))?;
        info!(control = %save.describe(), "committing");
        save.click()
    }

    fn transition(&self, next: ControlState) {
        *lock(&self.state) = next.clone();
        self.render(&next);
    }

    fn schedule_reset(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        let delay = self.engine.config().error_reset_delay();
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(controller) = weak.upgrade() {
                controller.reset_after_error();
            }
        });
        *lock(&self.reset_task) = Some(task);
    }

    fn reset_after_error(&self) {
        {
            let mut state = lock(&self.state);
            if !matches!(*state, ControlState::Error(_)) {
                return;
            }
            *state = ControlState::Idle;
        }
        debug!("error label expired; back to idle");
        self.render(&ControlState::Idle);
    }

    fn render(&self, state: &ControlState) {
        let labels = &self.engine.config().labels;
        let result = (|| -> Result<(), AutomationError> {
            self.control.set_attribute(STATE_ATTRIBUTE, state.tag())?;
            match state {
                ControlState::Idle => {
                    self.control.set_text(&labels.idle)?;
                    self.control.remove_attribute("disabled")?;
                    self.control.remove_attribute("aria-busy")?;
                }
                ControlState::Working => {
                    self.control.set_text(&labels.working)?;
                    self.control.set_attribute("disabled", "true")?;
                    self.control.set_attribute("aria-busy", "true")?;
                }
                ControlState::Success => {
                    self.control.set_text(&labels.success)?;
                    self.control.remove_attribute("aria-busy")?;
                }
                ControlState::Error(label) => {
                    self.control.set_text(label)?;
                    self.control.remove_attribute("disabled")?;
                    self.control.remove_attribute("aria-busy")?;
                }
            }
            Ok(())
        })();
        if let Err(e) = result {
            debug!(error = %e, state = state.tag(), "could not render control state");
        }
    }
}

impl Drop for InteractionController {
    fn drop(&mut self) {
        if let Some(pending) = lock(&self.reset_task).take() {
            pending.abort();
        }
    }
}
