//! Classification of the host's conferencing control and the matching flows

use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::dialog::DialogHandle;
use crate::element::Element;
use crate::errors::AutomationError;
use crate::locator::Role;
use crate::poller::{wait_for, wait_for_condition};
use crate::Engine;

/// Marker on the temporary stylesheet that hides host menus during a submenu flow
pub const VEIL_MARKER: &str = "data-quickmeet-veil";

const VEIL_CSS: &str = r#"[role="menu"], [role="listbox"] { opacity: 0 !important; }"#;

/// The distinguishable behaviors of the host's conferencing control
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// A real conference link is already present
    AlreadyAttached,
    /// The attach control names the provider; clicking attaches with no submenu
    DirectAttach,
    /// Generic attach control; may open a provider submenu or attach silently
    SubmenuAttach,
}

/// What a successful strategy did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachOutcome {
    AlreadyActive,
    AttachedDirectly,
    /// Generic control attached before any submenu appeared
    AttachedOnProbe,
    AttachedFromMenu,
}

impl AttachOutcome {
    pub fn reason(&self) -> &'static str {
        match self {
            AttachOutcome::AlreadyActive => "Meet already active",
            AttachOutcome::AttachedDirectly => "Meet added",
            AttachOutcome::AttachedOnProbe => "Meet added without submenu",
            AttachOutcome::AttachedFromMenu => "Meet added from submenu",
        }
    }
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 3] = [
        StrategyKind::AlreadyAttached,
        StrategyKind::DirectAttach,
        StrategyKind::SubmenuAttach,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            StrategyKind::AlreadyAttached => "already-attached",
            StrategyKind::DirectAttach => "direct-attach",
            StrategyKind::SubmenuAttach => "submenu-attach",
        }
    }

    /// Lower is tried first
    pub fn priority(&self) -> u8 {
        match self {
            StrategyKind::AlreadyAttached => 10,
            StrategyKind::DirectAttach => 20,
            StrategyKind::SubmenuAttach => 30,
        }
    }

    pub fn detect(&self, engine: &Engine, dialog: &Element) -> bool {
        match self {
            StrategyKind::AlreadyAttached => find_attachment(engine, dialog).is_some(),
            StrategyKind::DirectAttach => {
                let provider = engine.config().provider_name.to_lowercase();
                engine
                    .locator()
                    .locate(Role::AttachControl, dialog)
                    .is_some_and(|control| control.label().to_lowercase().contains(&provider))
            }
            StrategyKind::SubmenuAttach => engine
                .locator()
                .locate(Role::AttachControl, dialog)
                .is_some(),
        }
    }

    #[instrument(skip(self, engine, dialog), fields(strategy = self.name()))]
    pub async fn execute(
        &self,
        engine: &Engine,
        dialog: &DialogHandle,
    ) -> Result<AttachOutcome, AutomationError> {
        match self {
            StrategyKind::AlreadyAttached => {
                info!("conference already attached; nothing to click");
                Ok(AttachOutcome::AlreadyActive)
            }
            StrategyKind::DirectAttach => direct_attach(engine, dialog).await,
            StrategyKind::SubmenuAttach => submenu_attach(engine, dialog).await,
        }
    }
}

/// Strategies in ascending priority; the first whose `detect` holds is chosen.
#[derive(Debug, Clone)]
pub struct StrategyRegistry {
    strategies: Vec<StrategyKind>,
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::new(StrategyKind::ALL)
    }
}

impl StrategyRegistry {
    /// Order of `kinds` does not matter; evaluation is always by priority.
    pub fn new(kinds: impl IntoIterator<Item = StrategyKind>) -> Self {
        let mut strategies: Vec<StrategyKind> = kinds.into_iter().collect();
        strategies.sort_by_key(StrategyKind::priority);
        strategies.dedup();
        Self { strategies }
    }

    pub fn strategies(&self) -> &[StrategyKind] {
        &self.strategies
    }

    #[instrument(skip(self, engine, dialog))]
    pub fn classify(
        &self,
        engine: &Engine,
        dialog: &Element,
    ) -> Result<StrategyKind, AutomationError> {
        for kind in &self.strategies {
            if kind.detect(engine, dialog) {
                info!(strategy = kind.name(), priority = kind.priority(), "dialog classified");
                return Ok(*kind);
            }
            debug!(strategy = kind.name(), "not detected");
        }
        Err(AutomationError::ClassificationFailed(format!(
            "none of [{}] matched {}",
            self.strategies
                .iter()
                .map(StrategyKind::name)
                .collect::<Vec<_>>()
                .join(", "),
            dialog.describe()
        )))
    }
}

/// A conference link or marker in `dialog`, ignoring dormant template links.
pub fn find_attachment(engine: &Engine, dialog: &Element) -> Option<Element> {
    let markers = &engine.config().placeholder_markers;
    engine
        .locator()
        .locate_where(Role::Attachment, dialog, &|node| {
            !node
                .attribute("href")
                .is_some_and(|href| markers.iter().any(|m| href.contains(m.as_str())))
        })
}

async fn wait_for_attachment(
    engine: &Engine,
    dialog: &DialogHandle,
    timeout: Duration,
) -> Option<Element> {
    wait_for_condition(
        || -> Result<Option<Element>, AutomationError> {
            let dialog = dialog.validate()?;
            Ok(find_attachment(engine, dialog))
        },
        timeout,
        engine.config().poll_interval(),
    )
    .await
}

fn attach_control(engine: &Engine, dialog: &DialogHandle) -> Result<Element, AutomationError> {
    let dialog = dialog.validate()?;
    engine
        .locator()
        .locate(Role::AttachControl, dialog)
        .ok_or_else(|| AutomationError::not_found(Role::AttachControl))
}

async fn direct_attach(
    engine: &Engine,
    dialog: &DialogHandle,
) -> Result<AttachOutcome, AutomationError> {
    let control = attach_control(engine, dialog)?;
    info!(control = %control.describe(), "invoking attach control");
    control.click()?;

    let timeout = engine.config().retry_timeout();
    match wait_for_attachment(engine, dialog, timeout).await {
        Some(link) => {
            info!(attachment = %link.describe(), "conference attached");
            Ok(AttachOutcome::AttachedDirectly)
        }
        None => Err(AutomationError::AttachTimeout {
            expected: "conference attachment after direct attach".to_string(),
            waited: timeout,
            control_state: control.describe(),
        }),
    }
}

async fn submenu_attach(
    engine: &Engine,
    dialog: &DialogHandle,
) -> Result<AttachOutcome, AutomationError> {
    let control = attach_control(engine, dialog)?;
    // Held for the whole flow; dropping it removes the stylesheet on every path.
    let _veil = match SubmenuVeil::install(engine) {
        Ok(veil) => Some(veil),
        Err(e) => {
            warn!(error = %e, "could not hide host menus; continuing visibly");
            None
        }
    };

    info!(control = %control.describe(), "invoking generic attach control");
    control.click()?;

    // Some accounts attach straight away despite the generic label.
    if let Some(link) = wait_for_attachment(engine, dialog, engine.config().optimistic_probe()).await {
        info!(attachment = %link.describe(), "attached without a submenu");
        return Ok(AttachOutcome::AttachedOnProbe);
    }

    let root = engine.document().root();
    let item = wait_for(
        || engine.locator().locate(Role::ProviderMenuItem, &root),
        engine.config().dropdown_timeout(),
        engine.config().poll_interval(),
    )
    .await
    .ok_or_else(|| AutomationError::not_found(Role::ProviderMenuItem))?;

    info!(item = %item.describe(), "choosing provider from submenu");
    item.click()?;

    let timeout = engine.config().retry_timeout();
    match wait_for_attachment(engine, dialog, timeout).await {
        Some(link) => {
            info!(attachment = %link.describe(), "conference attached");
            Ok(AttachOutcome::AttachedFromMenu)
        }
        None => Err(AutomationError::AttachTimeout {
            expected: "conference attachment after choosing the provider".to_string(),
            waited: timeout,
            control_state: control.describe(),
        }),
    }
}

/// Temporary stylesheet hiding host menus; removed when dropped.
#[derive(Debug)]
pub struct SubmenuVeil {
    node: Element,
}

impl SubmenuVeil {
    pub fn install(engine: &Engine) -> Result<Self, AutomationError> {
        let node = engine.document().create_element("style")?;
        node.set_attribute(VEIL_MARKER, "menu")?;
        node.set_text(VEIL_CSS)?;
        engine.document().root().append_child(&node)?;
        debug!("submenu veil installed");
        Ok(Self { node })
    }
}

impl Drop for SubmenuVeil {
    fn drop(&mut self) {
        if let Err(e) = self.node.remove() {
            warn!(error = %e, "failed to remove submenu veil");
        }
    }
}

/// Removes every veil stylesheet still in the document. Returns how many were found.
pub fn remove_veils(engine: &Engine) -> usize {
    let root = engine.document().root();
    let selector = crate::Selector::from(format!("attr:{VEIL_MARKER}"));
    let veils = root.query_all(&selector).unwrap_or_default();
    for veil in &veils {
        if let Err(e) = veil.remove() {
            warn!(error = %e, "failed to remove leftover veil");
        }
    }
    veils.len()
}
