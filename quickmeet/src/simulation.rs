//! Scripted stand-in for the calendar event editor
//!
//! Builds the host dialog in a [`MemoryDocument`] and reacts to clicks the way
//! the real host does in each scenario: delayed attachment, delayed submenu,
//! save closes the dialog.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::element::Element;
use crate::errors::AutomationError;
use crate::platforms::memory::MemoryDocument;
use crate::platforms::DocumentEngine;
use crate::selector::Selector;

pub const MEET_LINK: &str = "https://meet.google.com/abc-defg-hij";
pub const PLACEHOLDER_LINK: &str = "https://meet.google.com/xxx-xxxx-xxx";

const PRIMARY_STYLE: &[(&str, &str)] = &[
    ("background-color", "rgb(26, 115, 232)"),
    ("color", "rgb(255, 255, 255)"),
    ("border", "none"),
    ("border-radius", "4px"),
    ("box-shadow", "0 1px 2px rgba(60, 64, 67, 0.3)"),
    ("height", "36px"),
    ("padding", "0 24px"),
    ("font-family", "\"Google Sans\", Roboto, sans-serif"),
    ("font-weight", "500"),
    ("letter-spacing", "0.25px"),
    ("text-transform", "none"),
];

const SECONDARY_STYLE: &[(&str, &str)] = &[
    ("background-color", "rgb(255, 255, 255)"),
    ("color", "rgb(26, 115, 232)"),
    ("border", "1px solid rgb(218, 220, 224)"),
    ("box-shadow", "none"),
];

/// Host behaviors the engine has to tell apart
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HostScenario {
    /// A real link is present; a provider-labelled control is shown as well
    AlreadyAttached,
    /// The control is labelled with the provider and attaches on click
    DirectProvider,
    /// Generic control opening a provider submenu
    Submenu,
    /// Generic control that attaches on click without a submenu
    SilentDirect,
    /// A dormant template link plus a generic submenu control
    PlaceholderLink,
    /// Submenu whose provider item closes the menu but never attaches
    UnresponsiveMenu,
    NoAttachControl,
    /// No visible save control
    Preview,
}

#[derive(Debug, Clone, Copy)]
pub struct HostTiming {
    /// From the attaching click to the link appearing
    pub attach_delay: Duration,
    /// From the attach click to the submenu rendering
    pub menu_delay: Duration,
}

impl Default for HostTiming {
    fn default() -> Self {
        Self {
            attach_delay: Duration::from_millis(30),
            menu_delay: Duration::from_millis(150),
        }
    }
}

#[derive(Debug, Default)]
struct HostCounters {
    save_clicks: AtomicUsize,
    attach_clicks: AtomicUsize,
    menu_item_clicks: AtomicUsize,
}

pub struct SimulatedCalendar {
    document: MemoryDocument,
    scenario: HostScenario,
    timing: HostTiming,
    counters: Arc<HostCounters>,
    dialog: Mutex<Option<Element>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Runs `f` after `delay` on the current runtime, or right away without one.
fn later(delay: Duration, f: impl FnOnce() + Send + 'static) {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(async move {
                tokio::time::sleep(delay).await;
                f();
            });
        }
        Err(_) => f(),
    }
}

fn styled(element: &Element, style: &[(&str, &str)]) -> Result<(), AutomationError> {
    for (property, value) in style {
        element.set_style(property, value)?;
    }
    Ok(())
}

impl SimulatedCalendar {
    pub fn new(scenario: HostScenario) -> Self {
        Self::with_timing(scenario, HostTiming::default())
    }

    pub fn with_timing(scenario: HostScenario, timing: HostTiming) -> Self {
        Self {
            document: MemoryDocument::new(),
            scenario,
            timing,
            counters: Arc::new(HostCounters::default()),
            dialog: Mutex::new(None),
        }
    }

    pub fn scenario(&self) -> HostScenario {
        self.scenario
    }

    pub fn memory(&self) -> &MemoryDocument {
        &self.document
    }

    pub fn document(&self) -> Arc<dyn DocumentEngine> {
        Arc::new(self.document.clone())
    }

    pub fn dialog(&self) -> Option<Element> {
        lock(&self.dialog).clone()
    }

    pub fn save_clicks(&self) -> usize {
        self.counters.save_clicks.load(Ordering::SeqCst)
    }

    pub fn attach_clicks(&self) -> usize {
        self.counters.attach_clicks.load(Ordering::SeqCst)
    }

    pub fn menu_item_clicks(&self) -> usize {
        self.counters.menu_item_clicks.load(Ordering::SeqCst)
    }

    /// The host's own save button in the open dialog
    pub fn save_button(&self) -> Option<Element> {
        let dialog = self.dialog()?;
        dialog
            .query(&Selector::from("attr:jsname=x8hlje"))
            .ok()
            .flatten()
    }

    /// Renders the editor dialog into the document.
    pub fn open_dialog(&self) -> Result<Element, AutomationError> {
        let doc = &self.document;
        let dialog = doc.build(
            "div",
            &[
                ("role", "dialog"),
                ("aria-modal", "true"),
                ("data-event-editor", "true"),
            ],
            "",
        )?;
        dialog.append_child(&doc.build("div", &[("role", "heading")], "Add title")?)?;

        let conference = doc.build("div", &[("data-section", "conference")], "")?;
        dialog.append_child(&conference)?;
        self.populate_conference(&conference)?;

        let footer = doc.build("div", &[("data-section", "footer")], "")?;
        dialog.append_child(&footer)?;
        let more = doc.build("button", &[("type", "button")], "More options")?;
        styled(&more, SECONDARY_STYLE)?;
        footer.append_child(&more)?;

        let save = doc.build("button", &[("jsname", "x8hlje"), ("type", "button")], "")?;
        styled(&save, PRIMARY_STYLE)?;
        let caption = doc.build("span", &[], "Save")?;
        caption.set_style("color", "rgb(255, 255, 255)")?;
        save.append_child(&caption)?;
        if self.scenario == HostScenario::Preview {
            save.set_style("display", "none")?;
        }
        let counters = self.counters.clone();
        let closing = dialog.clone();
        save.add_click_listener(Arc::new(move || {
            counters.save_clicks.fetch_add(1, Ordering::SeqCst);
            info!("host: save clicked; closing dialog");
            if let Err(e) = closing.remove() {
                debug!(error = %e, "host: dialog already gone");
            }
        }))?;
        footer.append_child(&save)?;

        doc.root().append_child(&dialog)?;
        *lock(&self.dialog) = Some(dialog.clone());
        Ok(dialog)
    }

    pub fn close_dialog(&self) -> Result<(), AutomationError> {
        if let Some(dialog) = lock(&self.dialog).take() {
            dialog.remove()?;
        }
        Ok(())
    }

    /// A host re-render that restores the save button's primary look.
    pub fn revert_commit_style(&self) -> Result<(), AutomationError> {
        let save = self
            .save_button()
            .ok_or_else(|| AutomationError::Internal("no save button rendered".into()))?;
        styled(&save, PRIMARY_STYLE)?;
        for child in save.children() {
            child.set_style("color", "rgb(255, 255, 255)")?;
        }
        Ok(())
    }

    fn populate_conference(&self, row: &Element) -> Result<(), AutomationError> {
        let doc = &self.document;
        match self.scenario {
            HostScenario::AlreadyAttached => {
                row.append_child(&doc.build(
                    "a",
                    &[("href", MEET_LINK)],
                    "Join with Google Meet",
                )?)?;
                let control = doc.build("button", &[], "Add Google Meet video conferencing")?;
                self.attach_directly(&control, row)?;
                row.append_child(&control)?;
            }
            HostScenario::DirectProvider => {
                let control = doc.build("button", &[], "Add Google Meet video conferencing")?;
                self.attach_directly(&control, row)?;
                row.append_child(&control)?;
            }
            HostScenario::SilentDirect => {
                let control = doc.build("button", &[], "Add video conferencing")?;
                self.attach_directly(&control, row)?;
                row.append_child(&control)?;
            }
            HostScenario::Submenu
            | HostScenario::PlaceholderLink
            | HostScenario::UnresponsiveMenu => {
                if self.scenario == HostScenario::PlaceholderLink {
                    row.append_child(&doc.build(
                        "a",
                        &[("href", PLACEHOLDER_LINK)],
                        "Join with Google Meet",
                    )?)?;
                }
                let control = doc.build(
                    "button",
                    &[("aria-haspopup", "menu"), ("aria-expanded", "false")],
                    "Add video conferencing",
                )?;
                self.open_menu_on_click(&control, row)?;
                row.append_child(&control)?;
            }
            HostScenario::NoAttachControl | HostScenario::Preview => {}
        }
        Ok(())
    }

    fn attach_directly(&self, control: &Element, row: &Element) -> Result<(), AutomationError> {
        let counters = self.counters.clone();
        let doc = self.document.clone();
        let row = row.clone();
        let target = control.clone();
        let delay = self.timing.attach_delay;
        control.add_click_listener(Arc::new(move || {
            counters.attach_clicks.fetch_add(1, Ordering::SeqCst);
            let doc = doc.clone();
            let row = row.clone();
            let target = target.clone();
            later(delay, move || {
                if let Err(e) = insert_link(&doc, &row, Some(&target)) {
                    debug!(error = %e, "host: could not attach");
                }
            });
        }))
    }

    fn open_menu_on_click(&self, control: &Element, row: &Element) -> Result<(), AutomationError> {
        let counters = self.counters.clone();
        let doc = self.document.clone();
        let row = row.clone();
        let target = control.clone();
        let timing = self.timing;
        let attaches = self.scenario != HostScenario::UnresponsiveMenu;
        control.add_click_listener(Arc::new(move || {
            counters.attach_clicks.fetch_add(1, Ordering::SeqCst);
            let _ = target.set_attribute("aria-expanded", "true");
            let counters = counters.clone();
            let doc = doc.clone();
            let row = row.clone();
            let target = target.clone();
            later(timing.menu_delay, move || {
                let rendered =
                    render_menu(&doc, &row, &target, &counters, attaches.then_some(timing.attach_delay));
                if let Err(e) = rendered {
                    debug!(error = %e, "host: could not render submenu");
                }
            });
        }))
    }
}

fn insert_link(
    doc: &MemoryDocument,
    row: &Element,
    replaced: Option<&Element>,
) -> Result<(), AutomationError> {
    if !row.is_connected() {
        return Ok(());
    }
    let link = doc.build("a", &[("href", MEET_LINK)], "Join with Google Meet")?;
    row.append_child(&link)?;
    if let Some(replaced) = replaced {
        if replaced.is_connected() {
            replaced.remove()?;
        }
    }
    info!("host: conference attached");
    Ok(())
}

fn render_menu(
    doc: &MemoryDocument,
    row: &Element,
    control: &Element,
    counters: &Arc<HostCounters>,
    attach_delay: Option<Duration>,
) -> Result<(), AutomationError> {
    let menu = doc.build("div", &[("role", "menu")], "")?;
    let meet = doc.build("div", &[("role", "menuitem")], "Google Meet")?;
    let other = doc.build("div", &[("role", "menuitem")], "Zoom Meeting")?;

    let counters = counters.clone();
    let doc_for_item = doc.clone();
    let row = row.clone();
    let control = control.clone();
    let menu_for_item = menu.clone();
    meet.add_click_listener(Arc::new(move || {
        counters.menu_item_clicks.fetch_add(1, Ordering::SeqCst);
        let _ = menu_for_item.remove();
        let Some(attach_delay) = attach_delay else {
            debug!("host: provider chosen but nothing attaches");
            return;
        };
        let doc = doc_for_item.clone();
        let row = row.clone();
        let control = control.clone();
        later(attach_delay, move || {
            if let Err(e) = insert_link(&doc, &row, Some(&control)) {
                debug!(error = %e, "host: could not attach from submenu");
            }
        });
    }))?;

    menu.append_child(&meet)?;
    menu.append_child(&other)?;
    doc.root().append_child(&menu)?;
    info!("host: submenu rendered");
    Ok(())
}
