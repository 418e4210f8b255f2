//! End-to-end invocations against the simulated host, on a paused clock

use std::sync::Arc;
use std::time::Duration;

use super::{fast_config, init_tracing, open_calendar};
use crate::controller::STATE_ATTRIBUTE;
use crate::platforms::DocumentEngine;
use crate::simulation::{HostScenario, SimulatedCalendar};
use crate::strategy::VEIL_MARKER;
use crate::{
    AttachOutcome, AutomationError, ControlState, DialogWatcher, Engine, InteractionController,
    Invocation, Role, Selector,
};

/// Host, running watcher and the controller of the control it injected.
/// Must be called inside a runtime.
fn injected(
    scenario: HostScenario,
) -> (SimulatedCalendar, Arc<DialogWatcher>, Arc<InteractionController>) {
    let (host, engine) = open_calendar(scenario);
    let watcher = DialogWatcher::new(engine);
    watcher.start().unwrap();
    let controller = watcher.controller().expect("control injected on start");
    (host, watcher, controller)
}

fn veil_count(host: &SimulatedCalendar) -> usize {
    host.memory()
        .root()
        .query_all(&Selector::from(format!("attr:{VEIL_MARKER}")))
        .unwrap()
        .len()
}

#[tokio::test(start_paused = true)]
async fn test_already_attached_commits_without_attaching() {
    let (host, watcher, controller) = injected(HostScenario::AlreadyAttached);

    let result = controller.invoke().await;
    assert_eq!(result, Invocation::Completed(AttachOutcome::AlreadyActive));
    assert_eq!(AttachOutcome::AlreadyActive.reason(), "Meet already active");
    assert_eq!(host.attach_clicks(), 0);
    assert_eq!(host.save_clicks(), 1);
    assert_eq!(controller.state(), ControlState::Success);

    // Saving closed the dialog; the watcher notices on the next batch.
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(!watcher.session().is_injected());
    assert!(watcher.controller().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_direct_provider_attaches_then_commits() {
    let (host, _watcher, controller) = injected(HostScenario::DirectProvider);

    let result = controller.invoke().await;
    assert_eq!(result, Invocation::Completed(AttachOutcome::AttachedDirectly));
    assert_eq!(host.attach_clicks(), 1);
    assert_eq!(host.menu_item_clicks(), 0);
    assert_eq!(host.save_clicks(), 1);
    assert_eq!(veil_count(&host), 0);

    let control = controller.control();
    assert_eq!(control.own_text(), "Saved with Meet");
    assert_eq!(control.attribute(STATE_ATTRIBUTE).as_deref(), Some("success"));
    assert!(control.is_disabled());
}

#[tokio::test(start_paused = true)]
async fn test_submenu_flow_picks_the_provider() {
    let (host, _watcher, controller) = injected(HostScenario::Submenu);

    let result = controller.invoke().await;
    assert_eq!(result, Invocation::Completed(AttachOutcome::AttachedFromMenu));
    assert_eq!(host.attach_clicks(), 1);
    assert_eq!(host.menu_item_clicks(), 1);
    assert_eq!(host.save_clicks(), 1);
    assert_eq!(veil_count(&host), 0);
    let root = host.memory().root();
    assert!(root.query(&Selector::from("role:menu")).unwrap().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_placeholder_link_still_goes_through_the_submenu() {
    let (host, _watcher, controller) = injected(HostScenario::PlaceholderLink);

    let result = controller.invoke().await;
    assert_eq!(result, Invocation::Completed(AttachOutcome::AttachedFromMenu));
    assert_eq!(host.menu_item_clicks(), 1);
    assert_eq!(host.save_clicks(), 1);
}

// Timing-sensitive by nature: the probe (50ms) must outlast the host's attach
// delay (30ms) and end before its menu delay (150ms).
#[tokio::test(start_paused = true)]
async fn test_silent_direct_skips_the_submenu_search() {
    let (host, _watcher, controller) = injected(HostScenario::SilentDirect);

    let result = controller.invoke().await;
    assert_eq!(result, Invocation::Completed(AttachOutcome::AttachedOnProbe));
    assert_eq!(host.attach_clicks(), 1);
    assert_eq!(host.menu_item_clicks(), 0);
    assert_eq!(host.save_clicks(), 1);
    assert_eq!(veil_count(&host), 0);
}

#[tokio::test(start_paused = true)]
async fn test_no_attach_control_shows_error_then_resets() {
    let (host, _watcher, controller) = injected(HostScenario::NoAttachControl);

    let result = controller.invoke().await;
    assert!(matches!(
        result,
        Invocation::Failed(AutomationError::ClassificationFailed(_))
    ));
    assert_eq!(host.save_clicks(), 0);
    assert_eq!(controller.state(), ControlState::Error("No Meet control".into()));
    assert_eq!(controller.control().own_text(), "No Meet control");
    assert!(!controller.control().is_disabled());

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(controller.state(), ControlState::Idle);
    assert_eq!(controller.control().own_text(), "Save with Meet");
    assert_eq!(host.save_clicks(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_second_invocation_while_working_is_ignored() {
    let (host, _watcher, controller) = injected(HostScenario::DirectProvider);

    let (first, second) = tokio::join!(controller.invoke(), controller.invoke());
    assert_eq!(first, Invocation::Completed(AttachOutcome::AttachedDirectly));
    assert_eq!(second, Invocation::Ignored);
    assert_eq!(host.attach_clicks(), 1);
    assert_eq!(host.save_clicks(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_success_is_terminal() {
    let (host, _watcher, controller) = injected(HostScenario::DirectProvider);
    assert_eq!(
        controller.invoke().await,
        Invocation::Completed(AttachOutcome::AttachedDirectly)
    );

    // Outlasts the error reset delay; success is never reset.
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(controller.state(), ControlState::Success);
    assert_eq!(controller.control().own_text(), "Saved with Meet");

    assert_eq!(controller.invoke().await, Invocation::Ignored);
    assert_eq!(host.attach_clicks(), 1);
    assert_eq!(host.save_clicks(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_clicking_the_control_runs_an_invocation() {
    let (host, _watcher, controller) = injected(HostScenario::DirectProvider);

    controller.control().click().unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;
    assert_eq!(controller.state(), ControlState::Working);
    assert_eq!(controller.control().own_text(), "Adding Meet...");

    // Disabled while working: the host swallows repeated clicks.
    controller.control().click().unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(controller.state(), ControlState::Success);
    assert_eq!(host.attach_clicks(), 1);
    assert_eq!(host.save_clicks(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_closed_dialog_is_reported_as_stale() {
    let (host, _watcher, controller) = injected(HostScenario::DirectProvider);
    host.close_dialog().unwrap();

    let result = controller.invoke().await;
    assert!(
        matches!(result, Invocation::Failed(AutomationError::StaleDialog(_))),
        "{result:?}"
    );
    assert_eq!(controller.state(), ControlState::Error("Dialog closed".into()));
    assert_eq!(host.attach_clicks(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_stale_dialog_is_not_swapped_for_a_new_one() {
    let (host, _watcher, controller) = injected(HostScenario::DirectProvider);
    host.close_dialog().unwrap();
    host.open_dialog().unwrap();

    let result = controller.invoke().await;
    assert!(matches!(result, Invocation::Failed(AutomationError::StaleDialog(_))));
    assert_eq!(host.attach_clicks(), 0);
    assert_eq!(host.save_clicks(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_missing_commit_control_fails_after_attaching() {
    let (host, _watcher, controller) = injected(HostScenario::DirectProvider);
    host.save_button().unwrap().set_style("display", "none").unwrap();

    let result = controller.invoke().await;
    assert_eq!(
        result,
        Invocation::Failed(AutomationError::ElementNotFound {
            role: Role::CommitControl
        })
    );
    assert_eq!(host.attach_clicks(), 1);
    assert_eq!(host.save_clicks(), 0);
    assert_eq!(controller.state(), ControlState::Error("Save missing".into()));
}

#[tokio::test(start_paused = true)]
async fn test_submenu_that_never_renders_still_removes_the_veil() {
    init_tracing();
    let host = SimulatedCalendar::new(HostScenario::Submenu);
    host.open_dialog().unwrap();
    let config = crate::EngineConfig {
        dropdown_timeout_ms: 60,
        ..fast_config()
    };
    let engine = Engine::new(host.document(), config).unwrap();
    let watcher = DialogWatcher::new(engine);
    watcher.start().unwrap();
    let controller = watcher.controller().unwrap();

    let result = controller.invoke().await;
    assert_eq!(
        result,
        Invocation::Failed(AutomationError::ElementNotFound {
            role: Role::ProviderMenuItem
        })
    );
    assert_eq!(controller.state(), ControlState::Error("Meet option missing".into()));
    assert_eq!(veil_count(&host), 0);
    assert_eq!(host.save_clicks(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_provider_that_never_attaches_fails_without_saving() {
    let (host, _watcher, controller) = injected(HostScenario::UnresponsiveMenu);

    let result = controller.invoke().await;
    assert!(
        matches!(result, Invocation::Failed(AutomationError::AttachTimeout { .. })),
        "{result:?}"
    );
    assert_eq!(host.menu_item_clicks(), 1);
    assert_eq!(host.save_clicks(), 0);
    assert_eq!(veil_count(&host), 0);
    assert_eq!(controller.state(), ControlState::Error("Meet timed out".into()));
}

#[tokio::test(start_paused = true)]
async fn test_retry_after_error_can_succeed() {
    let (host, _watcher, controller) = injected(HostScenario::DirectProvider);
    let save = host.save_button().unwrap();
    save.set_style("display", "none").unwrap();
    assert!(matches!(controller.invoke().await, Invocation::Failed(_)));

    // The link from the first attempt is already there.
    save.set_style("display", "inline-block").unwrap();
    let result = controller.invoke().await;
    assert_eq!(result, Invocation::Completed(AttachOutcome::AlreadyActive));
    assert_eq!(host.attach_clicks(), 1);
    assert_eq!(host.save_clicks(), 1);
}
