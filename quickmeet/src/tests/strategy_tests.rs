use super::open_calendar;
use crate::platforms::DocumentEngine;
use crate::simulation::HostScenario;
use crate::strategy::{find_attachment, remove_veils, SubmenuVeil, VEIL_MARKER};
use crate::{AutomationError, DialogHandle, Selector, StrategyKind, StrategyRegistry};

#[test]
fn test_registry_orders_by_priority() {
    let registry = StrategyRegistry::new([
        StrategyKind::SubmenuAttach,
        StrategyKind::AlreadyAttached,
        StrategyKind::DirectAttach,
        StrategyKind::SubmenuAttach,
    ]);
    assert_eq!(
        registry.strategies(),
        &[
            StrategyKind::AlreadyAttached,
            StrategyKind::DirectAttach,
            StrategyKind::SubmenuAttach,
        ]
    );
}

#[test]
fn test_classification_per_scenario() {
    let expected = [
        (HostScenario::AlreadyAttached, StrategyKind::AlreadyAttached),
        (HostScenario::DirectProvider, StrategyKind::DirectAttach),
        (HostScenario::Submenu, StrategyKind::SubmenuAttach),
        (HostScenario::SilentDirect, StrategyKind::SubmenuAttach),
        (HostScenario::PlaceholderLink, StrategyKind::SubmenuAttach),
    ];
    let registry = StrategyRegistry::default();
    for (scenario, kind) in expected {
        let (host, engine) = open_calendar(scenario);
        let dialog = host.dialog().unwrap();
        assert_eq!(registry.classify(&engine, &dialog), Ok(kind), "{scenario:?}");
    }
}

#[test]
fn test_lower_priority_is_never_chosen_when_a_higher_one_matches() {
    // A real link and a provider-labelled control: both detectors hold.
    let (host, engine) = open_calendar(HostScenario::AlreadyAttached);
    let dialog = host.dialog().unwrap();
    assert!(StrategyKind::AlreadyAttached.detect(&engine, &dialog));
    assert!(StrategyKind::DirectAttach.detect(&engine, &dialog));

    let registry = StrategyRegistry::new([StrategyKind::DirectAttach, StrategyKind::AlreadyAttached]);
    assert_eq!(
        registry.classify(&engine, &dialog),
        Ok(StrategyKind::AlreadyAttached)
    );
}

#[test]
fn test_no_detector_matches() {
    let (host, engine) = open_calendar(HostScenario::NoAttachControl);
    let dialog = host.dialog().unwrap();
    let err = StrategyRegistry::default()
        .classify(&engine, &dialog)
        .unwrap_err();
    match err {
        AutomationError::ClassificationFailed(detail) => {
            assert!(detail.contains("already-attached"));
            assert!(detail.contains("submenu-attach"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_placeholder_link_is_not_an_attachment() {
    let (host, engine) = open_calendar(HostScenario::PlaceholderLink);
    let dialog = host.dialog().unwrap();
    assert!(find_attachment(&engine, &dialog).is_none());
    assert!(!StrategyKind::AlreadyAttached.detect(&engine, &dialog));
}

#[test]
fn test_veil_is_removed_on_drop() {
    let (host, engine) = open_calendar(HostScenario::Submenu);
    let root = host.memory().root();
    let veils = Selector::from(format!("attr:{VEIL_MARKER}"));

    let veil = SubmenuVeil::install(&engine).unwrap();
    assert_eq!(root.query_all(&veils).unwrap().len(), 1);
    drop(veil);
    assert!(root.query_all(&veils).unwrap().is_empty());
}

#[test]
fn test_remove_veils_cleans_leftovers() {
    let (_host, engine) = open_calendar(HostScenario::Submenu);
    let first = SubmenuVeil::install(&engine).unwrap();
    let second = SubmenuVeil::install(&engine).unwrap();
    assert_eq!(remove_veils(&engine), 2);
    assert_eq!(remove_veils(&engine), 0);
    // Dropping guards whose nodes are already gone is harmless.
    drop(first);
    drop(second);
}

#[tokio::test(start_paused = true)]
async fn test_direct_attach_waits_for_the_link() {
    let (host, engine) = open_calendar(HostScenario::DirectProvider);
    let dialog = DialogHandle::new(host.dialog().unwrap());

    let outcome = StrategyKind::DirectAttach.execute(&engine, &dialog).await;
    assert_eq!(outcome, Ok(crate::AttachOutcome::AttachedDirectly));
    assert_eq!(host.attach_clicks(), 1);
    assert!(find_attachment(&engine, dialog.element()).is_some());
}

#[tokio::test(start_paused = true)]
async fn test_direct_attach_reports_control_state_on_timeout() {
    // Here the generic control only opens a menu, so the direct flow never
    // sees an attachment.
    let (host, engine) = open_calendar(HostScenario::Submenu);
    let dialog = DialogHandle::new(host.dialog().unwrap());

    let err = StrategyKind::DirectAttach
        .execute(&engine, &dialog)
        .await
        .unwrap_err();
    match err {
        AutomationError::AttachTimeout {
            waited,
            control_state,
            ..
        } => {
            assert_eq!(waited, engine.config().retry_timeout());
            assert!(control_state.contains("aria-expanded=\"true\""), "{control_state}");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_submenu_attach_times_out_when_the_provider_never_attaches() {
    let (host, engine) = open_calendar(HostScenario::UnresponsiveMenu);
    let dialog = DialogHandle::new(host.dialog().unwrap());
    assert_eq!(
        StrategyRegistry::default().classify(&engine, dialog.element()),
        Ok(StrategyKind::SubmenuAttach)
    );

    let err = StrategyKind::SubmenuAttach
        .execute(&engine, &dialog)
        .await
        .unwrap_err();
    match err {
        AutomationError::AttachTimeout { waited, .. } => {
            assert_eq!(waited, engine.config().retry_timeout());
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(host.attach_clicks(), 1);
    assert_eq!(host.menu_item_clicks(), 1);
    assert!(find_attachment(&engine, dialog.element()).is_none());

    let veils = Selector::from(format!("attr:{VEIL_MARKER}"));
    assert!(host.memory().root().query_all(&veils).unwrap().is_empty());
}
