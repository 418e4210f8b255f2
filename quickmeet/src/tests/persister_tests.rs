use std::time::Duration;

use crate::persister::{OverridePersister, OverrideSpec, StyleSet};
use crate::platforms::memory::MemoryDocument;
use crate::platforms::{DocumentEngine, MutationKind, MutationRecord, Subscription};
use crate::Element;

fn demoted() -> StyleSet {
    StyleSet::from([
        ("background-color".to_string(), "transparent".to_string()),
        ("color".to_string(), "rgb(26, 115, 232)".to_string()),
    ])
}

fn primary_button(doc: &MemoryDocument) -> (Element, Element) {
    let button = doc.build("button", &[], "").unwrap();
    button.set_style("background-color", "rgb(26, 115, 232)").unwrap();
    button.set_style("color", "white").unwrap();
    let caption = doc.build("span", &[], "Save").unwrap();
    caption.set_style("color", "white").unwrap();
    button.append_child(&caption).unwrap();
    doc.root().append_child(&button).unwrap();
    (button, caption)
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

#[test]
fn test_apply_writes_only_differences() {
    let doc = MemoryDocument::new();
    let (button, caption) = primary_button(&doc);
    let spec = OverrideSpec::new(button.clone(), demoted());

    assert!(spec.is_reverted());
    // Two properties on the target plus the caption color.
    assert_eq!(spec.apply().unwrap(), 3);
    assert_eq!(spec.apply().unwrap(), 0);
    assert!(!spec.is_reverted());
    assert_eq!(caption.style("color").as_deref(), Some("rgb(26, 115, 232)"));
}

#[test]
fn test_reference_presentation_wins_over_fallback() {
    let doc = MemoryDocument::new();
    let (button, _) = primary_button(&doc);
    let sibling = doc.build("button", &[], "More options").unwrap();
    sibling.set_style("background-color", "rgb(255, 255, 255)").unwrap();
    doc.root().append_child(&sibling).unwrap();

    let spec = OverrideSpec::from_reference(button, Some(&sibling), &demoted());
    assert_eq!(spec.desired["background-color"], "rgb(255, 255, 255)");
    assert_eq!(spec.desired["color"], "rgb(26, 115, 232)");
    assert_eq!(spec.descendant_color.as_deref(), Some("rgb(26, 115, 232)"));
}

#[tokio::test(start_paused = true)]
async fn test_host_reverts_are_undone() {
    let doc = MemoryDocument::new();
    let (button, caption) = primary_button(&doc);
    let handle = OverridePersister::start(&doc, OverrideSpec::new(button.clone(), demoted())).unwrap();
    assert_eq!(button.style("background-color").as_deref(), Some("transparent"));

    for round in 1..=3 {
        button.set_style("background-color", "rgb(26, 115, 232)").unwrap();
        caption.set_style("color", "white").unwrap();
        settle().await;
        assert_eq!(button.style("background-color").as_deref(), Some("transparent"));
        assert_eq!(caption.style("color").as_deref(), Some("rgb(26, 115, 232)"));
        assert_eq!(handle.reapply_count(), round);
    }

    // Our own writes arrive as a batch that already matches: no loop.
    settle().await;
    settle().await;
    assert_eq!(handle.reapply_count(), 3);
    assert!(handle.is_active());
}

#[tokio::test(start_paused = true)]
async fn test_unrelated_mutations_do_not_reapply() {
    let doc = MemoryDocument::new();
    let (button, _) = primary_button(&doc);
    let handle = OverridePersister::start(&doc, OverrideSpec::new(button.clone(), demoted())).unwrap();

    button.set_attribute("aria-pressed", "true").unwrap();
    button.set_style("padding", "0 24px").unwrap();
    settle().await;
    assert_eq!(handle.reapply_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_synthetic_subscription_drives_reapply() {
    let doc = MemoryDocument::new();
    let (button, _) = primary_button(&doc);
    let spec = OverrideSpec::new(button.clone(), demoted());
    spec.apply().unwrap();

    let (tx, subscription) = Subscription::channel();
    let handle = OverridePersister::spawn(spec, subscription);

    // Revert without notifying anybody, then deliver the record by hand.
    button.set_style("color", "white").unwrap();
    settle().await;
    assert_eq!(handle.reapply_count(), 0);

    tx.send(MutationRecord {
        target: button.clone(),
        kind: MutationKind::Attribute {
            name: "style".into(),
        },
    })
    .unwrap();
    settle().await;
    assert_eq!(handle.reapply_count(), 1);
    assert_eq!(button.style("color").as_deref(), Some("rgb(26, 115, 232)"));

    drop(tx);
    settle().await;
    assert!(!handle.is_active());
}

#[tokio::test(start_paused = true)]
async fn test_stops_when_target_is_detached() {
    let doc = MemoryDocument::new();
    let (button, _) = primary_button(&doc);
    let handle = OverridePersister::start(&doc, OverrideSpec::new(button.clone(), demoted())).unwrap();
    assert_eq!(doc.observer_count(), 1);

    button.remove().unwrap();
    button.set_style("color", "white").unwrap();
    settle().await;

    assert!(!handle.is_active());
    assert_eq!(handle.reapply_count(), 0);
    assert_eq!(doc.observer_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_dropping_the_handle_unsubscribes() {
    let doc = MemoryDocument::new();
    let (button, _) = primary_button(&doc);
    let handle = OverridePersister::start(&doc, OverrideSpec::new(button, demoted())).unwrap();
    assert_eq!(doc.observer_count(), 1);

    drop(handle);
    settle().await;
    assert_eq!(doc.observer_count(), 0);
}
