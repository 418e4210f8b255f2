//! Keeps a presentation override alive on a node the host keeps re-rendering

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};

use crate::element::Element;
use crate::errors::AutomationError;
use crate::platforms::{DocumentEngine, MutationOptions, Subscription};

pub type StyleSet = BTreeMap<String, String>;

/// Properties copied from a sibling control to make the commit control look secondary
pub const DEMOTION_PROPERTIES: &[&str] = &["background-color", "color", "border", "box-shadow"];

/// Target node, desired presentation, and the check for "host reverted it"
#[derive(Debug, Clone)]
pub struct OverrideSpec {
    pub target: Element,
    pub desired: StyleSet,
    /// Text color also forced onto every descendant
    pub descendant_color: Option<String>,
}

impl OverrideSpec {
    pub fn new(target: Element, desired: StyleSet) -> Self {
        let descendant_color = desired.get("color").cloned();
        Self {
            target,
            desired,
            descendant_color,
        }
    }

    /// Desired presentation copied from `reference`'s computed style; any
    /// property the reference lacks comes from `fallback`.
    pub fn from_reference(target: Element, reference: Option<&Element>, fallback: &StyleSet) -> Self {
        let mut desired = fallback.clone();
        if let Some(reference) = reference {
            for property in DEMOTION_PROPERTIES {
                if let Some(value) = reference.computed_style(property) {
                    desired.insert(property.to_string(), value);
                }
            }
        }
        Self::new(target, desired)
    }

    fn mismatches(&self) -> Vec<(Element, &str, &str)> {
        let mut out = Vec::new();
        for (property, value) in &self.desired {
            if self.target.style(property).as_deref() != Some(value.as_str()) {
                out.push((self.target.clone(), property.as_str(), value.as_str()));
            }
        }
        if let Some(color) = &self.descendant_color {
            for node in self.target.descendants() {
                if node.style("color").as_deref() != Some(color.as_str()) {
                    out.push((node, "color", color.as_str()));
                }
            }
        }
        out
    }

    pub fn is_reverted(&self) -> bool {
        !self.mismatches().is_empty()
    }

    /// Writes only the properties that differ, so applying an already-applied
    /// override produces no mutation. Returns the number of writes.
    pub fn apply(&self) -> Result<usize, AutomationError> {
        let pending = self.mismatches();
        for (node, property, value) in &pending {
            node.set_style(property, value)?;
        }
        Ok(pending.len())
    }
}

pub struct OverridePersister;

impl OverridePersister {
    /// Applies the override and keeps re-applying it after every mutation batch
    /// that leaves it reverted.
    #[instrument(skip(document, spec), fields(target = spec.target.object_id()))]
    pub fn start(
        document: &dyn DocumentEngine,
        spec: OverrideSpec,
    ) -> Result<OverrideHandle, AutomationError> {
        spec.apply()?;
        let subscription = document.observe(&spec.target, MutationOptions::everything())?;
        Ok(Self::spawn(spec, subscription))
    }

    /// Drives an already-applied override from any subscription, including a
    /// synthetic one.
    pub fn spawn(spec: OverrideSpec, mut subscription: Subscription) -> OverrideHandle {
        let reapplied = Arc::new(AtomicUsize::new(0));
        let counter = reapplied.clone();
        let target_id = spec.target.object_id();

        let task = tokio::spawn(async move {
            while let Some(batch) = subscription.next_batch().await {
                if !spec.target.is_connected() {
                    debug!(target = target_id, "override target detached; stopping");
                    break;
                }
                // At most one re-apply per batch: the write it causes comes back
                // as a batch that already matches, so a fight with the host
                // settles instead of looping.
                if !spec.is_reverted() {
                    continue;
                }
                match spec.apply() {
                    Ok(writes) => {
                        counter.fetch_add(1, Ordering::SeqCst);
                        debug!(
                            target = target_id,
                            writes,
                            records = batch.len(),
                            "override re-applied after host revert"
                        );
                    }
                    Err(e) => {
                        warn!(target = target_id, error = %e, "failed to re-apply override; stopping");
                        break;
                    }
                }
            }
            subscription.cancel();
        });

        OverrideHandle {
            task,
            reapplied,
            target_id,
        }
    }
}

/// Owns the persister task; dropping it stops the override and its subscription.
#[derive(Debug)]
pub struct OverrideHandle {
    task: JoinHandle<()>,
    reapplied: Arc<AtomicUsize>,
    target_id: u64,
}

impl OverrideHandle {
    pub fn target_id(&self) -> u64 {
        self.target_id
    }

    /// How many times a host revert was undone
    pub fn reapply_count(&self) -> usize {
        self.reapplied.load(Ordering::SeqCst)
    }

    pub fn is_active(&self) -> bool {
        !self.task.is_finished()
    }

    pub fn cancel(self) {
        self.task.abort();
    }
}

impl Drop for OverrideHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
