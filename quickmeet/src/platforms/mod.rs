use tokio::sync::mpsc;
use tracing::trace;

use crate::{AutomationError, Element};

pub mod memory;

/// Which changes a subscription is interested in
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MutationOptions {
    /// Attribute and inline style changes
    pub attributes: bool,
    /// Children added or removed, and text changes
    pub child_list: bool,
    /// Also report changes anywhere below the target
    pub subtree: bool,
}

impl MutationOptions {
    /// Every change anywhere under the target
    pub fn everything() -> Self {
        Self {
            attributes: true,
            child_list: true,
            subtree: true,
        }
    }

    /// Structural changes anywhere under the target
    pub fn child_list_subtree() -> Self {
        Self {
            attributes: false,
            child_list: true,
            subtree: true,
        }
    }
}

#[derive(Debug, Clone)]
pub enum MutationKind {
    Attribute { name: String },
    ChildList {
        added: Vec<Element>,
        removed: Vec<Element>,
    },
    Text,
}

/// One observed change in the host document
#[derive(Debug, Clone)]
pub struct MutationRecord {
    /// Node whose attributes, children or text changed
    pub target: Element,
    pub kind: MutationKind,
}

impl MutationRecord {
    pub fn added_nodes(&self) -> &[Element] {
        match &self.kind {
            MutationKind::ChildList { added, .. } => added,
            _ => &[],
        }
    }
}

/// Sending half of a subscription, held by the document (or a test)
pub type MutationSender = mpsc::UnboundedSender<MutationRecord>;

/// An explicit handle over a stream of mutation batches.
///
/// Dropping the subscription, or calling [`Subscription::cancel`], unregisters
/// it from the document.
pub struct Subscription {
    receiver: mpsc::UnboundedReceiver<MutationRecord>,
    on_cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(
        receiver: mpsc::UnboundedReceiver<MutationRecord>,
        on_cancel: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            receiver,
            on_cancel: Some(Box::new(on_cancel)),
        }
    }

    /// Detached subscription fed by hand, for driving observers with synthetic batches.
    pub fn channel() -> (MutationSender, Subscription) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            tx,
            Subscription {
                receiver: rx,
                on_cancel: None,
            },
        )
    }

    /// Waits for the next batch: every record queued since the previous call.
    ///
    /// Returns `None` once the sending side is gone.
    pub async fn next_batch(&mut self) -> Option<Vec<MutationRecord>> {
        let first = self.receiver.recv().await?;
        let mut batch = vec![first];
        while let Ok(record) = self.receiver.try_recv() {
            batch.push(record);
        }
        trace!(records = batch.len(), "mutation batch");
        Some(batch)
    }

    pub fn cancel(mut self) {
        self.run_cancel();
    }

    fn run_cancel(&mut self) {
        if let Some(on_cancel) = self.on_cancel.take() {
            on_cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.run_cancel();
    }
}

/// The common trait every host document backend implements
pub trait DocumentEngine: Send + Sync {
    /// Get the document root
    fn root(&self) -> Element;

    /// Create a detached node owned by this document
    fn create_element(&self, tag: &str) -> Result<Element, AutomationError>;

    /// Subscribe to changes on `target` (and below it when `options.subtree`)
    fn observe(
        &self,
        target: &Element,
        options: MutationOptions,
    ) -> Result<Subscription, AutomationError>;
}
