//! In-memory document engine
//!
//! A complete node arena with inline styles, click listeners and mutation
//! fan-out. It backs the simulated calendar host and every unit test; a live
//! browser backend implements the same [`DocumentEngine`] trait. Detached
//! subtrees are pruned once no handle refers to them.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tokio::sync::mpsc;
use tracing::{debug, trace};

use super::{DocumentEngine, MutationKind, MutationOptions, MutationRecord, MutationSender, Subscription};
use crate::element::{ClickListener, Element, ElementImpl};
use crate::errors::AutomationError;

// Node ids are unique across documents so `Element` equality never aliases.
static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);

struct NodeData {
    tag: String,
    attributes: BTreeMap<String, String>,
    style: BTreeMap<String, String>,
    text: String,
    parent: Option<u64>,
    children: Vec<u64>,
    listeners: Vec<ClickListener>,
    /// One clone per live handle; the arena's own copy makes the floor one
    handles: Arc<()>,
}

impl NodeData {
    fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_lowercase(),
            attributes: BTreeMap::new(),
            style: BTreeMap::new(),
            text: String::new(),
            parent: None,
            children: Vec::new(),
            listeners: Vec::new(),
            handles: Arc::new(()),
        }
    }
}

struct Observer {
    id: u64,
    target: u64,
    options: MutationOptions,
    sender: MutationSender,
}

struct DocumentState {
    nodes: HashMap<u64, NodeData>,
    root: u64,
    observers: Vec<Observer>,
    next_observer: u64,
}

type Shared = Arc<Mutex<DocumentState>>;

fn lock(state: &Mutex<DocumentState>) -> MutexGuard<'_, DocumentState> {
    // A panicking click listener must not take the whole document down with it.
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn element(shared: &Shared, state: &DocumentState, id: u64) -> Element {
    let handle = state
        .nodes
        .get(&id)
        .map(|n| n.handles.clone())
        .unwrap_or_default();
    Element::new(Arc::new(MemoryElement {
        state: shared.clone(),
        id,
        _handle: handle,
    }))
}

impl DocumentState {
    fn node(&self, id: u64) -> Result<&NodeData, AutomationError> {
        self.nodes
            .get(&id)
            .ok_or_else(|| AutomationError::Internal(format!("unknown node {id}")))
    }

    fn node_mut(&mut self, id: u64) -> Result<&mut NodeData, AutomationError> {
        self.nodes
            .get_mut(&id)
            .ok_or_else(|| AutomationError::Internal(format!("unknown node {id}")))
    }

    fn ancestors_or_self(&self, id: u64) -> Vec<u64> {
        let mut out = vec![id];
        let mut current = self.nodes.get(&id).and_then(|n| n.parent);
        while let Some(parent) = current {
            out.push(parent);
            current = self.nodes.get(&parent).and_then(|n| n.parent);
        }
        out
    }

    fn is_connected(&self, id: u64) -> bool {
        self.ancestors_or_self(id).last() == Some(&self.root)
    }

    fn detach(&mut self, shared: &Shared, id: u64) -> Result<(), AutomationError> {
        let Some(parent) = self.node(id)?.parent else {
            return Ok(());
        };
        self.node_mut(parent)?.children.retain(|c| *c != id);
        self.node_mut(id)?.parent = None;
        let removed = element(shared, self, id);
        self.notify(
            shared,
            parent,
            MutationKind::ChildList {
                added: Vec::new(),
                removed: vec![removed],
            },
        );
        Ok(())
    }

    fn subtree(&self, id: u64) -> Vec<u64> {
        let mut out = Vec::new();
        let mut pending = vec![id];
        while let Some(next) = pending.pop() {
            out.push(next);
            if let Some(node) = self.nodes.get(&next) {
                pending.extend(node.children.iter().copied());
            }
        }
        out
    }

    /// Removes detached subtrees no handle can reach any more. The removed
    /// nodes are returned so their listeners drop after the lock is released.
    fn sweep(&mut self) -> Vec<NodeData> {
        let detached: Vec<u64> = self
            .nodes
            .iter()
            .filter(|(id, node)| node.parent.is_none() && **id != self.root)
            .map(|(id, _)| *id)
            .collect();

        let mut pruned = Vec::new();
        for top in detached {
            let subtree = self.subtree(top);
            let unreachable = subtree.iter().all(|id| {
                self.nodes
                    .get(id)
                    .is_some_and(|n| Arc::strong_count(&n.handles) == 1)
            });
            if unreachable {
                pruned.extend(subtree.iter().filter_map(|id| self.nodes.remove(id)));
            }
        }
        if !pruned.is_empty() {
            trace!(pruned = pruned.len(), remaining = self.nodes.len(), "pruned detached nodes");
        }
        pruned
    }

    fn notify(&mut self, shared: &Shared, target: u64, kind: MutationKind) {
        self.observers.retain(|o| !o.sender.is_closed());
        if self.observers.is_empty() {
            return;
        }
        let chain = self.ancestors_or_self(target);
        let record = MutationRecord {
            target: element(shared, self, target),
            kind,
        };
        for observer in &self.observers {
            let wanted = match record.kind {
                MutationKind::Attribute { .. } => observer.options.attributes,
                MutationKind::ChildList { .. } | MutationKind::Text => observer.options.child_list,
            };
            if !wanted {
                continue;
            }
            let in_scope = observer.target == target
                || (observer.options.subtree && chain.contains(&observer.target));
            if in_scope {
                trace!(observer = observer.id, target, "queue mutation");
                let _ = observer.sender.send(record.clone());
            }
        }
    }
}

/// In-memory host document
#[derive(Clone)]
pub struct MemoryDocument {
    state: Shared,
}

impl Default for MemoryDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MemoryDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = lock(&self.state);
        f.debug_struct("MemoryDocument")
            .field("nodes", &state.nodes.len())
            .field("observers", &state.observers.len())
            .finish()
    }
}

impl MemoryDocument {
    pub fn new() -> Self {
        let root = NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed);
        let mut nodes = HashMap::new();
        nodes.insert(root, NodeData::new("body"));
        Self {
            state: Arc::new(Mutex::new(DocumentState {
                nodes,
                root,
                observers: Vec::new(),
                next_observer: 1,
            })),
        }
    }

    /// Creates a detached node with attributes and own text in one call.
    pub fn build(
        &self,
        tag: &str,
        attributes: &[(&str, &str)],
        text: &str,
    ) -> Result<Element, AutomationError> {
        let id = NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed);
        let mut node = NodeData::new(tag);
        for (name, value) in attributes {
            node.attributes.insert(name.to_lowercase(), value.to_string());
        }
        node.text = text.to_string();
        let (created, pruned) = {
            let mut state = lock(&self.state);
            let pruned = state.sweep();
            state.nodes.insert(id, node);
            (element(&self.state, &state, id), pruned)
        };
        drop(pruned);
        Ok(created)
    }

    /// Nodes held by the arena, attached or not
    pub fn node_count(&self) -> usize {
        lock(&self.state).nodes.len()
    }

    /// Live subscriptions; closed ones are pruned first.
    pub fn observer_count(&self) -> usize {
        let mut state = lock(&self.state);
        state.observers.retain(|o| !o.sender.is_closed());
        state.observers.len()
    }
}

impl DocumentEngine for MemoryDocument {
    fn root(&self) -> Element {
        let state = lock(&self.state);
        element(&self.state, &state, state.root)
    }

    fn create_element(&self, tag: &str) -> Result<Element, AutomationError> {
        if tag.trim().is_empty() {
            return Err(AutomationError::InvalidArgument("empty tag name".into()));
        }
        self.build(tag, &[], "")
    }

    fn observe(
        &self,
        target: &Element,
        options: MutationOptions,
    ) -> Result<Subscription, AutomationError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = {
            let mut state = lock(&self.state);
            if !state.nodes.contains_key(&target.object_id()) {
                return Err(AutomationError::InvalidArgument(format!(
                    "{} does not belong to this document",
                    target.describe()
                )));
            }
            let id = state.next_observer;
            state.next_observer += 1;
            state.observers.push(Observer {
                id,
                target: target.object_id(),
                options,
                sender: tx,
            });
            id
        };
        debug!(observer = id, target = target.object_id(), ?options, "observer registered");

        let weak: Weak<Mutex<DocumentState>> = Arc::downgrade(&self.state);
        Ok(Subscription::new(rx, move || {
            if let Some(state) = weak.upgrade() {
                lock(&state).observers.retain(|o| o.id != id);
                debug!(observer = id, "observer removed");
            }
        }))
    }
}

struct MemoryElement {
    state: Shared,
    id: u64,
    _handle: Arc<()>,
}

impl fmt::Debug for MemoryElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryElement").field("id", &self.id).finish()
    }
}

impl MemoryElement {
    fn with_node<T>(&self, f: impl FnOnce(&NodeData) -> T) -> Option<T> {
        lock(&self.state).nodes.get(&self.id).map(f)
    }
}

impl ElementImpl for MemoryElement {
    fn object_id(&self) -> u64 {
        self.id
    }

    fn tag(&self) -> String {
        self.with_node(|n| n.tag.clone()).unwrap_or_default()
    }

    fn attribute(&self, name: &str) -> Option<String> {
        self.with_node(|n| n.attributes.get(&name.to_lowercase()).cloned())
            .flatten()
    }

    fn set_attribute(&self, name: &str, value: &str) -> Result<(), AutomationError> {
        let name = name.to_lowercase();
        let mut state = lock(&self.state);
        let node = state.node_mut(self.id)?;
        if node.attributes.get(&name).map(String::as_str) == Some(value) {
            return Ok(());
        }
        node.attributes.insert(name.clone(), value.to_string());
        state.notify(&self.state, self.id, MutationKind::Attribute { name });
        Ok(())
    }

    fn remove_attribute(&self, name: &str) -> Result<(), AutomationError> {
        let name = name.to_lowercase();
        let mut state = lock(&self.state);
        if state.node_mut(self.id)?.attributes.remove(&name).is_some() {
            state.notify(&self.state, self.id, MutationKind::Attribute { name });
        }
        Ok(())
    }

    fn style(&self, property: &str) -> Option<String> {
        self.with_node(|n| n.style.get(property).cloned()).flatten()
    }

    fn set_style(&self, property: &str, value: &str) -> Result<(), AutomationError> {
        let mut state = lock(&self.state);
        let node = state.node_mut(self.id)?;
        if node.style.get(property).map(String::as_str) == Some(value) {
            return Ok(());
        }
        node.style.insert(property.to_string(), value.to_string());
        state.notify(
            &self.state,
            self.id,
            MutationKind::Attribute {
                name: "style".to_string(),
            },
        );
        Ok(())
    }

    fn own_text(&self) -> String {
        self.with_node(|n| n.text.clone()).unwrap_or_default()
    }

    fn set_text(&self, text: &str) -> Result<(), AutomationError> {
        let mut state = lock(&self.state);
        let node = state.node_mut(self.id)?;
        if node.text == text {
            return Ok(());
        }
        node.text = text.to_string();
        state.notify(&self.state, self.id, MutationKind::Text);
        Ok(())
    }

    fn parent(&self) -> Option<Element> {
        let state = lock(&self.state);
        let parent = state.nodes.get(&self.id).and_then(|n| n.parent)?;
        Some(element(&self.state, &state, parent))
    }

    fn children(&self) -> Vec<Element> {
        let state = lock(&self.state);
        let Some(node) = state.nodes.get(&self.id) else {
            return Vec::new();
        };
        node.children
            .iter()
            .map(|c| element(&self.state, &state, *c))
            .collect()
    }

    fn is_connected(&self) -> bool {
        lock(&self.state).is_connected(self.id)
    }

    fn has_render_box(&self) -> bool {
        let state = lock(&self.state);
        if !state.is_connected(self.id) {
            return false;
        }
        state.ancestors_or_self(self.id).iter().all(|id| {
            state.nodes.get(id).is_some_and(|n| {
                !n.attributes.contains_key("hidden")
                    && n.style.get("display").map(String::as_str) != Some("none")
            })
        })
    }

    fn append_child(&self, child: &Element) -> Result<(), AutomationError> {
        self.insert_before(child, None)
    }

    fn insert_before(
        &self,
        child: &Element,
        reference: Option<&Element>,
    ) -> Result<(), AutomationError> {
        let child_id = child.object_id();
        let mut state = lock(&self.state);
        if !state.nodes.contains_key(&child_id) {
            return Err(AutomationError::InvalidArgument(format!(
                "node {child_id} does not belong to this document"
            )));
        }
        if state.ancestors_or_self(self.id).contains(&child_id) {
            return Err(AutomationError::InvalidArgument(
                "cannot insert a node into its own subtree".into(),
            ));
        }
        state.detach(&self.state, child_id)?;

        let parent = state.node_mut(self.id)?;
        let index = match reference {
            Some(reference) => parent
                .children
                .iter()
                .position(|c| *c == reference.object_id())
                .ok_or_else(|| {
                    AutomationError::InvalidArgument("reference node is not a child".into())
                })?,
            None => parent.children.len(),
        };
        parent.children.insert(index, child_id);
        state.node_mut(child_id)?.parent = Some(self.id);
        let added = element(&self.state, &state, child_id);
        state.notify(
            &self.state,
            self.id,
            MutationKind::ChildList {
                added: vec![added],
                removed: Vec::new(),
            },
        );
        Ok(())
    }

    fn remove(&self) -> Result<(), AutomationError> {
        lock(&self.state).detach(&self.state, self.id)
    }

    fn click(&self) -> Result<(), AutomationError> {
        let listeners = {
            let state = lock(&self.state);
            let node = state.node(self.id)?;
            if node.attributes.contains_key("disabled")
                || node.attributes.get("aria-disabled").map(String::as_str) == Some("true")
            {
                debug!(node = self.id, "click ignored on disabled node");
                return Ok(());
            }
            node.listeners.clone()
        };
        // Listeners may edit the tree, so they run without the lock held.
        for listener in listeners {
            listener();
        }
        Ok(())
    }

    fn add_click_listener(&self, listener: ClickListener) -> Result<(), AutomationError> {
        lock(&self.state).node_mut(self.id)?.listeners.push(listener);
        Ok(())
    }
}
