use std::collections::HashSet;
use std::fmt;
use std::fmt::Debug;
use std::sync::Arc;

use crate::errors::AutomationError;
use crate::selector::Selector;

/// Callback run synchronously when a node is clicked.
pub type ClickListener = Arc<dyn Fn() + Send + Sync>;

/// Properties inherited from the parent when a node does not set them itself
pub const INHERITED_PROPERTIES: &[&str] = &[
    "color",
    "font-family",
    "font-size",
    "font-weight",
    "letter-spacing",
    "text-transform",
    "visibility",
];

/// Represents a node in the externally-owned document.
///
/// The handle carries no ownership: the host may detach the node at any time,
/// so callers re-check [`Element::is_connected`] before acting on a handle they
/// captured earlier.
#[derive(Clone)]
pub struct Element {
    inner: Arc<dyn ElementImpl>,
}

/// Interface for backend-specific node implementations
pub trait ElementImpl: Send + Sync + Debug {
    fn object_id(&self) -> u64;
    fn tag(&self) -> String;
    fn attribute(&self, name: &str) -> Option<String>;
    fn set_attribute(&self, name: &str, value: &str) -> Result<(), AutomationError>;
    fn remove_attribute(&self, name: &str) -> Result<(), AutomationError>;
    /// Inline style value for one property
    fn style(&self, property: &str) -> Option<String>;
    fn set_style(&self, property: &str, value: &str) -> Result<(), AutomationError>;
    /// Own text, excluding descendants
    fn own_text(&self) -> String;
    fn set_text(&self, text: &str) -> Result<(), AutomationError>;
    fn parent(&self) -> Option<Element>;
    fn children(&self) -> Vec<Element>;
    fn is_connected(&self) -> bool;
    /// Whether the node produces a layout box (not hidden, no `display: none` up the tree)
    fn has_render_box(&self) -> bool;
    fn append_child(&self, child: &Element) -> Result<(), AutomationError>;
    fn insert_before(&self, child: &Element, reference: Option<&Element>)
        -> Result<(), AutomationError>;
    fn remove(&self) -> Result<(), AutomationError>;
    fn click(&self) -> Result<(), AutomationError>;
    fn add_click_listener(&self, listener: ClickListener) -> Result<(), AutomationError>;
}

impl Element {
    pub fn new(inner: Arc<dyn ElementImpl>) -> Self {
        Self { inner }
    }

    pub fn object_id(&self) -> u64 {
        self.inner.object_id()
    }

    pub fn tag(&self) -> String {
        self.inner.tag()
    }

    pub fn attribute(&self, name: &str) -> Option<String> {
        self.inner.attribute(name)
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.inner.attribute(name).is_some()
    }

    pub fn set_attribute(&self, name: &str, value: &str) -> Result<(), AutomationError> {
        self.inner.set_attribute(name, value)
    }

    pub fn remove_attribute(&self, name: &str) -> Result<(), AutomationError> {
        self.inner.remove_attribute(name)
    }

    pub fn style(&self, property: &str) -> Option<String> {
        self.inner.style(property)
    }

    pub fn set_style(&self, property: &str, value: &str) -> Result<(), AutomationError> {
        self.inner.set_style(property, value)
    }

    /// Resolved style: the inline value, else the nearest ancestor's value for
    /// inherited properties.
    pub fn computed_style(&self, property: &str) -> Option<String> {
        if let Some(value) = self.inner.style(property) {
            return Some(value);
        }
        if !INHERITED_PROPERTIES.contains(&property) {
            return None;
        }
        let mut current = self.inner.parent();
        while let Some(node) = current {
            if let Some(value) = node.style(property) {
                return Some(value);
            }
            current = node.parent();
        }
        None
    }

    pub fn own_text(&self) -> String {
        self.inner.own_text()
    }

    /// Text content of the node and all of its descendants
    pub fn text(&self) -> String {
        let mut out = self.inner.own_text();
        for child in self.inner.children() {
            let child_text = child.text();
            if child_text.is_empty() {
                continue;
            }
            if !out.is_empty() {
                out.push(' ');
            }
            out.push_str(&child_text);
        }
        out
    }

    pub fn set_text(&self, text: &str) -> Result<(), AutomationError> {
        self.inner.set_text(text)
    }

    /// Accessible label: `aria-label` when present, otherwise trimmed text content.
    pub fn label(&self) -> String {
        match self.attribute("aria-label") {
            Some(label) if !label.trim().is_empty() => label.trim().to_string(),
            _ => self.text().trim().to_string(),
        }
    }

    /// Explicit `role` attribute, falling back to the implicit role of the tag.
    pub fn role(&self) -> Option<String> {
        if let Some(role) = self.attribute("role") {
            return Some(role.to_lowercase());
        }
        match self.tag().to_lowercase().as_str() {
            "button" => Some("button".to_string()),
            "a" if self.has_attribute("href") => Some("link".to_string()),
            "dialog" => Some("dialog".to_string()),
            _ => None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }

    pub fn has_render_box(&self) -> bool {
        self.inner.has_render_box()
    }

    /// Visible means: connected, has a render box, and computed display and
    /// visibility do not hide it.
    pub fn is_visible(&self) -> bool {
        if !self.is_connected() || !self.has_render_box() {
            return false;
        }
        if self.computed_style("display").as_deref() == Some("none") {
            return false;
        }
        !matches!(
            self.computed_style("visibility").as_deref(),
            Some("hidden") | Some("collapse")
        )
    }

    pub fn is_disabled(&self) -> bool {
        self.has_attribute("disabled") || self.attribute("aria-disabled").as_deref() == Some("true")
    }

    pub fn parent(&self) -> Option<Element> {
        self.inner.parent()
    }

    pub fn children(&self) -> Vec<Element> {
        self.inner.children()
    }

    /// Whether `other` is this node or one of its descendants
    pub fn contains(&self, other: &Element) -> bool {
        let mut current = Some(other.clone());
        while let Some(node) = current {
            if node == *self {
                return true;
            }
            current = node.parent();
        }
        false
    }

    /// All descendants in document order, excluding the node itself
    pub fn descendants(&self) -> Vec<Element> {
        let mut out = Vec::new();
        let mut stack: Vec<Element> = self.children().into_iter().rev().collect();
        while let Some(node) = stack.pop() {
            stack.extend(node.children().into_iter().rev());
            out.push(node);
        }
        out
    }

    /// Finds every descendant matching `selector`, in document order.
    pub fn query_all(&self, selector: &Selector) -> Result<Vec<Element>, AutomationError> {
        match selector {
            Selector::Chain(parts) => {
                let mut scopes = vec![self.clone()];
                for part in parts {
                    let mut seen = HashSet::new();
                    let mut next = Vec::new();
                    for scope in &scopes {
                        for found in scope.query_all(part)? {
                            if seen.insert(found.object_id()) {
                                next.push(found);
                            }
                        }
                    }
                    scopes = next;
                    if scopes.is_empty() {
                        break;
                    }
                }
                Ok(scopes)
            }
            Selector::Invalid(reason) => Err(AutomationError::InvalidSelector(reason.clone())),
            _ => {
                let mut out = Vec::new();
                for node in self.descendants() {
                    if selector.matches(&node)? {
                        out.push(node);
                    }
                }
                Ok(out)
            }
        }
    }

    pub fn query(&self, selector: &Selector) -> Result<Option<Element>, AutomationError> {
        Ok(self.query_all(selector)?.into_iter().next())
    }

    pub fn append_child(&self, child: &Element) -> Result<(), AutomationError> {
        self.inner.append_child(child)
    }

    pub fn insert_before(
        &self,
        child: &Element,
        reference: Option<&Element>,
    ) -> Result<(), AutomationError> {
        self.inner.insert_before(child, reference)
    }

    pub fn remove(&self) -> Result<(), AutomationError> {
        self.inner.remove()
    }

    pub fn click(&self) -> Result<(), AutomationError> {
        self.inner.click()
    }

    pub fn add_click_listener(&self, listener: ClickListener) -> Result<(), AutomationError> {
        self.inner.add_click_listener(listener)
    }

    /// Short human-readable rendering used in diagnostics and timeout errors.
    pub fn describe(&self) -> String {
        let mut out = format!("<{}", self.tag());
        for name in ["role", "aria-label", "aria-expanded", "disabled"] {
            if let Some(value) = self.attribute(name) {
                out.push_str(&format!(" {name}=\"{value}\""));
            }
        }
        out.push('>');
        let text: String = self.text().chars().take(60).collect();
        if !text.is_empty() {
            out.push_str(&format!(" \"{text}\""));
        }
        if !self.is_connected() {
            out.push_str(" (detached)");
        } else if !self.is_visible() {
            out.push_str(" (hidden)");
        }
        out
    }
}

impl PartialEq for Element {
    fn eq(&self, other: &Self) -> bool {
        self.object_id() == other.object_id()
    }
}

impl Eq for Element {}

impl Debug for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Element")
            .field("object_id", &self.object_id())
            .field("tag", &self.tag())
            .field("role", &self.role())
            .finish()
    }
}
