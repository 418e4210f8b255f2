use crate::element::Element;
use crate::errors::AutomationError;

/// Reference to a dialog region the host owns.
///
/// The node behind it may be detached at any moment; nothing should act on it
/// without going through [`DialogHandle::validate`] first. A detached dialog is
/// never swapped for whatever dialog the host shows next, so one dialog's
/// invocation cannot commit another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialogHandle {
    element: Element,
}

impl DialogHandle {
    pub fn new(element: Element) -> Self {
        Self { element }
    }

    pub fn element(&self) -> &Element {
        &self.element
    }

    pub fn is_connected(&self) -> bool {
        self.element.is_connected()
    }

    /// The dialog node, if it is still attached to the document.
    pub fn validate(&self) -> Result<&Element, AutomationError> {
        if self.element.is_connected() {
            Ok(&self.element)
        } else {
            Err(AutomationError::StaleDialog(format!(
                "{} is no longer attached",
                self.element.describe()
            )))
        }
    }
}
