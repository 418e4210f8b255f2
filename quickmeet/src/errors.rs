use std::time::Duration;

use thiserror::Error;

use crate::locator::Role;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AutomationError {
    #[error("Dialog not found: {0}")]
    DialogNotFound(String),

    #[error("Element not found: {role}")]
    ElementNotFound { role: Role },

    #[error("Could not classify dialog: {0}")]
    ClassificationFailed(String),

    #[error("Timed out after {waited:?} waiting for {expected} (control state: {control_state})")]
    AttachTimeout {
        expected: String,
        waited: Duration,
        control_state: String,
    },

    #[error("Dialog is detached from the document: {0}")]
    StaleDialog(String),

    #[error("Invalid selector: {0}")]
    InvalidSelector(String),

    #[error("Element is detached from DOM: {0}")]
    ElementDetached(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Control surface bridge error: {0}")]
    Bridge(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AutomationError {
    pub fn not_found(role: Role) -> Self {
        AutomationError::ElementNotFound { role }
    }

    /// Brief text shown on the action control while it is in the error state.
    pub fn short_label(&self) -> String {
        match self {
            AutomationError::DialogNotFound(_) => "No dialog".to_string(),
            AutomationError::ElementNotFound { role } => format!("{} missing", role.short_name()),
            AutomationError::ClassificationFailed(_) => "No Meet control".to_string(),
            AutomationError::AttachTimeout { .. } => "Meet timed out".to_string(),
            AutomationError::StaleDialog(_) => "Dialog closed".to_string(),
            _ => "Failed".to_string(),
        }
    }
}
