use thiserror::Error;

use crate::classifier::HierarchyLevel;

/// Which UI step of the creation workflow could not be completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreationStep {
    AddAffordance,
    TextInput,
    SaveControl,
}

impl std::fmt::Display for CreationStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let step = match self {
            CreationStep::AddAffordance => "add affordance",
            CreationStep::TextInput => "text input",
            CreationStep::SaveControl => "save control",
        };
        f.write_str(step)
    }
}

#[derive(Error, Debug, Clone)]
pub enum AutomationError {
    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("Platform-specific error: {0}")]
    PlatformError(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Invalid selector: {0}")]
    InvalidSelector(String),

    #[error("Element is detached from the UI tree: {0}")]
    ElementDetached(String),

    #[error("Element is not visible: {0}")]
    ElementNotVisible(String),

    #[error("Failed to scroll: {0}")]
    ScrollFailed(String),

    #[error("Could not create {level} item: {step} not found")]
    CreationFailed {
        level: HierarchyLevel,
        step: CreationStep,
    },

    #[error("Location picker did not open: {0}")]
    PickerNotOpened(String),

    #[error("Another resolution run is already using this session")]
    SessionBusy,

    #[error("Configuration error: {0}")]
    Config(String),
}

impl AutomationError {
    /// True for the outcomes a strategy chain treats as "try the next one".
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            AutomationError::ElementNotFound(_) | AutomationError::Timeout(_)
        )
    }

    /// Errors that end a resolution run.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            AutomationError::CreationFailed { .. }
                | AutomationError::PickerNotOpened(_)
                | AutomationError::SessionBusy
                | AutomationError::Config(_)
        )
    }
}
