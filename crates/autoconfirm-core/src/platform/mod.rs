//! Platform abstraction layer
//!
//! Accessibility trust checks for the process running the agent. Dialog
//! probing itself goes through [`crate::probe`], which works from any session.

use serde::Serialize;
use std::path::PathBuf;

#[cfg(target_os = "macos")]
pub mod macos;

#[cfg(not(target_os = "macos"))]
pub mod unsupported;

// Re-export the current platform
#[cfg(target_os = "macos")]
pub use macos as current;

#[cfg(not(target_os = "macos"))]
pub use unsupported as current;

/// What the OS thinks of this executable
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessibilityTrust {
    pub trusted: bool,
    /// The system prompt was requested during this check
    pub prompted: bool,
    /// The binary that has to be listed under Privacy & Security > Accessibility
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executable: Option<PathBuf>,
}

impl AccessibilityTrust {
    pub(crate) fn new(trusted: bool, prompted: bool) -> Self {
        Self {
            trusted,
            prompted,
            executable: std::env::current_exe().ok(),
        }
    }
}
