//! Fallback for platforms without a System Events bridge
//!
//! The engine itself builds and runs everywhere so it can be tested; only the
//! trust check is unavailable.

use super::AccessibilityTrust;
use crate::{Error, ErrorCode, Result};

pub fn accessibility_trust(_prompt: bool) -> Result<AccessibilityTrust> {
    Err(Error::new(
        ErrorCode::NotImplemented,
        "Accessibility trust checks are only available on macOS",
    ))
}
