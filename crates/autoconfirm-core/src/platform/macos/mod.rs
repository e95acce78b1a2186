//! macOS trust check through `AXIsProcessTrusted` (cidre)

use super::AccessibilityTrust;
use crate::Result;
use cidre::ax;

/// With `prompt`, an untrusted process also gets the system dialog pointing
/// the user at the Accessibility pane. Trust is granted asynchronously, so the
/// returned value reflects the state before the user answers.
pub fn accessibility_trust(prompt: bool) -> Result<AccessibilityTrust> {
    if ax::is_process_trusted() {
        return Ok(AccessibilityTrust::new(true, false));
    }
    if prompt {
        let trusted = ax::is_process_trusted_with_prompt(true);
        return Ok(AccessibilityTrust::new(trusted, true));
    }
    Ok(AccessibilityTrust::new(false, false))
}
