//! Which button labels the responder is allowed to press

use crate::config::Config;
use serde::Serialize;

/// Built-in labels pressed when `auto_approve` is on
pub const POSITIVE_BUTTONS: &[&str] = &[
    "Continue", "OK", "Yes", "Allow", "Accept", "Approve", "Grant", "Enable", "Proceed", "Install",
    "Update",
];

/// Built-in labels pressed when `auto_deny` is on
pub const NEGATIVE_BUTTONS: &[&str] = &[
    "Cancel", "No", "Deny", "Refuse", "Decline", "Skip", "Dismiss",
];

/// Ordered, duplicate-free list of labels. Positive labels always precede
/// negative ones so a window offering both gets the positive answer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ButtonSet {
    labels: Vec<String>,
}

impl ButtonSet {
    fn push(&mut self, label: &str) {
        let label = label.trim();
        if label.is_empty() || self.contains(label) {
            return;
        }
        self.labels.push(label.to_string());
    }

    pub fn contains(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.labels.iter().map(String::as_str)
    }
}

/// Labels eligible for auto-click under `config`
pub fn buttons_to_click(config: &Config) -> ButtonSet {
    let mut set = ButtonSet::default();

    if config.auto_approve {
        POSITIVE_BUTTONS.iter().for_each(|b| set.push(b));
        config.custom_positive_buttons.iter().for_each(|b| set.push(b));
    }

    if config.auto_deny {
        NEGATIVE_BUTTONS.iter().for_each(|b| set.push(b));
        config.custom_negative_buttons.iter().for_each(|b| set.push(b));
    }

    set
}
