//! Structured errors, printable as JSON by the CLI

use serde::{Deserialize, Serialize};
use std::fmt;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Error {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    PermissionDenied,
    SessionUnavailable,
    Timeout,
    ActionFailed,
    InvalidConfigValue,
    Disabled,
    AlreadyRunning,
    NotRunning,
    NotImplemented,
    Unknown,
}

impl Error {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            suggestions: Vec::new(),
            context: None,
        }
    }

    pub fn with_suggestions(mut self, suggestions: Vec<String>) -> Self {
        self.suggestions = suggestions;
        self
    }

    pub fn with_context(mut self, context: serde_json::Value) -> Self {
        self.context = Some(context);
        self
    }

    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::PermissionDenied, message).with_suggestions(vec![
            "Enable the terminal or agent binary in System Settings > Privacy & Security > Accessibility"
                .to_string(),
            "Run `autoconfirm permissions --request` to trigger the system prompt".to_string(),
        ])
    }

    pub fn no_active_session() -> Self {
        Self::new(ErrorCode::SessionUnavailable, "no_active_session")
    }

    pub fn timeout(what: &str, timeout_ms: u64) -> Self {
        Self::new(
            ErrorCode::Timeout,
            format!("Timeout after {}ms: {}", timeout_ms, what),
        )
    }

    pub fn action_failed(action: &str, reason: &str) -> Self {
        Self::new(
            ErrorCode::ActionFailed,
            format!("{} failed: {}", action, reason),
        )
    }

    pub fn invalid_config_value(key: &str, reason: &str) -> Self {
        Self::new(
            ErrorCode::InvalidConfigValue,
            format!("Invalid value for '{}': {}", key, reason),
        )
    }

    pub fn disabled() -> Self {
        Self::new(
            ErrorCode::Disabled,
            "Responder is disabled. Use the 'enable' command to enable it.",
        )
    }

    pub fn already_running() -> Self {
        Self::new(ErrorCode::AlreadyRunning, "Responder is already running")
    }

    pub fn not_running() -> Self {
        Self::new(ErrorCode::NotRunning, "Responder is not running")
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:?}] {}", self.code, self.message)
    }
}

impl std::error::Error for Error {}

impl From<anyhow::Error> for Error {
    fn from(e: anyhow::Error) -> Self {
        Self::new(ErrorCode::Unknown, e.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::new(ErrorCode::Unknown, e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_serializes_screaming_snake() {
        let json = serde_json::to_value(Error::no_active_session()).unwrap();
        assert_eq!(json["code"], "SESSION_UNAVAILABLE");
        assert_eq!(json["message"], "no_active_session");
        assert!(json.get("suggestions").is_none());
    }

    #[test]
    fn permission_denied_carries_remediation() {
        let e = Error::permission_denied("not trusted");
        assert_eq!(e.code, ErrorCode::PermissionDenied);
        assert!(!e.suggestions.is_empty());
        assert_eq!(e.to_string(), "[PermissionDenied] not trusted");
    }
}
