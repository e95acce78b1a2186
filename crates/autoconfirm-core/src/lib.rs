//! autoconfirm-core - Dialog auto-responder engine
//!
//! Watches a fixed roster of dialog-prone processes and presses a configured
//! button (approve or deny) whenever one of them shows a matching dialog.
//!
//! ## Layout
//!
//! - [`policy`] and [`filter`]: pure decisions over the [`Config`]
//! - [`probe`], [`session`], [`script`]: the accessibility bridge
//! - [`responder`]: the background sweep loop
//! - [`agent`]: control surface tying configuration and loop together
//!
//! ## Platform Support
//!
//! - **macOS**: System Events through `osascript`, trust checks via AX
//! - **Elsewhere**: builds and runs against test doubles only

pub mod agent;
pub mod config;
pub mod error;
pub mod filter;
pub mod pidfile;
pub mod platform;
pub mod policy;
pub mod probe;
pub mod responder;
pub mod script;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;

pub use agent::{Agent, StatusReport};
pub use config::{Config, ConfigError, ConfigStore, LogLevel, SharedConfig};
pub use error::{Error, ErrorCode, Result};
pub use pidfile::{PidFile, PidInfo};
pub use platform::AccessibilityTrust;
pub use policy::ButtonSet;
pub use probe::{AppleScriptProbe, DialogProbe, PermissionCheck, ProbeResult};
pub use responder::{LoopPhase, Responder, SweepReport};
pub use session::{CachedSessionResolver, ConsoleSessionResolver, Session, SessionResolver};

pub mod prelude {
    pub use crate::agent::Agent;
    pub use crate::config::{Config, ConfigStore};
    pub use crate::error::{Error, ErrorCode, Result};
    pub use crate::probe::{DialogProbe, PermissionCheck, ProbeResult};
    pub use crate::responder::Responder;
    pub use crate::session::{Session, SessionResolver};
}

/// Accessibility trust of this process; `prompt` asks the OS to show its dialog
pub fn accessibility_trust(prompt: bool) -> Result<AccessibilityTrust> {
    platform::current::accessibility_trust(prompt)
}
