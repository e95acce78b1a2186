//! Dialog probe - the one seam between the responder and the accessibility bridge
//!
//! A probe is handed a process name and an ordered list of labels and presses
//! at most one matching button. Everything the bridge can throw at us is folded
//! into [`ProbeResult::Error`] so the sweep never has to deal with it.

use crate::error::{Error, ErrorCode, Result};
use crate::script::{quote, OsaScriptRunner, ScriptRunner};
use crate::session::Session;
use serde::Serialize;
use std::time::Duration;

/// Reason reported when the target process has no UI process to talk to
pub const PROCESS_NOT_RUNNING: &str = "process_not_running";

/// Upper bound for one probe invocation
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", content = "detail", rename_all = "snake_case")]
pub enum ProbeResult {
    Clicked(String),
    NotFound,
    Error(String),
}

pub trait DialogProbe: Send + Sync {
    /// Press the first label in `labels` found in any window of `process_name`
    fn try_click(&self, process_name: &str, labels: &[String], session: &Session) -> ProbeResult;
}

pub trait PermissionCheck: Send + Sync {
    /// Fails with `PermissionDenied` when UI scripting is not allowed for `session`
    fn preflight(&self, session: &Session) -> Result<()>;
}

/// Drives System Events through AppleScript
pub struct AppleScriptProbe<R = OsaScriptRunner> {
    runner: R,
    timeout: Duration,
}

impl AppleScriptProbe<OsaScriptRunner> {
    pub fn new() -> Self {
        Self::with_runner(OsaScriptRunner::new())
    }
}

impl Default for AppleScriptProbe<OsaScriptRunner> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: ScriptRunner> AppleScriptProbe<R> {
    pub fn with_runner(runner: R) -> Self {
        Self {
            runner,
            timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl<R: ScriptRunner> DialogProbe for AppleScriptProbe<R> {
    fn try_click(&self, process_name: &str, labels: &[String], session: &Session) -> ProbeResult {
        if labels.is_empty() {
            return ProbeResult::NotFound;
        }

        let script = click_script(process_name, labels);
        match self.runner.run(&script, session, self.timeout) {
            Ok(out) => parse_click_output(&out),
            Err(e) if e.code == ErrorCode::Timeout => ProbeResult::Error("timeout".to_string()),
            Err(e) => ProbeResult::Error(e.message),
        }
    }
}

impl<R: ScriptRunner> PermissionCheck for AppleScriptProbe<R> {
    fn preflight(&self, session: &Session) -> Result<()> {
        match self.runner.run(PREFLIGHT_SCRIPT, session, self.timeout) {
            Ok(out) if out == "accessible" => Ok(()),
            Ok(out) => Err(Error::permission_denied(format!(
                "System Events refused UI scripting for {} ({})",
                session.user, out
            ))),
            Err(e) => Err(Error::permission_denied(format!(
                "Accessibility check failed for {}: {}",
                session.user, e.message
            ))),
        }
    }
}

const PREFLIGHT_SCRIPT: &str = r#"tell application "System Events"
    try
        set frontApp to name of first application process whose frontmost is true
        return "accessible"
    on error
        return "not_accessible"
    end try
end tell"#;

/// Labels outer, windows inner: the first label wins across all windows
/// before the next label is tried. `return` ends the script after one click.
fn click_script(process_name: &str, labels: &[String]) -> String {
    let process = quote(process_name);
    let labels = labels
        .iter()
        .map(|l| quote(l))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        r#"tell application "System Events"
    if not (exists process {process}) then return "not_running"
    tell process {process}
        repeat with candidate in {{{labels}}}
            set label to contents of candidate
            repeat with win in windows
                try
                    click (first button of win whose name is label)
                    return "clicked:" & label
                end try
            end repeat
        end repeat
    end tell
end tell
return "not_found""#
    )
}

fn parse_click_output(out: &str) -> ProbeResult {
    let out = out.trim();
    if let Some(label) = out.strip_prefix("clicked:") {
        return ProbeResult::Clicked(label.to_string());
    }
    match out {
        "not_found" => ProbeResult::NotFound,
        "not_running" => ProbeResult::Error(PROCESS_NOT_RUNNING.to_string()),
        other => ProbeResult::Error(format!("unexpected bridge output: {:?}", other)),
    }
}
