//! Running AppleScript through `osascript` inside a user session

use crate::error::{Error, ErrorCode, Result};
use crate::session::Session;
use std::process::Stdio;
use std::time::Duration;
use wait_timeout::ChildExt;

pub trait ScriptRunner: Send + Sync {
    /// Run `script` as `session`'s user and return its trimmed stdout
    fn run(&self, script: &str, session: &Session, timeout: Duration) -> Result<String>;
}

pub struct OsaScriptRunner {
    program: String,
}

impl OsaScriptRunner {
    pub fn new() -> Self {
        Self::with_program("/usr/bin/osascript")
    }

    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for OsaScriptRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptRunner for OsaScriptRunner {
    fn run(&self, script: &str, session: &Session, timeout: Duration) -> Result<String> {
        let mut child = session
            .command(&self.program)
            .arg("-e")
            .arg(script)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::action_failed(&self.program, &e.to_string()))?;

        match child.wait_timeout(timeout) {
            Ok(Some(_)) => {}
            Ok(None) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(Error::timeout(&self.program, timeout.as_millis() as u64));
            }
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(Error::action_failed(&self.program, &e.to_string()));
            }
        }

        let output = child.wait_with_output()?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::new(
                ErrorCode::ActionFailed,
                format!("{} exited with {}: {}", self.program, output.status, stderr.trim()),
            ));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

/// Quote `s` as an AppleScript string literal
pub fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            c if c.is_control() => out.push(' '),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}
