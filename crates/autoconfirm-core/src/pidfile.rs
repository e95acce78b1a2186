//! PID file for the background agent
//!
//! Lets a second invocation of the CLI find, report on, and stop the process
//! that is running the responder loop.

use crate::error::{Error, ErrorCode, Result};
use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PidInfo {
    pub pid: u32,
    pub started_at: DateTime<Utc>,
}

pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// `$HOME/.autoconfirm.pid`
    pub fn default_location() -> Result<Self> {
        let home = std::env::var("HOME").context("HOME not set")?;
        Ok(Self::new(PathBuf::from(home).join(".autoconfirm.pid")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record the current process, refusing if another live agent owns the file
    pub fn acquire(&self) -> Result<PidInfo> {
        if let Some(existing) = self.live()? {
            if existing.pid != std::process::id() {
                return Err(Error::new(
                    ErrorCode::AlreadyRunning,
                    format!("Agent already running (PID {})", existing.pid),
                )
                .with_suggestions(vec!["Run `autoconfirm stop` first".to_string()]));
            }
        }

        let info = PidInfo {
            pid: std::process::id(),
            started_at: Utc::now(),
        };
        let content = serde_json::to_string_pretty(&info).context("failed to serialize PID file")?;
        fs::write(&self.path, content)
            .with_context(|| format!("failed to write PID file: {}", self.path.display()))?;
        debug!(path = %self.path.display(), pid = info.pid, "wrote pid file");
        Ok(info)
    }

    pub fn read(&self) -> Result<Option<PidInfo>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let info = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse PID file: {}", self.path.display()))?;
        Ok(Some(info))
    }

    /// The recorded agent if it is still alive. Stale or unreadable files are removed.
    pub fn live(&self) -> Result<Option<PidInfo>> {
        let info = match self.read() {
            Ok(Some(info)) => info,
            Ok(None) => return Ok(None),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "discarding unreadable pid file");
                self.remove();
                return Ok(None);
            }
        };

        if is_process_alive(info.pid) {
            Ok(Some(info))
        } else {
            debug!(pid = info.pid, "removing stale pid file");
            self.remove();
            Ok(None)
        }
    }

    /// Remove the file if it still names this process
    pub fn release(&self) {
        if let Ok(Some(info)) = self.read() {
            if info.pid == std::process::id() {
                self.remove();
            }
        }
    }

    /// Send SIGTERM to the live agent recorded in the file
    pub fn signal_stop(&self) -> Result<PidInfo> {
        let info = self.live()?.ok_or_else(Error::not_running)?;
        send_sigterm(info.pid)?;
        Ok(info)
    }

    fn remove(&self) {
        if let Err(e) = fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %self.path.display(), error = %e, "failed to remove pid file");
            }
        }
    }
}

pub fn is_process_alive(pid: u32) -> bool {
    // pid_t is signed; anything larger would address a process group
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    if pid <= 0 {
        return false;
    }
    // SAFETY: signal 0 only checks for existence
    if unsafe { libc::kill(pid, 0) } == 0 {
        return true;
    }
    // EPERM: it exists but belongs to someone else
    std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

fn send_sigterm(pid: u32) -> Result<()> {
    let pid_t = libc::pid_t::try_from(pid)
        .map_err(|_| Error::action_failed("signal agent", &format!("PID {} out of range", pid)))?;
    // SAFETY: pid_t was validated as a positive process id
    let result = unsafe { libc::kill(pid_t, libc::SIGTERM) };
    if result != 0 {
        return Err(Error::action_failed(
            "signal agent",
            &std::io::Error::last_os_error().to_string(),
        ));
    }
    Ok(())
}
