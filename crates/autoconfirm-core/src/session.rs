//! Interactive user session lookup
//!
//! The agent may run as root or from launchd while the dialogs belong to the
//! logged-in console user. Automation commands have to be issued as that user.

use crate::error::{Error, ErrorCode, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::process::Command;
use std::time::{Duration, Instant};
use tracing::debug;

/// Console owners that mean "nobody is logged in"
const NO_USER: &[&str] = &["", "root", "loginwindow"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub user: String,
    pub uid: u32,
}

impl Session {
    /// Command running `program` as this session's user.
    ///
    /// Goes through `launchctl asuser` unless we already are that user.
    pub fn command(&self, program: &str) -> Command {
        if effective_uid() == self.uid {
            return Command::new(program);
        }
        let mut cmd = Command::new("launchctl");
        cmd.arg("asuser").arg(self.uid.to_string()).arg(program);
        cmd
    }
}

fn effective_uid() -> u32 {
    // SAFETY: geteuid has no preconditions and cannot fail
    unsafe { libc::geteuid() }
}

pub trait SessionResolver: Send + Sync {
    fn resolve_active_session(&self) -> Result<Session>;
}

/// Resolves the owner of `/dev/console`, which is the user at the login screen's other side
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleSessionResolver;

impl SessionResolver for ConsoleSessionResolver {
    fn resolve_active_session(&self) -> Result<Session> {
        #[cfg(target_os = "macos")]
        let args = ["-f", "%Su %u", "/dev/console"];
        #[cfg(not(target_os = "macos"))]
        let args = ["-c", "%U %u", "/dev/console"];

        let output = Command::new("stat")
            .args(args)
            .output()
            .map_err(|e| Error::action_failed("stat /dev/console", &e.to_string()))?;

        if !output.status.success() {
            return Err(Error::action_failed(
                "stat /dev/console",
                String::from_utf8_lossy(&output.stderr).trim(),
            ));
        }

        parse_console_owner(&String::from_utf8_lossy(&output.stdout))
    }
}

/// Parse `"<user> <uid>"`
pub fn parse_console_owner(s: &str) -> Result<Session> {
    let mut parts = s.split_whitespace();
    let user = parts.next().unwrap_or_default();
    if NO_USER.contains(&user) {
        return Err(Error::no_active_session());
    }

    let uid = parts
        .next()
        .and_then(|u| u.parse::<u32>().ok())
        .ok_or_else(|| {
            Error::new(
                ErrorCode::SessionUnavailable,
                format!("cannot parse console owner: {:?}", s.trim()),
            )
        })?;

    Ok(Session {
        user: user.to_string(),
        uid,
    })
}

/// Remembers a successful lookup for `ttl`. Failures are never cached so a
/// user logging in is picked up on the next probe.
pub struct CachedSessionResolver<R> {
    inner: R,
    ttl: Duration,
    cached: Mutex<Option<(Session, Instant)>>,
}

impl<R: SessionResolver> CachedSessionResolver<R> {
    pub fn new(inner: R) -> Self {
        Self::with_ttl(inner, Duration::from_secs(30))
    }

    pub fn with_ttl(inner: R, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            cached: Mutex::new(None),
        }
    }
}

impl<R: SessionResolver> SessionResolver for CachedSessionResolver<R> {
    fn resolve_active_session(&self) -> Result<Session> {
        let mut cached = self.cached.lock();
        if let Some((session, at)) = cached.as_ref() {
            if at.elapsed() < self.ttl {
                return Ok(session.clone());
            }
        }

        match self.inner.resolve_active_session() {
            Ok(session) => {
                debug!(user = %session.user, uid = session.uid, "resolved console session");
                *cached = Some((session.clone(), Instant::now()));
                Ok(session)
            }
            Err(e) => {
                *cached = None;
                Err(e)
            }
        }
    }
}
