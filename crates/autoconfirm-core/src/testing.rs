//! Test doubles for the accessibility bridge

use crate::error::{Error, Result};
use crate::probe::{DialogProbe, PermissionCheck, ProbeResult, PROCESS_NOT_RUNNING};
use crate::session::{Session, SessionResolver};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

/// In-memory desktop: process name -> windows -> button labels.
/// Pressing a button closes its window.
#[derive(Default)]
pub struct FakeDesktop {
    windows: Mutex<HashMap<String, Vec<Vec<String>>>>,
    calls: Mutex<Vec<String>>,
    delay: Duration,
    fail_for: Mutex<Option<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeDesktop {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn show(&self, process: &str, buttons: &[&str]) {
        self.windows
            .lock()
            .entry(process.to_string())
            .or_default()
            .push(buttons.iter().map(|b| b.to_string()).collect());
    }

    pub fn fail_for(&self, process: &str) {
        *self.fail_for.lock() = Some(process.to_string());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn open_windows(&self, process: &str) -> usize {
        self.windows.lock().get(process).map_or(0, Vec::len)
    }

    /// Most `try_click` calls that were ever running at the same time
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl DialogProbe for FakeDesktop {
    fn try_click(&self, process_name: &str, labels: &[String], _session: &Session) -> ProbeResult {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _in_flight = InFlight(&self.in_flight);
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        self.calls.lock().push(process_name.to_string());
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        if self.fail_for.lock().as_deref() == Some(process_name) {
            panic!("bridge blew up for {}", process_name);
        }

        let mut windows = self.windows.lock();
        let Some(wins) = windows.get_mut(process_name) else {
            return ProbeResult::Error(PROCESS_NOT_RUNNING.to_string());
        };
        for label in labels {
            if let Some(idx) = wins.iter().position(|w| w.iter().any(|b| b == label)) {
                wins.remove(idx);
                return ProbeResult::Clicked(label.clone());
            }
        }
        ProbeResult::NotFound
    }
}

pub struct FakeSessions {
    session: Option<Session>,
}

impl FakeSessions {
    pub fn logged_in() -> Self {
        Self {
            session: Some(Session {
                user: "alice".to_string(),
                uid: 501,
            }),
        }
    }

    pub fn nobody() -> Self {
        Self { session: None }
    }
}

impl SessionResolver for FakeSessions {
    fn resolve_active_session(&self) -> Result<Session> {
        self.session.clone().ok_or_else(Error::no_active_session)
    }
}

pub struct FakePermissions {
    granted: bool,
    delay: Duration,
    checks: AtomicUsize,
}

impl FakePermissions {
    pub fn granted() -> Self {
        Self {
            granted: true,
            delay: Duration::ZERO,
            checks: AtomicUsize::new(0),
        }
    }

    pub fn denied() -> Self {
        Self {
            granted: false,
            ..Self::granted()
        }
    }

    /// Granted, but the check takes `delay`
    pub fn slow(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::granted()
        }
    }

    pub fn checks(&self) -> usize {
        self.checks.load(Ordering::SeqCst)
    }
}

impl PermissionCheck for FakePermissions {
    fn preflight(&self, _session: &Session) -> Result<()> {
        self.checks.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        if self.granted {
            Ok(())
        } else {
            Err(Error::permission_denied("not trusted"))
        }
    }
}
