//! Responder loop - periodic sweep over the dialog-prone process roster
//!
//! One background worker runs sweeps back to back, separated by the configured
//! check interval. The controller talks to it through a per-worker running
//! flag and a wake channel, so `stop()` interrupts sleeps immediately and only
//! an in-flight probe (bounded by its own timeout) can delay shutdown.

use crate::config::{Config, SharedConfig};
use crate::error::{Error, ErrorCode, Result};
use crate::filter::{self, FilterDecision};
use crate::policy::{self, ButtonSet};
use crate::probe::{DialogProbe, PermissionCheck, ProbeResult, PROCESS_NOT_RUNNING};
use crate::session::SessionResolver;
use chrono::{DateTime, Utc};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::{Condvar, Mutex};
use serde::Serialize;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Processes known to raise approval dialogs, probed in this order every sweep
pub const DIALOG_PRONE_PROCESSES: &[&str] = &[
    "Terminal",
    "iTerm2",
    "osascript",
    "System Preferences",
    "System Settings",
    "SecurityAgent",
    "UserNotificationCenter",
    "CoreServicesUIAgent",
    "loginwindow",
];

const DEFAULT_COOLDOWN: Duration = Duration::from_secs(1);
const DEFAULT_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopPhase {
    Stopped,
    Starting,
    Running,
    Stopping,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Click {
    pub process: String,
    pub label: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LastClick {
    pub process: String,
    pub label: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct LoopStats {
    pub sweeps: u64,
    pub clicks: u64,
    pub errors: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_click: Option<LastClick>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResponderStatus {
    pub phase: LoopPhase,
    pub stats: LoopStats,
}

/// Outcome of one pass over the roster
#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepReport {
    pub clicked: Vec<Click>,
    pub skipped: Vec<String>,
    pub errors: usize,
    /// Stop was observed before the roster was exhausted
    pub cancelled: bool,
}

struct Worker {
    handle: thread::JoinHandle<()>,
    running: Arc<AtomicBool>,
    wake: Sender<()>,
    done: Receiver<()>,
}

struct Shared {
    config: SharedConfig,
    probe: Arc<dyn DialogProbe>,
    sessions: Arc<dyn SessionResolver>,
    permissions: Arc<dyn PermissionCheck>,
    roster: Vec<String>,
    cooldown: Duration,
    grace: Duration,
    phase: Mutex<LoopPhase>,
    phase_changed: Condvar,
    stats: Mutex<LoopStats>,
    worker: Mutex<Option<Worker>>,
    /// Held for the duration of every sweep
    sweeping: Mutex<()>,
    /// Bumped by each start attempt and by a cancelling stop
    epoch: AtomicU64,
}

pub struct ResponderBuilder {
    config: SharedConfig,
    probe: Arc<dyn DialogProbe>,
    sessions: Arc<dyn SessionResolver>,
    permissions: Arc<dyn PermissionCheck>,
    roster: Vec<String>,
    cooldown: Duration,
    grace: Duration,
}

impl ResponderBuilder {
    /// Pause after a successful click before probing the next process
    pub fn cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    /// How long `stop()` waits for the worker before giving up on it
    pub fn grace_period(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    pub fn roster<I, S>(mut self, roster: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roster = roster.into_iter().map(Into::into).collect();
        self
    }

    pub fn build(self) -> Responder {
        Responder {
            shared: Arc::new(Shared {
                config: self.config,
                probe: self.probe,
                sessions: self.sessions,
                permissions: self.permissions,
                roster: self.roster,
                cooldown: self.cooldown,
                grace: self.grace,
                phase: Mutex::new(LoopPhase::Stopped),
                phase_changed: Condvar::new(),
                stats: Mutex::new(LoopStats::default()),
                worker: Mutex::new(None),
                sweeping: Mutex::new(()),
                epoch: AtomicU64::new(0),
            }),
        }
    }
}

/// Cloneable handle to the responder loop. Every clone controls the same worker.
#[derive(Clone)]
pub struct Responder {
    shared: Arc<Shared>,
}

impl Responder {
    pub fn builder(
        config: SharedConfig,
        probe: Arc<dyn DialogProbe>,
        sessions: Arc<dyn SessionResolver>,
        permissions: Arc<dyn PermissionCheck>,
    ) -> ResponderBuilder {
        ResponderBuilder {
            config,
            probe,
            sessions,
            permissions,
            roster: DIALOG_PRONE_PROCESSES.iter().map(|p| p.to_string()).collect(),
            cooldown: DEFAULT_COOLDOWN,
            grace: DEFAULT_GRACE,
        }
    }

    /// Start the background worker.
    ///
    /// Requires `enabled` and a successful accessibility preflight. A failed
    /// preflight is reported and not retried. The preflight runs without
    /// holding the worker slot, so `stop()` can cancel a start in progress.
    pub fn start(&self) -> Result<()> {
        let epoch = {
            let mut slot = self.shared.worker.lock();
            if self.phase() != LoopPhase::Stopped {
                return Err(Error::already_running());
            }
            if slot.as_ref().is_some_and(|w| !w.handle.is_finished()) {
                return Err(Error::new(
                    ErrorCode::AlreadyRunning,
                    "Previous sweep is still finishing, try again shortly",
                ));
            }
            if let Some(previous) = slot.take() {
                let _ = previous.handle.join();
            }
            if !self.shared.config.snapshot().enabled {
                return Err(Error::disabled());
            }
            self.set_phase(LoopPhase::Starting);
            self.shared.epoch.fetch_add(1, Ordering::SeqCst) + 1
        };

        let session = match self.shared.sessions.resolve_active_session() {
            Ok(session) => session,
            Err(e) => {
                warn!(error = %e, "cannot start without an interactive session");
                self.abandon_start(epoch);
                return Err(e);
            }
        };
        if let Err(e) = self.shared.permissions.preflight(&session) {
            error!(user = %session.user, error = %e, "accessibility permission check failed");
            self.abandon_start(epoch);
            return Err(e);
        }

        let mut slot = self.shared.worker.lock();
        if self.phase() != LoopPhase::Starting || self.shared.epoch.load(Ordering::SeqCst) != epoch {
            info!("start cancelled before the worker was spawned");
            return Err(Error::new(ErrorCode::NotRunning, "Start was cancelled by stop"));
        }

        let running = Arc::new(AtomicBool::new(true));
        let (wake_tx, wake_rx) = bounded::<()>(1);
        let (done_tx, done_rx) = bounded::<()>(1);

        let shared = self.shared.clone();
        let flag = running.clone();
        let spawned = thread::Builder::new()
            .name("autoconfirm-sweep".to_string())
            .spawn(move || {
                shared.run(&flag, &wake_rx);
                let _ = done_tx.send(());
            });

        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                self.set_phase(LoopPhase::Stopped);
                return Err(Error::action_failed("spawn sweep worker", &e.to_string()));
            }
        };

        *slot = Some(Worker {
            handle,
            running,
            wake: wake_tx,
            done: done_rx,
        });
        self.shared.stats.lock().started_at = Some(Utc::now());
        self.set_phase(LoopPhase::Running);
        info!(
            user = %session.user,
            processes = self.shared.roster.len(),
            "responder started"
        );
        Ok(())
    }

    /// Signal the worker and wait up to the grace period for it to exit.
    ///
    /// Returns once the worker is gone or the grace period elapsed, whichever
    /// comes first. Either way no new probe is issued afterwards. A start
    /// still in its preflight is cancelled.
    pub fn stop(&self) -> Result<()> {
        let mut slot = self.shared.worker.lock();
        match self.phase() {
            LoopPhase::Running => {}
            LoopPhase::Starting => {
                self.shared.epoch.fetch_add(1, Ordering::SeqCst);
                self.set_phase(LoopPhase::Stopped);
                info!("responder start cancelled");
                return Ok(());
            }
            LoopPhase::Stopped | LoopPhase::Stopping => return Err(Error::not_running()),
        }
        let Some(worker) = slot.take() else {
            return Err(Error::not_running());
        };

        self.set_phase(LoopPhase::Stopping);
        worker.running.store(false, Ordering::SeqCst);
        let _ = worker.wake.try_send(());

        match worker.done.recv_timeout(self.shared.grace) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                let _ = worker.handle.join();
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    grace_ms = self.shared.grace.as_millis() as u64,
                    "sweep still in flight after grace period, leaving it to finish"
                );
                *slot = Some(worker);
            }
        }

        self.set_phase(LoopPhase::Stopped);
        info!("responder stopped");
        Ok(())
    }

    pub fn phase(&self) -> LoopPhase {
        *self.shared.phase.lock()
    }

    pub fn is_running(&self) -> bool {
        self.phase() == LoopPhase::Running
    }

    pub fn status(&self) -> ResponderStatus {
        ResponderStatus {
            phase: self.phase(),
            stats: self.shared.stats.lock().clone(),
        }
    }

    /// Block until the responder is stopped
    pub fn wait(&self) {
        let mut phase = self.shared.phase.lock();
        while *phase != LoopPhase::Stopped {
            self.shared.phase_changed.wait(&mut phase);
        }
    }

    /// Bounded [`Responder::wait`]. Returns true once stopped.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut phase = self.shared.phase.lock();
        if *phase != LoopPhase::Stopped {
            self.shared.phase_changed.wait_for(&mut phase, timeout);
        }
        *phase == LoopPhase::Stopped
    }

    /// Run one sweep on the calling thread, ignoring `enabled`.
    ///
    /// Refused while the background worker exists or another sweep is in
    /// progress, so a dialog is never pressed by two sweeps at once.
    pub fn sweep_once(&self) -> Result<SweepReport> {
        if self.phase() != LoopPhase::Stopped {
            return Err(Error::already_running());
        }
        if self
            .shared
            .worker
            .lock()
            .as_ref()
            .is_some_and(|w| !w.handle.is_finished())
        {
            return Err(Error::new(
                ErrorCode::AlreadyRunning,
                "Previous sweep is still finishing, try again shortly",
            ));
        }
        let Some(_sweeping) = self.shared.sweeping.try_lock() else {
            return Err(Error::new(ErrorCode::AlreadyRunning, "Another sweep is in progress"));
        };

        let config = self.shared.config.snapshot();
        let running = AtomicBool::new(true);
        let (_wake_tx, wake_rx) = bounded::<()>(1);
        let report = self.shared.sweep(&config, &running, &wake_rx);
        self.shared.stats.lock().sweeps += 1;
        Ok(report)
    }

    fn abandon_start(&self, epoch: u64) {
        let _slot = self.shared.worker.lock();
        if self.shared.epoch.load(Ordering::SeqCst) == epoch
            && self.phase() == LoopPhase::Starting
        {
            self.set_phase(LoopPhase::Stopped);
        }
    }

    fn set_phase(&self, phase: LoopPhase) {
        *self.shared.phase.lock() = phase;
        self.shared.phase_changed.notify_all();
    }
}

enum Step {
    Clicked(String),
    Nothing,
    Failed,
}

impl Shared {
    fn run(&self, running: &AtomicBool, wake: &Receiver<()>) {
        debug!("sweep worker started");
        while running.load(Ordering::SeqCst) {
            let config = self.config.snapshot();
            let report = {
                let _sweeping = self.sweeping.lock();
                self.sweep(&config, running, wake)
            };
            self.stats.lock().sweeps += 1;
            if !report.clicked.is_empty() || report.errors > 0 {
                debug!(
                    clicks = report.clicked.len(),
                    errors = report.errors,
                    "sweep finished"
                );
            }
            if !pause(config.interval(), running, wake) {
                break;
            }
        }
        debug!("sweep worker exiting");
    }

    fn sweep(&self, config: &Config, running: &AtomicBool, wake: &Receiver<()>) -> SweepReport {
        let buttons = policy::buttons_to_click(config);
        let mut report = SweepReport::default();

        for process in &self.roster {
            match filter::evaluate(process, config) {
                FilterDecision::Allowed => {}
                decision => {
                    debug!(process = %process, ?decision, "skipping process");
                    report.skipped.push(process.clone());
                    continue;
                }
            }

            if !running.load(Ordering::SeqCst) {
                report.cancelled = true;
                break;
            }

            let step = panic::catch_unwind(AssertUnwindSafe(|| self.probe_one(process, &buttons)))
                .unwrap_or_else(|_| {
                    error!(process = %process, "probe panicked");
                    Step::Failed
                });

            match step {
                Step::Clicked(label) => {
                    self.record_click(process, &label);
                    report.clicked.push(Click {
                        process: process.clone(),
                        label,
                    });
                    if !pause(self.cooldown, running, wake) {
                        report.cancelled = true;
                        break;
                    }
                }
                Step::Nothing => {}
                Step::Failed => {
                    self.stats.lock().errors += 1;
                    report.errors += 1;
                }
            }
        }

        report
    }

    fn probe_one(&self, process: &str, buttons: &ButtonSet) -> Step {
        if buttons.is_empty() {
            return Step::Nothing;
        }

        let session = match self.sessions.resolve_active_session() {
            Ok(session) => session,
            Err(e) if e.code == ErrorCode::SessionUnavailable => {
                debug!(process = %process, error = %e, "no interactive session");
                return Step::Failed;
            }
            Err(e) => {
                warn!(process = %process, error = %e, "session lookup failed");
                return Step::Failed;
            }
        };

        match self.probe.try_click(process, buttons.as_slice(), &session) {
            ProbeResult::Clicked(label) => {
                info!(process = %process, label = %label, "clicked dialog button");
                Step::Clicked(label)
            }
            ProbeResult::NotFound => Step::Nothing,
            ProbeResult::Error(reason) if reason == PROCESS_NOT_RUNNING => {
                debug!(process = %process, "process not running");
                Step::Nothing
            }
            ProbeResult::Error(reason) => {
                warn!(process = %process, reason = %reason, "probe failed");
                Step::Failed
            }
        }
    }

    fn record_click(&self, process: &str, label: &str) {
        let mut stats = self.stats.lock();
        stats.clicks += 1;
        stats.last_click = Some(LastClick {
            process: process.to_string(),
            label: label.to_string(),
            at: Utc::now(),
        });
    }
}

/// Sleep for `duration` unless woken. Returns whether the loop should keep going.
fn pause(duration: Duration, running: &AtomicBool, wake: &Receiver<()>) -> bool {
    if !running.load(Ordering::SeqCst) {
        return false;
    }
    match wake.recv_timeout(duration) {
        Ok(()) | Err(RecvTimeoutError::Timeout) => {}
        Err(RecvTimeoutError::Disconnected) => thread::sleep(duration),
    }
    running.load(Ordering::SeqCst)
}
