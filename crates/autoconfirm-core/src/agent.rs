//! Agent - the control surface over configuration and the responder loop
//!
//! Every mutating operation validates first, persists second and only then
//! swaps the in-memory snapshot, so a failure leaves both copies untouched.

use crate::config::{Config, ConfigStore, LogLevel, SharedConfig};
use crate::error::Result;
use crate::policy::{self, ButtonSet};
use crate::probe::{DialogProbe, PermissionCheck};
use crate::responder::{LoopPhase, LoopStats, Responder, ResponderBuilder, SweepReport};
use crate::session::SessionResolver;
use parking_lot::Mutex;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub enabled: bool,
    pub running: bool,
    pub phase: LoopPhase,
    pub auto_approve: bool,
    pub auto_deny: bool,
    pub check_interval: f64,
    pub log_level: LogLevel,
    pub focus_prevention: bool,
    pub buttons: ButtonSet,
    pub process_whitelist: Vec<String>,
    pub process_blacklist: Vec<String>,
    pub config_path: PathBuf,
    pub stats: LoopStats,
}

pub struct Agent {
    store: ConfigStore,
    config: SharedConfig,
    responder: Responder,
    writes: Mutex<()>,
}

impl Agent {
    pub fn new(
        store: ConfigStore,
        probe: Arc<dyn DialogProbe>,
        sessions: Arc<dyn SessionResolver>,
        permissions: Arc<dyn PermissionCheck>,
    ) -> Self {
        Self::with_responder(store, probe, sessions, permissions, |b| b)
    }

    /// Like [`Agent::new`], letting the caller tune the responder before it is built
    pub fn with_responder(
        store: ConfigStore,
        probe: Arc<dyn DialogProbe>,
        sessions: Arc<dyn SessionResolver>,
        permissions: Arc<dyn PermissionCheck>,
        tune: impl FnOnce(ResponderBuilder) -> ResponderBuilder,
    ) -> Self {
        let config = SharedConfig::new(store.load());
        let responder = tune(Responder::builder(
            config.clone(),
            probe,
            sessions,
            permissions,
        ))
        .build();

        Self {
            store,
            config,
            responder,
            writes: Mutex::new(()),
        }
    }

    pub fn start(&self) -> Result<()> {
        self.responder.start()
    }

    pub fn stop(&self) -> Result<()> {
        self.responder.stop()
    }

    pub fn enable(&self) -> Result<()> {
        self.update(|c| c.enabled = true)?;
        info!("responder enabled");
        Ok(())
    }

    /// Persist `enabled = false` and stop the loop if it is running
    pub fn disable(&self) -> Result<()> {
        self.update(|c| c.enabled = false)?;
        if self.responder.is_running() {
            self.responder.stop()?;
        }
        info!("responder disabled");
        Ok(())
    }

    /// Validate and apply one setting. A running loop picks it up on its next sweep.
    pub fn configure(&self, key: &str, value: &str) -> Result<Config> {
        let _guard = self.writes.lock();
        let next = self.config.snapshot().with_setting(key, value)?;
        self.store.save(&next)?;
        self.config.replace(next.clone());
        info!(key = %key, value = %value, "configuration updated");
        Ok(next)
    }

    /// Re-read the configuration file into the live snapshot.
    /// Used when another process edited the file under a running loop.
    pub fn reload(&self) -> Arc<Config> {
        let _guard = self.writes.lock();
        self.config.replace(self.store.load());
        self.config.snapshot()
    }

    pub fn status(&self) -> StatusReport {
        let config = self.config.snapshot();
        let loop_status = self.responder.status();
        StatusReport {
            enabled: config.enabled,
            running: loop_status.phase == LoopPhase::Running,
            phase: loop_status.phase,
            auto_approve: config.auto_approve,
            auto_deny: config.auto_deny,
            check_interval: config.check_interval,
            log_level: config.log_level,
            focus_prevention: config.focus_prevention,
            buttons: policy::buttons_to_click(&config),
            process_whitelist: config.process_whitelist.clone(),
            process_blacklist: config.process_blacklist.clone(),
            config_path: self.store.path().to_path_buf(),
            stats: loop_status.stats,
        }
    }

    pub fn sweep_once(&self) -> Result<SweepReport> {
        self.responder.sweep_once()
    }

    pub fn config(&self) -> Arc<Config> {
        self.config.snapshot()
    }

    /// Handle for signal handlers and other threads
    pub fn responder(&self) -> Responder {
        self.responder.clone()
    }

    fn update(&self, apply: impl FnOnce(&mut Config)) -> Result<()> {
        let _guard = self.writes.lock();
        let mut next = (*self.config.snapshot()).clone();
        apply(&mut next);
        self.store.save(&next)?;
        self.config.replace(next);
        Ok(())
    }
}
