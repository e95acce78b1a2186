//! Persisted configuration: JSON file on disk, shared in memory as an immutable snapshot

use crate::error::Error;
use anyhow::{Context, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error as ThisError;
use tracing::{debug, warn};

/// Keys accepted by [`Config::with_setting`]
pub const CONFIGURABLE_KEYS: &[&str] = &[
    "auto_approve",
    "auto_deny",
    "check_interval",
    "log_level",
    "focus_prevention",
    "custom_positive_buttons",
    "custom_negative_buttons",
    "process_whitelist",
    "process_blacklist",
];

const DEFAULT_CHECK_INTERVAL: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warning,
    Error,
}

impl LogLevel {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "DEBUG" => Some(Self::Debug),
            "INFO" => Some(Self::Info),
            "WARNING" => Some(Self::Warning),
            "ERROR" => Some(Self::Error),
            _ => None,
        }
    }

    /// Directive understood by `tracing_subscriber::EnvFilter`
    pub fn as_filter(&self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warning => "warn",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub enabled: bool,
    pub auto_approve: bool,
    pub auto_deny: bool,
    /// Seconds between sweeps
    pub check_interval: f64,
    pub log_level: LogLevel,
    pub custom_positive_buttons: Vec<String>,
    pub custom_negative_buttons: Vec<String>,
    pub focus_prevention: bool,
    /// Empty means every process is eligible
    pub process_whitelist: Vec<String>,
    pub process_blacklist: Vec<String>,
    /// Keys we don't know about, written back untouched
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            enabled: false,
            auto_approve: true,
            auto_deny: false,
            check_interval: DEFAULT_CHECK_INTERVAL,
            log_level: LogLevel::Info,
            custom_positive_buttons: Vec::new(),
            custom_negative_buttons: Vec::new(),
            focus_prevention: true,
            process_whitelist: Vec::new(),
            process_blacklist: vec!["Script Editor".to_string(), "Xcode".to_string()],
            extra: serde_json::Map::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, ThisError)]
pub enum ConfigError {
    #[error("unknown configuration key '{key}' (valid keys: {})", CONFIGURABLE_KEYS.join(", "))]
    UnknownKey { key: String },
    #[error("{key} must be a number, got '{value}'")]
    NotANumber { key: String, value: String },
    #[error("check_interval must be a positive number of seconds, got {0}")]
    NonPositiveInterval(f64),
    #[error("{key} must be true/false, yes/no, on/off or 1/0, got '{value}'")]
    NotABool { key: String, value: String },
    #[error("log_level must be one of: DEBUG, INFO, WARNING, ERROR, got '{0}'")]
    InvalidLogLevel(String),
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        let key = match &e {
            ConfigError::UnknownKey { key } => key.clone(),
            ConfigError::NotANumber { key, .. } | ConfigError::NotABool { key, .. } => key.clone(),
            ConfigError::NonPositiveInterval(_) => "check_interval".to_string(),
            ConfigError::InvalidLogLevel(_) => "log_level".to_string(),
        };
        Error::invalid_config_value(&key, &e.to_string())
    }
}

impl Config {
    pub fn interval(&self) -> Duration {
        Duration::try_from_secs_f64(self.check_interval).unwrap_or(Duration::MAX)
    }

    /// Return a copy with `key` set from its textual form. `self` is never touched,
    /// so a rejected value leaves the stored configuration as it was.
    pub fn with_setting(&self, key: &str, value: &str) -> std::result::Result<Config, ConfigError> {
        let mut next = self.clone();
        match key {
            "auto_approve" => next.auto_approve = parse_bool(key, value)?,
            "auto_deny" => next.auto_deny = parse_bool(key, value)?,
            "focus_prevention" => next.focus_prevention = parse_bool(key, value)?,
            "check_interval" => next.check_interval = parse_interval(value)?,
            "log_level" => {
                next.log_level = LogLevel::parse(value)
                    .ok_or_else(|| ConfigError::InvalidLogLevel(value.to_string()))?
            }
            "custom_positive_buttons" => next.custom_positive_buttons = parse_list(value),
            "custom_negative_buttons" => next.custom_negative_buttons = parse_list(value),
            "process_whitelist" => next.process_whitelist = parse_list(value),
            "process_blacklist" => next.process_blacklist = parse_list(value),
            _ => return Err(ConfigError::UnknownKey { key: key.to_string() }),
        }
        Ok(next)
    }

    /// Repair values that deserialize fine but can't be used. Returns true if anything changed.
    fn sanitize(&mut self) -> bool {
        if self.check_interval.is_finite() && self.check_interval > 0.0 {
            return false;
        }
        warn!(
            check_interval = self.check_interval,
            "invalid check_interval in config file, using default"
        );
        self.check_interval = DEFAULT_CHECK_INTERVAL;
        true
    }
}

fn parse_bool(key: &str, value: &str) -> std::result::Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::NotABool {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

fn parse_interval(value: &str) -> std::result::Result<f64, ConfigError> {
    let secs: f64 = value.trim().parse().map_err(|_| ConfigError::NotANumber {
        key: "check_interval".to_string(),
        value: value.to_string(),
    })?;
    if !secs.is_finite() || secs <= 0.0 {
        return Err(ConfigError::NonPositiveInterval(secs));
    }
    Ok(secs)
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Configuration file on disk
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// `$HOME/.autoconfirm_config.json`
    pub fn default_location() -> Result<Self> {
        let home = std::env::var("HOME").context("HOME not set")?;
        Ok(Self::new(PathBuf::from(home).join(".autoconfirm_config.json")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the file, merging it with defaults. Never fails: a missing or
    /// malformed file yields defaults, which are written back immediately.
    pub fn load(&self) -> Config {
        let contents = match fs::read(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no config file, writing defaults");
                return self.reset();
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "cannot read config file, using defaults");
                return Config::default();
            }
        };

        // from_slice also rejects bytes that aren't UTF-8
        match serde_json::from_slice::<Config>(&contents) {
            Ok(mut config) => {
                if config.sanitize() {
                    self.save_logged(&config);
                }
                config
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "malformed config file, falling back to defaults");
                self.reset()
            }
        }
    }

    pub fn save(&self, config: &Config) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(config)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("failed to replace {}", self.path.display()))?;
        Ok(())
    }

    fn reset(&self) -> Config {
        let config = Config::default();
        self.save_logged(&config);
        config
    }

    fn save_logged(&self, config: &Config) {
        if let Err(e) = self.save(config) {
            warn!(path = %self.path.display(), error = %e, "failed to save config");
        }
    }
}

/// In-memory configuration shared between the controller and the sweep worker.
///
/// Writers swap in a whole new snapshot; readers hold an `Arc` to the snapshot
/// they started with, so a cycle never sees a half-applied change.
#[derive(Clone, Default)]
pub struct SharedConfig {
    inner: Arc<RwLock<Arc<Config>>>,
}

impl SharedConfig {
    pub fn new(config: Config) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(config))),
        }
    }

    pub fn snapshot(&self) -> Arc<Config> {
        self.inner.read().clone()
    }

    pub fn replace(&self, config: Config) {
        *self.inner.write() = Arc::new(config);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_in(dir: &tempfile::TempDir) -> ConfigStore {
        ConfigStore::new(dir.path().join("config.json"))
    }

    #[test]
    fn defaults() {
        let c = Config::default();
        assert!(!c.enabled);
        assert!(c.auto_approve);
        assert!(!c.auto_deny);
        assert_eq!(c.check_interval, 0.5);
        assert_eq!(c.process_blacklist, vec!["Script Editor", "Xcode"]);
        assert!(c.process_whitelist.is_empty());
    }

    #[test]
    fn missing_file_is_created_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let c = store.load();
        assert_eq!(c, Config::default());
        assert!(store.path().exists());
    }

    #[test]
    fn malformed_file_falls_back_and_is_rewritten() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        fs::write(store.path(), "{ this is not json").unwrap();

        let c = store.load();
        assert_eq!(c, Config::default());
        assert!(!c.enabled);

        let on_disk: Config =
            serde_json::from_str(&fs::read_to_string(store.path()).unwrap()).unwrap();
        assert_eq!(on_disk, Config::default());
    }

    #[test]
    fn non_utf8_file_is_replaced_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        fs::write(store.path(), [0xff, 0xfe, 0x7b]).unwrap();

        assert_eq!(store.load(), Config::default());
        let on_disk: Config =
            serde_json::from_str(&fs::read_to_string(store.path()).unwrap()).unwrap();
        assert_eq!(on_disk, Config::default());

        // invalid UTF-8 inside an otherwise well-formed string
        fs::write(store.path(), b"{\"process_blacklist\": [\"X\xffcode\"]}").unwrap();
        assert_eq!(store.load(), Config::default());
        assert!(fs::read_to_string(store.path()).is_ok());
    }

    #[test]
    fn wrong_type_counts_as_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        fs::write(store.path(), r#"{"enabled": "very"}"#).unwrap();
        assert_eq!(store.load(), Config::default());
    }

    #[test]
    fn missing_keys_filled_and_unknown_keys_preserved() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        fs::write(
            store.path(),
            r#"{"enabled": true, "check_interval": 2.0, "theme": "dark"}"#,
        )
        .unwrap();

        let c = store.load();
        assert!(c.enabled);
        assert_eq!(c.check_interval, 2.0);
        assert!(c.auto_approve);
        assert_eq!(c.extra.get("theme"), Some(&serde_json::json!("dark")));

        store.save(&c).unwrap();
        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(store.path()).unwrap()).unwrap();
        assert_eq!(raw["theme"], "dark");
        assert_eq!(raw["process_blacklist"], serde_json::json!(["Script Editor", "Xcode"]));
    }

    #[test]
    fn non_positive_interval_on_disk_is_repaired() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        fs::write(store.path(), r#"{"check_interval": 0}"#).unwrap();
        assert_eq!(store.load().check_interval, 0.5);
    }

    #[test]
    fn save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let c = Config {
            enabled: true,
            auto_deny: true,
            custom_positive_buttons: vec!["Trust".to_string()],
            log_level: LogLevel::Debug,
            ..Default::default()
        };
        store.save(&c).unwrap();
        assert_eq!(store.load(), c);
    }

    #[test]
    fn check_interval_rejects_garbage() {
        let c = Config::default();
        let err = c.with_setting("check_interval", "abc").unwrap_err();
        assert!(matches!(err, ConfigError::NotANumber { .. }));
        assert_eq!(c, Config::default());

        let err: Error = err.into();
        assert_eq!(err.code, crate::ErrorCode::InvalidConfigValue);
    }

    #[test]
    fn check_interval_rejects_non_positive() {
        let c = Config::default();
        assert!(matches!(
            c.with_setting("check_interval", "0"),
            Err(ConfigError::NonPositiveInterval(_))
        ));
        assert!(c.with_setting("check_interval", "-1").is_err());
        assert!(c.with_setting("check_interval", "inf").is_err());
        assert_eq!(c.with_setting("check_interval", " 1.5 ").unwrap().check_interval, 1.5);
    }

    #[test]
    fn bool_settings() {
        let c = Config::default();
        assert!(c.with_setting("auto_deny", "YES").unwrap().auto_deny);
        assert!(!c.with_setting("auto_approve", "off").unwrap().auto_approve);
        assert!(matches!(
            c.with_setting("auto_deny", "maybe"),
            Err(ConfigError::NotABool { .. })
        ));
    }

    #[test]
    fn log_level_is_normalized() {
        let c = Config::default().with_setting("log_level", "warning").unwrap();
        assert_eq!(c.log_level, LogLevel::Warning);
        assert_eq!(c.log_level.to_string(), "WARNING");
        assert_eq!(c.log_level.as_filter(), "warn");
        assert!(Config::default().with_setting("log_level", "loud").is_err());
    }

    #[test]
    fn list_settings_split_on_commas() {
        let c = Config::default()
            .with_setting("process_whitelist", "Terminal, iTerm2,,")
            .unwrap();
        assert_eq!(c.process_whitelist, vec!["Terminal", "iTerm2"]);
        let cleared = c.with_setting("process_whitelist", "").unwrap();
        assert!(cleared.process_whitelist.is_empty());
    }

    #[test]
    fn unknown_key_rejected() {
        let err = Config::default().with_setting("enabled", "true").unwrap_err();
        assert!(matches!(err, ConfigError::UnknownKey { .. }));
        assert!(err.to_string().contains("check_interval"));
    }

    #[test]
    fn shared_snapshot_is_stable_across_replace() {
        let shared = SharedConfig::new(Config::default());
        let before = shared.snapshot();
        shared.replace(Config {
            auto_deny: true,
            ..Default::default()
        });
        assert!(!before.auto_deny);
        assert!(shared.snapshot().auto_deny);
    }
}
