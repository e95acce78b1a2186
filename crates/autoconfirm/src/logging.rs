//! Tracing setup: stderr plus `~/.autoconfirm_logs/autoconfirm.log`

use autoconfirm_core::LogLevel;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

pub fn default_log_path() -> Option<PathBuf> {
    let home = std::env::var_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".autoconfirm_logs")
            .join("autoconfirm.log"),
    )
}

/// RUST_LOG wins over the configured level
pub fn filter(level: LogLevel) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_filter()))
}

fn open_log_file(path: &Path) -> std::io::Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

/// Install the global subscriber. Short commands log to the file only; a
/// log file that can't be opened leaves stderr as the only sink.
pub fn init(level: LogLevel, log_file: Option<&Path>, to_stderr: bool) {
    let file = log_file.and_then(|path| match open_log_file(path) {
        Ok(file) => Some(
            fmt::layer()
                .with_ansi(false)
                .with_target(false)
                .with_writer(Mutex::new(file)),
        ),
        Err(e) => {
            eprintln!("warning: cannot open log file {}: {}", path.display(), e);
            None
        }
    });

    let stderr = (to_stderr || file.is_none())
        .then(|| fmt::layer().with_target(false).with_writer(std::io::stderr));

    let _ = tracing_subscriber::registry()
        .with(filter(level))
        .with(stderr)
        .with(file)
        .try_init();
}
