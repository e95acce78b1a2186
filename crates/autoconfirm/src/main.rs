//! autoconfirm - dialog auto-responder CLI
//!
//! Presses approval (or denial) buttons in OS dialogs so unattended
//! workflows keep moving.
//!
//! Supported: macOS

mod logging;

use anyhow::Result;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::{debug, info};

use autoconfirm_core::prelude::*;
use autoconfirm_core::{
    AppleScriptProbe, CachedSessionResolver, ConsoleSessionResolver, LogLevel, PidFile, PidInfo,
    StatusReport, SweepReport,
};

/// How often the foreground agent checks the config file for edits from other invocations
const RELOAD_POLL: Duration = Duration::from_secs(1);

#[derive(Parser)]
#[command(name = "autoconfirm")]
#[command(about = "Automatically answer approval dialogs raised by terminals and system agents")]
#[command(version)]
struct Cli {
    /// Configuration file (default: ~/.autoconfirm_config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print a {success, data, error} JSON envelope instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the responder in the foreground until stopped
    Start,
    /// Stop a running agent
    Stop,
    /// Allow the responder to run
    Enable,
    /// Stop the responder and keep it from starting
    Disable,
    /// Show configuration and agent state
    Status,
    /// Change one setting
    Configure { key: String, value: String },
    /// Enable, then run until signalled
    Daemon,
    /// Check/request accessibility permission
    Permissions {
        #[arg(long)]
        request: bool,
    },
    /// Run a single sweep and report what was pressed
    Sweep,
}

impl Commands {
    fn is_long_running(&self) -> bool {
        matches!(self, Commands::Start | Commands::Daemon | Commands::Sweep)
    }
}

#[derive(Serialize)]
struct Output<T: Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<Error>,
}

impl<T: Serialize> Output<T> {
    fn ok(data: T) -> Self {
        Self { success: true, data: Some(data), error: None }
    }
    fn err(e: Error) -> Output<()> {
        Output { success: false, data: None, error: Some(e) }
    }
}

fn print_json<T: Serialize>(output: &T) {
    match serde_json::to_string_pretty(output) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Error: cannot encode output: {}", e),
    }
}

// ── Main ────────────────────────────────────────────────────────────────────

fn main() {
    let cli = Cli::parse();

    let store = match &cli.config {
        Some(path) => ConfigStore::new(path),
        None => match ConfigStore::default_location() {
            Ok(store) => store,
            Err(e) => exit_with(cli.json, e),
        },
    };

    let stderr = cli.command.is_long_running() && !cli.json;
    logging::init(
        configured_level(store.path()),
        logging::default_log_path().as_deref(),
        stderr,
    );

    let ctx = Ctx { json: cli.json, agent: build_agent(store) };

    let result = match cli.command {
        Commands::Start => PidFile::default_location()
            .map_err(anyhow::Error::from)
            .and_then(|pidfile| run_agent(&ctx, &pidfile, false)),
        Commands::Daemon => PidFile::default_location()
            .map_err(anyhow::Error::from)
            .and_then(|pidfile| run_agent(&ctx, &pidfile, true)),
        Commands::Stop => cmd_stop(&ctx),
        Commands::Enable => cmd_enable(&ctx),
        Commands::Disable => cmd_disable(&ctx),
        Commands::Status => cmd_status(&ctx),
        Commands::Configure { key, value } => cmd_configure(&ctx, &key, &value),
        Commands::Permissions { request } => cmd_permissions(&ctx, request),
        Commands::Sweep => cmd_sweep(&ctx),
    };

    if let Err(e) = result {
        exit_with(cli.json, e);
    }
}

fn exit_with(json: bool, e: anyhow::Error) -> ! {
    let err = match e.downcast_ref::<Error>() {
        Some(err) => err.clone(),
        None => Error::new(ErrorCode::Unknown, format!("{:#}", e)),
    };
    if json {
        print_json(&Output::<()>::err(err));
    } else {
        eprintln!("Error: {}", err.message);
        for s in &err.suggestions {
            eprintln!("  hint: {}", s);
        }
    }
    std::process::exit(1);
}

struct Ctx {
    json: bool,
    agent: Agent,
}

impl Ctx {
    /// JSON envelope or the human rendering
    fn report<T: Serialize>(&self, data: T, human: impl FnOnce(&T)) {
        if self.json {
            print_json(&Output::ok(data));
        } else {
            human(&data);
        }
    }
}

fn build_agent(store: ConfigStore) -> Agent {
    let bridge = Arc::new(AppleScriptProbe::new());
    let probe: Arc<dyn DialogProbe> = bridge.clone();
    let permissions: Arc<dyn PermissionCheck> = bridge;
    let sessions: Arc<dyn SessionResolver> =
        Arc::new(CachedSessionResolver::new(ConsoleSessionResolver));
    Agent::new(store, probe, sessions, permissions)
}

/// Log level from the file without the side effects of a full load
fn configured_level(path: &Path) -> LogLevel {
    std::fs::read_to_string(path)
        .ok()
        .and_then(|raw| serde_json::from_str::<Config>(&raw).ok())
        .map(|c| c.log_level)
        .unwrap_or_default()
}

fn modified(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

// ══════════════════════════════════════════════════════════════════════════════
//  Commands
// ══════════════════════════════════════════════════════════════════════════════

fn run_agent(ctx: &Ctx, pidfile: &PidFile, enable_first: bool) -> Result<()> {
    let agent = &ctx.agent;
    let info = pidfile.acquire()?;
    if let Err(e) = start_owned(agent, enable_first) {
        pidfile.release();
        return Err(e);
    }
    let responder = agent.responder();

    if !ctx.json {
        println!("autoconfirm running (PID {}), Ctrl+C to stop", info.pid);
    }

    let config_path = agent.status().config_path;
    let mut seen = modified(&config_path);
    while !responder.wait_timeout(RELOAD_POLL) {
        let now = modified(&config_path);
        if now == seen {
            continue;
        }
        seen = now;
        let config = agent.reload();
        info!(path = %config_path.display(), "configuration reloaded");
        if !config.enabled {
            info!("disabled in configuration, stopping");
            let _ = responder.stop();
        }
    }

    pidfile.release();
    ctx.report(agent.status(), |s| {
        println!(
            "Stopped after {} sweeps, {} clicks, {} errors",
            s.stats.sweeps, s.stats.clicks, s.stats.errors
        );
    });
    Ok(())
}

/// Runs while holding the pid file. The signal handler goes in before
/// `start` so Ctrl+C can cancel a slow permission check.
fn start_owned(agent: &Agent, enable_first: bool) -> Result<()> {
    if enable_first {
        agent.enable()?;
    }
    let handler = agent.responder();
    ctrlc::set_handler(move || {
        if let Err(e) = handler.stop() {
            debug!(error = %e, "stop requested while not running");
        }
    })?;
    agent.start()?;
    Ok(())
}

fn cmd_stop(ctx: &Ctx) -> Result<()> {
    let pidfile = PidFile::default_location()?;
    let info = pidfile.signal_stop()?;
    ctx.report(info, |i| println!("Sent stop signal to agent (PID {})", i.pid));
    Ok(())
}

fn cmd_enable(ctx: &Ctx) -> Result<()> {
    ctx.agent.enable()?;
    ctx.report(serde_json::json!({"enabled": true}), |_| {
        println!("Enabled. Run `autoconfirm start` to begin responding.");
    });
    Ok(())
}

fn cmd_disable(ctx: &Ctx) -> Result<()> {
    ctx.agent.disable()?;
    // a foreground agent in another process notices the file change and stops
    let stopped = PidFile::default_location()?.live()?.map(|info| info.pid);
    ctx.report(serde_json::json!({"enabled": false, "stopping_pid": stopped}), |_| {
        match stopped {
            Some(pid) => println!("Disabled. Agent (PID {}) will stop.", pid),
            None => println!("Disabled."),
        }
    });
    Ok(())
}

#[derive(Serialize)]
struct StatusOutput {
    #[serde(flatten)]
    report: StatusReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    agent: Option<PidInfo>,
}

fn cmd_status(ctx: &Ctx) -> Result<()> {
    let mut report = ctx.agent.status();
    let agent = PidFile::default_location()?.live()?;
    report.running |= agent.is_some();

    ctx.report(StatusOutput { report, agent }, print_status);
    Ok(())
}

fn print_status(s: &StatusOutput) {
    let r = &s.report;
    let yes_no = |b: bool| if b { "yes" } else { "no" };
    println!("Enabled:          {}", yes_no(r.enabled));
    match &s.agent {
        Some(a) => println!(
            "Running:          yes (PID {}, since {})",
            a.pid,
            a.started_at.format("%Y-%m-%d %H:%M:%S UTC")
        ),
        None => println!("Running:          {}", yes_no(r.running)),
    }
    println!("Auto approve:     {}", yes_no(r.auto_approve));
    println!("Auto deny:        {}", yes_no(r.auto_deny));
    println!("Check interval:   {}s", r.check_interval);
    println!("Log level:        {}", r.log_level);
    println!("Focus prevention: {}", yes_no(r.focus_prevention));
    println!("Buttons:          {}", list_or(r.buttons.as_slice(), "(none)"));
    println!("Whitelist:        {}", list_or(&r.process_whitelist, "(all processes)"));
    println!("Blacklist:        {}", list_or(&r.process_blacklist, "(none)"));
    println!("Config:           {}", r.config_path.display());
}

fn list_or(items: &[String], empty: &str) -> String {
    if items.is_empty() {
        empty.to_string()
    } else {
        items.join(", ")
    }
}

fn cmd_configure(ctx: &Ctx, key: &str, value: &str) -> Result<()> {
    let config = ctx.agent.configure(key, value)?;
    let current = serde_json::to_value(&config)?
        .get(key)
        .cloned()
        .unwrap_or(serde_json::Value::Null);
    ctx.report(serde_json::json!({"key": key, "value": current}), |v| {
        println!("{} = {}", key, v["value"]);
    });
    Ok(())
}

fn cmd_permissions(ctx: &Ctx, request: bool) -> Result<()> {
    let trust = autoconfirm_core::accessibility_trust(request)?;
    ctx.report(trust, |t| {
        println!("Accessibility: {}", if t.trusted { "OK" } else { "DENIED" });
        if let Some(exe) = &t.executable {
            println!("Executable:    {}", exe.display());
        }
        if t.prompted {
            println!("\nApprove the system prompt, then run `autoconfirm start`");
        } else if !t.trusted {
            println!("\nRun with --request to request permissions");
        }
    });
    Ok(())
}

fn cmd_sweep(ctx: &Ctx) -> Result<()> {
    if let Some(agent) = PidFile::default_location()?.live()? {
        return Err(Error::new(
            ErrorCode::AlreadyRunning,
            format!("Agent (PID {}) is sweeping already", agent.pid),
        )
        .with_suggestions(vec!["Run `autoconfirm stop` first".to_string()])
        .into());
    }
    let report = ctx.agent.sweep_once()?;
    ctx.report(report, |r: &SweepReport| {
        if r.clicked.is_empty() {
            println!("No matching dialogs.");
        }
        for c in &r.clicked {
            println!("Clicked \"{}\" in {}", c.label, c.process);
        }
        if r.errors > 0 {
            println!("{} process(es) could not be probed, see the log", r.errors);
        }
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["autoconfirm", "status", "--json", "--config", "/tmp/c.json"])
            .unwrap();
        assert!(cli.json);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/c.json")));
        assert!(matches!(cli.command, Commands::Status));
    }

    #[test]
    fn configure_takes_key_and_value() {
        let cli = Cli::try_parse_from(["autoconfirm", "configure", "check_interval", "2"]).unwrap();
        match cli.command {
            Commands::Configure { key, value } => {
                assert_eq!(key, "check_interval");
                assert_eq!(value, "2");
            }
            _ => panic!("expected configure"),
        }
        assert!(Cli::try_parse_from(["autoconfirm", "configure", "check_interval"]).is_err());
    }

    #[test]
    fn only_loop_commands_log_to_stderr() {
        assert!(Commands::Daemon.is_long_running());
        assert!(Commands::Sweep.is_long_running());
        assert!(!Commands::Status.is_long_running());
    }

    #[test]
    fn level_read_without_rewriting() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        assert_eq!(configured_level(&path), LogLevel::Info);
        assert!(!path.exists());

        std::fs::write(&path, r#"{"log_level": "DEBUG"}"#).unwrap();
        assert_eq!(configured_level(&path), LogLevel::Debug);

        std::fs::write(&path, "{broken").unwrap();
        assert_eq!(configured_level(&path), LogLevel::Info);
    }

    #[cfg(unix)]
    #[test]
    fn daemon_blocked_by_live_agent_leaves_config_alone() {
        let dir = tempfile::tempdir().unwrap();
        let pidfile = PidFile::new(dir.path().join("agent.pid"));
        // pid 1 always exists and is never us
        std::fs::write(
            pidfile.path(),
            r#"{"pid": 1, "started_at": "2026-01-01T00:00:00Z"}"#,
        )
        .unwrap();
        let ctx = Ctx {
            json: true,
            agent: build_agent(ConfigStore::new(dir.path().join("config.json"))),
        };

        let err = run_agent(&ctx, &pidfile, true).unwrap_err();
        assert_eq!(err.downcast_ref::<Error>().unwrap().code, ErrorCode::AlreadyRunning);
        assert!(!ctx.agent.config().enabled);

        let on_disk = ConfigStore::new(dir.path().join("config.json")).load();
        assert!(!on_disk.enabled);
        assert!(pidfile.path().exists());
    }

    #[test]
    fn list_rendering() {
        assert_eq!(list_or(&[], "(none)"), "(none)");
        assert_eq!(list_or(&["a".into(), "b".into()], "(none)"), "a, b");
    }
}
