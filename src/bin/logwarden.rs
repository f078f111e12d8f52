//! logwarden CLI
//!
//! `watch` tails a log file and runs remediation callbacks for known failure
//! markers. `scan` prints one windowed read with the trigger each line
//! resolves to.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{Duration as ChronoDuration, Local};
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};

use logwarden::{
    discard_older_than, logging, CallbackError, InvocationContext, Monitor, SharedCallback,
    SystemClock, TriggerRegistry, WardenConfig, WindowedReader,
};

#[derive(Parser, Debug)]
#[command(
    name = "logwarden",
    version,
    about = "Tail an application log and react to known failures"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Watch the log file until interrupted
    Watch(WatchArgs),
    /// Print the entries of one windowed read, oldest first
    Scan(ScanArgs),
}

#[derive(Args, Debug)]
struct SourceArgs {
    /// Log file to read (overrides `log_path` in the config file)
    #[arg(long, short = 'l', env = "LOGWARDEN_LOG_FILE")]
    log_file: Option<PathBuf>,

    /// TOML config file
    #[arg(long, short = 'c', env = "LOGWARDEN_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct WatchArgs {
    #[command(flatten)]
    source: SourceArgs,

    /// Application data directory handed to remediation actions
    #[arg(long)]
    app_dir: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct ScanArgs {
    #[command(flatten)]
    source: SourceArgs,

    /// Emit one JSON object per line
    #[arg(long)]
    json: bool,

    /// Only show entries from the last N hours
    #[arg(long)]
    hours: Option<u32>,
}

fn main() -> Result<()> {
    logging::init();
    let cli = Cli::parse();

    match cli.command {
        Command::Watch(args) => watch(args),
        Command::Scan(args) => scan(args),
    }
}

fn load_config(source: &SourceArgs) -> Result<WardenConfig> {
    let mut config = match &source.config {
        Some(path) => WardenConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => WardenConfig::default(),
    };
    if let Some(log_file) = &source.log_file {
        config.log_path = Some(log_file.clone());
    }
    Ok(config)
}

fn watch(args: WatchArgs) -> Result<()> {
    let mut config = load_config(&args.source)?;
    if let Some(app_dir) = args.app_dir {
        config.app_dir = Some(app_dir);
    }

    let monitor_config = config.monitor_config().context("Invalid configuration")?;
    let registry = Arc::new(config.build_registry().context("Invalid trigger definitions")?);
    bind_remediation_actions(&registry)?;

    let handle = Monitor::new(monitor_config, Arc::clone(&registry))
        .spawn()
        .context("Failed to start monitor")?;

    let cancel = handle.cancel_token();
    ctrlc::set_handler(move || {
        cancel.cancel();
    })
    .context("Failed to set Ctrl+C handler")?;

    let state = handle.join().context("Monitor exited abnormally")?;
    info!(
        phase = %state.phase,
        last_seen = ?state.last_seen_entry.as_ref().map(|e| e.timestamp()),
        "shutdown complete"
    );
    Ok(())
}

/// Binds a log-only action to every trigger. Real remediation is supplied by
/// the embedding service.
fn bind_remediation_actions(registry: &TriggerRegistry) -> Result<()> {
    let bindings: Vec<(String, SharedCallback)> = registry
        .triggers()
        .iter()
        .map(|t| (t.name().to_string(), log_only_action(remediation_for(t.name()))))
        .collect();
    registry
        .register_many(bindings)
        .context("Failed to bind remediation actions")?;
    Ok(())
}

fn remediation_for(trigger: &str) -> &'static str {
    match trigger {
        "FAILED_GET_REFERENCE_TABLES" => "stop the application and clear the reference-table store",
        "FAILED_GET_DEVICE_INFO" => {
            "stop the application and clear device info, cookies and the service worker"
        }
        "CORRUPT_SCHEMA" | "STORES_NOT_CORRECTLY_SET_UP" => {
            "stop the application and reset its data directory"
        }
        _ => "no remediation configured",
    }
}

fn log_only_action(action: &'static str) -> SharedCallback {
    Arc::new(move |ctx: &InvocationContext| -> Result<(), CallbackError> {
        warn!(
            trigger = %ctx.trigger,
            app_dir = ?ctx.app_dir,
            entry = %ctx.entry,
            action,
            "remediation requested"
        );
        Ok(())
    })
}

fn scan(args: ScanArgs) -> Result<()> {
    let config = load_config(&args.source)?;
    let log_path = config
        .log_path
        .clone()
        .context("No log file given (use --log-file or log_path in the config)")?;
    let registry = config.build_registry().context("Invalid trigger definitions")?;

    let reader = WindowedReader::new(config.window(), Arc::new(SystemClock));
    let mut entries = reader
        .read(&log_path)
        .with_context(|| format!("Failed to read {}", log_path.display()))?;
    if let Some(hours) = args.hours {
        let cutoff = Local::now().naive_local() - ChronoDuration::hours(i64::from(hours));
        entries = discard_older_than(entries, cutoff);
    }

    for entry in entries.iter().rev() {
        let trigger = registry.resolve(entry.message());
        if args.json {
            let line = serde_json::json!({ "trigger": trigger.name(), "entry": entry });
            println!("{line}");
        } else {
            println!("{:<28} {entry}", trigger.name());
        }
    }
    Ok(())
}
