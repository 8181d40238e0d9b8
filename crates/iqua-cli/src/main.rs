//! iqua-poller - logs daily water usage from a myIQua water softener.
//!
//! Runs as a daemon by default: a background poller fetches the device
//! payload every `polling.min_minutes`..`polling.max_minutes` minutes and the
//! latest reading is logged every `--report-secs` seconds. `--once` fetches a
//! single reading and exits.
//!
//! Exit codes:
//! - 0: success (or clean Ctrl-C shutdown)
//! - 1: configuration error
//! - 2: network error
//! - 3: payload shape error
//! - 4: HTTP error
//! - 5: authentication error
//! - 70: internal error

mod exit;

use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use iqua_core::api::{build_http_client, IquaClient};
use iqua_core::config::{Config, ConfigError, Settings};
use iqua_core::models::WaterUsage;
use iqua_core::poller::{PollInterval, Poller};

use exit::Exit;

// ============================================================================
// Constants
// ============================================================================

const DEFAULT_LOG_FILE: &str = "water.log";

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Config file (default: ./config.toml, then the user config directory)
    #[arg(short, long, env = "IQUA_CONFIG")]
    config: Option<PathBuf>,

    /// Fetch a single reading, print it, and exit
    #[arg(long)]
    once: bool,

    /// Seconds between log lines reporting the latest reading
    #[arg(long, default_value_t = 30, value_parser = clap::value_parser!(u64).range(1..))]
    report_secs: u64,

    /// Poll every polling.min_minutes instead of a random interval up to max_minutes
    #[arg(long)]
    fixed: bool,

    /// Also append log output to this file
    #[arg(long, default_value = DEFAULT_LOG_FILE)]
    log_file: PathBuf,

    /// Log to stderr only
    #[arg(long)]
    no_log_file: bool,
}

/// Initialize the tracing subscriber for logging.
///
/// The returned guard flushes the file writer on drop and must be held
/// until the process exits.
fn init_tracing(log_file: Option<&Path>) -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let (file_layer, guard) = match log_file.map(file_appender) {
        Some(Ok(appender)) => {
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        Some(Err(e)) => {
            eprintln!("Warning: cannot open log file, logging to stderr only: {}", e);
            (None, None)
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

/// Appending, never-rotated file appender for `path`
fn file_appender(path: &Path) -> Result<RollingFileAppender> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| DEFAULT_LOG_FILE.to_string());

    RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(name)
        .build(dir)
        .with_context(|| format!("Failed to open {}", path.display()))
}

fn load_settings(path: Option<&Path>) -> Result<Settings, ConfigError> {
    let path = Config::resolve_path(path)?;
    info!(path = %path.display(), "Loading configuration");
    let mut config = Config::load(&path)?;
    config.apply_env();
    config.validate()
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let _guard = init_tracing((!cli.no_log_file).then_some(cli.log_file.as_path()));
    info!("iqua-poller starting");

    let exit = match run(cli).await {
        Ok(exit) => exit,
        Err(e) => {
            error!(error = %format!("{:#}", e), "Internal error");
            Exit::Internal
        }
    };

    info!(code = exit.code(), "iqua-poller shutting down");
    exit.into()
}

async fn run(cli: Cli) -> Result<Exit> {
    // Validate everything before the first request goes out
    let settings = match load_settings(cli.config.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            error!(error = %e, "Configuration error");
            return Ok(Exit::Config);
        }
    };

    // This process owns the connection pool; clients only hold clones of it
    let http = match build_http_client() {
        Ok(http) => http,
        Err(e) => {
            error!(error = %e, "Failed to create HTTP client");
            return Ok(Exit::for_api_error(&e));
        }
    };
    let client = settings.client(http);

    if cli.once {
        return Ok(run_once(client).await);
    }

    run_daemon(
        client,
        settings.poll_interval(cli.fixed),
        Duration::from_secs(cli.report_secs),
    )
    .await
}

/// Single fetch, mapped straight to an exit code
async fn run_once(mut client: IquaClient) -> Exit {
    let usage = match client.get_device_data().await {
        Ok(snapshot) => WaterUsage::from_snapshot(&snapshot),
        Err(e) => Err(e),
    };

    match usage {
        Ok(usage) => {
            info!("{}", usage);
            println!("{}", usage);
            Exit::Ok
        }
        Err(e) => {
            error!(error = %e, "Fetch failed");
            Exit::for_api_error(&e)
        }
    }
}

/// Background polling with periodic reporting until Ctrl-C
async fn run_daemon(client: IquaClient, interval: PollInterval, report_every: Duration) -> Result<Exit> {
    let poller = Poller::new(client, interval);
    poller.start().await;

    let mut report = tokio::time::interval(report_every);
    report.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    let exit = loop {
        tokio::select! {
            res = &mut shutdown => {
                res.context("Failed to listen for Ctrl-C")?;
                info!("Interrupted by user");
                break Exit::Ok;
            }
            _ = report.tick() => {
                let Some(snapshot) = poller.latest() else {
                    continue;
                };
                match WaterUsage::from_snapshot(&snapshot) {
                    Ok(usage) => info!("{}", usage),
                    Err(e) => {
                        // The API answered 200 with an unexpected shape; polling again won't help
                        error!(error = %e, "JSON error");
                        break Exit::for_api_error(&e);
                    }
                }
            }
        }
    };

    poller.stop().await;
    if exit != Exit::Ok {
        warn!(code = exit.code(), "Exiting after fatal error");
    }
    Ok(exit)
}
