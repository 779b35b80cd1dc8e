use anyhow::Result;
use clap::Parser;
use qbrr_daemon::config::{load_config, ConfigOverrides};
use qbrr_daemon::{execute, Options, QbitSession, TransferSession};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, reload, EnvFilter, Registry};

#[derive(Parser, Debug)]
#[command(name = "qbrr")]
#[command(about = "qBittorrent reannouncement tool", long_about = None)]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// qBittorrent WebUI URL
    #[arg(long)]
    host: Option<String>,

    /// qBittorrent WebUI username
    #[arg(long)]
    username: Option<String>,

    /// Maximum age of a torrent in seconds to reannounce
    #[arg(long, value_name = "SECS")]
    max_age: Option<i64>,

    /// Maximum number of reannounce attempts per torrent
    #[arg(long)]
    max_attempts: Option<u32>,

    /// Interval between reannounce checks in seconds
    #[arg(long, value_name = "SECS")]
    interval: Option<u64>,

    /// Specific torrent hash to reannounce (single run mode)
    #[arg(long)]
    hash: Option<String>,
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            host: self.host.clone(),
            username: self.username.clone(),
            log_level: self.log_level.clone(),
            max_age_secs: self.max_age,
            max_attempts: self.max_attempts,
            interval_secs: self.interval,
            hash: self.hash.clone(),
        }
    }
}

type FilterHandle = reload::Handle<EnvFilter, Registry>;

fn level_filter(level: &str) -> EnvFilter {
    let level = match level {
        "debug" | "info" | "warn" | "error" => level,
        _ => "info",
    };
    EnvFilter::new(level)
}

/// Install the global subscriber before anything else can log.
///
/// `RUST_LOG` wins over `level` when set. The returned handle swaps the
/// filter once the configured level is known.
fn init_logging(level: Option<&str>) -> FilterHandle {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| level_filter(level.unwrap_or("info")));
    let (filter, handle) = reload::Layer::new(filter);

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_level(true),
        )
        .init();

    handle
}

/// Switch to the level from the loaded configuration unless `RUST_LOG` is set
fn apply_config_level(handle: &FilterHandle, level: &str) {
    if std::env::var_os("RUST_LOG").is_some() {
        return;
    }
    if let Err(e) = handle.reload(level_filter(level)) {
        warn!("Failed to apply log level {}: {}", level, e);
    }
}

/// Cancel the token on the first SIGINT or SIGTERM
fn spawn_signal_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        let signal = wait_for_signal().await;
        info!("Received signal, shutting down: {}", signal);
        cancel.cancel();
    });
}

#[cfg(unix)]
async fn wait_for_signal() -> &'static str {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => tokio::select! {
            _ = tokio::signal::ctrl_c() => "SIGINT",
            _ = sigterm.recv() => "SIGTERM",
        },
        Err(e) => {
            error!("Failed to install SIGTERM handler: {}", e);
            let _ = tokio::signal::ctrl_c().await;
            "SIGINT"
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> &'static str {
    let _ = tokio::signal::ctrl_c().await;
    "ctrl-c"
}

async fn run(args: Args) -> Result<()> {
    let logging = init_logging(args.log_level.as_deref());

    let overrides = args.overrides();
    let config = load_config(args.config.as_deref(), &overrides)?;
    apply_config_level(&logging, &config.log_level);

    info!("qBittorrent reannouncer v{}", env!("CARGO_PKG_VERSION"));
    info!("qBittorrent host: {}", config.host);

    let session = QbitSession::from_config(&config)?;
    session
        .login()
        .await
        .map_err(|e| anyhow::anyhow!("failed to authenticate with qBittorrent: {}", e))?;

    let options = Options::from_config(&config);

    let cancel = CancellationToken::new();
    spawn_signal_handler(cancel.clone());

    let session: Arc<dyn TransferSession> = Arc::new(session);
    execute(session, &options, cancel).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Failed to execute command: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
