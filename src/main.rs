#![forbid(unsafe_code)]

//! `session-board`: session registry server binary.
//!
//! Bootstraps configuration, then runs the control API, the resource
//! monitor and the purge sweep until ctrl-c or SIGTERM.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use session_board::api::{server, AppState};
use session_board::orchestrator::monitor::{self, MonitorConfig, ResourceMonitor};
use session_board::orchestrator::process::SysinfoProbe;
use session_board::store::{retention, SessionStore};
use session_board::{AppError, GlobalConfig, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "session-board", about = "Live board for long-running CLI sessions", version, long_about = None)]
struct Cli {
    /// Path to an optional TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the control API bind host.
    #[arg(long)]
    host: Option<String>,

    /// Override the control API port.
    #[arg(long)]
    port: Option<u16>,

    /// Disable startup auto-discovery of untracked sessions.
    #[arg(long)]
    no_discover: bool,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("session-board bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(run(args))
}

fn load_config(args: &Cli) -> Result<GlobalConfig> {
    let mut config = match &args.config {
        Some(path) => GlobalConfig::load_from_path(path)?,
        None => GlobalConfig::default(),
    };

    if let Some(host) = &args.host {
        config.http_host.clone_from(host);
    }
    if let Some(port) = args.port {
        config.http_port = port;
    }
    if args.no_discover {
        config.auto_discover = false;
    }
    config.validate()?;
    Ok(config)
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let config = Arc::new(load_config(&args)?);
    info!(
        bind = %config.bind_address(),
        cpu_threshold = config.cpu_threshold_percent,
        sample_interval_seconds = config.sample_interval_seconds,
        retention_seconds = config.retention_seconds,
        tracked_cli = %config.tracked_cli,
        "configuration loaded"
    );

    // ── Shared registry ─────────────────────────────────
    let store = Arc::new(SessionStore::new());
    let ct = CancellationToken::new();

    // ── Start background tasks ──────────────────────────
    let monitor_handle = monitor::spawn_resource_monitor(
        ResourceMonitor::new(
            Arc::clone(&store),
            SysinfoProbe::new(),
            MonitorConfig::from_global(&config),
        ),
        config.sample_interval(),
        ct.clone(),
    );
    info!("resource monitor started");

    let purge_handle = retention::spawn_purge_task(
        Arc::clone(&store),
        config.retention(),
        config.purge_interval(),
        ct.clone(),
    );
    info!("purge task started");

    // ── Start control API ───────────────────────────────
    let state = Arc::new(AppState::new(Arc::clone(&config), Arc::clone(&store)));
    let api_ct = ct.clone();
    let api_handle = tokio::spawn(async move {
        if let Err(err) = server::serve_http(state, api_ct.clone()).await {
            error!(%err, "control API failed");
            api_ct.cancel();
        }
    });

    info!("session board ready");

    // ── Wait for shutdown ───────────────────────────────
    tokio::select! {
        () = shutdown_signal() => info!("shutdown signal received"),
        () = ct.cancelled() => info!("background task requested shutdown"),
    }
    ct.cancel();

    let (api, monitor, purge) = tokio::join!(api_handle, monitor_handle, purge_handle);
    for (task, joined) in [("control API", api), ("resource monitor", monitor), ("purge", purge)] {
        if let Err(err) = joined {
            error!(task, %err, "background task ended abnormally");
        }
    }
    info!(sessions = store.len(), "session-board shut down");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                tracing::warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
