// SPDX-License-Identifier: MIT

use anyhow::{Context as _, Result};
use clap::Parser;
use reviewd::{config::DaemonConfig, scheduler, storage::Storage, AppContext};
use std::net::SocketAddr;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "reviewd",
    about = "reviewd — automated change-request review daemon",
    version
)]
struct Args {
    /// Path to the TOML config file (default: <data-dir>/reviewd.toml)
    #[arg(long, env = "REVIEWD_CONFIG")]
    config: Option<std::path::PathBuf>,

    /// Data directory for the SQLite database and default config
    #[arg(long, env = "REVIEWD_DATA_DIR", default_value = "data")]
    data_dir: std::path::PathBuf,

    /// HTTP port override (webhooks + API)
    #[arg(long, env = "REVIEWD_PORT")]
    port: Option<u16>,

    /// Log filter (trace, debug, info, warn, error)
    #[arg(long, env = "REVIEWD_LOG")]
    log: Option<String>,

    /// Write logs to this file path (rotated daily). Optional.
    #[arg(long, env = "REVIEWD_LOG_FILE")]
    log_file: Option<std::path::PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Keep the non-blocking writer guard alive for the process lifetime.
    let _log_guard = init_tracing(&args);

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| args.data_dir.join("reviewd.toml"));
    let mut config = DaemonConfig::load(&config_path);
    if let Some(port) = args.port {
        config.server.port = port;
    }

    let storage = Storage::new(&args.data_dir)
        .await
        .context("failed to open database")?;
    let ctx = AppContext::new(config, storage);

    let _workers = scheduler::start_workers(ctx.clone()).await;

    let bind = format!("{}:{}", ctx.config.server.bind_address, ctx.config.server.port);
    let addr: SocketAddr = bind.parse().context("invalid bind address")?;
    let router = ctx.router();

    info!(
        %addr,
        environment = ?ctx.config.environment,
        workers = ctx.config.scheduler.worker_concurrency,
        "reviewd listening"
    );
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("failed to bind listener")?;
    axum::serve(listener, router).await.context("server error")?;
    Ok(())
}

fn init_tracing(args: &Args) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = args
        .log
        .clone()
        .map(EnvFilter::new)
        .unwrap_or_else(|| EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")));

    if let Some(log_file) = &args.log_file {
        let dir = log_file.parent().unwrap_or(std::path::Path::new("."));
        let file_name = log_file
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "reviewd.log".to_string());
        let appender = tracing_appender::rolling::daily(dir, file_name);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(writer)
            .with_ansi(false)
            .init();
        Some(guard)
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
        None
    }
}
