//! Engram Daemon
//!
//! Serves the engram engine over newline-delimited JSON on stdin/stdout:
//! - Migrations run before the first request is read; failure exits with 1
//! - A background worker drains the capture queue
//! - Requests are handled concurrently; responses carry the request `id`
//! - Logs go to stderr so stdout stays reserved for responses

mod protocol;
mod server;
mod stdio;
mod tools;

use clap::{Parser, ValueEnum};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::BufReader;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use engram_core::{EngineConfig, EngineContext};

use crate::server::Server;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "engram-daemon", version, about = "Repository memory daemon")]
struct Args {
    /// Data directory (defaults to ENGRAM_DATA_DIR or the platform data dir)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

fn init_logging(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .with_ansi(false);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logging(args.log_format);

    info!("Engram daemon v{} starting...", engram_core::VERSION);

    let mut config = EngineConfig::from_env();
    if let Some(dir) = args.data_dir {
        config.data_dir = dir;
    }

    // Migration barrier: nothing is served until the schema is current
    let ctx = match EngineContext::open(config) {
        Ok(ctx) => Arc::new(ctx),
        Err(e) => {
            error!("Startup failed: {}", e);
            std::process::exit(1);
        }
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker = ctx.capture_worker();
    let capture_wake = worker.waker();
    let worker_handle = worker.spawn(shutdown_rx);

    let server = Arc::new(Server::new(ctx, capture_wake));
    info!("Serving requests on stdio");
    let served = stdio::serve(
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
        move |line| {
            let server = server.clone();
            async move { server.handle_line(&line).await }
        },
    )
    .await;

    let _ = shutdown_tx.send(true);
    let _ = worker_handle.await;

    if let Err(e) = served {
        error!("Server error: {:#}", e);
        std::process::exit(1);
    }
    info!("Engram daemon shutting down");
}
