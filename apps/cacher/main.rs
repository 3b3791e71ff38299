#![warn(unused_extern_crates)]
use anyhow::{Context, Result};
use clap::Parser;
use dotenv::dotenv;
use std::{net::SocketAddr, path::PathBuf};
use tracing::{info, warn};
use utils::tracing::setup_tracing;

/// Serves the cached Arc state snapshots over HTTP.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    #[arg(long, env = "PORT", default_value_t = 3002)]
    port: u16,

    #[arg(long, env = "CACHE_DIR", default_value = "/app/cache")]
    cache_dir: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    setup_tracing();

    let args = Args::parse();
    if !args.cache_dir.is_dir() {
        warn!(cache_dir = %args.cache_dir.display(), "Cache directory does not exist yet");
    }

    let listener = tokio::net::TcpListener::bind(SocketAddr::from(([0, 0, 0, 0], args.port)))
        .await
        .with_context(|| format!("Failed to bind port {}", args.port))?;
    let addr = listener.local_addr()?;
    info!(address = %addr, cache_dir = %args.cache_dir.display(), "Starting cache server");

    axum::serve(listener, cacher::router(args.cache_dir))
        .with_graceful_shutdown(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Shutting down cache server");
            }
        })
        .await
        .context("Cache server error")
}
