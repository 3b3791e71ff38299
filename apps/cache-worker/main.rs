#![warn(unused_extern_crates)]
use alchemy_arc::{
    ArcContext, ArcSettings, EventSource, Network, WalletSelection,
    wallet::{check_network, unlock_wallet},
};
use anyhow::{Context, Result, bail};
use cache_worker::{
    CacheWorker, Coordinator, PassOutcome, RangeOverride, RedisCoordinator, WorkerConfig,
    WorkerError,
};
use clap::Parser;
use dotenv::dotenv;
use std::{path::PathBuf, sync::Arc};
use tokio::{task::JoinHandle, time::Duration};
use tracing::{error, info, warn};
use utils::{
    errors::{ARC_NOT_INITIALIZED, REDIS_CONNECTION_FAILED},
    tracing::setup_tracing,
};

const WALLET_TIMEOUT: Duration = Duration::from_secs(30);

/// Replays DAOstack events into the cached Arc state snapshot.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// First block of the first pass, overriding the stored cursor.
    start_block: Option<u64>,

    /// Last block of the first pass, overriding the latest chain block.
    end_block: Option<u64>,

    #[arg(long, env = "REDIS_URL")]
    redis_url: String,

    /// Overrides `ARC_WEB3PROVIDER`.
    #[arg(long, env = "ETH_PROVIDER")]
    eth_provider: Option<String>,

    #[arg(long, env = "ETH_NETWORK_ID")]
    eth_network_id: Option<u64>,

    #[arg(long, env = "ETH_MNEMONIC", hide_env_values = true)]
    eth_mnemonic: Option<String>,

    #[arg(long, env = "arcjs_network", default_value = "ganache")]
    network: Network,

    #[arg(long, env = "CACHE_DIR", default_value = "/app/cache")]
    cache_dir: PathBuf,

    #[arg(long, env = "CACHE_INTERVAL_SECS", default_value_t = 60)]
    interval_secs: u64,

    #[arg(long, env = "CACHE_LOCK_TTL_SECS", default_value_t = 300)]
    lock_ttl_secs: u64,
}

async fn shutdown_signal() -> Result<&'static str> {
    let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        .context("Failed to install SIGTERM handler")?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for Ctrl+C")?;
            Ok("SIGINT")
        }
        _ = terminate.recv() => Ok("SIGTERM"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    setup_tracing();

    let args = Args::parse();
    info!(network = %args.network, "Cache worker starting up");

    let settings = ArcSettings::from_lookup(args.network, |key| match (key, &args.eth_provider) {
        ("ARC_WEB3PROVIDER", Some(provider)) => Some(provider.clone()),
        _ => std::env::var(key).ok(),
    })?;
    if let Some(chain_id) = args.eth_network_id {
        check_network(args.network, chain_id)?;
    }

    let wallet = match &args.eth_mnemonic {
        Some(phrase) => {
            let selection = WalletSelection::Mnemonic {
                phrase: phrase.clone(),
                index: 0,
            };
            Some(unlock_wallet(&selection, &settings, WALLET_TIMEOUT).await?)
        }
        None => None,
    };

    let context = ArcContext::new();
    if !context.initialize_arc(settings, wallet).await {
        bail!(ARC_NOT_INITIALIZED);
    }
    let source: Arc<dyn EventSource> = context.arc(args.network).await?;

    let coordinator: Arc<dyn Coordinator> = Arc::new(
        RedisCoordinator::connect(&args.redis_url, args.network)
            .await
            .context(REDIS_CONNECTION_FAILED)?,
    );

    let worker = Arc::new(CacheWorker::new(
        source,
        coordinator,
        WorkerConfig {
            network: args.network,
            cache_dir: args.cache_dir.clone(),
            lock_ttl: Duration::from_secs(args.lock_ttl_secs.max(1)),
        },
    ));

    let mut overrides = RangeOverride {
        start: args.start_block,
        end: args.end_block,
    };
    let interval = Duration::from_secs(args.interval_secs.max(1));

    let pass_worker = worker.clone();
    let mut passes: JoinHandle<Result<(), WorkerError>> = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            match pass_worker.update_cache(overrides).await {
                Ok(PassOutcome::Skipped) => {}
                Ok(PassOutcome::Completed(report)) => info!(
                    to_block = report.to,
                    actions = report.dispatched.len(),
                    "Snapshot updated"
                ),
                Err(err) => return Err(err),
            }
            // Command line blocks only bound the first pass.
            overrides = RangeOverride::default();
        }
    });

    let outcome = tokio::select! {
        result = &mut passes => match result {
            Ok(Err(err)) => Err(anyhow::Error::new(err).context("Cache pass failed")),
            Ok(Ok(())) => Ok(()),
            Err(join_error) => Err(anyhow::anyhow!("Cache pass task panicked: {join_error}")),
        },
        signal = shutdown_signal() => {
            let signal = signal?;
            warn!(signal, "Shutdown requested, releasing cache lease");
            passes.abort();
            worker.release_held_lease().await;
            Ok(())
        }
    };

    context.shutdown().await;
    if let Err(err) = &outcome {
        error!(error = %err, "Cache worker exiting");
    }
    outcome
}
