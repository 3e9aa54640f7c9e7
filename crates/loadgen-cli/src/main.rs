//! txload - transaction load generator for a sharded ledger
//!
//! Sends value transfers from a set of funded accounts at a fixed rate per
//! worker, either against live nodes (`--endpoint`, repeatable, one or more
//! per shard) or against in-memory shards (`--simulate`).

use anyhow::{bail, Result};
use clap::Parser;
use ledger_client::{JsonRpcClient, LedgerClient, ShardDirectory};
use loadgen::{load_key_lines, LoadConfig, LoadRunner, SendMode};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod config;
mod simulate;

use simulate::Simulation;

/// Sharded ledger transaction load generator
#[derive(Parser, Debug)]
#[command(name = "txload")]
#[command(about = "Drive sustained transfer load against a sharded ledger", long_about = None)]
struct Args {
    /// Key file, one private key per line
    #[arg(short = 'f', long = "keyfile")]
    key_file: Option<PathBuf>,

    /// Transactions per second, per worker
    #[arg(long)]
    tps: Option<u32>,

    /// Print every send and status lookup
    #[arg(short, long)]
    debug: bool,

    /// Send mode: 1 probe-and-reuse, 2 fire-and-forget, 3 rotating full-drain
    #[arg(short, long)]
    mode: Option<SendMode>,

    /// Number of workers
    #[arg(short = 't', long = "threads")]
    workers: Option<usize>,

    /// Node RPC endpoint; the shard is discovered from the node
    #[arg(short, long = "endpoint", env = "TXLOAD_ENDPOINTS", value_delimiter = ',')]
    endpoints: Vec<String>,

    /// JSON config file; flags override its values
    #[arg(long)]
    config: Option<PathBuf>,

    /// Seconds between confirmation polls
    #[arg(long)]
    poll_interval_secs: Option<u64>,

    /// Seconds between release sweeps
    #[arg(long)]
    release_interval_secs: Option<u64>,

    /// Seconds an included transaction cools down before its funds are reused
    #[arg(long)]
    cool_down_secs: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Run against in-memory shards instead of live nodes
    #[arg(long)]
    simulate: bool,

    /// Balance credited to every key in simulation
    #[arg(long, default_value = "1000")]
    simulate_balance: u64,

    /// Keys generated in simulation when the key file does not exist
    #[arg(long, default_value = "100")]
    simulate_accounts: usize,

    /// Simulated block time in milliseconds
    #[arg(long, default_value = "1000")]
    block_time_ms: u64,
}

/// Config file first, then flags on top
fn build_config(args: &Args) -> Result<LoadConfig> {
    let mut config = match &args.config {
        Some(path) => config::load_file(path)?,
        None => LoadConfig::default(),
    };

    if let Some(path) = &args.key_file {
        config.key_file = path.clone();
    }
    if let Some(tps) = args.tps {
        config.tps_per_worker = tps;
    }
    if let Some(mode) = args.mode {
        config.mode = mode;
    }
    if let Some(workers) = args.workers {
        config.workers = workers;
    }
    if let Some(secs) = args.poll_interval_secs {
        config.poll_interval_secs = secs;
    }
    if let Some(secs) = args.release_interval_secs {
        config.release_interval_secs = secs;
    }
    if let Some(secs) = args.cool_down_secs {
        config.cool_down_secs = secs;
    }
    if !args.endpoints.is_empty() {
        config.endpoints = args.endpoints.clone();
    }
    config.debug |= args.debug;

    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = build_config(&args)?;

    // Initialize logging
    let default_level = if config.debug && args.log_level == "info" {
        "debug"
    } else {
        args.log_level.as_str()
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting txload");
    tracing::info!("  Mode: {}", config.mode);
    tracing::info!("  Workers: {}", config.workers);
    tracing::info!("  TPS per worker: {}", config.tps_per_worker);
    tracing::info!("  Key file: {:?}", config.key_file);

    let token = CancellationToken::new();

    let (directory, keys, sealer) = if args.simulate {
        let simulation = Arc::new(Simulation::new());
        let keys = if config.key_file.exists() {
            load_key_lines(&config.key_file)?
        } else {
            tracing::info!(
                "Key file not found, generating {} simulated accounts",
                args.simulate_accounts
            );
            simulate::generate_keys(args.simulate_accounts)
        };
        let funded = simulation.fund_keys(&keys, args.simulate_balance)?;
        tracing::info!("Simulating {} shards, {} funded accounts", simulation.ledgers.len(), funded);

        let sealer = tokio::spawn(
            simulation
                .clone()
                .seal_loop(Duration::from_millis(args.block_time_ms.max(1)), token.clone()),
        );
        (simulation.directory(), keys, Some(sealer))
    } else {
        if config.endpoints.is_empty() {
            bail!("at least one --endpoint is required (or use --simulate)");
        }
        let mut clients: Vec<Arc<dyn LedgerClient>> = Vec::with_capacity(config.endpoints.len());
        for endpoint in &config.endpoints {
            clients.push(Arc::new(JsonRpcClient::connect(endpoint, config.rpc_timeout())?));
        }
        let directory = ShardDirectory::discover(clients).await?;
        tracing::info!("Discovered shards {:?}", directory.shards());
        (directory, load_key_lines(&config.key_file)?, None)
    };

    let runner = LoadRunner::new(config, Arc::new(directory))?;
    let entries = runner.bootstrap(&keys).await?;
    let join = runner.start(entries, token.clone()).join();
    tokio::pin!(join);

    tracing::info!("Load running. Press Ctrl+C to stop.");

    let result = tokio::select! {
        result = &mut join => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutting down...");
            token.cancel();
            join.await
        }
    };

    token.cancel();
    if let Some(sealer) = sealer {
        if let Err(e) = sealer.await {
            tracing::error!("Block sealer failed: {}", e);
        }
    }

    let summary = result?;
    tracing::info!("Final stats: {}", serde_json::to_string(&summary.stats)?);
    tracing::info!(
        "{} entries still hold {} spendable",
        summary.remaining.len(),
        summary.remaining_spendable()
    );
    tracing::info!("txload stopped");

    Ok(())
}
