use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use corewatch::config::DEFAULT_CONFIG_PATH;
use corewatch::data::duration::parse_duration;
use corewatch::{report, AppContext, ConsoleConfig, InventorySource, WsConnector};

#[derive(Parser, Debug)]
#[command(name = "corewatch")]
#[command(about = "Live telemetry console for Multitasking worker-pool cores")]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Monitor server origin (e.g., "http://127.0.0.1:8080")
    #[arg(long)]
    origin: Option<String>,

    /// Heartbeat ping interval (e.g., "30s")
    #[arg(long)]
    ping_interval: Option<String>,

    /// Give up after this many consecutive failed reconnects
    #[arg(long)]
    max_reconnect_attempts: Option<u32>,

    /// JSON core listing in the /api/cores format, used instead of [cores]
    #[arg(long)]
    inventory: Option<PathBuf>,

    /// Report interval (e.g., "5s", "500ms")
    #[arg(short, long, default_value = "5s")]
    report: String,

    /// Print the last N log entries per core with each report
    #[arg(short, long, default_value = "0")]
    tail: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("corewatch=info")),
        )
        .init();

    let args = Args::parse();

    if !args.config.exists() {
        tracing::warn!(
            "Configuration file {} not found, using defaults",
            args.config.display()
        );
    }
    let mut config = ConsoleConfig::load(&args.config)?;

    // Command-line overrides
    if let Some(origin) = args.origin {
        config.connection.origin = origin;
    }
    if let Some(ref ping) = args.ping_interval {
        config.connection.ping_interval =
            parse_duration(ping).context("Invalid --ping-interval")?;
    }
    if args.max_reconnect_attempts.is_some() {
        config.connection.max_reconnect_attempts = args.max_reconnect_attempts;
    }
    config.validate()?;

    let report_every = parse_duration(&args.report).context("Invalid --report interval")?;
    anyhow::ensure!(!report_every.is_zero(), "--report interval must be greater than zero");

    let inventory = match args.inventory {
        Some(path) => InventorySource::Listing(path),
        None => InventorySource::ConfigFile(args.config.clone()),
    };

    let context = AppContext::start(&config, &inventory, Arc::new(WsConnector))?;
    context.spawn_inventory_refresh(inventory, config.liveness.inventory_refresh);

    let mut ticker = tokio::time::interval(report_every);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = ticker.tick() => print_report(&context, args.tail),
            result = &mut shutdown => {
                result.context("Failed to listen for Ctrl-C")?;
                break;
            }
        }
    }

    tracing::info!("Shutting down");
    context.shutdown().await;
    Ok(())
}

fn print_report(context: &AppContext, tail: usize) {
    let router = context.router();
    let aggregator = context.aggregator();
    let summaries = aggregator.summaries();

    println!(
        "{}",
        report::render(router.endpoint(), &router.connection_status(), &summaries)
    );

    if tail > 0 {
        for summary in &summaries {
            let entries = aggregator.tail_logs_for(&summary.name, tail);
            print!("{}", report::render_logs(&summary.name, &entries));
        }
    }
}
