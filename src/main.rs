//! Raffle Arbitrage Engine - Main Entry Point
//!
//! Tracks a raffle season's holders, reads hybrid oracle prices and reports
//! raffle versus prediction-market price gaps. Can also quote and execute
//! curve trades through a relayer.

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use raffle_arbitrage::arbitrage::{ArbitrageDetector, DetectionOptions, DetectorSettings};
use raffle_arbitrage::common::channels::{create_feed_channel, create_shutdown_channel};
use raffle_arbitrage::common::traits::CurveStateSource;
use raffle_arbitrage::config::{load_config, AppConfig};
use raffle_arbitrage::curve::BondingCurve;
use raffle_arbitrage::flows::{
    limit_for_quote, ExecutorConfig, FlowExecutor, FlowStore, JsonDirFlowStore, TradeFlow,
};
use raffle_arbitrage::indexer::{IndexerRestClient, PositionFeedClient};
use raffle_arbitrage::ledger::{get_holders, HolderTracker, TrackerConfig};
use raffle_arbitrage::oracle::{track_markets, HybridOracleReader, ReaderConfig};
use raffle_arbitrage::relayer::RelayerClient;
use raffle_arbitrage::TradeSide;

/// CLI arguments for the application
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the holder tracker, oracle poller and arbitrage scanner until Ctrl-C
    Watch,
    /// Print the current holders and their win probabilities
    Holders,
    /// Quote a curve trade at current supply
    Quote {
        #[arg(value_enum)]
        side: SideArg,
        tickets: u64,
        /// Slippage tolerance for the printed limit
        #[arg(long)]
        slippage_bps: Option<u32>,
    },
    /// Read the hybrid oracle price for a market
    Oracle { market_id: String },
    /// Run one arbitrage detection cycle
    Scan {
        #[arg(long)]
        min_profitability_bps: Option<u32>,
        #[arg(long)]
        max_results: Option<usize>,
    },
    /// Buy tickets through the relayer
    Buy {
        tickets: u64,
        /// Maximum total cost in the smallest settlement unit; quoted if omitted
        #[arg(long)]
        max_cost: Option<u128>,
    },
    /// Sell tickets through the relayer
    Sell {
        tickets: u64,
        /// Minimum proceeds in the smallest settlement unit; quoted if omitted
        #[arg(long)]
        min_proceeds: Option<u128>,
    },
    /// Resume a persisted trade flow
    Resume {
        id: Uuid,
        /// Reset a failed flow and send the failed step again
        #[arg(long)]
        retry: bool,
    },
    /// List persisted trade flows
    Flows,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum SideArg {
    Buy,
    Sell,
}

impl From<SideArg> for TradeSide {
    fn from(side: SideArg) -> Self {
        match side {
            SideArg::Buy => TradeSide::Buy,
            SideArg::Sell => TradeSide::Sell,
        }
    }
}

fn init_logging(level: &str, json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    let installed = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| anyhow!("failed to install tracing subscriber: {}", e))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level, args.log_json)?;

    let config = load_config(Some(&args.config)).context("loading configuration")?;
    info!(config = %args.config, season = config.season.season_id, "Configuration loaded");

    let indexer = Arc::new(IndexerRestClient::with_timeout(
        &config.indexer.rest_url,
        Duration::from_secs(config.settings.request_timeout_seconds),
    )?);

    match args.command {
        Command::Watch => watch_all(&config, indexer).await,
        Command::Holders => {
            require_curve(&config)?;
            let holders = get_holders(indexer.as_ref(), &TrackerConfig::from_app(&config)).await?;
            print_json(&holders)
        }
        Command::Quote {
            side,
            tickets,
            slippage_bps,
        } => {
            require_curve(&config)?;
            let state = indexer.curve_state(&config.season.curve_address).await?;
            let curve = BondingCurve::from_state(&state)?;
            let quote = match TradeSide::from(side) {
                TradeSide::Buy => curve.quote_buy(state.supply, tickets)?,
                TradeSide::Sell => curve.quote_sell(state.supply, tickets)?,
            };
            let slippage = slippage_bps.unwrap_or(config.flows.slippage_bps);
            print_json(&serde_json::json!({
                "supply": state.supply,
                "remainingCapacity": curve.remaining_capacity(state.supply),
                "quote": quote,
                "slippageBps": slippage,
                "limit": limit_for_quote(&quote, slippage)?.to_string(),
            }))
        }
        Command::Oracle { market_id } => {
            let reader = HybridOracleReader::new(indexer, ReaderConfig::from(&config.oracle));
            print_json(&reader.read_hybrid_price(&market_id).await?)
        }
        Command::Scan {
            min_profitability_bps,
            max_results,
        } => {
            require_curve(&config)?;
            let mut options = DetectionOptions::from(&config.detector);
            if let Some(bps) = min_profitability_bps {
                options.min_profitability_bps = bps;
            }
            if let Some(n) = max_results {
                options.max_results = n;
            }
            let detector = build_detector(&config, indexer)?;
            let report = detector
                .get_arbitrage_opportunities(
                    config.season.season_id,
                    &config.season.curve_address,
                    options,
                )
                .await?;
            print_json(&report)
        }
        Command::Buy { tickets, max_cost } => {
            trade(&config, indexer, TradeSide::Buy, tickets, max_cost).await
        }
        Command::Sell {
            tickets,
            min_proceeds,
        } => trade(&config, indexer, TradeSide::Sell, tickets, min_proceeds).await,
        Command::Resume { id, retry } => {
            let executor = build_executor(&config).await?;
            let flow = if retry {
                executor.retry(id).await?
            } else {
                executor.run(id).await?
            };
            print_json(&flow)
        }
        Command::Flows => {
            let store = JsonDirFlowStore::open(&config.flows.state_dir).await?;
            print_json(&store.list().await?)
        }
    }
}

fn require_curve(config: &AppConfig) -> Result<()> {
    if config.season.curve_address.is_empty() {
        return Err(anyhow!(
            "season.curve_address is not set (APP__SEASON__CURVE_ADDRESS)"
        ));
    }
    Ok(())
}

fn build_detector(
    config: &AppConfig,
    indexer: Arc<IndexerRestClient>,
) -> Result<ArbitrageDetector<IndexerRestClient, IndexerRestClient, IndexerRestClient>> {
    let reader = Arc::new(HybridOracleReader::new(
        indexer.clone(),
        ReaderConfig::from(&config.oracle),
    ));
    Ok(ArbitrageDetector::new(
        indexer.clone(),
        reader,
        indexer,
        DetectorSettings::from(&config.detector),
    )?)
}

async fn build_executor(
    config: &AppConfig,
) -> Result<FlowExecutor<RelayerClient, JsonDirFlowStore>> {
    let relayer_config = config
        .relayer
        .as_ref()
        .ok_or_else(|| anyhow!("relayer is not configured"))?;
    let relayer = RelayerClient::new(
        relayer_config,
        Duration::from_secs(config.settings.request_timeout_seconds),
    )?;
    let store = JsonDirFlowStore::open(&config.flows.state_dir).await?;
    Ok(FlowExecutor::new(
        Arc::new(relayer),
        Arc::new(store),
        ExecutorConfig::from(&config.flows),
    ))
}

async fn trade(
    config: &AppConfig,
    indexer: Arc<IndexerRestClient>,
    side: TradeSide,
    tickets: u64,
    limit: Option<u128>,
) -> Result<()> {
    require_curve(config)?;
    let executor = build_executor(config).await?;
    let account = config
        .relayer
        .as_ref()
        .map(|r| r.account.clone())
        .unwrap_or_default();

    let limit = match limit {
        Some(limit) => limit,
        None => {
            let state = indexer.curve_state(&config.season.curve_address).await?;
            let curve = BondingCurve::from_state(&state)?;
            let quote = match side {
                TradeSide::Buy => curve.quote_buy(state.supply, tickets)?,
                TradeSide::Sell => curve.quote_sell(state.supply, tickets)?,
            };
            limit_for_quote(&quote, config.flows.slippage_bps)?
        }
    };

    let flow: TradeFlow = executor
        .create(
            side,
            config.season.season_id,
            &config.season.curve_address,
            &account,
            tickets,
            limit,
        )
        .await?;
    info!(flow = %flow.id, "Running trade flow");

    match executor.run(flow.id).await {
        Ok(flow) => print_json(&flow),
        Err(e) => {
            error!(flow = %flow.id, "Flow interrupted: {}", e);
            Err(anyhow!(
                "flow {} stopped: {} (resume with `resume {}`)",
                flow.id,
                e,
                flow.id
            ))
        }
    }
}

async fn watch_all(config: &AppConfig, indexer: Arc<IndexerRestClient>) -> Result<()> {
    require_curve(config)?;
    let (shutdown_tx, shutdown_rx) = create_shutdown_channel();

    // Holder ledger, optionally fed by the live position feed
    let tracker = HolderTracker::new(indexer.clone(), TrackerConfig::from_app(config));
    let ledger_rx = tracker.subscribe();
    let feed_rx = match PositionFeedClient::from_config(config) {
        Some(feed) => {
            let (feed_tx, feed_rx) = create_feed_channel();
            let shutdown = shutdown_rx.clone();
            tokio::spawn(async move {
                if let Err(e) = feed.run(feed_tx, shutdown).await {
                    warn!("Position feed stopped, continuing with polling only: {}", e);
                }
            });
            Some(feed_rx)
        }
        None => None,
    };
    let tracker_task = tokio::spawn(tracker.run(feed_rx, shutdown_rx.clone()));

    // Oracle cache warmer over the season's active markets
    let reader = Arc::new(HybridOracleReader::new(
        indexer.clone(),
        ReaderConfig::from(&config.oracle),
    ));
    let (markets_tx, markets_rx) = watch::channel(Vec::new());
    tokio::spawn(track_markets(
        indexer.clone(),
        config.season.season_id,
        markets_tx,
        Duration::from_secs(config.polling.curve_interval_seconds),
        shutdown_rx.clone(),
    ));
    tokio::spawn(reader.clone().run(
        markets_rx,
        Duration::from_secs(config.polling.oracle_interval_seconds),
        shutdown_rx.clone(),
    ));

    // Arbitrage scanner
    let detector = Arc::new(
        ArbitrageDetector::new(
            indexer.clone(),
            reader,
            indexer.clone(),
            DetectorSettings::from(&config.detector),
        )?
        .with_ledger(ledger_rx),
    );
    let mut reports = detector.subscribe();
    tokio::spawn(detector.run(
        config.season.season_id,
        config.season.curve_address.clone(),
        DetectionOptions::from(&config.detector),
        Duration::from_secs(config.polling.curve_interval_seconds),
        shutdown_rx.clone(),
    ));

    info!("Watching season {}", config.season.season_id);
    loop {
        tokio::select! {
            changed = reports.changed() => {
                if changed.is_err() {
                    break;
                }
                let report = reports.borrow_and_update().clone();
                if let Some(report) = report {
                    for opp in &report.opportunities {
                        info!(
                            market = %opp.market_id,
                            player = %opp.player,
                            direction = %opp.direction,
                            profitability = %opp.profitability,
                            "Arbitrage opportunity"
                        );
                    }
                    if !report.live {
                        warn!(failed = report.failed_markets.len(), "Detection ran on partial data");
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal, cleaning up...");
                break;
            }
        }
    }

    let _ = shutdown_tx.send(true);
    match tracker_task.await {
        Ok(Err(e)) => error!("Holder tracker failed: {}", e),
        Err(e) => error!("Holder tracker panicked: {}", e),
        Ok(Ok(())) => {}
    }
    Ok(())
}
