use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use spotbot::api::BinanceClient;
use spotbot::config::{BotConfig, Credentials, LoggingConfig};
use spotbot::execution::{MarketDataGateway, MonitorLoop, OrderGateway, PaperOrderGateway};
use spotbot::models::TradingPair;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "spotbot", version, about = "EMA crossover spot trading bot for Binance")]
struct Cli {
    /// Config file (defaults to ./spotbot.toml if present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Simulate orders instead of sending them
    #[arg(long)]
    dry_run: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Clone, Copy)]
enum Command {
    /// Run the monitor loop until Ctrl+C (default)
    Run,
    /// Print the current EMA pair and the decision it implies, without trading
    Signal,
    /// Print free balances for the configured pair
    Balance,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut config = BotConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if cli.dry_run {
        config.trading.dry_run = true;
    }

    setup_logging(&config.logging);

    let command = cli.command.unwrap_or(Command::Run);
    let pair = TradingPair::parse(&config.trading.pair)?;

    let credentials = Credentials::from_env(&config.exchange);
    if credentials.is_none() && (!config.trading.dry_run || matches!(command, Command::Balance)) {
        bail!(
            "{} / {} not set; export them or pass --dry-run",
            config.exchange.api_key_env,
            config.exchange.api_secret_env
        );
    }

    let client = Arc::new(BinanceClient::new(&config.exchange, credentials)?);
    if let Err(e) = client.sync_time().await {
        tracing::warn!("Clock sync failed ({}), using local time", e);
    }

    match command {
        Command::Run => run(config, pair, client).await,
        Command::Signal => signal(config, pair, client).await,
        Command::Balance => balance(pair, client).await,
    }
}

// ============================================================================
// Initialization Functions
// ============================================================================

fn setup_logging(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    if logging.json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .init();
    }
}

/// Live orders through Binance, or an in-memory paper gateway for dry runs
async fn build_order_gateway(
    config: &BotConfig,
    pair: &TradingPair,
    client: &Arc<BinanceClient>,
) -> anyhow::Result<Arc<dyn OrderGateway>> {
    if !config.trading.dry_run {
        let live: Arc<dyn OrderGateway> = client.clone();
        return Ok(live);
    }

    let starting_balance = if client.has_credentials() {
        client.free_balance(&pair.base).await.unwrap_or_else(|e| {
            tracing::warn!("Could not read {} balance for paper trading: {}", pair.base, e);
            Default::default()
        })
    } else {
        Default::default()
    };

    tracing::info!(
        "📝 Dry run: orders are simulated (starting {} balance: {})",
        pair.base,
        starting_balance
    );

    let paper: Arc<dyn OrderGateway> =
        Arc::new(PaperOrderGateway::new(pair.clone()).with_base_balance(starting_balance));
    Ok(paper)
}

// ============================================================================
// Commands
// ============================================================================

async fn run(config: BotConfig, pair: TradingPair, client: Arc<BinanceClient>) -> anyhow::Result<()> {
    let orders = build_order_gateway(&config, &pair, &client).await?;
    let market: Arc<dyn MarketDataGateway> = client;

    tracing::info!("\n📊 Configuration:");
    tracing::info!("  Pair: {} ({} / {})", pair, pair.base, pair.quote);
    tracing::info!("  Capital per buy: {} {}", config.trading.initial_capital, pair.quote);
    tracing::info!(
        "  EMA: {}/{} on {} x {} candles",
        config.trading.short_period,
        config.trading.long_period,
        config.trading.history_candle_count,
        config.trading.candle_interval
    );
    tracing::info!("  Interval: {}s", config.trading.interval_seconds);

    let monitor = MonitorLoop::start(config.trading.clone(), market, orders)
        .await
        .context("Failed to read initial position")?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut monitor_task = tokio::spawn(monitor.run(shutdown_rx));

    tracing::info!("Press Ctrl+C to stop...\n");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("⚠️  Received Ctrl+C, finishing current tick...");
            shutdown_tx.send(true).ok();
        }
        result = &mut monitor_task => {
            tracing::error!("Monitor loop exited unexpectedly: {:?}", result);
            return Ok(());
        }
    }

    let final_state = monitor_task.await.context("Monitor loop panicked")?;
    tracing::info!("👋 spotbot stopped, position {}", final_state);
    Ok(())
}

async fn signal(
    config: BotConfig,
    pair: TradingPair,
    client: Arc<BinanceClient>,
) -> anyhow::Result<()> {
    let orders: Arc<dyn OrderGateway> = if client.has_credentials() {
        client.clone() as Arc<dyn OrderGateway>
    } else {
        Arc::new(PaperOrderGateway::new(pair.clone()))
    };
    let market: Arc<dyn MarketDataGateway> = client;

    let monitor = MonitorLoop::start(config.trading.clone(), market, orders).await?;
    let (ema, prices) = monitor.signal().await?;

    let traded = monitor.controller().pair();
    println!("Pair:        {} ({} / {})", traded, traded.base, traded.quote);
    println!("Candles:     {} x {}", prices.len(), config.trading.candle_interval);
    println!("Last close:  {:.4}", prices.last().copied().unwrap_or_default());
    println!("EMA short:   {:.4} ({})", ema.short, config.trading.short_period);
    println!("EMA long:    {:.4} ({})", ema.long, config.trading.long_period);
    println!("Crossover:   {:?}", ema.crossover());
    println!("Position:    {}", monitor.state());

    match monitor.controller().decide(&ema) {
        Some(intent) => println!("Decision:    {} ({:?})", intent.side.as_str(), intent.amount),
        None => println!("Decision:    HOLD"),
    }

    Ok(())
}

async fn balance(pair: TradingPair, client: Arc<BinanceClient>) -> anyhow::Result<()> {
    let base = client.free_balance(&pair.base).await?;
    let quote = client.free_balance(&pair.quote).await?;

    println!("{:<6} {}", pair.base, base);
    println!("{:<6} {}", pair.quote, quote);
    Ok(())
}
