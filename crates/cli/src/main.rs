use clap::{Parser, Subcommand};
use macro_trade_core::ConfigLoader;
use macro_trade_execution::FailClosedRouter;
use macro_trade_orchestrator::TradingOrchestrator;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

mod sources;

use sources::{OfflineMacroSource, QuietNewsSource};

const STATUS_LOG_INTERVAL_SECS: u64 = 60;

#[derive(Parser)]
#[command(name = "macro-trade")]
#[command(about = "Macro-aware crypto trading decision engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the trading engine until ctrl-c
    Run {
        /// Config file path
        #[arg(short, long)]
        config: Option<String>,
        /// Override the traded symbol
        #[arg(short, long)]
        symbol: Option<String>,
        /// Route orders live instead of dry-run
        #[arg(long)]
        live: bool,
    },
    /// Print the effective configuration and exit
    ShowConfig {
        /// Config file path
        #[arg(short, long)]
        config: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    match cli.command {
        Commands::Run {
            config,
            symbol,
            live,
        } => run_engine(config.as_deref(), symbol, live).await,
        Commands::ShowConfig { config } => show_config(config.as_deref()),
    }
}

async fn run_engine(
    config_path: Option<&str>,
    symbol: Option<String>,
    live: bool,
) -> anyhow::Result<()> {
    let mut config = ConfigLoader::load(config_path)?;
    if let Some(symbol) = symbol {
        config.symbol = symbol;
    }
    if config.symbol.is_empty() {
        config.symbol = "BTCUSDT".to_string();
    }
    info!(symbol = %config.symbol, live, "starting macro-trade");

    let mut orchestrator = TradingOrchestrator::new(
        config,
        Arc::new(OfflineMacroSource),
        Arc::new(QuietNewsSource),
        Box::new(FailClosedRouter),
    );
    if live {
        orchestrator.enable_live_trading().await;
    }
    orchestrator.start()?;

    let mut status = tokio::time::interval(Duration::from_secs(STATUS_LOG_INTERVAL_SECS));
    status.tick().await;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown signal received");
                break;
            }
            _ = status.tick() => {
                log_status(&orchestrator).await;
            }
        }
    }

    orchestrator.shutdown();
    Ok(())
}

async fn log_status(orchestrator: &TradingOrchestrator) {
    if let Some(regime) = orchestrator.regime_status().await {
        info!(
            state = %regime.current_state,
            time_in_state_secs = regime.time_in_state_secs,
            "regime"
        );
    }
    let flow = orchestrator.capital_flow_status().await;
    info!(
        data_points = flow.data_points,
        ready = flow.ready,
        dropped_trades = orchestrator.dropped_trades(),
        "stream"
    );
    let summary = orchestrator.position_summary().await;
    info!(
        open = summary.open_positions,
        closed = summary.closed_positions,
        total_pnl = %summary.total_pnl,
        win_rate = summary.win_rate,
        dry_run = summary.dry_run,
        "positions"
    );
    let risk = orchestrator.risk_status().await;
    info!(
        balance = %risk.account_balance,
        daily_pnl = %risk.daily_pnl,
        daily_limit_hit = risk.daily_limit_hit,
        "risk"
    );
}

fn show_config(config_path: Option<&str>) -> anyhow::Result<()> {
    let config = ConfigLoader::load(config_path)?;
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}
