use crate::latest::LatestValues;
use crate::poll::poll_with_retry;
use anyhow::Result;
use macro_trade_core::config::{AppConfig, SchedulerConfig};
use macro_trade_core::flow::{CapitalFlowSignal, FlowStatus};
use macro_trade_core::liquidity::LiquidityLevel;
use macro_trade_core::market::{Kline, OrderBook, Trade};
use macro_trade_core::position::Position;
use macro_trade_core::regime::{RegimeInput, RegimeOutput, RegimeState};
use macro_trade_core::signal::ExecutionSignal;
use macro_trade_core::traits::{MacroSource, NewsSignalSource, OrderRouter};
use macro_trade_execution::{
    ExecutionEngine, ExecutionStatus, ExitRequest, PositionSummary, RiskManager, RiskStatus,
    TradeManager,
};
use macro_trade_regime::{RegimeEngine, RegimeStatus};
use macro_trade_signals::{CapitalFlowAnalyzer, LiquidityEngine, LiquidityStatus, TrendAnalyzer};
use macro_trade_stream::{MarketStream, StreamHandle};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep};
use tracing::{debug, info, warn};

const CLOSE_QUEUE_CAPACITY: usize = 64;

/// Owns every engine and the background loops that feed them. Engines
/// sit behind their own locks; loops communicate through the latest-value
/// cache and the close channel, never by sharing engine references.
pub struct TradingOrchestrator {
    config: AppConfig,
    latest: Arc<LatestValues>,
    trend: Arc<Mutex<TrendAnalyzer>>,
    flow: Arc<Mutex<CapitalFlowAnalyzer>>,
    liquidity: Arc<Mutex<LiquidityEngine>>,
    regime: Arc<Mutex<RegimeEngine>>,
    execution: Arc<Mutex<ExecutionEngine>>,
    risk: Arc<Mutex<RiskManager>>,
    trades: Arc<Mutex<TradeManager>>,
    macro_source: Arc<dyn MacroSource>,
    news_source: Arc<dyn NewsSignalSource>,
    tasks: Vec<JoinHandle<()>>,
    stream_handle: Option<StreamHandle>,
    close_tx: Option<mpsc::Sender<ExitRequest>>,
}

impl TradingOrchestrator {
    #[must_use]
    pub fn new(
        config: AppConfig,
        macro_source: Arc<dyn MacroSource>,
        news_source: Arc<dyn NewsSignalSource>,
        router: Box<dyn OrderRouter>,
    ) -> Self {
        Self {
            trend: Arc::new(Mutex::new(TrendAnalyzer::new(config.trend.clone()))),
            flow: Arc::new(Mutex::new(CapitalFlowAnalyzer::new(config.flow.clone()))),
            liquidity: Arc::new(Mutex::new(LiquidityEngine::new(config.liquidity.clone()))),
            regime: Arc::new(Mutex::new(RegimeEngine::new(config.regime.clone()))),
            execution: Arc::new(Mutex::new(ExecutionEngine::new())),
            risk: Arc::new(Mutex::new(RiskManager::new(config.risk.clone()))),
            trades: Arc::new(Mutex::new(TradeManager::new(router))),
            latest: Arc::new(LatestValues::default()),
            macro_source,
            news_source,
            tasks: Vec::new(),
            stream_handle: None,
            close_tx: None,
            config,
        }
    }

    pub async fn enable_live_trading(&self) {
        self.trades.lock().await.enable_live_trading();
    }

    /// Connect the market stream and spawn all background loops.
    pub fn start(&mut self) -> Result<()> {
        if self.stream_handle.is_some() {
            anyhow::bail!("orchestrator already started");
        }
        info!(symbol = %self.config.symbol, "starting trading orchestrator");

        let stream = MarketStream::new(self.config.symbol.clone(), self.config.stream.clone());
        let book_rx = stream.subscribe_orderbook();
        let trade_rx = stream.subscribe_trades();
        let kline_rx = stream.subscribe_klines();
        self.stream_handle = Some(stream.start()?);

        let (close_tx, close_rx) = mpsc::channel(CLOSE_QUEUE_CAPACITY);
        self.close_tx = Some(close_tx.clone());

        self.tasks.push(tokio::spawn(run_book_consumer(
            book_rx,
            Arc::clone(&self.latest),
            Arc::clone(&self.liquidity),
        )));
        self.tasks.push(tokio::spawn(run_trade_consumer(
            trade_rx,
            Arc::clone(&self.latest),
            Arc::clone(&self.execution),
            Arc::clone(&self.trades),
            close_tx,
        )));
        self.tasks.push(tokio::spawn(run_kline_consumer(
            kline_rx,
            Arc::clone(&self.latest),
            Arc::clone(&self.liquidity),
            Arc::clone(&self.execution),
        )));
        self.tasks.push(tokio::spawn(run_macro_loop(
            self.config.scheduler.clone(),
            Arc::clone(&self.macro_source),
            Arc::clone(&self.trend),
            Arc::clone(&self.flow),
            Arc::clone(&self.latest),
        )));
        self.tasks.push(tokio::spawn(run_regime_loop(
            self.config.scheduler.clone(),
            Arc::clone(&self.news_source),
            Arc::clone(&self.trend),
            Arc::clone(&self.regime),
            Arc::clone(&self.latest),
        )));
        self.tasks.push(tokio::spawn(run_execution_loop(
            self.config.scheduler.clone(),
            self.config.symbol.clone(),
            Arc::clone(&self.latest),
            Arc::clone(&self.liquidity),
            Arc::clone(&self.execution),
            Arc::clone(&self.risk),
            Arc::clone(&self.trades),
        )));
        self.tasks.push(tokio::spawn(run_close_worker(
            close_rx,
            Arc::clone(&self.trades),
            Arc::clone(&self.risk),
            Arc::clone(&self.latest),
        )));
        Ok(())
    }

    /// Stop the stream and cancel every background loop.
    pub fn shutdown(&mut self) {
        info!("shutting down trading orchestrator");
        self.close_tx = None;
        if let Some(mut handle) = self.stream_handle.take() {
            handle.stop();
        }
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }

    pub async fn force_regime(&self, state: RegimeState, reason: impl Into<String>) {
        self.regime.lock().await.force_state(state, reason);
    }

    pub async fn latest_orderbook(&self) -> Option<OrderBook> {
        self.latest.orderbook().await
    }

    pub async fn latest_trade(&self) -> Option<Trade> {
        self.latest.trade().await
    }

    pub async fn latest_kline(&self) -> Option<Kline> {
        self.latest.kline().await
    }

    pub async fn latest_regime(&self) -> Option<RegimeOutput> {
        self.latest.regime().await
    }

    pub async fn regime_status(&self) -> Option<RegimeStatus> {
        self.latest.regime_status().await
    }

    pub async fn latest_capital_flow(&self) -> Option<CapitalFlowSignal> {
        self.latest.capital_flow().await
    }

    pub async fn capital_flow_status(&self) -> FlowStatus {
        self.flow.lock().await.status()
    }

    pub async fn liquidity_levels(&self) -> Vec<LiquidityLevel> {
        self.liquidity.lock().await.all_levels()
    }

    pub async fn liquidity_status(&self) -> Option<LiquidityStatus> {
        self.latest.liquidity_status().await
    }

    pub async fn latest_signal(&self) -> Option<ExecutionSignal> {
        self.latest.execution_signal().await
    }

    pub async fn execution_status(&self) -> Option<ExecutionStatus> {
        self.latest.execution_status().await
    }

    pub async fn risk_status(&self) -> RiskStatus {
        self.risk.lock().await.status()
    }

    pub async fn open_positions(&self) -> Vec<Position> {
        self.trades.lock().await.open_positions()
    }

    pub async fn closed_positions(&self) -> Vec<Position> {
        self.trades.lock().await.closed_positions()
    }

    pub async fn position_summary(&self) -> PositionSummary {
        self.trades.lock().await.summary()
    }

    /// Trades the stream evicted because a consumer fell behind. Zero
    /// before `start`.
    #[must_use]
    pub fn dropped_trades(&self) -> u64 {
        self.stream_handle
            .as_ref()
            .map_or(0, StreamHandle::dropped_trades)
    }
}

impl Drop for TradingOrchestrator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn run_book_consumer(
    mut rx: mpsc::Receiver<OrderBook>,
    latest: Arc<LatestValues>,
    liquidity: Arc<Mutex<LiquidityEngine>>,
) {
    while let Some(book) = rx.recv().await {
        {
            let mut liq = liquidity.lock().await;
            liq.update_orderbook_zones(&book);
            latest.set_liquidity_status(liq.status()).await;
        }
        latest.set_orderbook(book).await;
    }
    debug!("orderbook consumer stopped");
}

/// Feeds trade batches to the execution engine and scans stops and
/// targets at the latest price. Hits are scheduled on the close channel
/// so the price path never mutates positions itself.
async fn run_trade_consumer(
    mut rx: mpsc::Receiver<Vec<Trade>>,
    latest: Arc<LatestValues>,
    execution: Arc<Mutex<ExecutionEngine>>,
    trades: Arc<Mutex<TradeManager>>,
    close_tx: mpsc::Sender<ExitRequest>,
) {
    while let Some(batch) = rx.recv().await {
        let Some(last) = batch.last().cloned() else {
            continue;
        };
        {
            let mut engine = execution.lock().await;
            for trade in batch {
                engine.add_trade(trade);
            }
        }

        let exits = {
            let manager = trades.lock().await;
            let mut exits = manager.check_stop_loss(last.price);
            exits.extend(manager.check_take_profit(last.price));
            exits
        };
        for exit in exits {
            if close_tx.send(exit).await.is_err() {
                warn!("close worker gone, trade consumer stopping");
                return;
            }
        }

        latest.set_trade(last).await;
    }
    debug!("trade consumer stopped");
}

async fn run_kline_consumer(
    mut rx: mpsc::Receiver<Kline>,
    latest: Arc<LatestValues>,
    liquidity: Arc<Mutex<LiquidityEngine>>,
    execution: Arc<Mutex<ExecutionEngine>>,
) {
    while let Some(kline) = rx.recv().await {
        {
            let mut liq = liquidity.lock().await;
            liq.add_kline(kline.clone());
            latest.set_liquidity_status(liq.status()).await;
        }
        execution.lock().await.add_kline(kline.clone());
        latest.set_kline(kline).await;
    }
    debug!("kline consumer stopped");
}

/// Hourly-scale macro polling. Each indicator retries independently;
/// a cycle with no data leaves the histories untouched.
async fn run_macro_loop(
    scheduler: SchedulerConfig,
    source: Arc<dyn MacroSource>,
    trend: Arc<Mutex<TrendAnalyzer>>,
    flow: Arc<Mutex<CapitalFlowAnalyzer>>,
    latest: Arc<LatestValues>,
) {
    let base_delay = Duration::from_millis(scheduler.poll_retry_base_ms);
    let mut ticker = interval(Duration::from_secs(scheduler.macro_poll_secs.max(1)));
    loop {
        ticker.tick().await;

        let index_source = Arc::clone(&source);
        let index = poll_with_retry(scheduler.poll_retry_attempts, base_delay, move || {
            let source = Arc::clone(&index_source);
            async move { source.currency_index().await }
        })
        .await;
        if let Some(point) = index {
            trend.lock().await.add_index_point(point);
        }

        let dominance_source = Arc::clone(&source);
        let dominance = poll_with_retry(scheduler.poll_retry_attempts, base_delay, move || {
            let source = Arc::clone(&dominance_source);
            async move { source.market_dominance().await }
        })
        .await;
        if let Some(point) = dominance {
            trend.lock().await.add_dominance_point(point.clone());
            let mut analyzer = flow.lock().await;
            analyzer.add_data(point);
            latest.set_capital_flow(analyzer.analyze()).await;
        }
    }
}

/// Five-minute regime evaluation fed by trends and the news summary.
async fn run_regime_loop(
    scheduler: SchedulerConfig,
    news_source: Arc<dyn NewsSignalSource>,
    trend: Arc<Mutex<TrendAnalyzer>>,
    regime: Arc<Mutex<RegimeEngine>>,
    latest: Arc<LatestValues>,
) {
    sleep(Duration::from_secs(scheduler.regime_warmup_secs)).await;
    let base_delay = Duration::from_millis(scheduler.poll_retry_base_ms);
    let mut ticker = interval(Duration::from_secs(scheduler.regime_update_secs.max(1)));
    loop {
        ticker.tick().await;

        let source = Arc::clone(&news_source);
        let news = poll_with_retry(scheduler.poll_retry_attempts, base_delay, move || {
            let source = Arc::clone(&source);
            async move { source.latest_summary().await.map(Some) }
        })
        .await;

        let (index_trend, dominance_trend) = {
            let analyzer = trend.lock().await;
            (
                analyzer.analyze_index_trend(None),
                analyzer.analyze_dominance_trend(None),
            )
        };
        let input = RegimeInput {
            index_trend,
            dominance_trend,
            news,
        };
        let (output, status) = {
            let mut engine = regime.lock().await;
            let output = engine.update(&input);
            (output, engine.status())
        };
        latest.set_regime(output, status).await;
    }
}

/// Main decision loop. Missing inputs skip the cycle; an approved entry
/// opens a position and bumps the open count.
async fn run_execution_loop(
    scheduler: SchedulerConfig,
    symbol: String,
    latest: Arc<LatestValues>,
    liquidity: Arc<Mutex<LiquidityEngine>>,
    execution: Arc<Mutex<ExecutionEngine>>,
    risk: Arc<Mutex<RiskManager>>,
    trades: Arc<Mutex<TradeManager>>,
) {
    sleep(Duration::from_secs(scheduler.execution_warmup_secs)).await;
    let mut ticker = interval(Duration::from_secs(scheduler.execution_interval_secs.max(1)));
    loop {
        ticker.tick().await;

        let Some(trade) = latest.trade().await else {
            debug!("no trade data yet, skipping execution cycle");
            continue;
        };
        let price = trade.price;
        let levels = liquidity.lock().await.all_levels();
        let regime_output = latest.regime().await;
        let capital_flow = latest.capital_flow().await;

        let (signal, status) = {
            let mut engine = execution.lock().await;
            let signal = engine.generate_signal(
                price,
                regime_output.as_ref(),
                &levels,
                capital_flow.as_ref(),
            );
            (signal, engine.status())
        };
        latest.set_execution(signal.clone(), status).await;

        if signal.signal_type.is_entry() && signal.confidence >= scheduler.min_entry_confidence {
            let size = risk
                .lock()
                .await
                .calculate_position_size(&signal, regime_output.as_ref(), price);
            if size.approved {
                let opened = trades.lock().await.open_position(&signal, &size, &symbol).await;
                if let Some(position) = opened {
                    info!(id = %position.id, side = %position.side, "position opened");
                    risk.lock().await.increment_open_positions();
                }
            } else {
                info!(reason = ?size.rejection_reason, "entry rejected by risk checks");
            }
        }
        latest.set_risk_status(risk.lock().await.status()).await;
    }
}

/// Single owner of position closes. Consumes scheduled exits one at a
/// time so no two triggers ever race on the same position.
async fn run_close_worker(
    mut rx: mpsc::Receiver<ExitRequest>,
    trades: Arc<Mutex<TradeManager>>,
    risk: Arc<Mutex<RiskManager>>,
    latest: Arc<LatestValues>,
) {
    while let Some(exit) = rx.recv().await {
        let pnl = {
            let mut manager = trades.lock().await;
            if manager
                .close_position(&exit.position_id, exit.exit_price, &exit.reason)
                .await
            {
                manager
                    .closed_positions()
                    .into_iter()
                    .find(|p| p.id == exit.position_id)
                    .map(|p| p.pnl)
            } else {
                None
            }
        };
        if let Some(pnl) = pnl {
            let mut risk = risk.lock().await;
            risk.decrement_open_positions();
            risk.record_trade_result(pnl);
            latest.set_risk_status(risk.status()).await;
        }
    }
    debug!("close worker stopped");
}
