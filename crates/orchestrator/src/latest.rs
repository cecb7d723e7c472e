use macro_trade_core::flow::CapitalFlowSignal;
use macro_trade_core::market::{Kline, OrderBook, Trade};
use macro_trade_core::regime::RegimeOutput;
use macro_trade_core::signal::ExecutionSignal;
use macro_trade_execution::{ExecutionStatus, RiskStatus};
use macro_trade_regime::RegimeStatus;
use macro_trade_signals::LiquidityStatus;
use tokio::sync::RwLock;

/// Latest materialized value per component. Getters hand out clones,
/// never references into the cache, so readers cannot race writers.
#[derive(Default)]
pub struct LatestValues {
    orderbook: RwLock<Option<OrderBook>>,
    trade: RwLock<Option<Trade>>,
    kline: RwLock<Option<Kline>>,
    regime: RwLock<Option<RegimeOutput>>,
    regime_status: RwLock<Option<RegimeStatus>>,
    capital_flow: RwLock<Option<CapitalFlowSignal>>,
    liquidity_status: RwLock<Option<LiquidityStatus>>,
    execution_signal: RwLock<Option<ExecutionSignal>>,
    execution_status: RwLock<Option<ExecutionStatus>>,
    risk_status: RwLock<Option<RiskStatus>>,
}

impl LatestValues {
    pub async fn set_orderbook(&self, book: OrderBook) {
        *self.orderbook.write().await = Some(book);
    }

    pub async fn orderbook(&self) -> Option<OrderBook> {
        self.orderbook.read().await.clone()
    }

    pub async fn set_trade(&self, trade: Trade) {
        *self.trade.write().await = Some(trade);
    }

    pub async fn trade(&self) -> Option<Trade> {
        self.trade.read().await.clone()
    }

    pub async fn set_kline(&self, kline: Kline) {
        *self.kline.write().await = Some(kline);
    }

    pub async fn kline(&self) -> Option<Kline> {
        self.kline.read().await.clone()
    }

    pub async fn set_regime(&self, output: RegimeOutput, status: RegimeStatus) {
        *self.regime.write().await = Some(output);
        *self.regime_status.write().await = Some(status);
    }

    pub async fn regime(&self) -> Option<RegimeOutput> {
        self.regime.read().await.clone()
    }

    pub async fn regime_status(&self) -> Option<RegimeStatus> {
        self.regime_status.read().await.clone()
    }

    pub async fn set_capital_flow(&self, signal: Option<CapitalFlowSignal>) {
        *self.capital_flow.write().await = signal;
    }

    pub async fn capital_flow(&self) -> Option<CapitalFlowSignal> {
        self.capital_flow.read().await.clone()
    }

    pub async fn set_liquidity_status(&self, status: LiquidityStatus) {
        *self.liquidity_status.write().await = Some(status);
    }

    pub async fn liquidity_status(&self) -> Option<LiquidityStatus> {
        self.liquidity_status.read().await.clone()
    }

    pub async fn set_execution(&self, signal: ExecutionSignal, status: ExecutionStatus) {
        *self.execution_signal.write().await = Some(signal);
        *self.execution_status.write().await = Some(status);
    }

    pub async fn execution_signal(&self) -> Option<ExecutionSignal> {
        self.execution_signal.read().await.clone()
    }

    pub async fn execution_status(&self) -> Option<ExecutionStatus> {
        self.execution_status.read().await.clone()
    }

    pub async fn set_risk_status(&self, status: RiskStatus) {
        *self.risk_status.write().await = Some(status);
    }

    pub async fn risk_status(&self) -> Option<RiskStatus> {
        self.risk_status.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use macro_trade_core::market::Side;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn empty_cache_returns_none() {
        let latest = LatestValues::default();
        assert!(latest.orderbook().await.is_none());
        assert!(latest.trade().await.is_none());
        assert!(latest.regime().await.is_none());
        assert!(latest.risk_status().await.is_none());
    }

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let latest = LatestValues::default();
        let trade = Trade {
            symbol: "BTCUSDT".to_string(),
            timestamp: Utc::now(),
            price: dec!(50000),
            quantity: dec!(0.5),
            side: Side::Buy,
        };
        latest.set_trade(trade.clone()).await;
        let cached = latest.trade().await.unwrap();
        assert_eq!(cached.price, trade.price);
        assert_eq!(cached.symbol, trade.symbol);
    }
}
