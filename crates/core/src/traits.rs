use crate::market::{Kline, MacroPoint, NewsSignalSummary, Side, Timeframe};
use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Producer of slow macro indicator points. Implementations live
/// outside the core (HTTP fetchers); `Ok(None)` means no fresh data
/// this cycle.
#[async_trait]
pub trait MacroSource: Send + Sync {
    async fn currency_index(&self) -> Result<Option<MacroPoint>>;
    async fn market_dominance(&self) -> Result<Option<MacroPoint>>;
}

/// Producer of the pre-scored news summary.
#[async_trait]
pub trait NewsSignalSource: Send + Sync {
    async fn latest_summary(&self) -> Result<NewsSignalSummary>;
}

/// On-demand historical klines for auxiliary bias analysis.
#[async_trait]
pub trait KlineHistorySource: Send + Sync {
    async fn klines(&self, symbol: &str, timeframe: Timeframe, limit: usize) -> Result<Vec<Kline>>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: Side,
    pub quantity: Decimal,
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderAck {
    pub order_id: String,
}

/// Exchange order submission boundary. Real routing (signing, REST
/// semantics) is out of scope; the provided implementation fails
/// closed so a misconfigured live mode can never place orders.
#[async_trait]
pub trait OrderRouter: Send + Sync {
    async fn submit_market_order(&self, order: &OrderRequest) -> Result<OrderAck>;
    async fn close_market(&self, symbol: &str, side: Side, quantity: Decimal) -> Result<OrderAck>;
}
