use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Taker side of a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBookLevel {
    pub price: Decimal,
    pub quantity: Decimal,
}

/// Materialized top-N view of the order book. Bids are sorted descending,
/// asks ascending; zero-quantity levels are never present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderBook {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub bids: Vec<OrderBookLevel>,
    pub asks: Vec<OrderBookLevel>,
}

impl OrderBook {
    #[must_use]
    pub fn best_bid(&self) -> Option<&OrderBookLevel> {
        self.bids.first()
    }

    #[must_use]
    pub fn best_ask(&self) -> Option<&OrderBookLevel> {
        self.asks.first()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trade {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub price: Decimal,
    pub quantity: Decimal,
    pub side: Side,
}

/// A single OHLCV candle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Kline {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    pub timeframe: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    OneMinute,
    FiveMinute,
    FifteenMinute,
    OneHour,
    FourHour,
    OneDay,
}

impl Timeframe {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OneMinute => "1m",
            Self::FiveMinute => "5m",
            Self::FifteenMinute => "15m",
            Self::OneHour => "1h",
            Self::FourHour => "4h",
            Self::OneDay => "1d",
        }
    }
}

/// A single observation of a slow macro indicator (currency index,
/// market dominance), delivered by an external fetcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MacroPoint {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
    pub change_percent: Option<f64>,
    pub source: String,
}

/// Aggregate risk posture extracted from recent news.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskSignal {
    RiskOn,
    RiskOff,
    Neutral,
}

/// Whether macro and crypto news point the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NewsAlignment {
    Aligned,
    Decoupled,
    Neutral,
}

/// Pre-scored news summary produced by the external classifier on a
/// 5-minute-scale cadence. The engine never sees raw articles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsSignalSummary {
    pub news_count: usize,
    pub avg_sentiment: f64,
    pub risk_signal: RiskSignal,
    pub alignment: NewsAlignment,
    pub high_impact_count: usize,
}

impl Default for NewsSignalSummary {
    fn default() -> Self {
        Self {
            news_count: 0,
            avg_sentiment: 0.0,
            risk_signal: RiskSignal::Neutral,
            alignment: NewsAlignment::Neutral,
            high_impact_count: 0,
        }
    }
}
