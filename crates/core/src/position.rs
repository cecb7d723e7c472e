use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionSide {
    Long,
    Short,
}

impl std::fmt::Display for PositionSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Long => write!(f, "LONG"),
            Self::Short => write!(f, "SHORT"),
        }
    }
}

/// Lifecycle status. Positions are never deleted; they transition to a
/// terminal status and form the trade history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionStatus {
    Pending,
    Open,
    Closed,
    Cancelled,
    Error,
}

/// An active or historical position. Created by the trade manager on
/// approved sizing and mutated only by it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub id: String,
    pub symbol: String,
    pub side: PositionSide,
    pub entry_price: Decimal,
    pub quantity: Decimal,
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
    pub status: PositionStatus,
    pub entry_time: DateTime<Utc>,
    pub exit_time: Option<DateTime<Utc>>,
    pub exit_price: Option<Decimal>,
    pub pnl: Decimal,
    pub pnl_percent: f64,
    pub signal_reason: String,
    pub order_ids: Vec<String>,
    pub error_message: Option<String>,
}

impl Position {
    #[must_use]
    pub const fn is_open(&self) -> bool {
        matches!(self.status, PositionStatus::Open)
    }

    #[must_use]
    pub fn notional(&self) -> Decimal {
        self.entry_price * self.quantity
    }
}
