use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalType {
    EntryLong,
    EntryShort,
    ExitLong,
    ExitShort,
    NoSignal,
}

impl SignalType {
    #[must_use]
    pub const fn is_entry(self) -> bool {
        matches!(self, Self::EntryLong | Self::EntryShort)
    }
}

/// A trade instruction candidate emitted by the execution engine.
/// At most one is produced per evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionSignal {
    pub signal_type: SignalType,
    pub timestamp: DateTime<Utc>,
    pub price: Decimal,
    pub confidence: f64,
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
    pub reason: String,
    pub supporting_factors: Vec<String>,
}

impl ExecutionSignal {
    /// A neutral signal carrying the evaluation price and a reason.
    #[must_use]
    pub fn none(price: Decimal, reason: impl Into<String>) -> Self {
        Self {
            signal_type: SignalType::NoSignal,
            timestamp: Utc::now(),
            price,
            confidence: 0.0,
            stop_loss: None,
            take_profit: None,
            reason: reason.into(),
            supporting_factors: Vec::new(),
        }
    }
}

/// Risk-checked position size. A rejection is a value, not an error:
/// `approved` is false and `rejection_reason` explains why. On a
/// reward:risk rejection the computed fields stay populated for
/// diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionSize {
    pub quantity: Decimal,
    pub notional_value: Decimal,
    pub risk_amount: Decimal,
    pub risk_percent: f64,
    pub stop_distance: Decimal,
    pub reward_ratio: f64,
    pub approved: bool,
    pub rejection_reason: Option<String>,
}

impl PositionSize {
    #[must_use]
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            quantity: Decimal::ZERO,
            notional_value: Decimal::ZERO,
            risk_amount: Decimal::ZERO,
            risk_percent: 0.0,
            stop_distance: Decimal::ZERO,
            reward_ratio: 0.0,
            approved: false,
            rejection_reason: Some(reason.into()),
        }
    }
}
