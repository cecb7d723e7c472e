use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Session {
    Asia,
    London,
    NewYork,
}

impl std::fmt::Display for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Asia => "ASIA",
            Self::London => "LONDON",
            Self::NewYork => "NY",
        };
        write!(f, "{s}")
    }
}

/// What kind of level this is. Highs attract sweeps from below, lows
/// from above.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LevelKind {
    PriorDayHigh,
    PriorDayLow,
    SessionHigh(Session),
    SessionLow(Session),
    VisibleRangeHigh,
    VisibleRangeLow,
}

impl LevelKind {
    #[must_use]
    pub const fn is_high(self) -> bool {
        matches!(
            self,
            Self::PriorDayHigh | Self::SessionHigh(_) | Self::VisibleRangeHigh
        )
    }

    #[must_use]
    pub const fn is_low(self) -> bool {
        !self.is_high()
    }
}

impl std::fmt::Display for LevelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PriorDayHigh => write!(f, "PDH"),
            Self::PriorDayLow => write!(f, "PDL"),
            Self::SessionHigh(s) => write!(f, "{s}_HIGH"),
            Self::SessionLow(s) => write!(f, "{s}_LOW"),
            Self::VisibleRangeHigh => write!(f, "VR_HIGH"),
            Self::VisibleRangeLow => write!(f, "VR_LOW"),
        }
    }
}

/// A price level where resting liquidity is expected. Derived from
/// kline history and recomputed, never incrementally patched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiquidityLevel {
    pub price: Decimal,
    pub kind: LevelKind,
    /// Heuristic weight of the level, within [0, 1].
    pub strength: f64,
    pub timestamp: DateTime<Utc>,
    pub touched: bool,
    pub broken: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ZoneSide {
    Bid,
    Ask,
}

/// A band of the order book holding disproportionate resting size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiquidityZone {
    pub price_low: Decimal,
    pub price_high: Decimal,
    pub total_size: Decimal,
    pub side: ZoneSide,
    pub imbalance_ratio: f64,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_kind_sides() {
        assert!(LevelKind::PriorDayHigh.is_high());
        assert!(LevelKind::SessionHigh(Session::Asia).is_high());
        assert!(LevelKind::VisibleRangeLow.is_low());
        assert!(LevelKind::SessionLow(Session::NewYork).is_low());
    }

    #[test]
    fn level_kind_labels() {
        assert_eq!(LevelKind::PriorDayHigh.to_string(), "PDH");
        assert_eq!(
            LevelKind::SessionLow(Session::London).to_string(),
            "LONDON_LOW"
        );
    }
}
