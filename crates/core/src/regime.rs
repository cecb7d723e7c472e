use crate::market::NewsSignalSummary;
use crate::position::PositionSide;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Macro market posture. Governs whether and how aggressively the
/// execution layer is allowed to trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RegimeState {
    RiskOn,
    RiskOff,
    Decoupled,
    Chop,
}

impl RegimeState {
    pub const ALL: [Self; 4] = [Self::RiskOn, Self::RiskOff, Self::Decoupled, Self::Chop];

    /// Index into score arrays; fixed for the life of the enum.
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::RiskOn => 0,
            Self::RiskOff => 1,
            Self::Decoupled => 2,
            Self::Chop => 3,
        }
    }

    /// Static permission table. A pure function of the state: the same
    /// state always yields identical permissions.
    #[must_use]
    pub const fn permissions(self) -> RegimePermissions {
        match self {
            Self::RiskOn => RegimePermissions {
                trading_enabled: true,
                size_multiplier: 1.0,
                preferred_sides: &[PositionSide::Long],
                allow_runners: true,
            },
            Self::RiskOff => RegimePermissions {
                trading_enabled: true,
                size_multiplier: 0.5,
                preferred_sides: &[PositionSide::Short],
                allow_runners: false,
            },
            Self::Decoupled => RegimePermissions {
                trading_enabled: true,
                size_multiplier: 0.75,
                preferred_sides: &[PositionSide::Long, PositionSide::Short],
                allow_runners: true,
            },
            Self::Chop => RegimePermissions {
                trading_enabled: false,
                size_multiplier: 0.0,
                preferred_sides: &[],
                allow_runners: false,
            },
        }
    }
}

impl std::fmt::Display for RegimeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::RiskOn => "RISK_ON",
            Self::RiskOff => "RISK_OFF",
            Self::Decoupled => "DECOUPLED",
            Self::Chop => "CHOP",
        };
        write!(f, "{s}")
    }
}

/// What the current regime allows the trading side to do.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RegimePermissions {
    pub trading_enabled: bool,
    pub size_multiplier: f64,
    pub preferred_sides: &'static [PositionSide],
    pub allow_runners: bool,
}

impl RegimePermissions {
    #[must_use]
    pub fn prefers(&self, side: PositionSide) -> bool {
        self.preferred_sides.contains(&side)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrendDirection {
    Up,
    Down,
    Flat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrendStrength {
    Strong,
    Weak,
    None,
}

/// Trend analysis for one macro indicator. Derived on demand from the
/// indicator history, never stored independently.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendData {
    pub current_value: f64,
    /// Percent change per period, normalized by the window mean.
    pub slope: f64,
    pub direction: TrendDirection,
    pub strength: TrendStrength,
    pub lookback_periods: usize,
    pub timestamp: DateTime<Utc>,
}

impl TrendData {
    #[must_use]
    pub fn describe(&self) -> String {
        format!("{:?} ({:?})", self.direction, self.strength)
    }
}

/// Inputs for one regime evaluation. Absent sources simply contribute
/// nothing to the scores.
#[derive(Debug, Clone, Default)]
pub struct RegimeInput {
    pub index_trend: Option<TrendData>,
    pub dominance_trend: Option<TrendData>,
    pub news: Option<NewsSignalSummary>,
}

/// Full regime evaluation result, always carrying the *current* state
/// even when no transition happened.
#[derive(Debug, Clone, Serialize)]
pub struct RegimeOutput {
    pub state: RegimeState,
    pub confidence: f64,
    pub index_contribution: f64,
    pub dominance_contribution: f64,
    pub news_contribution: f64,
    pub permissions: RegimePermissions,
    pub timestamp: DateTime<Utc>,
    pub time_in_state_secs: f64,
    pub state_history: Vec<RegimeState>,
}

/// Audit record of an accepted (or forced) state transition.
#[derive(Debug, Clone, Serialize)]
pub struct RegimeTransition {
    pub from_state: RegimeState,
    pub to_state: RegimeState,
    pub reason: String,
    pub confidence: f64,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permissions_are_pure_function_of_state() {
        for state in RegimeState::ALL {
            assert_eq!(state.permissions(), state.permissions());
        }
    }

    #[test]
    fn chop_disables_trading() {
        let perms = RegimeState::Chop.permissions();
        assert!(!perms.trading_enabled);
        assert_eq!(perms.size_multiplier, 0.0);
        assert!(perms.preferred_sides.is_empty());
    }

    #[test]
    fn risk_on_prefers_longs_only() {
        let perms = RegimeState::RiskOn.permissions();
        assert!(perms.prefers(PositionSide::Long));
        assert!(!perms.prefers(PositionSide::Short));
    }

    #[test]
    fn state_indices_are_distinct() {
        let mut seen = [false; 4];
        for state in RegimeState::ALL {
            assert!(!seen[state.index()]);
            seen[state.index()] = true;
        }
    }
}
