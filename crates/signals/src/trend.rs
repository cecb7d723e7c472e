use chrono::Utc;
use macro_trade_core::config::{TrendConfig, TrendThresholds};
use macro_trade_core::market::{MacroPoint, RiskSignal};
use macro_trade_core::regime::{TrendData, TrendDirection, TrendStrength};
use std::collections::VecDeque;
use tracing::debug;

/// Qualitative read of the dominance trend for regime classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DominanceSignal {
    BtcStrength,
    AltcoinStrength,
    Neutral,
}

/// Rolling trend analysis over the two slow macro indicators: the
/// currency index and market dominance. History is bounded; trends are
/// recomputed from the buffer on each query.
#[derive(Debug)]
pub struct TrendAnalyzer {
    config: TrendConfig,
    index_history: VecDeque<MacroPoint>,
    dominance_history: VecDeque<MacroPoint>,
}

impl TrendAnalyzer {
    #[must_use]
    pub fn new(config: TrendConfig) -> Self {
        Self {
            index_history: VecDeque::with_capacity(config.max_history),
            dominance_history: VecDeque::with_capacity(config.max_history),
            config,
        }
    }

    pub fn add_index_point(&mut self, point: MacroPoint) {
        push_bounded(&mut self.index_history, point, self.config.max_history);
    }

    pub fn add_dominance_point(&mut self, point: MacroPoint) {
        push_bounded(&mut self.dominance_history, point, self.config.max_history);
    }

    /// Trend of the currency index, or `None` when no data has arrived.
    #[must_use]
    pub fn analyze_index_trend(&self, lookback: Option<usize>) -> Option<TrendData> {
        analyze(&self.index_history, &self.config.index, lookback)
    }

    /// Trend of market dominance, or `None` when no data has arrived.
    #[must_use]
    pub fn analyze_dominance_trend(&self, lookback: Option<usize>) -> Option<TrendData> {
        analyze(&self.dominance_history, &self.config.dominance, lookback)
    }

    /// Currency-index read: a rising index is a risk-off tell, a
    /// falling one risk-on.
    #[must_use]
    pub fn index_signal(&self) -> RiskSignal {
        match self.analyze_index_trend(None) {
            Some(trend) if trend.strength != TrendStrength::None => match trend.direction {
                TrendDirection::Up => RiskSignal::RiskOff,
                TrendDirection::Down => RiskSignal::RiskOn,
                TrendDirection::Flat => RiskSignal::Neutral,
            },
            _ => RiskSignal::Neutral,
        }
    }

    /// Dominance read: rising dominance means the benchmark asset is
    /// outperforming, falling means rotation into the rest of the market.
    #[must_use]
    pub fn dominance_signal(&self) -> DominanceSignal {
        match self.analyze_dominance_trend(None) {
            Some(trend) if trend.strength != TrendStrength::None => match trend.direction {
                TrendDirection::Up => DominanceSignal::BtcStrength,
                TrendDirection::Down => DominanceSignal::AltcoinStrength,
                TrendDirection::Flat => DominanceSignal::Neutral,
            },
            _ => DominanceSignal::Neutral,
        }
    }

    #[must_use]
    pub fn index_points(&self) -> usize {
        self.index_history.len()
    }

    #[must_use]
    pub fn dominance_points(&self) -> usize {
        self.dominance_history.len()
    }
}

fn push_bounded(buf: &mut VecDeque<MacroPoint>, point: MacroPoint, cap: usize) {
    if buf.len() >= cap {
        buf.pop_front();
    }
    buf.push_back(point);
}

fn analyze(
    history: &VecDeque<MacroPoint>,
    thresholds: &TrendThresholds,
    lookback: Option<usize>,
) -> Option<TrendData> {
    let current = history.back()?;
    let lookback = lookback.unwrap_or(thresholds.lookback_periods);

    let values: Vec<f64> = history.iter().map(|p| p.value).collect();
    let window = &values[values.len().saturating_sub(lookback)..];
    let slope = normalized_slope(window);

    let direction = if slope > thresholds.weak_slope {
        TrendDirection::Up
    } else if slope < -thresholds.weak_slope {
        TrendDirection::Down
    } else {
        TrendDirection::Flat
    };

    let strength = if slope.abs() >= thresholds.strong_slope {
        TrendStrength::Strong
    } else if slope.abs() >= thresholds.weak_slope {
        TrendStrength::Weak
    } else {
        TrendStrength::None
    };

    debug!(slope, ?direction, ?strength, "trend computed");

    Some(TrendData {
        current_value: current.value,
        slope,
        direction,
        strength,
        lookback_periods: lookback.min(history.len()),
        timestamp: Utc::now(),
    })
}

/// Least-squares slope over the window, normalized by the window mean
/// so it reads as percent change per period. Zero for windows shorter
/// than two points or with a zero mean.
fn normalized_slope(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let n_f = n as f64;
    let mean_x = (n_f - 1.0) / 2.0;
    let mean_y = values.iter().sum::<f64>() / n_f;

    let mut numerator = 0.0;
    let mut denominator = 0.0;
    for (i, &y) in values.iter().enumerate() {
        let dx = i as f64 - mean_x;
        numerator += dx * (y - mean_y);
        denominator += dx * dx;
    }
    if denominator == 0.0 || mean_y == 0.0 {
        return 0.0;
    }
    (numerator / denominator) / mean_y * 100.0
}
