use chrono::Utc;
use macro_trade_core::config::FlowConfig;
use macro_trade_core::flow::{CapitalFlowSignal, FlowBias, FlowDirection, FlowStatus};
use macro_trade_core::market::MacroPoint;
use std::collections::VecDeque;
use tracing::info;

const MOMENTUM_WINDOW: usize = 5;

/// Detects capital rotation between the benchmark asset and the rest
/// of the market from the dominance ratio series. Rising dominance is
/// an inflow to the benchmark, falling is an outflow into alts.
#[derive(Debug)]
pub struct CapitalFlowAnalyzer {
    config: FlowConfig,
    history: VecDeque<MacroPoint>,
}

impl CapitalFlowAnalyzer {
    #[must_use]
    pub fn new(config: FlowConfig) -> Self {
        Self {
            history: VecDeque::with_capacity(config.max_history),
            config,
        }
    }

    pub fn add_data(&mut self, point: MacroPoint) {
        if self.history.len() >= self.config.max_history {
            self.history.pop_front();
        }
        self.history.push_back(point);
    }

    #[must_use]
    pub fn data_points(&self) -> usize {
        self.history.len()
    }

    #[must_use]
    pub fn status(&self) -> FlowStatus {
        FlowStatus {
            data_points: self.history.len(),
            max_history: self.config.max_history,
            last_update: self.history.back().map(|p| p.timestamp),
            ready: self.history.len() >= 2,
        }
    }

    /// Full flow analysis; `None` below two points.
    #[must_use]
    pub fn analyze(&self) -> Option<CapitalFlowSignal> {
        if self.history.len() < 2 {
            return None;
        }

        let values: Vec<f64> = self.history.iter().map(|p| p.value).collect();
        let current = *values.last()?;

        // Change over the lookback window, clamped to the buffer start.
        let lookback_idx = values.len().saturating_sub(self.config.lookback_periods);
        let previous = values[lookback_idx];
        let change_pct = if previous == 0.0 {
            0.0
        } else {
            (current - previous) / previous * 100.0
        };

        let momentum = self.momentum(&values);
        let has_divergence = self.detect_divergence(&values);

        let flow_direction = if change_pct > self.config.weak_flow_threshold {
            FlowDirection::Inflow
        } else if change_pct < -self.config.weak_flow_threshold {
            FlowDirection::Outflow
        } else {
            FlowDirection::Neutral
        };

        let flow_strength = self.flow_strength(change_pct, momentum);
        let bias = self.bias(momentum, has_divergence);

        let mut supporting_factors = Vec::new();
        if change_pct.abs() > self.config.strong_flow_threshold {
            supporting_factors.push(format!("Strong dominance change: {change_pct:.2}%"));
        }
        if momentum.abs() > self.config.momentum_threshold {
            let word = if momentum > 0.0 { "accelerating" } else { "decelerating" };
            supporting_factors.push(format!("Momentum {word}: {momentum:.2}%"));
        }
        if has_divergence {
            supporting_factors.push("Divergence detected - potential reversal".to_string());
        }

        let mut confidence = flow_strength;
        if has_divergence {
            confidence *= 0.8;
        }

        let signal = CapitalFlowSignal {
            timestamp: Utc::now(),
            flow_direction,
            flow_strength,
            momentum,
            bias,
            confidence,
            supporting_factors,
        };

        info!(
            direction = ?signal.flow_direction,
            strength = signal.flow_strength,
            bias = ?signal.bias,
            momentum = signal.momentum,
            "capital flow analyzed"
        );

        Some(signal)
    }

    /// Rate of change across the short window, percent.
    fn momentum(&self, values: &[f64]) -> f64 {
        if values.len() < MOMENTUM_WINDOW {
            return 0.0;
        }
        let recent = &values[values.len() - MOMENTUM_WINDOW..];
        let first = recent[0];
        if first == 0.0 {
            return 0.0;
        }
        (recent[recent.len() - 1] - first) / first * 100.0
    }

    /// Long-window fit slope vs short-window slope pointing opposite
    /// ways flags a divergence.
    fn detect_divergence(&self, values: &[f64]) -> bool {
        if values.len() < self.config.lookback_periods {
            return false;
        }
        let recent = &values[values.len() - self.config.lookback_periods..];

        let n = recent.len() as f64;
        let mean_x = (n - 1.0) / 2.0;
        let mean_y = recent.iter().sum::<f64>() / n;
        let mut numerator = 0.0;
        let mut denominator = 0.0;
        for (i, &y) in recent.iter().enumerate() {
            let dx = i as f64 - mean_x;
            numerator += dx * (y - mean_y);
            denominator += dx * dx;
        }
        if denominator == 0.0 {
            return false;
        }
        let trend_slope = numerator / denominator;

        let short_slope = if recent.len() >= MOMENTUM_WINDOW {
            (recent[recent.len() - 1] - recent[recent.len() - MOMENTUM_WINDOW])
                / MOMENTUM_WINDOW as f64
        } else {
            0.0
        };

        (trend_slope > 0.0 && short_slope < 0.0) || (trend_slope < 0.0 && short_slope > 0.0)
    }

    /// 60/40 blend of normalized |change| and |momentum|, each term and
    /// the blend capped at 1.
    fn flow_strength(&self, change_pct: f64, momentum: f64) -> f64 {
        let change_strength = (change_pct.abs() / self.config.strong_flow_threshold).min(1.0);
        let momentum_strength = (momentum.abs() / self.config.momentum_threshold).min(1.0);
        (change_strength * 0.6 + momentum_strength * 0.4).min(1.0)
    }

    fn bias(&self, momentum: f64, has_divergence: bool) -> FlowBias {
        if momentum.abs() > self.config.momentum_threshold * 2.0 {
            return FlowBias::Continuation;
        }
        if has_divergence {
            return FlowBias::MeanReversion;
        }
        if momentum.abs() < self.config.weak_flow_threshold {
            return FlowBias::Neutral;
        }
        FlowBias::Continuation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(value: f64) -> MacroPoint {
        MacroPoint {
            timestamp: Utc::now(),
            value,
            change_percent: None,
            source: "test".to_string(),
        }
    }

    fn analyzer_with(values: &[f64]) -> CapitalFlowAnalyzer {
        let mut analyzer = CapitalFlowAnalyzer::new(FlowConfig::default());
        for &v in values {
            analyzer.add_data(point(v));
        }
        analyzer
    }

    #[test]
    fn fewer_than_two_points_yields_none() {
        assert!(analyzer_with(&[]).analyze().is_none());
        assert!(analyzer_with(&[55.0]).analyze().is_none());
    }

    #[test]
    fn rising_dominance_is_inflow() {
        let values: Vec<f64> = (0..24).map(|i| 50.0 + 0.1 * i as f64).collect();
        let signal = analyzer_with(&values).analyze().unwrap();
        assert_eq!(signal.flow_direction, FlowDirection::Inflow);
        assert!(signal.momentum > 0.0);
    }

    #[test]
    fn falling_dominance_is_outflow() {
        let values: Vec<f64> = (0..24).map(|i| 55.0 - 0.1 * i as f64).collect();
        let signal = analyzer_with(&values).analyze().unwrap();
        assert_eq!(signal.flow_direction, FlowDirection::Outflow);
    }

    #[test]
    fn flat_series_is_neutral_with_zero_strength() {
        let signal = analyzer_with(&[50.0; 30]).analyze().unwrap();
        assert_eq!(signal.flow_direction, FlowDirection::Neutral);
        assert_eq!(signal.flow_strength, 0.0);
        assert_eq!(signal.bias, FlowBias::Neutral);
    }

    #[test]
    fn strength_and_confidence_stay_in_unit_interval() {
        // Extreme and erratic inputs must never escape [0, 1].
        let wild: Vec<f64> = (0..60)
            .map(|i| if i % 2 == 0 { 10.0 } else { 90.0 + i as f64 })
            .collect();
        for window in [2, 5, 24, 60] {
            let signal = analyzer_with(&wild[..window]).analyze();
            if let Some(signal) = signal {
                assert!((0.0..=1.0).contains(&signal.flow_strength));
                assert!((0.0..=1.0).contains(&signal.confidence));
            }
        }
    }

    #[test]
    fn divergence_discounts_confidence() {
        // Long uptrend, sharp reversal over the last few points.
        let mut values: Vec<f64> = (0..24).map(|i| 50.0 + 0.2 * i as f64).collect();
        for i in 0..4 {
            values.push(54.6 - 0.5 * f64::from(i));
        }
        let signal = analyzer_with(&values).analyze().unwrap();
        assert!(signal
            .supporting_factors
            .iter()
            .any(|f| f.contains("Divergence")));
        assert!(signal.confidence <= signal.flow_strength * 0.8 + f64::EPSILON);
    }

    #[test]
    fn status_tracks_history_fill() {
        let empty = CapitalFlowAnalyzer::new(FlowConfig::default());
        let status = empty.status();
        assert_eq!(status.data_points, 0);
        assert!(!status.ready);
        assert!(status.last_update.is_none());

        let status = analyzer_with(&[50.0, 51.0]).status();
        assert_eq!(status.data_points, 2);
        assert_eq!(status.max_history, FlowConfig::default().max_history);
        assert!(status.ready);
        assert!(status.last_update.is_some());
    }

    #[test]
    fn history_is_bounded_at_capacity() {
        let mut analyzer = CapitalFlowAnalyzer::new(FlowConfig::default());
        for i in 0..500 {
            analyzer.add_data(point(50.0 + (i % 7) as f64));
        }
        assert_eq!(analyzer.data_points(), FlowConfig::default().max_history);
    }
}
