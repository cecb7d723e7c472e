use crate::structure::{MarketStructure, StructureTrend};
use chrono::Utc;
use macro_trade_core::flow::{CapitalFlowSignal, FlowBias, FlowDirection};
use macro_trade_core::liquidity::LiquidityLevel;
use macro_trade_core::market::{Kline, Side, Trade};
use macro_trade_core::position::PositionSide;
use macro_trade_core::regime::RegimeOutput;
use macro_trade_core::signal::{ExecutionSignal, SignalType};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::VecDeque;
use tracing::info;

pub const MAX_KLINE_HISTORY: usize = 50;
pub const MAX_TRADE_HISTORY: usize = 1000;
/// Candles scanned for a sweep-and-return pattern.
pub const SWEEP_LOOKBACK: usize = 3;
pub const ORDER_FLOW_WINDOW: usize = 20;
pub const BULLISH_FLOW_RATIO: f64 = 2.0;
pub const BEARISH_FLOW_RATIO: f64 = 0.5;
/// Ratio reported when the window contains no sell volume at all.
pub const ALL_BUY_RATIO: f64 = 999.0;

pub const SWEEP_CONFIDENCE: f64 = 0.4;
pub const STRUCTURE_CONFIDENCE: f64 = 0.3;
pub const REGIME_ALIGNMENT_BONUS: f64 = 0.3;
pub const REGIME_MISALIGNMENT_PENALTY: f64 = 0.5;
pub const ORDER_FLOW_BONUS: f64 = 0.2;
pub const CAPITAL_FLOW_BONUS: f64 = 0.1;
pub const MIN_SIGNAL_CONFIDENCE: f64 = 0.5;

/// Stop offset as a fraction of price.
const STOP_OFFSET: Decimal = Decimal::from_parts(1, 0, 0, false, 3);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OrderFlowImbalance {
    Bullish,
    Bearish,
    Neutral,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct OrderFlow {
    pub imbalance: OrderFlowImbalance,
    pub ratio: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecutionStatus {
    pub klines_loaded: usize,
    pub trades_tracked: usize,
    pub structure_trend: StructureTrend,
    pub swing_highs: usize,
    pub swing_lows: usize,
    pub order_flow: OrderFlow,
    pub last_signal: Option<ExecutionSignal>,
}

/// Generates entry signals from liquidity sweeps, structure breaks and
/// order-flow imbalance, all gated by regime permissions. At most one
/// signal per evaluation.
pub struct ExecutionEngine {
    structure: MarketStructure,
    klines: Vec<Kline>,
    trades: VecDeque<Trade>,
    last_signal: Option<ExecutionSignal>,
}

struct Candidate {
    side: PositionSide,
    reason: String,
    confidence: f64,
}

impl Default for ExecutionEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionEngine {
    #[must_use]
    pub fn new() -> Self {
        Self {
            structure: MarketStructure::new(),
            klines: Vec::with_capacity(MAX_KLINE_HISTORY),
            trades: VecDeque::with_capacity(MAX_TRADE_HISTORY),
            last_signal: None,
        }
    }

    pub fn add_kline(&mut self, kline: Kline) {
        self.klines.push(kline);
        if self.klines.len() > MAX_KLINE_HISTORY {
            self.klines.remove(0);
        }
        self.structure.update(&self.klines);
    }

    pub fn add_trade(&mut self, trade: Trade) {
        if self.trades.len() >= MAX_TRADE_HISTORY {
            self.trades.pop_front();
        }
        self.trades.push_back(trade);
    }

    #[must_use]
    pub fn structure(&self) -> &MarketStructure {
        &self.structure
    }

    #[must_use]
    pub fn trades_tracked(&self) -> usize {
        self.trades.len()
    }

    /// Evaluate all inputs into at most one signal.
    pub fn generate_signal(
        &mut self,
        price: Decimal,
        regime: Option<&RegimeOutput>,
        liquidity_levels: &[LiquidityLevel],
        capital_flow: Option<&CapitalFlowSignal>,
    ) -> ExecutionSignal {
        let Some(regime) = regime else {
            return ExecutionSignal::none(price, "Trading disabled by regime: unknown");
        };
        if !regime.permissions.trading_enabled {
            return ExecutionSignal::none(
                price,
                format!("Trading disabled by regime: {}", regime.state),
            );
        }

        let mut factors = Vec::new();

        // Sweep beats structure when both fire.
        let candidate = self
            .check_liquidity_sweep(liquidity_levels)
            .or_else(|| self.check_structure_break(price));
        let Some(candidate) = candidate else {
            return ExecutionSignal::none(price, "Insufficient confidence or no clear setup");
        };

        let mut confidence = candidate.confidence;
        factors.push(candidate.reason);

        if regime.permissions.prefers(candidate.side) {
            confidence += REGIME_ALIGNMENT_BONUS;
            factors.push(format!("Aligned with {} regime", regime.state));
        } else {
            confidence *= REGIME_MISALIGNMENT_PENALTY;
            factors.push(format!("Against {} regime preference", regime.state));
        }

        let order_flow = self.analyze_order_flow();
        match (order_flow.imbalance, candidate.side) {
            (OrderFlowImbalance::Bullish, PositionSide::Long) => {
                confidence += ORDER_FLOW_BONUS;
                factors.push(format!("Bullish orderflow (ratio: {:.2})", order_flow.ratio));
            }
            (OrderFlowImbalance::Bearish, PositionSide::Short) => {
                confidence += ORDER_FLOW_BONUS;
                factors.push(format!("Bearish orderflow (ratio: {:.2})", order_flow.ratio));
            }
            _ => {}
        }

        if let Some(flow) = capital_flow {
            let aligned = matches!(
                (flow.flow_direction, candidate.side),
                (FlowDirection::Inflow, PositionSide::Long)
                    | (FlowDirection::Outflow, PositionSide::Short)
            );
            if flow.bias == FlowBias::Continuation && aligned {
                confidence += CAPITAL_FLOW_BONUS;
                factors.push(format!("Capital flow supports {}", candidate.side));
            }
        }

        if confidence < MIN_SIGNAL_CONFIDENCE {
            return ExecutionSignal::none(price, "Insufficient confidence or no clear setup");
        }

        let (signal_type, stop_loss, take_profit) = match candidate.side {
            PositionSide::Long => {
                let nearest_below = nearest_level_below(liquidity_levels, price);
                let nearest_above = nearest_level_above(liquidity_levels, price);
                (
                    SignalType::EntryLong,
                    nearest_below.map(|level| level - price * STOP_OFFSET),
                    nearest_above,
                )
            }
            PositionSide::Short => {
                let nearest_above = nearest_level_above(liquidity_levels, price);
                let nearest_below = nearest_level_below(liquidity_levels, price);
                (
                    SignalType::EntryShort,
                    nearest_above.map(|level| level + price * STOP_OFFSET),
                    nearest_below,
                )
            }
        };

        let reason = factors
            .iter()
            .take(3)
            .cloned()
            .collect::<Vec<_>>()
            .join(" | ");
        let signal = ExecutionSignal {
            signal_type,
            timestamp: Utc::now(),
            price,
            confidence: confidence.min(1.0),
            stop_loss,
            take_profit,
            reason,
            supporting_factors: factors,
        };

        info!(
            signal = ?signal.signal_type,
            price = %signal.price,
            confidence = signal.confidence,
            reason = %signal.reason,
            "signal generated"
        );
        self.last_signal = Some(signal.clone());
        signal
    }

    /// A wick through a level with a close back on the origin side
    /// within the last few candles.
    fn check_liquidity_sweep(&self, levels: &[LiquidityLevel]) -> Option<Candidate> {
        if self.klines.len() < SWEEP_LOOKBACK {
            return None;
        }
        let recent = &self.klines[self.klines.len() - SWEEP_LOOKBACK..];

        for level in levels {
            if level.kind.is_high() {
                if recent
                    .iter()
                    .any(|k| k.high > level.price && k.close < level.price)
                {
                    return Some(Candidate {
                        side: PositionSide::Short,
                        reason: format!("Swept {} at {} and returned", level.kind, level.price),
                        confidence: SWEEP_CONFIDENCE,
                    });
                }
            } else if recent
                .iter()
                .any(|k| k.low < level.price && k.close > level.price)
            {
                return Some(Candidate {
                    side: PositionSide::Long,
                    reason: format!("Swept {} at {} and returned", level.kind, level.price),
                    confidence: SWEEP_CONFIDENCE,
                });
            }
        }
        None
    }

    /// Break of structure continues the trend; a break against it is a
    /// change of character.
    fn check_structure_break(&self, price: Decimal) -> Option<Candidate> {
        let recent_high = self.structure.recent_high()?;
        let recent_low = self.structure.recent_low()?;

        let (side, reason) = match self.structure.trend() {
            StructureTrend::Bullish if price > recent_high => (
                PositionSide::Long,
                "Break of structure to upside in bullish trend",
            ),
            StructureTrend::Bullish if price < recent_low => (
                PositionSide::Short,
                "Change of character - bullish structure broken to downside",
            ),
            StructureTrend::Bearish if price < recent_low => (
                PositionSide::Short,
                "Break of structure to downside in bearish trend",
            ),
            StructureTrend::Bearish if price > recent_high => (
                PositionSide::Long,
                "Change of character - bearish structure broken to upside",
            ),
            _ => return None,
        };

        Some(Candidate {
            side,
            reason: reason.to_string(),
            confidence: STRUCTURE_CONFIDENCE,
        })
    }

    /// Buy/sell volume ratio over the last window of trades.
    #[must_use]
    pub fn analyze_order_flow(&self) -> OrderFlow {
        if self.trades.len() < ORDER_FLOW_WINDOW {
            return OrderFlow {
                imbalance: OrderFlowImbalance::Neutral,
                ratio: 1.0,
            };
        }

        let recent = self.trades.iter().skip(self.trades.len() - ORDER_FLOW_WINDOW);
        let mut buy_volume = Decimal::ZERO;
        let mut sell_volume = Decimal::ZERO;
        for trade in recent {
            match trade.side {
                Side::Buy => buy_volume += trade.quantity,
                Side::Sell => sell_volume += trade.quantity,
            }
        }

        if buy_volume + sell_volume == Decimal::ZERO {
            return OrderFlow {
                imbalance: OrderFlowImbalance::Neutral,
                ratio: 1.0,
            };
        }

        let ratio = if sell_volume > Decimal::ZERO {
            (buy_volume / sell_volume).to_f64().unwrap_or(ALL_BUY_RATIO)
        } else {
            ALL_BUY_RATIO
        };

        let imbalance = if ratio > BULLISH_FLOW_RATIO {
            OrderFlowImbalance::Bullish
        } else if ratio < BEARISH_FLOW_RATIO {
            OrderFlowImbalance::Bearish
        } else {
            OrderFlowImbalance::Neutral
        };

        OrderFlow { imbalance, ratio }
    }

    #[must_use]
    pub fn status(&self) -> ExecutionStatus {
        ExecutionStatus {
            klines_loaded: self.klines.len(),
            trades_tracked: self.trades.len(),
            structure_trend: self.structure.trend(),
            swing_highs: self.structure.swing_highs().len(),
            swing_lows: self.structure.swing_lows().len(),
            order_flow: self.analyze_order_flow(),
            last_signal: self.last_signal.clone(),
        }
    }
}

fn nearest_level_above(levels: &[LiquidityLevel], price: Decimal) -> Option<Decimal> {
    levels
        .iter()
        .map(|l| l.price)
        .filter(|&p| p > price)
        .min()
}

fn nearest_level_below(levels: &[LiquidityLevel], price: Decimal) -> Option<Decimal> {
    levels
        .iter()
        .map(|l| l.price)
        .filter(|&p| p < price)
        .max()
}

#[cfg(test)]
mod tests {
    use super::*;
    use macro_trade_core::liquidity::{LevelKind, Session};
    use macro_trade_core::regime::RegimeState;
    use rust_decimal_macros::dec;

    fn kline(high: Decimal, low: Decimal, close: Decimal) -> Kline {
        Kline {
            symbol: "BTCUSDT".to_string(),
            timestamp: Utc::now(),
            open: low,
            high,
            low,
            close,
            volume: dec!(1),
            timeframe: "5".to_string(),
        }
    }

    fn level(price: Decimal, kind: LevelKind) -> LiquidityLevel {
        LiquidityLevel {
            price,
            kind,
            strength: 0.7,
            timestamp: Utc::now(),
            touched: false,
            broken: false,
        }
    }

    fn regime_output(state: RegimeState) -> RegimeOutput {
        RegimeOutput {
            state,
            confidence: 0.8,
            index_contribution: 0.0,
            dominance_contribution: 0.0,
            news_contribution: 0.0,
            permissions: state.permissions(),
            timestamp: Utc::now(),
            time_in_state_secs: 0.0,
            state_history: vec![state],
        }
    }

    fn trade(side: Side, quantity: Decimal) -> Trade {
        Trade {
            symbol: "BTCUSDT".to_string(),
            timestamp: Utc::now(),
            price: dec!(50000),
            quantity,
            side,
        }
    }

    /// Engine with a sweep setup below a session low at 99.
    fn engine_with_sweep() -> ExecutionEngine {
        let mut engine = ExecutionEngine::new();
        engine.add_kline(kline(dec!(101), dec!(100), dec!(100.5)));
        engine.add_kline(kline(dec!(101), dec!(98), dec!(100.2)));
        engine.add_kline(kline(dec!(101), dec!(100), dec!(100.4)));
        engine
    }

    #[test]
    fn chop_regime_blocks_signals() {
        let mut engine = engine_with_sweep();
        let regime = regime_output(RegimeState::Chop);
        let levels = [level(dec!(99), LevelKind::SessionLow(Session::Asia))];
        let signal = engine.generate_signal(dec!(100), Some(&regime), &levels, None);
        assert_eq!(signal.signal_type, SignalType::NoSignal);
        assert!(signal.reason.contains("CHOP"));
    }

    #[test]
    fn missing_regime_blocks_signals() {
        let mut engine = engine_with_sweep();
        let signal = engine.generate_signal(dec!(100), None, &[], None);
        assert_eq!(signal.signal_type, SignalType::NoSignal);
    }

    #[test]
    fn sweep_of_low_in_risk_on_enters_long() {
        let mut engine = engine_with_sweep();
        let regime = regime_output(RegimeState::RiskOn);
        let levels = [
            level(dec!(99), LevelKind::SessionLow(Session::Asia)),
            level(dec!(105), LevelKind::SessionHigh(Session::Asia)),
        ];
        let signal = engine.generate_signal(dec!(100), Some(&regime), &levels, None);

        assert_eq!(signal.signal_type, SignalType::EntryLong);
        // Sweep 0.4 + regime alignment 0.3.
        assert!((signal.confidence - 0.7).abs() < 1e-9);
        // Stop below the nearest level under price, offset by 0.1%.
        assert_eq!(signal.stop_loss, Some(dec!(99) - dec!(100) * dec!(0.001)));
        assert_eq!(signal.take_profit, Some(dec!(105)));
        assert!(signal.reason.contains("Swept"));
    }

    #[test]
    fn short_against_risk_on_is_penalized_relative_to_long() {
        // Same sweep strength, opposite directions: the short setup
        // sweeps a high, the long sweeps a low, both under RISK_ON.
        let regime = regime_output(RegimeState::RiskOn);

        let mut long_engine = engine_with_sweep();
        let long_levels = [level(dec!(99), LevelKind::SessionLow(Session::Asia))];
        let long_signal =
            long_engine.generate_signal(dec!(100), Some(&regime), &long_levels, None);

        let mut short_engine = ExecutionEngine::new();
        short_engine.add_kline(kline(dec!(100), dec!(99), dec!(99.5)));
        short_engine.add_kline(kline(dec!(102), dec!(99), dec!(100.2)));
        short_engine.add_kline(kline(dec!(100.5), dec!(99), dec!(99.8)));
        let short_levels = [level(dec!(101), LevelKind::SessionHigh(Session::Asia))];
        let short_signal =
            short_engine.generate_signal(dec!(100), Some(&regime), &short_levels, None);

        // Long: 0.4 + 0.3 = 0.7. Short: 0.4 * 0.5 = 0.2, below the floor.
        assert_eq!(long_signal.signal_type, SignalType::EntryLong);
        assert_eq!(short_signal.signal_type, SignalType::NoSignal);
    }

    #[test]
    fn order_flow_confirmation_adds_confidence() {
        let mut engine = engine_with_sweep();
        for _ in 0..ORDER_FLOW_WINDOW {
            engine.add_trade(trade(Side::Buy, dec!(3)));
        }
        let regime = regime_output(RegimeState::RiskOn);
        let levels = [level(dec!(99), LevelKind::SessionLow(Session::Asia))];
        let signal = engine.generate_signal(dec!(100), Some(&regime), &levels, None);
        // 0.4 + 0.3 + 0.2 with an all-buy window.
        assert!((signal.confidence - 0.9).abs() < 1e-9);
        assert!(signal
            .supporting_factors
            .iter()
            .any(|f| f.contains("orderflow")));
    }

    #[test]
    fn capital_flow_continuation_adds_confidence() {
        let mut engine = engine_with_sweep();
        let regime = regime_output(RegimeState::RiskOn);
        let levels = [level(dec!(99), LevelKind::SessionLow(Session::Asia))];
        let flow = CapitalFlowSignal {
            timestamp: Utc::now(),
            flow_direction: FlowDirection::Inflow,
            flow_strength: 0.8,
            momentum: 0.4,
            bias: FlowBias::Continuation,
            confidence: 0.8,
            supporting_factors: vec![],
        };
        let signal = engine.generate_signal(dec!(100), Some(&regime), &levels, Some(&flow));
        assert!((signal.confidence - 0.8).abs() < 1e-9);
    }

    #[test]
    fn all_buy_window_reports_sentinel_ratio() {
        let mut engine = ExecutionEngine::new();
        for _ in 0..ORDER_FLOW_WINDOW {
            engine.add_trade(trade(Side::Buy, dec!(1)));
        }
        let flow = engine.analyze_order_flow();
        assert_eq!(flow.imbalance, OrderFlowImbalance::Bullish);
        assert_eq!(flow.ratio, ALL_BUY_RATIO);
    }

    #[test]
    fn below_window_order_flow_is_neutral() {
        let mut engine = ExecutionEngine::new();
        for _ in 0..ORDER_FLOW_WINDOW - 1 {
            engine.add_trade(trade(Side::Sell, dec!(5)));
        }
        let flow = engine.analyze_order_flow();
        assert_eq!(flow.imbalance, OrderFlowImbalance::Neutral);
        assert_eq!(flow.ratio, 1.0);
    }

    #[test]
    fn trade_history_is_capped_with_oldest_evicted() {
        let mut engine = ExecutionEngine::new();
        for i in 0..=MAX_TRADE_HISTORY {
            let mut t = trade(Side::Buy, dec!(1));
            t.price = Decimal::from(i as i64);
            engine.add_trade(t);
        }
        assert_eq!(engine.trades_tracked(), MAX_TRADE_HISTORY);
        // The first insert (price 0) must be gone.
        assert!(engine.trades.iter().all(|t| t.price > Decimal::ZERO));
    }

    #[test]
    fn structure_break_generates_long_in_bullish_trend() {
        let mut engine = ExecutionEngine::new();
        // Rising zigzag builds a bullish structure.
        for i in 0..4 {
            let base = dec!(100) + Decimal::from(i * 10);
            engine.add_kline(kline(base, base - dec!(5), base - dec!(1)));
            engine.add_kline(kline(base + dec!(10), base + dec!(5), base + dec!(8)));
            engine.add_kline(kline(base, base - dec!(5), base - dec!(1)));
        }
        assert_eq!(engine.structure().trend(), StructureTrend::Bullish);

        let regime = regime_output(RegimeState::RiskOn);
        let high = engine.structure().recent_high().unwrap();
        let price = high + dec!(1);
        let levels = [
            level(price - dec!(20), LevelKind::PriorDayLow),
            level(price + dec!(30), LevelKind::PriorDayHigh),
        ];
        let signal = engine.generate_signal(price, Some(&regime), &levels, None);
        assert_eq!(signal.signal_type, SignalType::EntryLong);
        assert!(signal.reason.contains("Break of structure"));
    }

    #[test]
    fn status_reflects_engine_state() {
        let mut engine = engine_with_sweep();
        let status = engine.status();
        assert_eq!(status.klines_loaded, 3);
        assert!(status.last_signal.is_none());

        let regime = regime_output(RegimeState::RiskOn);
        let levels = [level(dec!(99), LevelKind::SessionLow(Session::Asia))];
        engine.generate_signal(dec!(100), Some(&regime), &levels, None);
        assert!(engine.status().last_signal.is_some());
    }
}
