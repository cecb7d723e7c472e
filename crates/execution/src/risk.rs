use chrono::{NaiveDate, Utc};
use macro_trade_core::config::RiskConfig;
use macro_trade_core::regime::RegimeOutput;
use macro_trade_core::signal::{ExecutionSignal, PositionSize};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::info;

const HUNDRED: Decimal = Decimal::from_parts(100, 0, 0, false, 0);

#[derive(Debug, Clone, Serialize)]
pub struct RiskStatus {
    pub account_balance: Decimal,
    pub base_risk_percent: f64,
    pub daily_pnl: Decimal,
    pub trades_today: u32,
    pub daily_loss_limit: Decimal,
    pub daily_loss_remaining: Decimal,
    pub daily_limit_hit: bool,
    pub open_positions: usize,
    pub max_open_positions: usize,
    pub position_limit_reached: bool,
    pub max_position_size_usd: Decimal,
    pub min_risk_reward: f64,
}

/// Converts a qualitative signal into a bounded position, or a
/// structured rejection. Daily counters roll over at UTC midnight.
pub struct RiskManager {
    config: RiskConfig,
    account_balance: Decimal,
    daily_pnl: Decimal,
    trades_today: u32,
    open_positions: usize,
    last_reset: NaiveDate,
}

impl RiskManager {
    #[must_use]
    pub fn new(config: RiskConfig) -> Self {
        Self {
            account_balance: config.account_balance,
            config,
            daily_pnl: Decimal::ZERO,
            trades_today: 0,
            open_positions: 0,
            last_reset: Utc::now().date_naive(),
        }
    }

    pub fn update_account_balance(&mut self, balance: Decimal) {
        self.account_balance = balance;
        info!(%balance, "account balance updated");
    }

    pub fn record_trade_result(&mut self, pnl: Decimal) {
        self.reset_daily_stats(Utc::now().date_naive());
        self.daily_pnl += pnl;
        self.trades_today += 1;
        info!(
            %pnl,
            daily_pnl = %self.daily_pnl,
            trades = self.trades_today,
            "trade result recorded"
        );
    }

    pub fn increment_open_positions(&mut self) {
        self.open_positions += 1;
        info!(
            open = self.open_positions,
            max = self.config.max_open_positions,
            "open position count"
        );
    }

    pub fn decrement_open_positions(&mut self) {
        self.open_positions = self.open_positions.saturating_sub(1);
        info!(
            open = self.open_positions,
            max = self.config.max_open_positions,
            "open position count"
        );
    }

    #[must_use]
    pub const fn open_positions(&self) -> usize {
        self.open_positions
    }

    pub fn calculate_position_size(
        &mut self,
        signal: &ExecutionSignal,
        regime: Option<&RegimeOutput>,
        price: Decimal,
    ) -> PositionSize {
        self.reset_daily_stats(Utc::now().date_naive());
        self.size_position(signal, regime, price)
    }

    fn size_position(
        &self,
        signal: &ExecutionSignal,
        regime: Option<&RegimeOutput>,
        price: Decimal,
    ) -> PositionSize {
        let loss_limit = self.daily_loss_limit();
        if self.daily_pnl < Decimal::ZERO && self.daily_pnl.abs() >= loss_limit {
            return PositionSize::rejected(format!(
                "Daily loss limit hit: {} / {}",
                self.daily_pnl, loss_limit
            ));
        }

        if self.open_positions >= self.config.max_open_positions {
            return PositionSize::rejected(format!(
                "Max open positions reached: {}/{}",
                self.open_positions, self.config.max_open_positions
            ));
        }

        let Some(stop_loss) = signal.stop_loss else {
            return PositionSize::rejected("No stop loss defined");
        };
        let stop_distance = (price - stop_loss).abs();
        if stop_distance == Decimal::ZERO {
            return PositionSize::rejected("Stop loss too close to entry");
        }

        let regime_multiplier = regime.map_or(1.0, |r| r.permissions.size_multiplier);
        let confidence_multiplier = 0.5 + signal.confidence * 0.5;
        let percent = self.config.base_risk_percent / 100.0 * regime_multiplier
            * confidence_multiplier;
        let mut risk_amount =
            self.account_balance * Decimal::from_f64(percent).unwrap_or_default();

        let mut quantity = risk_amount / stop_distance;
        let mut notional_value = quantity * price;

        // Scale down to the hard notional cap; the cap is hit exactly.
        if notional_value > self.config.max_position_size_usd {
            quantity = self.config.max_position_size_usd / price;
            notional_value = self.config.max_position_size_usd;
            risk_amount = quantity * stop_distance;
        }

        let reward_ratio = signal.take_profit.map_or(0.0, |tp| {
            ((tp - price).abs() / stop_distance).to_f64().unwrap_or(0.0)
        });

        let risk_percent = (risk_amount / self.account_balance * HUNDRED)
            .to_f64()
            .unwrap_or(0.0);

        if reward_ratio < self.config.min_risk_reward_ratio {
            // Computed fields stay populated for diagnostics.
            return PositionSize {
                quantity,
                notional_value,
                risk_amount,
                risk_percent,
                stop_distance,
                reward_ratio,
                approved: false,
                rejection_reason: Some(format!(
                    "Risk/reward too low: {:.2} < {}",
                    reward_ratio, self.config.min_risk_reward_ratio
                )),
            };
        }

        info!(
            %quantity,
            %notional_value,
            %risk_amount,
            risk_percent,
            reward_ratio,
            regime_multiplier,
            "position sized"
        );

        PositionSize {
            quantity,
            notional_value,
            risk_amount,
            risk_percent,
            stop_distance,
            reward_ratio,
            approved: true,
            rejection_reason: None,
        }
    }

    #[must_use]
    pub fn status(&self) -> RiskStatus {
        let loss_limit = self.daily_loss_limit();
        let remaining = if self.daily_pnl < Decimal::ZERO {
            loss_limit - self.daily_pnl.abs()
        } else {
            loss_limit
        };
        RiskStatus {
            account_balance: self.account_balance,
            base_risk_percent: self.config.base_risk_percent,
            daily_pnl: self.daily_pnl,
            trades_today: self.trades_today,
            daily_loss_limit: loss_limit,
            daily_loss_remaining: remaining,
            daily_limit_hit: remaining <= Decimal::ZERO,
            open_positions: self.open_positions,
            max_open_positions: self.config.max_open_positions,
            position_limit_reached: self.open_positions >= self.config.max_open_positions,
            max_position_size_usd: self.config.max_position_size_usd,
            min_risk_reward: self.config.min_risk_reward_ratio,
        }
    }

    fn daily_loss_limit(&self) -> Decimal {
        self.account_balance
            * Decimal::from_f64(self.config.max_daily_loss_percent / 100.0).unwrap_or_default()
    }

    fn reset_daily_stats(&mut self, today: NaiveDate) {
        if today > self.last_reset {
            info!(previous_pnl = %self.daily_pnl, "daily stats reset");
            self.daily_pnl = Decimal::ZERO;
            self.trades_today = 0;
            self.last_reset = today;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use macro_trade_core::regime::RegimeState;
    use macro_trade_core::signal::SignalType;
    use rust_decimal_macros::dec;

    fn signal(confidence: f64, stop: Option<Decimal>, target: Option<Decimal>) -> ExecutionSignal {
        ExecutionSignal {
            signal_type: SignalType::EntryLong,
            timestamp: Utc::now(),
            price: dec!(1000),
            confidence,
            stop_loss: stop,
            take_profit: target,
            reason: String::new(),
            supporting_factors: vec![],
        }
    }

    fn regime_output(state: RegimeState) -> RegimeOutput {
        RegimeOutput {
            state,
            confidence: 1.0,
            index_contribution: 0.0,
            dominance_contribution: 0.0,
            news_contribution: 0.0,
            permissions: state.permissions(),
            timestamp: Utc::now(),
            time_in_state_secs: 0.0,
            state_history: vec![state],
        }
    }

    #[test]
    fn canonical_sizing_scenario() {
        // Balance 1000, base risk 1%, multiplier 1.0, confidence 1.0,
        // stop distance 100: risk 10, quantity 0.1.
        let mut risk = RiskManager::new(RiskConfig::default());
        let signal = signal(1.0, Some(dec!(900)), Some(dec!(1200)));
        let regime = regime_output(RegimeState::RiskOn);

        let size = risk.calculate_position_size(&signal, Some(&regime), dec!(1000));
        assert!(size.approved, "{:?}", size.rejection_reason);
        assert_eq!(size.risk_amount, dec!(10));
        assert_eq!(size.quantity, dec!(0.1));
        assert_eq!(size.notional_value, dec!(100));
        assert_eq!(size.reward_ratio, 2.0);
    }

    #[test]
    fn notional_cap_is_hit_exactly() {
        let mut risk = RiskManager::new(RiskConfig::default());
        // Tiny stop distance forces a huge uncapped quantity.
        let signal = signal(1.0, Some(dec!(999)), Some(dec!(1010)));
        let size = risk.calculate_position_size(&signal, None, dec!(1000));
        assert!(size.approved, "{:?}", size.rejection_reason);
        assert_eq!(size.notional_value, dec!(1000));
        assert_eq!(size.quantity, dec!(1));
        // Risk recomputed from the scaled quantity.
        assert_eq!(size.risk_amount, dec!(1));
    }

    #[test]
    fn missing_stop_is_rejected() {
        let mut risk = RiskManager::new(RiskConfig::default());
        let size = risk.calculate_position_size(&signal(1.0, None, None), None, dec!(1000));
        assert!(!size.approved);
        assert_eq!(size.rejection_reason.as_deref(), Some("No stop loss defined"));
    }

    #[test]
    fn zero_stop_distance_is_rejected() {
        let mut risk = RiskManager::new(RiskConfig::default());
        let size =
            risk.calculate_position_size(&signal(1.0, Some(dec!(1000)), None), None, dec!(1000));
        assert!(!size.approved);
        assert_eq!(
            size.rejection_reason.as_deref(),
            Some("Stop loss too close to entry")
        );
    }

    #[test]
    fn open_position_cap_rejects_regardless_of_signal_quality() {
        let mut risk = RiskManager::new(RiskConfig::default());
        for _ in 0..3 {
            risk.increment_open_positions();
        }
        let size = risk.calculate_position_size(
            &signal(1.0, Some(dec!(900)), Some(dec!(1500))),
            None,
            dec!(1000),
        );
        assert!(!size.approved);
        assert!(size
            .rejection_reason
            .as_deref()
            .unwrap()
            .contains("Max open positions"));
    }

    #[test]
    fn daily_loss_limit_blocks_sizing() {
        let mut risk = RiskManager::new(RiskConfig::default());
        // Default limit is 5% of 1000.
        risk.record_trade_result(dec!(-60));
        let size = risk.calculate_position_size(
            &signal(1.0, Some(dec!(900)), Some(dec!(1500))),
            None,
            dec!(1000),
        );
        assert!(!size.approved);
        assert!(size
            .rejection_reason
            .as_deref()
            .unwrap()
            .contains("Daily loss limit"));
    }

    #[test]
    fn daily_stats_reset_on_utc_rollover() {
        let mut risk = RiskManager::new(RiskConfig::default());
        risk.record_trade_result(dec!(-60));
        risk.last_reset = Utc::now().date_naive() - Duration::days(1);

        risk.reset_daily_stats(Utc::now().date_naive());
        assert_eq!(risk.daily_pnl, Decimal::ZERO);
        assert_eq!(risk.trades_today, 0);

        let size = risk.calculate_position_size(
            &signal(1.0, Some(dec!(900)), Some(dec!(1500))),
            None,
            dec!(1000),
        );
        assert!(size.approved);
    }

    #[test]
    fn low_reward_ratio_keeps_computed_fields() {
        let mut risk = RiskManager::new(RiskConfig::default());
        let size = risk.calculate_position_size(
            &signal(1.0, Some(dec!(900)), Some(dec!(1050))),
            None,
            dec!(1000),
        );
        assert!(!size.approved);
        assert_eq!(size.reward_ratio, 0.5);
        assert_eq!(size.quantity, dec!(0.1));
        assert!(size
            .rejection_reason
            .as_deref()
            .unwrap()
            .contains("Risk/reward too low"));
    }

    #[test]
    fn regime_multiplier_halves_risk_off_size() {
        let mut risk = RiskManager::new(RiskConfig::default());
        let signal = signal(1.0, Some(dec!(900)), Some(dec!(1200)));
        let risk_off = regime_output(RegimeState::RiskOff);
        let size = risk.calculate_position_size(&signal, Some(&risk_off), dec!(1000));
        assert!(size.approved);
        assert_eq!(size.risk_amount, dec!(5));
        assert_eq!(size.quantity, dec!(0.05));
    }

    #[test]
    fn confidence_scales_between_half_and_full() {
        let mut risk = RiskManager::new(RiskConfig::default());
        let half = risk.calculate_position_size(
            &signal(0.0, Some(dec!(900)), Some(dec!(1200))),
            None,
            dec!(1000),
        );
        assert_eq!(half.risk_amount, dec!(5));

        let full = risk.calculate_position_size(
            &signal(1.0, Some(dec!(900)), Some(dec!(1200))),
            None,
            dec!(1000),
        );
        assert_eq!(full.risk_amount, dec!(10));
    }
}
