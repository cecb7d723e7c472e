use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Top-level configuration. Every threshold the engines use lives here
/// as a named, overridable value; the defaults reproduce the tuned
/// production constants.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub symbol: String,
    pub stream: StreamConfig,
    pub trend: TrendConfig,
    pub flow: FlowConfig,
    pub regime: RegimeConfig,
    pub liquidity: LiquidityConfig,
    pub risk: RiskConfig,
    pub scheduler: SchedulerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub ws_url: String,
    pub ping_interval_secs: u64,
    pub connect_timeout_secs: u64,
    pub orderbook_depth: usize,
    pub orderbook_publish_hz: f64,
    pub trade_batch_window_ms: u64,
    pub queue_capacity: usize,
    pub reconnect_base_secs: f64,
    pub reconnect_max_secs: f64,
    pub reconnect_jitter_secs: f64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            ws_url: "wss://stream.bybit.com/v5/public/linear".to_string(),
            ping_interval_secs: 20,
            connect_timeout_secs: 10,
            orderbook_depth: 50,
            orderbook_publish_hz: 2.0,
            trade_batch_window_ms: 500,
            queue_capacity: 2000,
            reconnect_base_secs: 2.0,
            reconnect_max_secs: 60.0,
            reconnect_jitter_secs: 0.5,
        }
    }
}

/// Slope thresholds for one macro indicator, in percent per period.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct TrendThresholds {
    pub weak_slope: f64,
    pub strong_slope: f64,
    pub lookback_periods: usize,
}

impl Default for TrendThresholds {
    fn default() -> Self {
        Self {
            weak_slope: 0.1,
            strong_slope: 0.5,
            lookback_periods: 24,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrendConfig {
    pub index: TrendThresholds,
    pub dominance: TrendThresholds,
    pub max_history: usize,
}

impl Default for TrendConfig {
    fn default() -> Self {
        Self {
            index: TrendThresholds::default(),
            dominance: TrendThresholds {
                weak_slope: 0.2,
                strong_slope: 0.2,
                lookback_periods: 24,
            },
            max_history: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowConfig {
    pub lookback_periods: usize,
    pub max_history: usize,
    /// Percent change in dominance considered a strong flow.
    pub strong_flow_threshold: f64,
    pub weak_flow_threshold: f64,
    pub momentum_threshold: f64,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            lookback_periods: 24,
            max_history: 200,
            strong_flow_threshold: 0.5,
            weak_flow_threshold: 0.2,
            momentum_threshold: 0.1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegimeConfig {
    /// Minimum seconds in a state before a transition is allowed.
    pub min_time_in_state_secs: u64,
    pub confidence_threshold: f64,
    pub index_weight: f64,
    pub dominance_weight: f64,
    pub news_weight: f64,
    pub state_history_len: usize,
}

impl Default for RegimeConfig {
    fn default() -> Self {
        Self {
            min_time_in_state_secs: 3600,
            confidence_threshold: 0.6,
            index_weight: 0.4,
            dominance_weight: 0.3,
            news_weight: 0.3,
            state_history_len: 50,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LiquidityConfig {
    pub max_kline_history: usize,
    pub visible_range_window: usize,
    pub orderbook_depth_levels: usize,
    pub imbalance_threshold: f64,
    pub max_zones_per_side: usize,
}

impl Default for LiquidityConfig {
    fn default() -> Self {
        Self {
            max_kline_history: 100,
            visible_range_window: 20,
            orderbook_depth_levels: 20,
            imbalance_threshold: 1.5,
            max_zones_per_side: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    pub account_balance: Decimal,
    /// Percent of balance risked per trade before multipliers.
    pub base_risk_percent: f64,
    pub max_daily_loss_percent: f64,
    pub max_open_positions: usize,
    pub min_risk_reward_ratio: f64,
    pub max_position_size_usd: Decimal,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            account_balance: Decimal::from(1000),
            base_risk_percent: 1.0,
            max_daily_loss_percent: 5.0,
            max_open_positions: 3,
            min_risk_reward_ratio: 1.5,
            max_position_size_usd: Decimal::from(1000),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub macro_poll_secs: u64,
    pub regime_update_secs: u64,
    pub regime_warmup_secs: u64,
    pub execution_interval_secs: u64,
    pub execution_warmup_secs: u64,
    /// Minimum signal confidence before sizing is attempted.
    pub min_entry_confidence: f64,
    pub poll_retry_attempts: u32,
    pub poll_retry_base_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            macro_poll_secs: 3600,
            regime_update_secs: 300,
            regime_warmup_secs: 30,
            execution_interval_secs: 30,
            execution_warmup_secs: 60,
            min_entry_confidence: 0.6,
            poll_retry_attempts: 3,
            poll_retry_base_ms: 500,
        }
    }
}

impl AppConfig {
    #[must_use]
    pub fn for_symbol(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn defaults_match_production_constants() {
        let config = AppConfig::default();
        assert_eq!(config.regime.confidence_threshold, 0.6);
        assert_eq!(config.regime.min_time_in_state_secs, 3600);
        assert_eq!(config.risk.max_open_positions, 3);
        assert_eq!(config.risk.max_position_size_usd, dec!(1000));
        assert_eq!(config.stream.queue_capacity, 2000);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config: AppConfig =
            serde_json::from_str(r#"{"symbol": "ETHUSDT", "risk": {"max_open_positions": 5}}"#)
                .unwrap();
        assert_eq!(config.symbol, "ETHUSDT");
        assert_eq!(config.risk.max_open_positions, 5);
        assert_eq!(config.risk.base_risk_percent, 1.0);
    }
}
