pub mod config;
pub mod config_loader;
pub mod flow;
pub mod liquidity;
pub mod market;
pub mod position;
pub mod regime;
pub mod signal;
pub mod traits;

pub use config::{
    AppConfig, FlowConfig, LiquidityConfig, RegimeConfig, RiskConfig, SchedulerConfig,
    StreamConfig, TrendConfig, TrendThresholds,
};
pub use config_loader::ConfigLoader;
pub use flow::{CapitalFlowSignal, FlowBias, FlowDirection};
pub use liquidity::{LevelKind, LiquidityLevel, LiquidityZone, Session, ZoneSide};
pub use market::{
    Kline, MacroPoint, NewsAlignment, NewsSignalSummary, OrderBook, OrderBookLevel, RiskSignal,
    Side, Timeframe, Trade,
};
pub use position::{Position, PositionSide, PositionStatus};
pub use regime::{
    RegimeInput, RegimeOutput, RegimePermissions, RegimeState, RegimeTransition, TrendData,
    TrendDirection, TrendStrength,
};
pub use signal::{ExecutionSignal, PositionSize, SignalType};
pub use traits::{
    KlineHistorySource, MacroSource, NewsSignalSource, OrderAck, OrderRequest, OrderRouter,
};
