pub mod engine;
pub mod risk;
pub mod structure;
pub mod trade_manager;

pub use engine::{ExecutionEngine, ExecutionStatus, OrderFlow, OrderFlowImbalance};
pub use risk::{RiskManager, RiskStatus};
pub use structure::{MarketStructure, StructureTrend};
pub use trade_manager::{ExitRequest, FailClosedRouter, PositionSummary, TradeManager};
