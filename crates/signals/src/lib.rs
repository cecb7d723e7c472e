pub mod capital_flow;
pub mod liquidity;
pub mod trend;

pub use capital_flow::CapitalFlowAnalyzer;
pub use liquidity::{LiquidityEngine, LiquidityStatus, NearestLevels};
pub use trend::{DominanceSignal, TrendAnalyzer};
