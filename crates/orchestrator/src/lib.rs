pub mod engine;
pub mod latest;
pub mod poll;

pub use engine::TradingOrchestrator;
pub use latest::LatestValues;
pub use poll::poll_with_retry;
