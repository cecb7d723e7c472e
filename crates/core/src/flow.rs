use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Direction of capital rotation implied by the dominance ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowDirection {
    Inflow,
    Outflow,
    Neutral,
}

/// Whether the flow favors continuation or mean reversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowBias {
    Continuation,
    MeanReversion,
    Neutral,
}

/// Fill state of the dominance history behind the analyzer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowStatus {
    pub data_points: usize,
    pub max_history: usize,
    pub last_update: Option<DateTime<Utc>>,
    /// True once enough points exist to analyze.
    pub ready: bool,
}

/// Output of the capital-flow analyzer. Recomputed from the bounded
/// dominance history; only the latest value is retained by consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapitalFlowSignal {
    pub timestamp: DateTime<Utc>,
    pub flow_direction: FlowDirection,
    /// Blended strength of the move, always within [0, 1].
    pub flow_strength: f64,
    /// Signed rate of change over the short window, in percent.
    pub momentum: f64,
    pub bias: FlowBias,
    /// Always within [0, 1]; discounted under divergence.
    pub confidence: f64,
    pub supporting_factors: Vec<String>,
}
