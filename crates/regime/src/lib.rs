//! Market regime state machine. Fuses the macro trend reads and the
//! news summary into a weighted score per candidate regime, then
//! applies anti-flip hysteresis before committing a transition.

use chrono::{DateTime, Utc};
use macro_trade_core::config::RegimeConfig;
use macro_trade_core::market::{NewsAlignment, NewsSignalSummary, RiskSignal};
use macro_trade_core::regime::{
    RegimeInput, RegimeOutput, RegimePermissions, RegimeState, RegimeTransition, TrendData,
    TrendDirection, TrendStrength,
};
use serde::Serialize;
use std::collections::VecDeque;
use tracing::{debug, info, warn};

type Scores = [f64; 4];

pub struct RegimeEngine {
    config: RegimeConfig,
    current_state: RegimeState,
    state_entered_at: DateTime<Utc>,
    last_update: DateTime<Utc>,
    state_history: VecDeque<RegimeState>,
    transitions: Vec<RegimeTransition>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegimeStatus {
    pub current_state: RegimeState,
    pub time_in_state_secs: f64,
    pub state_entered_at: DateTime<Utc>,
    pub last_update: DateTime<Utc>,
    pub permissions: RegimePermissions,
    pub recent_transitions: Vec<RegimeTransition>,
    pub state_history: Vec<RegimeState>,
}

impl RegimeEngine {
    #[must_use]
    pub fn new(config: RegimeConfig) -> Self {
        let now = Utc::now();
        info!(state = %RegimeState::Chop, "regime engine initialized");
        Self {
            state_history: VecDeque::with_capacity(config.state_history_len),
            config,
            current_state: RegimeState::Chop,
            state_entered_at: now,
            last_update: now,
            transitions: Vec::new(),
        }
    }

    #[must_use]
    pub const fn current_state(&self) -> RegimeState {
        self.current_state
    }

    /// Evaluate the inputs and possibly transition. The output always
    /// carries the current state, even when the candidate was rejected.
    pub fn update(&mut self, input: &RegimeInput) -> RegimeOutput {
        let scores = self.score(input);

        let candidate = RegimeState::ALL
            .into_iter()
            .max_by(|a, b| {
                scores[a.index()]
                    .partial_cmp(&scores[b.index()])
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .unwrap_or(RegimeState::Chop);
        let confidence = scores[candidate.index()];

        let index_contribution = input
            .index_trend
            .as_ref()
            .map_or(0.0, |t| index_contribution(t)[candidate.index()]);
        let dominance_contribution = input
            .dominance_trend
            .as_ref()
            .map_or(0.0, |t| dominance_contribution(t)[candidate.index()]);
        let news_contribution = input
            .news
            .as_ref()
            .map_or(0.0, |n| news_contribution(n)[candidate.index()]);

        if self.should_transition(candidate, confidence) {
            let reason = build_reason(input);
            let transition = RegimeTransition {
                from_state: self.current_state,
                to_state: candidate,
                reason: reason.clone(),
                confidence,
                timestamp: Utc::now(),
            };
            info!(
                from = %transition.from_state,
                to = %transition.to_state,
                confidence,
                reason,
                "regime transition"
            );
            self.transitions.push(transition);
            self.current_state = candidate;
            self.state_entered_at = Utc::now();
        }

        if self.state_history.len() >= self.config.state_history_len {
            self.state_history.pop_front();
        }
        self.state_history.push_back(self.current_state);
        self.last_update = Utc::now();

        RegimeOutput {
            state: self.current_state,
            confidence,
            index_contribution,
            dominance_contribution,
            news_contribution,
            permissions: self.current_state.permissions(),
            timestamp: self.last_update,
            time_in_state_secs: self.time_in_state(),
            state_history: self.state_history.iter().copied().collect(),
        }
    }

    /// Operator override: bypasses both hysteresis checks but still
    /// records the transition.
    pub fn force_state(&mut self, state: RegimeState, reason: impl Into<String>) {
        if state == self.current_state {
            return;
        }
        let transition = RegimeTransition {
            from_state: self.current_state,
            to_state: state,
            reason: reason.into(),
            confidence: 1.0,
            timestamp: Utc::now(),
        };
        warn!(from = %transition.from_state, to = %state, "forced regime transition");
        self.transitions.push(transition);
        self.current_state = state;
        self.state_entered_at = Utc::now();
    }

    #[must_use]
    pub fn status(&self) -> RegimeStatus {
        let recent = self.transitions.len().saturating_sub(5);
        RegimeStatus {
            current_state: self.current_state,
            time_in_state_secs: self.time_in_state(),
            state_entered_at: self.state_entered_at,
            last_update: self.last_update,
            permissions: self.current_state.permissions(),
            recent_transitions: self.transitions[recent..].to_vec(),
            state_history: self.state_history.iter().copied().collect(),
        }
    }

    #[must_use]
    pub fn transitions(&self) -> &[RegimeTransition] {
        &self.transitions
    }

    fn time_in_state(&self) -> f64 {
        (Utc::now() - self.state_entered_at)
            .to_std()
            .map_or(0.0, |d| d.as_secs_f64())
    }

    fn score(&self, input: &RegimeInput) -> Scores {
        let mut scores = [0.0; 4];

        if let Some(trend) = &input.index_trend {
            accumulate(&mut scores, index_contribution(trend), self.config.index_weight);
        }
        if let Some(trend) = &input.dominance_trend {
            accumulate(
                &mut scores,
                dominance_contribution(trend),
                self.config.dominance_weight,
            );
        }
        if let Some(news) = &input.news {
            accumulate(&mut scores, news_contribution(news), self.config.news_weight);
        }

        let total: f64 = scores.iter().sum();
        if total > 0.0 {
            for score in &mut scores {
                *score /= total;
            }
        }
        scores
    }

    fn should_transition(&self, candidate: RegimeState, confidence: f64) -> bool {
        if candidate == self.current_state {
            return false;
        }
        if confidence < self.config.confidence_threshold {
            debug!(
                confidence,
                threshold = self.config.confidence_threshold,
                "confidence below threshold"
            );
            return false;
        }
        let dwell = self.time_in_state();
        if dwell < self.config.min_time_in_state_secs as f64 {
            debug!(
                dwell,
                minimum = self.config.min_time_in_state_secs,
                "dwell time below minimum"
            );
            return false;
        }
        true
    }
}

fn accumulate(scores: &mut Scores, contribution: Scores, weight: f64) {
    for (score, value) in scores.iter_mut().zip(contribution) {
        *score += value * weight;
    }
}

const fn strength_multiplier(strength: TrendStrength) -> f64 {
    match strength {
        TrendStrength::Strong => 1.0,
        TrendStrength::Weak => 0.5,
        TrendStrength::None => 0.0,
    }
}

/// A rising currency index reads risk-off, a falling one risk-on, flat
/// feeds chop.
fn index_contribution(trend: &TrendData) -> Scores {
    let mut scores = [0.0; 4];
    let multiplier = strength_multiplier(trend.strength);
    match trend.direction {
        TrendDirection::Up => scores[RegimeState::RiskOff.index()] = multiplier,
        TrendDirection::Down => scores[RegimeState::RiskOn.index()] = multiplier,
        TrendDirection::Flat => scores[RegimeState::Chop.index()] = 0.5,
    }
    scores
}

/// Rising dominance leans decoupled with a risk-off tint; falling
/// dominance is risk-on rotation into the wider market.
fn dominance_contribution(trend: &TrendData) -> Scores {
    let mut scores = [0.0; 4];
    let multiplier = strength_multiplier(trend.strength);
    match trend.direction {
        TrendDirection::Up => {
            scores[RegimeState::Decoupled.index()] = 0.6 * multiplier;
            scores[RegimeState::RiskOff.index()] = 0.4 * multiplier;
        }
        TrendDirection::Down => {
            scores[RegimeState::RiskOn.index()] = 0.7 * multiplier;
            scores[RegimeState::Decoupled.index()] = 0.3 * multiplier;
        }
        TrendDirection::Flat => scores[RegimeState::Chop.index()] = 0.5,
    }
    scores
}

fn news_contribution(news: &NewsSignalSummary) -> Scores {
    let mut scores = [0.0; 4];
    if news.news_count == 0 {
        scores[RegimeState::Chop.index()] = 0.3;
        return scores;
    }

    match news.risk_signal {
        RiskSignal::RiskOff => scores[RegimeState::RiskOff.index()] = 0.8,
        RiskSignal::RiskOn => scores[RegimeState::RiskOn.index()] = 0.8,
        RiskSignal::Neutral => scores[RegimeState::Chop.index()] = 0.3,
    }

    match news.alignment {
        NewsAlignment::Decoupled => scores[RegimeState::Decoupled.index()] += 0.5,
        NewsAlignment::Aligned => match news.risk_signal {
            RiskSignal::RiskOff => scores[RegimeState::RiskOff.index()] += 0.2,
            RiskSignal::RiskOn => scores[RegimeState::RiskOn.index()] += 0.2,
            RiskSignal::Neutral => {}
        },
        NewsAlignment::Neutral => {}
    }

    // Impactful news argues against a choppy read.
    if news.high_impact_count > 0 {
        scores[RegimeState::Chop.index()] *= 0.5;
    }

    scores
}

fn build_reason(input: &RegimeInput) -> String {
    let mut reasons = Vec::new();
    if let Some(trend) = &input.index_trend {
        reasons.push(format!("Index {}", trend.describe()));
    }
    if let Some(trend) = &input.dominance_trend {
        reasons.push(format!("Dominance {}", trend.describe()));
    }
    if let Some(news) = &input.news {
        if news.risk_signal != RiskSignal::Neutral {
            reasons.push(format!("News: {:?}", news.risk_signal));
        }
    }
    if reasons.is_empty() {
        "Low conviction".to_string()
    } else {
        reasons.join(" | ")
    }
}
