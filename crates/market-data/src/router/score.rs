//! Per-provider performance tracking.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::config::RouterConfig;

/// Running performance record of one provider.
///
/// `score` is the lifetime performance score used for routing, bounded by
/// the router's `[min_score, max_score]`. `recent_scores` holds the outcome
/// score of each of the last attempts; periodic decay pulls `score` toward
/// their mean.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProviderScore {
    pub provider: String,
    pub total_requests: u64,
    pub successful_requests: u64,

    /// Running mean latency of successful calls, in milliseconds
    pub avg_latency_ms: f64,

    pub consecutive_failures: u32,
    pub last_error: Option<String>,
    pub last_used: Option<DateTime<Utc>>,
    pub score: f64,
    pub recent_scores: VecDeque<f64>,
}

impl ProviderScore {
    pub fn new(provider: impl Into<String>, initial_score: f64) -> Self {
        Self {
            provider: provider.into(),
            total_requests: 0,
            successful_requests: 0,
            avg_latency_ms: 0.0,
            consecutive_failures: 0,
            last_error: None,
            last_used: None,
            score: initial_score,
            recent_scores: VecDeque::new(),
        }
    }

    /// Fraction of requests that succeeded; 0 before the first request.
    pub fn success_rate(&self) -> f64 {
        if self.total_requests == 0 {
            return 0.0;
        }
        self.successful_requests as f64 / self.total_requests as f64
    }

    /// Mean of the recent window, if any attempt was recorded.
    pub fn recent_mean(&self) -> Option<f64> {
        if self.recent_scores.is_empty() {
            return None;
        }
        Some(self.recent_scores.iter().sum::<f64>() / self.recent_scores.len() as f64)
    }

    /// Success bonus shrinks with latency: `bonus / (1 + latency_s)`.
    pub(crate) fn record_success(&mut self, latency_ms: f64, config: &RouterConfig) {
        let latency_ms = latency_ms.max(0.0);
        self.total_requests += 1;
        self.successful_requests += 1;
        self.consecutive_failures = 0;
        self.last_used = Some(Utc::now());

        let n = self.successful_requests as f64;
        self.avg_latency_ms += (latency_ms - self.avg_latency_ms) / n;

        let delta = config.success_bonus / (1.0 + latency_ms / 1000.0);
        self.score = clamp(self.score + delta, config);
        self.push_recent(config.initial_score + delta, config);
    }

    pub(crate) fn record_failure(&mut self, error: &str, config: &RouterConfig) {
        self.total_requests += 1;
        self.consecutive_failures += 1;
        self.last_error = Some(error.to_string());
        self.last_used = Some(Utc::now());

        self.score = clamp(self.score - config.failure_penalty, config);
        self.push_recent(config.initial_score - config.failure_penalty, config);
    }

    /// `score = score * factor + recent * (1 - factor)`; recent falls back to
    /// the neutral score when the window is empty.
    pub(crate) fn apply_decay(&mut self, config: &RouterConfig) {
        let recent = self.recent_mean().unwrap_or(config.initial_score);
        let factor = config.decay_factor;
        self.score = clamp(self.score * factor + recent * (1.0 - factor), config);
    }

    fn push_recent(&mut self, outcome: f64, config: &RouterConfig) {
        if config.recent_window == 0 {
            return;
        }
        self.recent_scores.push_back(clamp(outcome, config));
        while self.recent_scores.len() > config.recent_window {
            self.recent_scores.pop_front();
        }
    }
}

fn clamp(score: f64, config: &RouterConfig) -> f64 {
    score.clamp(config.min_score, config.max_score)
}
