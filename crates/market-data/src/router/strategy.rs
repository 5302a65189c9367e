use std::fmt;
use std::str::FromStr;

use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::errors::MarketDataError;

/// How the router picks one provider among scored candidates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionStrategy {
    /// Sample proportionally to the composite score. Lower-scored providers
    /// keep receiving some traffic so a recovery is noticed.
    #[default]
    WeightedRandom,
    /// Always take the best composite score.
    HighestScore,
    /// Take the provider with the lowest average latency.
    LowestLatency,
    /// Rotate through candidates.
    RoundRobin,
}

impl SelectionStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WeightedRandom => "weighted_random",
            Self::HighestScore => "highest_score",
            Self::LowestLatency => "lowest_latency",
            Self::RoundRobin => "round_robin",
        }
    }
}

impl fmt::Display for SelectionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SelectionStrategy {
    type Err = MarketDataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "weighted_random" | "weighted" => Ok(Self::WeightedRandom),
            "highest_score" | "best" => Ok(Self::HighestScore),
            "lowest_latency" | "latency" => Ok(Self::LowestLatency),
            "round_robin" => Ok(Self::RoundRobin),
            other => Err(MarketDataError::InvalidConfig {
                key: "strategy".to_string(),
                message: format!("unknown selection strategy '{other}'"),
            }),
        }
    }
}

/// Picks an index with probability proportional to its score.
///
/// Scores are shifted by the minimum when it is negative, then every weight
/// gets `floor` added so no candidate drops to zero probability.
pub(crate) fn weighted_index<R: Rng + ?Sized>(scores: &[f64], floor: f64, rng: &mut R) -> usize {
    if scores.len() <= 1 {
        return 0;
    }

    let min = scores.iter().copied().fold(f64::INFINITY, f64::min);
    let shift = if min < 0.0 { -min } else { 0.0 };
    let weights: Vec<f64> = scores
        .iter()
        .map(|s| {
            let w = s + shift + floor;
            if w.is_finite() && w > 0.0 {
                w
            } else {
                floor.max(f64::MIN_POSITIVE)
            }
        })
        .collect();

    match WeightedIndex::new(&weights) {
        Ok(dist) => dist.sample(rng),
        Err(_) => rng.gen_range(0..scores.len()),
    }
}

/// Index of the largest score; the first one wins ties.
pub(crate) fn best_index(scores: &[f64]) -> usize {
    let mut best = 0;
    for (i, score) in scores.iter().enumerate() {
        if *score > scores[best] {
            best = i;
        }
    }
    best
}

/// Index of the smallest latency; the first one wins ties.
pub(crate) fn lowest_index(latencies: &[f64]) -> usize {
    let mut best = 0;
    for (i, latency) in latencies.iter().enumerate() {
        if *latency < latencies[best] {
            best = i;
        }
    }
    best
}
