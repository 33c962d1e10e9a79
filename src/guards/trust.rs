//! Trust scoring for retrieved chunks and context budget derivation.
//!
//! Scores start from a neutral baseline and move by fixed additive factors;
//! the resulting value picks one of exactly two context budget tiers. The
//! budget never takes an arbitrary value in between.

use std::sync::Arc;

use serde::Serialize;

use crate::patterns::PatternCatalog;

const NEUTRAL_BASELINE: f64 = 0.5;
const SUSPICIOUS_PENALTY: f64 = -0.3;
const MARKER_PENALTY: f64 = -0.25;
const STRUCTURE_BONUS: f64 = 0.1;
const SHORT_CHUNK_PENALTY: f64 = -0.1;
const LONG_CHUNK_PENALTY: f64 = -0.05;

/// Chunks shorter than this are penalized as too thin to trust.
const SHORT_CHUNK_CHARS: usize = 50;
/// Chunks longer than this are lightly penalized.
const LONG_CHUNK_CHARS: usize = 2000;

/// The additive factors applied on top of the neutral baseline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct TrustFactors {
    pub suspicious_pattern_penalty: f64,
    pub system_marker_penalty: f64,
    pub structure_bonus: f64,
    pub length_adjustment: f64,
}

impl TrustFactors {
    pub fn sum(&self) -> f64 {
        self.suspicious_pattern_penalty
            + self.system_marker_penalty
            + self.structure_bonus
            + self.length_adjustment
    }
}

/// Request-scoped trust estimate for one chunk.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TrustScore {
    /// `clamp(0.5 + sum(factors), 0, 1)`.
    pub value: f64,
    pub factors: TrustFactors,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetTier {
    HighTrust,
    LowTrust,
}

/// One of the two context budget tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ContextBudget {
    pub tier: BudgetTier,
    pub max_chars: usize,
}

/// Assigns trust values to retrieved chunks and derives the context budget.
#[derive(Debug, Clone)]
pub struct TrustScorer {
    catalog: Arc<PatternCatalog>,
    trust_threshold: f64,
    low_budget_chars: usize,
    high_budget_chars: usize,
}

impl TrustScorer {
    pub fn new(
        catalog: Arc<PatternCatalog>,
        trust_threshold: f64,
        low_budget_chars: usize,
        high_budget_chars: usize,
    ) -> Self {
        Self {
            catalog,
            trust_threshold,
            low_budget_chars,
            high_budget_chars,
        }
    }

    /// Score one (already sanitized) chunk.
    pub fn score(&self, chunk_text: &str) -> TrustScore {
        let mut factors = TrustFactors::default();

        if self
            .catalog
            .suspicious_signals()
            .iter()
            .any(|s| s.matcher.is_match(chunk_text))
        {
            factors.suspicious_pattern_penalty = SUSPICIOUS_PENALTY;
        }

        if self
            .catalog
            .system_marker_signals()
            .iter()
            .any(|s| s.matcher.is_match(chunk_text))
        {
            factors.system_marker_penalty = MARKER_PENALTY;
        }

        if self
            .catalog
            .structure_signals()
            .iter()
            .any(|s| s.matcher.is_match(chunk_text))
        {
            factors.structure_bonus = STRUCTURE_BONUS;
        }

        let chars = chunk_text.chars().count();
        if chars < SHORT_CHUNK_CHARS {
            factors.length_adjustment = SHORT_CHUNK_PENALTY;
        } else if chars > LONG_CHUNK_CHARS {
            factors.length_adjustment = LONG_CHUNK_PENALTY;
        }

        TrustScore {
            value: (NEUTRAL_BASELINE + factors.sum()).clamp(0.0, 1.0),
            factors,
        }
    }

    /// Select the budget tier for an aggregate trust value.
    pub fn budget_for(&self, trust: f64) -> ContextBudget {
        if trust >= self.trust_threshold {
            ContextBudget {
                tier: BudgetTier::HighTrust,
                max_chars: self.high_budget_chars,
            }
        } else {
            ContextBudget {
                tier: BudgetTier::LowTrust,
                max_chars: self.low_budget_chars,
            }
        }
    }
}
