//! Confidence Gate
//!
//! Applies the acceptance threshold to the top-ranked prediction. A prediction
//! below the threshold is a non-fatal outcome, not an error.

use super::classifier::RankedLabel;

/// Gate decision
#[derive(Debug, Clone, PartialEq)]
pub enum GateOutcome {
    /// Probability at or above threshold; label and probability unmodified
    Accepted(RankedLabel),
    /// Probability below threshold (NaN counts as below)
    LowConfidence(RankedLabel),
}

impl GateOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, GateOutcome::Accepted(_))
    }

    pub fn ranked(&self) -> &RankedLabel {
        match self {
            GateOutcome::Accepted(ranked) | GateOutcome::LowConfidence(ranked) => ranked,
        }
    }
}

/// Threshold-based acceptance policy
#[derive(Debug, Clone, Copy)]
pub struct ConfidenceGate {
    threshold: f32,
}

impl ConfidenceGate {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn gate(&self, ranked: RankedLabel) -> GateOutcome {
        if !(ranked.probability >= self.threshold) {
            GateOutcome::LowConfidence(ranked)
        } else {
            GateOutcome::Accepted(ranked)
        }
    }
}

impl Default for ConfidenceGate {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_CONFIDENCE_THRESHOLD)
    }
}
