//! Weighted composite scoring with severity penalties.

use serde::{Deserialize, Serialize};

use crate::core::{EvaluationResult, Severity};
use crate::errors::ConfigError;

/// Weights applied to each sub-score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoringWeights {
    /// Weight of the clarity score.
    #[serde(default = "default_clarity_weight")]
    pub clarity: f64,
    /// Weight of the feasibility score.
    #[serde(default = "default_feasibility_weight")]
    pub feasibility: f64,
    /// Weight of the structure score.
    #[serde(default = "default_structure_weight")]
    pub structure: f64,
    /// Weight of the accessibility score.
    #[serde(default = "default_accessibility_weight")]
    pub accessibility: f64,
}

fn default_clarity_weight() -> f64 {
    0.3
}

fn default_feasibility_weight() -> f64 {
    0.3
}

fn default_structure_weight() -> f64 {
    0.2
}

fn default_accessibility_weight() -> f64 {
    0.2
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            clarity: default_clarity_weight(),
            feasibility: default_feasibility_weight(),
            structure: default_structure_weight(),
            accessibility: default_accessibility_weight(),
        }
    }
}

impl ScoringWeights {
    /// Sum of all weights.
    #[must_use]
    pub fn total(&self) -> f64 {
        self.clarity + self.feasibility + self.structure + self.accessibility
    }

    /// Checks that weights are non-negative and sum to one.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let all = [self.clarity, self.feasibility, self.structure, self.accessibility];
        if all.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(ConfigError::invalid("scoring.weights", "weights must be finite and non-negative"));
        }
        if (self.total() - 1.0).abs() > 1e-6 {
            return Err(ConfigError::invalid(
                "scoring.weights",
                format!("weights must sum to 1.0, got {}", self.total()),
            ));
        }
        Ok(())
    }
}

/// Points subtracted per issue of a given severity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeverityPenalties {
    /// Penalty per critical issue.
    #[serde(default = "default_critical_penalty")]
    pub critical: f64,
    /// Penalty per high-severity issue.
    #[serde(default = "default_high_penalty")]
    pub high: f64,
}

fn default_critical_penalty() -> f64 {
    1.0
}

fn default_high_penalty() -> f64 {
    0.5
}

impl Default for SeverityPenalties {
    fn default() -> Self {
        Self {
            critical: default_critical_penalty(),
            high: default_high_penalty(),
        }
    }
}

impl SeverityPenalties {
    /// Checks that penalties are non-negative.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if [self.critical, self.high].iter().any(|p| !p.is_finite() || *p < 0.0) {
            return Err(ConfigError::invalid("scoring.penalties", "penalties must be finite and non-negative"));
        }
        Ok(())
    }

    /// Total penalty for an evaluation's issues.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn total_for(&self, evaluation: &EvaluationResult) -> f64 {
        self.critical * evaluation.count_severity(Severity::Critical) as f64
            + self.high * evaluation.count_severity(Severity::High) as f64
    }
}

/// Weights and penalties used by spec selection.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Sub-score weights.
    #[serde(default)]
    pub weights: ScoringWeights,
    /// Severity penalties.
    #[serde(default)]
    pub penalties: SeverityPenalties,
}

impl ScoringConfig {
    /// Validates weights and penalties.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.weights.validate()?;
        self.penalties.validate()
    }
}

/// Computes the composite score of an evaluation.
///
/// Weighted sum of the normalized sub-scores minus severity penalties,
/// floored at zero. Pure: identical inputs always give identical outputs.
#[must_use]
pub fn composite_score(
    evaluation: &EvaluationResult,
    weights: &ScoringWeights,
    penalties: &SeverityPenalties,
) -> f64 {
    let scores = evaluation.scores.normalized();
    let weighted = scores.clarity * weights.clarity
        + scores.feasibility * weights.feasibility
        + scores.structure * weights.structure
        + scores.accessibility * weights.accessibility;
    (weighted - penalties.total_for(evaluation)).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Issue, SubScores};

    fn eval(clarity: f64, structure: f64, feasibility: f64, accessibility: f64) -> EvaluationResult {
        EvaluationResult::new(SubScores::new(clarity, structure, feasibility, accessibility))
    }

    #[test]
    fn test_default_weights() {
        let weights = ScoringWeights::default();
        assert!((weights.total() - 1.0).abs() < 1e-9);
        assert!(weights.validate().is_ok());
    }

    #[test]
    fn test_weighted_sum() {
        let score = composite_score(
            &eval(10.0, 5.0, 8.0, 6.0),
            &ScoringWeights::default(),
            &SeverityPenalties::default(),
        );
        // 3.0 + 2.4 + 1.0 + 1.2
        assert!((score - 7.6).abs() < 1e-9);
    }

    #[test]
    fn test_penalties_applied() {
        let evaluation = eval(8.0, 8.0, 8.0, 8.0)
            .with_issue(Issue::new("a11y", Severity::Critical, "No contrast", "Fix"))
            .with_issue(Issue::new("layout", Severity::High, "Cramped", "Fix"))
            .with_issue(Issue::new("copy", Severity::Medium, "Wordy", "Trim"));
        let score = composite_score(&evaluation, &ScoringWeights::default(), &SeverityPenalties::default());
        assert!((score - 6.5).abs() < 1e-9);
    }

    #[test]
    fn test_floor_at_zero() {
        let mut evaluation = eval(1.0, 1.0, 1.0, 1.0);
        for _ in 0..5 {
            evaluation = evaluation.with_issue(Issue::new("x", Severity::Critical, "bad", "fix"));
        }
        let score = composite_score(&evaluation, &ScoringWeights::default(), &SeverityPenalties::default());
        assert_eq!(score, 0.0);
    }

    #[test]
    fn test_out_of_range_scores_are_normalized_before_scoring() {
        let mut evaluation = eval(5.0, 5.0, 5.0, 5.0);
        evaluation.scores.clarity = 15.0;
        let score = composite_score(&evaluation, &ScoringWeights::default(), &SeverityPenalties::default());
        assert!((score - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_composite_is_deterministic() {
        let evaluation = eval(7.3, 8.1, 6.9, 9.4)
            .with_issue(Issue::new("layout", Severity::High, "Tight", "Loosen"));
        let weights = ScoringWeights::default();
        let penalties = SeverityPenalties::default();
        let first = composite_score(&evaluation, &weights, &penalties);
        for _ in 0..100 {
            assert_eq!(composite_score(&evaluation, &weights, &penalties).to_bits(), first.to_bits());
        }
    }

    #[test]
    fn test_invalid_weights_rejected() {
        let weights = ScoringWeights {
            clarity: 0.5,
            ..ScoringWeights::default()
        };
        assert!(weights.validate().is_err());

        let penalties = SeverityPenalties { critical: -1.0, high: 0.5 };
        assert!(penalties.validate().is_err());
    }
}
