//! Evaluation results for generated specifications.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::scoring::{normalize_score, NEUTRAL_SCORE};

/// Severity of an evaluation issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Cosmetic or minor.
    #[default]
    Low,
    /// Worth fixing.
    Medium,
    /// Significant; penalized during selection.
    High,
    /// Blocking; penalized during selection.
    Critical,
}

impl Severity {
    /// Parses a severity label leniently; unknown labels map to `Low`.
    #[must_use]
    pub fn parse_lenient(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "critical" | "blocker" => Self::Critical,
            "high" | "major" => Self::High,
            "medium" | "moderate" => Self::Medium,
            _ => Self::Low,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// A problem found in a specification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    /// Issue category, e.g. "accessibility".
    pub category: String,
    /// Issue severity.
    pub severity: Severity,
    /// What is wrong.
    pub description: String,
    /// How to fix it.
    #[serde(default)]
    pub suggestion: String,
}

impl Issue {
    /// Creates an issue.
    #[must_use]
    pub fn new(
        category: impl Into<String>,
        severity: Severity,
        description: impl Into<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self {
            category: category.into(),
            severity,
            description: description.into(),
            suggestion: suggestion.into(),
        }
    }
}

/// The named 0–10 sub-scores of a specification evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SubScores {
    /// How clear and understandable the UI spec is.
    pub clarity: f64,
    /// How well organized the component structure is.
    pub structure: f64,
    /// How realistic the UI spec is to implement.
    pub feasibility: f64,
    /// How accessible the resulting UI would be.
    pub accessibility: f64,
}

impl Default for SubScores {
    fn default() -> Self {
        Self::neutral()
    }
}

impl SubScores {
    /// Creates sub-scores, normalizing each value into `[0, 10]`.
    #[must_use]
    pub fn new(clarity: f64, structure: f64, feasibility: f64, accessibility: f64) -> Self {
        Self {
            clarity,
            structure,
            feasibility,
            accessibility,
        }
        .normalized()
    }

    /// All dimensions at the neutral midpoint.
    #[must_use]
    pub const fn neutral() -> Self {
        Self {
            clarity: NEUTRAL_SCORE,
            structure: NEUTRAL_SCORE,
            feasibility: NEUTRAL_SCORE,
            accessibility: NEUTRAL_SCORE,
        }
    }

    /// Replaces out-of-range or non-finite values with the neutral midpoint.
    #[must_use]
    pub fn normalized(self) -> Self {
        Self {
            clarity: normalize_score(self.clarity),
            structure: normalize_score(self.structure),
            feasibility: normalize_score(self.feasibility),
            accessibility: normalize_score(self.accessibility),
        }
    }

    /// Returns `(dimension, score)` pairs in a fixed order.
    #[must_use]
    pub fn dimensions(&self) -> [(&'static str, f64); 4] {
        [
            ("clarity", self.clarity),
            ("structure", self.structure),
            ("feasibility", self.feasibility),
            ("accessibility", self.accessibility),
        ]
    }

    /// Names of dimensions scored a perfect 10.
    #[must_use]
    pub fn perfect_dimensions(&self) -> Vec<&'static str> {
        self.dimensions()
            .into_iter()
            .filter(|(_, score)| (*score - 10.0).abs() < f64::EPSILON)
            .map(|(name, _)| name)
            .collect()
    }
}

/// The evaluation of exactly one candidate specification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    /// Sub-scores, always within `[0, 10]`.
    pub scores: SubScores,
    /// Problems found.
    #[serde(default)]
    pub issues: Vec<Issue>,
    /// What the UI spec does well.
    #[serde(default)]
    pub strengths: Vec<String>,
    /// Suggested improvements.
    #[serde(default)]
    pub recommendations: Vec<String>,
    /// True when synthesized after an evaluation failure.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub fallback: bool,
}

impl EvaluationResult {
    /// Creates an evaluation from sub-scores.
    #[must_use]
    pub fn new(scores: SubScores) -> Self {
        Self {
            scores: scores.normalized(),
            issues: Vec::new(),
            strengths: Vec::new(),
            recommendations: Vec::new(),
            fallback: false,
        }
    }

    /// Adds an issue.
    #[must_use]
    pub fn with_issue(mut self, issue: Issue) -> Self {
        self.issues.push(issue);
        self
    }

    /// Adds a strength.
    #[must_use]
    pub fn with_strength(mut self, strength: impl Into<String>) -> Self {
        self.strengths.push(strength.into());
        self
    }

    /// Adds a recommendation.
    #[must_use]
    pub fn with_recommendation(mut self, recommendation: impl Into<String>) -> Self {
        self.recommendations.push(recommendation.into());
        self
    }

    /// Synthesizes the neutral evaluation used when evaluation fails.
    ///
    /// Carries a single low-severity issue describing the failure.
    #[must_use]
    pub fn fallback(reason: &str) -> Self {
        Self {
            scores: SubScores::neutral(),
            issues: vec![Issue::new(
                "evaluation",
                Severity::Low,
                format!("Automated evaluation unavailable: {reason}"),
                "Review this specification manually before implementation.",
            )],
            strengths: Vec::new(),
            recommendations: vec!["Re-run the evaluation once the generator is available.".to_string()],
            fallback: true,
        }
    }

    /// Counts issues of the given severity.
    #[must_use]
    pub fn count_severity(&self, severity: Severity) -> usize {
        self.issues.iter().filter(|i| i.severity == severity).count()
    }
}
