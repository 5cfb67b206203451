//! Deterministic ranking and selection of candidates.
//!
//! All functions here are pure. Ties always resolve to the earliest
//! candidate: reductions are strict left-to-right and sorts are stable.

use serde::{Deserialize, Serialize};

use super::composite::{composite_score, ScoringConfig};
use crate::core::{ConceptEvaluation, EvaluationResult, UiSpec};

/// Anything that carries a single comparable score.
pub trait Scored {
    /// Returns the score used for ranking.
    fn score(&self) -> f64;
}

impl Scored for ConceptEvaluation {
    fn score(&self) -> f64 {
        self.score
    }
}

impl Scored for RankedCandidate {
    fn score(&self) -> f64 {
        self.composite_score
    }
}

impl Scored for f64 {
    fn score(&self) -> f64 {
        *self
    }
}

/// Returns the index of the highest-scoring item.
///
/// The first maximum wins; NaN scores never win against a number.
/// Returns `None` for an empty slice.
#[must_use]
pub fn best_index<T: Scored>(items: &[T]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (index, item) in items.iter().enumerate() {
        let score = item.score();
        match best {
            Some((_, best_score)) if !(score > best_score || best_score.is_nan() && !score.is_nan()) => {}
            _ => best = Some((index, score)),
        }
    }
    best.map(|(index, _)| index)
}

/// Returns the highest-scoring item, or `None` for an empty slice.
#[must_use]
pub fn select_best<T: Scored>(items: &[T]) -> Option<&T> {
    best_index(items).map(|i| &items[i])
}

/// Returns the text of the best concept, or `None` when there are no evaluations.
#[must_use]
pub fn select_best_concept(evaluations: &[ConceptEvaluation]) -> Option<&str> {
    select_best(evaluations).map(|e| e.concept.as_str())
}

/// One spec with its evaluation and composite score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedCandidate {
    /// Position of the UI spec in its batch.
    pub index: usize,
    /// The spec.
    pub spec: UiSpec,
    /// Its evaluation.
    pub evaluation: EvaluationResult,
    /// Its composite score.
    pub composite_score: f64,
}

/// The outcome of spec selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionResult {
    /// Batch position of the selected spec.
    pub selected_index: usize,
    /// The selected spec.
    pub selected: UiSpec,
    /// All candidates, best first.
    pub ranked: Vec<RankedCandidate>,
    /// Human-readable explanation of the choice.
    pub justification: String,
    /// True when the selection was made without real evaluations.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub fallback: bool,
}

impl SelectionResult {
    /// Composite score of the selected spec.
    #[must_use]
    pub fn selected_score(&self) -> f64 {
        self.ranked.first().map_or(0.0, |c| c.composite_score)
    }
}

/// Ranks specs by composite score, best first, keeping batch order for ties.
///
/// Specs without a matching evaluation are scored with a fallback evaluation.
#[must_use]
pub fn rank_specs(specs: &[UiSpec], evaluations: &[EvaluationResult], config: &ScoringConfig) -> Vec<RankedCandidate> {
    let mut ranked: Vec<RankedCandidate> = specs
        .iter()
        .enumerate()
        .map(|(index, spec)| {
            let evaluation = evaluations
                .get(index)
                .cloned()
                .unwrap_or_else(|| EvaluationResult::fallback("no evaluation was produced for this specification"));
            let composite_score = composite_score(&evaluation, &config.weights, &config.penalties);
            RankedCandidate {
                index,
                spec: spec.clone(),
                evaluation,
                composite_score,
            }
        })
        .collect();

    // Stable: equal scores keep ascending index order.
    ranked.sort_by(|a, b| b.composite_score.total_cmp(&a.composite_score));
    ranked
}

/// Selects the best spec and explains the choice.
///
/// Returns `None` when there are no specs.
#[must_use]
pub fn select_spec(specs: &[UiSpec], evaluations: &[EvaluationResult], config: &ScoringConfig) -> Option<SelectionResult> {
    let ranked = rank_specs(specs, evaluations, config);
    let winner = ranked.first()?;
    let justification = justify(&ranked);
    Some(SelectionResult {
        selected_index: winner.index,
        selected: winner.spec.clone(),
        justification,
        ranked,
        fallback: false,
    })
}

/// Selects the first spec when no evaluations are available.
///
/// Every spec is ranked with the same neutral fallback evaluation, so the
/// first spec wins by position.
#[must_use]
pub fn fallback_selection(specs: &[UiSpec], config: &ScoringConfig) -> Option<SelectionResult> {
    let ranked = rank_specs(specs, &[], config);
    let winner = ranked.first()?;
    Some(SelectionResult {
        selected_index: winner.index,
        selected: winner.spec.clone(),
        justification: format!(
            "No evaluation results were available, so \"{}\" was selected as the first generated specification. \
             Review it manually before implementation.",
            winner.spec.name
        ),
        ranked,
        fallback: true,
    })
}

/// Builds the justification for a ranked list (best first).
///
/// Cites the winner's name and composite score, its margin over the
/// runner-up and any perfect sub-scores.
#[must_use]
pub fn justify(ranked: &[RankedCandidate]) -> String {
    let Some(winner) = ranked.first() else {
        return String::new();
    };

    let mut text = format!(
        "Selected \"{}\" with a composite score of {:.2}/10",
        winner.spec.name, winner.composite_score
    );

    match ranked.get(1) {
        None => text.push_str("; it was the only candidate."),
        Some(runner_up) => {
            let margin = winner.composite_score - runner_up.composite_score;
            if winner.composite_score.to_bits() == runner_up.composite_score.to_bits() {
                text.push_str(&format!(
                    ", tied with \"{}\" ({:.2}) and chosen by earlier position.",
                    runner_up.spec.name, runner_up.composite_score
                ));
            } else if margin < 0.005 {
                text.push_str(&format!(
                    ", less than 0.01 points ahead of \"{}\" ({:.2}).",
                    runner_up.spec.name, runner_up.composite_score
                ));
            } else {
                text.push_str(&format!(
                    ", {:.2} points ahead of \"{}\" ({:.2}).",
                    margin, runner_up.spec.name, runner_up.composite_score
                ));
            }
        }
    }

    let perfect = winner.evaluation.scores.perfect_dimensions();
    if !perfect.is_empty() {
        text.push_str(&format!(" Perfect scores in {}.", perfect.join(", ")));
    }
    if winner.evaluation.fallback {
        text.push_str(" Its evaluation used fallback scores.");
    }
    text
}
