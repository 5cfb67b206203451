//! The concept-evaluation path.
//!
//! Scores come from the generator; alignment, normalization and the
//! single-concept shortcut happen here.

use tracing::{debug, warn};

use super::normalize::{normalize_score, MAX_SCORE, NEUTRAL_SCORE};
use crate::core::ConceptEvaluation;
use crate::errors::GenerationFailure;
use crate::generation::DesignGenerator;

/// Reason recorded when the single-concept shortcut is taken.
pub const SINGLE_CONCEPT_REASON: &str = "Single-concept shortcut: only one concept was generated, so it was selected without evaluation.";

const UNMATCHED_REASON: &str = "No evaluation was returned for this concept; neutral score assigned.";

/// Evaluates design concepts against a brief.
///
/// Returns one evaluation per concept, in concept order. A single concept
/// is given the maximum score without calling the generator; an empty list
/// yields an empty result.
pub async fn evaluate_designs<G>(
    generator: &G,
    brief: &str,
    concepts: &[String],
) -> Result<Vec<ConceptEvaluation>, GenerationFailure>
where
    G: DesignGenerator + ?Sized,
{
    match concepts {
        [] => Ok(Vec::new()),
        [only] => {
            debug!(concept = %only, "Single concept, skipping evaluation call");
            Ok(vec![ConceptEvaluation::new(only.clone(), MAX_SCORE, SINGLE_CONCEPT_REASON)])
        }
        _ => {
            let returned = generator.evaluate_concepts(brief, concepts).await?;
            Ok(align_evaluations(concepts, &returned))
        }
    }
}

/// Aligns returned evaluations with the concepts that were submitted.
///
/// Matching is by normalized concept text first, then by position for
/// entries whose text matches nothing. Concepts left unmatched receive the
/// neutral score. All scores are normalized.
#[must_use]
pub fn align_evaluations(concepts: &[String], returned: &[ConceptEvaluation]) -> Vec<ConceptEvaluation> {
    let keys: Vec<String> = concepts.iter().map(|c| normalize_text(c)).collect();
    let mut used = vec![false; returned.len()];

    let mut by_text: Vec<Option<usize>> = Vec::with_capacity(concepts.len());
    for key in &keys {
        let found = returned
            .iter()
            .enumerate()
            .position(|(j, e)| !used[j] && normalize_text(&e.concept) == *key);
        if let Some(j) = found {
            used[j] = true;
        }
        by_text.push(found);
    }

    let orphan = |j: usize| !keys.contains(&normalize_text(&returned[j].concept));

    let mut unmatched = 0usize;
    let aligned: Vec<ConceptEvaluation> = concepts
        .iter()
        .enumerate()
        .map(|(i, concept)| {
            let source = by_text[i].or_else(|| {
                (i < returned.len() && !used[i] && orphan(i)).then(|| {
                    used[i] = true;
                    i
                })
            });
            match source {
                Some(j) => ConceptEvaluation::new(
                    concept.clone(),
                    normalize_score(returned[j].score),
                    returned[j].reason.clone(),
                ),
                None => {
                    unmatched += 1;
                    ConceptEvaluation::new(concept.clone(), NEUTRAL_SCORE, UNMATCHED_REASON)
                }
            }
        })
        .collect();

    if unmatched > 0 {
        warn!(unmatched, total = concepts.len(), "Concept evaluations did not cover every concept");
    }
    aligned
}

fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim_matches(|c: char| c == '"' || c == '\'' || c == '.')
        .to_lowercase()
}
