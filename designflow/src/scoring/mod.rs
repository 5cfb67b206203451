//! Scoring and ranking engine.
//!
//! Pure aggregation and comparison of generator-assigned scores:
//!
//! - [`normalize_score`] keeps every sub-score within `[0, 10]`
//! - [`composite_score`] folds sub-scores and issue penalties into one number
//! - [`select_best`] and [`select_spec`] pick winners with earliest-index tie-breaks
//! - [`evaluate_designs`] is the concept-evaluation path used by stage 1

mod composite;
mod concepts;
mod normalize;
mod ranking;

pub use composite::{composite_score, ScoringConfig, ScoringWeights, SeverityPenalties};
pub use concepts::{align_evaluations, evaluate_designs, SINGLE_CONCEPT_REASON};
pub use normalize::{normalize_score, score_from_value, MAX_SCORE, MIN_SCORE, NEUTRAL_SCORE};
pub use ranking::{
    best_index, fallback_selection, justify, rank_specs, select_best, select_best_concept, select_spec,
    RankedCandidate, Scored, SelectionResult,
};
