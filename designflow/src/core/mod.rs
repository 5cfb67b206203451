//! Core domain model types for designflow.
//!
//! This module contains the fundamental types used throughout the crate:
//! - Stage identifiers, run position and stage contracts
//! - Candidates (concepts and UI specs) and their evaluations
//! - Per-request generation progress
//! - Timeline events

mod candidate;
mod evaluation;
mod event;
mod progress;
mod stage;

pub use candidate::{ComponentSpec, ConceptEvaluation, UiSpec};
pub use evaluation::{EvaluationResult, Issue, Severity, SubScores};
pub use event::{TimelineEvent, TimelineKind};
pub use progress::{GenerationProgressState, GenerationStatus, LinearProgressEstimator};
pub use stage::{AdvanceRule, FailurePolicy, StageContract, StageId, StagePosition, STAGE_COUNT};
