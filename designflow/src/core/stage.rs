//! Stage identifiers, run position and per-stage contracts.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of stages in the design pipeline.
pub const STAGE_COUNT: usize = 7;

/// One named step of the fixed design pipeline.
///
/// The discriminants are the stage indices exposed to presentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageId {
    /// Generate design concepts from the brief.
    ConceptGeneration = 0,
    /// Score the concepts and pick the best one.
    ConceptEvaluation = 1,
    /// Surface the selected concept as its own step.
    ConceptConfirmation = 2,
    /// Generate candidate UI specifications in parallel.
    SpecGeneration = 3,
    /// Evaluate each candidate specification.
    SpecEvaluation = 4,
    /// Deterministically select the best specification.
    SpecSelection = 5,
    /// Hand the selection off for packaging and download.
    Packaging = 6,
}

impl StageId {
    /// All stages in pipeline order.
    pub const ALL: [Self; STAGE_COUNT] = [
        Self::ConceptGeneration,
        Self::ConceptEvaluation,
        Self::ConceptConfirmation,
        Self::SpecGeneration,
        Self::SpecEvaluation,
        Self::SpecSelection,
        Self::Packaging,
    ];

    /// Returns the zero-based index of the stage.
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Looks up a stage by index.
    #[must_use]
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Returns the stage that follows this one, if any.
    #[must_use]
    pub fn next(self) -> Option<Self> {
        Self::from_index(self.index() + 1)
    }

    /// Human-readable stage name shown in the step list.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::ConceptGeneration => "Concept Generation",
            Self::ConceptEvaluation => "Concept Evaluation",
            Self::ConceptConfirmation => "Concept Confirmation",
            Self::SpecGeneration => "Spec Generation",
            Self::SpecEvaluation => "Spec Evaluation",
            Self::SpecSelection => "Spec Selection",
            Self::Packaging => "Packaging",
        }
    }

    /// Returns the ordered list of stage names.
    #[must_use]
    pub fn step_names() -> Vec<String> {
        Self::ALL.iter().map(|s| s.name().to_string()).collect()
    }

    /// Returns the execution contract of the stage.
    #[must_use]
    pub const fn contract(self) -> StageContract {
        match self {
            Self::ConceptGeneration => StageContract {
                requires: "brief",
                produces: "non-empty concept list",
                advance: AdvanceRule::AfterWork,
                failure: FailurePolicy::Fatal,
                guarded: true,
            },
            Self::ConceptEvaluation => StageContract {
                requires: "concepts",
                produces: "concept evaluations and a selected concept",
                advance: AdvanceRule::AfterWork,
                failure: FailurePolicy::Fatal,
                guarded: true,
            },
            Self::ConceptConfirmation => StageContract {
                requires: "selected concept",
                produces: "nothing",
                advance: AdvanceRule::Immediate,
                failure: FailurePolicy::Fatal,
                guarded: false,
            },
            Self::SpecGeneration => StageContract {
                requires: "selected concept",
                produces: "at least one well-formed spec",
                advance: AdvanceRule::AfterWork,
                failure: FailurePolicy::Fatal,
                guarded: true,
            },
            Self::SpecEvaluation => StageContract {
                requires: "specs",
                produces: "one evaluation per spec",
                advance: AdvanceRule::AfterWork,
                failure: FailurePolicy::Degrade,
                guarded: true,
            },
            Self::SpecSelection => StageContract {
                requires: "specs and evaluations",
                produces: "selection with justification",
                advance: AdvanceRule::AfterWork,
                failure: FailurePolicy::Degrade,
                guarded: true,
            },
            Self::Packaging => StageContract {
                requires: "selection",
                produces: "nothing (packaging is an explicit download)",
                advance: AdvanceRule::AfterDelay,
                failure: FailurePolicy::Degrade,
                guarded: true,
            },
        }
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How a stage moves the run forward once its work is done.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdvanceRule {
    /// Completes as soon as its required data exists, without async work.
    Immediate,
    /// Completes when its async work finishes successfully.
    AfterWork,
    /// Completes a short, configurable delay after entry.
    AfterDelay,
}

/// What a failure means for the stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Report and halt auto-advance until the user retries.
    Fatal,
    /// Synthesize a labelled fallback payload and keep going.
    Degrade,
}

/// Static description of one stage's completion and failure behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageContract {
    /// Data that must exist before the stage can run.
    pub requires: &'static str,
    /// Data the stage must produce to complete.
    pub produces: &'static str,
    /// How completion advances the run.
    pub advance: AdvanceRule,
    /// How failures are handled.
    pub failure: FailurePolicy,
    /// Whether the stage's async work is protected by a re-entry guard.
    pub guarded: bool,
}

/// The active position of a run within the pipeline.
///
/// Ordering follows the pipeline: `NotStarted < At(0) < ... < At(6) < Complete`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StagePosition {
    /// No run has been started.
    #[default]
    NotStarted,
    /// The given stage is active.
    At(StageId),
    /// Every stage has completed.
    Complete,
}

impl StagePosition {
    /// Returns the position for a stage index, treating indices at or past
    /// the end as complete.
    #[must_use]
    pub fn from_index(index: usize) -> Self {
        StageId::from_index(index).map_or(Self::Complete, Self::At)
    }

    /// Returns the presentation index: −1 before start, the stage count when complete.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    pub fn index(self) -> i32 {
        match self {
            Self::NotStarted => -1,
            Self::At(stage) => stage.index() as i32,
            Self::Complete => STAGE_COUNT as i32,
        }
    }

    /// Returns the active stage, if any.
    #[must_use]
    pub fn stage(self) -> Option<StageId> {
        match self {
            Self::At(stage) => Some(stage),
            _ => None,
        }
    }

    /// Returns true once a run has been started.
    #[must_use]
    pub fn is_started(self) -> bool {
        self != Self::NotStarted
    }

    /// Returns true when every stage has completed.
    #[must_use]
    pub fn is_complete(self) -> bool {
        self == Self::Complete
    }

    /// Returns true if the run is at `stage`.
    #[must_use]
    pub fn is_at(self, stage: StageId) -> bool {
        self == Self::At(stage)
    }
}
