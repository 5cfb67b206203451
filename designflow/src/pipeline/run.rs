//! The state of one pipeline run.
//!
//! [`PipelineRun`] is owned by the orchestrator and mutated only through its
//! named methods. Every method is synchronous; callers hold the run lock for
//! the duration of one transition and never across an `.await`.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

use super::packaging::PackageReceipt;
use crate::core::{
    ConceptEvaluation, EvaluationResult, FailurePolicy, GenerationProgressState, StageId, StagePosition,
    TimelineEvent, TimelineKind, UiSpec, STAGE_COUNT,
};
use crate::errors::DesignflowError;
use crate::scoring::SelectionResult;
use crate::utils::{generate_run_id, iso_timestamp};

/// A failure reported by a stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageFailure {
    /// The stage that failed.
    pub stage_index: usize,
    /// Human-readable message.
    pub message: String,
    /// When it was reported (RFC 3339).
    pub timestamp: String,
}

/// A user review annotation on a stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationMark {
    /// True if the user accepted the stage output.
    pub validated: bool,
    /// Feedback given when invalidating.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
    /// When the mark was made (RFC 3339).
    pub timestamp: String,
}

/// Typed per-stage outputs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageOutputs {
    /// The design brief.
    pub brief: String,
    /// Stage 0: generated concepts.
    pub concepts: Vec<String>,
    /// Stage 1: one evaluation per concept.
    pub concept_evaluations: Vec<ConceptEvaluation>,
    /// Stage 1: the chosen concept.
    pub selected_concept: Option<String>,
    /// Stage 3: positional batch results; failed slots are `None`.
    pub spec_slots: Vec<Option<UiSpec>>,
    /// Stage 3: well-formed specs in slot order (or placeholders).
    pub specs: Vec<UiSpec>,
    /// Stage 4: one evaluation per spec.
    pub spec_evaluations: Vec<EvaluationResult>,
    /// Stage 5: the selection.
    pub selection: Option<SelectionResult>,
    /// Stage 3: per-slot progress.
    pub spec_progress: Vec<GenerationProgressState>,
    /// Stage 4: per-slot progress.
    pub evaluation_progress: Vec<GenerationProgressState>,
    /// The last package produced by a download.
    pub packaged: Option<PackageReceipt>,
}

impl StageOutputs {
    /// Clears what `stage` and every later stage produced.
    fn clear_from(&mut self, stage: StageId) {
        let from = stage.index();
        if from <= StageId::ConceptGeneration.index() {
            self.concepts.clear();
        }
        if from <= StageId::ConceptEvaluation.index() {
            self.concept_evaluations.clear();
            self.selected_concept = None;
        }
        if from <= StageId::SpecGeneration.index() {
            self.spec_slots.clear();
            self.specs.clear();
            self.spec_progress.clear();
        }
        if from <= StageId::SpecEvaluation.index() {
            self.spec_evaluations.clear();
            self.evaluation_progress.clear();
        }
        if from <= StageId::SpecSelection.index() {
            self.selection = None;
        }
        self.packaged = None;
    }
}

/// Result of a start command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// A new run began with this id.
    Started(Uuid),
    /// A run is already in progress; nothing changed.
    AlreadyRunning,
}

/// Which batch a progress update belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchKind {
    /// Stage 3 spec generation.
    SpecGeneration,
    /// Stage 4 spec evaluation.
    SpecEvaluation,
}

impl BatchKind {
    /// The stage that runs the batch.
    #[must_use]
    pub const fn stage(self) -> StageId {
        match self {
            Self::SpecGeneration => StageId::SpecGeneration,
            Self::SpecEvaluation => StageId::SpecEvaluation,
        }
    }
}

/// One execution of the design pipeline.
#[derive(Debug, Clone)]
pub struct PipelineRun {
    run_id: Uuid,
    position: StagePosition,
    completed: BTreeSet<usize>,
    aborted: bool,
    failure: Option<StageFailure>,
    errors: Vec<StageFailure>,
    blocked: BTreeSet<StageId>,
    outputs: StageOutputs,
    timeline: Vec<TimelineEvent>,
    running: BTreeSet<StageId>,
    validations: BTreeMap<usize, ValidationMark>,
}

impl Default for PipelineRun {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineRun {
    /// Creates a run that has not been started.
    #[must_use]
    pub fn new() -> Self {
        Self {
            run_id: generate_run_id(),
            position: StagePosition::NotStarted,
            completed: BTreeSet::new(),
            aborted: false,
            failure: None,
            errors: Vec::new(),
            blocked: BTreeSet::new(),
            outputs: StageOutputs::default(),
            timeline: Vec::new(),
            running: BTreeSet::new(),
            validations: BTreeMap::new(),
        }
    }

    // --- accessors -------------------------------------------------------

    /// Identifier of the current start; changes on every start and reset.
    #[must_use]
    pub const fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// The active position.
    #[must_use]
    pub const fn position(&self) -> StagePosition {
        self.position
    }

    /// Presentation index: −1 before start, 7 when complete.
    #[must_use]
    pub fn current_stage_index(&self) -> i32 {
        self.position.index()
    }

    /// Indices of completed stages.
    #[must_use]
    pub const fn completed_stages(&self) -> &BTreeSet<usize> {
        &self.completed
    }

    /// Returns true if `stage` has been completed.
    #[must_use]
    pub fn is_completed(&self, stage: StageId) -> bool {
        self.completed.contains(&stage.index())
    }

    /// Returns true once aborted.
    #[must_use]
    pub const fn is_aborted(&self) -> bool {
        self.aborted
    }

    /// Returns true when every stage has completed.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.position.is_complete()
    }

    /// Returns true if `run_id` is this run and it has not been aborted.
    #[must_use]
    pub fn is_current(&self, run_id: Uuid) -> bool {
        self.run_id == run_id && !self.aborted
    }

    /// The latest unresolved failure.
    #[must_use]
    pub const fn failure(&self) -> Option<&StageFailure> {
        self.failure.as_ref()
    }

    /// Every failure and fallback message reported during the run.
    #[must_use]
    pub fn errors(&self) -> &[StageFailure] {
        &self.errors
    }

    /// Returns true if a fatal failure blocks `stage` from re-triggering.
    #[must_use]
    pub fn is_blocked(&self, stage: StageId) -> bool {
        self.blocked.contains(&stage)
    }

    /// Stage outputs.
    #[must_use]
    pub const fn outputs(&self) -> &StageOutputs {
        &self.outputs
    }

    /// The run timeline.
    #[must_use]
    pub fn timeline(&self) -> &[TimelineEvent] {
        &self.timeline
    }

    /// Stages whose async work is in flight.
    #[must_use]
    pub const fn running_stages(&self) -> &BTreeSet<StageId> {
        &self.running
    }

    /// Returns true if `stage` holds its re-entry guard.
    #[must_use]
    pub fn is_running(&self, stage: StageId) -> bool {
        self.running.contains(&stage)
    }

    /// User review annotations by stage index.
    #[must_use]
    pub const fn validations(&self) -> &BTreeMap<usize, ValidationMark> {
        &self.validations
    }

    // --- lifecycle -------------------------------------------------------

    /// Starts the run with a brief.
    ///
    /// Does nothing if a run is already in progress; [`reset`](Self::reset)
    /// first to start over.
    pub fn start(&mut self, brief: &str) -> Result<StartOutcome, DesignflowError> {
        let brief = brief.trim();
        if brief.is_empty() {
            return Err(DesignflowError::EmptyBrief);
        }
        if self.position.is_started() {
            return Ok(StartOutcome::AlreadyRunning);
        }

        *self = Self::new();
        self.outputs.brief = brief.to_string();
        self.position = StagePosition::At(StageId::ConceptGeneration);
        self.timeline.push(
            TimelineEvent::new(TimelineKind::RunStarted, "Run started")
                .add_data("run_id", serde_json::json!(self.run_id.to_string())),
        );
        Ok(StartOutcome::Started(self.run_id))
    }

    /// Returns the run to not-started, discarding outputs.
    ///
    /// The run id changes, so results from in-flight work are ignored.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Aborts the run. Returns false if it was already aborted.
    ///
    /// Outputs are kept for inspection; only the first abort is recorded.
    pub fn abort(&mut self) -> bool {
        if self.aborted {
            return false;
        }
        self.aborted = true;
        self.timeline.push(TimelineEvent::new(TimelineKind::Aborted, "Run aborted"));
        true
    }

    /// Marks a stage completed on behalf of a user or caller.
    ///
    /// Rejected before start and after abort.
    pub fn complete_stage(&mut self, stage: StageId, advance: bool) -> Result<(), DesignflowError> {
        if !self.position.is_started() {
            return Err(DesignflowError::InvalidCommand("no run has been started".to_string()));
        }
        if self.aborted {
            return Err(DesignflowError::Aborted);
        }
        self.mark_completed(stage, advance);
        Ok(())
    }

    /// Marks a stage completed and, if `advance`, moves past it.
    ///
    /// The position only ever moves forward. Callers must have checked that
    /// the run is current.
    pub(crate) fn mark_completed(&mut self, stage: StageId, advance: bool) {
        self.completed.insert(stage.index());
        self.blocked.remove(&stage);
        if self.failure.as_ref().is_some_and(|f| f.stage_index == stage.index()) {
            self.failure = None;
        }
        self.timeline.push(TimelineEvent::completed(stage));

        if advance {
            let next = StagePosition::from_index(stage.index() + 1);
            if next > self.position {
                self.position = next;
                if next.is_complete() {
                    self.timeline
                        .push(TimelineEvent::new(TimelineKind::RunCompleted, "All stages completed"));
                }
            }
        }
    }

    /// Records a stage failure. Fatal stages stop re-triggering until retried.
    pub fn report_failure(&mut self, message: impl Into<String>, stage: StageId) {
        let failure = StageFailure {
            stage_index: stage.index(),
            message: message.into(),
            timestamp: iso_timestamp(),
        };
        self.timeline.push(TimelineEvent::failed(stage, &failure.message));
        self.errors.push(failure.clone());
        self.failure = Some(failure);
        if stage.contract().failure == FailurePolicy::Fatal {
            self.blocked.insert(stage);
        }
    }

    /// Records that a stage substituted a fallback payload and moved on.
    pub fn record_fallback(&mut self, message: impl Into<String>, stage: StageId) {
        let message = message.into();
        self.timeline.push(TimelineEvent::for_stage(
            TimelineKind::FallbackUsed,
            stage,
            format!("{} used a fallback: {message}", stage.name()),
        ));
        self.errors.push(StageFailure {
            stage_index: stage.index(),
            message,
            timestamp: iso_timestamp(),
        });
    }

    /// Clears a failed stage so it can run again.
    ///
    /// Only the active stage can be retried. Its outputs and those of later
    /// stages are discarded.
    pub fn retry_stage(&mut self, stage: StageId) -> Result<(), DesignflowError> {
        if self.aborted {
            return Err(DesignflowError::Aborted);
        }
        if !self.position.is_at(stage) {
            return Err(DesignflowError::InvalidCommand(format!(
                "only the active stage can be retried, not {stage}"
            )));
        }
        if self.running.contains(&stage) {
            return Err(DesignflowError::InvalidCommand(format!("{stage} is still running")));
        }
        self.blocked.remove(&stage);
        if self.failure.as_ref().is_some_and(|f| f.stage_index == stage.index()) {
            self.failure = None;
        }
        self.outputs.clear_from(stage);
        self.timeline.push(TimelineEvent::for_stage(
            TimelineKind::StageStarted,
            stage,
            format!("{} retried", stage.name()),
        ));
        Ok(())
    }

    /// Records that a stage's async work began.
    pub(crate) fn record_stage_started(&mut self, stage: StageId) {
        self.timeline.push(TimelineEvent::for_stage(
            TimelineKind::StageStarted,
            stage,
            format!("{} started", stage.name()),
        ));
    }

    /// Annotates a stage as accepted by the user.
    pub fn mark_validated(&mut self, stage: StageId) {
        self.validations.insert(
            stage.index(),
            ValidationMark {
                validated: true,
                feedback: None,
                timestamp: iso_timestamp(),
            },
        );
        self.timeline.push(TimelineEvent::for_stage(
            TimelineKind::Validated,
            stage,
            format!("{} validated", stage.name()),
        ));
    }

    /// Annotates a stage as rejected by the user.
    pub fn mark_invalidated(&mut self, stage: StageId, feedback: impl Into<String>) {
        let feedback = feedback.into();
        self.timeline.push(
            TimelineEvent::for_stage(TimelineKind::Invalidated, stage, format!("{} invalidated", stage.name()))
                .add_data("feedback", serde_json::json!(feedback)),
        );
        self.validations.insert(
            stage.index(),
            ValidationMark {
                validated: false,
                feedback: Some(feedback),
                timestamp: iso_timestamp(),
            },
        );
    }

    // --- re-entry guards -------------------------------------------------

    /// Sets the running flag for `stage`. Returns false if already set.
    pub(crate) fn try_acquire(&mut self, stage: StageId) -> bool {
        self.running.insert(stage)
    }

    /// Clears the running flag for `stage` if `run_id` is still this run.
    ///
    /// Guards from a superseded run never touch the flags of its successor.
    pub(crate) fn release(&mut self, stage: StageId, run_id: Uuid) {
        if self.run_id == run_id {
            self.running.remove(&stage);
        }
    }

    // --- output setters --------------------------------------------------

    /// Stores the generated concepts.
    pub fn set_concepts(&mut self, concepts: Vec<String>) {
        self.outputs.concepts = concepts;
    }

    /// Stores concept evaluations and the selected concept.
    pub fn set_concept_evaluations(&mut self, evaluations: Vec<ConceptEvaluation>, selected: String) {
        self.outputs.concept_evaluations = evaluations;
        self.outputs.selected_concept = Some(selected);
    }

    /// Stores a spec batch, keeping only well-formed specs in `specs`.
    pub fn set_spec_slots(&mut self, slots: Vec<Option<UiSpec>>) {
        self.outputs.specs = slots.iter().flatten().filter(|s| s.is_well_formed()).cloned().collect();
        self.outputs.spec_slots = slots;
    }

    /// Replaces missing specs with `count` labelled placeholders.
    pub fn substitute_placeholder_specs(&mut self, count: usize) {
        let concept = self.outputs.selected_concept.clone().unwrap_or_default();
        self.outputs.specs = (0..count.max(1)).map(|slot| UiSpec::placeholder(slot, &concept)).collect();
    }

    /// Stores one evaluation per spec.
    pub fn set_spec_evaluations(&mut self, evaluations: Vec<EvaluationResult>) {
        self.outputs.spec_evaluations = evaluations;
    }

    /// Stores the selection.
    pub fn set_selection(&mut self, selection: SelectionResult) {
        self.outputs.selection = Some(selection);
    }

    /// Records a produced package.
    pub fn set_packaged(&mut self, receipt: PackageReceipt) {
        self.timeline.push(
            TimelineEvent::new(TimelineKind::PackageCreated, format!("Packaged {}", receipt.file_name))
                .add_data("sha256", serde_json::json!(receipt.sha256)),
        );
        self.outputs.packaged = Some(receipt);
    }

    /// Resets the progress list of a batch to `n` waiting slots.
    pub fn init_progress(&mut self, kind: BatchKind, n: usize) {
        *self.progress_mut(kind) = vec![GenerationProgressState::waiting(); n];
    }

    /// Updates one slot of a batch's progress.
    pub fn set_progress(&mut self, kind: BatchKind, slot: usize, state: GenerationProgressState) {
        if let Some(entry) = self.progress_mut(kind).get_mut(slot) {
            *entry = state;
        }
    }

    fn progress_mut(&mut self, kind: BatchKind) -> &mut Vec<GenerationProgressState> {
        match kind {
            BatchKind::SpecGeneration => &mut self.outputs.spec_progress,
            BatchKind::SpecEvaluation => &mut self.outputs.evaluation_progress,
        }
    }
}

/// Converts a presentation index into a stage.
pub fn stage_at(index: usize) -> Result<StageId, DesignflowError> {
    StageId::from_index(index).ok_or(DesignflowError::InvalidStage {
        index,
        count: STAGE_COUNT,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ComponentSpec;
    use pretty_assertions::assert_eq;

    fn started() -> PipelineRun {
        let mut run = PipelineRun::new();
        run.start("Design a login form").unwrap();
        run
    }

    #[test]
    fn test_new_run_is_not_started() {
        let run = PipelineRun::new();
        assert_eq!(run.current_stage_index(), -1);
        assert!(!run.is_aborted());
        assert!(run.timeline().is_empty());
    }

    #[test]
    fn test_start_sets_stage_zero() {
        let run = started();
        assert_eq!(run.current_stage_index(), 0);
        assert_eq!(run.outputs().brief, "Design a login form");
        assert_eq!(run.timeline()[0].kind, TimelineKind::RunStarted);
    }

    #[test]
    fn test_start_rejects_blank_brief() {
        let mut run = PipelineRun::new();
        assert!(matches!(run.start("   "), Err(DesignflowError::EmptyBrief)));
        assert_eq!(run.current_stage_index(), -1);
    }

    #[test]
    fn test_start_is_noop_while_running() {
        let mut run = started();
        let id = run.run_id();
        run.mark_completed(StageId::ConceptGeneration, true);
        assert_eq!(run.start("Other brief").unwrap(), StartOutcome::AlreadyRunning);
        assert_eq!(run.run_id(), id);
        assert_eq!(run.current_stage_index(), 1);
        assert_eq!(run.outputs().brief, "Design a login form");
    }

    #[test]
    fn test_complete_stage_is_monotonic() {
        let mut run = started();
        run.mark_completed(StageId::ConceptGeneration, true);
        run.mark_completed(StageId::ConceptEvaluation, true);
        assert_eq!(run.current_stage_index(), 2);

        // Late completion of an earlier stage never moves the run backwards.
        run.mark_completed(StageId::ConceptGeneration, true);
        assert_eq!(run.current_stage_index(), 2);

        run.mark_completed(StageId::SpecGeneration, false);
        assert_eq!(run.current_stage_index(), 2);
        assert!(run.is_completed(StageId::SpecGeneration));
    }

    #[test]
    fn test_completing_last_stage_completes_run() {
        let mut run = started();
        for stage in StageId::ALL {
            run.mark_completed(stage, true);
        }
        assert!(run.is_complete());
        assert_eq!(run.current_stage_index(), 7);
        assert_eq!(run.timeline().last().unwrap().kind, TimelineKind::RunCompleted);
    }

    #[test]
    fn test_abort_is_idempotent() {
        let mut run = started();
        assert!(run.abort());
        assert!(!run.abort());
        assert!(run.is_aborted());
        let aborts = run.timeline().iter().filter(|e| e.kind == TimelineKind::Aborted).count();
        assert_eq!(aborts, 1);
    }

    #[test]
    fn test_abort_keeps_outputs_and_rejects_completion() {
        let mut run = started();
        run.set_concepts(vec!["A".to_string()]);
        run.abort();
        assert_eq!(run.outputs().concepts, vec!["A"]);
        assert!(matches!(
            run.complete_stage(StageId::ConceptGeneration, true),
            Err(DesignflowError::Aborted)
        ));
        assert_eq!(run.current_stage_index(), 0);
    }

    #[test]
    fn test_fatal_failure_blocks_until_retry() {
        let mut run = started();
        run.report_failure("no concepts", StageId::ConceptGeneration);
        assert!(run.is_blocked(StageId::ConceptGeneration));
        assert_eq!(run.failure().unwrap().stage_index, 0);
        assert_eq!(run.errors().len(), 1);
        assert!(!run.is_aborted());

        run.retry_stage(StageId::ConceptGeneration).unwrap();
        assert!(!run.is_blocked(StageId::ConceptGeneration));
        assert!(run.failure().is_none());
        assert_eq!(run.errors().len(), 1);
    }

    #[test]
    fn test_degrade_failure_does_not_block() {
        let mut run = started();
        run.report_failure("evaluation failed", StageId::SpecEvaluation);
        assert!(!run.is_blocked(StageId::SpecEvaluation));
    }

    #[test]
    fn test_retry_only_active_stage() {
        let mut run = started();
        assert!(run.retry_stage(StageId::SpecGeneration).is_err());
    }

    #[test]
    fn test_reset_changes_run_id() {
        let mut run = started();
        let id = run.run_id();
        run.abort();
        run.reset();
        assert_ne!(run.run_id(), id);
        assert!(!run.is_aborted());
        assert_eq!(run.current_stage_index(), -1);
        assert!(!run.is_current(id));
    }

    #[test]
    fn test_spec_slots_filter_malformed() {
        let mut run = started();
        let good = UiSpec::new("Good", "").with_component(ComponentSpec::new("Form", "form"));
        let bad = UiSpec::new("Bad", "");
        run.set_spec_slots(vec![Some(good.clone()), None, Some(bad)]);
        assert_eq!(run.outputs().spec_slots.len(), 3);
        assert_eq!(run.outputs().specs, vec![good]);
    }

    #[test]
    fn test_validation_marks() {
        let mut run = started();
        run.mark_validated(StageId::ConceptGeneration);
        run.mark_invalidated(StageId::ConceptEvaluation, "Scores look off");
        assert!(run.validations()[&0].validated);
        assert_eq!(run.validations()[&1].feedback.as_deref(), Some("Scores look off"));
    }

    #[test]
    fn test_guards() {
        let mut run = started();
        assert!(run.try_acquire(StageId::SpecGeneration));
        assert!(!run.try_acquire(StageId::SpecGeneration));
        run.release(StageId::SpecGeneration, Uuid::new_v4());
        assert!(run.is_running(StageId::SpecGeneration));
        run.release(StageId::SpecGeneration, run.run_id());
        assert!(run.try_acquire(StageId::SpecGeneration));
    }

    #[test]
    fn test_stage_at() {
        assert_eq!(stage_at(5).unwrap(), StageId::SpecSelection);
        assert!(matches!(stage_at(7), Err(DesignflowError::InvalidStage { index: 7, count: 7 })));
    }
}
