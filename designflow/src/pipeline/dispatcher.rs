//! Pure trigger predicates evaluated after every run mutation.

use super::run::PipelineRun;
use crate::core::{StageId, StagePosition};

/// What the orchestrator should do next for a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Acquire the stage guard and spawn its async work.
    Spawn(StageId),
    /// Complete the stage synchronously.
    CompleteInline(StageId),
}

impl Action {
    /// The stage this action applies to.
    #[must_use]
    pub const fn stage(self) -> StageId {
        match self {
            Self::Spawn(stage) | Self::CompleteInline(stage) => stage,
        }
    }
}

/// Returns every action eligible for the current state of `run`.
///
/// A stage is eligible only when its required data is present, it is not
/// running, it is not blocked by a fatal failure and it has not completed.
/// Nothing is eligible once the run is aborted.
#[must_use]
pub fn next_actions(run: &PipelineRun) -> Vec<Action> {
    if run.is_aborted() || !run.position().is_started() {
        return Vec::new();
    }
    StageId::ALL
        .into_iter()
        .filter(|&stage| is_idle(run, stage) && is_triggered(run, stage))
        .map(|stage| {
            if stage == StageId::ConceptConfirmation {
                Action::CompleteInline(stage)
            } else {
                Action::Spawn(stage)
            }
        })
        .collect()
}

fn is_idle(run: &PipelineRun, stage: StageId) -> bool {
    !run.is_running(stage) && !run.is_blocked(stage) && !run.is_completed(stage)
}

fn is_triggered(run: &PipelineRun, stage: StageId) -> bool {
    let position = run.position();
    let outputs = run.outputs();
    match stage {
        StageId::ConceptGeneration => position.is_at(stage) && !outputs.brief.is_empty(),
        StageId::ConceptEvaluation => position.is_at(stage) && !outputs.concepts.is_empty(),
        StageId::ConceptConfirmation | StageId::SpecGeneration => {
            position.is_at(stage) && outputs.selected_concept.is_some()
        }
        StageId::SpecEvaluation => position.is_at(stage) && outputs.spec_evaluations.is_empty(),
        StageId::SpecSelection => {
            let evaluated = position >= StagePosition::At(StageId::SpecEvaluation)
                && !position.is_complete()
                && !outputs.specs.is_empty()
                && !outputs.spec_evaluations.is_empty()
                && !run.is_running(StageId::SpecEvaluation);
            let entered = position.is_at(stage) && !outputs.specs.is_empty();
            evaluated || entered
        }
        StageId::Packaging => position.is_at(stage) && outputs.selection.is_some(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ComponentSpec, EvaluationResult, SubScores, UiSpec};
    use pretty_assertions::assert_eq;

    fn spec() -> UiSpec {
        UiSpec::new("Spec", "").with_component(ComponentSpec::new("Form", "form"))
    }

    fn at_stage(stage: StageId) -> PipelineRun {
        let mut run = PipelineRun::new();
        run.start("Design a login form").unwrap();
        for earlier in StageId::ALL.into_iter().take(stage.index()) {
            run.mark_completed(earlier, true);
        }
        run
    }

    #[test]
    fn test_nothing_before_start() {
        assert!(next_actions(&PipelineRun::new()).is_empty());
    }

    #[test]
    fn test_stage_zero_after_start() {
        let run = at_stage(StageId::ConceptGeneration);
        assert_eq!(next_actions(&run), vec![Action::Spawn(StageId::ConceptGeneration)]);
    }

    #[test]
    fn test_running_stage_is_not_retriggered() {
        let mut run = at_stage(StageId::ConceptGeneration);
        assert!(run.try_acquire(StageId::ConceptGeneration));
        assert!(next_actions(&run).is_empty());
    }

    #[test]
    fn test_blocked_stage_is_not_retriggered() {
        let mut run = at_stage(StageId::ConceptGeneration);
        run.report_failure("empty", StageId::ConceptGeneration);
        assert!(next_actions(&run).is_empty());
    }

    #[test]
    fn test_abort_stops_dispatch() {
        let mut run = at_stage(StageId::ConceptGeneration);
        run.abort();
        assert!(next_actions(&run).is_empty());
    }

    #[test]
    fn test_concept_evaluation_needs_concepts() {
        let mut run = at_stage(StageId::ConceptEvaluation);
        assert!(next_actions(&run).is_empty());
        run.set_concepts(vec!["A".to_string()]);
        assert_eq!(next_actions(&run), vec![Action::Spawn(StageId::ConceptEvaluation)]);
    }

    #[test]
    fn test_confirmation_completes_inline() {
        let mut run = at_stage(StageId::ConceptConfirmation);
        run.set_concept_evaluations(Vec::new(), "A".to_string());
        assert_eq!(next_actions(&run), vec![Action::CompleteInline(StageId::ConceptConfirmation)]);
    }

    #[test]
    fn test_spec_evaluation_at_stage_four() {
        let mut run = at_stage(StageId::SpecEvaluation);
        run.set_spec_slots(vec![Some(spec())]);
        assert_eq!(next_actions(&run), vec![Action::Spawn(StageId::SpecEvaluation)]);
    }

    #[test]
    fn test_selection_forced_before_evaluation_completes() {
        let mut run = at_stage(StageId::SpecEvaluation);
        run.set_spec_slots(vec![Some(spec())]);
        run.set_spec_evaluations(vec![EvaluationResult::new(SubScores::neutral())]);
        assert_eq!(next_actions(&run), vec![Action::Spawn(StageId::SpecSelection)]);
    }

    #[test]
    fn test_selection_waits_for_running_evaluation() {
        let mut run = at_stage(StageId::SpecEvaluation);
        run.set_spec_slots(vec![Some(spec())]);
        run.set_spec_evaluations(vec![EvaluationResult::new(SubScores::neutral())]);
        assert!(run.try_acquire(StageId::SpecEvaluation));
        assert!(next_actions(&run).is_empty());
    }

    #[test]
    fn test_selection_at_stage_five_with_specs_only() {
        let mut run = at_stage(StageId::SpecSelection);
        run.set_spec_slots(vec![Some(spec())]);
        assert_eq!(next_actions(&run), vec![Action::Spawn(StageId::SpecSelection)]);
    }

    #[test]
    fn test_nothing_after_completion() {
        let mut run = at_stage(StageId::Packaging);
        run.mark_completed(StageId::Packaging, true);
        assert!(next_actions(&run).is_empty());
    }
}
