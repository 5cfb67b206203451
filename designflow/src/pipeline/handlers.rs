//! Async work for each stage.
//!
//! Every handler owns its stage guard and ends by handing it back through
//! [`Shared::finish`], which applies the result only if the run is still
//! current. Provider errors never escape a handler; they become failures or
//! fallbacks recorded on the run.

use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::guard::StageGuard;
use super::orchestrator::{Shared, WaitOutcome};
use super::run::{BatchKind, StageOutputs};
use crate::coordinator::{ParallelCoordinator, ProgressObserver};
use crate::core::{EvaluationResult, StageId, UiSpec};
use crate::errors::{GenerationFailure, ParseFailure};
use crate::events::GENERATION_PROGRESS;
use crate::generation::DesignGenerator;
use crate::observability::StageTimer;
use crate::scoring::{evaluate_designs, fallback_selection, select_best_concept, select_spec};

/// Runs the work of the guarded stage.
pub(crate) async fn run_stage(guard: StageGuard) {
    let timer = StageTimer::start(guard.stage());
    match guard.stage() {
        StageId::ConceptGeneration => generate_concepts(guard).await,
        StageId::ConceptEvaluation => evaluate_concepts(guard).await,
        StageId::ConceptConfirmation => {
            Shared::finish(guard, |run| run.mark_completed(StageId::ConceptConfirmation, true));
        }
        StageId::SpecGeneration => generate_specs(guard).await,
        StageId::SpecEvaluation => evaluate_specs(guard).await,
        StageId::SpecSelection => select(guard).await,
        StageId::Packaging => package(guard).await,
    }
    info!(stage = %timer.stage(), duration_ms = timer.elapsed_ms(), "Stage task finished");
}

/// Copies the outputs if the guard's run is still current.
fn inputs(guard: &StageGuard) -> Option<StageOutputs> {
    let run = guard.shared().run.lock();
    run.is_current(guard.run_id()).then(|| run.outputs().clone())
}

fn discard(guard: StageGuard) {
    Shared::finish(guard, |_| {});
}

async fn generate_concepts(guard: StageGuard) {
    let stage = StageId::ConceptGeneration;
    let Some(outputs) = inputs(&guard) else {
        return discard(guard);
    };

    let result = guard.shared().generator.generate_concepts(&outputs.brief).await;
    Shared::finish(guard, move |run| match result {
        Ok(concepts) if !concepts.is_empty() => {
            info!(count = concepts.len(), "Concepts generated");
            run.set_concepts(concepts);
            run.mark_completed(stage, true);
        }
        Ok(_) => run.report_failure("The generator returned no concepts", stage),
        Err(e) => {
            warn!(error = %e, "Concept generation failed");
            run.report_failure(format!("Concept generation failed: {e}"), stage);
        }
    });
}

async fn evaluate_concepts(guard: StageGuard) {
    let stage = StageId::ConceptEvaluation;
    let Some(outputs) = inputs(&guard) else {
        return discard(guard);
    };

    let result = evaluate_designs(guard.shared().generator.as_ref(), &outputs.brief, &outputs.concepts).await;
    Shared::finish(guard, move |run| {
        let evaluations = match result {
            Ok(evaluations) => evaluations,
            Err(e) => {
                warn!(error = %e, "Concept evaluation failed");
                return run.report_failure(format!("Concept evaluation failed: {e}"), stage);
            }
        };
        let selected = select_best_concept(&evaluations).map(str::to_string);
        match selected {
            Some(selected) => {
                info!(selected = %selected, "Concept selected");
                run.set_concept_evaluations(evaluations, selected);
                run.mark_completed(stage, true);
            }
            None => run.report_failure("No concept evaluations were produced", stage),
        }
    });
}

async fn generate_specs(guard: StageGuard) {
    let stage = StageId::SpecGeneration;
    let Some(outputs) = inputs(&guard) else {
        return discard(guard);
    };
    let shared = Arc::clone(guard.shared());
    let run_id = guard.run_id();
    let n = shared.config.spec_batch_size;
    let concept = outputs.selected_concept.unwrap_or_default();

    shared.mutate(|run| {
        if run.is_current(run_id) {
            run.init_progress(BatchKind::SpecGeneration, n);
        }
    });

    let generator = shared.generator.as_ref();
    let (brief, concept) = (outputs.brief.as_str(), concept.as_str());
    let outcome = ParallelCoordinator::new()
        .with_observer(progress_observer(&shared, run_id, BatchKind::SpecGeneration))
        .run(n, |slot, progress| async move {
            progress.checkpoint();
            generate_spec(generator, brief, concept, slot).await
        })
        .await;

    let failed = outcome.failed_slots();
    let slots = outcome.into_slots();
    Shared::finish(guard, move |run| {
        if run.is_completed(stage) {
            debug!("Specifications arrived after the stage was completed; discarding");
            return;
        }
        if slots.iter().all(Option::is_none) {
            return run.report_failure(format!("All {n} specification requests failed"), stage);
        }
        if !failed.is_empty() {
            warn!(?failed, "Some specification requests failed");
        }
        run.set_spec_slots(slots);
        info!(count = run.outputs().specs.len(), "Specifications generated");
        run.mark_completed(stage, true);
    });
}

async fn generate_spec(
    generator: &dyn DesignGenerator,
    brief: &str,
    concept: &str,
    variant: usize,
) -> Result<UiSpec, GenerationFailure> {
    let spec = generator.generate_spec(brief, concept, variant).await?;
    if spec.is_well_formed() {
        Ok(spec)
    } else {
        Err(ParseFailure::invalid_shape("ui spec", format!("\"{}\" has no components", spec.name)).into())
    }
}

async fn evaluate_specs(guard: StageGuard) {
    let stage = StageId::SpecEvaluation;
    let shared = Arc::clone(guard.shared());
    let run_id = guard.run_id();

    let waited = shared
        .wait_until(run_id, shared.config.spec_wait_timeout(), |run| {
            (!run.outputs().specs.is_empty()).then(|| run.outputs().specs.clone())
        })
        .await;
    let specs = match waited {
        WaitOutcome::Ready(specs) => specs,
        WaitOutcome::Superseded => return discard(guard),
        WaitOutcome::TimedOut => {
            warn!("No specifications arrived in time; substituting placeholders");
            let batch = shared.config.spec_batch_size;
            shared.mutate(|run| {
                if run.is_current(run_id) {
                    run.substitute_placeholder_specs(batch);
                    run.record_fallback("No specifications were available; placeholders were substituted", stage);
                }
                run.outputs().specs.clone()
            })
        }
    };
    let Some(outputs) = inputs(&guard) else {
        return discard(guard);
    };

    let n = specs.len();
    shared.mutate(|run| {
        if run.is_current(run_id) {
            run.init_progress(BatchKind::SpecEvaluation, n);
        }
    });

    let generator = shared.generator.as_ref();
    let brief = outputs.brief.as_str();
    let specs = &specs;
    let outcome = ParallelCoordinator::new()
        .with_observer(progress_observer(&shared, run_id, BatchKind::SpecEvaluation))
        .run(n, |slot, progress| async move {
            progress.checkpoint();
            generator.evaluate_spec(brief, &specs[slot]).await
        })
        .await;

    let all_failed = outcome.success_count() == 0;
    let errors: HashMap<usize, String> = outcome.errors().iter().cloned().collect();
    let evaluations: Vec<EvaluationResult> = outcome
        .into_slots()
        .into_iter()
        .enumerate()
        .map(|(slot, evaluation)| match evaluation {
            Some(evaluation) => evaluation,
            None if all_failed => EvaluationResult::fallback("every specification evaluation failed"),
            None => EvaluationResult::fallback(errors.get(&slot).map_or("evaluation failed", String::as_str)),
        })
        .collect();

    Shared::finish(guard, move |run| {
        if run.is_completed(stage) {
            debug!("Evaluations arrived after the stage was completed; discarding");
            return;
        }
        if all_failed {
            run.record_fallback("All specification evaluations failed; neutral scores were used", stage);
        } else {
            let mut failed: Vec<_> = errors.into_iter().collect();
            failed.sort_unstable();
            for (slot, message) in failed {
                run.record_fallback(format!("Evaluation of spec {} failed: {message}", slot + 1), stage);
            }
        }
        run.set_spec_evaluations(evaluations);
        run.mark_completed(stage, true);
    });
}

async fn select(guard: StageGuard) {
    let stage = StageId::SpecSelection;
    let shared = Arc::clone(guard.shared());
    let run_id = guard.run_id();

    let waited = shared
        .wait_until(run_id, shared.config.evaluation_wait_timeout(), |run| {
            (!run.outputs().spec_evaluations.is_empty()).then_some(())
        })
        .await;
    if matches!(waited, WaitOutcome::Superseded) {
        return discard(guard);
    }

    let scoring = shared.config.scoring;
    Shared::finish(guard, move |run| {
        if run.is_completed(stage) {
            debug!("Selection was already completed; discarding");
            return;
        }
        let outputs = run.outputs();
        let selection = if outputs.spec_evaluations.is_empty() {
            fallback_selection(&outputs.specs, &scoring).map(|selection| (selection, true))
        } else {
            select_spec(&outputs.specs, &outputs.spec_evaluations, &scoring).map(|selection| (selection, false))
        };
        let Some((selection, fallback)) = selection else {
            return run.report_failure("No specifications are available for selection", stage);
        };

        if fallback {
            warn!("Evaluations missing; selecting the first specification");
            run.record_fallback("Evaluations were unavailable; the first specification was selected", stage);
        }
        if !run.is_completed(StageId::SpecEvaluation) {
            run.mark_completed(StageId::SpecEvaluation, false);
        }
        info!(
            selected = %selection.selected.name,
            score = selection.selected_score(),
            "Specification selected"
        );
        run.set_selection(selection);
        run.mark_completed(stage, true);
    });
}

async fn package(guard: StageGuard) {
    tokio::time::sleep(guard.shared().config.packaging_delay()).await;
    Shared::finish(guard, |run| run.mark_completed(StageId::Packaging, true));
}

/// Mirrors batch progress onto the run and the event sink.
fn progress_observer(shared: &Arc<Shared>, run_id: Uuid, kind: BatchKind) -> ProgressObserver {
    let shared = Arc::clone(shared);
    Arc::new(move |slot, state| {
        let updated = {
            let mut run = shared.run.lock();
            let current = run.is_current(run_id);
            if current {
                run.set_progress(kind, slot, state);
            }
            current
        };
        if updated {
            shared.sink.try_emit(
                GENERATION_PROGRESS,
                Some(json!({
                    "stage_index": kind.stage().index(),
                    "slot": slot,
                    "status": state.status(),
                    "progress": state.progress(),
                })),
            );
            shared.bump();
        }
    })
}
