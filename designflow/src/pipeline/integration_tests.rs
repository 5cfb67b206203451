//! End-to-end tests driving the orchestrator with scripted generators.

#[cfg(test)]
mod tests {
    use crate::config::OrchestratorConfig;
    use crate::core::{StageId, TimelineKind};
    use crate::errors::{DesignflowError, GenerationError, GenerationFailure};
    use crate::events::{CollectingEventSink, GENERATION_PROGRESS};
    use crate::pipeline::{Orchestrator, PackageRequest, RunSnapshot, StartOutcome};
    use crate::testing::fixtures::{self, LOGIN_FORM_BRIEF};
    use crate::testing::{Gate, ScriptedGenerator};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio_test::{assert_err, assert_ok};

    const WAIT: Duration = Duration::from_secs(5);

    fn fast_config() -> OrchestratorConfig {
        OrchestratorConfig::default()
            .with_spec_wait_timeout_ms(50)
            .with_evaluation_wait_timeout_ms(50)
            .with_packaging_delay_ms(5)
    }

    fn build(generator: ScriptedGenerator) -> (Orchestrator, Arc<ScriptedGenerator>, Arc<CollectingEventSink>) {
        let generator = Arc::new(generator);
        let sink = Arc::new(CollectingEventSink::new());
        let orchestrator = Orchestrator::builder()
            .generator(generator.clone())
            .event_sink(sink.clone())
            .config(fast_config())
            .build()
            .unwrap();
        (orchestrator, generator, sink)
    }

    async fn settle(orchestrator: &Orchestrator) -> RunSnapshot {
        assert!(orchestrator.wait_until_idle(WAIT).await, "run did not settle");
        orchestrator.snapshot()
    }

    async fn wait_for_running(orchestrator: &Orchestrator, stage: StageId) {
        let snapshot = orchestrator
            .wait_for(WAIT, |s| s.running_stages.contains(&stage.index()))
            .await;
        assert!(snapshot.is_some(), "{stage} never started");
    }

    async fn wait_for_spec_calls(generator: &ScriptedGenerator, calls: usize) {
        tokio::time::timeout(WAIT, async {
            while generator.calls().generate_spec < calls {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .unwrap();
    }

    fn failure() -> GenerationFailure {
        GenerationError::Provider("model unavailable".to_string()).into()
    }

    #[tokio::test]
    async fn test_login_form_end_to_end() {
        let (orchestrator, generator, sink) = build(
            ScriptedGenerator::new()
                .with_concept_scores(vec![6.0, 9.2, 7.1])
                .with_spec_evaluation("Split Screen Login", fixtures::evaluation(9.0, 8.0, 9.0, 10.0)),
        );

        let outcome = assert_ok!(orchestrator.start(LOGIN_FORM_BRIEF));
        assert!(matches!(outcome, StartOutcome::Started(_)));
        let snapshot = settle(&orchestrator).await;

        assert!(snapshot.is_complete);
        assert_eq!(snapshot.current_stage_index, 7);
        assert_eq!(snapshot.completed_stages, vec![0, 1, 2, 3, 4, 5, 6]);
        assert!(snapshot.errors.is_empty());
        assert_eq!(snapshot.outputs.selected_concept.as_deref(), Some("Concept Y"));
        assert_eq!(snapshot.outputs.specs.len(), 3);
        assert_eq!(snapshot.outputs.spec_evaluations.len(), 3);

        let selection = snapshot.outputs.selection.as_ref().unwrap();
        assert_eq!(selection.selected.name, "Split Screen Login");
        assert_eq!(selection.selected_index, 1);
        assert!(!selection.fallback);
        assert!(selection.justification.contains("Split Screen Login"));
        assert!(selection.justification.contains("9.00"));

        assert_eq!(snapshot.timeline.first().unwrap().kind, TimelineKind::RunStarted);
        assert_eq!(snapshot.timeline.last().unwrap().kind, TimelineKind::RunCompleted);

        let calls = generator.calls();
        assert_eq!(
            (calls.generate_concepts, calls.evaluate_concepts, calls.generate_spec, calls.evaluate_spec),
            (1, 1, 3, 3)
        );
        assert_eq!(generator.requested_variants(), vec![0, 1, 2]);

        assert_eq!(sink.names()[0], "pipeline.started");
        assert_eq!(sink.count("pipeline.started"), 1);
        assert_eq!(sink.count("stage.completed"), 7);
        assert_eq!(sink.count("pipeline.completed"), 1);
        assert!(sink.count(GENERATION_PROGRESS) > 0);
    }

    #[tokio::test]
    async fn test_stage_index_never_decreases() {
        let (orchestrator, _, _) = build(ScriptedGenerator::new());
        let mut changes = orchestrator.subscribe();
        orchestrator.start(LOGIN_FORM_BRIEF).unwrap();

        let mut indices = vec![orchestrator.snapshot().current_stage_index];
        while !orchestrator.snapshot().is_complete {
            tokio::time::timeout(WAIT, changes.changed()).await.unwrap().unwrap();
            indices.push(orchestrator.snapshot().current_stage_index);
        }
        assert!(indices.windows(2).all(|w| w[0] <= w[1]), "{indices:?}");

        // A late completion of an earlier stage never moves the run back.
        orchestrator.complete_stage(0, true).unwrap();
        assert_eq!(orchestrator.snapshot().current_stage_index, 7);
    }

    #[tokio::test]
    async fn test_start_while_running_is_ignored() {
        let gate = Gate::new();
        let (orchestrator, generator, _) = build(ScriptedGenerator::new().with_spec_gate(gate.clone()));
        orchestrator.start(LOGIN_FORM_BRIEF).unwrap();
        let run_id = orchestrator.snapshot().run_id;

        assert_eq!(
            orchestrator.start("Design a signup form").unwrap(),
            StartOutcome::AlreadyRunning
        );
        assert_err!(orchestrator.start("   ").map(|_| ()));

        gate.open();
        let snapshot = settle(&orchestrator).await;
        assert_eq!(snapshot.run_id, run_id);
        assert_eq!(snapshot.outputs.brief, LOGIN_FORM_BRIEF);
        assert_eq!(generator.calls().generate_concepts, 1);
    }

    #[tokio::test]
    async fn test_abort_is_idempotent_and_discards_results() {
        let gate = Gate::new();
        let (orchestrator, generator, sink) = build(ScriptedGenerator::new().with_spec_gate(gate.clone()));
        orchestrator.start(LOGIN_FORM_BRIEF).unwrap();
        wait_for_running(&orchestrator, StageId::SpecGeneration).await;

        assert!(orchestrator.abort());
        assert!(!orchestrator.abort());
        assert!(!orchestrator.abort());

        gate.open();
        let snapshot = settle(&orchestrator).await;
        assert!(snapshot.aborted);
        assert_eq!(snapshot.current_stage_index, 3);
        assert!(snapshot.outputs.specs.is_empty());
        // Outputs from before the abort are kept.
        assert_eq!(snapshot.outputs.concepts, fixtures::login_form_concepts());
        let aborts = snapshot.timeline.iter().filter(|e| e.kind == TimelineKind::Aborted).count();
        assert_eq!(aborts, 1);
        assert_eq!(sink.count("pipeline.aborted"), 1);
        assert_eq!(generator.calls().evaluate_spec, 0);

        assert!(matches!(orchestrator.complete_stage(3, true), Err(DesignflowError::Aborted)));
    }

    #[tokio::test]
    async fn test_spec_generation_runs_one_batch() {
        let gate = Gate::new();
        let (orchestrator, generator, _) = build(ScriptedGenerator::new().with_spec_gate(gate.clone()));
        orchestrator.start(LOGIN_FORM_BRIEF).unwrap();
        wait_for_running(&orchestrator, StageId::SpecGeneration).await;
        wait_for_spec_calls(&generator, 3).await;

        // Unrelated mutations each trigger a dispatch pass.
        orchestrator.mark_validated(0).unwrap();
        orchestrator.mark_invalidated(1, "Try bolder concepts").unwrap();
        orchestrator.complete_stage(2, true).unwrap();
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(generator.calls().generate_spec, 3);

        gate.open();
        let snapshot = settle(&orchestrator).await;
        assert!(snapshot.is_complete);
        assert_eq!(generator.calls().generate_spec, 3);
        assert_eq!(snapshot.validations[&1].feedback.as_deref(), Some("Try bolder concepts"));
        assert!(snapshot.validations[&0].validated);
    }

    #[tokio::test]
    async fn test_out_of_order_specs_keep_slot_order() {
        let (orchestrator, _, sink) = build(
            ScriptedGenerator::new()
                .with_spec_delay(0, Duration::from_millis(80))
                .with_spec_delay(1, Duration::from_millis(30)),
        );
        orchestrator.start(LOGIN_FORM_BRIEF).unwrap();
        let snapshot = settle(&orchestrator).await;

        let names: Vec<_> = snapshot.outputs.specs.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Centered Card Login", "Split Screen Login", "Minimal Inline Login"]);

        let completed_slots: Vec<u64> = sink
            .events_of_type(GENERATION_PROGRESS)
            .into_iter()
            .filter_map(|(_, payload)| payload)
            .filter(|p| p["stage_index"] == 3 && p["status"] == "completed")
            .filter_map(|p| p["slot"].as_u64())
            .collect();
        assert_eq!(completed_slots, vec![2, 1, 0]);
    }

    #[tokio::test]
    async fn test_reset_discards_stale_batch() {
        let gate = Gate::new();
        let (orchestrator, generator, _) = build(ScriptedGenerator::new().with_spec_gate(gate.clone()));
        orchestrator.start(LOGIN_FORM_BRIEF).unwrap();
        let first_run = orchestrator.snapshot().run_id;
        wait_for_running(&orchestrator, StageId::SpecGeneration).await;

        orchestrator.reset();
        assert_eq!(orchestrator.snapshot().current_stage_index, -1);
        orchestrator.start("Design a signup form").unwrap();
        wait_for_spec_calls(&generator, 6).await;

        gate.open();
        let snapshot = settle(&orchestrator).await;
        assert_ne!(snapshot.run_id, first_run);
        assert!(snapshot.is_complete);
        assert_eq!(snapshot.outputs.brief, "Design a signup form");
        assert_eq!(snapshot.outputs.spec_slots.len(), 3);
        let starts = snapshot.timeline.iter().filter(|e| e.kind == TimelineKind::RunStarted).count();
        assert_eq!(starts, 1);
        assert_eq!(generator.calls().evaluate_spec, 3);
    }

    #[tokio::test]
    async fn test_partial_spec_failure_keeps_positions() {
        let (orchestrator, generator, _) = build(ScriptedGenerator::new().failing_spec(1, failure()));
        orchestrator.start(LOGIN_FORM_BRIEF).unwrap();
        let snapshot = settle(&orchestrator).await;

        assert!(snapshot.is_complete);
        let slots: Vec<bool> = snapshot.outputs.spec_slots.iter().map(Option::is_some).collect();
        assert_eq!(slots, vec![true, false, true]);
        assert_eq!(snapshot.outputs.specs.len(), 2);
        assert_eq!(generator.calls().evaluate_spec, 2);
    }

    #[tokio::test]
    async fn test_malformed_spec_counts_as_failure() {
        let (orchestrator, _, _) = build(
            ScriptedGenerator::new().with_spec(0, crate::core::UiSpec::new("Empty", "no components")),
        );
        orchestrator.start(LOGIN_FORM_BRIEF).unwrap();
        let snapshot = settle(&orchestrator).await;

        assert!(snapshot.outputs.spec_slots[0].is_none());
        assert_eq!(snapshot.outputs.specs.len(), 2);
    }

    #[tokio::test]
    async fn test_all_spec_failures_are_fatal() {
        let (orchestrator, generator, _) = build(
            ScriptedGenerator::new()
                .failing_spec(0, failure())
                .failing_spec(1, failure())
                .failing_spec(2, failure()),
        );
        orchestrator.start(LOGIN_FORM_BRIEF).unwrap();
        let snapshot = settle(&orchestrator).await;

        assert_eq!(snapshot.current_stage_index, 3);
        assert_eq!(snapshot.failure_stage_index, Some(3));
        assert_eq!(snapshot.failure_message.as_deref(), Some("All 3 specification requests failed"));
        assert!(!snapshot.aborted);

        orchestrator.retry_stage(3).unwrap();
        let snapshot = settle(&orchestrator).await;
        assert_eq!(snapshot.failure_stage_index, Some(3));
        assert_eq!(generator.calls().generate_spec, 6);
    }

    #[tokio::test]
    async fn test_concept_failure_blocks_until_retry() {
        let (orchestrator, generator, sink) = build(ScriptedGenerator::new().failing_concepts(failure()));
        orchestrator.start(LOGIN_FORM_BRIEF).unwrap();
        let snapshot = settle(&orchestrator).await;

        assert_eq!(snapshot.current_stage_index, 0);
        assert_eq!(snapshot.failure_stage_index, Some(0));
        assert!(snapshot.failure_message.unwrap().contains("model unavailable"));
        assert_eq!(sink.count("stage.failed"), 1);

        // Other commands do not re-trigger a blocked stage.
        orchestrator.mark_validated(0).unwrap();
        let _ = settle(&orchestrator).await;
        assert_eq!(generator.calls().generate_concepts, 1);

        assert!(matches!(
            orchestrator.retry_stage(3),
            Err(DesignflowError::InvalidCommand(_))
        ));
        orchestrator.retry_stage(0).unwrap();
        let snapshot = settle(&orchestrator).await;
        assert_eq!(generator.calls().generate_concepts, 2);
        assert_eq!(snapshot.errors.len(), 2);
    }

    #[tokio::test]
    async fn test_empty_concepts_are_fatal() {
        let (orchestrator, _, _) = build(ScriptedGenerator::new().with_concepts(Vec::new()));
        orchestrator.start(LOGIN_FORM_BRIEF).unwrap();
        let snapshot = settle(&orchestrator).await;

        assert_eq!(snapshot.current_stage_index, 0);
        assert_eq!(snapshot.failure_stage_index, Some(0));
    }

    #[tokio::test]
    async fn test_concept_evaluation_failure_is_fatal() {
        let (orchestrator, _, _) = build(ScriptedGenerator::new().failing_concept_evaluation(failure()));
        orchestrator.start(LOGIN_FORM_BRIEF).unwrap();
        let snapshot = settle(&orchestrator).await;

        assert_eq!(snapshot.current_stage_index, 1);
        assert_eq!(snapshot.failure_stage_index, Some(1));
        assert!(snapshot.outputs.selected_concept.is_none());
    }

    #[tokio::test]
    async fn test_single_concept_shortcut() {
        let (orchestrator, generator, _) =
            build(ScriptedGenerator::new().with_concepts(vec!["Only concept".to_string()]));
        orchestrator.start(LOGIN_FORM_BRIEF).unwrap();
        let snapshot = settle(&orchestrator).await;

        assert!(snapshot.is_complete);
        assert_eq!(generator.calls().evaluate_concepts, 0);
        assert_eq!(snapshot.outputs.selected_concept.as_deref(), Some("Only concept"));
        assert_eq!(snapshot.outputs.concept_evaluations[0].score, 10.0);
    }

    #[tokio::test]
    async fn test_spec_evaluation_failures_fall_back() {
        let (orchestrator, _, sink) = build(ScriptedGenerator::new().failing_spec_evaluations());
        orchestrator.start(LOGIN_FORM_BRIEF).unwrap();
        let snapshot = settle(&orchestrator).await;

        assert!(snapshot.is_complete);
        assert!(snapshot.outputs.spec_evaluations.iter().all(|e| e.fallback));
        assert!(snapshot.errors.iter().any(|e| e.stage_index == 4));
        assert!(snapshot.failure_stage_index.is_none());
        // Uniform neutral scores tie, so the first spec wins.
        let selection = snapshot.outputs.selection.unwrap();
        assert_eq!(selection.selected.name, "Centered Card Login");
        assert!(sink.count("stage.fallback") >= 1);
    }

    #[tokio::test]
    async fn test_single_spec_evaluation_failure_falls_back_for_that_slot() {
        let (orchestrator, _, _) =
            build(ScriptedGenerator::new().failing_spec_evaluation("Minimal Inline Login", failure()));
        orchestrator.start(LOGIN_FORM_BRIEF).unwrap();
        let snapshot = settle(&orchestrator).await;

        let fallbacks: Vec<bool> = snapshot.outputs.spec_evaluations.iter().map(|e| e.fallback).collect();
        assert_eq!(fallbacks, vec![false, false, true]);
        let stage_four_errors: Vec<_> = snapshot.errors.iter().filter(|e| e.stage_index == 4).collect();
        assert_eq!(stage_four_errors.len(), 1);
        assert!(stage_four_errors[0].message.contains("spec 3"));
    }

    #[tokio::test]
    async fn test_missing_specs_are_replaced_with_placeholders() {
        let gate = Gate::new();
        let (orchestrator, _, _) = build(ScriptedGenerator::new().with_spec_gate(gate.clone()));
        orchestrator.start(LOGIN_FORM_BRIEF).unwrap();
        wait_for_running(&orchestrator, StageId::SpecGeneration).await;

        orchestrator.complete_stage(3, true).unwrap();
        let snapshot = orchestrator
            .wait_for(WAIT, |s| s.is_complete)
            .await
            .expect("run did not complete");
        assert!(snapshot.outputs.specs.iter().all(|s| s.placeholder));
        assert!(snapshot.outputs.selection.as_ref().unwrap().selected.placeholder);
        assert!(snapshot.errors.iter().any(|e| e.stage_index == 4));

        // The late batch does not replace the placeholders.
        gate.open();
        let snapshot = settle(&orchestrator).await;
        assert!(snapshot.outputs.specs.iter().all(|s| s.placeholder));
    }

    #[tokio::test]
    async fn test_missing_evaluations_select_first_spec() {
        let (orchestrator, _, _) =
            build(ScriptedGenerator::new().with_evaluation_delay(Duration::from_millis(300)));
        orchestrator.start(LOGIN_FORM_BRIEF).unwrap();
        wait_for_running(&orchestrator, StageId::SpecEvaluation).await;

        orchestrator.complete_stage(4, true).unwrap();
        let snapshot = orchestrator
            .wait_for(WAIT, |s| s.is_complete)
            .await
            .expect("run did not complete");
        let selection = snapshot.outputs.selection.as_ref().unwrap();
        assert!(selection.fallback);
        assert_eq!(selection.selected.name, "Centered Card Login");
        assert!(selection.justification.contains("first generated specification"));
        assert!(snapshot.errors.iter().any(|e| e.stage_index == 5));

        // The delayed evaluations are discarded once the stage is settled.
        let snapshot = settle(&orchestrator).await;
        assert!(snapshot.outputs.spec_evaluations.is_empty());
        assert!(snapshot.outputs.selection.unwrap().fallback);
        let stage4_completions = snapshot
            .timeline
            .iter()
            .filter(|e| e.kind == TimelineKind::StageCompleted && e.stage_index == Some(4))
            .count();
        assert_eq!(stage4_completions, 1);
        assert_eq!(snapshot.timeline.last().unwrap().kind, TimelineKind::RunCompleted);
    }

    #[tokio::test]
    async fn test_manual_selection_discards_late_selection() {
        let (orchestrator, _, _) =
            build(ScriptedGenerator::new().with_evaluation_delay(Duration::from_millis(300)));
        orchestrator.start(LOGIN_FORM_BRIEF).unwrap();
        wait_for_running(&orchestrator, StageId::SpecEvaluation).await;

        orchestrator.complete_stage(4, true).unwrap();
        assert!(orchestrator.snapshot().running_stages.contains(&5));
        orchestrator.complete_stage(5, true).unwrap();
        let snapshot = settle(&orchestrator).await;

        assert_eq!(snapshot.current_stage_index, 6);
        assert!(snapshot.outputs.selection.is_none());
        assert!(snapshot.outputs.spec_evaluations.is_empty());
        for stage in [4, 5] {
            let completions = snapshot
                .timeline
                .iter()
                .filter(|e| e.kind == TimelineKind::StageCompleted && e.stage_index == Some(stage))
                .count();
            assert_eq!(completions, 1, "stage {stage} completed more than once");
        }
    }

    #[tokio::test]
    async fn test_download_packages_selection() {
        let (orchestrator, _, sink) = build(ScriptedGenerator::new());
        orchestrator.start(LOGIN_FORM_BRIEF).unwrap();
        let _ = settle(&orchestrator).await;

        let artifact = orchestrator.download().await.unwrap();
        assert!(artifact.verify());
        assert_eq!(artifact.file_name, "centered-card-login.json");

        let request: PackageRequest = serde_json::from_slice(&artifact.bytes).unwrap();
        assert_eq!(request.brief, LOGIN_FORM_BRIEF);
        assert_eq!(request.selected_spec.name, "Centered Card Login");
        assert!(!request.timeline.is_empty());

        let snapshot = orchestrator.snapshot();
        assert_eq!(snapshot.outputs.packaged.unwrap().sha256, artifact.sha256);
        assert_eq!(sink.count("package.created"), 1);
    }

    #[tokio::test]
    async fn test_restart_after_completion() {
        let (orchestrator, generator, sink) = build(ScriptedGenerator::new());
        orchestrator.start(LOGIN_FORM_BRIEF).unwrap();
        let first = settle(&orchestrator).await;

        orchestrator.reset();
        orchestrator.start("Design a settings page").unwrap();
        let second = settle(&orchestrator).await;

        assert!(second.is_complete);
        assert_ne!(first.run_id, second.run_id);
        assert_eq!(generator.calls().generate_concepts, 2);
        assert_eq!(sink.count("pipeline.started"), 2);
    }
}
