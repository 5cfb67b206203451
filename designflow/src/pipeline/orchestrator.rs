//! The orchestrator: command surface, dispatch loop and task spawning.
//!
//! All run state lives in one [`PipelineRun`] behind a mutex. Every command
//! and every stage result is applied as a single synchronous transition,
//! followed in the same critical section by a dispatcher pass that claims
//! the guards of newly eligible stages. Their tasks are spawned once the
//! lock is released.

use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, Instrument};
use uuid::Uuid;

use super::dispatcher::{next_actions, Action};
use super::guard::StageGuard;
use super::handlers;
use super::packaging::{JsonBundlePackager, PackageRequest, PackagedArtifact, Packager};
use super::run::{stage_at, PipelineRun, StartOutcome};
use super::snapshot::RunSnapshot;
use crate::config::OrchestratorConfig;
use crate::core::TimelineEvent;
use crate::errors::{ConfigError, DesignflowError, PackagingError};
use crate::events::{EventSink, NoOpEventSink};
use crate::generation::{DesignGenerator, RetryingGenerator, StructuredClient, TextGenerator};
use crate::observability::stage_span;

/// How a bounded wait ended.
#[derive(Debug)]
pub(crate) enum WaitOutcome<T> {
    /// The probe produced a value.
    Ready(T),
    /// The timeout elapsed first.
    TimedOut,
    /// The run was aborted or replaced while waiting.
    Superseded,
}

/// State shared between the orchestrator handle and its stage tasks.
pub(crate) struct Shared {
    pub(crate) run: Mutex<PipelineRun>,
    revision: watch::Sender<u64>,
    pub(crate) generator: Arc<dyn DesignGenerator>,
    pub(crate) packager: Arc<dyn Packager>,
    pub(crate) sink: Arc<dyn EventSink>,
    pub(crate) config: OrchestratorConfig,
}

impl Shared {
    /// Signals watchers that the run changed.
    pub(crate) fn bump(&self) {
        self.revision.send_modify(|revision| *revision = revision.wrapping_add(1));
    }

    /// Applies one transition, dispatches, then publishes and spawns.
    pub(crate) fn mutate<R>(self: &Arc<Self>, transition: impl FnOnce(&mut PipelineRun) -> R) -> R {
        let (result, events, guards) = {
            let mut run = self.run.lock();
            let (run_id, mut mark) = (run.run_id(), run.timeline().len());
            let result = transition(&mut run);
            let guards = self.dispatch(&mut run);
            if run.run_id() != run_id {
                mark = 0;
            }
            let events = run.timeline().get(mark..).unwrap_or_default().to_vec();
            (result, events, guards)
        };
        self.publish(&events);
        for guard in guards {
            spawn(guard);
        }
        result
    }

    /// Completes a stage task, applying `apply` only if its run is still current.
    pub(crate) fn finish(guard: StageGuard, apply: impl FnOnce(&mut PipelineRun)) {
        let shared = Arc::clone(guard.shared());
        shared.mutate(|run| {
            if run.is_current(guard.run_id()) {
                apply(run);
            } else {
                debug!(stage = %guard.stage(), run_id = %guard.run_id(), "Discarding stale stage result");
            }
            guard.release(run);
        });
    }

    /// Waits until `probe` yields a value, the timeout elapses or the run
    /// identified by `run_id` stops being current.
    pub(crate) async fn wait_until<T>(
        &self,
        run_id: Uuid,
        timeout: Duration,
        mut probe: impl FnMut(&PipelineRun) -> Option<T>,
    ) -> WaitOutcome<T> {
        let mut changes = self.revision.subscribe();
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let found = {
                let run = self.run.lock();
                if !run.is_current(run_id) {
                    return WaitOutcome::Superseded;
                }
                probe(&run)
            };
            if let Some(value) = found {
                return WaitOutcome::Ready(value);
            }
            match tokio::time::timeout_at(deadline, changes.changed()).await {
                Ok(Ok(())) => {}
                Ok(Err(_)) | Err(_) => return WaitOutcome::TimedOut,
            }
        }
    }

    fn dispatch(self: &Arc<Self>, run: &mut PipelineRun) -> Vec<StageGuard> {
        let mut guards = Vec::new();
        loop {
            let mut completed_inline = false;
            for action in next_actions(run) {
                debug!(stage = %action.stage(), ?action, "Dispatching");
                match action {
                    Action::CompleteInline(stage) => {
                        run.mark_completed(stage, true);
                        completed_inline = true;
                    }
                    Action::Spawn(stage) => {
                        if let Some(guard) = StageGuard::acquire(self, run, stage) {
                            run.record_stage_started(stage);
                            guards.push(guard);
                        }
                    }
                }
            }
            if !completed_inline {
                return guards;
            }
        }
    }

    fn publish(&self, events: &[TimelineEvent]) {
        for event in events {
            self.sink.try_emit(event.kind.event_name(), Some(event.to_payload()));
        }
        self.bump();
    }
}

fn spawn(guard: StageGuard) {
    let span = stage_span(guard.run_id(), guard.stage());
    tokio::spawn(handlers::run_stage(guard).instrument(span));
}

/// Builder for [`Orchestrator`].
#[derive(Default)]
pub struct OrchestratorBuilder {
    generator: Option<Arc<dyn DesignGenerator>>,
    text_generator: Option<Arc<dyn TextGenerator>>,
    packager: Option<Arc<dyn Packager>>,
    sink: Option<Arc<dyn EventSink>>,
    config: OrchestratorConfig,
}

impl fmt::Debug for OrchestratorBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrchestratorBuilder")
            .field("generator", &self.generator.is_some())
            .field("text_generator", &self.text_generator.is_some())
            .field("packager", &self.packager.is_some())
            .field("sink", &self.sink.is_some())
            .field("config", &self.config)
            .finish()
    }
}

impl OrchestratorBuilder {
    /// Uses a structured generator as is.
    #[must_use]
    pub fn generator(mut self, generator: Arc<dyn DesignGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    /// Uses a raw text generator, wrapped with the configured retry policy
    /// and call options.
    #[must_use]
    pub fn text_generator(mut self, generator: Arc<dyn TextGenerator>) -> Self {
        self.text_generator = Some(generator);
        self
    }

    /// Sets the packager; defaults to [`JsonBundlePackager`].
    #[must_use]
    pub fn packager(mut self, packager: Arc<dyn Packager>) -> Self {
        self.packager = Some(packager);
        self
    }

    /// Sets the event sink; defaults to [`NoOpEventSink`].
    #[must_use]
    pub fn event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Sets the configuration.
    #[must_use]
    pub fn config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    /// Validates the configuration and builds the orchestrator.
    pub fn build(self) -> Result<Orchestrator, ConfigError> {
        self.config.validate()?;
        let generator: Arc<dyn DesignGenerator> = match (self.generator, self.text_generator) {
            (Some(generator), _) => generator,
            (None, Some(text)) => Arc::new(
                StructuredClient::new(RetryingGenerator::new(text, self.config.retry))
                    .with_options(self.config.generation),
            ),
            (None, None) => return Err(ConfigError::invalid("generator", "a generator is required")),
        };
        let (revision, _) = watch::channel(0);
        Ok(Orchestrator {
            shared: Arc::new(Shared {
                run: Mutex::new(PipelineRun::new()),
                revision,
                generator,
                packager: self.packager.unwrap_or_else(|| Arc::new(JsonBundlePackager::new())),
                sink: self.sink.unwrap_or_else(|| Arc::new(NoOpEventSink)),
                config: self.config,
            }),
        })
    }
}

/// Drives one design pipeline run.
///
/// Cheap to clone; clones share the same run. Commands that change the run
/// spawn stage work on the ambient Tokio runtime and must be called from
/// within one.
#[derive(Clone)]
pub struct Orchestrator {
    shared: Arc<Shared>,
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let run = self.shared.run.lock();
        f.debug_struct("Orchestrator")
            .field("run_id", &run.run_id())
            .field("position", &run.position())
            .field("config", &self.shared.config)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Returns a builder.
    #[must_use]
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::default()
    }

    /// Creates an orchestrator with default packager, sink and configuration.
    #[must_use]
    pub fn new(generator: Arc<dyn DesignGenerator>) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            shared: Arc::new(Shared {
                run: Mutex::new(PipelineRun::new()),
                revision,
                generator,
                packager: Arc::new(JsonBundlePackager::new()),
                sink: Arc::new(NoOpEventSink),
                config: OrchestratorConfig::default(),
            }),
        }
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &OrchestratorConfig {
        &self.shared.config
    }

    /// Starts a run with `brief` and launches stage 0.
    pub fn start(&self, brief: &str) -> Result<StartOutcome, DesignflowError> {
        let outcome = self.shared.mutate(|run| run.start(brief))?;
        match outcome {
            StartOutcome::Started(run_id) => info!(%run_id, "Pipeline run started"),
            StartOutcome::AlreadyRunning => debug!("Start ignored; a run is already in progress"),
        }
        Ok(outcome)
    }

    /// Aborts the run. Returns false if it was already aborted.
    pub fn abort(&self) -> bool {
        let aborted = self.shared.mutate(PipelineRun::abort);
        if aborted {
            info!("Pipeline run aborted");
        }
        aborted
    }

    /// Returns to the not-started state, discarding outputs.
    pub fn reset(&self) {
        self.shared.mutate(PipelineRun::reset);
        info!("Pipeline run reset");
    }

    /// Marks stage `index` completed, moving past it if `advance`.
    pub fn complete_stage(&self, index: usize, advance: bool) -> Result<(), DesignflowError> {
        let stage = stage_at(index)?;
        self.shared.mutate(|run| run.complete_stage(stage, advance))
    }

    /// Clears a failure on the active stage and runs it again.
    pub fn retry_stage(&self, index: usize) -> Result<(), DesignflowError> {
        let stage = stage_at(index)?;
        self.shared.mutate(|run| run.retry_stage(stage))?;
        info!(%stage, "Stage retry requested");
        Ok(())
    }

    /// Marks stage `index` as accepted by the user.
    pub fn mark_validated(&self, index: usize) -> Result<(), DesignflowError> {
        let stage = stage_at(index)?;
        self.shared.mutate(|run| run.mark_validated(stage));
        Ok(())
    }

    /// Marks stage `index` as rejected by the user.
    pub fn mark_invalidated(&self, index: usize, feedback: &str) -> Result<(), DesignflowError> {
        let stage = stage_at(index)?;
        self.shared.mutate(|run| run.mark_invalidated(stage, feedback));
        Ok(())
    }

    /// Packages the current selection and returns the artifact.
    pub async fn download(&self) -> Result<PackagedArtifact, DesignflowError> {
        let request = {
            let run = self.shared.run.lock();
            let selection = run.outputs().selection.as_ref().ok_or(PackagingError::NoSelection)?;
            PackageRequest {
                run_id: run.run_id(),
                brief: run.outputs().brief.clone(),
                selected_spec: selection.selected.clone(),
                justification: selection.justification.clone(),
                timeline: run.timeline().to_vec(),
            }
        };

        let artifact = self.shared.packager.package(&request).await?;
        let receipt = artifact.receipt();
        info!(file_name = %receipt.file_name, size_bytes = receipt.size_bytes, "Selection packaged");
        self.shared.mutate(|run| {
            if run.run_id() == request.run_id {
                run.set_packaged(receipt);
            }
        });
        Ok(artifact)
    }

    /// Returns a snapshot of the run.
    #[must_use]
    pub fn snapshot(&self) -> RunSnapshot {
        RunSnapshot::from(&*self.shared.run.lock())
    }

    /// Returns a receiver that changes after every run mutation.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.shared.revision.subscribe()
    }

    /// Waits until a snapshot satisfies `predicate`, or the timeout elapses.
    pub async fn wait_for(
        &self,
        timeout: Duration,
        predicate: impl Fn(&RunSnapshot) -> bool,
    ) -> Option<RunSnapshot> {
        let mut changes = self.subscribe();
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let snapshot = self.snapshot();
            if predicate(&snapshot) {
                return Some(snapshot);
            }
            match tokio::time::timeout_at(deadline, changes.changed()).await {
                Ok(Ok(())) => {}
                Ok(Err(_)) | Err(_) => return None,
            }
        }
    }

    /// Waits until no stage work is in flight. Returns false on timeout.
    pub async fn wait_until_idle(&self, timeout: Duration) -> bool {
        self.wait_for(timeout, RunSnapshot::is_idle).await.is_some()
    }
}
