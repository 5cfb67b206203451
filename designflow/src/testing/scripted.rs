//! A [`DesignGenerator`] driven by a script.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use super::fixtures;
use crate::core::{ConceptEvaluation, EvaluationResult, UiSpec};
use crate::errors::{GenerationError, GenerationFailure};
use crate::generation::DesignGenerator;
use crate::scoring::NEUTRAL_SCORE;

/// A latch that holds calls until opened.
#[derive(Debug, Clone)]
pub struct Gate {
    open: Arc<watch::Sender<bool>>,
}

impl Default for Gate {
    fn default() -> Self {
        Self::new()
    }
}

impl Gate {
    /// Creates a closed gate.
    #[must_use]
    pub fn new() -> Self {
        let (open, _) = watch::channel(false);
        Self { open: Arc::new(open) }
    }

    /// Opens the gate, releasing every current and future waiter.
    pub fn open(&self) {
        self.open.send_replace(true);
    }

    /// Waits until the gate is open.
    pub async fn wait(&self) {
        let mut rx = self.open.subscribe();
        // The sender lives in `self`, so this only returns once opened.
        let _ = rx.wait_for(|open| *open).await;
    }
}

/// Number of calls received per operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    /// `generate_concepts` calls.
    pub generate_concepts: usize,
    /// `evaluate_concepts` calls.
    pub evaluate_concepts: usize,
    /// `generate_spec` calls.
    pub generate_spec: usize,
    /// `evaluate_spec` calls.
    pub evaluate_spec: usize,
}

#[derive(Debug, Default)]
struct Counters {
    generate_concepts: AtomicUsize,
    evaluate_concepts: AtomicUsize,
    generate_spec: AtomicUsize,
    evaluate_spec: AtomicUsize,
}

/// Scripted structured generator.
///
/// By default it returns the login form concepts, neutral concept scores,
/// one login form spec per variant and a 7/10 evaluation for every spec.
#[derive(Debug, Default)]
pub struct ScriptedGenerator {
    concepts: Option<Result<Vec<String>, GenerationFailure>>,
    concept_scores: Option<Result<Vec<f64>, GenerationFailure>>,
    specs: HashMap<usize, Result<UiSpec, GenerationFailure>>,
    spec_evaluations: HashMap<String, Result<EvaluationResult, GenerationFailure>>,
    fail_all_spec_evaluations: bool,
    spec_delays: HashMap<usize, Duration>,
    evaluation_delay: Option<Duration>,
    spec_gate: Option<Gate>,
    counters: Counters,
    seen_variants: Mutex<HashSet<usize>>,
}

impl ScriptedGenerator {
    /// Creates a generator with the default script.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns these concepts from `generate_concepts`.
    #[must_use]
    pub fn with_concepts(mut self, concepts: Vec<String>) -> Self {
        self.concepts = Some(Ok(concepts));
        self
    }

    /// Fails `generate_concepts`.
    #[must_use]
    pub fn failing_concepts(mut self, error: GenerationFailure) -> Self {
        self.concepts = Some(Err(error));
        self
    }

    /// Scores concepts positionally in `evaluate_concepts`.
    #[must_use]
    pub fn with_concept_scores(mut self, scores: Vec<f64>) -> Self {
        self.concept_scores = Some(Ok(scores));
        self
    }

    /// Fails `evaluate_concepts`.
    #[must_use]
    pub fn failing_concept_evaluation(mut self, error: GenerationFailure) -> Self {
        self.concept_scores = Some(Err(error));
        self
    }

    /// Returns `spec` for `variant`.
    #[must_use]
    pub fn with_spec(mut self, variant: usize, spec: UiSpec) -> Self {
        self.specs.insert(variant, Ok(spec));
        self
    }

    /// Fails spec generation for `variant`.
    #[must_use]
    pub fn failing_spec(mut self, variant: usize, error: GenerationFailure) -> Self {
        self.specs.insert(variant, Err(error));
        self
    }

    /// Delays spec generation for `variant`.
    #[must_use]
    pub fn with_spec_delay(mut self, variant: usize, delay: Duration) -> Self {
        self.spec_delays.insert(variant, delay);
        self
    }

    /// Holds every spec generation call until `gate` opens.
    #[must_use]
    pub fn with_spec_gate(mut self, gate: Gate) -> Self {
        self.spec_gate = Some(gate);
        self
    }

    /// Returns `evaluation` for the UI spec named `spec_name`.
    #[must_use]
    pub fn with_spec_evaluation(mut self, spec_name: &str, evaluation: EvaluationResult) -> Self {
        self.spec_evaluations.insert(spec_name.to_string(), Ok(evaluation));
        self
    }

    /// Fails the evaluation of the UI spec named `spec_name`.
    #[must_use]
    pub fn failing_spec_evaluation(mut self, spec_name: &str, error: GenerationFailure) -> Self {
        self.spec_evaluations.insert(spec_name.to_string(), Err(error));
        self
    }

    /// Fails every spec evaluation.
    #[must_use]
    pub fn failing_spec_evaluations(mut self) -> Self {
        self.fail_all_spec_evaluations = true;
        self
    }

    /// Delays every spec evaluation.
    #[must_use]
    pub fn with_evaluation_delay(mut self, delay: Duration) -> Self {
        self.evaluation_delay = Some(delay);
        self
    }

    /// Calls received so far.
    #[must_use]
    pub fn calls(&self) -> CallCounts {
        CallCounts {
            generate_concepts: self.counters.generate_concepts.load(Ordering::SeqCst),
            evaluate_concepts: self.counters.evaluate_concepts.load(Ordering::SeqCst),
            generate_spec: self.counters.generate_spec.load(Ordering::SeqCst),
            evaluate_spec: self.counters.evaluate_spec.load(Ordering::SeqCst),
        }
    }

    /// Distinct variants requested from `generate_spec`.
    #[must_use]
    pub fn requested_variants(&self) -> Vec<usize> {
        let mut variants: Vec<usize> = self.seen_variants.lock().iter().copied().collect();
        variants.sort_unstable();
        variants
    }
}

fn unavailable() -> GenerationFailure {
    GenerationError::Provider("scripted evaluation failure".to_string()).into()
}

#[async_trait]
impl DesignGenerator for ScriptedGenerator {
    async fn generate_concepts(&self, _brief: &str) -> Result<Vec<String>, GenerationFailure> {
        self.counters.generate_concepts.fetch_add(1, Ordering::SeqCst);
        self.concepts.clone().unwrap_or_else(|| Ok(fixtures::login_form_concepts()))
    }

    async fn evaluate_concepts(
        &self,
        _brief: &str,
        concepts: &[String],
    ) -> Result<Vec<ConceptEvaluation>, GenerationFailure> {
        self.counters.evaluate_concepts.fetch_add(1, Ordering::SeqCst);
        let scores = match &self.concept_scores {
            Some(Ok(scores)) => scores.clone(),
            Some(Err(e)) => return Err(e.clone()),
            None => vec![NEUTRAL_SCORE; concepts.len()],
        };
        Ok(concepts
            .iter()
            .zip(scores)
            .map(|(concept, score)| ConceptEvaluation::new(concept.clone(), score, format!("Scored {score}")))
            .collect())
    }

    async fn generate_spec(&self, _brief: &str, _concept: &str, variant: usize) -> Result<UiSpec, GenerationFailure> {
        self.counters.generate_spec.fetch_add(1, Ordering::SeqCst);
        self.seen_variants.lock().insert(variant);
        if let Some(gate) = &self.spec_gate {
            gate.wait().await;
        }
        if let Some(delay) = self.spec_delays.get(&variant) {
            tokio::time::sleep(*delay).await;
        }
        self.specs
            .get(&variant)
            .cloned()
            .unwrap_or_else(|| Ok(fixtures::login_form_spec(variant)))
    }

    async fn evaluate_spec(&self, _brief: &str, spec: &UiSpec) -> Result<EvaluationResult, GenerationFailure> {
        self.counters.evaluate_spec.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.evaluation_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_all_spec_evaluations {
            return Err(unavailable());
        }
        self.spec_evaluations
            .get(&spec.name)
            .cloned()
            .unwrap_or_else(|| Ok(fixtures::evaluation(7.0, 7.0, 7.0, 7.0)))
    }
}
