//! The structured generation capability.
//!
//! [`DesignGenerator`] is what pipeline stages consume. [`StructuredClient`]
//! implements it on top of any [`TextGenerator`] by building prompts and
//! running the fallback extraction chain over each response.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, instrument};

use super::client::{GenerationOptions, TextGenerator};
use super::extraction::{extract_json_value, extract_string_list, ExtractionStrategy, Parsed};
use super::prompts;
use crate::core::{ConceptEvaluation, EvaluationResult, Issue, Severity, SubScores, UiSpec};
use crate::errors::{ConfigError, GenerationError, GenerationFailure, ParseFailure};
use crate::scoring::score_from_value;

/// Structured generation calls used by the pipeline stages.
#[async_trait]
pub trait DesignGenerator: Send + Sync {
    /// Produces design concepts for a brief.
    async fn generate_concepts(&self, brief: &str) -> Result<Vec<String>, GenerationFailure>;

    /// Scores each concept against the brief.
    async fn evaluate_concepts(
        &self,
        brief: &str,
        concepts: &[String],
    ) -> Result<Vec<ConceptEvaluation>, GenerationFailure>;

    /// Produces one UI specification for the selected concept.
    ///
    /// `variant` is the slot index within a parallel batch.
    async fn generate_spec(&self, brief: &str, concept: &str, variant: usize) -> Result<UiSpec, GenerationFailure>;

    /// Evaluates one UI specification.
    async fn evaluate_spec(&self, brief: &str, spec: &UiSpec) -> Result<EvaluationResult, GenerationFailure>;
}

#[async_trait]
impl<T: DesignGenerator + ?Sized> DesignGenerator for Arc<T> {
    async fn generate_concepts(&self, brief: &str) -> Result<Vec<String>, GenerationFailure> {
        (**self).generate_concepts(brief).await
    }

    async fn evaluate_concepts(
        &self,
        brief: &str,
        concepts: &[String],
    ) -> Result<Vec<ConceptEvaluation>, GenerationFailure> {
        (**self).evaluate_concepts(brief, concepts).await
    }

    async fn generate_spec(&self, brief: &str, concept: &str, variant: usize) -> Result<UiSpec, GenerationFailure> {
        (**self).generate_spec(brief, concept, variant).await
    }

    async fn evaluate_spec(&self, brief: &str, spec: &UiSpec) -> Result<EvaluationResult, GenerationFailure> {
        (**self).evaluate_spec(brief, spec).await
    }
}

/// Sampling options for each of the four call kinds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CallOptions {
    /// Concept generation.
    #[serde(default = "GenerationOptions::concept_generation")]
    pub concept_generation: GenerationOptions,
    /// Concept evaluation.
    #[serde(default = "GenerationOptions::concept_evaluation")]
    pub concept_evaluation: GenerationOptions,
    /// Spec generation.
    #[serde(default = "GenerationOptions::spec_generation")]
    pub spec_generation: GenerationOptions,
    /// Spec evaluation.
    #[serde(default = "GenerationOptions::spec_evaluation")]
    pub spec_evaluation: GenerationOptions,
}

impl Default for CallOptions {
    fn default() -> Self {
        Self {
            concept_generation: GenerationOptions::concept_generation(),
            concept_evaluation: GenerationOptions::concept_evaluation(),
            spec_generation: GenerationOptions::spec_generation(),
            spec_evaluation: GenerationOptions::spec_evaluation(),
        }
    }
}

impl CallOptions {
    /// Validates every option set.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.concept_generation.validate("generation.concept_generation")?;
        self.concept_evaluation.validate("generation.concept_evaluation")?;
        self.spec_generation.validate("generation.spec_generation")?;
        self.spec_evaluation.validate("generation.spec_evaluation")
    }
}

/// A [`DesignGenerator`] backed by a raw [`TextGenerator`].
#[derive(Debug, Clone)]
pub struct StructuredClient<G> {
    generator: G,
    options: CallOptions,
}

impl<G: TextGenerator> StructuredClient<G> {
    /// Creates a client with default call options.
    pub fn new(generator: G) -> Self {
        Self {
            generator,
            options: CallOptions::default(),
        }
    }

    /// Sets the call options.
    #[must_use]
    pub fn with_options(mut self, options: CallOptions) -> Self {
        self.options = options;
        self
    }

    /// Returns the call options.
    pub const fn options(&self) -> &CallOptions {
        &self.options
    }

    async fn call(&self, prompt: prompts::Prompt, options: &GenerationOptions) -> Result<String, GenerationError> {
        let text = self.generator.generate(&prompt.system, &prompt.user, options).await?;
        if text.trim().is_empty() {
            return Err(GenerationError::Empty);
        }
        Ok(text)
    }
}

fn log_strategy(call: &'static str, strategy: ExtractionStrategy) {
    if strategy.is_heuristic() {
        debug!(call, %strategy, "Recovered payload with heuristic extraction");
    } else {
        debug!(call, %strategy, "Parsed structured payload");
    }
}

#[async_trait]
impl<G: TextGenerator> DesignGenerator for StructuredClient<G> {
    #[instrument(skip_all)]
    async fn generate_concepts(&self, brief: &str) -> Result<Vec<String>, GenerationFailure> {
        let text = self.call(prompts::concepts(brief), &self.options.concept_generation).await?;
        let parsed = parse_concepts(&text)?;
        log_strategy("generate_concepts", parsed.strategy);
        Ok(parsed.value)
    }

    #[instrument(skip_all, fields(concepts = concepts.len()))]
    async fn evaluate_concepts(
        &self,
        brief: &str,
        concepts: &[String],
    ) -> Result<Vec<ConceptEvaluation>, GenerationFailure> {
        let prompt = prompts::concept_evaluation(brief, concepts);
        let text = self.call(prompt, &self.options.concept_evaluation).await?;
        let parsed = parse_concept_evaluations(&text, concepts)?;
        log_strategy("evaluate_concepts", parsed.strategy);
        Ok(parsed.value)
    }

    #[instrument(skip_all, fields(variant = variant))]
    async fn generate_spec(&self, brief: &str, concept: &str, variant: usize) -> Result<UiSpec, GenerationFailure> {
        let text = self
            .call(prompts::spec(brief, concept, variant), &self.options.spec_generation)
            .await?;
        let parsed = parse_spec(&text)?;
        log_strategy("generate_spec", parsed.strategy);
        Ok(parsed.value)
    }

    #[instrument(skip_all, fields(spec = %spec.name))]
    async fn evaluate_spec(&self, brief: &str, spec: &UiSpec) -> Result<EvaluationResult, GenerationFailure> {
        let text = self
            .call(prompts::spec_evaluation(brief, spec), &self.options.spec_evaluation)
            .await?;
        let parsed = parse_spec_evaluation(&text)?;
        log_strategy("evaluate_spec", parsed.strategy);
        Ok(parsed.value)
    }
}

/// Parses a concept list, falling back to line splitting and raw text.
pub fn parse_concepts(text: &str) -> Result<Parsed<Vec<String>>, ParseFailure> {
    let parsed = extract_string_list(text)?;
    let mut seen = Vec::new();
    let concepts = parsed.map(|items| {
        items
            .into_iter()
            .filter(|item| {
                let key = item.to_lowercase();
                let fresh = !seen.contains(&key);
                seen.push(key);
                fresh
            })
            .collect::<Vec<_>>()
    });
    if concepts.value.is_empty() {
        return Err(ParseFailure::invalid_shape("concept list", "no concepts found"));
    }
    Ok(concepts)
}

/// Parses concept scores. A bare array of numbers is matched by position.
pub fn parse_concept_evaluations(text: &str, concepts: &[String]) -> Result<Parsed<Vec<ConceptEvaluation>>, ParseFailure> {
    let parsed = extract_json_value(text)?;
    let strategy = parsed.strategy;
    let entries = match &parsed.value {
        Value::Array(items) => items.clone(),
        Value::Object(map) => ["evaluations", "concepts", "results", "scores"]
            .iter()
            .find_map(|k| map.get(*k).and_then(Value::as_array))
            .cloned()
            .ok_or_else(|| ParseFailure::invalid_shape("concept evaluations", "no evaluation array"))?,
        _ => return Err(ParseFailure::invalid_shape("concept evaluations", "expected an array")),
    };

    let evaluations: Vec<ConceptEvaluation> = entries
        .iter()
        .enumerate()
        .filter_map(|(i, entry)| match entry {
            Value::Object(map) => {
                let concept = string_field(map, &["concept", "name", "title"])
                    .or_else(|| concepts.get(i).cloned())
                    .unwrap_or_default();
                let score = score_from_value(map.get("score").or_else(|| map.get("rating")));
                let reason = string_field(map, &["reason", "rationale", "explanation"]).unwrap_or_default();
                Some(ConceptEvaluation::new(concept, score, reason))
            }
            Value::Number(_) | Value::String(_) => concepts
                .get(i)
                .map(|concept| ConceptEvaluation::new(concept.clone(), score_from_value(Some(entry)), "")),
            _ => None,
        })
        .collect();

    if evaluations.is_empty() {
        return Err(ParseFailure::invalid_shape("concept evaluations", "no usable entries"));
    }
    Ok(Parsed::new(evaluations, strategy))
}

/// Parses a UI specification and checks that it is well formed.
pub fn parse_spec(text: &str) -> Result<Parsed<UiSpec>, ParseFailure> {
    let parsed = extract_json_value(text)?;
    let strategy = parsed.strategy;
    let value = match parsed.value {
        Value::Object(mut map) if map.contains_key("spec") => map.remove("spec").unwrap_or(Value::Null),
        other => other,
    };
    let spec: UiSpec =
        serde_json::from_value(value).map_err(|e| ParseFailure::invalid_shape("ui spec", e.to_string()))?;
    if !spec.is_well_formed() {
        return Err(ParseFailure::invalid_shape("ui spec", "spec needs a name and at least one component"));
    }
    Ok(Parsed::new(spec, strategy))
}

/// Parses a spec evaluation, normalizing scores and severities.
///
/// At least one sub-score must be present; missing ones are neutral.
pub fn parse_spec_evaluation(text: &str) -> Result<Parsed<EvaluationResult>, ParseFailure> {
    let parsed = extract_json_value(text)?;
    let strategy = parsed.strategy;
    let Value::Object(root) = parsed.value else {
        return Err(ParseFailure::invalid_shape("spec evaluation", "expected an object"));
    };
    let scores_map = root.get("scores").and_then(Value::as_object).unwrap_or(&root);

    let dimension = |name: &str| {
        [name.to_string(), format!("{name}Score"), format!("{name}_score")]
            .iter()
            .find_map(|k| scores_map.get(k))
    };
    let found = ["clarity", "structure", "feasibility", "accessibility"]
        .into_iter()
        .filter(|d| dimension(d).is_some())
        .count();
    if found == 0 {
        return Err(ParseFailure::invalid_shape("spec evaluation", "no sub-scores present"));
    }

    let scores = SubScores::new(
        score_from_value(dimension("clarity")),
        score_from_value(dimension("structure")),
        score_from_value(dimension("feasibility")),
        score_from_value(dimension("accessibility")),
    );

    let issues = root
        .get("issues")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_object)
                .map(|issue| {
                    Issue::new(
                        string_field(issue, &["category", "type"]).unwrap_or_else(|| "general".to_string()),
                        Severity::parse_lenient(&string_field(issue, &["severity"]).unwrap_or_default()),
                        string_field(issue, &["description", "issue", "message"]).unwrap_or_default(),
                        string_field(issue, &["suggestion", "fix"]).unwrap_or_default(),
                    )
                })
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();

    let mut evaluation = EvaluationResult::new(scores);
    evaluation.issues = issues;
    evaluation.strengths = string_list(root.get("strengths"));
    evaluation.recommendations = string_list(root.get("recommendations"));
    Ok(Parsed::new(evaluation, strategy))
}

fn string_field(map: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|k| map.get(*k).and_then(Value::as_str))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(ToString::to_string)
                .collect()
        })
        .unwrap_or_default()
}
