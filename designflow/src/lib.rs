//! # Designflow
//!
//! Orchestration engine for a seven-stage generative UI design pipeline.
//!
//! A brief goes in; concepts are generated and scored, the best concept is
//! expanded into several structured UI specifications in parallel, each spec
//! is evaluated, and one is selected deterministically with a written
//! justification. The crate provides:
//!
//! - **Step state machine**: a single owned run, advanced monotonically by
//!   pure trigger predicates evaluated after every mutation
//! - **Parallel generation**: all-settled batches with per-slot progress
//! - **Scoring and ranking**: normalized scores, weighted composites and
//!   stable tie-breaking
//! - **Generation client**: structured calls over any text generator, with
//!   fallback parsing and rate-limit retries
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use designflow::prelude::*;
//!
//! let orchestrator = Orchestrator::builder()
//!     .text_generator(Arc::new(HttpTextGenerator::new(HttpGeneratorConfig::new(url, model))?))
//!     .build()?;
//!
//! orchestrator.start("Design a login form")?;
//! orchestrator.wait_until_idle(Duration::from_secs(120)).await;
//! let artifact = orchestrator.download().await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod config;
pub mod coordinator;
pub mod core;
pub mod errors;
pub mod events;
pub mod generation;
pub mod observability;
pub mod pipeline;
pub mod scoring;
pub mod testing;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::OrchestratorConfig;
    pub use crate::coordinator::{run_batch, BatchOutcome, ParallelCoordinator, SlotProgress};
    pub use crate::core::{
        ConceptEvaluation, EvaluationResult, GenerationProgressState, GenerationStatus, StageId,
        StagePosition, SubScores, TimelineEvent, TimelineKind, UiSpec,
    };
    pub use crate::errors::{
        ConfigError, DesignflowError, GenerationError, GenerationFailure, PackagingError, ParseFailure,
    };
    pub use crate::events::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::generation::{
        DesignGenerator, GenerationOptions, RetryConfig, RetryingGenerator, StructuredClient, TextGenerator,
    };
    #[cfg(feature = "http")]
    pub use crate::generation::{HttpGeneratorConfig, HttpTextGenerator};
    pub use crate::observability::{init_tracing, LogFormat};
    pub use crate::pipeline::{
        JsonBundlePackager, Orchestrator, PackagedArtifact, Packager, RunSnapshot, StartOutcome,
    };
    pub use crate::scoring::{
        composite_score, normalize_score, select_best, select_best_concept, select_spec, ScoringConfig,
        SelectionResult,
    };
    pub use crate::utils::iso_timestamp;
}
