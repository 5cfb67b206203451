//! Structured generation client.
//!
//! Layers, innermost first:
//!
//! - [`TextGenerator`]: the raw black-box call
//! - [`RetryingGenerator`]: retries rate-limited calls with backoff
//! - [`StructuredClient`]: prompts plus ordered fallback parsing, exposed as
//!   the [`DesignGenerator`] capability the pipeline consumes

mod client;
pub mod extraction;
#[cfg(feature = "http")]
mod http;
pub mod prompts;
mod retry;
mod structured;

pub use client::{GenerationOptions, TextGenerator};
#[cfg(test)]
pub use client::MockTextGenerator;
pub use extraction::{ExtractionStrategy, Parsed};
#[cfg(feature = "http")]
pub use http::{HttpGeneratorConfig, HttpTextGenerator};
pub use retry::{BackoffStrategy, JitterStrategy, RetryConfig, RetryingGenerator};
pub use structured::{
    parse_concept_evaluations, parse_concepts, parse_spec, parse_spec_evaluation, CallOptions, DesignGenerator,
    StructuredClient,
};
