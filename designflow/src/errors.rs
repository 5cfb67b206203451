//! Error types for the designflow crate.
//!
//! External-call failures are converted into these typed markers at the
//! narrowest boundary (one request) and never cross a stage boundary as
//! errors; command methods on the orchestrator return [`DesignflowError`].

use std::collections::HashMap;
use thiserror::Error;

/// The main error type for designflow commands.
#[derive(Debug, Error)]
pub enum DesignflowError {
    /// A run was started with a blank brief.
    #[error("Design brief must not be empty")]
    EmptyBrief,

    /// A stage index outside the pipeline was supplied.
    #[error("Invalid stage index {index}: the pipeline has {count} stages")]
    InvalidStage {
        /// The rejected index.
        index: usize,
        /// Number of stages in the pipeline.
        count: usize,
    },

    /// A command was rejected because of the run's current state.
    #[error("Command rejected: {0}")]
    InvalidCommand(String),

    /// The run was aborted.
    #[error("Run aborted")]
    Aborted,

    /// A generation call failed.
    #[error("{0}")]
    Generation(#[from] GenerationFailure),

    /// Packaging failed.
    #[error("{0}")]
    Packaging(#[from] PackagingError),

    /// Configuration was invalid.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for DesignflowError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Failures of the raw text-generation call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GenerationError {
    /// The provider returned an empty response.
    #[error("Generator returned an empty response")]
    Empty,

    /// The provider rate-limited the request.
    #[error("Rate limited by provider{}", retry_after_ms.map(|ms| format!(" (retry after {ms}ms)")).unwrap_or_default())]
    RateLimited {
        /// Delay requested by the provider, if any.
        retry_after_ms: Option<u64>,
    },

    /// Rate-limit retries were exhausted.
    #[error("Retries exhausted after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        /// Number of attempts made.
        attempts: usize,
        /// The last error observed.
        last_error: String,
    },

    /// The request timed out.
    #[error("Generation timed out after {timeout_ms}ms")]
    Timeout {
        /// The timeout in milliseconds.
        timeout_ms: u64,
    },

    /// The provider answered with a non-success HTTP status.
    #[error("Provider returned HTTP {status}: {message}")]
    Http {
        /// The HTTP status code.
        status: u16,
        /// Response body or reason.
        message: String,
    },

    /// Any other provider or transport failure.
    #[error("Provider error: {0}")]
    Provider(String),
}

impl GenerationError {
    /// Returns true if the error is a rate-limit signal.
    #[must_use]
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }
}

/// Failure to recover a structured payload from generated text.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseFailure {
    /// The text was empty or whitespace.
    #[error("Response was empty")]
    Empty,

    /// No strategy found structured content.
    #[error("No structured content found in response: {preview}")]
    NoStructuredContent {
        /// Leading characters of the response.
        preview: String,
    },

    /// Structured content was found but had the wrong shape.
    #[error("Expected {expected}: {message}")]
    InvalidShape {
        /// The expected payload shape.
        expected: &'static str,
        /// What went wrong.
        message: String,
    },
}

impl ParseFailure {
    /// Creates a no-structured-content failure with a short preview.
    #[must_use]
    pub fn no_content(text: &str) -> Self {
        Self::NoStructuredContent {
            preview: text.chars().take(80).collect(),
        }
    }

    /// Creates a shape failure.
    #[must_use]
    pub fn invalid_shape(expected: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidShape {
            expected,
            message: message.into(),
        }
    }
}

/// The failure contract of the structured generation capability.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GenerationFailure {
    /// The text-generation call itself failed.
    #[error("Generation failed: {0}")]
    Generation(#[from] GenerationError),

    /// The response could not be parsed into the expected payload.
    #[error("Parse failed: {0}")]
    Parse(#[from] ParseFailure),
}

impl GenerationFailure {
    /// Converts to a dictionary representation for event payloads.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        let kind = match self {
            Self::Generation(GenerationError::RateLimited { .. } | GenerationError::RetriesExhausted { .. }) => {
                "rate_limited"
            }
            Self::Generation(_) => "generation",
            Self::Parse(_) => "parse",
        };
        map.insert("type".to_string(), serde_json::json!(kind));
        map.insert("message".to_string(), serde_json::json!(self.to_string()));
        map
    }
}

/// Failures of the packaging hand-off.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PackagingError {
    /// No selection exists yet.
    #[error("Nothing to package: no specification has been selected")]
    NoSelection,

    /// The bundle could not be serialized.
    #[error("Failed to serialize package: {0}")]
    Serialization(String),

    /// The packager failed.
    #[error("Packaging failed: {0}")]
    Failed(String),
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A field held an invalid value.
    #[error("Invalid configuration for '{field}': {message}")]
    Invalid {
        /// The offending field.
        field: &'static str,
        /// What is wrong.
        message: String,
    },

    /// The configuration could not be parsed.
    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    /// The configuration file could not be read.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConfigError {
    /// Creates an invalid-field error.
    #[must_use]
    pub fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            message: message.into(),
        }
    }
}
