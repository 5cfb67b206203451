//! The raw text-generation boundary.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::errors::{ConfigError, GenerationError};

/// Sampling options for one generation call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationOptions {
    /// Sampling temperature in `[0, 2]`.
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Upper bound on generated tokens.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    2000
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

impl GenerationOptions {
    /// Creates options with the given temperature and token limit.
    #[must_use]
    pub const fn new(temperature: f32, max_tokens: u32) -> Self {
        Self {
            temperature,
            max_tokens,
        }
    }

    /// Options for concept generation: exploratory.
    #[must_use]
    pub const fn concept_generation() -> Self {
        Self::new(0.8, 2000)
    }

    /// Options for concept evaluation: conservative.
    #[must_use]
    pub const fn concept_evaluation() -> Self {
        Self::new(0.3, 1500)
    }

    /// Options for spec generation.
    #[must_use]
    pub const fn spec_generation() -> Self {
        Self::new(0.7, 4000)
    }

    /// Options for spec evaluation.
    #[must_use]
    pub const fn spec_evaluation() -> Self {
        Self::new(0.3, 2000)
    }

    /// Checks the temperature range and token limit.
    pub fn validate(&self, field: &'static str) -> Result<(), ConfigError> {
        if !self.temperature.is_finite() || !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::invalid(
                field,
                format!("temperature must be within [0, 2], got {}", self.temperature),
            ));
        }
        if self.max_tokens == 0 {
            return Err(ConfigError::invalid(field, "max_tokens must be at least 1"));
        }
        Ok(())
    }
}

/// A black-box text generator.
///
/// Implementations return the raw response text or a typed failure. An
/// empty response should be reported as [`GenerationError::Empty`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generates text for a system and user prompt.
    async fn generate(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        options: &GenerationOptions,
    ) -> Result<String, GenerationError>;
}

#[async_trait]
impl<T: TextGenerator + ?Sized> TextGenerator for Arc<T> {
    async fn generate(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        options: &GenerationOptions,
    ) -> Result<String, GenerationError> {
        (**self).generate(system_prompt, user_prompt, options).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_are_valid() {
        for options in [
            GenerationOptions::concept_generation(),
            GenerationOptions::concept_evaluation(),
            GenerationOptions::spec_generation(),
            GenerationOptions::spec_evaluation(),
        ] {
            assert!(options.validate("options").is_ok());
        }
    }

    #[test]
    fn test_validate_rejects_bad_temperature() {
        assert!(GenerationOptions::new(2.5, 100).validate("options").is_err());
        assert!(GenerationOptions::new(-0.1, 100).validate("options").is_err());
        assert!(GenerationOptions::new(f32::NAN, 100).validate("options").is_err());
        assert!(GenerationOptions::new(0.5, 0).validate("options").is_err());
    }

    #[test]
    fn test_options_deserialize_with_defaults() {
        let options: GenerationOptions = serde_json::from_str(r#"{"temperature": 0.2}"#).unwrap();
        assert_eq!(options.temperature, 0.2);
        assert_eq!(options.max_tokens, 2000);
    }

    #[tokio::test]
    async fn test_mock_generator() {
        let mut mock = MockTextGenerator::new();
        mock.expect_generate()
            .times(1)
            .returning(|_, user, _| Ok(format!("echo: {user}")));

        let text = mock
            .generate("system", "hello", &GenerationOptions::default())
            .await
            .unwrap();
        assert_eq!(text, "echo: hello");
    }
}
