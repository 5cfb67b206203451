//! OpenAI-compatible chat-completions provider.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tracing::debug;

use super::client::{GenerationOptions, TextGenerator};
use crate::errors::GenerationError;

/// Connection settings for an OpenAI-compatible endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpGeneratorConfig {
    /// Base URL, e.g. `https://api.openai.com/v1`.
    pub base_url: String,
    /// Model name.
    pub model: String,
    /// Bearer token, if the endpoint requires one.
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    /// Per-request timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_timeout_ms() -> u64 {
    60_000
}

impl HttpGeneratorConfig {
    /// Creates settings for `model` at `base_url` with no API key.
    #[must_use]
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            model: model.into(),
            api_key: None,
            timeout_ms: default_timeout_ms(),
        }
    }

    /// Sets the bearer token.
    #[must_use]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Sets the request timeout.
    #[must_use]
    pub const fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }
}

/// Reads a `Retry-After` header given in seconds, as milliseconds.
fn retry_after_ms(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(|secs| secs.saturating_mul(1000))
}

/// A [`TextGenerator`] that calls `/chat/completions`.
#[derive(Debug, Clone)]
pub struct HttpTextGenerator {
    client: Client,
    config: HttpGeneratorConfig,
}

impl HttpTextGenerator {
    /// Creates a generator for the given endpoint.
    pub fn new(config: HttpGeneratorConfig) -> Result<Self, GenerationError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| GenerationError::Provider(e.to_string()))?;
        Ok(Self { client, config })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }

    fn map_send_error(&self, err: &reqwest::Error) -> GenerationError {
        if err.is_timeout() {
            GenerationError::Timeout {
                timeout_ms: self.config.timeout_ms,
            }
        } else {
            GenerationError::Provider(err.to_string())
        }
    }
}

#[async_trait]
impl TextGenerator for HttpTextGenerator {
    async fn generate(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        options: &GenerationOptions,
    ) -> Result<String, GenerationError> {
        let body = json!({
            "model": self.config.model,
            "messages": [
                { "role": "system", "content": system_prompt },
                { "role": "user", "content": user_prompt },
            ],
            "temperature": options.temperature,
            "max_tokens": options.max_tokens,
        });

        let mut request = self.client.post(self.endpoint()).json(&body);
        if let Some(ref key) = self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| self.map_send_error(&e))?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_ms = retry_after_ms(response.headers());
            debug!(?retry_after_ms, "Provider returned 429");
            return Err(GenerationError::RateLimited { retry_after_ms });
        }

        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(GenerationError::Http {
                status: status.as_u16(),
                message: message.chars().take(500).collect(),
            });
        }

        let payload: serde_json::Value = response.json().await.map_err(|e| self.map_send_error(&e))?;
        let content = payload["choices"][0]["message"]["content"].as_str().unwrap_or_default();
        if content.trim().is_empty() {
            return Err(GenerationError::Empty);
        }
        Ok(content.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let config = HttpGeneratorConfig::new("http://localhost:8080/v1/", "test")
            .with_api_key("secret")
            .with_timeout_ms(1000);
        assert!(!serde_json::to_string(&config).unwrap().contains("secret"));
        let generator = HttpTextGenerator::new(config).unwrap();
        assert_eq!(generator.endpoint(), "http://localhost:8080/v1/chat/completions");
    }

    #[test]
    fn test_retry_after_seconds_become_millis() {
        let mut headers = HeaderMap::new();
        assert_eq!(retry_after_ms(&headers), None);

        headers.insert(RETRY_AFTER, " 2 ".parse().unwrap());
        assert_eq!(retry_after_ms(&headers), Some(2000));

        headers.insert(RETRY_AFTER, "Wed, 21 Oct 2026 07:28:00 GMT".parse().unwrap());
        assert_eq!(retry_after_ms(&headers), None);
    }

    #[test]
    fn test_config_defaults_timeout() {
        let config: HttpGeneratorConfig =
            serde_json::from_str(r#"{"base_url": "http://x", "model": "m"}"#).unwrap();
        assert_eq!(config.timeout_ms, 60_000);
        assert!(config.api_key.is_none());
    }
}
