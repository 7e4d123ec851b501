//! Anthropic Claude vision client.

use super::prompt::DIAGNOSIS_TEMPERATURE;
use super::{
    InferenceImage, LlmHttpConfig, VisionProvider, build_http_client, check_status, request_error,
};
use crate::{Error, Result};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

/// Anthropic Messages API client with image input.
pub struct AnthropicClient {
    /// API key.
    api_key: Option<SecretString>,
    /// API endpoint.
    endpoint: String,
    /// Model to use.
    model: String,
    /// Completion token limit.
    max_tokens: u32,
    /// HTTP client.
    client: reqwest::blocking::Client,
}

impl AnthropicClient {
    /// Default API endpoint.
    pub const DEFAULT_ENDPOINT: &'static str = "https://api.anthropic.com/v1";

    /// Default model.
    pub const DEFAULT_MODEL: &'static str = "claude-3-haiku-20240307";

    /// API version header value.
    const API_VERSION: &'static str = "2023-06-01";

    /// Creates a client, reading the key from `ANTHROPIC_API_KEY`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            api_key: std::env::var("ANTHROPIC_API_KEY").ok().map(SecretString::from),
            endpoint: Self::DEFAULT_ENDPOINT.to_string(),
            model: Self::DEFAULT_MODEL.to_string(),
            max_tokens: 1024,
            client: build_http_client(LlmHttpConfig::from_env()),
        }
    }

    /// Sets the API key.
    #[must_use]
    pub fn with_api_key(mut self, key: SecretString) -> Self {
        self.api_key = Some(key);
        self
    }

    /// Sets the API endpoint.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into().trim_end_matches('/').to_string();
        self
    }

    /// Sets the model.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Sets the completion token limit.
    #[must_use]
    pub const fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Sets HTTP client timeouts.
    #[must_use]
    pub fn with_http_config(mut self, config: LlmHttpConfig) -> Self {
        self.client = build_http_client(config);
        self
    }

    /// Validates that a plausibly formed key is configured.
    fn validate(&self) -> Result<&SecretString> {
        let key = self.api_key.as_ref().ok_or_else(|| Error::InferenceRunFailed {
            operation: "anthropic_request".to_string(),
            cause: "ANTHROPIC_API_KEY not set".to_string(),
        })?;

        if !Self::is_valid_api_key_format(key.expose_secret()) {
            return Err(Error::InferenceRunFailed {
                operation: "anthropic_request".to_string(),
                cause: "Invalid API key format: expected 'sk-ant-' prefix".to_string(),
            });
        }
        Ok(key)
    }

    /// Keys start with `sk-ant-`, are at least 40 characters, and contain
    /// only alphanumerics, hyphens, and underscores.
    fn is_valid_api_key_format(key: &str) -> bool {
        const MIN_KEY_LENGTH: usize = 40;
        const PREFIX: &str = "sk-ant-";

        key.starts_with(PREFIX)
            && key.len() >= MIN_KEY_LENGTH
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    }

    fn build_request(&self, system: &str, user: &str, image: &InferenceImage) -> MessagesRequest {
        MessagesRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            temperature: DIAGNOSIS_TEMPERATURE,
            system: system.to_string(),
            messages: vec![Message {
                role: "user",
                content: vec![
                    ContentBlock::Image {
                        source: ImageSource {
                            source_type: "base64",
                            media_type: InferenceImage::MEDIA_TYPE,
                            data: image.base64().to_string(),
                        },
                    },
                    ContentBlock::Text {
                        text: user.to_string(),
                    },
                ],
            }],
        }
    }
}

impl Default for AnthropicClient {
    fn default() -> Self {
        Self::new()
    }
}

impl VisionProvider for AnthropicClient {
    fn name(&self) -> &'static str {
        "anthropic"
    }

    fn complete_with_image(
        &self,
        system: &str,
        user: &str,
        image: &InferenceImage,
    ) -> Result<String> {
        let api_key = self.validate()?;
        tracing::debug!(provider = "anthropic", model = %self.model, "Making inference request");

        let response = self
            .client
            .post(format!("{}/messages", self.endpoint))
            .header("x-api-key", api_key.expose_secret())
            .header("anthropic-version", Self::API_VERSION)
            .json(&self.build_request(system, user, image))
            .send()
            .map_err(|e| request_error("anthropic", &self.model, &e))?;

        let response: MessagesResponse = check_status("anthropic", response)?
            .json()
            .map_err(|e| Error::InferenceRunFailed {
                operation: "anthropic_response".to_string(),
                cause: e.to_string(),
            })?;

        response
            .content
            .into_iter()
            .find(|block| block.block_type == "text")
            .and_then(|block| block.text)
            .ok_or_else(|| Error::InferenceRunFailed {
                operation: "anthropic_response".to_string(),
                cause: "No text content in response".to_string(),
            })
    }
}

#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    temperature: f32,
    system: String,
    messages: Vec<Message>,
}

#[derive(Debug, Serialize)]
struct Message {
    role: &'static str,
    content: Vec<ContentBlock>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Image { source: ImageSource },
    Text { text: String },
}

#[derive(Debug, Serialize)]
struct ImageSource {
    #[serde(rename = "type")]
    source_type: &'static str,
    media_type: &'static str,
    data: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ResponseBlock>,
}

#[derive(Debug, Deserialize)]
struct ResponseBlock {
    #[serde(rename = "type")]
    block_type: String,
    text: Option<String>,
}
