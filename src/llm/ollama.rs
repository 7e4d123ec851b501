//! Ollama (local) vision client.

use super::prompt::DIAGNOSIS_TEMPERATURE;
use super::{
    InferenceImage, LlmHttpConfig, VisionProvider, build_http_client, check_status, request_error,
};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Ollama chat client for locally served vision models.
pub struct OllamaClient {
    /// API endpoint.
    endpoint: String,
    /// Model to use.
    model: String,
    /// Completion token limit.
    max_tokens: u32,
    /// HTTP client.
    client: reqwest::blocking::Client,
}

impl OllamaClient {
    /// Default API endpoint.
    pub const DEFAULT_ENDPOINT: &'static str = "http://localhost:11434";

    /// Default model.
    pub const DEFAULT_MODEL: &'static str = "llava";

    /// Creates a client, reading the endpoint from `OLLAMA_HOST`.
    #[must_use]
    pub fn new() -> Self {
        let endpoint = std::env::var("OLLAMA_HOST")
            .unwrap_or_else(|_| Self::DEFAULT_ENDPOINT.to_string())
            .trim_end_matches('/')
            .to_string();

        Self {
            endpoint,
            model: Self::DEFAULT_MODEL.to_string(),
            max_tokens: 1024,
            client: build_http_client(LlmHttpConfig::from_env()),
        }
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

    fn build_request(&self, system: &str, user: &str, image: &InferenceImage) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system.to_string(),
                    images: None,
                },
                ChatMessage {
                    role: "user",
                    content: user.to_string(),
                    images: Some(vec![image.base64().to_string()]),
                },
            ],
            stream: false,
            format: "json",
            options: ChatOptions {
                temperature: DIAGNOSIS_TEMPERATURE,
                num_predict: self.max_tokens,
            },
        }
    }
}

impl Default for OllamaClient {
    fn default() -> Self {
        Self::new()
    }
}

impl VisionProvider for OllamaClient {
    fn name(&self) -> &'static str {
        "ollama"
    }

    fn complete_with_image(
        &self,
        system: &str,
        user: &str,
        image: &InferenceImage,
    ) -> Result<String> {
        tracing::debug!(provider = "ollama", model = %self.model, "Making inference request");

        let response = self
            .client
            .post(format!("{}/api/chat", self.endpoint))
            .json(&self.build_request(system, user, image))
            .send()
            .map_err(|e| request_error("ollama", &self.model, &e))?;

        let response: ChatResponse =
            check_status("ollama", response)?
                .json()
                .map_err(|e| Error::InferenceRunFailed {
                    operation: "ollama_response".to_string(),
                    cause: e.to_string(),
                })?;

        if response.message.content.trim().is_empty() {
            return Err(Error::InferenceRunFailed {
                operation: "ollama_response".to_string(),
                cause: "Empty response content".to_string(),
            });
        }
        Ok(response.message.content)
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
    format: &'static str,
    options: ChatOptions,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    images: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
struct ChatOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: String,
}
