//! Vision inference client abstraction.
//!
//! Provides a unified interface over vision-language model providers. Each
//! provider sends one image plus the diagnosis prompt and returns the raw
//! text reply; parsing into a typed [`DiagnosisCandidate`] happens once, at
//! [`VisionProvider::diagnose`].

mod anthropic;
mod ollama;
mod openai;
pub mod prompt;

pub use anthropic::AnthropicClient;
pub use ollama::OllamaClient;
pub use openai::OpenAiClient;
pub use prompt::{DIAGNOSIS_SYSTEM_PROMPT, DIAGNOSIS_USER_PROMPT};

use crate::models::DiagnosisCandidate;
use crate::{Error, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use image::{DynamicImage, ImageFormat};
use std::io::Cursor;
use std::time::Duration;

/// Trait for vision inference providers.
///
/// Implementations must not share mutable state between calls; the consensus
/// analyzer issues several calls concurrently through one shared handle.
pub trait VisionProvider: Send + Sync {
    /// The provider name.
    fn name(&self) -> &'static str;

    /// Generates a completion for a system prompt, a user prompt, and one
    /// image.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InferenceRunFailed`] if the request fails or the
    /// reply has no text.
    fn complete_with_image(&self, system: &str, user: &str, image: &InferenceImage)
    -> Result<String>;

    /// Runs the diagnosis prompt and parses the reply.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InferenceRunFailed`] if the call fails or the reply is
    /// not a diagnosis object.
    fn diagnose(&self, image: &InferenceImage) -> Result<DiagnosisCandidate> {
        let response = self.complete_with_image(DIAGNOSIS_SYSTEM_PROMPT, DIAGNOSIS_USER_PROMPT, image)?;
        parse_diagnosis(&response)
    }
}

/// An image prepared for inference: JPEG bytes, base64 encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InferenceImage {
    base64: String,
}

impl InferenceImage {
    /// MIME type of the encoded payload.
    pub const MEDIA_TYPE: &'static str = "image/jpeg";

    /// Re-encodes a decoded image as JPEG.
    ///
    /// Alpha is dropped, since JPEG has no alpha channel.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidImage`] if encoding fails.
    pub fn from_image(image: &DynamicImage) -> Result<Self> {
        let rgb = DynamicImage::ImageRgb8(image.to_rgb8());
        let mut buffer = Cursor::new(Vec::new());
        rgb.write_to(&mut buffer, ImageFormat::Jpeg)
            .map_err(|e| Error::InvalidImage(format!("jpeg encoding failed: {e}")))?;
        Ok(Self::from_jpeg_bytes(buffer.get_ref()))
    }

    /// Wraps bytes that are already JPEG encoded.
    #[must_use]
    pub fn from_jpeg_bytes(bytes: &[u8]) -> Self {
        Self {
            base64: BASE64.encode(bytes),
        }
    }

    /// Base64 payload without a data-URL prefix.
    #[must_use]
    pub fn base64(&self) -> &str {
        &self.base64
    }

    /// `data:image/jpeg;base64,...` URL.
    #[must_use]
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", Self::MEDIA_TYPE, self.base64)
    }
}

/// HTTP client configuration for inference providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LlmHttpConfig {
    /// Request timeout in milliseconds (0 to disable).
    pub timeout_ms: u64,
    /// Connect timeout in milliseconds (0 to disable).
    pub connect_timeout_ms: u64,
}

impl Default for LlmHttpConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 60_000,
            connect_timeout_ms: 5_000,
        }
    }
}

impl LlmHttpConfig {
    /// Loads HTTP configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Loads HTTP configuration from config file settings.
    #[must_use]
    pub const fn from_config(config: &crate::config::InferenceConfig) -> Self {
        Self {
            timeout_ms: config.timeout_ms,
            connect_timeout_ms: config.connect_timeout_ms,
        }
    }

    /// Applies environment variable overrides.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(timeout_ms) = env_u64("PHYTOSCAN_LLM_TIMEOUT_MS") {
            self.timeout_ms = timeout_ms;
        }
        if let Some(connect_timeout_ms) = env_u64("PHYTOSCAN_LLM_CONNECT_TIMEOUT_MS") {
            self.connect_timeout_ms = connect_timeout_ms;
        }
        self
    }
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

/// Builds a blocking HTTP client with configured timeouts.
#[must_use]
pub fn build_http_client(config: LlmHttpConfig) -> reqwest::blocking::Client {
    let mut builder = reqwest::blocking::Client::builder();
    if config.timeout_ms > 0 {
        builder = builder.timeout(Duration::from_millis(config.timeout_ms));
    }
    if config.connect_timeout_ms > 0 {
        builder = builder.connect_timeout(Duration::from_millis(config.connect_timeout_ms));
    }

    builder.build().unwrap_or_else(|err| {
        tracing::warn!("Failed to build inference HTTP client: {err}");
        reqwest::blocking::Client::new()
    })
}

/// Maps a transport error to a run failure, logging its kind.
pub(crate) fn request_error(provider: &'static str, model: &str, e: &reqwest::Error) -> Error {
    let error_kind = if e.is_timeout() {
        "timeout"
    } else if e.is_connect() {
        "connect"
    } else if e.is_request() {
        "request"
    } else {
        "unknown"
    };
    tracing::warn!(
        provider,
        model,
        error = %e,
        error_kind,
        "Inference request failed"
    );
    Error::InferenceRunFailed {
        operation: format!("{provider}_request"),
        cause: format!("{error_kind} error: {e}"),
    }
}

/// Turns a non-success HTTP status into a run failure.
pub(crate) fn check_status(
    provider: &'static str,
    response: reqwest::blocking::Response,
) -> Result<reqwest::blocking::Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body = response.text().unwrap_or_default();
    tracing::warn!(provider, status = %status, "Inference API returned error status");
    Err(Error::InferenceRunFailed {
        operation: format!("{provider}_request"),
        cause: format!("API returned status: {status} - {body}"),
    })
}

/// Parses a diagnosis reply, tolerating code fences and surrounding prose.
///
/// # Errors
///
/// Returns [`Error::InferenceRunFailed`] if no diagnosis object can be read.
pub fn parse_diagnosis(response: &str) -> Result<DiagnosisCandidate> {
    DiagnosisCandidate::parse(extract_json_from_response(response))
}

/// Extracts JSON from a model reply, handling markdown code blocks.
#[must_use]
pub fn extract_json_from_response(response: &str) -> &str {
    let trimmed = response.trim();

    // ```json ... ``` blocks
    if let Some(start) = trimmed.find("```json") {
        let json_start = start + 7;
        if let Some(end) = trimmed[json_start..].find("```") {
            return trimmed[json_start..json_start + end].trim();
        }
    }

    // ``` ... ``` blocks without a language marker
    if let Some(start) = trimmed.find("```") {
        let content_start = start + 3;
        let after_marker = &trimmed[content_start..];
        let json_start = after_marker
            .find('{')
            .map_or(content_start, |pos| content_start + pos);
        if let Some(end) = trimmed[json_start..].find("```") {
            return trimmed[json_start..json_start + end].trim();
        }
    }

    // Raw object with prose around it
    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if start < end {
            return &trimmed[start..=end];
        }
    }

    trimmed
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbaImage;

    #[test]
    fn test_extract_json_raw() {
        let response = r#"{"condition_name": "Rust"}"#;
        assert_eq!(extract_json_from_response(response), response);
    }

    #[test]
    fn test_extract_json_markdown() {
        let response = "```json\n{\"condition_name\": \"Rust\"}\n```";
        assert_eq!(
            extract_json_from_response(response),
            "{\"condition_name\": \"Rust\"}"
        );
    }

    #[test]
    fn test_extract_json_unlabeled_fence() {
        let response = "```\n{\"condition_name\": \"Rust\"}\n```";
        assert_eq!(
            extract_json_from_response(response),
            "{\"condition_name\": \"Rust\"}"
        );
    }

    #[test]
    fn test_extract_json_with_prefix() {
        let response = "Here is the diagnosis: {\"condition_name\": \"Rust\"} hope this helps";
        assert_eq!(
            extract_json_from_response(response),
            r#"{"condition_name": "Rust"}"#
        );
    }

    #[test]
    fn test_parse_diagnosis_fenced() {
        let candidate =
            parse_diagnosis("```json\n{\"disease_name\": \"Powdery Mildew\", \"confidence\": 0.8}\n```")
                .unwrap();
        assert_eq!(candidate.condition_name, "Powdery Mildew");
    }

    #[test]
    fn test_parse_diagnosis_rejects_prose() {
        let err = parse_diagnosis("I cannot identify this plant.").unwrap_err();
        assert!(matches!(err, Error::InferenceRunFailed { .. }));
    }

    #[test]
    fn test_inference_image_drops_alpha() {
        let rgba = DynamicImage::ImageRgba8(RgbaImage::new(16, 16));
        let image = InferenceImage::from_image(&rgba).unwrap();
        assert!(image.data_url().starts_with("data:image/jpeg;base64,"));

        let bytes = BASE64.decode(image.base64()).unwrap();
        // JPEG SOI marker
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn test_http_config_from_inference_config() {
        let config = crate::config::InferenceConfig {
            timeout_ms: 1234,
            connect_timeout_ms: 56,
            ..crate::config::InferenceConfig::default()
        };
        let http = LlmHttpConfig::from_config(&config);
        assert_eq!(http.timeout_ms, 1234);
        assert_eq!(http.connect_timeout_ms, 56);
    }
}
