//! Inference client factory for CLI commands.
//!
//! Builds the configured [`VisionProvider`] from [`InferenceConfig`].

use std::sync::Arc;

use crate::config::{InferenceConfig, InferenceProvider};
use crate::llm::{AnthropicClient, LlmHttpConfig, OllamaClient, OpenAiClient, VisionProvider};

/// Builds HTTP configuration from inference config with environment overrides.
#[must_use]
pub fn build_http_config(config: &InferenceConfig) -> LlmHttpConfig {
    LlmHttpConfig::from_config(config).with_env_overrides()
}

/// Builds an `OpenAI` client from configuration.
#[must_use]
pub fn build_openai_client(config: &InferenceConfig) -> OpenAiClient {
    let mut client = OpenAiClient::new().with_max_tokens(config.max_tokens);
    if let Some(ref api_key) = config.api_key {
        client = client.with_api_key(api_key.clone());
    }
    if let Some(ref model) = config.model {
        client = client.with_model(model);
    }
    if let Some(ref base_url) = config.base_url {
        client = client.with_endpoint(base_url);
    }
    client.with_http_config(build_http_config(config))
}

/// Builds an Anthropic client from configuration.
#[must_use]
pub fn build_anthropic_client(config: &InferenceConfig) -> AnthropicClient {
    let mut client = AnthropicClient::new().with_max_tokens(config.max_tokens);
    if let Some(ref api_key) = config.api_key {
        client = client.with_api_key(api_key.clone());
    }
    if let Some(ref model) = config.model {
        client = client.with_model(model);
    }
    if let Some(ref base_url) = config.base_url {
        client = client.with_endpoint(base_url);
    }
    client.with_http_config(build_http_config(config))
}

/// Builds an Ollama client from configuration.
#[must_use]
pub fn build_ollama_client(config: &InferenceConfig) -> OllamaClient {
    let mut client = OllamaClient::new().with_max_tokens(config.max_tokens);
    if let Some(ref model) = config.model {
        client = client.with_model(model);
    }
    if let Some(ref base_url) = config.base_url {
        client = client.with_endpoint(base_url);
    }
    client.with_http_config(build_http_config(config))
}

/// Builds the configured vision provider.
///
/// Construction never contacts the provider; missing credentials surface on
/// the first inference call.
#[must_use]
pub fn build_vision_provider(config: &InferenceConfig) -> Arc<dyn VisionProvider> {
    match config.provider {
        InferenceProvider::OpenAi => Arc::new(build_openai_client(config)),
        InferenceProvider::Anthropic => Arc::new(build_anthropic_client(config)),
        InferenceProvider::Ollama => Arc::new(build_ollama_client(config)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(InferenceProvider::OpenAi, "openai")]
    #[test_case(InferenceProvider::Anthropic, "anthropic")]
    #[test_case(InferenceProvider::Ollama, "ollama")]
    fn test_build_vision_provider_selects_client(provider: InferenceProvider, expected: &str) {
        let config = InferenceConfig {
            provider,
            ..InferenceConfig::default()
        };
        assert_eq!(build_vision_provider(&config).name(), expected);
    }

    #[test]
    fn test_http_config_follows_inference_timeouts() {
        let config = InferenceConfig {
            timeout_ms: 1_234,
            connect_timeout_ms: 567,
            ..InferenceConfig::default()
        };
        let http = LlmHttpConfig::from_config(&config);
        assert_eq!(http.timeout_ms, 1_234);
        assert_eq!(http.connect_timeout_ms, 567);
    }
}
