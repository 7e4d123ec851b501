//! Configuration management.
//!
//! Settings come from three layers, later layers winning:
//! 1. Built-in defaults
//! 2. A TOML file (`--config`, `PHYTOSCAN_CONFIG_PATH`, or the platform
//!    config dir)
//! 3. `PHYTOSCAN_*` environment variables

mod observability;

pub use observability::{LogFormat, ObservabilitySettings};

use crate::services::consensus::ConsensusConfig;
use crate::services::deduplication::DeduplicationConfig;
use crate::services::pipeline::PipelineConfig;
use crate::services::product_matcher::MatchingConfig;
use crate::{Error, Result};
use secrecy::SecretString;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration for phytoscan.
#[derive(Debug, Clone)]
pub struct PhytoscanConfig {
    /// Path to the data directory.
    pub data_dir: PathBuf,
    /// Explicit database path; defaults to `<data_dir>/phytoscan.db`.
    pub database_path: Option<PathBuf>,
    /// Inference provider configuration.
    pub inference: InferenceConfig,
    /// Consensus fan-out configuration.
    pub consensus: ConsensusConfig,
    /// Duplicate detection configuration.
    pub deduplication: DeduplicationConfig,
    /// Product matching configuration.
    pub matching: MatchingConfig,
    /// Pipeline behavior flags.
    pub pipeline: PipelineConfig,
    /// Logging and metrics settings.
    pub observability: ObservabilitySettings,
}

/// Inference provider configuration.
#[derive(Debug, Clone)]
pub struct InferenceConfig {
    /// Which provider to call.
    pub provider: InferenceProvider,
    /// Model name; the provider default when unset.
    pub model: Option<String>,
    /// API key; falls back to the provider's environment variable.
    pub api_key: Option<SecretString>,
    /// Base URL for the provider (for proxies and self-hosted models).
    pub base_url: Option<String>,
    /// Request timeout in milliseconds (0 to disable).
    pub timeout_ms: u64,
    /// Connect timeout in milliseconds (0 to disable).
    pub connect_timeout_ms: u64,
    /// Completion token limit.
    pub max_tokens: u32,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            provider: InferenceProvider::default(),
            model: None,
            api_key: None,
            base_url: None,
            timeout_ms: 60_000,
            connect_timeout_ms: 5_000,
            max_tokens: 1024,
        }
    }
}

/// Available inference providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InferenceProvider {
    /// `OpenAI` GPT vision models.
    #[default]
    OpenAi,
    /// Anthropic Claude.
    Anthropic,
    /// Ollama (local).
    Ollama,
}

impl InferenceProvider {
    /// Parses a provider string.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for an unknown provider.
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "anthropic" | "claude" => Ok(Self::Anthropic),
            "ollama" => Ok(Self::Ollama),
            other => Err(Error::InvalidInput(format!(
                "unknown inference provider '{other}' (expected openai, anthropic, or ollama)"
            ))),
        }
    }

    /// Returns the provider as a string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::Ollama => "ollama",
        }
    }
}

impl std::fmt::Display for InferenceProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Configuration file structure (for TOML parsing).
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    /// Data directory.
    pub data_dir: Option<String>,
    /// Database path.
    pub database_path: Option<String>,
    /// Inference section.
    pub inference: Option<ConfigFileInference>,
    /// Consensus section.
    pub consensus: Option<ConfigFileConsensus>,
    /// Deduplication section.
    pub deduplication: Option<ConfigFileDeduplication>,
    /// Matching section.
    pub matching: Option<ConfigFileMatching>,
    /// Pipeline section.
    pub pipeline: Option<ConfigFilePipeline>,
    /// Observability section.
    pub observability: Option<ConfigFileObservability>,
}

/// Inference section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileInference {
    /// Provider name.
    pub provider: Option<String>,
    /// Model name.
    pub model: Option<String>,
    /// API key, literal or `${ENV_VAR}` reference.
    pub api_key: Option<String>,
    /// Base URL.
    pub base_url: Option<String>,
    /// Request timeout.
    pub timeout_ms: Option<u64>,
    /// Connect timeout.
    pub connect_timeout_ms: Option<u64>,
    /// Completion token limit.
    pub max_tokens: Option<u32>,
}

/// Consensus section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileConsensus {
    /// Number of inference runs.
    pub runs: Option<usize>,
    /// Shared deadline for the whole batch.
    pub run_timeout_ms: Option<u64>,
}

/// Deduplication section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileDeduplication {
    /// Enable duplicate detection.
    pub enabled: Option<bool>,
    /// Near-duplicate threshold.
    pub near_threshold: Option<f64>,
    /// Candidate window size.
    pub candidate_window: Option<usize>,
}

/// Matching section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileMatching {
    /// Maximum recommendations per scan.
    pub recommendation_limit: Option<usize>,
    /// Maximum alternative conditions suggested.
    pub alternatives_limit: Option<usize>,
}

/// Pipeline section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFilePipeline {
    /// Smallest accepted upload.
    pub min_image_bytes: Option<usize>,
    /// Fresh recommendations for near duplicates.
    pub near_duplicate_recommendations: Option<bool>,
    /// Suggest alternatives when nothing matches.
    pub suggest_alternatives: Option<bool>,
}

/// Observability section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileObservability {
    /// `json` or `pretty`.
    pub log_format: Option<String>,
    /// Filter directive, e.g. `info` or `phytoscan=debug`.
    pub log_level: Option<String>,
    /// Append logs to this file instead of stderr.
    pub log_file: Option<String>,
    /// Install the Prometheus recorder.
    pub metrics_enabled: Option<bool>,
    /// Prometheus listener port.
    pub metrics_port: Option<u16>,
}

impl Default for PhytoscanConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".phytoscan"),
            database_path: None,
            inference: InferenceConfig::default(),
            consensus: ConsensusConfig::default(),
            deduplication: DeduplicationConfig::default(),
            matching: MatchingConfig::default(),
            pipeline: PipelineConfig::default(),
            observability: ObservabilitySettings::default(),
        }
    }
}

impl PhytoscanConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves configuration for a process.
    ///
    /// Uses `explicit` if given, then `PHYTOSCAN_CONFIG_PATH`, then the
    /// platform config file, then defaults. Environment overrides are
    /// applied last.
    ///
    /// # Errors
    ///
    /// Returns an error if an explicitly named file cannot be read or
    /// parsed. A broken file at the platform default location is also an
    /// error, since silently ignoring it would hide typos.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = explicit
            .map(Path::to_path_buf)
            .or_else(|| std::env::var("PHYTOSCAN_CONFIG_PATH").ok().map(PathBuf::from))
            .or_else(|| Self::default_path().filter(|p| p.exists()));

        let config = match path {
            Some(path) => {
                tracing::debug!(path = %path.display(), "Loading configuration file");
                Self::load_from_file(&path)?
            },
            None => Self::default(),
        };
        Ok(config.with_env_overrides())
    }

    /// Platform config file location (`<config_dir>/phytoscan/config.toml`).
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        let base_dirs = directories::BaseDirs::new()?;
        Some(base_dirs.config_dir().join("phytoscan").join("config.toml"))
    }

    /// Loads configuration from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::OperationFailed {
            operation: "read_config_file".to_string(),
            cause: format!("{}: {e}", path.display()),
        })?;
        Self::parse_toml(&contents)
    }

    /// Parses configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid configuration.
    pub fn parse_toml(contents: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(contents).map_err(|e| Error::OperationFailed {
            operation: "parse_config_file".to_string(),
            cause: e.to_string(),
        })?;
        Self::from_config_file(file)
    }

    /// Converts a `ConfigFile` to `PhytoscanConfig`.
    fn from_config_file(file: ConfigFile) -> Result<Self> {
        let mut config = Self::default();

        if let Some(data_dir) = file.data_dir {
            config.data_dir = PathBuf::from(data_dir);
        }
        config.database_path = file.database_path.map(PathBuf::from);

        if let Some(inference) = file.inference {
            if let Some(provider) = inference.provider {
                config.inference.provider = InferenceProvider::parse(&provider)?;
            }
            config.inference.model = inference.model;
            config.inference.api_key = inference
                .api_key
                .and_then(|key| expand_env_reference(&key))
                .map(SecretString::from);
            config.inference.base_url = inference.base_url;
            if let Some(v) = inference.timeout_ms {
                config.inference.timeout_ms = v;
            }
            if let Some(v) = inference.connect_timeout_ms {
                config.inference.connect_timeout_ms = v;
            }
            if let Some(v) = inference.max_tokens {
                config.inference.max_tokens = v;
            }
        }

        if let Some(consensus) = file.consensus {
            if let Some(runs) = consensus.runs {
                config.consensus = config.consensus.with_runs(runs);
            }
            if let Some(ms) = consensus.run_timeout_ms {
                config.consensus = config.consensus.with_run_timeout(Duration::from_millis(ms));
            }
        }

        if let Some(dedup) = file.deduplication {
            if let Some(v) = dedup.enabled {
                config.deduplication.enabled = v;
            }
            if let Some(v) = dedup.near_threshold {
                if !(0.0..=1.0).contains(&v) {
                    return Err(Error::InvalidInput(format!(
                        "deduplication.near_threshold must be within [0, 1], got {v}"
                    )));
                }
                config.deduplication.near_threshold = v;
            }
            if let Some(v) = dedup.candidate_window {
                config.deduplication.candidate_window = v;
            }
        }

        if let Some(matching) = file.matching {
            if let Some(v) = matching.recommendation_limit {
                config.matching.recommendation_limit = v;
            }
            if let Some(v) = matching.alternatives_limit {
                config.matching.alternatives_limit = v;
            }
        }

        if let Some(pipeline) = file.pipeline {
            if let Some(v) = pipeline.min_image_bytes {
                config.pipeline.min_image_bytes = v;
            }
            if let Some(v) = pipeline.near_duplicate_recommendations {
                config.pipeline.near_duplicate_recommendations = v;
            }
            if let Some(v) = pipeline.suggest_alternatives {
                config.pipeline.suggest_alternatives = v;
            }
        }

        if let Some(obs) = file.observability {
            config.observability = ObservabilitySettings::from_config_file(obs)?;
        }

        Ok(config)
    }

    /// Applies `PHYTOSCAN_*` environment variable overrides.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        self.consensus = self.consensus.with_env_overrides();
        self.deduplication = self.deduplication.with_env_overrides();
        self.matching = self.matching.with_env_overrides();
        self.pipeline = self.pipeline.with_env_overrides();
        self.observability = self.observability.with_env_overrides();

        let http = crate::llm::LlmHttpConfig::from_config(&self.inference).with_env_overrides();
        self.inference.timeout_ms = http.timeout_ms;
        self.inference.connect_timeout_ms = http.connect_timeout_ms;
        if let Ok(provider) = std::env::var("PHYTOSCAN_INFERENCE_PROVIDER") {
            match InferenceProvider::parse(&provider) {
                Ok(provider) => self.inference.provider = provider,
                Err(e) => tracing::warn!(error = %e, "Ignoring PHYTOSCAN_INFERENCE_PROVIDER"),
            }
        }
        self
    }

    /// Sets the data directory.
    #[must_use]
    pub fn with_data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.data_dir = path.into();
        self
    }

    /// The `SQLite` database location.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| self.data_dir.join("phytoscan.db"))
    }
}

/// Resolves `${VAR}` to the variable's value; other strings pass through.
///
/// An unset variable yields `None` so the provider's own fallback applies.
fn expand_env_reference(value: &str) -> Option<String> {
    let trimmed = value.trim();
    match trimmed
        .strip_prefix("${")
        .and_then(|rest| rest.strip_suffix('}'))
    {
        Some(var) => std::env::var(var).ok().filter(|v| !v.is_empty()),
        None if trimmed.is_empty() => None,
        None => Some(trimmed.to_string()),
    }
}
