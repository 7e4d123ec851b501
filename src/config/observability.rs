//! Logging and metrics settings.

use super::ConfigFileObservability;
use crate::{Error, Result};
use std::path::PathBuf;

/// Default Prometheus listener port.
pub const DEFAULT_METRICS_PORT: u16 = 9090;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per line.
    Json,
    /// Human-readable output.
    Pretty,
}

impl LogFormat {
    /// Parses a format name.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "json" => Some(Self::Json),
            "pretty" | "text" => Some(Self::Pretty),
            _ => None,
        }
    }
}

/// Observability settings resolved from file and environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservabilitySettings {
    /// Output format; chosen from the terminal when unset.
    pub log_format: Option<LogFormat>,
    /// Filter directive.
    pub log_level: Option<String>,
    /// Log file path.
    pub log_file: Option<PathBuf>,
    /// Install the Prometheus recorder.
    pub metrics_enabled: bool,
    /// Prometheus listener port.
    pub metrics_port: u16,
}

impl Default for ObservabilitySettings {
    fn default() -> Self {
        Self {
            log_format: None,
            log_level: None,
            log_file: None,
            metrics_enabled: false,
            metrics_port: DEFAULT_METRICS_PORT,
        }
    }
}

impl ObservabilitySettings {
    pub(super) fn from_config_file(file: ConfigFileObservability) -> Result<Self> {
        let log_format = match file.log_format {
            Some(raw) => Some(LogFormat::parse(&raw).ok_or_else(|| {
                Error::InvalidInput(format!(
                    "observability.log_format must be 'json' or 'pretty', got '{raw}'"
                ))
            })?),
            None => None,
        };

        Ok(Self {
            log_format,
            log_level: file.log_level,
            log_file: file.log_file.map(PathBuf::from),
            metrics_enabled: file.metrics_enabled.unwrap_or(false),
            metrics_port: file.metrics_port.unwrap_or(DEFAULT_METRICS_PORT),
        })
    }

    /// Applies environment variable overrides.
    ///
    /// `PHYTOSCAN_LOG` wins over `RUST_LOG` for the filter.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(level) = std::env::var("PHYTOSCAN_LOG")
            .or_else(|_| std::env::var("RUST_LOG"))
            .ok()
            .filter(|v| !v.trim().is_empty())
        {
            self.log_level = Some(level);
        }
        if let Some(format) = std::env::var("PHYTOSCAN_LOG_FORMAT")
            .ok()
            .and_then(|v| LogFormat::parse(&v))
        {
            self.log_format = Some(format);
        }
        if let Ok(path) = std::env::var("PHYTOSCAN_LOG_FILE") {
            self.log_file = Some(PathBuf::from(path));
        }
        if let Ok(v) = std::env::var("PHYTOSCAN_METRICS_ENABLED") {
            self.metrics_enabled = matches!(v.to_lowercase().as_str(), "true" | "1" | "yes");
        }
        if let Some(port) = std::env::var("PHYTOSCAN_METRICS_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            self.metrics_port = port;
        }
        self
    }
}
