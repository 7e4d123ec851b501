//! Duplicate detection configuration.

/// Default near-duplicate similarity threshold (exclusive).
pub const DEFAULT_NEAR_THRESHOLD: f64 = 0.85;

/// Default number of recent scans compared for near duplicates.
pub const DEFAULT_CANDIDATE_WINDOW: usize = 100;

/// Configuration for the duplicate detector.
///
/// # Environment Variables
///
/// | Variable | Type | Default | Description |
/// |----------|------|---------|-------------|
/// | `PHYTOSCAN_DEDUP_ENABLED` | bool | `true` | Enable duplicate detection |
/// | `PHYTOSCAN_DEDUP_THRESHOLD` | f64 | `0.85` | Near-duplicate similarity threshold (exclusive) |
/// | `PHYTOSCAN_DEDUP_WINDOW` | usize | `100` | Recent scans compared for near duplicates |
///
/// # Example
///
/// ```rust
/// use phytoscan::services::deduplication::DeduplicationConfig;
///
/// let config = DeduplicationConfig::default();
/// assert!(config.enabled);
/// assert_eq!(config.near_threshold, 0.85);
/// assert_eq!(config.candidate_window, 100);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct DeduplicationConfig {
    /// Enable/disable duplicate detection.
    pub enabled: bool,
    /// A candidate is a near duplicate only if its similarity is strictly
    /// greater than this.
    pub near_threshold: f64,
    /// Number of most recent scans compared for near duplicates.
    pub candidate_window: usize,
}

impl DeduplicationConfig {
    /// Creates a configuration from environment variables.
    ///
    /// Falls back to defaults for any unset or unparseable variable.
    #[must_use]
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Applies environment variable overrides on top of `self`.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(v) = std::env::var("PHYTOSCAN_DEDUP_ENABLED") {
            self.enabled = v.to_lowercase() != "false" && v != "0";
        }
        if let Some(threshold) = std::env::var("PHYTOSCAN_DEDUP_THRESHOLD")
            .ok()
            .and_then(|v| v.parse::<f64>().ok())
            .filter(|t| (0.0..=1.0).contains(t))
        {
            self.near_threshold = threshold;
        }
        if let Some(window) = std::env::var("PHYTOSCAN_DEDUP_WINDOW")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            self.candidate_window = window;
        }
        self
    }

    /// Builder method to set enabled state.
    #[must_use]
    pub const fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Builder method to set the near-duplicate threshold.
    #[must_use]
    pub const fn with_near_threshold(mut self, threshold: f64) -> Self {
        self.near_threshold = threshold;
        self
    }

    /// Builder method to set the candidate window size.
    #[must_use]
    pub const fn with_candidate_window(mut self, window: usize) -> Self {
        self.candidate_window = window;
        self
    }
}

impl Default for DeduplicationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            near_threshold: DEFAULT_NEAR_THRESHOLD,
            candidate_window: DEFAULT_CANDIDATE_WINDOW,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builders() {
        let config = DeduplicationConfig::default()
            .with_enabled(false)
            .with_near_threshold(0.9)
            .with_candidate_window(10);
        assert!(!config.enabled);
        assert!((config.near_threshold - 0.9).abs() < f64::EPSILON);
        assert_eq!(config.candidate_window, 10);
    }
}
