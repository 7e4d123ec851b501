//! # Phytoscan
//!
//! Plant disease image analysis with duplicate suppression, consensus
//! diagnosis, and catalog remedy matching.
//!
//! An uploaded leaf photo is fingerprinted, checked against previously
//! analyzed scans, diagnosed by several independent calls to a
//! vision-language model whose answers are reconciled by majority vote, and
//! finally matched against a product catalog to produce ranked
//! recommendations.
//!
//! ## Features
//!
//! - Exact (SHA-256) and near-duplicate (64-bit perceptual hash) detection
//! - Concurrent consensus over N inference runs with per-run timeouts
//! - Keyword-scored product matching with alternative suggestions
//! - Pluggable stores (`SQLite`, in-memory) and inference providers
//!   (`OpenAI`, Anthropic, Ollama)
//!
//! ## Example
//!
//! ```rust,ignore
//! use phytoscan::{AnalysisPipeline, OwnerId};
//!
//! let pipeline = AnalysisPipeline::new(store, catalog, provider, config);
//! let outcome = pipeline.submit(&image_bytes, &OwnerId::new("user-42"))?;
//! println!("{} ({:.0}%)", outcome.diagnosis.condition_name, outcome.diagnosis.consensus_confidence * 100.0);
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
#![allow(clippy::multiple_crate_versions)]

use thiserror::Error as ThisError;

// Module declarations
pub mod cli;
pub mod config;
pub mod llm;
pub mod models;
pub mod observability;
pub mod services;
pub mod storage;

// Re-exports for convenience
pub use config::PhytoscanConfig;
pub use llm::{InferenceImage, VisionProvider};
pub use models::{
    AlternativeCondition, CatalogEntry, DiagnosisCandidate, DiagnosisResult, Fingerprint,
    ImageHash, OwnerId, ProductId, Recommendation, ScanId, ScanRecord,
};
pub use services::{
    AnalysisPipeline, ConsensusAnalyzer, DuplicateDetector, ImageHasher, ProductMatcher,
    SubmitOutcome, lookup_scan,
};
pub use storage::{CatalogReader, InMemoryStore, ScanStore, SqliteStore};

/// Error type for phytoscan operations.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When | Reaches `submit` callers |
/// |---------|-------------|--------------------------|
/// | `InvalidImage` | Upload is empty, too small, or cannot be decoded | yes |
/// | `StorageUnavailable` | Duplicate check or persistence cannot reach the store | yes |
/// | `InferenceRunFailed` | One inference call fails, times out, or returns unparseable output | no, excluded from the vote |
/// | `AllRunsFailed` | Every inference run failed | yes |
/// | `MatchingFailed` | Recommendations could not be computed or written | no, recommendations are empty |
/// | `InvalidInput` | Bad CLI arguments, configuration values, or catalog rows | CLI only |
/// | `OperationFailed` | Config file I/O, observability init, runtime join failures | CLI only |
#[derive(Debug, ThisError)]
pub enum Error {
    /// The uploaded bytes are not a usable image.
    #[error("invalid image: {0}")]
    InvalidImage(String),

    /// The store could not be read or written.
    ///
    /// Raised when:
    /// - The exact-hash lookup or candidate window fetch fails
    /// - A scan, diagnosis, or recommendation write fails
    /// - The `SQLite` database cannot be opened or migrated
    #[error("storage unavailable during '{operation}': {cause}")]
    StorageUnavailable {
        /// The storage operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },

    /// A single inference run failed.
    ///
    /// Recovered locally by the consensus analyzer; never surfaced by
    /// `AnalysisPipeline::submit`.
    #[error("inference '{operation}' failed: {cause}")]
    InferenceRunFailed {
        /// The inference step that failed (request, response, parse).
        operation: String,
        /// The underlying cause.
        cause: String,
    },

    /// Every inference run of a consensus batch failed.
    #[error("all {attempted} inference runs failed; last error: {cause}")]
    AllRunsFailed {
        /// Number of runs that were issued.
        attempted: usize,
        /// The last recorded run failure.
        cause: String,
    },

    /// Product matching or recommendation persistence failed.
    #[error("product matching failed: {0}")]
    MatchingFailed(String),

    /// Invalid input was provided.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// An ambient operation failed.
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },
}

impl Error {
    /// Returns true if this error may be returned from a pipeline submission.
    ///
    /// Per-run inference failures and matching failures are absorbed inside
    /// the pipeline and never reach callers.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Self::InferenceRunFailed { .. } | Self::MatchingFailed(_)
        )
    }

    /// Builds a `StorageUnavailable` error from any displayable cause.
    pub fn storage(operation: &str, cause: impl std::fmt::Display) -> Self {
        Self::StorageUnavailable {
            operation: operation.to_string(),
            cause: cause.to_string(),
        }
    }
}

/// Result type alias for phytoscan operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Returns the current Unix timestamp in seconds.
///
/// Falls back to 0 if the system clock is before the Unix epoch.
///
/// # Examples
///
/// ```rust
/// use phytoscan::current_timestamp;
///
/// let ts = current_timestamp();
/// assert!(ts > 0);
/// ```
#[must_use]
pub fn current_timestamp() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::InvalidImage("not a png".to_string());
        assert_eq!(err.to_string(), "invalid image: not a png");

        let err = Error::storage("insert_scan", "disk I/O error");
        assert_eq!(
            err.to_string(),
            "storage unavailable during 'insert_scan': disk I/O error"
        );

        let err = Error::AllRunsFailed {
            attempted: 3,
            cause: "timeout".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "all 3 inference runs failed; last error: timeout"
        );
    }

    #[test]
    fn test_fatal_classification() {
        assert!(Error::InvalidImage(String::new()).is_fatal());
        assert!(Error::storage("x", "y").is_fatal());
        assert!(
            Error::AllRunsFailed {
                attempted: 1,
                cause: String::new()
            }
            .is_fatal()
        );
        assert!(
            !Error::InferenceRunFailed {
                operation: "openai_request".to_string(),
                cause: "429".to_string()
            }
            .is_fatal()
        );
        assert!(!Error::MatchingFailed("catalog offline".to_string()).is_fatal());
    }
}
