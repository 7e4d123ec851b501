//! Duplicate detection result types.

use crate::models::{DiagnosisResult, ScanRecord};
use serde::{Deserialize, Serialize};
use std::fmt;

/// How an upload matched an earlier scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateKind {
    /// Byte-identical content.
    Exact,
    /// Perceptual similarity above the threshold.
    Near,
}

impl DuplicateKind {
    /// Returns the kind as a metrics label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::Near => "near",
        }
    }
}

impl fmt::Display for DuplicateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result of a duplicate check.
///
/// When `is_duplicate` is true, `kind`, `original`, and `diagnosis` are all
/// set. `original` is the scan that owns `diagnosis`, never another
/// duplicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateVerdict {
    /// Whether the upload duplicates an earlier scan.
    pub is_duplicate: bool,
    /// Match kind.
    pub kind: Option<DuplicateKind>,
    /// The scan owning the reused diagnosis.
    pub original: Option<ScanRecord>,
    /// The reused diagnosis.
    pub diagnosis: Option<DiagnosisResult>,
    /// Perceptual similarity of the match (1.0 for exact matches).
    pub similarity: Option<f64>,
    /// Duration of the check in milliseconds.
    pub check_duration_ms: u64,
}

impl DuplicateVerdict {
    /// No duplicate was found.
    #[must_use]
    pub const fn unique(duration_ms: u64) -> Self {
        Self {
            is_duplicate: false,
            kind: None,
            original: None,
            diagnosis: None,
            similarity: None,
            check_duration_ms: duration_ms,
        }
    }

    /// Byte-identical match.
    #[must_use]
    pub const fn exact(original: ScanRecord, diagnosis: DiagnosisResult, duration_ms: u64) -> Self {
        Self {
            is_duplicate: true,
            kind: Some(DuplicateKind::Exact),
            original: Some(original),
            diagnosis: Some(diagnosis),
            similarity: Some(1.0),
            check_duration_ms: duration_ms,
        }
    }

    /// Perceptual match.
    #[must_use]
    pub const fn near(
        original: ScanRecord,
        diagnosis: DiagnosisResult,
        similarity: f64,
        duration_ms: u64,
    ) -> Self {
        Self {
            is_duplicate: true,
            kind: Some(DuplicateKind::Near),
            original: Some(original),
            diagnosis: Some(diagnosis),
            similarity: Some(similarity),
            check_duration_ms: duration_ms,
        }
    }
}

impl Default for DuplicateVerdict {
    fn default() -> Self {
        Self::unique(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_has_no_match() {
        let verdict = DuplicateVerdict::default();
        assert!(!verdict.is_duplicate);
        assert!(verdict.kind.is_none());
        assert!(verdict.original.is_none());
    }

    #[test]
    fn test_kind_labels() {
        assert_eq!(DuplicateKind::Exact.to_string(), "exact");
        assert_eq!(
            serde_json::to_string(&DuplicateKind::Near).unwrap(),
            "\"near\""
        );
    }
}
