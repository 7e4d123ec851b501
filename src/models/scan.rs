//! Scan records.

use super::Fingerprint;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a scan.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ScanId(String);

impl ScanId {
    /// Creates a scan ID from an existing string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a new time-ordered scan ID (UUID v7).
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// Returns the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ScanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ScanId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ScanId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Reference to the user who uploaded a scan.
///
/// Identity and authorization live outside this crate; the owner is an
/// opaque reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OwnerId(String);

impl OwnerId {
    /// Creates an owner reference.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the owner reference as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One uploaded image.
///
/// Created once per upload. `is_duplicate` and `original_scan` are fixed at
/// creation time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanRecord {
    /// Unique identifier.
    pub id: ScanId,
    /// Uploading user.
    pub owner: OwnerId,
    /// Content fingerprint.
    pub fingerprint: Fingerprint,
    /// Whether this scan reused an earlier scan's diagnosis.
    pub is_duplicate: bool,
    /// The scan whose diagnosis this duplicate refers to.
    pub original_scan: Option<ScanId>,
    /// Creation time (Unix epoch seconds).
    pub created_at: u64,
}

impl ScanRecord {
    /// Creates a record for a freshly diagnosed upload.
    #[must_use]
    pub fn fresh(owner: OwnerId, fingerprint: Fingerprint) -> Self {
        Self {
            id: ScanId::generate(),
            owner,
            fingerprint,
            is_duplicate: false,
            original_scan: None,
            created_at: crate::current_timestamp(),
        }
    }

    /// Creates a record for an upload that duplicates `original`.
    #[must_use]
    pub fn duplicate_of(owner: OwnerId, fingerprint: Fingerprint, original: ScanId) -> Self {
        Self {
            is_duplicate: true,
            original_scan: Some(original),
            ..Self::fresh(owner, fingerprint)
        }
    }

    /// The scan that owns this record's diagnosis.
    ///
    /// Duplicates point at their original; everything else owns its own.
    #[must_use]
    pub fn diagnosis_scan_id(&self) -> &ScanId {
        self.original_scan.as_ref().unwrap_or(&self.id)
    }
}
