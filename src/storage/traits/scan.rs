//! Scan store trait.

use crate::Result;
use crate::models::{DiagnosisResult, Recommendation, ScanId, ScanRecord};

/// Store for scans, diagnoses, and recommendations.
///
/// The pipeline is the only writer. Implementations must be safe to share
/// across threads; every method takes `&self`.
///
/// All failures are reported as [`crate::Error::StorageUnavailable`].
pub trait ScanStore: Send + Sync {
    /// Finds the oldest scan whose exact (content) hash equals `exact` and
    /// whose diagnosis resolves.
    ///
    /// Scans left without a diagnosis are skipped so they never hide a later
    /// diagnosed upload of the same bytes.
    fn find_scan_by_exact_hash(&self, exact: &str) -> Result<Option<ScanRecord>>;

    /// Returns up to `limit` of the most recent scans with a perceptual hash,
    /// newest first.
    fn recent_scans_with_perceptual_hash(&self, limit: usize) -> Result<Vec<ScanRecord>>;

    /// Persists a new scan.
    fn insert_scan(&self, scan: &ScanRecord) -> Result<()>;

    /// Persists a new scan together with its diagnosis.
    ///
    /// Either both are written or neither is.
    fn insert_scan_with_diagnosis(
        &self,
        scan: &ScanRecord,
        diagnosis: &DiagnosisResult,
    ) -> Result<()>;

    /// Retrieves a scan by ID.
    fn get_scan(&self, id: &ScanId) -> Result<Option<ScanRecord>>;

    /// Attaches a diagnosis to a scan.
    ///
    /// Fails if the scan already has one.
    fn insert_diagnosis(&self, scan_id: &ScanId, diagnosis: &DiagnosisResult) -> Result<()>;

    /// Retrieves the diagnosis attached directly to a scan.
    ///
    /// Does not follow `original_scan`; see [`ScanStore::resolve_diagnosis`].
    fn get_diagnosis(&self, scan_id: &ScanId) -> Result<Option<DiagnosisResult>>;

    /// Replaces a scan's recommendation set atomically.
    ///
    /// Either every recommendation is written or none are.
    fn replace_recommendations(
        &self,
        scan_id: &ScanId,
        recommendations: &[Recommendation],
    ) -> Result<()>;

    /// Returns a scan's recommendations ordered by rank.
    fn get_recommendations(&self, scan_id: &ScanId) -> Result<Vec<Recommendation>>;

    /// Number of stored scans.
    fn scan_count(&self) -> Result<usize>;

    /// Number of stored diagnoses.
    fn diagnosis_count(&self) -> Result<usize>;

    /// Retrieves the diagnosis that applies to `scan`, following
    /// `original_scan` for duplicates.
    fn resolve_diagnosis(&self, scan: &ScanRecord) -> Result<Option<DiagnosisResult>> {
        self.get_diagnosis(scan.diagnosis_scan_id())
    }
}
