//! Duplicate detector.
//!
//! Two-tier check with short-circuit evaluation:
//! 1. **Exact match**: indexed lookup by SHA-256; a hit with a diagnosis
//!    returns immediately and the candidate window is never fetched
//! 2. **Near match**: perceptual similarity against a bounded window of the
//!    most recent scans

use super::config::DeduplicationConfig;
use super::types::DuplicateVerdict;
use crate::Result;
use crate::models::{DiagnosisResult, Fingerprint, ScanRecord};
use crate::storage::ScanStore;
use std::sync::Arc;
use std::time::Instant;
use tracing::instrument;

/// Decides whether a fingerprint duplicates an earlier diagnosed scan.
///
/// # Example
///
/// ```rust,ignore
/// use phytoscan::services::deduplication::{DeduplicationConfig, DuplicateDetector};
///
/// let detector = DuplicateDetector::new(store, DeduplicationConfig::default());
/// let verdict = detector.detect(&fingerprint)?;
/// if verdict.is_duplicate {
///     println!("reusing diagnosis of {}", verdict.original.unwrap().id);
/// }
/// ```
pub struct DuplicateDetector {
    store: Arc<dyn ScanStore>,
    config: DeduplicationConfig,
}

impl DuplicateDetector {
    /// Creates a detector over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn ScanStore>, config: DeduplicationConfig) -> Self {
        Self { store, config }
    }

    /// Returns the active configuration.
    #[must_use]
    pub const fn config(&self) -> &DeduplicationConfig {
        &self.config
    }

    /// Checks `fingerprint` against stored scans.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::StorageUnavailable`] if the exact lookup or the
    /// candidate fetch fails. There is no fallback to "not a duplicate".
    #[instrument(skip(self, fingerprint), fields(operation = "detect_duplicate"))]
    pub fn detect(&self, fingerprint: &Fingerprint) -> Result<DuplicateVerdict> {
        let start = Instant::now();

        if !self.config.enabled {
            tracing::debug!("Duplicate detection disabled");
            record_check_metrics("disabled", start);
            return Ok(DuplicateVerdict::unique(elapsed_ms(start)));
        }

        if let Some((original, diagnosis)) = self.check_exact(fingerprint)? {
            tracing::info!(original_scan_id = %original.id, "Exact duplicate found");
            record_check_metrics("exact", start);
            return Ok(DuplicateVerdict::exact(original, diagnosis, elapsed_ms(start)));
        }

        if let Some((original, diagnosis, similarity)) = self.check_near(fingerprint)? {
            tracing::info!(
                original_scan_id = %original.id,
                similarity,
                "Near duplicate found"
            );
            record_check_metrics("near", start);
            return Ok(DuplicateVerdict::near(
                original,
                diagnosis,
                similarity,
                elapsed_ms(start),
            ));
        }

        record_check_metrics("unique", start);
        Ok(DuplicateVerdict::unique(elapsed_ms(start)))
    }

    fn check_exact(&self, fingerprint: &Fingerprint) -> Result<Option<(ScanRecord, DiagnosisResult)>> {
        let Some(record) = self.store.find_scan_by_exact_hash(&fingerprint.exact)? else {
            tracing::debug!("No exact match, checking perceptual similarity");
            return Ok(None);
        };
        let resolved = self.resolve(record)?;
        if resolved.is_none() {
            tracing::debug!("Exact match has no diagnosis, checking perceptual similarity");
        }
        Ok(resolved)
    }

    fn check_near(
        &self,
        fingerprint: &Fingerprint,
    ) -> Result<Option<(ScanRecord, DiagnosisResult, f64)>> {
        let window = self
            .store
            .recent_scans_with_perceptual_hash(self.config.candidate_window)?;

        let mut above: Vec<(f64, ScanRecord)> = window
            .into_iter()
            .map(|c| (fingerprint.perceptual.similarity(c.fingerprint.perceptual), c))
            .filter(|(similarity, _)| *similarity > self.config.near_threshold)
            .collect();

        tracing::debug!(
            candidates = above.len(),
            threshold = self.config.near_threshold,
            "Compared candidate window"
        );

        // Stable: ties keep the newest-first window order
        above.sort_by(|a, b| b.0.total_cmp(&a.0));

        for (similarity, candidate) in above {
            if let Some((original, diagnosis)) = self.resolve(candidate)? {
                return Ok(Some((original, diagnosis, similarity)));
            }
        }
        Ok(None)
    }

    /// Collapses a matched scan to the scan owning its diagnosis.
    fn resolve(&self, record: ScanRecord) -> Result<Option<(ScanRecord, DiagnosisResult)>> {
        let Some(diagnosis) = self.store.resolve_diagnosis(&record)? else {
            return Ok(None);
        };
        let original = match record.original_scan.as_ref() {
            Some(root_id) => self.store.get_scan(root_id)?.unwrap_or(record),
            None => record,
        };
        Ok(Some((original, diagnosis)))
    }
}

#[allow(clippy::cast_possible_truncation)]
fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

fn record_check_metrics(result: &'static str, start: Instant) {
    metrics::counter!("duplicate_checks_total", "result" => result).increment(1);
    metrics::histogram!("duplicate_check_duration_ms", "result" => result)
        .record(start.elapsed().as_secs_f64() * 1000.0);
}
