//! Analysis pipeline orchestration.
//!
//! Per-request state machine:
//!
//! ```text
//! Received ─▶ Fingerprinted ─┬─▶ DuplicateFound            (done)
//!                            ├─▶ DuplicateCheckFailed      (failed)
//!                            └─▶ Analyzing ─┬─▶ ConsensusReady ─▶ Matching ─▶ Recommended (done)
//!                                           └─▶ ConsensusFailed (failed)
//! ```
//!
//! The duplicate check always completes before any inference call.
//! Recommendations are written only after the diagnosis is stored, and a
//! matching failure never discards the diagnosis.

use crate::config::PhytoscanConfig;
use crate::llm::{InferenceImage, VisionProvider};
use crate::models::{
    AlternativeCondition, DiagnosisResult, Fingerprint, OwnerId, Recommendation, ScanId,
    ScanRecord,
};
use crate::observability::{RequestContext, current_request_id, enter_request_context};
use crate::services::consensus::ConsensusAnalyzer;
use crate::services::deduplication::{DuplicateDetector, DuplicateKind, DuplicateVerdict, ImageHasher};
use crate::services::product_matcher::ProductMatcher;
use crate::storage::{CatalogReader, ScanStore};
use crate::{Error, Result};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::instrument;

/// Default smallest accepted upload, in bytes.
pub const DEFAULT_MIN_IMAGE_BYTES: usize = 1000;

/// Pipeline behavior flags.
///
/// # Environment Variables
///
/// | Variable | Type | Default | Description |
/// |----------|------|---------|-------------|
/// | `PHYTOSCAN_MIN_IMAGE_BYTES` | usize | `1000` | Smallest accepted upload |
/// | `PHYTOSCAN_NEAR_DUPLICATE_RECOMMENDATIONS` | bool | `false` | Fresh recommendations for near duplicates |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Uploads smaller than this are rejected as invalid.
    pub min_image_bytes: usize,
    /// Near duplicates get their own recommendation set computed from the
    /// inherited diagnosis. Exact duplicates never do.
    pub near_duplicate_recommendations: bool,
    /// Suggest alternative conditions when nothing in the catalog matches.
    pub suggest_alternatives: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            min_image_bytes: DEFAULT_MIN_IMAGE_BYTES,
            near_duplicate_recommendations: false,
            suggest_alternatives: true,
        }
    }
}

impl PipelineConfig {
    /// Creates a configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Applies environment variable overrides on top of `self`.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(bytes) = std::env::var("PHYTOSCAN_MIN_IMAGE_BYTES")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            self.min_image_bytes = bytes;
        }
        if let Ok(v) = std::env::var("PHYTOSCAN_NEAR_DUPLICATE_RECOMMENDATIONS") {
            self.near_duplicate_recommendations =
                matches!(v.to_lowercase().as_str(), "true" | "1" | "yes");
        }
        self
    }

    /// Builder method to set the minimum upload size.
    #[must_use]
    pub const fn with_min_image_bytes(mut self, bytes: usize) -> Self {
        self.min_image_bytes = bytes;
        self
    }

    /// Builder method to toggle near-duplicate recommendations.
    #[must_use]
    pub const fn with_near_duplicate_recommendations(mut self, enabled: bool) -> Self {
        self.near_duplicate_recommendations = enabled;
        self
    }

    /// Builder method to toggle alternative suggestions.
    #[must_use]
    pub const fn with_suggest_alternatives(mut self, enabled: bool) -> Self {
        self.suggest_alternatives = enabled;
        self
    }
}

/// Pipeline stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    /// Upload accepted for processing.
    Received,
    /// Hashes computed.
    Fingerprinted,
    /// Matched an earlier scan; terminal.
    DuplicateFound,
    /// The duplicate check could not reach the store; terminal.
    DuplicateCheckFailed,
    /// Inference runs in flight.
    Analyzing,
    /// Consensus reached and stored.
    ConsensusReady,
    /// Every inference run failed; terminal.
    ConsensusFailed,
    /// Scoring the catalog.
    Matching,
    /// Diagnosis stored with its recommendations; terminal.
    Recommended,
}

impl PipelineStage {
    /// Returns the stage as a string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Fingerprinted => "fingerprinted",
            Self::DuplicateFound => "duplicate_found",
            Self::DuplicateCheckFailed => "duplicate_check_failed",
            Self::Analyzing => "analyzing",
            Self::ConsensusReady => "consensus_ready",
            Self::ConsensusFailed => "consensus_failed",
            Self::Matching => "matching",
            Self::Recommended => "recommended",
        }
    }

    /// True for stages that end a request.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::DuplicateFound
                | Self::DuplicateCheckFailed
                | Self::ConsensusFailed
                | Self::Recommended
        )
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result of a successful submission.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmitOutcome {
    /// The scan created for this upload.
    pub scan_id: ScanId,
    /// The diagnosis, fresh or inherited.
    pub diagnosis: DiagnosisResult,
    /// Whether the diagnosis was inherited from an earlier scan.
    pub is_duplicate: bool,
    /// How the upload matched, for duplicates.
    pub duplicate_kind: Option<DuplicateKind>,
    /// The scan owning the inherited diagnosis.
    pub original_scan_id: Option<ScanId>,
    /// Perceptual similarity to the original, for duplicates.
    pub similarity: Option<f64>,
    /// Whether any active product matches the diagnosis.
    pub has_matches: bool,
    /// Other treatable conditions, when nothing matches.
    pub alternatives: Vec<AlternativeCondition>,
    /// Ranked recommendations that apply to this scan.
    pub recommendations: Vec<Recommendation>,
    /// Terminal stage reached.
    pub stage: PipelineStage,
}

/// A stored scan with everything that applies to it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanReport {
    /// The scan.
    pub scan: ScanRecord,
    /// Its diagnosis, following `original_scan` for duplicates.
    pub diagnosis: Option<DiagnosisResult>,
    /// The recommendations that apply to the scan.
    pub recommendations: Vec<Recommendation>,
}

/// Orchestrates fingerprinting, duplicate detection, consensus diagnosis,
/// and product matching, and owns persistence of their results.
///
/// Every collaborator is injected; the pipeline holds no global state.
pub struct AnalysisPipeline {
    store: Arc<dyn ScanStore>,
    hasher: ImageHasher,
    detector: DuplicateDetector,
    analyzer: ConsensusAnalyzer,
    matcher: ProductMatcher,
    config: PipelineConfig,
}

impl AnalysisPipeline {
    /// Wires a pipeline from its collaborators and configuration.
    #[must_use]
    pub fn new(
        store: Arc<dyn ScanStore>,
        catalog: Arc<dyn CatalogReader>,
        provider: Arc<dyn VisionProvider>,
        config: &PhytoscanConfig,
    ) -> Self {
        Self {
            hasher: ImageHasher::new(),
            detector: DuplicateDetector::new(Arc::clone(&store), config.deduplication.clone()),
            analyzer: ConsensusAnalyzer::new(provider, config.consensus.clone()),
            matcher: ProductMatcher::new(catalog, Arc::clone(&store), config.matching),
            store,
            config: config.pipeline,
        }
    }

    /// Returns the pipeline flags.
    #[must_use]
    pub const fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Returns the product matcher.
    #[must_use]
    pub const fn matcher(&self) -> &ProductMatcher {
        &self.matcher
    }

    /// Analyzes one upload.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidImage`] if the upload is too small or not an image;
    ///   nothing is written
    /// - [`Error::StorageUnavailable`] if the duplicate check or a write fails
    /// - [`Error::AllRunsFailed`] if no inference run succeeded; nothing is
    ///   written
    pub fn submit(&self, image_bytes: &[u8], owner: &OwnerId) -> Result<SubmitOutcome> {
        let _request_guard = current_request_id()
            .is_none()
            .then(|| enter_request_context(RequestContext::new()));
        let request_id = current_request_id().unwrap_or_default();

        let result = self.submit_inner(image_bytes, owner, &request_id);
        let outcome = match &result {
            Ok(outcome) => match outcome.duplicate_kind {
                Some(DuplicateKind::Exact) => "duplicate_exact",
                Some(DuplicateKind::Near) => "duplicate_near",
                None => "fresh",
            },
            Err(Error::InvalidImage(_)) => "invalid_image",
            Err(Error::AllRunsFailed { .. }) => "consensus_failed",
            Err(Error::StorageUnavailable { .. }) => "storage_unavailable",
            Err(_) => "error",
        };
        metrics::counter!("pipeline_submissions_total", "outcome" => outcome).increment(1);
        result
    }

    #[instrument(
        skip(self, image_bytes, owner, request_id),
        fields(operation = "submit", request_id = %request_id, owner = %owner, bytes = image_bytes.len())
    )]
    fn submit_inner(
        &self,
        image_bytes: &[u8],
        owner: &OwnerId,
        request_id: &str,
    ) -> Result<SubmitOutcome> {
        enter_stage(PipelineStage::Received);
        if image_bytes.len() < self.config.min_image_bytes {
            return Err(Error::InvalidImage(format!(
                "upload is {} bytes, minimum is {}",
                image_bytes.len(),
                self.config.min_image_bytes
            )));
        }

        let (fingerprint, image) = self.hasher.fingerprint_decoded(image_bytes)?;
        enter_stage(PipelineStage::Fingerprinted);

        let verdict = self.detector.detect(&fingerprint).inspect_err(|e| {
            enter_stage(PipelineStage::DuplicateCheckFailed);
            tracing::error!(error = %e, "Duplicate check failed");
        })?;

        if verdict.is_duplicate {
            return self.finish_duplicate(verdict, owner, fingerprint);
        }

        enter_stage(PipelineStage::Analyzing);
        let inference_image = InferenceImage::from_image(&image)?;
        drop(image);
        let diagnosis = self.analyzer.analyze(&inference_image).inspect_err(|e| {
            enter_stage(PipelineStage::ConsensusFailed);
            tracing::error!(error = %e, "Consensus analysis failed");
        })?;

        let scan = ScanRecord::fresh(owner.clone(), fingerprint);
        self.store.insert_scan_with_diagnosis(&scan, &diagnosis)?;
        enter_stage(PipelineStage::ConsensusReady);

        enter_stage(PipelineStage::Matching);
        let recommendations = self
            .matcher
            .create_recommendations(&scan.id, &diagnosis.condition_name)
            .unwrap_or_else(|e| {
                tracing::warn!(scan_id = %scan.id, error = %e, "Recommendations skipped");
                Vec::new()
            });
        let (has_matches, alternatives) =
            self.match_summary(&diagnosis.condition_name, !recommendations.is_empty());

        enter_stage(PipelineStage::Recommended);
        tracing::info!(
            scan_id = %scan.id,
            condition = %diagnosis.condition_name,
            recommendations = recommendations.len(),
            "Scan analyzed"
        );

        Ok(SubmitOutcome {
            scan_id: scan.id,
            diagnosis,
            is_duplicate: false,
            duplicate_kind: None,
            original_scan_id: None,
            similarity: None,
            has_matches,
            alternatives,
            recommendations,
            stage: PipelineStage::Recommended,
        })
    }

    /// Stores a duplicate scan pointing at the original and assembles its
    /// outcome without any inference call.
    fn finish_duplicate(
        &self,
        verdict: DuplicateVerdict,
        owner: &OwnerId,
        fingerprint: Fingerprint,
    ) -> Result<SubmitOutcome> {
        let (Some(kind), Some(original), Some(diagnosis)) =
            (verdict.kind, verdict.original, verdict.diagnosis)
        else {
            return Err(Error::OperationFailed {
                operation: "finish_duplicate".to_string(),
                cause: "duplicate verdict without an original".to_string(),
            });
        };

        let scan = ScanRecord::duplicate_of(owner.clone(), fingerprint, original.id.clone());
        self.store.insert_scan(&scan)?;
        enter_stage(PipelineStage::DuplicateFound);

        let recommendations =
            if kind == DuplicateKind::Near && self.config.near_duplicate_recommendations {
                self.matcher
                    .create_recommendations(&scan.id, &diagnosis.condition_name)
                    .unwrap_or_else(|e| {
                        tracing::warn!(scan_id = %scan.id, error = %e, "Recommendations skipped");
                        Vec::new()
                    })
            } else {
                self.store
                    .get_recommendations(&original.id)
                    .unwrap_or_else(|e| {
                        tracing::warn!(scan_id = %scan.id, error = %e, "Recommendations skipped");
                        Vec::new()
                    })
            };

        let (has_matches, alternatives) =
            self.match_summary(&diagnosis.condition_name, !recommendations.is_empty());

        tracing::info!(
            scan_id = %scan.id,
            original_scan_id = %original.id,
            kind = %kind,
            "Reused diagnosis from earlier scan"
        );

        Ok(SubmitOutcome {
            scan_id: scan.id,
            diagnosis,
            is_duplicate: true,
            duplicate_kind: Some(kind),
            original_scan_id: Some(original.id),
            similarity: verdict.similarity,
            has_matches,
            alternatives,
            recommendations,
            stage: PipelineStage::DuplicateFound,
        })
    }

    /// Works out `has_matches` and, when nothing matches, alternatives.
    ///
    /// Best-effort: a catalog failure reads as "no matches".
    fn match_summary(
        &self,
        condition: &str,
        known_match: bool,
    ) -> (bool, Vec<AlternativeCondition>) {
        let has_matches = known_match
            || self
                .matcher
                .validate_has_matches(condition)
                .unwrap_or_else(|e| {
                    tracing::warn!(error = %e, "Match validation skipped");
                    false
                });

        if has_matches || !self.config.suggest_alternatives {
            return (has_matches, Vec::new());
        }

        let limit = self.matcher.config().alternatives_limit;
        let alternatives = self
            .matcher
            .suggest_alternatives(condition, limit)
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Alternative suggestions skipped");
                Vec::new()
            });
        (false, alternatives)
    }

    /// Runs [`AnalysisPipeline::submit`] on the blocking thread pool.
    ///
    /// The caller's request id, if any, carries over to the worker.
    ///
    /// # Errors
    ///
    /// Same as [`AnalysisPipeline::submit`], plus
    /// [`Error::OperationFailed`] if the worker task panics.
    pub async fn submit_async(
        self: &Arc<Self>,
        image_bytes: Vec<u8>,
        owner: OwnerId,
    ) -> Result<SubmitOutcome> {
        let pipeline = Arc::clone(self);
        let request_id = current_request_id();
        tokio::task::spawn_blocking(move || {
            let _request_guard = request_id
                .map(RequestContext::from_id)
                .map(enter_request_context);
            pipeline.submit(&image_bytes, &owner)
        })
        .await
        .map_err(|e| Error::OperationFailed {
            operation: "submit_async".to_string(),
            cause: e.to_string(),
        })?
    }

    /// Looks up a stored scan; see [`lookup_scan`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::StorageUnavailable`] if the store cannot be read.
    pub fn lookup(&self, scan_id: &ScanId) -> Result<Option<ScanReport>> {
        lookup_scan(self.store.as_ref(), scan_id)
    }
}

/// Looks up a stored scan without building a pipeline.
///
/// A scan's own recommendations are returned when it has any; otherwise
/// those of the scan owning its diagnosis.
///
/// # Errors
///
/// Returns [`Error::StorageUnavailable`] if the store cannot be read.
#[instrument(skip(store), fields(operation = "lookup"))]
pub fn lookup_scan(store: &dyn ScanStore, scan_id: &ScanId) -> Result<Option<ScanReport>> {
    let Some(scan) = store.get_scan(scan_id)? else {
        return Ok(None);
    };
    let diagnosis = store.resolve_diagnosis(&scan)?;

    let mut recommendations = store.get_recommendations(&scan.id)?;
    if recommendations.is_empty() && scan.diagnosis_scan_id() != &scan.id {
        recommendations = store.get_recommendations(scan.diagnosis_scan_id())?;
    }

    Ok(Some(ScanReport {
        scan,
        diagnosis,
        recommendations,
    }))
}

fn enter_stage(stage: PipelineStage) {
    tracing::debug!(stage = stage.as_str(), terminal = stage.is_terminal(), "Pipeline stage");
}
