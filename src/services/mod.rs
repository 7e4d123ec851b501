//! Business logic services.
//!
//! Services compose the store, catalog, and inference collaborators into the
//! analysis pipeline. Leaf-first:
//!
//! - [`ImageHasher`]: content fingerprints
//! - [`DuplicateDetector`]: exact and near duplicate checks
//! - [`ConsensusAnalyzer`]: majority vote over inference runs
//! - [`ProductMatcher`]: catalog scoring and recommendations
//! - [`AnalysisPipeline`]: orchestration and persistence

pub mod consensus;
pub mod deduplication;
pub mod pipeline;
pub mod product_matcher;

pub use consensus::{ConsensusAnalyzer, ConsensusConfig, reconcile};
pub use deduplication::{
    DeduplicationConfig, DuplicateDetector, DuplicateKind, DuplicateVerdict, ImageHasher,
};
pub use pipeline::{
    AnalysisPipeline, PipelineConfig, PipelineStage, ScanReport, SubmitOutcome, lookup_scan,
};
pub use product_matcher::{MatchingConfig, ProductMatcher};
