//! Data models for phytoscan.
//!
//! This module contains the core data structures shared by the services and
//! stores.

mod catalog;
mod diagnosis;
mod fingerprint;
mod scan;

pub use catalog::{AlternativeCondition, CatalogEntry, ProductId, Recommendation};
pub use diagnosis::{DiagnosisCandidate, DiagnosisResult};
pub use fingerprint::{Fingerprint, ImageHash};
pub use scan::{OwnerId, ScanId, ScanRecord};
