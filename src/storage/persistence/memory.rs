//! In-memory scan store and catalog.
//!
//! Keeps everything behind one `RwLock`, so each trait call observes and
//! mutates a consistent snapshot. Used by tests and for ephemeral runs.

use crate::models::{CatalogEntry, DiagnosisResult, Recommendation, ScanId, ScanRecord};
use crate::storage::sqlite::timed;
use crate::storage::traits::{CatalogReader, ScanStore};
use crate::{Error, Result};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

const BACKEND: &str = "memory";

#[derive(Debug, Default)]
struct Inner {
    /// Scans in insertion order.
    scans: Vec<ScanRecord>,
    diagnoses: HashMap<ScanId, DiagnosisResult>,
    recommendations: HashMap<ScanId, Vec<Recommendation>>,
    /// Products in catalog order.
    products: Vec<CatalogEntry>,
}

/// In-memory store implementing [`ScanStore`] and [`CatalogReader`].
#[derive(Debug, Default)]
pub struct InMemoryStore {
    inner: RwLock<Inner>,
}

impl InMemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-loaded with a catalog.
    #[must_use]
    pub fn with_products(products: Vec<CatalogEntry>) -> Self {
        Self {
            inner: RwLock::new(Inner {
                products,
                ..Inner::default()
            }),
        }
    }

    /// Inserts a product or replaces it in place.
    pub fn upsert_product(&self, entry: CatalogEntry) {
        let mut inner = self.write();
        if let Some(existing) = inner.products.iter_mut().find(|p| p.id == entry.id) {
            *existing = entry;
        } else {
            inner.products.push(entry);
        }
    }

    /// Lists every product, active or not.
    #[must_use]
    pub fn list_products(&self) -> Vec<CatalogEntry> {
        self.read().products.clone()
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ScanStore for InMemoryStore {
    fn find_scan_by_exact_hash(&self, exact: &str) -> Result<Option<ScanRecord>> {
        timed(BACKEND, "find_scan_by_exact_hash", || {
            let inner = self.read();
            let found = inner
                .scans
                .iter()
                .find(|s| {
                    s.fingerprint.exact == exact
                        && inner.diagnoses.contains_key(s.diagnosis_scan_id())
                })
                .cloned();
            Ok(found)
        })
    }

    fn recent_scans_with_perceptual_hash(&self, limit: usize) -> Result<Vec<ScanRecord>> {
        timed(BACKEND, "recent_scans_with_perceptual_hash", || {
            Ok(self.read().scans.iter().rev().take(limit).cloned().collect())
        })
    }

    fn insert_scan(&self, scan: &ScanRecord) -> Result<()> {
        timed(BACKEND, "insert_scan", || {
            let mut inner = self.write();
            if inner.scans.iter().any(|s| s.id == scan.id) {
                return Err(Error::storage(
                    "insert_scan",
                    format!("scan '{}' already exists", scan.id),
                ));
            }
            inner.scans.push(scan.clone());
            Ok(())
        })
    }

    fn insert_scan_with_diagnosis(
        &self,
        scan: &ScanRecord,
        diagnosis: &DiagnosisResult,
    ) -> Result<()> {
        timed(BACKEND, "insert_scan_with_diagnosis", || {
            let mut inner = self.write();
            if inner.scans.iter().any(|s| s.id == scan.id) || inner.diagnoses.contains_key(&scan.id)
            {
                return Err(Error::storage(
                    "insert_scan_with_diagnosis",
                    format!("scan '{}' already exists", scan.id),
                ));
            }
            inner.scans.push(scan.clone());
            inner.diagnoses.insert(scan.id.clone(), diagnosis.clone());
            Ok(())
        })
    }

    fn get_scan(&self, id: &ScanId) -> Result<Option<ScanRecord>> {
        Ok(self.read().scans.iter().find(|s| &s.id == id).cloned())
    }

    fn insert_diagnosis(&self, scan_id: &ScanId, diagnosis: &DiagnosisResult) -> Result<()> {
        timed(BACKEND, "insert_diagnosis", || {
            let mut inner = self.write();
            if inner.diagnoses.contains_key(scan_id) {
                return Err(Error::storage(
                    "insert_diagnosis",
                    format!("scan '{scan_id}' already has a diagnosis"),
                ));
            }
            inner.diagnoses.insert(scan_id.clone(), diagnosis.clone());
            Ok(())
        })
    }

    fn get_diagnosis(&self, scan_id: &ScanId) -> Result<Option<DiagnosisResult>> {
        Ok(self.read().diagnoses.get(scan_id).cloned())
    }

    fn replace_recommendations(
        &self,
        scan_id: &ScanId,
        recommendations: &[Recommendation],
    ) -> Result<()> {
        timed(BACKEND, "replace_recommendations", || {
            let mut ranks: Vec<u32> = recommendations.iter().map(|r| r.rank).collect();
            ranks.sort_unstable();
            if ranks.first() == Some(&0) || ranks.windows(2).any(|w| w[0] == w[1]) {
                return Err(Error::storage(
                    "replace_recommendations",
                    "ranks must be unique and start at 1",
                ));
            }

            let mut sorted = recommendations.to_vec();
            sorted.sort_by_key(|r| r.rank);
            self.write().recommendations.insert(scan_id.clone(), sorted);
            Ok(())
        })
    }

    fn get_recommendations(&self, scan_id: &ScanId) -> Result<Vec<Recommendation>> {
        Ok(self
            .read()
            .recommendations
            .get(scan_id)
            .cloned()
            .unwrap_or_default())
    }

    fn scan_count(&self) -> Result<usize> {
        Ok(self.read().scans.len())
    }

    fn diagnosis_count(&self) -> Result<usize> {
        Ok(self.read().diagnoses.len())
    }
}

impl CatalogReader for InMemoryStore {
    fn active_entries(&self) -> Result<Vec<CatalogEntry>> {
        Ok(self
            .read()
            .products
            .iter()
            .filter(|p| p.active)
            .cloned()
            .collect())
    }
}
