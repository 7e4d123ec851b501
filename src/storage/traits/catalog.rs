//! Catalog reader trait.

use crate::Result;
use crate::models::CatalogEntry;

/// Read-only access to the product catalog.
///
/// The matcher never mutates the catalog.
pub trait CatalogReader: Send + Sync {
    /// Returns the active products in catalog order.
    fn active_entries(&self) -> Result<Vec<CatalogEntry>>;
}
