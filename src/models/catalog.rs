//! Product catalog and recommendation types.

use super::ScanId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Catalog product identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProductId(String);

impl ProductId {
    /// Creates a product ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A remedy product in the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// Product identifier.
    pub id: ProductId,
    /// Product name.
    pub name: String,
    /// Free-text description.
    #[serde(default)]
    pub description: String,
    /// Unit price.
    #[serde(default)]
    pub price: f64,
    /// Inactive products are never matched.
    #[serde(default = "default_active")]
    pub active: bool,
}

const fn default_active() -> bool {
    true
}

impl CatalogEntry {
    /// Creates an active entry.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: ProductId::new(id),
            name: name.into(),
            description: description.into(),
            price: 0.0,
            active: true,
        }
    }

    /// Sets the price.
    #[must_use]
    pub const fn with_price(mut self, price: f64) -> Self {
        self.price = price;
        self
    }

    /// Sets the active flag.
    #[must_use]
    pub const fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    /// Lowercased `name + " " + description`, the text keyword terms are
    /// matched against.
    #[must_use]
    pub fn search_text(&self) -> String {
        format!("{} {}", self.name, self.description).to_lowercase()
    }
}

/// A ranked product recommendation for a scan. Rank 1 is the best match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recommendation {
    /// Scan the recommendation belongs to.
    pub scan_id: ScanId,
    /// Recommended product.
    pub product_id: ProductId,
    /// 1-based rank, unique per scan.
    pub rank: u32,
}

/// A condition the catalog does carry remedies for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlternativeCondition {
    /// Title-cased category name.
    pub condition_name: String,
    /// Number of active entries matching the category.
    pub match_count: usize,
}
