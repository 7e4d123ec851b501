//! Keyword matching of diagnosed conditions to catalog products.
//!
//! A static vocabulary maps condition families to treatment terms. A
//! condition picks up all of a family's terms once it mentions any one of
//! them, plus its own name. Each active product scores one point per
//! collected term found in its name or description.

use crate::models::{AlternativeCondition, CatalogEntry, Recommendation, ScanId};
use crate::storage::{CatalogReader, ScanStore};
use crate::{Error, Result};
use std::sync::Arc;
use tracing::instrument;

/// Default number of recommendations stored per scan.
pub const DEFAULT_RECOMMENDATION_LIMIT: usize = 10;

/// Default number of alternative conditions suggested.
pub const DEFAULT_ALTERNATIVES_LIMIT: usize = 3;

/// Condition family keys and their treatment vocabulary, in suggestion order.
pub const VOCABULARY: &[(&str, &[&str])] = &[
    ("fungal", &["fungicide", "antifungal", "fungus"]),
    ("bacterial", &["bactericide", "antibacterial", "bacteria"]),
    ("viral", &["antiviral", "virus"]),
    ("pest", &["pesticide", "insecticide", "pest"]),
    ("deficiency", &["fertilizer", "nutrient", "supplement"]),
    ("blight", &["fungicide", "copper"]),
    ("rust", &["fungicide", "rust"]),
    ("mildew", &["fungicide", "mildew"]),
    ("aphid", &["insecticide", "aphid"]),
    ("mite", &["miticide", "mite"]),
];

/// Configuration for the product matcher.
///
/// # Environment Variables
///
/// | Variable | Type | Default | Description |
/// |----------|------|---------|-------------|
/// | `PHYTOSCAN_RECOMMENDATION_LIMIT` | usize | `10` | Recommendations stored per scan |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchingConfig {
    /// Maximum recommendations stored per scan.
    pub recommendation_limit: usize,
    /// Maximum alternatives suggested when nothing matches.
    pub alternatives_limit: usize,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            recommendation_limit: DEFAULT_RECOMMENDATION_LIMIT,
            alternatives_limit: DEFAULT_ALTERNATIVES_LIMIT,
        }
    }
}

impl MatchingConfig {
    /// Creates a configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Applies environment variable overrides on top of `self`.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(limit) = std::env::var("PHYTOSCAN_RECOMMENDATION_LIMIT")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            self.recommendation_limit = limit;
        }
        self
    }

    /// Builder method to set the recommendation limit.
    #[must_use]
    pub const fn with_recommendation_limit(mut self, limit: usize) -> Self {
        self.recommendation_limit = limit;
        self
    }

    /// Builder method to set the alternatives limit.
    #[must_use]
    pub const fn with_alternatives_limit(mut self, limit: usize) -> Self {
        self.alternatives_limit = limit;
        self
    }
}

/// Scores the catalog against conditions and writes recommendation sets.
pub struct ProductMatcher {
    catalog: Arc<dyn CatalogReader>,
    store: Arc<dyn ScanStore>,
    config: MatchingConfig,
}

impl ProductMatcher {
    /// Creates a matcher.
    #[must_use]
    pub fn new(
        catalog: Arc<dyn CatalogReader>,
        store: Arc<dyn ScanStore>,
        config: MatchingConfig,
    ) -> Self {
        Self {
            catalog,
            store,
            config,
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &MatchingConfig {
        &self.config
    }

    /// Returns up to `limit` active products matching `condition`, best first.
    ///
    /// Products scoring zero are never returned. Equal scores keep catalog
    /// order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MatchingFailed`] if the catalog cannot be read.
    #[instrument(skip(self), fields(operation = "find_matches"))]
    pub fn find_matches(&self, condition: &str, limit: usize) -> Result<Vec<CatalogEntry>> {
        let entries = self.active_entries()?;
        let terms = collect_terms(condition);
        let matches = rank_entries(entries, &terms, limit);

        let result = if matches.is_empty() { "none" } else { "matched" };
        metrics::counter!("product_matches_total", "result" => result).increment(1);
        tracing::debug!(
            terms = terms.len(),
            matches = matches.len(),
            "Scored catalog"
        );
        Ok(matches)
    }

    /// True if at least one active product matches `condition`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MatchingFailed`] if the catalog cannot be read.
    pub fn validate_has_matches(&self, condition: &str) -> Result<bool> {
        Ok(!self.find_matches(condition, 1)?.is_empty())
    }

    /// Suggests other condition families the catalog can treat.
    ///
    /// Families are ranked by how many active products mention any of their
    /// terms; the family equal to `condition` is skipped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MatchingFailed`] if the catalog cannot be read.
    #[instrument(skip(self), fields(operation = "suggest_alternatives"))]
    pub fn suggest_alternatives(
        &self,
        condition: &str,
        limit: usize,
    ) -> Result<Vec<AlternativeCondition>> {
        let texts: Vec<String> = self
            .active_entries()?
            .iter()
            .map(CatalogEntry::search_text)
            .collect();
        let normalized = condition.trim().to_lowercase();

        let mut alternatives: Vec<AlternativeCondition> = VOCABULARY
            .iter()
            .filter(|(key, _)| *key != normalized)
            .filter_map(|(key, terms)| {
                let match_count = texts
                    .iter()
                    .filter(|text| terms.iter().any(|term| text.contains(term)))
                    .count();
                (match_count > 0).then(|| AlternativeCondition {
                    condition_name: title_case(key),
                    match_count,
                })
            })
            .collect();

        alternatives.sort_by(|a, b| b.match_count.cmp(&a.match_count));
        alternatives.truncate(limit);
        Ok(alternatives)
    }

    /// Computes matches for `condition` and stores them as the scan's
    /// recommendation set, ranked from 1.
    ///
    /// The write is all-or-nothing. Returns the stored recommendations.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MatchingFailed`] if matching or the write fails.
    #[instrument(skip(self, scan_id), fields(operation = "create_recommendations", scan_id = %scan_id))]
    pub fn create_recommendations(
        &self,
        scan_id: &ScanId,
        condition: &str,
    ) -> Result<Vec<Recommendation>> {
        let matches = self.find_matches(condition, self.config.recommendation_limit)?;
        let recommendations: Vec<Recommendation> = matches
            .into_iter()
            .zip(1u32..)
            .map(|(entry, rank)| Recommendation {
                scan_id: scan_id.clone(),
                product_id: entry.id,
                rank,
            })
            .collect();

        self.store
            .replace_recommendations(scan_id, &recommendations)
            .map_err(|e| Error::MatchingFailed(format!("storing recommendations: {e}")))?;

        tracing::debug!(count = recommendations.len(), "Stored recommendations");
        Ok(recommendations)
    }

    fn active_entries(&self) -> Result<Vec<CatalogEntry>> {
        self.catalog.active_entries().map_err(|e| {
            metrics::counter!("product_matches_total", "result" => "error").increment(1);
            Error::MatchingFailed(format!("reading catalog: {e}"))
        })
    }
}

/// Collects the search terms for a condition.
///
/// Every vocabulary family with a term occurring in the lower-cased
/// condition contributes all its terms; the trimmed condition itself is
/// appended unless blank. Duplicates are dropped, first occurrence kept.
#[must_use]
pub fn collect_terms(condition: &str) -> Vec<String> {
    let lowered = condition.to_lowercase();
    let mut terms: Vec<String> = Vec::new();
    let mut push = |term: &str| {
        if !terms.iter().any(|t| t == term) {
            terms.push(term.to_string());
        }
    };

    for (_, family) in VOCABULARY {
        if family.iter().any(|term| lowered.contains(term)) {
            family.iter().for_each(|term| push(term));
        }
    }

    let literal = lowered.trim();
    if !literal.is_empty() {
        push(literal);
    }
    terms
}

/// Number of `terms` occurring in the entry's lower-cased name and
/// description.
#[must_use]
pub fn score(entry: &CatalogEntry, terms: &[String]) -> usize {
    let text = entry.search_text();
    terms.iter().filter(|term| text.contains(term.as_str())).count()
}

/// Keeps active entries scoring above zero, best first, catalog order on
/// ties.
fn rank_entries(entries: Vec<CatalogEntry>, terms: &[String], limit: usize) -> Vec<CatalogEntry> {
    let mut scored: Vec<(usize, CatalogEntry)> = entries
        .into_iter()
        .filter(|entry| entry.active)
        .map(|entry| (score(&entry, terms), entry))
        .filter(|(points, _)| *points > 0)
        .collect();

    // sort_by is stable
    scored.sort_by(|a, b| b.0.cmp(&a.0));
    scored.into_iter().take(limit).map(|(_, entry)| entry).collect()
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().chain(chars).collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStore;
    use test_case::test_case;

    fn catalog() -> Vec<CatalogEntry> {
        vec![
            CatalogEntry::new("p1", "Copper Spray", "Broad spectrum fungicide for leaf blight"),
            CatalogEntry::new("p2", "Neem Oil", "Organic insecticide for aphid control"),
            CatalogEntry::new("p3", "Garden Fertilizer", "Balanced nutrient mix"),
            CatalogEntry::new("p4", "Rust Guard", "Fungicide for rust on roses"),
            CatalogEntry::new("p5", "Sulfur Dust", "Fungicide, retired product").with_active(false),
            CatalogEntry::new("p6", "Watering Can", "Two gallon galvanized can"),
        ]
    }

    fn matcher() -> (ProductMatcher, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::with_products(catalog()));
        let matcher = ProductMatcher::new(
            Arc::clone(&store) as Arc<dyn CatalogReader>,
            Arc::clone(&store) as Arc<dyn ScanStore>,
            MatchingConfig::default(),
        );
        (matcher, store)
    }

    fn ids(entries: &[CatalogEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.id.as_str()).collect()
    }

    #[test]
    fn test_collect_terms_family_and_literal() {
        assert_eq!(collect_terms("Rust"), vec!["fungicide", "rust"]);
    }

    #[test]
    fn test_collect_terms_family_key_alone_adds_nothing() {
        // "blight" is a family key but none of its terms occur in the name
        assert_eq!(collect_terms("Leaf Blight"), vec!["leaf blight"]);
    }

    #[test]
    fn test_collect_terms_dedupes_across_families() {
        assert_eq!(
            collect_terms("Fungus rust"),
            vec!["fungicide", "antifungal", "fungus", "rust", "fungus rust"]
        );
    }

    #[test_case("", &[] ; "empty")]
    #[test_case("   ", &[] ; "blank")]
    #[test_case("Unknown Spot", &["unknown spot"] ; "literal only")]
    fn test_collect_terms_edges(condition: &str, expected: &[&str]) {
        assert_eq!(collect_terms(condition), expected);
    }

    #[test]
    fn test_find_matches_orders_by_score() {
        let (matcher, _) = matcher();
        let matches = matcher.find_matches("Rust", 10).unwrap();
        // p4: fungicide + rust = 2; p1: fungicide = 1
        assert_eq!(ids(&matches), vec!["p4", "p1"]);
    }

    #[test]
    fn test_find_matches_excludes_inactive_and_zero() {
        let (matcher, _) = matcher();
        let matches = matcher.find_matches("Powdery mildew", 10).unwrap();
        // p5 mentions fungicide but is inactive
        assert_eq!(ids(&matches), vec!["p1", "p4"]);
        assert!(!ids(&matches).contains(&"p5"));
        assert!(!ids(&matches).contains(&"p6"));
    }

    #[test]
    fn test_find_matches_literal_name() {
        let (matcher, _) = matcher();
        let matches = matcher.find_matches("Galvanized", 10).unwrap();
        assert_eq!(ids(&matches), vec!["p6"]);
    }

    #[test]
    fn test_find_matches_limit() {
        let (matcher, _) = matcher();
        assert_eq!(matcher.find_matches("Rust", 1).unwrap().len(), 1);
        assert!(matcher.find_matches("Rust", 0).unwrap().is_empty());
    }

    #[test]
    fn test_validate_has_matches() {
        let (matcher, _) = matcher();
        assert!(matcher.validate_has_matches("Aphid infestation").unwrap());
        assert!(!matcher.validate_has_matches("Healthy").unwrap());
    }

    #[test]
    fn test_suggest_alternatives() {
        let (matcher, _) = matcher();
        let alternatives = matcher.suggest_alternatives("Healthy", 3).unwrap();
        // fungal, blight, rust, mildew: p1 + p4; pest, deficiency, aphid: one each
        assert_eq!(
            alternatives,
            vec![
                AlternativeCondition {
                    condition_name: "Fungal".to_string(),
                    match_count: 2
                },
                AlternativeCondition {
                    condition_name: "Blight".to_string(),
                    match_count: 2
                },
                AlternativeCondition {
                    condition_name: "Rust".to_string(),
                    match_count: 2
                },
            ]
        );

        let all = matcher.suggest_alternatives("Healthy", 10).unwrap();
        let names: Vec<&str> = all.iter().map(|a| a.condition_name.as_str()).collect();
        assert_eq!(
            names,
            vec!["Fungal", "Blight", "Rust", "Mildew", "Pest", "Deficiency", "Aphid"]
        );
    }

    #[test]
    fn test_suggest_alternatives_skips_own_family() {
        let (matcher, _) = matcher();
        let alternatives = matcher.suggest_alternatives(" Fungal ", 10).unwrap();
        assert!(alternatives.iter().all(|a| a.condition_name != "Fungal"));
        assert!(alternatives.iter().any(|a| a.condition_name == "Rust"));
    }

    #[test]
    fn test_create_recommendations_ranks() {
        let (matcher, store) = matcher();
        let scan_id = ScanId::new("scan-1");
        let recommendations = matcher.create_recommendations(&scan_id, "Rust").unwrap();

        let ranks: Vec<u32> = recommendations.iter().map(|r| r.rank).collect();
        assert_eq!(ranks, vec![1, 2]);
        assert_eq!(recommendations[0].product_id.as_str(), "p4");
        assert_eq!(store.get_recommendations(&scan_id).unwrap(), recommendations);
    }

    #[test]
    fn test_create_recommendations_respects_limit() {
        let store = Arc::new(InMemoryStore::with_products(catalog()));
        let matcher = ProductMatcher::new(
            Arc::clone(&store) as Arc<dyn CatalogReader>,
            Arc::clone(&store) as Arc<dyn ScanStore>,
            MatchingConfig::default().with_recommendation_limit(1),
        );
        let recommendations = matcher
            .create_recommendations(&ScanId::new("scan-2"), "Rust")
            .unwrap();
        assert_eq!(recommendations.len(), 1);
        assert_eq!(recommendations[0].rank, 1);
    }

    struct OfflineCatalog;

    impl CatalogReader for OfflineCatalog {
        fn active_entries(&self) -> Result<Vec<CatalogEntry>> {
            Err(Error::storage("active_entries", "connection refused"))
        }
    }

    #[test]
    fn test_catalog_failure_is_matching_failed() {
        let matcher = ProductMatcher::new(
            Arc::new(OfflineCatalog),
            Arc::new(InMemoryStore::new()),
            MatchingConfig::default(),
        );
        let err = matcher.find_matches("Rust", 10).unwrap_err();
        assert!(matches!(err, Error::MatchingFailed(_)));
    }

    #[test_case("fungal", "Fungal")]
    #[test_case("mite", "Mite")]
    #[test_case("", "")]
    fn test_title_case(input: &str, expected: &str) {
        assert_eq!(title_case(input), expected);
    }
}
