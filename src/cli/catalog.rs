//! Catalog administration and matching commands.

use super::open_store;
use crate::config::PhytoscanConfig;
use crate::models::CatalogEntry;
use crate::services::ProductMatcher;
use crate::services::product_matcher::{collect_terms, score};
use crate::storage::{CatalogReader, ScanStore, SqliteStore};
use crate::{Error, Result};
use std::fmt::Write as _;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

/// Arguments for `catalog add`.
#[derive(Debug, Clone)]
pub struct CatalogAddArgs {
    /// Product identifier; an existing product is updated in place.
    pub id: String,
    /// Product name.
    pub name: String,
    /// Free-text description.
    pub description: String,
    /// Unit price.
    pub price: f64,
    /// Store the product as inactive.
    pub inactive: bool,
}

/// Ranks catalog products for a condition.
///
/// # Errors
///
/// Returns an error if the catalog cannot be read.
pub fn cmd_match(config: &PhytoscanConfig, condition: &str, limit: Option<usize>) -> Result<String> {
    let store = open_store(config)?;
    match_with(config, &store, condition, limit)
}

/// Adds or updates one product.
///
/// # Errors
///
/// Returns an error for a blank id or name, or if the write fails.
pub fn cmd_catalog_add(config: &PhytoscanConfig, args: CatalogAddArgs) -> Result<String> {
    let store = open_store(config)?;
    add_with(&store, args)
}

/// Lists catalog products.
///
/// # Errors
///
/// Returns an error if the catalog cannot be read.
pub fn cmd_catalog_list(config: &PhytoscanConfig, include_inactive: bool) -> Result<String> {
    let store = open_store(config)?;
    list_with(&store, include_inactive)
}

/// Imports products from a CSV file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or a row is malformed; the
/// catalog is left unchanged in that case.
pub fn cmd_catalog_import(config: &PhytoscanConfig, path: &Path) -> Result<String> {
    let store = open_store(config)?;
    import_with(&store, path)
}

fn match_with(
    config: &PhytoscanConfig,
    store: &Arc<SqliteStore>,
    condition: &str,
    limit: Option<usize>,
) -> Result<String> {
    let matcher = ProductMatcher::new(
        Arc::clone(store) as Arc<dyn CatalogReader>,
        Arc::clone(store) as Arc<dyn ScanStore>,
        config.matching,
    );
    let limit = limit.unwrap_or(config.matching.recommendation_limit);
    let matches = matcher.find_matches(condition, limit)?;

    let mut out = String::new();
    if matches.is_empty() {
        let _ = writeln!(out, "No active products match '{}'.", condition.trim());
        let alternatives =
            matcher.suggest_alternatives(condition, config.matching.alternatives_limit)?;
        if !alternatives.is_empty() {
            out.push_str("Treatable conditions:\n");
            for alt in alternatives {
                let _ = writeln!(out, "  {} ({} products)", alt.condition_name, alt.match_count);
            }
        }
        return Ok(out);
    }

    let terms = collect_terms(condition);
    let _ = writeln!(out, "Terms: {}", terms.join(", "));
    for (entry, rank) in matches.iter().zip(1..) {
        let _ = writeln!(
            out,
            "  {rank}. {} [{}] score {}",
            entry.name,
            entry.id,
            score(entry, &terms)
        );
    }
    Ok(out)
}

fn add_with(store: &SqliteStore, args: CatalogAddArgs) -> Result<String> {
    if args.id.trim().is_empty() || args.name.trim().is_empty() {
        return Err(Error::InvalidInput(
            "product id and name must not be blank".to_string(),
        ));
    }
    if !args.price.is_finite() || args.price < 0.0 {
        return Err(Error::InvalidInput(format!(
            "price must be a non-negative number, got {}",
            args.price
        )));
    }

    let entry = CatalogEntry::new(args.id.trim(), args.name.trim(), args.description.trim())
        .with_price(args.price)
        .with_active(!args.inactive);
    store.upsert_product(&entry)?;
    Ok(format!("Saved product {} ({})\n", entry.id, entry.name))
}

fn list_with(store: &SqliteStore, include_inactive: bool) -> Result<String> {
    let products: Vec<CatalogEntry> = store
        .list_products()?
        .into_iter()
        .filter(|entry| include_inactive || entry.active)
        .collect();

    if products.is_empty() {
        return Ok("Catalog is empty.\n".to_string());
    }

    let mut out = String::new();
    for entry in &products {
        let _ = writeln!(
            out,
            "{:<12} {:<28} {:>8.2}{}  {}",
            entry.id.as_str(),
            entry.name,
            entry.price,
            if entry.active { "" } else { " (inactive)" },
            entry.description
        );
    }
    Ok(out)
}

fn import_with(store: &SqliteStore, path: &Path) -> Result<String> {
    let file = File::open(path)
        .map_err(|e| Error::InvalidInput(format!("cannot read {}: {e}", path.display())))?;
    let count = store.import_products_csv(file)?;
    Ok(format!("Imported {count} products from {}\n", path.display()))
}
