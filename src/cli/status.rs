//! Status CLI command.

use super::open_store;
use crate::config::PhytoscanConfig;
use crate::storage::{ScanStore, SqliteStore};
use crate::Result;
use std::fmt::Write as _;

/// Shows store statistics.
///
/// # Errors
///
/// Returns an error if the store cannot be opened or read.
pub fn cmd_status(config: &PhytoscanConfig) -> Result<String> {
    let store = open_store(config)?;
    status_with(config, &store)
}

fn status_with(config: &PhytoscanConfig, store: &SqliteStore) -> Result<String> {
    let products = store.list_products()?;
    let active = products.iter().filter(|entry| entry.active).count();

    let mut out = String::new();
    out.push_str("Phytoscan Status\n");
    out.push_str("================\n\n");
    let _ = writeln!(out, "Version: {}", env!("CARGO_PKG_VERSION"));
    let _ = writeln!(out, "Data Directory: {}", config.data_dir.display());
    let _ = writeln!(
        out,
        "Database: {}",
        store
            .db_path()
            .map_or_else(|| "(in memory)".to_string(), |p| p.display().to_string())
    );
    let _ = writeln!(out, "Schema Version: {}", store.schema_version()?);
    out.push('\n');
    let _ = writeln!(out, "Scans: {}", store.scan_count()?);
    let _ = writeln!(out, "Diagnoses: {}", store.diagnosis_count()?);
    let _ = writeln!(out, "Products: {} ({active} active)", products.len());
    out.push('\n');
    let _ = writeln!(
        out,
        "Inference: {} ({}), {} runs per scan",
        config.inference.provider,
        config.inference.model.as_deref().unwrap_or("default model"),
        config.consensus.runs
    );
    out.push_str("\nUse 'phytoscan config' to view full configuration\n");
    Ok(out)
}
