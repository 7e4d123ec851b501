//! `SQLite` schema migrations.
//!
//! Migrations are embedded at compile time and applied in order when a store
//! is opened. The applied version is tracked in `PRAGMA user_version`, so a
//! database never needs a separate bookkeeping table.
//!
//! # Usage
//!
//! ```rust,ignore
//! use phytoscan::storage::migrations::{MIGRATIONS, run};
//!
//! let mut conn = rusqlite::Connection::open("phytoscan.db")?;
//! run(&mut conn, MIGRATIONS)?;
//! ```

use crate::{Error, Result};
use rusqlite::Connection;

/// A single migration with version and SQL.
#[derive(Debug, Clone, Copy)]
pub struct Migration {
    /// Migration version (sequential, starting at 1).
    pub version: i32,
    /// Human-readable description.
    pub description: &'static str,
    /// SQL to apply (may contain multiple statements).
    pub sql: &'static str,
}

/// Schema for scans, diagnoses, recommendations, and the product catalog.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "Initial scan, result, recommendation, and product tables",
        sql: r"
            CREATE TABLE IF NOT EXISTS products (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                price REAL NOT NULL DEFAULT 0,
                active INTEGER NOT NULL DEFAULT 1
            );
            CREATE TABLE IF NOT EXISTS plant_scans (
                id TEXT PRIMARY KEY,
                owner_id TEXT NOT NULL,
                image_hash TEXT NOT NULL,
                perceptual_hash TEXT,
                secondary_hash TEXT,
                is_duplicate INTEGER NOT NULL DEFAULT 0,
                original_scan_id TEXT REFERENCES plant_scans(id),
                created_at INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS scan_results (
                scan_id TEXT PRIMARY KEY REFERENCES plant_scans(id),
                condition_name TEXT NOT NULL,
                confidence REAL NOT NULL,
                symptoms TEXT NOT NULL,
                organic_treatment TEXT NOT NULL,
                chemical_treatment TEXT NOT NULL,
                prevention TEXT NOT NULL,
                next_steps TEXT NOT NULL DEFAULT '[]',
                consensus_confidence REAL NOT NULL,
                consensus_count INTEGER NOT NULL,
                total_runs INTEGER NOT NULL,
                needs_review INTEGER NOT NULL,
                created_at INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS scan_product_recommendations (
                scan_id TEXT NOT NULL REFERENCES plant_scans(id),
                product_id TEXT NOT NULL REFERENCES products(id),
                rank INTEGER NOT NULL CHECK (rank >= 1),
                created_at INTEGER NOT NULL,
                PRIMARY KEY (scan_id, product_id),
                UNIQUE (scan_id, rank)
            );
        ",
    },
    Migration {
        version: 2,
        description: "Hash lookup indexes",
        sql: r"
            CREATE INDEX IF NOT EXISTS idx_plant_scans_image_hash ON plant_scans(image_hash);
            CREATE INDEX IF NOT EXISTS idx_plant_scans_perceptual
                ON plant_scans(created_at DESC) WHERE perceptual_hash IS NOT NULL;
            CREATE INDEX IF NOT EXISTS idx_products_active ON products(active);
        ",
    },
];

/// Returns the schema version recorded in the database.
///
/// # Errors
///
/// Returns [`Error::StorageUnavailable`] if the pragma cannot be read.
pub fn current_version(conn: &Connection) -> Result<i32> {
    conn.pragma_query_value(None, "user_version", |row| row.get(0))
        .map_err(|e| Error::storage("read_schema_version", e))
}

/// Applies every migration newer than the recorded version.
///
/// Each migration and its version bump run in one transaction, so a failure
/// leaves the schema at the previous version.
///
/// # Errors
///
/// Returns [`Error::StorageUnavailable`] if a migration fails.
pub fn run(conn: &mut Connection, migrations: &[Migration]) -> Result<()> {
    let current = current_version(conn)?;

    for migration in migrations.iter().filter(|m| m.version > current) {
        let tx = conn
            .transaction()
            .map_err(|e| Error::storage(&format!("migration_v{}_begin_tx", migration.version), e))?;

        tx.execute_batch(migration.sql).map_err(|e| {
            Error::storage(
                &format!("migration_v{}: {}", migration.version, migration.description),
                e,
            )
        })?;

        tx.pragma_update(None, "user_version", migration.version)
            .map_err(|e| Error::storage("record_migration", e))?;

        tx.commit()
            .map_err(|e| Error::storage(&format!("migration_v{}_commit", migration.version), e))?;

        tracing::info!(
            version = migration.version,
            description = migration.description,
            "Applied migration"
        );
    }

    Ok(())
}

/// Maximum version across a set of migrations.
#[must_use]
pub const fn max_version(migrations: &[Migration]) -> i32 {
    let mut max = 0;
    let mut i = 0;
    while i < migrations.len() {
        if migrations[i].version > max {
            max = migrations[i].version;
        }
        i += 1;
    }
    max
}
