//! `SQLite`-backed scan store and catalog.
//!
//! One database holds the product catalog and the scan history. The store
//! implements both [`ScanStore`] and [`CatalogReader`], so a single handle can
//! be passed to the pipeline for both roles.

use crate::models::{CatalogEntry, DiagnosisResult, ProductId, Recommendation, ScanId, ScanRecord};
use crate::storage::migrations::{self, MIGRATIONS};
use crate::storage::sqlite::{
    PRODUCT_COLUMNS, RESULT_COLUMNS, ResultRow, SCAN_COLUMNS, ScanRow, acquire_lock, open_file,
    open_in_memory, product_from_row, timed,
};
use crate::storage::traits::{CatalogReader, ScanStore};
use crate::{Error, Result};
use rusqlite::{Connection, OptionalExtension, params};
use serde::Deserialize;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::instrument;

const BACKEND: &str = "sqlite";

/// `SQLite`-backed store.
///
/// # Concurrency Model
///
/// Uses a `Mutex<Connection>` for thread-safe access. WAL mode and the busy
/// timeout let separate processes share the file; inside one process every
/// call is serialized by the mutex.
pub struct SqliteStore {
    /// Protected by a mutex because `rusqlite::Connection` is not `Sync`.
    conn: Mutex<Connection>,
    /// Path to the database (None for in-memory).
    db_path: Option<PathBuf>,
}

impl SqliteStore {
    /// Opens (or creates) a database file and applies pending migrations.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StorageUnavailable`] if the database cannot be opened
    /// or migrated.
    pub fn open(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        let mut conn = open_file(&db_path)?;
        migrations::run(&mut conn, MIGRATIONS)?;

        tracing::debug!(path = %db_path.display(), "Opened SQLite store");
        Ok(Self {
            conn: Mutex::new(conn),
            db_path: Some(db_path),
        })
    }

    /// Creates a private in-memory store (useful for testing).
    ///
    /// # Errors
    ///
    /// Returns [`Error::StorageUnavailable`] if the schema cannot be created.
    pub fn in_memory() -> Result<Self> {
        let mut conn = open_in_memory()?;
        migrations::run(&mut conn, MIGRATIONS)?;
        Ok(Self {
            conn: Mutex::new(conn),
            db_path: None,
        })
    }

    /// Returns the database path (None for in-memory).
    #[must_use]
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Returns the applied schema version.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StorageUnavailable`] if the version cannot be read.
    pub fn schema_version(&self) -> Result<i32> {
        let conn = acquire_lock(&self.conn);
        migrations::current_version(&conn)
    }

    /// Inserts a product or updates it in place, keeping its catalog position.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StorageUnavailable`] if the write fails.
    #[instrument(skip(self, entry), fields(product_id = %entry.id))]
    pub fn upsert_product(&self, entry: &CatalogEntry) -> Result<()> {
        timed(BACKEND, "upsert_product", || {
            let conn = acquire_lock(&self.conn);
            upsert_product_on(&conn, entry)
        })
    }

    /// Lists every product, active or not, in catalog order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StorageUnavailable`] if the query fails.
    pub fn list_products(&self) -> Result<Vec<CatalogEntry>> {
        timed(BACKEND, "list_products", || {
            let conn = acquire_lock(&self.conn);
            query_products(&conn, false)
        })
    }

    /// Imports products from CSV with header `id,name,description,price,active`.
    ///
    /// The import runs in one transaction: a malformed row leaves the catalog
    /// untouched. Returns the number of rows written.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for a malformed row and
    /// [`Error::StorageUnavailable`] if the write fails.
    #[instrument(skip(self, reader))]
    pub fn import_products_csv(&self, reader: impl Read) -> Result<usize> {
        let mut rows = Vec::new();
        let mut csv_reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
        for (index, row) in csv_reader.deserialize::<ProductCsvRow>().enumerate() {
            let row = row.map_err(|e| {
                Error::InvalidInput(format!("catalog row {}: {e}", index + 1))
            })?;
            rows.push(row.into_entry());
        }

        timed(BACKEND, "import_products", || {
            let mut conn = acquire_lock(&self.conn);
            let tx = conn
                .transaction()
                .map_err(|e| Error::storage("import_products_begin_tx", e))?;
            for entry in &rows {
                upsert_product_on(&tx, entry)?;
            }
            tx.commit()
                .map_err(|e| Error::storage("import_products_commit", e))?;
            Ok(())
        })?;

        tracing::info!(count = rows.len(), "Imported catalog products");
        Ok(rows.len())
    }
}

/// One CSV catalog row.
#[derive(Debug, Deserialize)]
struct ProductCsvRow {
    id: String,
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    price: f64,
    #[serde(default = "default_active")]
    active: bool,
}

const fn default_active() -> bool {
    true
}

impl ProductCsvRow {
    fn into_entry(self) -> CatalogEntry {
        CatalogEntry::new(self.id, self.name, self.description)
            .with_price(self.price)
            .with_active(self.active)
    }
}

fn upsert_product_on(conn: &Connection, entry: &CatalogEntry) -> Result<()> {
    conn.execute(
        "INSERT INTO products (id, name, description, price, active)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(id) DO UPDATE SET
            name = excluded.name,
            description = excluded.description,
            price = excluded.price,
            active = excluded.active",
        params![
            entry.id.as_str(),
            entry.name,
            entry.description,
            entry.price,
            entry.active
        ],
    )
    .map_err(|e| Error::storage("upsert_product", e))?;
    Ok(())
}

fn query_products(conn: &Connection, active_only: bool) -> Result<Vec<CatalogEntry>> {
    let sql = if active_only {
        format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE active = 1 ORDER BY rowid")
    } else {
        format!("SELECT {PRODUCT_COLUMNS} FROM products ORDER BY rowid")
    };
    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| Error::storage("prepare_list_products", e))?;
    let rows = stmt
        .query_map([], product_from_row)
        .map_err(|e| Error::storage("list_products", e))?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .map_err(|e| Error::storage("list_products", e))
}

fn count_rows(conn: &Connection, table: &str) -> Result<usize> {
    let count: i64 = conn
        .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
        .map_err(|e| Error::storage("count_rows", e))?;
    usize::try_from(count).map_err(|e| Error::storage("count_rows", e))
}

fn insert_scan_row(conn: &Connection, scan: &ScanRecord) -> Result<()> {
    let created_at = i64::try_from(scan.created_at).unwrap_or(i64::MAX);
    conn.execute(
        "INSERT INTO plant_scans
            (id, owner_id, image_hash, perceptual_hash, secondary_hash,
             is_duplicate, original_scan_id, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            scan.id.as_str(),
            scan.owner.as_str(),
            scan.fingerprint.exact,
            scan.fingerprint.perceptual.to_hex(),
            scan.fingerprint.secondary.to_hex(),
            scan.is_duplicate,
            scan.original_scan.as_ref().map(ScanId::as_str),
            created_at,
        ],
    )
    .map_err(|e| Error::storage("insert_scan", e))?;
    Ok(())
}

fn insert_result_row(
    conn: &Connection,
    scan_id: &ScanId,
    diagnosis: &DiagnosisResult,
) -> Result<()> {
    let next_steps = serde_json::to_string(&diagnosis.next_steps)
        .map_err(|e| Error::storage("insert_diagnosis", e))?;
    let consensus_count = i64::try_from(diagnosis.consensus_count).unwrap_or(i64::MAX);
    let total_runs = i64::try_from(diagnosis.total_runs).unwrap_or(i64::MAX);
    let created_at = i64::try_from(crate::current_timestamp()).unwrap_or(i64::MAX);

    conn.execute(
        &format!(
            "INSERT INTO scan_results (scan_id, {RESULT_COLUMNS}, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)"
        ),
        params![
            scan_id.as_str(),
            diagnosis.condition_name,
            diagnosis.confidence,
            diagnosis.symptoms,
            diagnosis.organic_treatment,
            diagnosis.chemical_treatment,
            diagnosis.prevention,
            next_steps,
            diagnosis.consensus_confidence,
            consensus_count,
            total_runs,
            diagnosis.needs_review,
            created_at,
        ],
    )
    .map_err(|e| Error::storage("insert_diagnosis", e))?;
    Ok(())
}

impl ScanStore for SqliteStore {
    #[instrument(skip(self, exact), fields(operation = "find_scan_by_exact_hash"))]
    fn find_scan_by_exact_hash(&self, exact: &str) -> Result<Option<ScanRecord>> {
        timed(BACKEND, "find_scan_by_exact_hash", || {
            let conn = acquire_lock(&self.conn);
            let row = conn
                .query_row(
                    &format!(
                        "SELECT {SCAN_COLUMNS} FROM plant_scans s WHERE s.image_hash = ?1
                           AND EXISTS (SELECT 1 FROM scan_results r
                                       WHERE r.scan_id = COALESCE(s.original_scan_id, s.id))
                         ORDER BY s.created_at ASC, s.rowid ASC LIMIT 1"
                    ),
                    params![exact],
                    ScanRow::from_row,
                )
                .optional()
                .map_err(|e| Error::storage("find_scan_by_exact_hash", e))?;
            row.map(ScanRow::into_record).transpose()
        })
    }

    #[instrument(skip(self), fields(operation = "recent_scans_with_perceptual_hash"))]
    fn recent_scans_with_perceptual_hash(&self, limit: usize) -> Result<Vec<ScanRecord>> {
        timed(BACKEND, "recent_scans_with_perceptual_hash", || {
            let limit = i64::try_from(limit).unwrap_or(i64::MAX);
            let conn = acquire_lock(&self.conn);
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {SCAN_COLUMNS} FROM plant_scans WHERE perceptual_hash IS NOT NULL
                     ORDER BY created_at DESC, rowid DESC LIMIT ?1"
                ))
                .map_err(|e| Error::storage("prepare_recent_scans", e))?;
            let rows = stmt
                .query_map(params![limit], ScanRow::from_row)
                .map_err(|e| Error::storage("recent_scans_with_perceptual_hash", e))?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(|e| Error::storage("recent_scans_with_perceptual_hash", e))?;
            rows.into_iter().map(ScanRow::into_record).collect()
        })
    }

    #[instrument(skip(self, scan), fields(operation = "insert_scan", scan_id = %scan.id))]
    fn insert_scan(&self, scan: &ScanRecord) -> Result<()> {
        timed(BACKEND, "insert_scan", || {
            let conn = acquire_lock(&self.conn);
            insert_scan_row(&conn, scan)
        })
    }

    #[instrument(
        skip(self, scan, diagnosis),
        fields(operation = "insert_scan_with_diagnosis", scan_id = %scan.id)
    )]
    fn insert_scan_with_diagnosis(
        &self,
        scan: &ScanRecord,
        diagnosis: &DiagnosisResult,
    ) -> Result<()> {
        timed(BACKEND, "insert_scan_with_diagnosis", || {
            let mut conn = acquire_lock(&self.conn);
            let tx = conn
                .transaction()
                .map_err(|e| Error::storage("insert_scan_with_diagnosis_begin_tx", e))?;
            insert_scan_row(&tx, scan)?;
            insert_result_row(&tx, &scan.id, diagnosis)?;
            tx.commit()
                .map_err(|e| Error::storage("insert_scan_with_diagnosis_commit", e))
        })
    }

    fn get_scan(&self, id: &ScanId) -> Result<Option<ScanRecord>> {
        timed(BACKEND, "get_scan", || {
            let conn = acquire_lock(&self.conn);
            let row = conn
                .query_row(
                    &format!("SELECT {SCAN_COLUMNS} FROM plant_scans WHERE id = ?1"),
                    params![id.as_str()],
                    ScanRow::from_row,
                )
                .optional()
                .map_err(|e| Error::storage("get_scan", e))?;
            row.map(ScanRow::into_record).transpose()
        })
    }

    #[instrument(skip(self, diagnosis), fields(operation = "insert_diagnosis", scan_id = %scan_id))]
    fn insert_diagnosis(&self, scan_id: &ScanId, diagnosis: &DiagnosisResult) -> Result<()> {
        timed(BACKEND, "insert_diagnosis", || {
            let conn = acquire_lock(&self.conn);
            insert_result_row(&conn, scan_id, diagnosis)
        })
    }

    fn get_diagnosis(&self, scan_id: &ScanId) -> Result<Option<DiagnosisResult>> {
        timed(BACKEND, "get_diagnosis", || {
            let conn = acquire_lock(&self.conn);
            let row = conn
                .query_row(
                    &format!("SELECT {RESULT_COLUMNS} FROM scan_results WHERE scan_id = ?1"),
                    params![scan_id.as_str()],
                    ResultRow::from_row,
                )
                .optional()
                .map_err(|e| Error::storage("get_diagnosis", e))?;
            row.map(ResultRow::into_diagnosis).transpose()
        })
    }

    #[instrument(
        skip(self, recommendations),
        fields(operation = "replace_recommendations", scan_id = %scan_id, count = recommendations.len())
    )]
    fn replace_recommendations(
        &self,
        scan_id: &ScanId,
        recommendations: &[Recommendation],
    ) -> Result<()> {
        timed(BACKEND, "replace_recommendations", || {
            let created_at = i64::try_from(crate::current_timestamp()).unwrap_or(i64::MAX);
            let mut conn = acquire_lock(&self.conn);
            let tx = conn
                .transaction()
                .map_err(|e| Error::storage("replace_recommendations_begin_tx", e))?;

            tx.execute(
                "DELETE FROM scan_product_recommendations WHERE scan_id = ?1",
                params![scan_id.as_str()],
            )
            .map_err(|e| Error::storage("replace_recommendations", e))?;

            for rec in recommendations {
                tx.execute(
                    "INSERT INTO scan_product_recommendations (scan_id, product_id, rank, created_at)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![scan_id.as_str(), rec.product_id.as_str(), rec.rank, created_at],
                )
                .map_err(|e| Error::storage("replace_recommendations", e))?;
            }

            tx.commit()
                .map_err(|e| Error::storage("replace_recommendations_commit", e))
        })
    }

    fn get_recommendations(&self, scan_id: &ScanId) -> Result<Vec<Recommendation>> {
        timed(BACKEND, "get_recommendations", || {
            let conn = acquire_lock(&self.conn);
            let mut stmt = conn
                .prepare(
                    "SELECT product_id, rank FROM scan_product_recommendations
                     WHERE scan_id = ?1 ORDER BY rank",
                )
                .map_err(|e| Error::storage("prepare_get_recommendations", e))?;
            let rows = stmt
                .query_map(params![scan_id.as_str()], |row| {
                    Ok(Recommendation {
                        scan_id: scan_id.clone(),
                        product_id: ProductId::new(row.get::<_, String>(0)?),
                        rank: row.get(1)?,
                    })
                })
                .map_err(|e| Error::storage("get_recommendations", e))?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
                .map_err(|e| Error::storage("get_recommendations", e))
        })
    }

    fn scan_count(&self) -> Result<usize> {
        let conn = acquire_lock(&self.conn);
        count_rows(&conn, "plant_scans")
    }

    fn diagnosis_count(&self) -> Result<usize> {
        let conn = acquire_lock(&self.conn);
        count_rows(&conn, "scan_results")
    }
}

impl CatalogReader for SqliteStore {
    fn active_entries(&self) -> Result<Vec<CatalogEntry>> {
        timed(BACKEND, "active_entries", || {
            let conn = acquire_lock(&self.conn);
            query_products(&conn, true)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DiagnosisCandidate, Fingerprint, ImageHash, OwnerId};

    fn fingerprint(exact: &str, perceptual: u64) -> Fingerprint {
        Fingerprint {
            exact: exact.to_string(),
            perceptual: ImageHash::new(perceptual),
            secondary: ImageHash::new(!perceptual),
        }
    }

    fn diagnosis(name: &str) -> DiagnosisResult {
        let mut candidate = DiagnosisCandidate::named(name);
        candidate.next_steps = vec!["Prune".to_string()];
        DiagnosisResult::from_vote(candidate, name.to_string(), 2, 3)
    }

    #[test]
    fn test_scan_roundtrip() {
        let store = SqliteStore::in_memory().unwrap();
        let scan = ScanRecord::fresh(OwnerId::new("u1"), fingerprint("aa", 42));
        store.insert_scan(&scan).unwrap();

        let loaded = store.get_scan(&scan.id).unwrap().unwrap();
        assert_eq!(loaded, scan);
        assert!(store.get_scan(&ScanId::new("missing")).unwrap().is_none());
    }

    #[test]
    fn test_exact_lookup_returns_oldest() {
        let store = SqliteStore::in_memory().unwrap();
        let first = ScanRecord::fresh(OwnerId::new("u1"), fingerprint("same", 1));
        let second =
            ScanRecord::duplicate_of(OwnerId::new("u2"), fingerprint("same", 1), first.id.clone());
        store.insert_scan_with_diagnosis(&first, &diagnosis("Rust")).unwrap();
        store.insert_scan(&second).unwrap();

        let found = store.find_scan_by_exact_hash("same").unwrap().unwrap();
        assert_eq!(found.id, first.id);
        assert!(store.find_scan_by_exact_hash("other").unwrap().is_none());
    }

    #[test]
    fn test_exact_lookup_skips_undiagnosed_scan() {
        let store = SqliteStore::in_memory().unwrap();
        let orphan = ScanRecord::fresh(OwnerId::new("u1"), fingerprint("same", 1));
        store.insert_scan(&orphan).unwrap();
        assert!(store.find_scan_by_exact_hash("same").unwrap().is_none());

        let diagnosed = ScanRecord::fresh(OwnerId::new("u1"), fingerprint("same", 1));
        store
            .insert_scan_with_diagnosis(&diagnosed, &diagnosis("Blight"))
            .unwrap();

        let found = store.find_scan_by_exact_hash("same").unwrap().unwrap();
        assert_eq!(found.id, diagnosed.id);
    }

    #[test]
    fn test_insert_scan_with_diagnosis_rolls_back() {
        let store = SqliteStore::in_memory().unwrap();
        let first = ScanRecord::fresh(OwnerId::new("u1"), fingerprint("aa", 1));
        store.insert_scan_with_diagnosis(&first, &diagnosis("Rust")).unwrap();
        assert_eq!(store.resolve_diagnosis(&first).unwrap().unwrap().condition_name, "Rust");

        // Same scan ID violates the primary key; no second diagnosis may land
        let err = store
            .insert_scan_with_diagnosis(&first, &diagnosis("Blight"))
            .unwrap_err();
        assert!(matches!(err, Error::StorageUnavailable { .. }));
        assert_eq!(store.scan_count().unwrap(), 1);
        assert_eq!(store.diagnosis_count().unwrap(), 1);
    }

    #[test]
    fn test_recent_window_is_newest_first_and_bounded() {
        let store = SqliteStore::in_memory().unwrap();
        let scans: Vec<_> = (0..5)
            .map(|i| ScanRecord::fresh(OwnerId::new("u"), fingerprint(&format!("h{i}"), i)))
            .collect();
        for scan in &scans {
            store.insert_scan(scan).unwrap();
        }

        let window = store.recent_scans_with_perceptual_hash(3).unwrap();
        let ids: Vec<_> = window.iter().map(|s| s.id.clone()).collect();
        assert_eq!(
            ids,
            vec![scans[4].id.clone(), scans[3].id.clone(), scans[2].id.clone()]
        );
    }

    #[test]
    fn test_diagnosis_is_unique_per_scan() {
        let store = SqliteStore::in_memory().unwrap();
        let scan = ScanRecord::fresh(OwnerId::new("u1"), fingerprint("aa", 1));
        store.insert_scan(&scan).unwrap();
        store.insert_diagnosis(&scan.id, &diagnosis("Rust")).unwrap();

        let loaded = store.get_diagnosis(&scan.id).unwrap().unwrap();
        assert_eq!(loaded, diagnosis("Rust"));

        let err = store.insert_diagnosis(&scan.id, &diagnosis("Blight")).unwrap_err();
        assert!(matches!(err, Error::StorageUnavailable { .. }));
        assert_eq!(store.diagnosis_count().unwrap(), 1);
    }

    #[test]
    fn test_resolve_diagnosis_follows_original() {
        let store = SqliteStore::in_memory().unwrap();
        let original = ScanRecord::fresh(OwnerId::new("u1"), fingerprint("aa", 1));
        let duplicate =
            ScanRecord::duplicate_of(OwnerId::new("u2"), fingerprint("aa", 1), original.id.clone());
        store.insert_scan(&original).unwrap();
        store.insert_scan(&duplicate).unwrap();
        store.insert_diagnosis(&original.id, &diagnosis("Rust")).unwrap();

        assert!(store.get_diagnosis(&duplicate.id).unwrap().is_none());
        let resolved = store.resolve_diagnosis(&duplicate).unwrap().unwrap();
        assert_eq!(resolved.condition_name, "Rust");
    }

    #[test]
    fn test_replace_recommendations_is_atomic() {
        let store = SqliteStore::in_memory().unwrap();
        let scan = ScanRecord::fresh(OwnerId::new("u1"), fingerprint("aa", 1));
        store.insert_scan(&scan).unwrap();
        for id in ["p1", "p2", "p3", "p4"] {
            store
                .upsert_product(&CatalogEntry::new(id, id.to_uppercase(), "Fungicide"))
                .unwrap();
        }
        let scan_id = scan.id.clone();
        let rec = |product: &str, rank| Recommendation {
            scan_id: scan_id.clone(),
            product_id: ProductId::new(product),
            rank,
        };

        store
            .replace_recommendations(&scan_id, &[rec("p1", 1), rec("p2", 2)])
            .unwrap();

        // Duplicate rank violates UNIQUE(scan_id, rank); the old set must survive
        let err = store
            .replace_recommendations(&scan_id, &[rec("p3", 1), rec("p4", 1)])
            .unwrap_err();
        assert!(matches!(err, Error::StorageUnavailable { .. }));

        let ranks: Vec<_> = store
            .get_recommendations(&scan_id)
            .unwrap()
            .into_iter()
            .map(|r| (r.product_id.as_str().to_string(), r.rank))
            .collect();
        assert_eq!(ranks, vec![("p1".to_string(), 1), ("p2".to_string(), 2)]);
    }

    #[test]
    fn test_catalog_upsert_keeps_order_and_filters_inactive() {
        let store = SqliteStore::in_memory().unwrap();
        store
            .upsert_product(&CatalogEntry::new("p1", "Copper Fungicide", "For blight"))
            .unwrap();
        store
            .upsert_product(&CatalogEntry::new("p2", "Neem Oil", "Aphid control").with_active(false))
            .unwrap();
        store
            .upsert_product(&CatalogEntry::new("p1", "Copper Fungicide II", "For blight"))
            .unwrap();

        let all = store.list_products().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].name, "Copper Fungicide II");

        let active = store.active_entries().unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id.as_str(), "p1");
    }

    #[test]
    fn test_import_csv() {
        let store = SqliteStore::in_memory().unwrap();
        let csv = "id,name,description,price,active\n\
                   p1,Copper Spray,Fungicide for blight,12.5,true\n\
                   p2,Neem Oil,Insecticide,8,false\n";
        assert_eq!(store.import_products_csv(csv.as_bytes()).unwrap(), 2);

        let all = store.list_products().unwrap();
        assert!((all[0].price - 12.5).abs() < f64::EPSILON);
        assert!(!all[1].active);
    }

    #[test]
    fn test_import_csv_rejects_bad_row_without_writing() {
        let store = SqliteStore::in_memory().unwrap();
        let csv = "id,name,description,price,active\n\
                   p1,Copper Spray,Fungicide,12.5,true\n\
                   p2,Neem Oil,Insecticide,cheap,true\n";
        let err = store.import_products_csv(csv.as_bytes()).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert!(store.list_products().unwrap().is_empty());
    }

    #[test]
    fn test_reopen_file_keeps_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("phytoscan.db");
        let scan = ScanRecord::fresh(OwnerId::new("u1"), fingerprint("aa", 7));
        {
            let store = SqliteStore::open(&path).unwrap();
            store.insert_scan(&scan).unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.schema_version().unwrap(), 2);
        assert_eq!(store.scan_count().unwrap(), 1);
        assert_eq!(store.db_path(), Some(path.as_path()));
    }
}
