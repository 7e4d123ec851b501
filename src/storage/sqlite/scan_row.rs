//! Row conversion between `SQLite` and scan/diagnosis models.
//!
//! Rows are read into plain structs with primitive column types first, then
//! converted with [`ScanRow::into_record`] / [`ResultRow::into_diagnosis`].
//! Malformed stored values surface as [`Error::StorageUnavailable`] rather
//! than being silently defaulted.

use crate::models::{
    CatalogEntry, DiagnosisResult, Fingerprint, ImageHash, OwnerId, ProductId, ScanId, ScanRecord,
};
use crate::{Error, Result};
use rusqlite::Row;

/// Columns selected for a scan, in [`ScanRow::from_row`] order.
pub const SCAN_COLUMNS: &str = "id, owner_id, image_hash, perceptual_hash, secondary_hash, \
                                is_duplicate, original_scan_id, created_at";

/// Columns selected for a diagnosis, in [`ResultRow::from_row`] order.
pub const RESULT_COLUMNS: &str = "condition_name, confidence, symptoms, organic_treatment, \
                                  chemical_treatment, prevention, next_steps, \
                                  consensus_confidence, consensus_count, total_runs, needs_review";

/// Columns selected for a product, in [`product_from_row`] order.
pub const PRODUCT_COLUMNS: &str = "id, name, description, price, active";

/// Raw `plant_scans` row.
#[derive(Debug)]
pub struct ScanRow {
    /// Scan ID.
    pub id: String,
    /// Owner reference.
    pub owner_id: String,
    /// Hex SHA-256.
    pub image_hash: String,
    /// Hex perceptual hash.
    pub perceptual_hash: Option<String>,
    /// Hex secondary hash.
    pub secondary_hash: Option<String>,
    /// Duplicate flag.
    pub is_duplicate: bool,
    /// Scan owning the diagnosis, for duplicates.
    pub original_scan_id: Option<String>,
    /// Unix timestamp.
    pub created_at: i64,
}

impl ScanRow {
    /// Reads a row selected with [`SCAN_COLUMNS`].
    ///
    /// # Errors
    ///
    /// Returns the `rusqlite` error if a column has an unexpected type.
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            owner_id: row.get(1)?,
            image_hash: row.get(2)?,
            perceptual_hash: row.get(3)?,
            secondary_hash: row.get(4)?,
            is_duplicate: row.get(5)?,
            original_scan_id: row.get(6)?,
            created_at: row.get(7)?,
        })
    }

    /// Converts the row into a [`ScanRecord`].
    ///
    /// A missing secondary hash is tolerated and stored as zero; a missing
    /// perceptual hash is not, since such rows never enter the candidate
    /// window.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StorageUnavailable`] if a stored hash is malformed.
    pub fn into_record(self) -> Result<ScanRecord> {
        let decode = |hex: Option<&str>| -> Result<ImageHash> {
            hex.map_or(Ok(ImageHash::new(0)), |h| {
                ImageHash::from_hex(h).map_err(|e| Error::storage("decode_scan_row", e))
            })
        };

        let perceptual = decode(self.perceptual_hash.as_deref())?;
        let secondary = decode(self.secondary_hash.as_deref())?;

        Ok(ScanRecord {
            id: ScanId::new(self.id),
            owner: OwnerId::new(self.owner_id),
            fingerprint: Fingerprint {
                exact: self.image_hash,
                perceptual,
                secondary,
            },
            is_duplicate: self.is_duplicate,
            original_scan: self.original_scan_id.map(ScanId::new),
            created_at: u64::try_from(self.created_at).unwrap_or(0),
        })
    }
}

/// Raw `scan_results` row.
#[derive(Debug)]
pub struct ResultRow {
    condition_name: String,
    confidence: f64,
    symptoms: String,
    organic_treatment: String,
    chemical_treatment: String,
    prevention: String,
    next_steps: String,
    consensus_confidence: f64,
    consensus_count: i64,
    total_runs: i64,
    needs_review: bool,
}

impl ResultRow {
    /// Reads a row selected with [`RESULT_COLUMNS`].
    ///
    /// # Errors
    ///
    /// Returns the `rusqlite` error if a column has an unexpected type.
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            condition_name: row.get(0)?,
            confidence: row.get(1)?,
            symptoms: row.get(2)?,
            organic_treatment: row.get(3)?,
            chemical_treatment: row.get(4)?,
            prevention: row.get(5)?,
            next_steps: row.get(6)?,
            consensus_confidence: row.get(7)?,
            consensus_count: row.get(8)?,
            total_runs: row.get(9)?,
            needs_review: row.get(10)?,
        })
    }

    /// Converts the row into a [`DiagnosisResult`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::StorageUnavailable`] if `next_steps` is not a JSON
    /// string array or a count is negative.
    pub fn into_diagnosis(self) -> Result<DiagnosisResult> {
        let next_steps: Vec<String> = serde_json::from_str(&self.next_steps)
            .map_err(|e| Error::storage("decode_result_row", e))?;
        let count = |n: i64| usize::try_from(n).map_err(|e| Error::storage("decode_result_row", e));

        Ok(DiagnosisResult {
            condition_name: self.condition_name,
            confidence: self.confidence,
            symptoms: self.symptoms,
            organic_treatment: self.organic_treatment,
            chemical_treatment: self.chemical_treatment,
            prevention: self.prevention,
            next_steps,
            consensus_confidence: self.consensus_confidence,
            consensus_count: count(self.consensus_count)?,
            total_runs: count(self.total_runs)?,
            needs_review: self.needs_review,
        })
    }
}

/// Reads a product row selected with [`PRODUCT_COLUMNS`].
///
/// # Errors
///
/// Returns the `rusqlite` error if a column has an unexpected type.
pub fn product_from_row(row: &Row<'_>) -> rusqlite::Result<CatalogEntry> {
    Ok(CatalogEntry {
        id: ProductId::new(row.get::<_, String>(0)?),
        name: row.get(1)?,
        description: row.get(2)?,
        price: row.get(3)?,
        active: row.get(4)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan_row() -> ScanRow {
        ScanRow {
            id: "s1".to_string(),
            owner_id: "u1".to_string(),
            image_hash: "ff".repeat(32),
            perceptual_hash: Some("00000000000000ff".to_string()),
            secondary_hash: None,
            is_duplicate: true,
            original_scan_id: Some("s0".to_string()),
            created_at: 1_700_000_000,
        }
    }

    #[test]
    fn test_scan_row_into_record() {
        let record = scan_row().into_record().unwrap();
        assert_eq!(record.id.as_str(), "s1");
        assert_eq!(record.fingerprint.perceptual.bits(), 255);
        assert_eq!(record.fingerprint.secondary.bits(), 0);
        assert_eq!(record.original_scan.unwrap().as_str(), "s0");
        assert_eq!(record.created_at, 1_700_000_000);
    }

    #[test]
    fn test_scan_row_rejects_bad_hash() {
        let mut row = scan_row();
        row.perceptual_hash = Some("not-hex".to_string());
        assert!(matches!(
            row.into_record(),
            Err(Error::StorageUnavailable { .. })
        ));
    }

    #[test]
    fn test_result_row_rejects_bad_steps() {
        let row = ResultRow {
            condition_name: "Rust".to_string(),
            confidence: 0.5,
            symptoms: String::new(),
            organic_treatment: String::new(),
            chemical_treatment: String::new(),
            prevention: String::new(),
            next_steps: "{".to_string(),
            consensus_confidence: 1.0,
            consensus_count: 1,
            total_runs: 1,
            needs_review: false,
        };
        assert!(row.into_diagnosis().is_err());
    }
}
