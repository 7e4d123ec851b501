//! Shared `SQLite` infrastructure for the scan store.
//!
//! ## Module Structure
//!
//! - [`connection`]: `Mutex<Connection>` lock acquisition and pragma setup
//! - [`scan_row`]: row conversion for scans, diagnoses, and products
//! - [`metrics`]: storage operation metrics

mod connection;
mod metrics;
mod scan_row;

pub use connection::{
    BUSY_TIMEOUT_MS, acquire_lock, configure_connection, open_file, open_in_memory,
};
pub use metrics::{record_operation_metrics, timed};
pub use scan_row::{
    PRODUCT_COLUMNS, RESULT_COLUMNS, ResultRow, SCAN_COLUMNS, ScanRow, product_from_row,
};
