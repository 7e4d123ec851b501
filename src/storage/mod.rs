//! Storage layer.
//!
//! The pipeline depends only on the [`ScanStore`] and [`CatalogReader`]
//! contracts. Two implementations are provided:
//! - [`SqliteStore`]: the durable store used by the CLI
//! - [`InMemoryStore`]: process-local state for tests

// Allow significant_drop_tightening - dropping database connections slightly early
// provides no meaningful benefit.
#![allow(clippy::significant_drop_tightening)]

pub mod migrations;
pub mod persistence;
pub mod sqlite;
pub mod traits;

pub use persistence::{InMemoryStore, SqliteStore};
pub use traits::{CatalogReader, ScanStore};
