//! Store implementations.
//!
//! - [`SqliteStore`]: durable, single-file `SQLite` database
//! - [`InMemoryStore`]: process-local, for tests and ephemeral runs

mod memory;
mod sqlite;

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;
