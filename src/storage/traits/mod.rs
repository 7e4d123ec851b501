//! Storage traits.

mod catalog;
mod scan;

pub use catalog::CatalogReader;
pub use scan::ScanStore;
