//! CLI command implementations.
//!
//! Each command returns its rendered output; `main.rs` owns the terminal.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `analyze` | Run the full pipeline on an image file |
//! | `show` | Show a stored scan with its diagnosis and recommendations |
//! | `hash` | Print an image's fingerprint |
//! | `compare` | Compare two images' fingerprints |
//! | `match` | Rank catalog products for a condition |
//! | `catalog` | Add, list, or import catalog products |
//! | `status` | Show store statistics |
//! | `config` | Show resolved configuration |
//!
//! # Example Usage
//!
//! ```bash
//! phytoscan catalog import products.csv
//! phytoscan analyze leaf.jpg --owner grower-7
//! phytoscan compare leaf.jpg leaf-cropped.jpg
//! phytoscan match "leaf blight" --limit 5
//! ```

mod analyze;
mod catalog;
mod config;
mod hash;
mod inference_factory;
mod status;

pub use analyze::{cmd_analyze, cmd_show};
pub use catalog::{
    CatalogAddArgs, cmd_catalog_add, cmd_catalog_import, cmd_catalog_list, cmd_match,
};
pub use config::cmd_config;
pub use hash::{cmd_compare, cmd_hash};
pub use inference_factory::{
    build_anthropic_client, build_http_config, build_ollama_client, build_openai_client,
    build_vision_provider,
};
pub use status::cmd_status;

use crate::config::PhytoscanConfig;
use crate::storage::SqliteStore;
use crate::{Error, Result};
use std::path::Path;
use std::sync::Arc;

/// Opens the configured `SQLite` store, creating it on first use.
///
/// # Errors
///
/// Returns [`Error::StorageUnavailable`] if the database cannot be opened.
pub fn open_store(config: &PhytoscanConfig) -> Result<Arc<SqliteStore>> {
    SqliteStore::open(config.database_path()).map(Arc::new)
}

/// Reads an image file named on the command line.
fn read_image(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path)
        .map_err(|e| Error::InvalidInput(format!("cannot read {}: {e}", path.display())))
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).map_err(|e| Error::OperationFailed {
        operation: "render_json".to_string(),
        cause: e.to_string(),
    })
}

#[cfg(test)]
pub(crate) mod test_support {
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;

    /// A 64x64 image of random 4x4 gray blocks, BMP encoded.
    pub fn block_bmp(seed: u32) -> Vec<u8> {
        let mut state = seed.wrapping_mul(2_654_435_761).wrapping_add(1);
        let mut levels = [0u8; 256];
        for level in &mut levels {
            state = state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            *level = (state >> 16).to_le_bytes()[0];
        }
        let image = RgbImage::from_fn(64, 64, |x, y| {
            let v = levels[((y / 4) * 16 + x / 4) as usize];
            Rgb([v, v, v])
        });
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(image)
            .write_to(&mut out, ImageFormat::Bmp)
            .unwrap();
        out.into_inner()
    }
}
