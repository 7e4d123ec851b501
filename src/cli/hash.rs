//! Fingerprint inspection commands.

use super::read_image;
use crate::config::PhytoscanConfig;
use crate::services::ImageHasher;
use crate::Result;
use std::fmt::Write as _;
use std::path::Path;

/// Prints an image's fingerprint.
///
/// # Errors
///
/// Returns an error if the file cannot be read or decoded.
pub fn cmd_hash(image: &Path) -> Result<String> {
    let fingerprint = ImageHasher::new().fingerprint(&read_image(image)?)?;

    let mut out = String::new();
    let _ = writeln!(out, "exact:      {}", fingerprint.exact);
    let _ = writeln!(out, "perceptual: {}", fingerprint.perceptual);
    let _ = writeln!(out, "secondary:  {}", fingerprint.secondary);
    Ok(out)
}

/// Compares two images the way the duplicate detector would.
///
/// # Errors
///
/// Returns an error if either file cannot be read or decoded.
pub fn cmd_compare(config: &PhytoscanConfig, a: &Path, b: &Path) -> Result<String> {
    let hasher = ImageHasher::new();
    let left = hasher.fingerprint(&read_image(a)?)?;
    let right = hasher.fingerprint(&read_image(b)?)?;

    let similarity = left.perceptual.similarity(right.perceptual);
    let threshold = config.deduplication.near_threshold;
    let verdict = if left.exact == right.exact {
        "exact duplicate"
    } else if similarity > threshold {
        "near duplicate"
    } else {
        "distinct"
    };

    let mut out = String::new();
    let _ = writeln!(
        out,
        "perceptual: {:.4} ({} bits differ)",
        similarity,
        left.perceptual.hamming_distance(right.perceptual)
    );
    let _ = writeln!(
        out,
        "secondary:  {:.4}",
        left.secondary.similarity(right.secondary)
    );
    let _ = writeln!(out, "verdict:    {verdict} (threshold {threshold:.2})");
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::test_support::block_bmp;
    use crate::Error;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, bytes: &[u8]) -> std::path::PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, bytes).unwrap();
        path
    }

    #[test]
    fn test_hash_prints_three_fingerprints() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "a.bmp", &block_bmp(1));

        let out = cmd_hash(&path).unwrap();
        let lines: Vec<&str> = out.lines().collect();

        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0].trim_start_matches("exact:").trim().len(), 64);
        assert_eq!(lines[1].trim_start_matches("perceptual:").trim().len(), 16);
        assert_eq!(lines[2].trim_start_matches("secondary:").trim().len(), 16);
    }

    #[test]
    fn test_compare_same_file_is_exact() {
        let dir = TempDir::new().unwrap();
        let a = write(&dir, "a.bmp", &block_bmp(5));
        let b = write(&dir, "b.bmp", &block_bmp(5));

        let out = cmd_compare(&PhytoscanConfig::new(), &a, &b).unwrap();
        assert!(out.contains("perceptual: 1.0000 (0 bits differ)"));
        assert!(out.contains("verdict:    exact duplicate"));
    }

    #[test]
    fn test_hash_rejects_non_image() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "notes.txt", b"not an image at all");
        assert!(matches!(cmd_hash(&path), Err(Error::InvalidImage(_))));
    }
}
