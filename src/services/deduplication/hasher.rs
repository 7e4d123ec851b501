//! Image fingerprinting.
//!
//! Produces the three hashes of a [`Fingerprint`]:
//! - `exact`: SHA-256 of the raw upload bytes, for byte-identical matches
//! - `perceptual`: 64-bit DCT mean hash (pHash), tolerant to re-encoding and
//!   small visual edits
//! - `secondary`: 64-bit mean (average) hash
//!
//! The perceptual transforms come from `image_hasher`; this module only
//! configures and invokes them.

use crate::models::{Fingerprint, ImageHash};
use crate::{Error, Result};
use image::DynamicImage;
use image_hasher::{HashAlg, Hasher, HasherConfig};
use sha2::{Digest, Sha256};

/// Side length of the hash grid; `HASH_SIZE * HASH_SIZE` must equal
/// [`ImageHash::BITS`].
const HASH_SIZE: u32 = 8;

/// Image fingerprinter.
///
/// Holds configured hashers so the DCT context is built once per instance.
///
/// # Example
///
/// ```rust,ignore
/// use phytoscan::ImageHasher;
///
/// let hasher = ImageHasher::new();
/// let fp = hasher.fingerprint(&std::fs::read("leaf.jpg")?)?;
/// assert_eq!(fp.exact.len(), 64);
/// assert_eq!(fp.perceptual.similarity(fp.perceptual), 1.0);
/// ```
pub struct ImageHasher {
    perceptual: Hasher,
    secondary: Hasher,
}

impl ImageHasher {
    /// Creates a hasher with 64-bit pHash and mean hash.
    #[must_use]
    pub fn new() -> Self {
        let perceptual = HasherConfig::new()
            .hash_size(HASH_SIZE, HASH_SIZE)
            .hash_alg(HashAlg::Mean)
            .preproc_dct()
            .to_hasher();
        let secondary = HasherConfig::new()
            .hash_size(HASH_SIZE, HASH_SIZE)
            .hash_alg(HashAlg::Mean)
            .to_hasher();
        Self {
            perceptual,
            secondary,
        }
    }

    /// Computes the fingerprint of raw image bytes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidImage`] if the bytes cannot be decoded.
    pub fn fingerprint(&self, bytes: &[u8]) -> Result<Fingerprint> {
        self.fingerprint_decoded(bytes).map(|(fp, _)| fp)
    }

    /// Computes the fingerprint and returns the decoded image alongside it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidImage`] if the bytes are empty or cannot be
    /// decoded.
    pub fn fingerprint_decoded(&self, bytes: &[u8]) -> Result<(Fingerprint, DynamicImage)> {
        let image = decode(bytes)?;
        let fingerprint = Fingerprint {
            exact: Self::exact_hash(bytes),
            perceptual: self.hash_with(&self.perceptual, &image)?,
            secondary: self.hash_with(&self.secondary, &image)?,
        };
        Ok((fingerprint, image))
    }

    /// Lowercase hex SHA-256 of `bytes`.
    #[must_use]
    pub fn exact_hash(bytes: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        hex::encode(hasher.finalize())
    }

    /// Perceptual similarity of two hashes, in `[0, 1]`.
    #[must_use]
    pub fn similarity(a: ImageHash, b: ImageHash) -> f64 {
        a.similarity(b)
    }

    #[allow(clippy::unused_self)]
    fn hash_with(&self, hasher: &Hasher, image: &DynamicImage) -> Result<ImageHash> {
        let hash = hasher.hash_image(image);
        ImageHash::from_be_slice(hash.as_bytes()).ok_or_else(|| {
            Error::InvalidImage(format!(
                "perceptual hash has {} bytes, expected 8",
                hash.as_bytes().len()
            ))
        })
    }
}

impl Default for ImageHasher {
    fn default() -> Self {
        Self::new()
    }
}

/// Decodes an image, guessing the format from its magic bytes.
///
/// # Errors
///
/// Returns [`Error::InvalidImage`] for empty or undecodable input.
pub fn decode(bytes: &[u8]) -> Result<DynamicImage> {
    if bytes.is_empty() {
        return Err(Error::InvalidImage("empty upload".to_string()));
    }
    image::load_from_memory(bytes).map_err(|e| Error::InvalidImage(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;

    fn gradient_png(width: u32, height: u32, flip: bool) -> Vec<u8> {
        let img = RgbImage::from_fn(width, height, |x, y| {
            let v = u8::try_from((x * 255) / width.max(1)).unwrap();
            let w = u8::try_from((y * 255) / height.max(1)).unwrap();
            if flip {
                Rgb([255 - v, 255 - w, 128])
            } else {
                Rgb([v, w, 128])
            }
        });
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut out, ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    #[test]
    fn test_fingerprint_is_deterministic() {
        let hasher = ImageHasher::new();
        let bytes = gradient_png(64, 64, false);
        let a = hasher.fingerprint(&bytes).unwrap();
        let b = hasher.fingerprint(&bytes).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.exact.len(), 64);
        assert!((a.perceptual.similarity(a.perceptual) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_resized_image_is_similar() {
        let hasher = ImageHasher::new();
        let small = hasher.fingerprint(&gradient_png(64, 64, false)).unwrap();
        let large = hasher.fingerprint(&gradient_png(128, 128, false)).unwrap();

        assert_ne!(small.exact, large.exact);
        assert!(small.perceptual.similarity(large.perceptual) > 0.85);
    }

    #[test]
    fn test_inverted_image_differs() {
        let hasher = ImageHasher::new();
        let a = hasher.fingerprint(&gradient_png(64, 64, false)).unwrap();
        let b = hasher.fingerprint(&gradient_png(64, 64, true)).unwrap();
        assert!(a.secondary.similarity(b.secondary) < 0.85);
    }

    #[test]
    fn test_rejects_non_images() {
        let hasher = ImageHasher::new();
        assert!(matches!(
            hasher.fingerprint(b""),
            Err(Error::InvalidImage(_))
        ));
        assert!(matches!(
            hasher.fingerprint(&[0u8; 2048]),
            Err(Error::InvalidImage(_))
        ));
    }

    #[test]
    fn test_exact_hash_known_value() {
        assert_eq!(
            ImageHasher::exact_hash(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
