//! Image fingerprint types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A fixed-length 64-bit similarity hash.
///
/// Bit order is significant: bit 63 is the first bit produced by the hash
/// transform. Two hashes are compared by Hamming distance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct ImageHash(u64);

impl ImageHash {
    /// Number of bits in every hash.
    pub const BITS: u32 = 64;

    /// Creates a hash from its raw bits.
    #[must_use]
    pub const fn new(bits: u64) -> Self {
        Self(bits)
    }

    /// Returns the raw bits.
    #[must_use]
    pub const fn bits(self) -> u64 {
        self.0
    }

    /// Builds a hash from big-endian bytes as produced by the hash transform.
    ///
    /// Returns `None` unless exactly 8 bytes are supplied.
    #[must_use]
    pub fn from_be_slice(bytes: &[u8]) -> Option<Self> {
        let array: [u8; 8] = bytes.try_into().ok()?;
        Some(Self(u64::from_be_bytes(array)))
    }

    /// Encodes the hash as 16 lowercase hex characters.
    #[must_use]
    pub fn to_hex(self) -> String {
        format!("{:016x}", self.0)
    }

    /// Parses a 16-character hex string.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidInput`] if the string is not exactly
    /// 16 hex digits.
    pub fn from_hex(s: &str) -> crate::Result<Self> {
        if s.len() != 16 {
            return Err(crate::Error::InvalidInput(format!(
                "image hash must be 16 hex characters, got {}",
                s.len()
            )));
        }
        u64::from_str_radix(s, 16)
            .map(Self)
            .map_err(|e| crate::Error::InvalidInput(format!("invalid image hash '{s}': {e}")))
    }

    /// Number of differing bits between two hashes.
    #[must_use]
    pub const fn hamming_distance(self, other: Self) -> u32 {
        (self.0 ^ other.0).count_ones()
    }

    /// Similarity in `[0, 1]`: `1 - hamming / 64`, clamped at 0.
    ///
    /// # Example
    ///
    /// ```rust
    /// use phytoscan::ImageHash;
    ///
    /// let a = ImageHash::new(0);
    /// assert_eq!(a.similarity(a), 1.0);
    /// assert_eq!(a.similarity(ImageHash::new(u64::MAX)), 0.0);
    /// assert_eq!(a.similarity(ImageHash::new(0b1111)), 1.0 - 4.0 / 64.0);
    /// ```
    #[must_use]
    pub fn similarity(self, other: Self) -> f64 {
        let distance = f64::from(self.hamming_distance(other));
        (1.0 - distance / f64::from(Self::BITS)).max(0.0)
    }
}

impl fmt::Display for ImageHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl From<ImageHash> for String {
    fn from(hash: ImageHash) -> Self {
        hash.to_hex()
    }
}

impl TryFrom<String> for ImageHash {
    type Error = crate::Error;

    fn try_from(value: String) -> crate::Result<Self> {
        Self::from_hex(&value)
    }
}

/// Content fingerprint of an uploaded image.
///
/// Immutable once computed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint {
    /// Lowercase hex SHA-256 of the raw upload bytes.
    pub exact: String,
    /// DCT perceptual hash (pHash).
    pub perceptual: ImageHash,
    /// Mean (average) hash.
    pub secondary: ImageHash,
}
