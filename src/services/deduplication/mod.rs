//! Image fingerprinting and duplicate detection.
//!
//! Two-tier duplicate checking before any inference call is made:
//! 1. **Exact match**: SHA-256 of the upload bytes, indexed lookup
//! 2. **Near match**: 64-bit perceptual hash similarity over a bounded window
//!    of recent scans
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │              DuplicateDetector              │
//! │  ┌──────────────────┐  ┌─────────────────┐  │
//! │  │ Exact            │  │ Near            │  │
//! │  │ SHA-256 lookup   │─▶│ pHash window    │  │
//! │  │ (short-circuits) │  │ (> 0.85)        │  │
//! │  └──────────────────┘  └─────────────────┘  │
//! └─────────────────────────────────────────────┘
//!          ▲
//!          │ Fingerprint
//!   ┌──────┴──────┐
//!   │ ImageHasher │
//!   └─────────────┘
//! ```

mod config;
mod detector;
mod hasher;
mod types;

pub use config::{DEFAULT_CANDIDATE_WINDOW, DEFAULT_NEAR_THRESHOLD, DeduplicationConfig};
pub use detector::DuplicateDetector;
pub use hasher::{ImageHasher, decode};
pub use types::{DuplicateKind, DuplicateVerdict};
