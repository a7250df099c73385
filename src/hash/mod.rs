//! Hash computation and integrity verification module
//!
//! Provides streaming digests (MD5, SHA-1, SHA-256, SHA-512, BLAKE3,
//! XXHash3), directory manifests, tree comparison and copy verification.

mod compare;
mod integrity;
mod manifest;

pub use compare::*;
pub use integrity::*;
pub use manifest::*;
