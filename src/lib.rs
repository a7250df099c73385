//! # filekit - Cross-Dialect Paths and Verified File Transfers
//!
//! filekit moves files between Windows, POSIX, Git-Bash and WSL path
//! notations and copies them with proof that nothing changed on the way.
//!
//! ## Features
//!
//! - **Path Dialects**: Detect and translate drive, UNC, verbatim, WSL and Git-Bash paths
//! - **Path Safety**: Character validation, traversal checks, `name (N).ext` unique names
//! - **Metadata Model**: Timestamps, permissions, ownership, attributes and xattrs with
//!   per-field outcomes when the destination cannot hold them exactly
//! - **Integrity Verification**: MD5, SHA-1, SHA-256, SHA-512, BLAKE3, XXHash3
//! - **Manifests and Diffs**: Deterministic directory manifests and tree comparison
//! - **Space Preflight**: Refuse a transfer before the first byte when the volume is too small
//! - **Transfers**: Conflict policies, destination claims, verified copies and safe moves
//!
//! ## Quick Start
//!
//! ```no_run
//! use filekit::{copy_file, normalize_cross_platform_path};
//! use std::path::Path;
//!
//! let native = normalize_cross_platform_path("/c/Users/me/report.pdf").unwrap();
//! let copied = copy_file(&native, Path::new("backup/report.pdf"), true).unwrap();
//! println!("copied: {}", copied);
//! ```
//!
//! ## Verified Tree Copy
//!
//! ```no_run
//! use filekit::config::{ConflictPolicy, HashAlgorithm, TransferConfig};
//! use filekit::core::TransferEngine;
//! use filekit::progress::ProgressReporter;
//! use std::path::Path;
//!
//! let config = TransferConfig {
//!     conflict: ConflictPolicy::RenameUnique,
//!     verify: Some(HashAlgorithm::Sha256),
//!     threads: 4,
//!     ..Default::default()
//! };
//!
//! let engine = TransferEngine::new(config).with_progress(ProgressReporter::new());
//! let result = engine.copy_tree(Path::new("/source"), Path::new("/destination")).unwrap();
//! result.print_summary();
//! ```
//!
//! ## Comparing Trees
//!
//! ```no_run
//! use filekit::compare_directories;
//! use std::path::Path;
//!
//! let diff = compare_directories(Path::new("left"), Path::new("right")).unwrap();
//! diff.print_summary();
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod core;
pub mod error;
pub mod fs;
pub mod hash;
pub mod path;
pub mod progress;
pub mod system;

// Re-export commonly used types
pub use config::{ConflictPolicy, HashAlgorithm, PathStyle, TransferConfig};
pub use crate::core::{copy_file, move_file, TransferEngine, TransferResult};
pub use error::{ErrorKind, FilekitError, Result};
pub use fs::{
    apply_file_metadata, collect_file_metadata, create_directory_structure, find_files,
};
pub use hash::{
    calculate_directory_hashes, calculate_file_hash, compare_directories, verify_copied_files,
    verify_file_hash,
};
pub use path::{
    ensure_unique_path, get_path_type, is_unc_path, normalize, normalize_cross_platform_path,
    normalize_path, split_drive_letter, validate_path_chars,
};
pub use progress::ProgressReporter;
pub use system::{check_disk_space, ensure_disk_space, get_disk_usage};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports
pub mod prelude {
    //! Convenient re-exports for common usage
    //!
    //! ```no_run
    //! use filekit::prelude::*;
    //! ```

    pub use crate::config::{ConflictPolicy, HashAlgorithm, PathStyle, TransferConfig};
    pub use crate::core::{copy_file, move_file, DestinationClaims, TransferEngine, TransferResult};
    pub use crate::error::{ErrorKind, FilekitError, Result};
    pub use crate::fs::{
        apply_file_metadata, collect_file_metadata, find_files, AppliedReport, FieldOutcome,
        FileMetadata, MetadataField,
    };
    pub use crate::hash::{
        calculate_directory_hashes, calculate_file_hash, compare_directories, verify_file_hash,
        DiffReport, Manifest,
    };
    pub use crate::path::{
        normalize, normalize_cross_platform_path, normalize_path, Dialect, HostCapabilities,
        PathResolver, PlatformCapabilities,
    };
    pub use crate::progress::ProgressReporter;
    pub use crate::system::{check_disk_space, ensure_disk_space, get_disk_usage};
}
