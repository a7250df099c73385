//! Content comparison of directory trees
//!
//! Classification is by digest only: identical content with different
//! timestamps is identical, and a present zero-length file is compared like
//! any other (only a file missing on one side is added or removed).

use super::manifest::{calculate_directory_hashes, Manifest};
use crate::config::HashAlgorithm;
use crate::error::{FilekitError, Result};
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// A file present on both sides with different content
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangedEntry {
    /// Relative path
    pub path: String,
    /// Algorithm the digests were compared with
    pub algorithm: HashAlgorithm,
    /// Digest on the left (source) side
    pub left: String,
    /// Digest on the right (destination) side
    pub right: String,
}

/// Differences between two manifests
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiffReport {
    /// Only on the right
    pub added: Vec<String>,
    /// Only on the left
    pub removed: Vec<String>,
    /// On both sides, different digests
    pub changed: Vec<ChangedEntry>,
    /// On both sides, same digests
    pub identical: Vec<String>,
}

impl DiffReport {
    /// Any added, removed or changed entry
    pub fn has_differences(&self) -> bool {
        !(self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty())
    }

    /// Print a human-readable summary
    pub fn print_summary(&self) {
        println!("Identical: {}", self.identical.len());
        println!("Changed:   {}", self.changed.len());
        for entry in &self.changed {
            println!(
                "  ~ {} ({} {} != {})",
                entry.path, entry.algorithm, entry.left, entry.right
            );
        }
        println!("Removed:   {}", self.removed.len());
        for path in &self.removed {
            println!("  - {}", path);
        }
        println!("Added:     {}", self.added.len());
        for path in &self.added {
            println!("  + {}", path);
        }
    }
}

/// Classify every path of two manifests
///
/// Paths present on both sides are compared under every algorithm both
/// sides carry; entries with no algorithm in common cannot be shown equal
/// and are reported as changed.
pub fn compare_manifests(left: &Manifest, right: &Manifest) -> DiffReport {
    let mut report = DiffReport::default();
    let paths: BTreeSet<&str> = left.paths().chain(right.paths()).collect();

    for path in paths {
        let (l, r) = match (left.digests(path), right.digests(path)) {
            (Some(l), Some(r)) => (l, r),
            (Some(_), None) => {
                report.removed.push(path.to_string());
                continue;
            }
            (None, _) => {
                report.added.push(path.to_string());
                continue;
            }
        };

        let mut common = l
            .iter()
            .filter_map(|(alg, ld)| r.get(alg).map(|rd| (*alg, ld, rd)));
        let first_common = common.clone().next();
        match common.find(|(_, ld, rd)| ld != rd) {
            Some((algorithm, ld, rd)) => report.changed.push(ChangedEntry {
                path: path.to_string(),
                algorithm,
                left: ld.clone(),
                right: rd.clone(),
            }),
            None if first_common.is_some() => report.identical.push(path.to_string()),
            None => {
                warn!("No common hash algorithm for {}", path);
                let (algorithm, ld) = l
                    .iter()
                    .next()
                    .map(|(a, d)| (*a, d.clone()))
                    .unwrap_or_default();
                report.changed.push(ChangedEntry {
                    path: path.to_string(),
                    algorithm,
                    left: ld,
                    right: r.values().next().cloned().unwrap_or_default(),
                });
            }
        }
    }

    report
}

/// Compare two directory trees by SHA-256
pub fn compare_directories(left: &Path, right: &Path) -> Result<DiffReport> {
    compare_directories_with(left, right, HashAlgorithm::Sha256)
}

/// Compare two directory trees by `algorithm`
pub fn compare_directories_with(
    left: &Path,
    right: &Path,
    algorithm: HashAlgorithm,
) -> Result<DiffReport> {
    let (left_manifest, right_manifest) = rayon::join(
        || calculate_directory_hashes(left, algorithm),
        || calculate_directory_hashes(right, algorithm),
    );
    let report = compare_manifests(&left_manifest?, &right_manifest?);
    info!(
        "Compared {} and {}: {} identical, {} changed, {} removed, {} added",
        left.display(),
        right.display(),
        report.identical.len(),
        report.changed.len(),
        report.removed.len(),
        report.added.len()
    );
    Ok(report)
}

/// Outcome of checking a copied tree against its source
#[derive(Debug, Clone, Serialize)]
pub struct VerificationReport {
    /// Every source file is present at the destination with equal content
    pub passed: bool,
    /// Full comparison, source on the left
    pub diff: DiffReport,
    /// Algorithm used
    pub algorithm: HashAlgorithm,
    /// Destination root, for error paths
    pub destination: PathBuf,
}

impl VerificationReport {
    /// Turn a failed verification into an error
    ///
    /// The first changed entry becomes [`FilekitError::VerificationMismatch`];
    /// otherwise the first missing file becomes [`FilekitError::NotFound`].
    pub fn into_result(self) -> Result<Self> {
        if let Some(entry) = self.diff.changed.first() {
            return Err(FilekitError::verification_mismatch(
                self.destination.join(&entry.path),
                entry.algorithm,
                entry.left.clone(),
                entry.right.clone(),
            ));
        }
        if let Some(path) = self.diff.removed.first() {
            return Err(FilekitError::NotFound(self.destination.join(path)));
        }
        Ok(self)
    }
}

/// Check that every file under `source` arrived intact under `destination`
///
/// Extra files at the destination do not fail verification.
pub fn verify_copied_files(
    source: &Path,
    destination: &Path,
    algorithm: HashAlgorithm,
) -> Result<VerificationReport> {
    let diff = compare_directories_with(source, destination, algorithm)?;
    let passed = diff.removed.is_empty() && diff.changed.is_empty();
    if !passed {
        warn!(
            "Verification of {} failed: {} changed, {} missing",
            destination.display(),
            diff.changed.len(),
            diff.removed.len()
        );
    }
    Ok(VerificationReport {
        passed,
        diff,
        algorithm,
        destination: destination.to_path_buf(),
    })
}
