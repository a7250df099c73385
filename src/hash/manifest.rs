//! Directory manifests
//!
//! A [`Manifest`] maps `/`-separated relative paths to one digest per
//! algorithm. Iteration is always in lexicographic path order, whatever
//! order files were hashed in. Persistence goes through [`HashRecord`]s.

use super::integrity::{hash_file_multi_with_buffer, DEFAULT_CHUNK_SIZE};
use crate::config::HashAlgorithm;
use crate::error::{FilekitError, Result};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

/// One digest of one file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashRecord {
    /// Path relative to the manifest root, `/`-separated
    pub relative_path: String,
    /// Algorithm used
    pub algorithm: HashAlgorithm,
    /// Lowercase hex digest
    pub digest: String,
}

/// Immutable relative path → algorithm → digest mapping
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    entries: BTreeMap<String, BTreeMap<HashAlgorithm, String>>,
}

impl Manifest {
    /// Start building a manifest
    pub fn builder() -> ManifestBuilder {
        ManifestBuilder::default()
    }

    /// Rebuild from records; conflicting digests for one key are an error
    pub fn from_records<I>(records: I) -> Result<Self>
    where
        I: IntoIterator<Item = HashRecord>,
    {
        let mut builder = Self::builder();
        for record in records {
            builder.insert(record.relative_path, record.algorithm, record.digest)?;
        }
        Ok(builder.build())
    }

    /// Flatten into records, sorted by path then algorithm
    pub fn records(&self) -> Vec<HashRecord> {
        self.entries
            .iter()
            .flat_map(|(path, digests)| {
                digests.iter().map(move |(algorithm, digest)| HashRecord {
                    relative_path: path.clone(),
                    algorithm: *algorithm,
                    digest: digest.clone(),
                })
            })
            .collect()
    }

    /// Number of files
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// No files
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether `path` is listed
    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    /// Digest of `path` under `algorithm`
    pub fn get(&self, path: &str, algorithm: HashAlgorithm) -> Option<&str> {
        self.entries
            .get(path)
            .and_then(|d| d.get(&algorithm))
            .map(String::as_str)
    }

    /// All digests of `path`
    pub fn digests(&self, path: &str) -> Option<&BTreeMap<HashAlgorithm, String>> {
        self.entries.get(path)
    }

    /// Relative paths in lexicographic order
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Entries in lexicographic path order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &BTreeMap<HashAlgorithm, String>)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Algorithms present anywhere in the manifest
    pub fn algorithms(&self) -> BTreeSet<HashAlgorithm> {
        self.entries
            .values()
            .flat_map(|d| d.keys().copied())
            .collect()
    }
}

/// Accumulates digests, rejecting conflicting duplicates
#[derive(Debug, Default)]
pub struct ManifestBuilder {
    entries: BTreeMap<String, BTreeMap<HashAlgorithm, String>>,
}

impl ManifestBuilder {
    /// Add one digest
    ///
    /// Re-inserting the same digest is allowed; a different digest for the
    /// same (path, algorithm) is a [`FilekitError::ManifestError`].
    pub fn insert(
        &mut self,
        relative_path: impl Into<String>,
        algorithm: HashAlgorithm,
        digest: impl Into<String>,
    ) -> Result<&mut Self> {
        let relative_path = relative_path.into().replace('\\', "/");
        let digest = digest.into().to_ascii_lowercase();

        let slot = self.entries.entry(relative_path.clone()).or_default();
        match slot.get(&algorithm) {
            Some(existing) if *existing != digest => Err(FilekitError::ManifestError(format!(
                "conflicting {} digests for '{}': {} vs {}",
                algorithm, relative_path, existing, digest
            ))),
            _ => {
                slot.insert(algorithm, digest);
                Ok(self)
            }
        }
    }

    /// Freeze into a manifest
    pub fn build(self) -> Manifest {
        Manifest {
            entries: self.entries,
        }
    }
}

/// Options for directory hashing
#[derive(Debug, Clone)]
pub struct HashOptions {
    /// Follow symlinks while walking
    pub follow_symlinks: bool,
    /// Read size per chunk
    pub buffer_size: usize,
}

impl Default for HashOptions {
    fn default() -> Self {
        Self {
            follow_symlinks: false,
            buffer_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

/// `/`-separated form of `path` relative to `root`
pub fn relative_key(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Regular files under `dir` in walk order
fn collect_files(dir: &Path, follow_symlinks: bool) -> Result<Vec<PathBuf>> {
    let metadata = std::fs::metadata(dir).map_err(|e| FilekitError::from_io(dir, e))?;
    if !metadata.is_dir() {
        return Err(FilekitError::config(format!(
            "not a directory: {}",
            dir.display()
        )));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(dir)
        .follow_links(follow_symlinks)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(dir).to_path_buf();
            FilekitError::io(path, std::io::Error::from(e))
        })?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

/// Hash every file under `dir` with one algorithm
pub fn calculate_directory_hashes(dir: &Path, algorithm: HashAlgorithm) -> Result<Manifest> {
    calculate_directory_hashes_with(dir, &[algorithm], &HashOptions::default())
}

/// Hash every file under `dir` with several algorithms in one pass per file
pub fn calculate_directory_hashes_multi(
    dir: &Path,
    algorithms: &[HashAlgorithm],
) -> Result<Manifest> {
    calculate_directory_hashes_with(dir, algorithms, &HashOptions::default())
}

/// Hash every file under `dir`
///
/// Files are hashed in parallel; the result does not depend on
/// completion order.
pub fn calculate_directory_hashes_with(
    dir: &Path,
    algorithms: &[HashAlgorithm],
    options: &HashOptions,
) -> Result<Manifest> {
    let files = collect_files(dir, options.follow_symlinks)?;
    debug!("Hashing {} files under {}", files.len(), dir.display());

    let mut hashed: Vec<(String, Vec<super::HashResult>)> = files
        .par_iter()
        .map(|path| {
            let results = hash_file_multi_with_buffer(path, algorithms, options.buffer_size)?;
            Ok((relative_key(dir, path), results))
        })
        .collect::<Result<Vec<_>>>()?;
    hashed.sort_by(|a, b| a.0.cmp(&b.0));

    let mut builder = Manifest::builder();
    for (key, results) in hashed {
        for result in results {
            builder.insert(key.clone(), result.algorithm, result.hash)?;
        }
    }

    let manifest = builder.build();
    info!("Hashed {} files under {}", manifest.len(), dir.display());
    Ok(manifest)
}
