//! Integrity verification using multiple hash algorithms
//!
//! Supports MD5 and SHA-1 (legacy), SHA-256 and SHA-512, BLAKE3 and
//! XXHash3. All hashers stream in bounded chunks, so memory use does not
//! grow with file size, and can be fed from a copy loop for single-pass
//! copy-and-hash.

use crate::config::HashAlgorithm;
use crate::error::{FilekitError, IoResultExt, Result};
use crate::fs::HashWriter;
use digest::Digest;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::Path;

/// Read size used when hashing files
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;

/// Hash result as hex string
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashResult {
    /// The hash algorithm used
    pub algorithm: HashAlgorithm,
    /// Hash value as lowercase hex string
    pub hash: String,
    /// Bytes hashed
    pub size: u64,
}

impl HashResult {
    /// Create a new hash result
    pub fn new(algorithm: HashAlgorithm, hash: String, size: u64) -> Self {
        Self {
            algorithm,
            hash,
            size,
        }
    }

    /// Verify against another hash result
    pub fn verify(&self, other: &HashResult) -> bool {
        self.algorithm == other.algorithm && self.hash.eq_ignore_ascii_case(&other.hash)
    }
}

impl std::fmt::Display for HashResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.hash)
    }
}

/// Unified hasher that supports all algorithms
#[derive(Clone)]
pub enum Hasher {
    /// MD5
    Md5(md5::Md5),
    /// SHA-1
    Sha1(sha1::Sha1),
    /// SHA-256
    Sha256(sha2::Sha256),
    /// SHA-512
    Sha512(sha2::Sha512),
    /// BLAKE3
    Blake3(Box<blake3::Hasher>),
    /// XXHash3 128-bit
    XXHash3(Box<xxhash_rust::xxh3::Xxh3>),
}

impl Hasher {
    /// Create a new hasher for the given algorithm
    pub fn new(algorithm: HashAlgorithm) -> Self {
        match algorithm {
            HashAlgorithm::Md5 => Self::Md5(md5::Md5::new()),
            HashAlgorithm::Sha1 => Self::Sha1(sha1::Sha1::new()),
            HashAlgorithm::Sha256 => Self::Sha256(sha2::Sha256::new()),
            HashAlgorithm::Sha512 => Self::Sha512(sha2::Sha512::new()),
            HashAlgorithm::Blake3 => Self::Blake3(Box::new(blake3::Hasher::new())),
            HashAlgorithm::XXHash3 => Self::XXHash3(Box::new(xxhash_rust::xxh3::Xxh3::new())),
        }
    }

    /// Get the algorithm this hasher uses
    pub fn algorithm(&self) -> HashAlgorithm {
        match self {
            Self::Md5(_) => HashAlgorithm::Md5,
            Self::Sha1(_) => HashAlgorithm::Sha1,
            Self::Sha256(_) => HashAlgorithm::Sha256,
            Self::Sha512(_) => HashAlgorithm::Sha512,
            Self::Blake3(_) => HashAlgorithm::Blake3,
            Self::XXHash3(_) => HashAlgorithm::XXHash3,
        }
    }

    /// Update the hasher with more data
    pub fn update(&mut self, data: &[u8]) {
        match self {
            Self::Md5(h) => Digest::update(h, data),
            Self::Sha1(h) => Digest::update(h, data),
            Self::Sha256(h) => Digest::update(h, data),
            Self::Sha512(h) => Digest::update(h, data),
            Self::Blake3(h) => {
                h.update(data);
            }
            Self::XXHash3(h) => h.update(data),
        }
    }

    /// Finalize and get the hash as lowercase hex string
    pub fn finalize(self) -> String {
        match self {
            Self::Md5(h) => hex::encode(h.finalize()),
            Self::Sha1(h) => hex::encode(h.finalize()),
            Self::Sha256(h) => hex::encode(h.finalize()),
            Self::Sha512(h) => hex::encode(h.finalize()),
            Self::Blake3(h) => h.finalize().to_hex().to_string(),
            Self::XXHash3(h) => format!("{:032x}", h.digest128()),
        }
    }

    /// Reset the hasher for reuse
    pub fn reset(&mut self) {
        *self = Self::new(self.algorithm());
    }
}

impl HashWriter for Hasher {
    fn update(&mut self, data: &[u8]) {
        Hasher::update(self, data);
    }
}

/// Several hashers fed from one pass over the data
#[derive(Clone)]
pub struct MultiHasher {
    hashers: Vec<Hasher>,
    bytes_processed: u64,
}

impl MultiHasher {
    /// One hasher per algorithm, in the given order
    pub fn new(algorithms: &[HashAlgorithm]) -> Self {
        Self {
            hashers: algorithms.iter().map(|a| Hasher::new(*a)).collect(),
            bytes_processed: 0,
        }
    }

    /// Finalize every hasher
    pub fn finalize(self) -> Vec<HashResult> {
        let size = self.bytes_processed;
        self.hashers
            .into_iter()
            .map(|h| {
                let algorithm = h.algorithm();
                HashResult::new(algorithm, h.finalize(), size)
            })
            .collect()
    }
}

impl HashWriter for MultiHasher {
    fn update(&mut self, data: &[u8]) {
        for hasher in &mut self.hashers {
            hasher.update(data);
        }
        self.bytes_processed += data.len() as u64;
    }
}

/// Feed a reader through `sink` in `buffer_size` chunks
///
/// Interrupted reads are retried; any other error aborts without a result.
pub(crate) fn stream_into<R: Read, H: HashWriter>(
    path: &Path,
    mut reader: R,
    sink: &mut H,
    buffer_size: usize,
) -> Result<u64> {
    let mut buffer = vec![0u8; buffer_size.max(1)];
    let mut total = 0u64;

    loop {
        let bytes_read = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(FilekitError::io(path, e)),
        };
        sink.update(&buffer[..bytes_read]);
        total += bytes_read as u64;
    }

    Ok(total)
}

fn open_regular_file(path: &Path) -> Result<File> {
    let metadata = std::fs::metadata(path).with_path(path)?;
    if !metadata.is_file() {
        return Err(FilekitError::NotAFile(path.to_path_buf()));
    }
    File::open(path).with_path(path)
}

/// Compute hash of a file
pub fn hash_file(path: &Path, algorithm: HashAlgorithm) -> Result<HashResult> {
    hash_file_with_buffer(path, algorithm, DEFAULT_CHUNK_SIZE)
}

/// Compute hash of a file with custom buffer size
pub fn hash_file_with_buffer(
    path: &Path,
    algorithm: HashAlgorithm,
    buffer_size: usize,
) -> Result<HashResult> {
    let file = open_regular_file(path)?;
    let mut hasher = Hasher::new(algorithm);
    let size = stream_into(path, file, &mut hasher, buffer_size)?;
    Ok(HashResult::new(algorithm, hasher.finalize(), size))
}

/// Compute several digests of a file in one read pass
pub fn hash_file_multi(path: &Path, algorithms: &[HashAlgorithm]) -> Result<Vec<HashResult>> {
    hash_file_multi_with_buffer(path, algorithms, DEFAULT_CHUNK_SIZE)
}

pub(crate) fn hash_file_multi_with_buffer(
    path: &Path,
    algorithms: &[HashAlgorithm],
    buffer_size: usize,
) -> Result<Vec<HashResult>> {
    let file = open_regular_file(path)?;
    let mut hasher = MultiHasher::new(algorithms);
    stream_into(path, file, &mut hasher, buffer_size)?;
    Ok(hasher.finalize())
}

/// Hex digest of a file
pub fn calculate_file_hash(path: &Path, algorithm: HashAlgorithm) -> Result<String> {
    Ok(hash_file(path, algorithm)?.hash)
}

/// Check a file against an expected hex digest (case-insensitive)
pub fn verify_file_hash(path: &Path, expected: &str, algorithm: HashAlgorithm) -> Result<bool> {
    let actual = calculate_file_hash(path, algorithm)?;
    Ok(actual.eq_ignore_ascii_case(expected.trim()))
}

/// Compute hash of data in memory
pub fn hash_bytes(data: &[u8], algorithm: HashAlgorithm) -> HashResult {
    let mut hasher = Hasher::new(algorithm);
    hasher.update(data);
    HashResult::new(algorithm, hasher.finalize(), data.len() as u64)
}

/// Streaming hasher for copy-and-hash operations
pub struct StreamingHasher {
    hasher: Hasher,
    bytes_processed: u64,
}

impl StreamingHasher {
    /// Create a new streaming hasher
    pub fn new(algorithm: HashAlgorithm) -> Self {
        Self {
            hasher: Hasher::new(algorithm),
            bytes_processed: 0,
        }
    }

    /// Process a chunk of data
    pub fn process(&mut self, data: &[u8]) {
        self.hasher.update(data);
        self.bytes_processed += data.len() as u64;
    }

    /// Get bytes processed so far
    pub fn bytes_processed(&self) -> u64 {
        self.bytes_processed
    }

    /// Finalize and get the result
    pub fn finalize(self) -> HashResult {
        let algorithm = self.hasher.algorithm();
        HashResult::new(algorithm, self.hasher.finalize(), self.bytes_processed)
    }
}

impl HashWriter for StreamingHasher {
    fn update(&mut self, data: &[u8]) {
        self.process(data);
    }
}
