//! Configuration settings for filekit
//!
//! Defines the CLI arguments, the transfer configuration handed to the
//! orchestrator, and their defaults.

use crate::path::{Dialect, Platform};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// filekit - cross-dialect path translation and verified file transfers
#[derive(Parser, Debug, Clone)]
#[command(name = "filekit")]
#[command(author = "Filekit Team")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Move files between Windows, POSIX, Git-Bash and WSL paths with proof of integrity")]
#[command(long_about = r#"
filekit copies and moves files and directory trees while translating path
notation between shells, preserving metadata across platforms and proving
with cryptographic hashes that the destination matches the source.

Examples:
  filekit copy /c/Users/me/photos /mnt/backup/photos --verify sha256
  filekit move report.pdf archive/ --conflict rename-unique
  filekit normalize 'C:\Users\me' --to wsl
  filekit compare ./left ./right
  filekit disk /mnt/backup --required 20G
"#)]
pub struct CliArgs {
    /// Verbose output (can be repeated: -v, -vv, -vvv)
    #[arg(short = 'v', long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (suppress non-error output)
    #[arg(short = 'q', long, global = true)]
    pub quiet: bool,

    /// Output format for reports
    #[arg(long, value_enum, default_value = "text", global = true)]
    pub output_format: OutputFormat,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Copy a file or directory tree
    #[command(name = "copy")]
    Copy(TransferArgs),

    /// Move a file or directory tree (copy, verify, then remove source)
    #[command(name = "move")]
    Move(TransferArgs),

    /// Hash a file, or every file in a directory
    #[command(name = "hash")]
    Hash {
        /// File or directory to hash
        path: String,
        /// Hash algorithm (repeatable for several digests in one pass)
        #[arg(short, long, value_enum, default_value = "sha256")]
        algorithm: Vec<HashAlgorithm>,
        /// Write the directory manifest records as JSON to this file
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },

    /// Verify that a destination tree matches its source
    #[command(name = "verify")]
    Verify {
        /// Source directory
        source: String,
        /// Destination directory
        destination: String,
        /// Hash algorithm
        #[arg(long, value_enum, default_value = "sha256")]
        algorithm: HashAlgorithm,
    },

    /// Compare two directory trees by content
    #[command(name = "compare")]
    Compare {
        /// Left directory
        left: String,
        /// Right directory
        right: String,
        /// Hash algorithm
        #[arg(long, value_enum, default_value = "sha256")]
        algorithm: HashAlgorithm,
    },

    /// Translate a path into another dialect
    #[command(name = "normalize")]
    Normalize {
        /// Path in any supported dialect
        path: String,
        /// Target dialect (host-native if omitted)
        #[arg(long, value_enum)]
        to: Option<Dialect>,
    },

    /// Split a path into drive and remainder
    #[command(name = "split")]
    Split {
        /// Path to split
        path: String,
    },

    /// Validate path characters and length for a platform
    #[command(name = "check-path")]
    CheckPath {
        /// Path to validate
        path: String,
        /// Platform rules to apply (host if omitted)
        #[arg(long, value_enum)]
        platform: Option<Platform>,
    },

    /// Show disk usage, optionally checking room for a transfer
    #[command(name = "disk")]
    Disk {
        /// Path on the volume to inspect
        path: String,
        /// Bytes required (e.g., 20G, 512M)
        #[arg(long, value_name = "SIZE")]
        required: Option<String>,
        /// Safety margin as a fraction (0.1 = 10% extra)
        #[arg(long, default_value = "0.1")]
        margin: f64,
    },

    /// Find files matching glob patterns
    #[command(name = "find")]
    Find {
        /// Directory to search
        dir: String,
        /// Include pattern (glob, repeatable)
        #[arg(long, value_name = "PATTERN")]
        include: Vec<String>,
        /// Exclude pattern (glob, repeatable)
        #[arg(long, value_name = "PATTERN")]
        exclude: Vec<String>,
        /// Force case-insensitive matching
        #[arg(short = 'i', long)]
        ignore_case: bool,
    },

    /// Show the metadata snapshot of a path
    #[command(name = "metadata")]
    Metadata {
        /// Path to inspect
        path: String,
        /// Follow a symbolic link to its target
        #[arg(short = 'L', long)]
        follow_symlinks: bool,
    },
}

/// Arguments shared by copy and move
#[derive(Args, Debug, Clone)]
pub struct TransferArgs {
    /// Source path (any dialect)
    #[arg(value_name = "SOURCE")]
    pub source: String,

    /// Destination path (any dialect)
    #[arg(value_name = "DESTINATION")]
    pub destination: String,

    /// Load transfer settings from a JSON file (flags override it)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// What to do when the destination already exists
    #[arg(long, value_enum)]
    pub conflict: Option<ConflictPolicy>,

    /// Verify every copied file with this algorithm
    #[arg(long, value_enum, value_name = "ALGO")]
    pub verify: Option<HashAlgorithm>,

    /// Do not preserve timestamps, permissions and attributes
    #[arg(long)]
    pub no_preserve: bool,

    /// Follow symbolic links instead of recreating them
    #[arg(short = 'L', long)]
    pub follow_symlinks: bool,

    /// Abort a tree transfer on the first failing file
    #[arg(long)]
    pub fail_fast: bool,

    /// Skip the disk space preflight
    #[arg(long)]
    pub no_space_check: bool,

    /// Disk space safety margin as a fraction (0.1 = 10% extra)
    #[arg(long, value_name = "FRACTION")]
    pub margin: Option<f64>,

    /// Buffer size for file operations (e.g., 1M, 64K)
    #[arg(short = 'b', long, value_name = "SIZE")]
    pub buffer_size: Option<String>,

    /// Number of parallel copy threads (0 = auto-detect)
    #[arg(short = 't', long, value_name = "NUM")]
    pub threads: Option<usize>,

    /// File pattern to include (glob)
    #[arg(long, value_name = "PATTERN")]
    pub include: Vec<String>,

    /// File pattern to exclude (glob)
    #[arg(long, value_name = "PATTERN")]
    pub exclude: Vec<String>,

    /// Skip hidden files
    #[arg(long)]
    pub exclude_hidden: bool,

    /// Show progress bars
    #[arg(short = 'p', long)]
    pub progress: bool,
}

/// Hash algorithm for integrity verification
#[derive(
    ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    /// MD5 (legacy compatibility only)
    #[value(name = "md5")]
    Md5,
    /// SHA-1 (legacy compatibility only)
    #[value(name = "sha1")]
    Sha1,
    /// SHA-256 - Standard cryptographic hash
    #[default]
    #[value(name = "sha256")]
    Sha256,
    /// SHA-512
    #[value(name = "sha512")]
    Sha512,
    /// BLAKE3 - Fast and cryptographically secure
    #[value(name = "blake3")]
    Blake3,
    /// XXHash3 - Ultra fast, non-cryptographic (128-bit)
    #[value(name = "xxhash3")]
    XXHash3,
}

impl HashAlgorithm {
    /// All supported algorithms
    pub const ALL: [HashAlgorithm; 6] = [
        Self::Md5,
        Self::Sha1,
        Self::Sha256,
        Self::Sha512,
        Self::Blake3,
        Self::XXHash3,
    ];

    /// Get the output size in bytes
    pub fn output_size(&self) -> usize {
        match self {
            Self::Md5 => 16,
            Self::Sha1 => 20,
            Self::Sha256 => 32,
            Self::Sha512 => 64,
            Self::Blake3 => 32,
            Self::XXHash3 => 16,
        }
    }

    /// Length of the lowercase hex digest
    pub fn hex_len(&self) -> usize {
        self.output_size() * 2
    }

    /// Get human-readable name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Md5 => "MD5",
            Self::Sha1 => "SHA-1",
            Self::Sha256 => "SHA-256",
            Self::Sha512 => "SHA-512",
            Self::Blake3 => "BLAKE3",
            Self::XXHash3 => "XXHash3",
        }
    }

    /// Whether the algorithm resists deliberate collisions
    pub fn is_cryptographic(&self) -> bool {
        matches!(self, Self::Sha256 | Self::Sha512 | Self::Blake3)
    }

    /// Parse an algorithm name such as "sha256" or "SHA-256"
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().replace('-', "").as_str() {
            "md5" => Some(Self::Md5),
            "sha1" => Some(Self::Sha1),
            "sha256" => Some(Self::Sha256),
            "sha512" => Some(Self::Sha512),
            "blake3" => Some(Self::Blake3),
            "xxhash3" | "xxh3" => Some(Self::XXHash3),
            _ => None,
        }
    }
}

impl std::fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Md5 => "md5",
            Self::Sha1 => "sha1",
            Self::Sha256 => "sha256",
            Self::Sha512 => "sha512",
            Self::Blake3 => "blake3",
            Self::XXHash3 => "xxhash3",
        };
        f.write_str(name)
    }
}

/// What to do when a destination path is already occupied
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictPolicy {
    /// Replace the existing destination
    #[value(name = "overwrite")]
    Overwrite,
    /// Leave the destination alone and record the entry as skipped
    #[default]
    #[value(name = "skip")]
    Skip,
    /// Write to the first free `name (N).ext` next to the destination
    #[value(name = "rename-unique")]
    RenameUnique,
    /// Treat the conflict as an error
    #[value(name = "fail")]
    Fail,
}

/// Output format for reports
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Human-readable text
    #[default]
    Text,
    /// JSON format
    Json,
}

/// Destination layout for batch transfers of individual files
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PathStyle {
    /// Keep the path relative to the source base
    #[default]
    Relative,
    /// Mirror the full source path (drive letter becomes a directory)
    Absolute,
    /// Drop directories, keep the file name only
    Flat,
}

/// Configuration handed to the transfer orchestrator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Conflict policy for occupied destinations
    pub conflict: ConflictPolicy,
    /// Preserve timestamps, permissions and attributes
    pub preserve_metadata: bool,
    /// Follow symlinks instead of recreating them
    pub follow_symlinks: bool,
    /// Hash algorithm for post-copy verification
    pub verify: Option<HashAlgorithm>,
    /// Abort a tree on the first per-file error
    pub fail_fast: bool,
    /// Run the disk space preflight
    pub check_space: bool,
    /// Safety margin for the preflight (0.1 = 10% extra)
    pub safety_margin: f64,
    /// Buffer size in bytes
    pub buffer_size: usize,
    /// Copy threads for tree transfers (0 = auto-detect)
    pub threads: usize,
    /// Include patterns
    pub include_patterns: Vec<String>,
    /// Exclude patterns
    pub exclude_patterns: Vec<String>,
    /// Include hidden files
    pub include_hidden: bool,
    /// Try an atomic rename before copy-then-remove when moving
    pub rename_when_possible: bool,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            conflict: ConflictPolicy::Skip,
            preserve_metadata: true,
            follow_symlinks: false,
            verify: None,
            fail_fast: false,
            check_space: true,
            safety_margin: 0.1,
            buffer_size: 1024 * 1024, // 1MB
            threads: 1,
            include_patterns: Vec::new(),
            exclude_patterns: Vec::new(),
            include_hidden: true,
            rename_when_possible: true,
        }
    }
}

impl TransferConfig {
    /// Load a configuration from a JSON file; missing keys take defaults
    pub fn from_json_file(path: &Path) -> crate::error::Result<Self> {
        use crate::error::IoResultExt;

        let json = std::fs::read_to_string(path).with_path(path)?;
        let config: Self = serde_json::from_str(&json)
            .map_err(|e| crate::error::FilekitError::config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges
    pub fn validate(&self) -> crate::error::Result<()> {
        if !self.safety_margin.is_finite() || self.safety_margin < 0.0 {
            return Err(crate::error::FilekitError::config(format!(
                "safety margin must be a non-negative number, got {}",
                self.safety_margin
            )));
        }
        if self.buffer_size == 0 {
            return Err(crate::error::FilekitError::config("buffer size must be positive"));
        }
        Ok(())
    }

    /// Effective worker count
    pub fn effective_threads(&self) -> usize {
        if self.threads == 0 {
            num_cpus::get()
        } else {
            self.threads
        }
    }

    /// Build config from transfer CLI arguments
    pub fn from_args(args: &TransferArgs) -> Result<Self, String> {
        let mut config = match &args.config {
            Some(path) => Self::from_json_file(path).map_err(|e| e.to_string())?,
            None => Self::default(),
        };

        if let Some(conflict) = args.conflict {
            config.conflict = conflict;
        }
        if args.verify.is_some() {
            config.verify = args.verify;
        }
        if args.no_preserve {
            config.preserve_metadata = false;
        }
        if args.follow_symlinks {
            config.follow_symlinks = true;
        }
        if args.fail_fast {
            config.fail_fast = true;
        }
        if args.no_space_check {
            config.check_space = false;
        }
        if let Some(margin) = args.margin {
            config.safety_margin = margin;
        }
        if let Some(size) = &args.buffer_size {
            config.buffer_size =
                parse_size(size).map_err(|e| format!("Invalid buffer size: {}", e))? as usize;
        }
        if let Some(threads) = args.threads {
            config.threads = threads;
        }
        if !args.include.is_empty() {
            config.include_patterns = args.include.clone();
        }
        if !args.exclude.is_empty() {
            config.exclude_patterns = args.exclude.clone();
        }
        if args.exclude_hidden {
            config.include_hidden = false;
        }

        config.validate().map_err(|e| e.to_string())?;
        Ok(config)
    }
}

/// Parse human-readable size string to bytes
pub fn parse_size(size: &str) -> Result<u64, String> {
    let size = size.trim().to_uppercase();

    if size.is_empty() {
        return Err("Empty size string".to_string());
    }

    let (num_str, multiplier) = if size.ends_with("TB") || size.ends_with('T') {
        let num = size.trim_end_matches(|c| c == 'T' || c == 'B');
        (num, 1024u64 * 1024 * 1024 * 1024)
    } else if size.ends_with("GB") || size.ends_with('G') {
        let num = size.trim_end_matches(|c| c == 'G' || c == 'B');
        (num, 1024u64 * 1024 * 1024)
    } else if size.ends_with("MB") || size.ends_with('M') {
        let num = size.trim_end_matches(|c| c == 'M' || c == 'B');
        (num, 1024u64 * 1024)
    } else if size.ends_with("KB") || size.ends_with('K') {
        let num = size.trim_end_matches(|c| c == 'K' || c == 'B');
        (num, 1024u64)
    } else if size.ends_with('B') {
        let num = size.trim_end_matches('B');
        (num, 1u64)
    } else {
        // Assume bytes if no suffix
        (size.as_str(), 1u64)
    };

    let num: f64 = num_str
        .trim()
        .parse()
        .map_err(|_| format!("Invalid number: {}", num_str))?;

    if num < 0.0 {
        return Err(format!("Negative size: {}", num_str));
    }

    Ok((num * multiplier as f64) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("1024").unwrap(), 1024);
        assert_eq!(parse_size("1K").unwrap(), 1024);
        assert_eq!(parse_size("1KB").unwrap(), 1024);
        assert_eq!(parse_size("1M").unwrap(), 1024 * 1024);
        assert_eq!(parse_size("1G").unwrap(), 1024 * 1024 * 1024);
        assert_eq!(parse_size("1.5G").unwrap(), (1.5 * 1024.0 * 1024.0 * 1024.0) as u64);
        assert!(parse_size("").is_err());
        assert!(parse_size("-5M").is_err());
        assert!(parse_size("lots").is_err());
    }

    #[test]
    fn test_hash_algorithm() {
        assert_eq!(HashAlgorithm::Md5.hex_len(), 32);
        assert_eq!(HashAlgorithm::Sha256.hex_len(), 64);
        assert_eq!(HashAlgorithm::Sha512.hex_len(), 128);
        assert_eq!(HashAlgorithm::Sha256.name(), "SHA-256");
        assert_eq!(HashAlgorithm::parse("SHA-512"), Some(HashAlgorithm::Sha512));
        assert_eq!(HashAlgorithm::parse("crc32"), None);
        assert_eq!(HashAlgorithm::default(), HashAlgorithm::Sha256);
        assert_eq!(HashAlgorithm::Sha1.to_string(), "sha1");
    }

    #[test]
    fn test_config_defaults_and_validation() {
        let config = TransferConfig::default();
        assert_eq!(config.conflict, ConflictPolicy::Skip);
        assert!(config.preserve_metadata);
        assert!(config.validate().is_ok());

        let bad = TransferConfig {
            safety_margin: -0.5,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_config_from_json_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("transfer.json");
        std::fs::write(
            &path,
            r#"{ "conflict": "rename-unique", "verify": "sha512", "threads": 4 }"#,
        )
        .unwrap();

        let config = TransferConfig::from_json_file(&path).unwrap();
        assert_eq!(config.conflict, ConflictPolicy::RenameUnique);
        assert_eq!(config.verify, Some(HashAlgorithm::Sha512));
        assert_eq!(config.threads, 4);
        // Unspecified keys fall back to defaults
        assert!(config.preserve_metadata);
        assert_eq!(config.safety_margin, 0.1);
    }

    #[test]
    fn test_cli_flags_override_defaults() {
        let args = CliArgs::parse_from([
            "filekit",
            "copy",
            "/c/src",
            "/mnt/d/dst",
            "--conflict",
            "fail",
            "--verify",
            "md5",
            "--margin",
            "0.25",
            "-b",
            "64K",
            "--no-preserve",
        ]);

        let Commands::Copy(transfer) = args.command else {
            panic!("expected copy subcommand");
        };
        let config = TransferConfig::from_args(&transfer).unwrap();
        assert_eq!(config.conflict, ConflictPolicy::Fail);
        assert_eq!(config.verify, Some(HashAlgorithm::Md5));
        assert_eq!(config.safety_margin, 0.25);
        assert_eq!(config.buffer_size, 64 * 1024);
        assert!(!config.preserve_metadata);
        assert_eq!(transfer.source, "/c/src");
    }
}
