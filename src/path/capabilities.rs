//! Platform capability abstraction
//!
//! Everything that depends on what the host or a destination volume can
//! do (UNC access, extended attributes, POSIX mode bits, symlinks, case
//! sensitivity, drive mappings) is answered through [`PlatformCapabilities`]
//! so the rest of the crate never branches on `cfg!` directly.

use crate::system::disk::volume_info;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Operating system family whose path rules apply
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// Windows (NTFS/FAT naming rules)
    #[value(name = "windows")]
    Windows,
    /// Linux and other POSIX systems
    #[value(name = "linux")]
    Linux,
    /// macOS (POSIX plus HFS+/APFS colon rule)
    #[value(name = "macos")]
    MacOs,
}

impl Platform {
    /// Platform the crate was compiled for
    pub fn host() -> Self {
        if cfg!(windows) {
            Self::Windows
        } else if cfg!(target_os = "macos") {
            Self::MacOs
        } else {
            Self::Linux
        }
    }

    /// Whether Windows naming rules apply
    pub fn is_windows(&self) -> bool {
        matches!(self, Self::Windows)
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Windows => f.write_str("windows"),
            Self::Linux => f.write_str("linux"),
            Self::MacOs => f.write_str("macos"),
        }
    }
}

/// Capability queries for a platform or destination volume
pub trait PlatformCapabilities: Send + Sync + std::fmt::Debug {
    /// Platform whose naming rules apply
    fn platform(&self) -> Platform;

    /// UNC paths can be opened directly
    fn supports_unc(&self) -> bool;

    /// Extended attributes can be read and written
    fn supports_xattrs(&self) -> bool;

    /// Full POSIX mode bits are stored
    fn supports_posix_permissions(&self) -> bool;

    /// Symbolic links can be created
    fn supports_symlinks(&self) -> bool;

    /// File names are compared case-sensitively
    fn case_sensitive(&self) -> bool;

    /// UNC target (`\\server\share`) of a network-mapped drive letter
    fn mapped_drive_target(&self, _letter: char) -> Option<String> {
        None
    }

    /// Local target of a `subst`-ed drive letter
    fn substituted_drive_target(&self, _letter: char) -> Option<PathBuf> {
        None
    }
}

/// Capabilities probed from the running host
///
/// When built with [`HostCapabilities::for_volume`], flags are narrowed by
/// the destination's filesystem type: FAT and exFAT volumes store neither
/// POSIX modes nor extended attributes, NTFS mounted on a POSIX host keeps
/// no mode bits.
#[derive(Debug, Clone)]
pub struct HostCapabilities {
    platform: Platform,
    xattrs: bool,
    posix_permissions: bool,
    symlinks: bool,
    case_sensitive: bool,
    file_system: Option<String>,
}

impl HostCapabilities {
    /// Capabilities of the host itself
    pub fn new() -> Self {
        let platform = Platform::host();
        Self {
            platform,
            xattrs: cfg!(unix),
            posix_permissions: cfg!(unix),
            symlinks: cfg!(unix) || cfg!(windows),
            case_sensitive: platform == Platform::Linux,
            file_system: None,
        }
    }

    /// Capabilities of the volume holding `path`
    pub fn for_volume(path: &Path) -> Self {
        let mut caps = Self::new();
        if let Some(volume) = volume_info(path) {
            let fs = volume.file_system.to_ascii_lowercase();
            match fs.as_str() {
                "vfat" | "fat" | "fat32" | "msdos" | "exfat" => {
                    caps.posix_permissions = false;
                    caps.xattrs = false;
                    caps.symlinks = false;
                    caps.case_sensitive = false;
                }
                "ntfs" | "ntfs3" | "fuseblk" => {
                    caps.posix_permissions = false;
                    caps.case_sensitive = false;
                }
                _ => {}
            }
            debug!(
                "Volume {} ({}) posix={} xattrs={}",
                volume.mount_point.display(),
                volume.file_system,
                caps.posix_permissions,
                caps.xattrs
            );
            caps.file_system = Some(volume.file_system);
        }
        caps
    }

    /// Filesystem type of the probed volume, if any
    pub fn file_system(&self) -> Option<&str> {
        self.file_system.as_deref()
    }
}

impl Default for HostCapabilities {
    fn default() -> Self {
        Self::new()
    }
}

impl PlatformCapabilities for HostCapabilities {
    fn platform(&self) -> Platform {
        self.platform
    }

    fn supports_unc(&self) -> bool {
        self.platform.is_windows()
    }

    fn supports_xattrs(&self) -> bool {
        self.xattrs
    }

    fn supports_posix_permissions(&self) -> bool {
        self.posix_permissions
    }

    fn supports_symlinks(&self) -> bool {
        self.symlinks
    }

    fn case_sensitive(&self) -> bool {
        self.case_sensitive
    }
}

/// Fixed capability set, for callers that already know the target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticCapabilities {
    /// Platform whose naming rules apply
    pub platform: Platform,
    /// UNC paths can be opened
    pub unc: bool,
    /// Extended attributes are supported
    pub xattrs: bool,
    /// POSIX mode bits are stored
    pub posix_permissions: bool,
    /// Symlinks can be created
    pub symlinks: bool,
    /// Names compare case-sensitively
    pub case_sensitive: bool,
    /// Drive letter to UNC share
    pub mapped_drives: BTreeMap<char, String>,
    /// Drive letter to substituted local directory
    pub substituted_drives: BTreeMap<char, PathBuf>,
}

impl StaticCapabilities {
    /// Typical Linux volume
    pub fn posix() -> Self {
        Self {
            platform: Platform::Linux,
            unc: false,
            xattrs: true,
            posix_permissions: true,
            symlinks: true,
            case_sensitive: true,
            mapped_drives: BTreeMap::new(),
            substituted_drives: BTreeMap::new(),
        }
    }

    /// Typical macOS volume (case-insensitive APFS)
    pub fn macos() -> Self {
        Self {
            platform: Platform::MacOs,
            case_sensitive: false,
            ..Self::posix()
        }
    }

    /// Typical Windows NTFS volume
    pub fn windows() -> Self {
        Self {
            platform: Platform::Windows,
            unc: true,
            xattrs: false,
            posix_permissions: false,
            symlinks: true,
            case_sensitive: false,
            mapped_drives: BTreeMap::new(),
            substituted_drives: BTreeMap::new(),
        }
    }

    /// Register a network-mapped drive
    pub fn with_mapped_drive(mut self, letter: char, unc_target: impl Into<String>) -> Self {
        self.mapped_drives
            .insert(letter.to_ascii_uppercase(), unc_target.into());
        self
    }

    /// Register a substituted drive
    pub fn with_substituted_drive(mut self, letter: char, target: impl Into<PathBuf>) -> Self {
        self.substituted_drives
            .insert(letter.to_ascii_uppercase(), target.into());
        self
    }
}

impl PlatformCapabilities for StaticCapabilities {
    fn platform(&self) -> Platform {
        self.platform
    }

    fn supports_unc(&self) -> bool {
        self.unc
    }

    fn supports_xattrs(&self) -> bool {
        self.xattrs
    }

    fn supports_posix_permissions(&self) -> bool {
        self.posix_permissions
    }

    fn supports_symlinks(&self) -> bool {
        self.symlinks
    }

    fn case_sensitive(&self) -> bool {
        self.case_sensitive
    }

    fn mapped_drive_target(&self, letter: char) -> Option<String> {
        self.mapped_drives
            .get(&letter.to_ascii_uppercase())
            .cloned()
    }

    fn substituted_drive_target(&self, letter: char) -> Option<PathBuf> {
        self.substituted_drives
            .get(&letter.to_ascii_uppercase())
            .cloned()
    }
}
