//! Cross-platform file metadata
//!
//! [`collect_file_metadata`] takes a snapshot of everything filekit knows how
//! to carry between files; [`MetadataApplier`] writes such a snapshot onto
//! another file, field by field, within what the destination supports.
//! Fields the destination cannot represent are approximated or skipped and
//! reported, never treated as errors.

use crate::error::{FilekitError, IoResultExt, Result};
use crate::path::{HostCapabilities, PlatformCapabilities};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, trace, warn};

/// Version of the [`FileMetadata`] field set
pub const METADATA_SCHEMA_VERSION: u32 = 1;

const FILE_ATTRIBUTE_READONLY: u32 = 0x1;

/// Fields carried by [`FileMetadata`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetadataField {
    /// Modification and access times
    Timestamps,
    /// Mode bits or read-only flag
    Permissions,
    /// Owner and group
    Ownership,
    /// Windows attribute word
    WindowsAttributes,
    /// Extended attributes
    ExtendedAttributes,
    /// Status change / creation time
    ChangeTime,
}

impl MetadataField {
    /// Every field, in application order
    pub const ALL: [MetadataField; 6] = [
        MetadataField::Ownership,
        MetadataField::ExtendedAttributes,
        MetadataField::Permissions,
        MetadataField::WindowsAttributes,
        MetadataField::Timestamps,
        MetadataField::ChangeTime,
    ];
}

impl fmt::Display for MetadataField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MetadataField::Timestamps => "timestamps",
            MetadataField::Permissions => "permissions",
            MetadataField::Ownership => "ownership",
            MetadataField::WindowsAttributes => "windows attributes",
            MetadataField::ExtendedAttributes => "extended attributes",
            MetadataField::ChangeTime => "change time",
        };
        f.write_str(name)
    }
}

/// Permission information
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionInfo {
    /// POSIX mode bits (`0o7777` mask); `None` when the source has none
    pub mode: Option<u32>,
    /// No write permission
    pub readonly: bool,
}

/// Owner and group ids
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ownership {
    /// User id
    pub uid: u32,
    /// Group id
    pub gid: u32,
}

/// Snapshot of a file's metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    /// Field set version, [`METADATA_SCHEMA_VERSION`] when collected
    pub schema_version: u32,
    /// Size in bytes
    pub size: u64,
    /// Last modification
    pub modified: Option<SystemTime>,
    /// Last access
    pub accessed: Option<SystemTime>,
    /// Status change on Unix, creation on Windows
    pub changed: Option<SystemTime>,
    /// Permission bits
    pub permissions: PermissionInfo,
    /// The path itself is a symbolic link
    pub is_symlink: bool,
    /// The path is a directory reparse-point link
    ///
    /// Set for NTFS junctions and for directory symlinks alike; the
    /// standard library does not expose the reparse tag that separates
    /// them. Always false off Windows.
    pub is_junction: bool,
    /// Link target, for symlinks and junctions
    pub symlink_target: Option<PathBuf>,
    /// Owner, on Unix
    pub ownership: Option<Ownership>,
    /// Attribute word, on Windows
    pub windows_attributes: Option<u32>,
    /// Extended attributes by name
    pub extended_attrs: BTreeMap<String, Vec<u8>>,
}

impl FileMetadata {
    /// Whether the snapshot carries a value for `field`
    pub fn has(&self, field: MetadataField) -> bool {
        match field {
            MetadataField::Timestamps => self.modified.is_some(),
            MetadataField::Permissions => true,
            MetadataField::Ownership => self.ownership.is_some(),
            MetadataField::WindowsAttributes => self.windows_attributes.is_some(),
            MetadataField::ExtendedAttributes => !self.extended_attrs.is_empty(),
            MetadataField::ChangeTime => self.changed.is_some(),
        }
    }
}

/// Snapshot metadata of `path` itself (links are not followed)
pub fn collect_file_metadata(path: &Path) -> Result<FileMetadata> {
    collect_file_metadata_with(path, false)
}

/// Snapshot metadata of `path`, following a final symlink when asked
pub fn collect_file_metadata_with(path: &Path, follow_symlinks: bool) -> Result<FileMetadata> {
    let link_meta = std::fs::symlink_metadata(path).with_path(path)?;
    let link_type = link_meta.file_type();
    let is_link = link_type.is_symlink();

    let meta = if is_link && follow_symlinks {
        std::fs::metadata(path).with_path(path)?
    } else {
        link_meta
    };
    let describes_link = is_link && !follow_symlinks;

    let symlink_target = if is_link {
        std::fs::read_link(path).ok()
    } else {
        None
    };

    let metadata = FileMetadata {
        schema_version: METADATA_SCHEMA_VERSION,
        size: meta.len(),
        modified: meta.modified().ok(),
        accessed: meta.accessed().ok(),
        changed: change_time(&meta),
        permissions: permission_info(&meta),
        is_symlink: is_link,
        is_junction: is_junction(&link_type),
        symlink_target,
        ownership: ownership(&meta),
        windows_attributes: windows_attributes(&meta),
        extended_attrs: read_xattrs(path, describes_link),
    };
    trace!("Collected metadata for {}: {:?}", path.display(), metadata);
    Ok(metadata)
}

#[cfg(unix)]
fn change_time(meta: &std::fs::Metadata) -> Option<SystemTime> {
    use std::os::unix::fs::MetadataExt;
    let secs = u64::try_from(meta.ctime()).ok()?;
    let nanos = u32::try_from(meta.ctime_nsec()).ok()?;
    SystemTime::UNIX_EPOCH.checked_add(std::time::Duration::new(secs, nanos))
}

#[cfg(not(unix))]
fn change_time(meta: &std::fs::Metadata) -> Option<SystemTime> {
    meta.created().ok()
}

#[cfg(unix)]
fn permission_info(meta: &std::fs::Metadata) -> PermissionInfo {
    use std::os::unix::fs::PermissionsExt;
    PermissionInfo {
        mode: Some(meta.permissions().mode() & 0o7777),
        readonly: meta.permissions().readonly(),
    }
}

#[cfg(not(unix))]
fn permission_info(meta: &std::fs::Metadata) -> PermissionInfo {
    PermissionInfo {
        mode: None,
        readonly: meta.permissions().readonly(),
    }
}

/// Directory reparse point with a name-surrogate tag (junction or directory symlink)
#[cfg(windows)]
fn is_junction(file_type: &std::fs::FileType) -> bool {
    use std::os::windows::fs::FileTypeExt;
    file_type.is_symlink_dir()
}

#[cfg(not(windows))]
fn is_junction(_file_type: &std::fs::FileType) -> bool {
    false
}

#[cfg(unix)]
fn ownership(meta: &std::fs::Metadata) -> Option<Ownership> {
    use std::os::unix::fs::MetadataExt;
    Some(Ownership {
        uid: meta.uid(),
        gid: meta.gid(),
    })
}

#[cfg(not(unix))]
fn ownership(_meta: &std::fs::Metadata) -> Option<Ownership> {
    None
}

#[cfg(windows)]
fn windows_attributes(meta: &std::fs::Metadata) -> Option<u32> {
    use std::os::windows::fs::MetadataExt;
    Some(meta.file_attributes())
}

#[cfg(not(windows))]
fn windows_attributes(_meta: &std::fs::Metadata) -> Option<u32> {
    None
}

#[cfg(unix)]
fn read_xattrs(path: &Path, on_link: bool) -> BTreeMap<String, Vec<u8>> {
    let mut attrs = BTreeMap::new();
    let names = if on_link {
        xattr::list(path)
    } else {
        xattr::list_deref(path)
    };
    let names = match names {
        Ok(names) => names,
        Err(e) => {
            debug!("Cannot list xattrs of {}: {}", path.display(), e);
            return attrs;
        }
    };

    for name in names {
        let value = if on_link {
            xattr::get(path, &name)
        } else {
            xattr::get_deref(path, &name)
        };
        if let Ok(Some(value)) = value {
            attrs.insert(name.to_string_lossy().to_string(), value);
        }
    }
    attrs
}

#[cfg(not(unix))]
fn read_xattrs(_path: &Path, _on_link: bool) -> BTreeMap<String, Vec<u8>> {
    BTreeMap::new()
}

/// Result of applying one field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum FieldOutcome {
    /// Written exactly
    Applied,
    /// Written in a reduced form
    Approximate(String),
    /// Not written because the destination cannot hold it
    Skipped(String),
    /// Writing was attempted and failed
    Failed(String),
    /// Nothing to write
    NotApplicable,
}

impl FieldOutcome {
    /// Whether this outcome deserves a warning
    pub fn is_warning(&self) -> bool {
        matches!(
            self,
            FieldOutcome::Approximate(_) | FieldOutcome::Skipped(_) | FieldOutcome::Failed(_)
        )
    }
}

/// Non-fatal problem met while applying metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetadataApplyWarning {
    /// File the metadata was applied to
    pub path: PathBuf,
    /// Affected field
    pub field: MetadataField,
    /// What happened
    pub outcome: FieldOutcome,
}

impl fmt::Display for MetadataApplyWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (kind, reason) = match &self.outcome {
            FieldOutcome::Approximate(r) => ("approximated", r.as_str()),
            FieldOutcome::Skipped(r) => ("skipped", r.as_str()),
            FieldOutcome::Failed(r) => ("failed", r.as_str()),
            FieldOutcome::Applied | FieldOutcome::NotApplicable => ("applied", ""),
        };
        write!(f, "{} {} on {}: {}", self.field, kind, self.path.display(), reason)
    }
}

/// Per-field outcomes of one apply
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppliedReport {
    path: PathBuf,
    outcomes: BTreeMap<MetadataField, FieldOutcome>,
}

impl AppliedReport {
    fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            outcomes: BTreeMap::new(),
        }
    }

    fn record(&mut self, field: MetadataField, outcome: FieldOutcome) {
        if outcome.is_warning() {
            warn!(
                "{}",
                MetadataApplyWarning {
                    path: self.path.clone(),
                    field,
                    outcome: outcome.clone(),
                }
            );
        }
        self.outcomes.insert(field, outcome);
    }

    /// File the report is about
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Outcome for `field`
    pub fn outcome(&self, field: MetadataField) -> Option<&FieldOutcome> {
        self.outcomes.get(&field)
    }

    /// All outcomes by field
    pub fn outcomes(&self) -> impl Iterator<Item = (MetadataField, &FieldOutcome)> {
        self.outcomes.iter().map(|(k, v)| (*k, v))
    }

    /// Approximations, skips and failures
    pub fn warnings(&self) -> Vec<MetadataApplyWarning> {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| outcome.is_warning())
            .map(|(field, outcome)| MetadataApplyWarning {
                path: self.path.clone(),
                field: *field,
                outcome: outcome.clone(),
            })
            .collect()
    }

    /// Every field was applied exactly or had nothing to apply
    pub fn is_exact(&self) -> bool {
        self.outcomes.values().all(|o| !o.is_warning())
    }
}

/// Writes [`FileMetadata`] onto files within a capability set
#[derive(Debug, Clone)]
pub struct MetadataApplier {
    caps: Arc<dyn PlatformCapabilities>,
    follow_symlinks: bool,
}

impl MetadataApplier {
    /// Applier for a destination with capabilities `caps`
    pub fn new(caps: Arc<dyn PlatformCapabilities>) -> Self {
        Self {
            caps,
            follow_symlinks: false,
        }
    }

    /// Apply through a final symlink instead of onto the link itself
    pub fn follow_symlinks(mut self, follow: bool) -> Self {
        self.follow_symlinks = follow;
        self
    }

    /// Apply `metadata` onto `path`
    ///
    /// Only a missing `path` is an error; every other problem is recorded
    /// in the report.
    pub fn apply(&self, path: &Path, metadata: &FileMetadata) -> Result<AppliedReport> {
        let target = std::fs::symlink_metadata(path).with_path(path)?;
        let on_link = target.file_type().is_symlink() && !self.follow_symlinks;
        let mut report = AppliedReport::new(path);

        for field in MetadataField::ALL {
            let outcome = if !metadata.has(field) {
                FieldOutcome::NotApplicable
            } else {
                match field {
                    MetadataField::Ownership => self.apply_ownership(path, metadata, on_link),
                    MetadataField::ExtendedAttributes => self.apply_xattrs(path, metadata, on_link),
                    MetadataField::Permissions => self.apply_permissions(path, metadata, on_link),
                    MetadataField::WindowsAttributes => self.apply_windows_attributes(metadata),
                    MetadataField::Timestamps => apply_timestamps(path, metadata, on_link),
                    MetadataField::ChangeTime => FieldOutcome::NotApplicable,
                }
            };
            report.record(field, outcome);
        }

        debug!(
            "Applied metadata to {} ({} warnings)",
            path.display(),
            report.warnings().len()
        );
        Ok(report)
    }

    #[cfg(unix)]
    fn apply_ownership(&self, path: &Path, metadata: &FileMetadata, on_link: bool) -> FieldOutcome {
        let Some(owner) = metadata.ownership else {
            return FieldOutcome::NotApplicable;
        };
        if !self.caps.supports_posix_permissions() {
            return FieldOutcome::Skipped("destination does not store ownership".to_string());
        }
        let result = if on_link {
            std::os::unix::fs::lchown(path, Some(owner.uid), Some(owner.gid))
        } else {
            std::os::unix::fs::chown(path, Some(owner.uid), Some(owner.gid))
        };
        match result {
            Ok(()) => FieldOutcome::Applied,
            Err(e) => FieldOutcome::Failed(format!("chown {}:{}: {}", owner.uid, owner.gid, e)),
        }
    }

    #[cfg(not(unix))]
    fn apply_ownership(&self, _path: &Path, _metadata: &FileMetadata, _on_link: bool) -> FieldOutcome {
        FieldOutcome::Skipped("ownership is not settable on this platform".to_string())
    }

    #[cfg(unix)]
    fn apply_xattrs(&self, path: &Path, metadata: &FileMetadata, on_link: bool) -> FieldOutcome {
        if !self.caps.supports_xattrs() {
            return FieldOutcome::Skipped("destination has no extended attributes".to_string());
        }
        let mut failed = Vec::new();
        for (name, value) in &metadata.extended_attrs {
            let result = if on_link {
                xattr::set(path, name, value)
            } else {
                xattr::set_deref(path, name, value)
            };
            if let Err(e) = result {
                failed.push(format!("{} ({})", name, e));
            }
        }
        if failed.is_empty() {
            FieldOutcome::Applied
        } else {
            FieldOutcome::Failed(failed.join(", "))
        }
    }

    #[cfg(not(unix))]
    fn apply_xattrs(&self, _path: &Path, _metadata: &FileMetadata, _on_link: bool) -> FieldOutcome {
        FieldOutcome::Skipped("extended attributes are not supported on this platform".to_string())
    }

    fn apply_permissions(&self, path: &Path, metadata: &FileMetadata, on_link: bool) -> FieldOutcome {
        if on_link {
            return FieldOutcome::Skipped("symlink modes are not settable".to_string());
        }
        let perms = metadata.permissions;

        match perms.mode {
            Some(mode) if self.caps.supports_posix_permissions() && cfg!(unix) => {
                match set_mode(path, mode) {
                    Ok(()) => FieldOutcome::Applied,
                    Err(e) => FieldOutcome::Failed(e.to_string()),
                }
            }
            Some(mode) => match set_readonly(path, perms.readonly) {
                Ok(()) => FieldOutcome::Approximate(format!(
                    "mode {:o} reduced to read-only={}",
                    mode, perms.readonly
                )),
                Err(e) => FieldOutcome::Failed(e.to_string()),
            },
            None => match set_readonly(path, perms.readonly) {
                Ok(()) if self.caps.supports_posix_permissions() => FieldOutcome::Approximate(
                    format!("read-only={} mapped onto write bits", perms.readonly),
                ),
                Ok(()) => FieldOutcome::Applied,
                Err(e) => FieldOutcome::Failed(e.to_string()),
            },
        }
    }

    fn apply_windows_attributes(&self, metadata: &FileMetadata) -> FieldOutcome {
        let Some(attrs) = metadata.windows_attributes else {
            return FieldOutcome::NotApplicable;
        };
        // The read-only bit travels with the permissions field
        if attrs & !FILE_ATTRIBUTE_READONLY == 0 {
            FieldOutcome::Applied
        } else if self.caps.platform().is_windows() {
            FieldOutcome::Approximate(format!(
                "only the read-only bit of {:#x} is applied",
                attrs
            ))
        } else {
            FieldOutcome::Skipped(format!(
                "attribute word {:#x} has no equivalent on {}",
                attrs,
                self.caps.platform()
            ))
        }
    }
}

fn apply_timestamps(path: &Path, metadata: &FileMetadata, on_link: bool) -> FieldOutcome {
    let Some(modified) = metadata.modified else {
        return FieldOutcome::NotApplicable;
    };
    let mtime = filetime::FileTime::from_system_time(modified);
    let atime = metadata
        .accessed
        .map(filetime::FileTime::from_system_time)
        .unwrap_or(mtime);

    let result = if on_link {
        filetime::set_symlink_file_times(path, atime, mtime)
    } else {
        filetime::set_file_times(path, atime, mtime)
    };
    match result {
        Ok(()) => FieldOutcome::Applied,
        Err(e) => FieldOutcome::Failed(e.to_string()),
    }
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> std::io::Result<()> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "mode bits are not settable on this platform",
    ))
}

/// Toggle write access, touching only the owner write bit when granting
#[cfg(unix)]
fn set_readonly(path: &Path, readonly: bool) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mode = std::fs::metadata(path)?.permissions().mode() & 0o7777;
    let mode = if readonly { mode & !0o222 } else { mode | 0o200 };
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_readonly(path: &Path, readonly: bool) -> std::io::Result<()> {
    let mut permissions = std::fs::metadata(path)?.permissions();
    permissions.set_readonly(readonly);
    std::fs::set_permissions(path, permissions)
}

/// Apply `metadata` onto `path` using the capabilities of its volume
pub fn apply_file_metadata(path: &Path, metadata: &FileMetadata) -> Result<AppliedReport> {
    if std::fs::symlink_metadata(path).is_err() {
        return Err(FilekitError::NotFound(path.to_path_buf()));
    }
    MetadataApplier::new(Arc::new(HostCapabilities::for_volume(path))).apply(path, metadata)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::StaticCapabilities;
    use std::fs;
    use tempfile::TempDir;

    fn past() -> SystemTime {
        SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(1_500_000_000)
    }

    fn file_with_times(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, b"metadata").unwrap();
        let ft = filetime::FileTime::from_system_time(past());
        filetime::set_file_times(&path, ft, ft).unwrap();
        path
    }

    #[test]
    fn test_collect_basic() {
        let dir = TempDir::new().unwrap();
        let path = file_with_times(dir.path(), "a.txt");

        let md = collect_file_metadata(&path).unwrap();
        assert_eq!(md.schema_version, METADATA_SCHEMA_VERSION);
        assert_eq!(md.size, 8);
        assert_eq!(md.modified, Some(past()));
        assert!(!md.is_symlink);
        assert!(!md.is_junction);
        assert!(md.symlink_target.is_none());
        #[cfg(unix)]
        {
            assert!(md.permissions.mode.is_some());
            assert!(md.ownership.is_some());
        }
    }

    #[test]
    fn test_collect_missing() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            collect_file_metadata(&dir.path().join("missing")),
            Err(FilekitError::NotFound(_))
        ));
        let md = collect_file_metadata(&file_with_times(dir.path(), "x")).unwrap();
        assert!(matches!(
            apply_file_metadata(&dir.path().join("missing"), &md),
            Err(FilekitError::NotFound(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_roundtrip_onto_posix() {
        use std::os::unix::fs::PermissionsExt;
        let dir = TempDir::new().unwrap();
        let src = file_with_times(dir.path(), "src");
        fs::set_permissions(&src, fs::Permissions::from_mode(0o640)).unwrap();
        let dst = dir.path().join("dst");
        fs::write(&dst, b"other").unwrap();

        let md = collect_file_metadata(&src).unwrap();
        let report = MetadataApplier::new(Arc::new(StaticCapabilities::posix()))
            .apply(&dst, &md)
            .unwrap();

        assert_eq!(report.outcome(MetadataField::Permissions), Some(&FieldOutcome::Applied));
        assert_eq!(report.outcome(MetadataField::Timestamps), Some(&FieldOutcome::Applied));
        assert_eq!(report.outcome(MetadataField::ChangeTime), Some(&FieldOutcome::NotApplicable));
        let applied = fs::metadata(&dst).unwrap();
        assert_eq!(applied.permissions().mode() & 0o7777, 0o640);
        assert_eq!(applied.modified().unwrap(), past());
    }

    #[cfg(unix)]
    #[test]
    fn test_capability_gap_is_approximate() {
        use std::os::unix::fs::PermissionsExt;
        let dir = TempDir::new().unwrap();
        let src = file_with_times(dir.path(), "src");
        fs::set_permissions(&src, fs::Permissions::from_mode(0o444)).unwrap();
        let dst = dir.path().join("dst");
        fs::write(&dst, b"other").unwrap();

        let md = collect_file_metadata(&src).unwrap();
        let report = MetadataApplier::new(Arc::new(StaticCapabilities::windows()))
            .apply(&dst, &md)
            .unwrap();

        assert!(matches!(
            report.outcome(MetadataField::Permissions),
            Some(FieldOutcome::Approximate(_))
        ));
        assert!(!report.is_exact());
        assert!(report
            .warnings()
            .iter()
            .any(|w| w.field == MetadataField::Permissions));
        assert!(fs::metadata(&dst).unwrap().permissions().readonly());
    }

    #[cfg(unix)]
    #[test]
    fn test_windows_sourced_metadata_onto_posix() {
        use std::os::unix::fs::PermissionsExt;
        let dir = TempDir::new().unwrap();
        let dst = dir.path().join("dst");
        fs::write(&dst, b"data").unwrap();
        fs::set_permissions(&dst, fs::Permissions::from_mode(0o664)).unwrap();

        let md = FileMetadata {
            schema_version: METADATA_SCHEMA_VERSION,
            size: 4,
            modified: Some(past()),
            accessed: None,
            changed: Some(past()),
            permissions: PermissionInfo {
                mode: None,
                readonly: true,
            },
            is_symlink: false,
            is_junction: false,
            symlink_target: None,
            ownership: None,
            windows_attributes: Some(0x21),
            extended_attrs: BTreeMap::new(),
        };
        let report = MetadataApplier::new(Arc::new(StaticCapabilities::posix()))
            .apply(&dst, &md)
            .unwrap();

        assert!(matches!(
            report.outcome(MetadataField::Permissions),
            Some(FieldOutcome::Approximate(_))
        ));
        assert!(matches!(
            report.outcome(MetadataField::WindowsAttributes),
            Some(FieldOutcome::Skipped(_))
        ));
        assert_eq!(report.outcome(MetadataField::Ownership), Some(&FieldOutcome::NotApplicable));
        assert_eq!(fs::metadata(&dst).unwrap().permissions().mode() & 0o777, 0o444);
    }

    #[cfg(unix)]
    #[test]
    fn test_directory_link_is_not_a_junction_off_windows() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("real")).unwrap();
        let link = dir.path().join("dir_link");
        std::os::unix::fs::symlink(dir.path().join("real"), &link).unwrap();

        let md = collect_file_metadata(&link).unwrap();
        assert!(md.is_symlink);
        assert!(!md.is_junction);
        assert_eq!(md.symlink_target.as_deref(), Some(dir.path().join("real").as_path()));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_itself() {
        let dir = TempDir::new().unwrap();
        let target = file_with_times(dir.path(), "target");
        let link = dir.path().join("link");
        std::os::unix::fs::symlink(&target, &link).unwrap();

        let md = collect_file_metadata(&link).unwrap();
        assert!(md.is_symlink);
        assert_eq!(md.symlink_target.as_deref(), Some(target.as_path()));

        let followed = collect_file_metadata_with(&link, true).unwrap();
        assert!(followed.is_symlink);
        assert_eq!(followed.size, 8);

        let other_link = dir.path().join("other");
        std::os::unix::fs::symlink(&target, &other_link).unwrap();
        let report = MetadataApplier::new(Arc::new(StaticCapabilities::posix()))
            .apply(&other_link, &md)
            .unwrap();
        assert!(matches!(
            report.outcome(MetadataField::Permissions),
            Some(FieldOutcome::Skipped(_))
        ));
        assert_eq!(
            fs::symlink_metadata(&other_link).unwrap().modified().unwrap(),
            md.modified.unwrap()
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_extended_attributes() {
        let dir = TempDir::new().unwrap();
        let src = file_with_times(dir.path(), "src");
        if xattr::set(&src, "user.filekit", b"value").is_err() {
            // Filesystem without user xattrs
            return;
        }
        let dst = dir.path().join("dst");
        fs::write(&dst, b"other").unwrap();

        let md = collect_file_metadata(&src).unwrap();
        assert_eq!(md.extended_attrs.get("user.filekit").map(Vec::as_slice), Some(&b"value"[..]));

        let report = MetadataApplier::new(Arc::new(StaticCapabilities::posix()))
            .apply(&dst, &md)
            .unwrap();
        assert!(!matches!(
            report.outcome(MetadataField::ExtendedAttributes),
            Some(FieldOutcome::Skipped(_))
        ));
        assert_eq!(xattr::get(&dst, "user.filekit").unwrap(), Some(b"value".to_vec()));

        let report = MetadataApplier::new(Arc::new(StaticCapabilities::windows()))
            .apply(&dst, &md)
            .unwrap();
        assert!(matches!(
            report.outcome(MetadataField::ExtendedAttributes),
            Some(FieldOutcome::Skipped(_))
        ));
    }
}
