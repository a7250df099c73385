//! Disk space preflight
//!
//! Answers "is there room for this transfer at the destination" before any
//! byte is written. Usage comes from `statvfs` on Unix and from `sysinfo`'s
//! mount table elsewhere.

use crate::error::{FilekitError, Result};
use humansize::{format_size, BINARY};
use serde::Serialize;
use std::path::{Path, PathBuf};
use sysinfo::Disks;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Capacity figures for a volume, in bytes
///
/// `used + free` need not equal `total`: POSIX filesystems reserve blocks
/// for the superuser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DiskUsage {
    /// Volume size
    pub total: u64,
    /// Bytes in use
    pub used: u64,
    /// Bytes available to unprivileged writers
    pub free: u64,
}

impl DiskUsage {
    /// Percentage of the volume in use
    pub fn used_percent(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.used as f64 / self.total as f64 * 100.0
        }
    }

    /// Percentage of the volume free
    pub fn free_percent(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.free as f64 / self.total as f64 * 100.0
        }
    }
}

/// Mounted volume holding a path
#[derive(Debug, Clone, Serialize)]
pub struct VolumeInfo {
    /// Mount point
    pub mount_point: PathBuf,
    /// Filesystem type as reported by the OS (e.g. `ext4`, `ntfs`)
    pub file_system: String,
    /// Removable media
    pub is_removable: bool,
    /// Volume size
    pub total: u64,
    /// Available bytes
    pub available: u64,
}

/// Outcome of a space check
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpaceCheck {
    /// Enough room for the transfer plus margin
    pub has_space: bool,
    /// Bytes required, margin included
    pub required: u64,
    /// Bytes available at the destination
    pub available: u64,
    /// Human-readable summary
    pub message: String,
}

impl SpaceCheck {
    /// Bytes missing, zero when there is room
    pub fn shortfall(&self) -> u64 {
        self.required.saturating_sub(self.available)
    }
}

/// Nearest existing ancestor of `path` (itself included)
fn existing_ancestor(path: &Path) -> Option<&Path> {
    path.ancestors()
        .find(|p| !p.as_os_str().is_empty() && p.exists())
        .or_else(|| path.is_relative().then_some(Path::new(".")))
}

/// Usage of the volume containing `path`
///
/// A path that does not exist yet is measured at its nearest existing
/// ancestor.
pub fn get_disk_usage(path: &Path) -> Result<DiskUsage> {
    let existing = existing_ancestor(path).ok_or_else(|| FilekitError::NotFound(path.to_path_buf()))?;
    debug!("Measuring disk usage at {}", existing.display());
    usage_at(existing)
}

#[cfg(unix)]
fn usage_at(path: &Path) -> Result<DiskUsage> {
    let stat = nix::sys::statvfs::statvfs(path)
        .map_err(|errno| FilekitError::from_io(path, std::io::Error::from(errno)))?;

    let fragment = stat.fragment_size() as u64;
    let blocks = stat.blocks() as u64;
    Ok(DiskUsage {
        total: blocks * fragment,
        used: blocks.saturating_sub(stat.blocks_free() as u64) * fragment,
        free: stat.blocks_available() as u64 * fragment,
    })
}

#[cfg(not(unix))]
fn usage_at(path: &Path) -> Result<DiskUsage> {
    let volume = volume_info(path).ok_or_else(|| FilekitError::NotFound(path.to_path_buf()))?;
    Ok(DiskUsage {
        total: volume.total,
        used: volume.total.saturating_sub(volume.available),
        free: volume.available,
    })
}

/// Volume whose mount point is the longest prefix of `path`
pub fn volume_info(path: &Path) -> Option<VolumeInfo> {
    let existing = existing_ancestor(path)?;
    let resolved = existing.canonicalize().ok()?;

    let disks = Disks::new_with_refreshed_list();
    disks
        .iter()
        .filter(|disk| resolved.starts_with(disk.mount_point()))
        .max_by_key(|disk| disk.mount_point().as_os_str().len())
        .map(|disk| VolumeInfo {
            mount_point: disk.mount_point().to_path_buf(),
            file_system: disk.file_system().to_string_lossy().to_string(),
            is_removable: disk.is_removable(),
            total: disk.total_space(),
            available: disk.available_space(),
        })
}

/// Total size of regular files under `paths`
///
/// Directories are walked recursively. Missing paths and unreadable
/// entries are logged and skipped; symlink loops are reported by the
/// walker and skipped too.
pub fn calculate_total_size<P: AsRef<Path>>(paths: &[P], follow_symlinks: bool) -> u64 {
    let mut total = 0u64;

    for path in paths {
        let path = path.as_ref();
        if path.symlink_metadata().is_err() {
            warn!("Path does not exist, skipping: {}", path.display());
            continue;
        }

        for entry in WalkDir::new(path).follow_links(follow_symlinks) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Cannot size entry under {}: {}", path.display(), e);
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            match entry.metadata() {
                Ok(metadata) => total += metadata.len(),
                Err(e) => warn!("Cannot get size of {}: {}", entry.path().display(), e),
            }
        }
    }

    total
}

fn validate_margin(margin: f64) -> Result<()> {
    if margin.is_finite() && margin >= 0.0 {
        Ok(())
    } else {
        Err(FilekitError::config(format!(
            "safety margin must be a non-negative number, got {}",
            margin
        )))
    }
}

/// Decide whether `available` covers `required` plus `margin`
///
/// `margin` is a fraction (0.1 = 10% extra) and must already be validated.
pub fn evaluate_space(required: u64, available: u64, margin: f64) -> SpaceCheck {
    let margin_bytes = (required as f64 * margin) as u64;
    let with_margin = required.saturating_add(margin_bytes);

    if available >= with_margin {
        SpaceCheck {
            has_space: true,
            required: with_margin,
            available,
            message: format!(
                "Sufficient space: {} available, {} required ({} + {:.0}% margin)",
                format_size(available, BINARY),
                format_size(with_margin, BINARY),
                format_size(required, BINARY),
                margin * 100.0
            ),
        }
    } else {
        SpaceCheck {
            has_space: false,
            required: with_margin,
            available,
            message: format!(
                "Insufficient space: {} available, {} required. Need {} more.",
                format_size(available, BINARY),
                format_size(with_margin, BINARY),
                format_size(with_margin - available, BINARY)
            ),
        }
    }
}

/// Check room for `required` bytes at `dest`
pub fn check_disk_space(dest: &Path, required: u64, margin: f64) -> Result<SpaceCheck> {
    validate_margin(margin)?;
    let usage = get_disk_usage(dest)?;
    let check = evaluate_space(required, usage.free, margin);
    debug!("{}", check.message);
    Ok(check)
}

/// Check room at `dest` for everything under `sources`
///
/// Sizes are counted the way the transfer will read them: through links
/// when `follow_symlinks` is set. Fails with
/// [`FilekitError::InsufficientSpace`] when the destination is too small.
pub fn ensure_disk_space<P: AsRef<Path>>(
    dest: &Path,
    sources: &[P],
    margin: f64,
    follow_symlinks: bool,
) -> Result<SpaceCheck> {
    validate_margin(margin)?;
    let total = calculate_total_size(sources, follow_symlinks);
    let check = check_disk_space(dest, total, margin)?;
    if !check.has_space {
        warn!("{}", check.message);
        return Err(FilekitError::InsufficientSpace {
            path: dest.to_path_buf(),
            required: check.required,
            available: check.available,
        });
    }
    Ok(check)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_evaluate_space_with_margin() {
        let check = evaluate_space(950_000_000, 1_000_000_000, 0.1);
        assert!(!check.has_space);
        assert_eq!(check.required, 1_045_000_000);
        assert_eq!(check.shortfall(), 45_000_000);
        assert!(check.message.starts_with("Insufficient space"));

        let check = evaluate_space(900_000_000, 1_000_000_000, 0.1);
        assert!(check.has_space);
        assert_eq!(check.required, 990_000_000);
        assert_eq!(check.shortfall(), 0);
        assert!(check.message.contains("10% margin"));

        // Exactly enough counts as enough
        assert!(evaluate_space(1000, 1100, 0.1).has_space);
        assert!(evaluate_space(0, 0, 0.5).has_space);
    }

    #[test]
    fn test_usage_percentages() {
        let usage = DiskUsage {
            total: 200,
            used: 50,
            free: 140,
        };
        assert_eq!(usage.used_percent(), 25.0);
        assert_eq!(usage.free_percent(), 70.0);

        let empty = DiskUsage {
            total: 0,
            used: 0,
            free: 0,
        };
        assert_eq!(empty.used_percent(), 0.0);
        assert_eq!(empty.free_percent(), 0.0);
    }

    #[test]
    fn test_get_disk_usage_walks_up() {
        let dir = TempDir::new().unwrap();
        let existing = get_disk_usage(dir.path()).unwrap();
        assert!(existing.total > 0);

        let missing = get_disk_usage(&dir.path().join("not/yet/created")).unwrap();
        assert_eq!(missing.total, existing.total);
    }

    #[test]
    fn test_check_disk_space_rejects_bad_margin() {
        let dir = TempDir::new().unwrap();
        for margin in [-0.1, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                check_disk_space(dir.path(), 10, margin),
                Err(FilekitError::Config(_))
            ));
        }
        assert!(check_disk_space(dir.path(), 0, 0.0).unwrap().has_space);
    }

    #[test]
    fn test_calculate_total_size() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.bin"), vec![0u8; 100]).unwrap();
        fs::create_dir_all(dir.path().join("sub/deeper")).unwrap();
        fs::write(dir.path().join("sub/b.bin"), vec![0u8; 50]).unwrap();
        fs::write(dir.path().join("sub/deeper/c.bin"), vec![0u8; 25]).unwrap();

        let missing = dir.path().join("missing");
        let total = calculate_total_size(&[dir.path().to_path_buf(), missing], false);
        assert_eq!(total, 175);

        let single = calculate_total_size(&[dir.path().join("a.bin")], false);
        assert_eq!(single, 100);
    }

    #[cfg(unix)]
    #[test]
    fn test_calculate_total_size_symlinks() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("data")).unwrap();
        fs::write(dir.path().join("data/file.bin"), vec![0u8; 64]).unwrap();
        std::os::unix::fs::symlink(dir.path().join("data"), dir.path().join("data/loop"))
            .unwrap();
        std::os::unix::fs::symlink(
            dir.path().join("data/file.bin"),
            dir.path().join("data/link.bin"),
        )
        .unwrap();

        assert_eq!(calculate_total_size(&[dir.path().join("data")], false), 64);
        // Following links counts the file link once more; the loop is skipped
        assert_eq!(calculate_total_size(&[dir.path().join("data")], true), 128);
    }

    #[test]
    fn test_ensure_disk_space() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        fs::write(src.path().join("f"), vec![1u8; 1024]).unwrap();

        let check = ensure_disk_space(dst.path(), &[src.path()], 0.1, false).unwrap();
        assert!(check.has_space);
        assert_eq!(check.required, 1024 + 102);
    }

    #[cfg(unix)]
    #[test]
    fn test_ensure_disk_space_counts_followed_links() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        fs::write(src.path().join("target.bin"), vec![1u8; 1000]).unwrap();
        let link = src.path().join("link.bin");
        std::os::unix::fs::symlink(src.path().join("target.bin"), &link).unwrap();

        let as_link = ensure_disk_space(dst.path(), &[&link], 0.0, false).unwrap();
        assert_eq!(as_link.required, 0);
        let followed = ensure_disk_space(dst.path(), &[&link], 0.0, true).unwrap();
        assert_eq!(followed.required, 1000);
    }

    #[test]
    fn test_volume_info() {
        let dir = TempDir::new().unwrap();
        if let Some(volume) = volume_info(dir.path()) {
            assert!(dir.path().canonicalize().unwrap().starts_with(&volume.mount_point));
        }
    }
}
