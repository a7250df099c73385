//! File operations
//!
//! Streaming copy (optionally hashing the bytes as they pass), directory
//! structure creation, removal and symlink helpers.

use crate::error::{FilekitError, IoResultExt, Result};
use crate::path::resolve_within;
use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, trace, warn};

/// Copy operation statistics
#[derive(Debug, Clone, Default)]
pub struct CopyStats {
    /// Bytes copied
    pub bytes_copied: u64,
    /// Duration of the copy
    pub duration: std::time::Duration,
    /// Throughput in bytes/second
    pub throughput: f64,
}

impl CopyStats {
    /// Calculate throughput from bytes and duration
    pub fn calculate_throughput(&mut self) {
        if self.duration.as_secs_f64() > 0.0 {
            self.throughput = self.bytes_copied as f64 / self.duration.as_secs_f64();
        }
    }
}

/// Options for [`FileCopier`]
#[derive(Debug, Clone)]
pub struct CopyOptions {
    /// Read/write chunk size
    pub buffer_size: usize,
    /// Preallocate the destination to the source size
    pub preallocate: bool,
    /// fsync the destination before returning
    pub sync: bool,
}

impl Default for CopyOptions {
    fn default() -> Self {
        Self {
            buffer_size: crate::hash::DEFAULT_CHUNK_SIZE,
            preallocate: true,
            sync: false,
        }
    }
}

/// Trait for hash writers that can receive streaming data
pub trait HashWriter {
    /// Update the hash with more data
    fn update(&mut self, data: &[u8]);
}

/// Sink that discards everything
struct NoHash;

impl HashWriter for NoHash {
    fn update(&mut self, _data: &[u8]) {}
}

/// Streaming file copier
///
/// Content only: metadata is carried separately by
/// [`MetadataApplier`](crate::fs::MetadataApplier). Bytes go to a hidden
/// sibling of the destination which replaces it only once complete, so a
/// failed copy removes what it wrote and leaves an existing destination
/// untouched.
#[derive(Debug, Clone, Default)]
pub struct FileCopier {
    options: CopyOptions,
}

impl FileCopier {
    /// Create a new file copier with the given options
    pub fn new(options: CopyOptions) -> Self {
        Self { options }
    }

    /// Copier with a given chunk size and default options otherwise
    pub fn with_buffer_size(buffer_size: usize) -> Self {
        Self::new(CopyOptions {
            buffer_size: buffer_size.max(1),
            ..Default::default()
        })
    }

    /// Copy a file from source to destination
    pub fn copy(&self, source: &Path, dest: &Path) -> Result<CopyStats> {
        self.copy_with_hash(source, dest, &mut NoHash)
    }

    /// Copy a file, feeding every byte read from `source` to `hasher`
    pub fn copy_with_hash<H: HashWriter>(
        &self,
        source: &Path,
        dest: &Path,
        hasher: &mut H,
    ) -> Result<CopyStats> {
        let start = std::time::Instant::now();

        let src_meta = std::fs::metadata(source).with_path(source)?;
        if !src_meta.is_file() {
            return Err(FilekitError::NotAFile(source.to_path_buf()));
        }
        let src_file = File::open(source).with_path(source)?;

        if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).with_path(parent)?;
        }

        let (staging, dst_file) = create_staging(dest)?;
        let result = self
            .stream(source, src_file, src_meta.len(), dest, dst_file, hasher)
            .and_then(|bytes| {
                std::fs::rename(&staging, dest).with_path(dest)?;
                Ok(bytes)
            });
        let bytes_copied = match result {
            Ok(bytes) => bytes,
            Err(e) => {
                discard_partial(&staging);
                return Err(e);
            }
        };

        let mut stats = CopyStats {
            bytes_copied,
            duration: start.elapsed(),
            throughput: 0.0,
        };
        stats.calculate_throughput();
        trace!(
            "Copied {} -> {} ({} bytes)",
            source.display(),
            dest.display(),
            bytes_copied
        );
        Ok(stats)
    }

    fn stream<H: HashWriter>(
        &self,
        source: &Path,
        src_file: File,
        size: u64,
        dest: &Path,
        dst_file: File,
        hasher: &mut H,
    ) -> Result<u64> {
        if self.options.preallocate && size > 0 {
            let _ = dst_file.set_len(size);
        }

        let buffer_size = self.options.buffer_size.max(1);
        let mut reader = BufReader::with_capacity(buffer_size, src_file);
        let mut writer = BufWriter::with_capacity(buffer_size, dst_file);
        let mut buffer = vec![0u8; buffer_size];
        let mut bytes_copied = 0u64;

        loop {
            let bytes_read = match reader.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(FilekitError::io(source, e)),
            };

            hasher.update(&buffer[..bytes_read]);
            writer
                .write_all(&buffer[..bytes_read])
                .map_err(|e| FilekitError::io(dest, e))?;

            bytes_copied += bytes_read as u64;
        }

        let file = writer
            .into_inner()
            .map_err(|e| FilekitError::io(dest, e.into_error()))?;
        // The source may have shrunk since it was measured
        if bytes_copied < size {
            file.set_len(bytes_copied).with_path(dest)?;
        }
        if self.options.sync {
            file.sync_all().with_path(dest)?;
        }

        Ok(bytes_copied)
    }
}

/// Open a fresh hidden file next to `dest`
fn create_staging(dest: &Path) -> Result<(PathBuf, File)> {
    static NEXT: AtomicU64 = AtomicU64::new(0);

    let name = dest
        .file_name()
        .ok_or_else(|| FilekitError::NotAFile(dest.to_path_buf()))?
        .to_string_lossy();
    loop {
        let staging = dest.with_file_name(format!(
            ".{}.{}-{}.part",
            name,
            std::process::id(),
            NEXT.fetch_add(1, Ordering::Relaxed)
        ));
        match OpenOptions::new().write(true).create_new(true).open(&staging) {
            Ok(file) => return Ok((staging, file)),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(FilekitError::from_io(dest, e)),
        }
    }
}

/// Best-effort removal of a partially written file
pub(crate) fn discard_partial(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => debug!("Removed partial file {}", path.display()),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!("Cannot remove partial file {}: {}", path.display(), e),
    }
}

/// Create `dirs` (relative paths) under `dest`, parents before children
///
/// Returns how many directories did not exist before. A relative path that
/// escapes `dest` is rejected before anything is created.
pub fn create_directory_structure<P: AsRef<Path>>(dest: &Path, dirs: &[P]) -> Result<usize> {
    let mut targets = dirs
        .iter()
        .map(|dir| resolve_within(dest, &dir.as_ref().to_string_lossy()))
        .collect::<Result<Vec<_>>>()?;
    targets.sort_by_key(|p| p.components().count());
    targets.dedup();

    std::fs::create_dir_all(dest).with_path(dest)?;
    let mut created = 0;
    for target in targets {
        if !target.is_dir() {
            std::fs::create_dir_all(&target).with_path(&target)?;
            created += 1;
        }
    }
    debug!("Created {} directories under {}", created, dest.display());
    Ok(created)
}

/// Remove a file
///
/// A missing file counts as removed. With `force`, failures are logged and
/// swallowed. Returns whether something was deleted.
pub fn remove_file(path: &Path, force: bool) -> Result<bool> {
    let metadata = match std::fs::symlink_metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!("File already absent: {}", path.display());
            return Ok(false);
        }
        Err(e) => return forced(force, FilekitError::from_io(path, e)),
    };
    if metadata.is_dir() {
        return forced(force, FilekitError::NotAFile(path.to_path_buf()));
    }
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) => forced(force, FilekitError::from_io(path, e)),
    }
}

/// Remove a directory, its contents too when `recursive`
///
/// A missing directory counts as removed. With `force`, failures are
/// logged and swallowed.
pub fn remove_directory(path: &Path, recursive: bool, force: bool) -> Result<bool> {
    let metadata = match std::fs::symlink_metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!("Directory already absent: {}", path.display());
            return Ok(false);
        }
        Err(e) => return forced(force, FilekitError::from_io(path, e)),
    };
    if !metadata.is_dir() {
        return forced(
            force,
            FilekitError::config(format!("not a directory: {}", path.display())),
        );
    }
    let result = if recursive {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_dir(path)
    };
    match result {
        Ok(()) => Ok(true),
        Err(e) => forced(force, FilekitError::from_io(path, e)),
    }
}

fn forced(force: bool, err: FilekitError) -> Result<bool> {
    if force {
        warn!("Ignoring error (forced): {}", err);
        Ok(false)
    } else {
        Err(err)
    }
}

/// Create a symlink at `link` pointing to `target`
///
/// An existing entry at `link` is replaced only with `force`.
pub fn create_symlink(target: &Path, link: &Path, force: bool) -> Result<()> {
    if let Ok(existing) = std::fs::symlink_metadata(link) {
        if !force {
            return Err(FilekitError::DestinationExists(link.to_path_buf()));
        }
        if existing.is_dir() {
            std::fs::remove_dir_all(link).with_path(link)?;
        } else {
            std::fs::remove_file(link).with_path(link)?;
        }
        debug!("Replaced existing entry at {}", link.display());
    }
    if let Some(parent) = link.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).with_path(parent)?;
    }
    symlink(target, link).with_path(link)?;
    debug!("Created symlink {} -> {}", link.display(), target.display());
    Ok(())
}

#[cfg(unix)]
fn symlink(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn symlink(target: &Path, link: &Path) -> std::io::Result<()> {
    let resolved = link.parent().map(|p| p.join(target)).unwrap_or_else(|| target.to_path_buf());
    if resolved.is_dir() {
        std::os::windows::fs::symlink_dir(target, link)
    } else {
        std::os::windows::fs::symlink_file(target, link)
    }
}

#[cfg(not(any(unix, windows)))]
fn symlink(_target: &Path, _link: &Path) -> std::io::Result<()> {
    Err(std::io::Error::new(
        ErrorKind::Unsupported,
        "symlinks are not supported on this platform",
    ))
}

/// `path` expressed relative to `base`
///
/// Both are compared lexically; `..` segments are emitted when `path` is
/// not under `base`. Fails when one is absolute and the other is not.
pub fn get_relative_path(path: &Path, base: &Path) -> Result<PathBuf> {
    if path.is_absolute() != base.is_absolute() {
        return Err(FilekitError::config(format!(
            "cannot relate {} to {}",
            path.display(),
            base.display()
        )));
    }
    let path: Vec<Component> = path.components().filter(|c| *c != Component::CurDir).collect();
    let base: Vec<Component> = base.components().filter(|c| *c != Component::CurDir).collect();

    let common = path
        .iter()
        .zip(base.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut relative = PathBuf::new();
    for _ in common..base.len() {
        relative.push("..");
    }
    for component in &path[common..] {
        relative.push(component.as_os_str());
    }
    if relative.as_os_str().is_empty() {
        relative.push(".");
    }
    Ok(relative)
}

/// Whether `a` and `b` name the same file on disk
///
/// False when either does not exist.
pub fn is_same_file(a: &Path, b: &Path) -> bool {
    match (std::fs::metadata(a), std::fs::metadata(b)) {
        (Ok(ma), Ok(mb)) => same_inode(a, &ma, b, &mb),
        _ => false,
    }
}

#[cfg(unix)]
fn same_inode(_a: &Path, ma: &std::fs::Metadata, _b: &Path, mb: &std::fs::Metadata) -> bool {
    use std::os::unix::fs::MetadataExt;
    ma.dev() == mb.dev() && ma.ino() == mb.ino()
}

#[cfg(not(unix))]
fn same_inode(a: &Path, _ma: &std::fs::Metadata, b: &Path, _mb: &std::fs::Metadata) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(ca), Ok(cb)) => ca == cb,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HashAlgorithm;
    use crate::hash::{hash_bytes, Hasher};
    use std::fs;
    use tempfile::TempDir;

    fn create_test_file(dir: &Path, name: &str, size: usize) -> PathBuf {
        let path = dir.join(name);
        let data: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
        fs::write(&path, data).unwrap();
        path
    }

    #[test]
    fn test_copy_small_file() {
        let temp = TempDir::new().unwrap();
        let src = create_test_file(temp.path(), "source.txt", 1000);
        let dst = temp.path().join("dest.txt");

        let stats = FileCopier::default().copy(&src, &dst).unwrap();
        assert_eq!(stats.bytes_copied, 1000);
        assert_eq!(fs::read(&src).unwrap(), fs::read(&dst).unwrap());
    }

    #[test]
    fn test_copy_with_hash_matches_content() {
        let temp = TempDir::new().unwrap();
        let src = create_test_file(temp.path(), "big.bin", 300_000);
        let dst = temp.path().join("out/big.bin");

        let mut hasher = Hasher::new(HashAlgorithm::Sha256);
        let stats = FileCopier::with_buffer_size(4096)
            .copy_with_hash(&src, &dst, &mut hasher)
            .unwrap();

        assert_eq!(stats.bytes_copied, 300_000);
        let data = fs::read(&dst).unwrap();
        assert_eq!(hasher.finalize(), hash_bytes(&data, HashAlgorithm::Sha256).hash);
    }

    #[test]
    fn test_copy_empty_file_and_overwrite() {
        let temp = TempDir::new().unwrap();
        let src = create_test_file(temp.path(), "empty", 0);
        let dst = create_test_file(temp.path(), "existing", 500);

        let stats = FileCopier::default().copy(&src, &dst).unwrap();
        assert_eq!(stats.bytes_copied, 0);
        assert_eq!(fs::metadata(&dst).unwrap().len(), 0);
    }

    fn leftovers(dir: &Path) -> Vec<String> {
        fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .filter(|name| name.ends_with(".part"))
            .collect()
    }

    #[test]
    fn test_copy_replaces_through_staging_file() {
        let temp = TempDir::new().unwrap();
        let src = create_test_file(temp.path(), "new.bin", 2048);
        let dst = temp.path().join("old.bin");
        fs::write(&dst, "previous").unwrap();

        FileCopier::default().copy(&src, &dst).unwrap();
        assert_eq!(fs::read(&dst).unwrap(), fs::read(&src).unwrap());
        assert!(leftovers(temp.path()).is_empty());
    }

    #[test]
    fn test_failed_rename_keeps_destination() {
        let temp = TempDir::new().unwrap();
        let src = create_test_file(temp.path(), "src.bin", 100);
        let dst = temp.path().join("occupied");
        fs::create_dir(&dst).unwrap();
        fs::write(dst.join("keep.txt"), "keep").unwrap();

        assert!(FileCopier::default().copy(&src, &dst).is_err());
        assert_eq!(fs::read_to_string(dst.join("keep.txt")).unwrap(), "keep");
        assert!(leftovers(temp.path()).is_empty());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_failed_read_keeps_existing_destination() {
        use std::io::Read;

        // Reading address zero of our own memory fails with EIO
        let mem = Path::new("/proc/self/mem");
        let mut buf = [0u8; 1];
        if fs::File::open(mem).and_then(|mut f| f.read(&mut buf)).is_ok() {
            return;
        }

        let temp = TempDir::new().unwrap();
        let dst = temp.path().join("precious.txt");
        fs::write(&dst, "do not lose me").unwrap();

        assert!(FileCopier::default().copy(mem, &dst).is_err());
        assert_eq!(fs::read_to_string(&dst).unwrap(), "do not lose me");
        assert!(leftovers(temp.path()).is_empty());
    }

    #[test]
    fn test_copy_rejects_directory_source() {
        let temp = TempDir::new().unwrap();
        let dst = temp.path().join("dst");
        assert!(matches!(
            FileCopier::default().copy(temp.path(), &dst),
            Err(FilekitError::NotAFile(_))
        ));
        assert!(matches!(
            FileCopier::default().copy(&temp.path().join("missing"), &dst),
            Err(FilekitError::NotFound(_))
        ));
        assert!(!dst.exists());
    }

    #[test]
    fn test_create_directory_structure() {
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("tree");

        let created =
            create_directory_structure(&dest, &["a/b/c", "a", "x", "a/b/c"]).unwrap();
        assert_eq!(created, 3);
        assert!(dest.join("a/b/c").is_dir());
        assert!(dest.join("x").is_dir());
        assert_eq!(create_directory_structure(&dest, &["a/b"]).unwrap(), 0);

        assert!(matches!(
            create_directory_structure(&dest, &["../escape"]),
            Err(FilekitError::PathTraversal { .. })
        ));
        assert!(!temp.path().join("escape").exists());
    }

    #[test]
    fn test_remove_helpers() {
        let temp = TempDir::new().unwrap();
        let file = create_test_file(temp.path(), "f", 10);
        assert!(remove_file(&file, false).unwrap());
        assert!(!remove_file(&file, false).unwrap());

        let dir = temp.path().join("d");
        fs::create_dir_all(dir.join("inner")).unwrap();
        create_test_file(&dir, "g", 1);

        assert!(matches!(remove_file(&dir, false), Err(FilekitError::NotAFile(_))));
        assert!(!remove_file(&dir, true).unwrap());
        assert!(remove_directory(&dir, false, false).is_err());
        assert!(!remove_directory(&dir, false, true).unwrap());
        assert!(dir.exists());
        assert!(remove_directory(&dir, true, false).unwrap());
        assert!(!remove_directory(&dir, true, false).unwrap());
    }

    #[cfg(unix)]
    #[test]
    fn test_create_symlink() {
        let temp = TempDir::new().unwrap();
        let target = create_test_file(temp.path(), "target", 4);
        let link = temp.path().join("links/link");

        create_symlink(&target, &link, false).unwrap();
        assert_eq!(fs::read_link(&link).unwrap(), target);

        assert!(matches!(
            create_symlink(&target, &link, false),
            Err(FilekitError::DestinationExists(_))
        ));
        let other = create_test_file(temp.path(), "other", 2);
        create_symlink(&other, &link, true).unwrap();
        assert_eq!(fs::read_link(&link).unwrap(), other);
    }

    #[test]
    fn test_get_relative_path() {
        let rel = get_relative_path(
            Path::new("/home/user/project/src/main.rs"),
            Path::new("/home/user/project"),
        )
        .unwrap();
        assert_eq!(rel, Path::new("src").join("main.rs"));

        let rel =
            get_relative_path(Path::new("/home/user/other"), Path::new("/home/user/project/src"))
                .unwrap();
        assert_eq!(rel, Path::new("../../other"));

        assert_eq!(
            get_relative_path(Path::new("/a/b"), Path::new("/a/b")).unwrap(),
            Path::new(".")
        );
        assert!(get_relative_path(Path::new("rel"), Path::new("/abs")).is_err());
    }

    #[test]
    fn test_is_same_file() {
        let temp = TempDir::new().unwrap();
        let a = create_test_file(temp.path(), "a", 1);
        let b = create_test_file(temp.path(), "b", 1);

        assert!(is_same_file(&a, &a));
        assert!(is_same_file(&a, &temp.path().join("./a")));
        assert!(!is_same_file(&a, &b));
        assert!(!is_same_file(&a, &temp.path().join("missing")));
    }
}
