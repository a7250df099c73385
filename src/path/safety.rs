//! Path validation, traversal-checked resolution and unique naming

use super::capabilities::Platform;
use super::dialect::{PathSpec, Root};
use crate::error::{FilekitError, Result};
use std::path::{Path, PathBuf};

/// Upper bound on generated `name (N).ext` candidates
pub const DEFAULT_UNIQUE_CAP: usize = 10_000;

/// Classic Win32 `MAX_PATH`
pub const WINDOWS_MAX_PATH: usize = 260;

/// Longest single component on common POSIX filesystems, in bytes
pub const POSIX_MAX_COMPONENT: usize = 255;

/// Linux `PATH_MAX`, in bytes
pub const POSIX_MAX_PATH: usize = 4096;

const WINDOWS_FORBIDDEN: &[char] = &['<', '>', ':', '"', '|', '?', '*'];

const WINDOWS_RESERVED: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

fn push_unique(invalid: &mut Vec<String>, entry: String) {
    if !invalid.contains(&entry) {
        invalid.push(entry);
    }
}

/// Check `path` against the naming rules of `platform`
///
/// Every offending character and reserved name is listed in the error.
pub fn validate_path_chars(path: &str, platform: Platform) -> Result<()> {
    match platform {
        Platform::Windows => validate_windows(path),
        Platform::Linux => validate_posix(path, false),
        Platform::MacOs => validate_posix(path, true),
    }
}

fn validate_windows(path: &str) -> Result<()> {
    let (verbatim, body) = match path.strip_prefix(r"\\?\") {
        Some(rest) => (true, rest),
        None => (false, path),
    };

    // The colon of a leading drive token is allowed
    let body = match body.as_bytes() {
        [letter, b':', ..] if letter.is_ascii_alphabetic() => &body[2..],
        _ => body,
    };

    let mut invalid = Vec::new();
    for component in body.split(|c: char| c == '\\' || c == '/') {
        for c in component.chars() {
            if WINDOWS_FORBIDDEN.contains(&c) || c.is_control() {
                push_unique(&mut invalid, format!("{:?}", c));
            }
        }

        let stem = component.split('.').next().unwrap_or(component);
        if WINDOWS_RESERVED
            .iter()
            .any(|reserved| stem.trim_end().eq_ignore_ascii_case(reserved))
        {
            push_unique(&mut invalid, format!("reserved name '{}'", component));
        }

        let dots = component == "." || component == "..";
        if !dots && (component.ends_with(' ') || component.ends_with('.')) {
            push_unique(&mut invalid, format!("trailing space or dot in '{}'", component));
        }
    }

    if !invalid.is_empty() {
        return Err(FilekitError::InvalidPathChars {
            path: path.to_string(),
            invalid,
        });
    }

    let length = path.chars().count();
    if !verbatim && length > WINDOWS_MAX_PATH {
        return Err(FilekitError::PathTooLong {
            path: path.to_string(),
            length,
            limit: WINDOWS_MAX_PATH,
        });
    }
    Ok(())
}

fn validate_posix(path: &str, reject_colon: bool) -> Result<()> {
    let mut invalid = Vec::new();
    if path.contains('\0') {
        invalid.push("'\\0'".to_string());
    }
    if reject_colon && path.contains(':') {
        invalid.push("':'".to_string());
    }
    if !invalid.is_empty() {
        return Err(FilekitError::InvalidPathChars {
            path: path.to_string(),
            invalid,
        });
    }

    if let Some(long) = path.split('/').find(|c| c.len() > POSIX_MAX_COMPONENT) {
        return Err(FilekitError::PathTooLong {
            path: path.to_string(),
            length: long.len(),
            limit: POSIX_MAX_COMPONENT,
        });
    }
    if path.len() > POSIX_MAX_PATH {
        return Err(FilekitError::PathTooLong {
            path: path.to_string(),
            length: path.len(),
            limit: POSIX_MAX_PATH,
        });
    }
    Ok(())
}

/// Join `path` under `base`, refusing results that leave `base`
///
/// `path` may be written in any dialect. Absolute paths are accepted only
/// when they already lie under `base`.
pub fn resolve_within(base: &Path, path: &str) -> Result<PathBuf> {
    let spec = PathSpec::parse(path)?;
    let traversal = || FilekitError::PathTraversal {
        path: path.to_string(),
        base: base.to_path_buf(),
    };

    if *spec.root() != Root::Relative {
        let native = PathBuf::from(spec.render(spec.filesystem_dialect(Platform::host())));
        return if native.starts_with(base) {
            Ok(native)
        } else {
            Err(traversal())
        };
    }

    if spec.components().first().is_some_and(|c| c == "..") {
        return Err(traversal());
    }
    Ok(spec
        .components()
        .iter()
        .fold(base.to_path_buf(), |acc, c| acc.join(c)))
}

/// Lazy, restartable sequence of `name (N).ext` siblings of a path
#[derive(Debug, Clone)]
pub struct UniqueCandidates {
    parent: PathBuf,
    stem: String,
    extension: Option<String>,
    next: usize,
    cap: usize,
}

impl UniqueCandidates {
    /// Candidates for `path`, bounded by [`DEFAULT_UNIQUE_CAP`]
    pub fn new(path: &Path) -> Self {
        Self {
            parent: path.parent().map(Path::to_path_buf).unwrap_or_default(),
            stem: path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default(),
            extension: path.extension().map(|e| e.to_string_lossy().into_owned()),
            next: 1,
            cap: DEFAULT_UNIQUE_CAP,
        }
    }

    /// Change the bound
    pub fn with_cap(mut self, cap: usize) -> Self {
        self.cap = cap;
        self
    }

    /// Configured bound
    pub fn cap(&self) -> usize {
        self.cap
    }
}

impl Iterator for UniqueCandidates {
    type Item = PathBuf;

    fn next(&mut self) -> Option<PathBuf> {
        if self.next > self.cap {
            return None;
        }
        let name = match &self.extension {
            Some(ext) => format!("{} ({}).{}", self.stem, self.next, ext),
            None => format!("{} ({})", self.stem, self.next),
        };
        self.next += 1;
        Some(self.parent.join(name))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.cap + 1).saturating_sub(self.next);
        (remaining, Some(remaining))
    }
}

/// Candidate names for `path`
pub fn ensure_unique_path(path: &Path) -> UniqueCandidates {
    UniqueCandidates::new(path)
}

/// First candidate for which `is_taken` is false
pub fn first_available(
    mut candidates: UniqueCandidates,
    mut is_taken: impl FnMut(&Path) -> bool,
) -> Result<PathBuf> {
    let attempts = candidates.cap();
    let origin = candidates.parent.join(match &candidates.extension {
        Some(ext) => format!("{}.{}", candidates.stem, ext),
        None => candidates.stem.clone(),
    });
    candidates
        .find(|candidate| !is_taken(candidate))
        .ok_or(FilekitError::UniquePathExhausted {
            path: origin,
            attempts,
        })
}

/// `path` itself when free on disk, otherwise the first free candidate
pub fn unique_path(path: &Path) -> Result<PathBuf> {
    if path.symlink_metadata().is_err() {
        return Ok(path.to_path_buf());
    }
    first_available(ensure_unique_path(path), |p| p.symlink_metadata().is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn invalid_list(result: Result<()>) -> Vec<String> {
        match result {
            Err(FilekitError::InvalidPathChars { invalid, .. }) => invalid,
            other => panic!("expected InvalidPathChars, got {:?}", other),
        }
    }

    #[test]
    fn test_windows_characters() {
        assert!(validate_path_chars(r"C:\Users\foo\report.txt", Platform::Windows).is_ok());

        let invalid = invalid_list(validate_path_chars(r"C:\a<b>\c?.txt", Platform::Windows));
        assert_eq!(invalid, vec!["'<'", "'>'", "'?'"]);

        let invalid = invalid_list(validate_path_chars("dir\\tab\there", Platform::Windows));
        assert_eq!(invalid, vec!["'\\t'"]);

        // A colon after the drive token is not allowed
        assert!(validate_path_chars(r"C:\a:b", Platform::Windows).is_err());
    }

    #[test]
    fn test_windows_reserved_names() {
        for name in ["CON", "con", "nul.txt", "COM1", "lpt9.log", r"dir\aux"] {
            let invalid = invalid_list(validate_path_chars(name, Platform::Windows));
            assert!(invalid[0].starts_with("reserved name"), "{}", name);
        }
        assert!(validate_path_chars("console.txt", Platform::Windows).is_ok());
        assert!(validate_path_chars("COM10", Platform::Windows).is_ok());
    }

    #[test]
    fn test_windows_trailing_space_or_dot() {
        assert!(validate_path_chars(r"C:\dir.\file", Platform::Windows).is_err());
        assert!(validate_path_chars(r"C:\dir \file", Platform::Windows).is_err());
        assert!(validate_path_chars(r"..\dir\.\file", Platform::Windows).is_ok());
    }

    #[test]
    fn test_windows_length() {
        let long = format!(r"C:\{}", "a".repeat(WINDOWS_MAX_PATH));
        assert!(matches!(
            validate_path_chars(&long, Platform::Windows),
            Err(FilekitError::PathTooLong { limit: WINDOWS_MAX_PATH, .. })
        ));
        let verbatim = format!(r"\\?\{}", long);
        assert!(validate_path_chars(&verbatim, Platform::Windows).is_ok());
    }

    #[test]
    fn test_posix_rules() {
        assert!(validate_path_chars("/tmp/a<b>:c|d", Platform::Linux).is_ok());
        assert_eq!(
            invalid_list(validate_path_chars("/tmp/a\0b", Platform::Linux)),
            vec!["'\\0'"]
        );
        assert!(matches!(
            validate_path_chars(&format!("/tmp/{}", "x".repeat(256)), Platform::Linux),
            Err(FilekitError::PathTooLong { limit: POSIX_MAX_COMPONENT, .. })
        ));
        let deep = format!("/{}", vec!["d".repeat(200); 25].join("/"));
        assert!(matches!(
            validate_path_chars(&deep, Platform::Linux),
            Err(FilekitError::PathTooLong { limit: POSIX_MAX_PATH, .. })
        ));
        assert!(validate_path_chars("/tmp/a:b", Platform::MacOs).is_err());
    }

    #[test]
    fn test_resolve_within() {
        let base = Path::new("/srv/data");
        assert_eq!(
            resolve_within(base, "sub/./file.txt").unwrap(),
            PathBuf::from("/srv/data/sub/file.txt")
        );
        assert_eq!(
            resolve_within(base, "sub/../file.txt").unwrap(),
            PathBuf::from("/srv/data/file.txt")
        );
        assert!(matches!(
            resolve_within(base, "sub/../../etc/passwd"),
            Err(FilekitError::PathTraversal { .. })
        ));
        assert!(matches!(
            resolve_within(base, "../data2"),
            Err(FilekitError::PathTraversal { .. })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_resolve_within_absolute() {
        let base = Path::new("/srv/data");
        assert!(resolve_within(base, "/srv/data/x").is_ok());
        assert!(matches!(
            resolve_within(base, "/etc/passwd"),
            Err(FilekitError::PathTraversal { .. })
        ));
    }

    #[test]
    fn test_candidates_are_lazy_and_restartable() {
        let candidates = ensure_unique_path(Path::new("/out/report.pdf"));
        let first: Vec<PathBuf> = candidates.clone().take(2).collect();
        assert_eq!(
            first,
            vec![
                PathBuf::from("/out/report (1).pdf"),
                PathBuf::from("/out/report (2).pdf"),
            ]
        );
        // The clone did not advance the original
        assert_eq!(
            candidates.clone().next(),
            Some(PathBuf::from("/out/report (1).pdf"))
        );
        assert_eq!(candidates.count(), DEFAULT_UNIQUE_CAP);

        let mut bare = ensure_unique_path(Path::new("Makefile"));
        assert_eq!(bare.next(), Some(PathBuf::from("Makefile (1)")));
    }

    #[test]
    fn test_first_available() {
        let taken = [PathBuf::from("a (1).txt"), PathBuf::from("a (2).txt")];
        let found = first_available(ensure_unique_path(Path::new("a.txt")), |p| {
            taken.iter().any(|t| t == p)
        })
        .unwrap();
        assert_eq!(found, PathBuf::from("a (3).txt"));

        let err = first_available(ensure_unique_path(Path::new("a.txt")).with_cap(3), |_| true)
            .unwrap_err();
        assert!(matches!(
            err,
            FilekitError::UniquePathExhausted { attempts: 3, .. }
        ));
    }

    #[test]
    fn test_unique_path_on_disk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.txt");
        assert_eq!(unique_path(&path).unwrap(), path);

        fs::write(&path, b"x").unwrap();
        let unique = unique_path(&path).unwrap();
        assert_ne!(unique, path);
        assert_eq!(unique, dir.path().join("test (1).txt"));

        fs::write(&unique, b"y").unwrap();
        assert_eq!(unique_path(&path).unwrap(), dir.path().join("test (2).txt"));
    }
}
