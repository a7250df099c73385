//! Glob-filtered file discovery
//!
//! [`FindFiles`] walks lazily: nothing is read until the iterator is
//! advanced, and the walk ends once every directory has been visited.

use crate::error::{FilekitError, Result};
use crate::path::{HostCapabilities, PlatformCapabilities};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use tracing::{debug, trace};
use walkdir::{DirEntry, WalkDir};

/// Options for a file search
#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    /// Globs a file must match (any of them); empty matches everything
    pub include_patterns: Vec<String>,
    /// Globs that reject a file
    pub exclude_patterns: Vec<String>,
    /// Force case-insensitive matching; `None` follows the platform
    pub case_insensitive: Option<bool>,
    /// Follow symbolic links while walking
    pub follow_symlinks: bool,
    /// Skip dot-files and dot-directories
    pub exclude_hidden: bool,
    /// Maximum depth below the root (None = unlimited)
    pub max_depth: Option<usize>,
}

impl FindOptions {
    /// Options with the given include and exclude patterns
    pub fn new<S: AsRef<str>>(include: &[S], exclude: &[S]) -> Self {
        Self {
            include_patterns: include.iter().map(|p| p.as_ref().to_string()).collect(),
            exclude_patterns: exclude.iter().map(|p| p.as_ref().to_string()).collect(),
            ..Default::default()
        }
    }

    /// Set case-insensitive matching explicitly
    pub fn case_insensitive(mut self, yes: bool) -> Self {
        self.case_insensitive = Some(yes);
        self
    }

    /// Follow symbolic links
    pub fn follow_symlinks(mut self, yes: bool) -> Self {
        self.follow_symlinks = yes;
        self
    }

    /// Skip hidden entries
    pub fn exclude_hidden(mut self, yes: bool) -> Self {
        self.exclude_hidden = yes;
        self
    }
}

/// Compiled include/exclude globs
///
/// A pattern matches a file when it matches either the file name or the
/// `/`-separated path relative to the search root.
#[derive(Debug, Clone)]
pub struct PatternFilter {
    include: GlobSet,
    exclude: GlobSet,
}

impl PatternFilter {
    /// Compile `include` and `exclude`
    pub fn new<S: AsRef<str>>(include: &[S], exclude: &[S], case_insensitive: bool) -> Result<Self> {
        Ok(Self {
            include: build_globset(include, case_insensitive)?,
            exclude: build_globset(exclude, case_insensitive)?,
        })
    }

    /// Whether a file at `relative` (relative to the search root) passes
    pub fn is_match(&self, relative: &Path) -> bool {
        let key = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        let name = relative
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        let hit = |set: &GlobSet| set.is_match(&key) || set.is_match(&name);
        (self.include.is_empty() || hit(&self.include)) && !hit(&self.exclude)
    }
}

fn build_globset<S: AsRef<str>>(patterns: &[S], case_insensitive: bool) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let pattern = pattern.as_ref();
        let glob = GlobBuilder::new(pattern)
            .case_insensitive(case_insensitive)
            .build()
            .map_err(|e| FilekitError::config(format!("Invalid glob pattern '{}': {}", pattern, e)))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| FilekitError::config(format!("Failed to build glob set: {}", e)))
}

pub(crate) fn is_hidden(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .map(|s| s.starts_with('.'))
            .unwrap_or(false)
}

/// Lazy iterator over matching regular files
///
/// Unreadable entries are yielded as errors and the walk continues.
pub struct FindFiles {
    root: PathBuf,
    options: FindOptions,
    walker: walkdir::FilterEntry<walkdir::IntoIter, fn(&DirEntry) -> bool>,
    filter: PatternFilter,
}

impl FindFiles {
    /// Root the search started from
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// A fresh search over the same root with the same options
    pub fn restart(&self) -> Result<FindFiles> {
        find_files_with(&self.root, &self.options)
    }
}

impl Iterator for FindFiles {
    type Item = Result<PathBuf>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entry = match self.walker.next()? {
                Ok(entry) => entry,
                Err(e) => {
                    let path = e.path().unwrap_or(self.root.as_path()).to_path_buf();
                    return Some(Err(FilekitError::io(path, std::io::Error::from(e))));
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry.path().strip_prefix(&self.root).unwrap_or(entry.path());
            if self.filter.is_match(relative) {
                trace!("Matched {}", entry.path().display());
                return Some(Ok(entry.into_path()));
            }
        }
    }
}

/// Search `dir` for files matching `include` and not matching `exclude`
///
/// Case sensitivity follows the host platform.
pub fn find_files<S: AsRef<str>>(dir: &Path, include: &[S], exclude: &[S]) -> Result<FindFiles> {
    find_files_with(dir, &FindOptions::new(include, exclude))
}

/// Search `dir` with explicit options
pub fn find_files_with(dir: &Path, options: &FindOptions) -> Result<FindFiles> {
    let metadata = std::fs::metadata(dir).map_err(|e| FilekitError::from_io(dir, e))?;
    if !metadata.is_dir() {
        return Err(FilekitError::config(format!("not a directory: {}", dir.display())));
    }

    let case_insensitive = options
        .case_insensitive
        .unwrap_or_else(|| !HostCapabilities::for_volume(dir).case_sensitive());
    let filter = PatternFilter::new(
        &options.include_patterns,
        &options.exclude_patterns,
        case_insensitive,
    )?;
    debug!(
        "Searching {} (case-insensitive: {})",
        dir.display(),
        case_insensitive
    );

    let mut walker = WalkDir::new(dir)
        .follow_links(options.follow_symlinks)
        .sort_by_file_name();
    if let Some(depth) = options.max_depth {
        walker = walker.max_depth(depth);
    }
    let keep: fn(&DirEntry) -> bool = if options.exclude_hidden {
        |entry| !is_hidden(entry)
    } else {
        |_| true
    };

    Ok(FindFiles {
        root: dir.to_path_buf(),
        options: options.clone(),
        walker: walker.into_iter().filter_entry(keep),
        filter,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn names(found: FindFiles) -> Vec<String> {
        found
            .map(|p| p.unwrap().file_name().unwrap().to_string_lossy().to_string())
            .collect()
    }

    fn sample() -> TempDir {
        let dir = TempDir::new().unwrap();
        for name in ["a.txt", "b.TXT", "c.md"] {
            fs::write(dir.path().join(name), name).unwrap();
        }
        dir
    }

    #[test]
    fn test_case_sensitivity() {
        let dir = sample();
        let sensitive =
            find_files_with(dir.path(), &FindOptions::new(&["*.txt"], &[]).case_insensitive(false))
                .unwrap();
        assert_eq!(names(sensitive), vec!["a.txt"]);

        let insensitive =
            find_files_with(dir.path(), &FindOptions::new(&["*.txt"], &[]).case_insensitive(true))
                .unwrap();
        assert_eq!(names(insensitive), vec!["a.txt", "b.TXT"]);
    }

    #[test]
    fn test_include_exclude_and_nesting() {
        let dir = sample();
        fs::create_dir_all(dir.path().join("sub/deep")).unwrap();
        fs::write(dir.path().join("sub/deep/d.txt"), "d").unwrap();
        fs::write(dir.path().join("sub/e.log"), "e").unwrap();

        let found: Vec<String> = find_files(dir.path(), &["*.txt", "*.log"], &["sub/deep/*"])
            .unwrap()
            .map(|p| p.unwrap().file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert!(found.contains(&"a.txt".to_string()));
        assert!(found.contains(&"e.log".to_string()));
        assert!(!found.contains(&"d.txt".to_string()));
        assert!(!found.contains(&"c.md".to_string()));

        let everything: Vec<_> = find_files::<&str>(dir.path(), &[], &[]).unwrap().collect();
        assert_eq!(everything.len(), 5);
    }

    #[test]
    fn test_hidden_entries() {
        let dir = sample();
        fs::create_dir(dir.path().join(".cache")).unwrap();
        fs::write(dir.path().join(".cache/x.txt"), "x").unwrap();
        fs::write(dir.path().join(".hidden.txt"), "h").unwrap();

        let options = FindOptions::new(&["*.txt"], &[]).case_insensitive(false);
        assert_eq!(find_files_with(dir.path(), &options).unwrap().count(), 3);

        let options = options.exclude_hidden(true);
        assert_eq!(names(find_files_with(dir.path(), &options).unwrap()), vec!["a.txt"]);
    }

    #[test]
    fn test_short_circuit_and_restart() {
        let dir = sample();
        let mut found = find_files::<&str>(dir.path(), &[], &[]).unwrap();
        let first = found.next().unwrap().unwrap();
        assert_eq!(first.file_name().unwrap(), "a.txt");

        let again: Vec<_> = found.restart().unwrap().map(|p| p.unwrap()).collect();
        assert_eq!(again.len(), 3);
        assert_eq!(again[0], first);
    }

    #[test]
    fn test_invalid_inputs() {
        let dir = sample();
        assert!(matches!(
            find_files(&dir.path().join("missing"), &["*"], &[]),
            Err(FilekitError::NotFound(_))
        ));
        assert!(matches!(
            find_files(&dir.path().join("a.txt"), &["*"], &[]),
            Err(FilekitError::Config(_))
        ));
        assert!(matches!(
            find_files(dir.path(), &["[unclosed"], &[]),
            Err(FilekitError::Config(_))
        ));
    }

    #[test]
    fn test_pattern_filter() {
        let filter = PatternFilter::new(&["docs/**"], &["*.tmp"], false).unwrap();
        assert!(filter.is_match(Path::new("docs/guide/intro.md")));
        assert!(!filter.is_match(Path::new("docs/scratch.tmp")));
        assert!(!filter.is_match(Path::new("src/lib.rs")));
    }
}
