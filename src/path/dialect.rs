//! Path dialect detection and translation
//!
//! A path string is parsed once into an immutable [`PathSpec`] (detected
//! dialect, root, collapsed components) and rendered into any target
//! [`Dialect`]. Detection runs from most to least specific:
//!
//! 1. UNC: `\\server\share` or `//server/share`
//! 2. WSL: `/mnt/<letter>` followed by `/` or end
//! 3. Git-Bash: `/<letter>` followed by `/` or end
//! 4. Windows drive: `<letter>:` followed by a separator or end
//! 5. Windows rooted: `\...`
//! 6. Native POSIX, or native Windows for a relative path containing `\`
//!    on a Windows host
//!
//! On a POSIX host a bare `/c/...` is therefore always read as Git-Bash.

use super::capabilities::{HostCapabilities, Platform, PlatformCapabilities};
use crate::error::{FilekitError, IoResultExt, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::trace;

/// Path notation conventions
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Dialect {
    /// `C:\Users\foo`
    #[value(name = "windows")]
    NativeWindows,
    /// `/home/foo`
    #[value(name = "posix")]
    NativePosix,
    /// `/c/Users/foo`
    #[value(name = "git-bash")]
    GitBash,
    /// `/mnt/c/Users/foo`
    #[value(name = "wsl")]
    Wsl,
    /// `\\server\share\foo`
    #[value(name = "unc")]
    Unc,
}

impl Dialect {
    /// Native dialect of the host
    pub fn host() -> Self {
        Self::native_for(Platform::host())
    }

    /// Native dialect of a platform
    pub fn native_for(platform: Platform) -> Self {
        if platform.is_windows() {
            Self::NativeWindows
        } else {
            Self::NativePosix
        }
    }

    /// Dialects rendered with backslashes
    pub fn is_windows_family(&self) -> bool {
        matches!(self, Self::NativeWindows | Self::Unc)
    }

    fn separator(&self) -> char {
        if self.is_windows_family() {
            '\\'
        } else {
            '/'
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NativeWindows => "windows",
            Self::NativePosix => "posix",
            Self::GitBash => "git-bash",
            Self::Wsl => "wsl",
            Self::Unc => "unc",
        };
        f.write_str(name)
    }
}

/// Coarse location category of a path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PathType {
    /// Local disk
    Local,
    /// `\\server\share` path
    Unc,
    /// Drive letter mapped to a network share
    Network,
    /// Drive letter substituted for a local directory
    Subst,
}

impl fmt::Display for PathType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Local => "local",
            Self::Unc => "unc",
            Self::Network => "network",
            Self::Subst => "subst",
        };
        f.write_str(name)
    }
}

/// Anchor of a parsed path
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Root {
    /// No root
    Relative,
    /// Rooted without a drive (`/` or `\`)
    Posix,
    /// Drive letter, stored upper-case
    Drive(char),
    /// UNC host; the share is the first component
    Unc {
        /// Server name
        server: String,
    },
}

/// Immutable parsed path
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PathSpec {
    dialect: Dialect,
    root: Root,
    components: Vec<String>,
}

fn is_separator(c: char) -> bool {
    c == '/' || c == '\\'
}

/// `<letter>` followed by `/` or end, after `prefix`
fn letter_mount<'a>(input: &'a str, prefix: &str) -> Option<(char, &'a str)> {
    let rest = input.strip_prefix(prefix)?;
    let mut chars = rest.chars();
    let letter = chars.next().filter(char::is_ascii_alphabetic)?;
    let tail = chars.as_str();
    (tail.is_empty() || tail.starts_with('/')).then_some((letter, tail))
}

/// `<letter>:` followed by a separator or end
fn windows_drive(input: &str) -> Option<(char, &str)> {
    let mut chars = input.chars();
    let letter = chars.next().filter(char::is_ascii_alphabetic)?;
    if chars.next()? != ':' {
        return None;
    }
    let tail = chars.as_str();
    (tail.is_empty() || tail.starts_with(is_separator)).then_some((letter, tail))
}

/// Drop empty and `.` segments, fold `..` left to right
fn collapse<'a>(segments: impl Iterator<Item = &'a str>, absolute: bool) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for segment in segments {
        match segment {
            "" | "." => {}
            ".." => match out.last() {
                Some(last) if last != ".." => {
                    out.pop();
                }
                // Clamped at an absolute root
                _ if absolute => {}
                _ => out.push("..".to_string()),
            },
            name => out.push(name.to_string()),
        }
    }
    out
}

impl PathSpec {
    /// Parse using the host platform's rules
    pub fn parse(input: &str) -> Result<Self> {
        Self::parse_on(input, Platform::host())
    }

    /// Parse as if running on `host`
    pub fn parse_on(input: &str, host: Platform) -> Result<Self> {
        if input.trim().is_empty() {
            return Err(FilekitError::malformed(input, "empty path"));
        }
        if input != "/" && input != "\\" && input.chars().all(is_separator) {
            return Err(FilekitError::malformed(
                input,
                "path consists only of separators",
            ));
        }

        // Verbatim prefix: \\?\C:\... or \\?\UNC\server\share
        if let Some(rest) = input.strip_prefix(r"\\?\") {
            if let Some(unc) = rest.strip_prefix(r"UNC\") {
                return Self::parse_unc(input, unc);
            }
            if let Some((letter, tail)) = windows_drive(rest) {
                return Ok(Self::windows_family(
                    Root::Drive(letter.to_ascii_uppercase()),
                    tail,
                ));
            }
            return Err(FilekitError::malformed(input, "unsupported verbatim path"));
        }

        if let Some(rest) = input
            .strip_prefix(r"\\")
            .or_else(|| input.strip_prefix("//"))
        {
            return Self::parse_unc(input, rest);
        }

        if let Some((letter, tail)) = letter_mount(input, "/mnt/") {
            return Ok(Self {
                dialect: Dialect::Wsl,
                root: Root::Drive(letter.to_ascii_uppercase()),
                components: collapse(tail.split('/'), true),
            });
        }

        if let Some((letter, tail)) = letter_mount(input, "/") {
            return Ok(Self {
                dialect: Dialect::GitBash,
                root: Root::Drive(letter.to_ascii_uppercase()),
                components: collapse(tail.split('/'), true),
            });
        }

        if let Some((letter, tail)) = windows_drive(input) {
            return Ok(Self::windows_family(
                Root::Drive(letter.to_ascii_uppercase()),
                tail,
            ));
        }

        if input.starts_with('\\') {
            return Ok(Self::windows_family(Root::Posix, input));
        }

        if let Some(first) = input.split(is_separator).next() {
            if first.ends_with(':') {
                return Err(FilekitError::malformed(
                    input,
                    format!("invalid drive token '{}'", first),
                ));
            }
        }

        if host.is_windows() && input.contains('\\') {
            return Ok(Self::windows_family(Root::Relative, input));
        }

        let root = if input.starts_with('/') {
            Root::Posix
        } else {
            Root::Relative
        };
        let absolute = root != Root::Relative;
        Ok(Self {
            dialect: Dialect::NativePosix,
            root,
            components: collapse(input.split('/'), absolute),
        })
    }

    fn windows_family(root: Root, tail: &str) -> Self {
        let absolute = root != Root::Relative;
        Self {
            dialect: Dialect::NativeWindows,
            root,
            components: collapse(tail.split(is_separator), absolute),
        }
    }

    fn parse_unc(input: &str, rest: &str) -> Result<Self> {
        let mut segments = rest.split(is_separator).filter(|s| !s.is_empty());
        let server = segments
            .next()
            .ok_or_else(|| FilekitError::malformed(input, "UNC path without host"))?;

        let mut components = Vec::new();
        if let Some(share) = segments.next() {
            if share == "." || share == ".." {
                return Err(FilekitError::malformed(input, "invalid UNC share name"));
            }
            components.push(share.to_string());
            // The share is part of the root; `..` never climbs past it
            components.extend(collapse(segments, true));
        }

        Ok(Self {
            dialect: Dialect::Unc,
            root: Root::Unc {
                server: server.to_string(),
            },
            components,
        })
    }

    /// Dialect detected from the input string
    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Root anchor
    pub fn root(&self) -> &Root {
        &self.root
    }

    /// Collapsed components (for UNC, the share comes first)
    pub fn components(&self) -> &[String] {
        &self.components
    }

    /// Upper-case drive letter, if any
    pub fn drive_letter(&self) -> Option<char> {
        match self.root {
            Root::Drive(letter) => Some(letter),
            _ => None,
        }
    }

    /// Whether the path is anchored
    pub fn is_absolute(&self) -> bool {
        self.root != Root::Relative
    }

    /// Whether the path is a UNC path
    pub fn is_unc(&self) -> bool {
        matches!(self.root, Root::Unc { .. })
    }

    /// Location category as seen through `caps`
    pub fn path_type(&self, caps: &dyn PlatformCapabilities) -> PathType {
        match self.root {
            Root::Unc { .. } => PathType::Unc,
            Root::Drive(letter) if caps.mapped_drive_target(letter).is_some() => PathType::Network,
            Root::Drive(letter) if caps.substituted_drive_target(letter).is_some() => {
                PathType::Subst
            }
            _ => PathType::Local,
        }
    }

    /// Dialect used when touching the filesystem on `host`
    ///
    /// A WSL path keeps its `/mnt/<letter>` form on a POSIX host, since that
    /// is where the drive is actually mounted.
    pub fn filesystem_dialect(&self, host: Platform) -> Dialect {
        if host.is_windows() {
            Dialect::NativeWindows
        } else if self.dialect == Dialect::Wsl {
            Dialect::Wsl
        } else {
            Dialect::NativePosix
        }
    }

    /// Render in `target` notation
    pub fn render(&self, target: Dialect) -> String {
        let sep = target.separator();
        let joined = self.components.join(&sep.to_string());

        match &self.root {
            Root::Relative => {
                if joined.is_empty() {
                    ".".to_string()
                } else {
                    joined
                }
            }
            Root::Posix => format!("{}{}", sep, joined),
            Root::Drive(letter) => {
                let prefix = match target {
                    Dialect::NativeWindows | Dialect::Unc => {
                        format!("{}:", letter.to_ascii_uppercase())
                    }
                    Dialect::Wsl => format!("/mnt/{}", letter.to_ascii_lowercase()),
                    Dialect::GitBash | Dialect::NativePosix => {
                        format!("/{}", letter.to_ascii_lowercase())
                    }
                };
                if joined.is_empty() && !target.is_windows_family() {
                    prefix
                } else {
                    format!("{}{}{}", prefix, sep, joined)
                }
            }
            Root::Unc { server } => {
                if joined.is_empty() {
                    format!("{}{}{}", sep, sep, server)
                } else {
                    format!("{}{}{}{}{}", sep, sep, server, sep, joined)
                }
            }
        }
    }

    /// Remainder after the drive or UNC share, in the input's separator style
    fn remainder(&self) -> String {
        let (skip, sep) = match (&self.root, self.dialect.is_windows_family()) {
            (Root::Unc { .. }, _) => (1, '\\'),
            (_, true) => (0, '\\'),
            (_, false) => (0, '/'),
        };
        let rest: Vec<&str> = self
            .components
            .iter()
            .skip(skip)
            .map(String::as_str)
            .collect();
        let joined = rest.join(&sep.to_string());

        match self.root {
            Root::Relative if joined.is_empty() => ".".to_string(),
            Root::Relative => joined,
            Root::Unc { .. } if self.components.is_empty() => String::new(),
            _ => format!("{}{}", sep, joined),
        }
    }
}

/// A path rendered for a target dialect
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NormalizedPath {
    spec: PathSpec,
    target: Dialect,
    rendered: String,
}

impl NormalizedPath {
    /// Render `spec` for `target`
    pub fn new(spec: PathSpec, target: Dialect) -> Self {
        let rendered = spec.render(target);
        Self {
            spec,
            target,
            rendered,
        }
    }

    /// Parsed form
    pub fn spec(&self) -> &PathSpec {
        &self.spec
    }

    /// Dialect it was rendered for
    pub fn target(&self) -> Dialect {
        self.target
    }

    /// Rendered string
    pub fn as_str(&self) -> &str {
        &self.rendered
    }

    /// Rendered string as a filesystem path
    pub fn to_path_buf(&self) -> PathBuf {
        PathBuf::from(&self.rendered)
    }
}

impl fmt::Display for NormalizedPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.rendered)
    }
}

impl AsRef<str> for NormalizedPath {
    fn as_ref(&self) -> &str {
        &self.rendered
    }
}

/// Path resolver bound to a capability set
#[derive(Debug, Clone)]
pub struct PathResolver {
    caps: Arc<dyn PlatformCapabilities>,
}

impl PathResolver {
    /// Create a resolver over `caps`
    pub fn new(caps: Arc<dyn PlatformCapabilities>) -> Self {
        Self { caps }
    }

    /// Resolver over host capabilities
    pub fn host() -> Self {
        Self::new(Arc::new(HostCapabilities::new()))
    }

    /// Capabilities in use
    pub fn capabilities(&self) -> &dyn PlatformCapabilities {
        self.caps.as_ref()
    }

    /// Parse with this resolver's platform rules
    pub fn parse(&self, path: &str) -> Result<PathSpec> {
        PathSpec::parse_on(path, self.caps.platform())
    }

    /// Normalize into `target`, or the platform's native dialect
    pub fn normalize(&self, path: &str, target: Option<Dialect>) -> Result<NormalizedPath> {
        let spec = self.parse(path)?;
        let target = target.unwrap_or_else(|| Dialect::native_for(self.caps.platform()));
        trace!("normalize {:?} ({}) -> {}", path, spec.dialect(), target);
        Ok(NormalizedPath::new(spec, target))
    }

    /// Location category of `path`
    pub fn path_type(&self, path: &str) -> Result<PathType> {
        Ok(self.parse(path)?.path_type(self.caps.as_ref()))
    }

    /// Convert to a path usable with `std::fs` on this platform
    pub fn to_native_path(&self, path: &NormalizedPath) -> Result<PathBuf> {
        if path.spec().is_unc() && !self.caps.supports_unc() {
            return Err(FilekitError::UnsupportedCapability(format!(
                "UNC path '{}' cannot be opened on {}",
                path,
                self.caps.platform()
            )));
        }
        let dialect = path.spec().filesystem_dialect(self.caps.platform());
        Ok(PathBuf::from(path.spec().render(dialect)))
    }

    /// Parse and convert in one step
    pub fn resolve(&self, path: &str) -> Result<PathBuf> {
        let normalized = self.normalize(path, None)?;
        self.to_native_path(&normalized)
    }

    /// Rewrite a network-mapped drive path into its UNC form
    ///
    /// Returns `Ok(None)` when the path's drive is not mapped.
    pub fn resolve_network_drive(&self, path: &str) -> Result<Option<NormalizedPath>> {
        if !self.caps.supports_unc() {
            return Err(FilekitError::UnsupportedCapability(format!(
                "network drive resolution is not available on {}",
                self.caps.platform()
            )));
        }

        let spec = self.parse(path)?;
        let Some(target) = spec
            .drive_letter()
            .and_then(|letter| self.caps.mapped_drive_target(letter))
        else {
            return Ok(None);
        };

        let mut unc = target.trim_end_matches(is_separator).to_string();
        for component in spec.components() {
            unc.push('\\');
            unc.push_str(component);
        }
        let resolved = self.parse(&unc)?;
        if !resolved.is_unc() {
            return Err(FilekitError::malformed(
                target,
                "mapped drive target is not a UNC path",
            ));
        }
        Ok(Some(NormalizedPath::new(resolved, Dialect::Unc)))
    }
}

impl Default for PathResolver {
    fn default() -> Self {
        Self::host()
    }
}

/// Normalize `path` into `target` (host-native when `None`)
pub fn normalize(path: &str, target: Option<Dialect>) -> Result<NormalizedPath> {
    let spec = PathSpec::parse(path)?;
    Ok(NormalizedPath::new(spec, target.unwrap_or_else(Dialect::host)))
}

/// Convert any dialect into a path usable on this host
///
/// An empty string yields `.`.
pub fn normalize_cross_platform_path(path: &str) -> Result<PathBuf> {
    if path.is_empty() {
        return Ok(PathBuf::from("."));
    }
    let spec = PathSpec::parse(path)?;
    Ok(PathBuf::from(
        spec.render(spec.filesystem_dialect(Platform::host())),
    ))
}

fn expand_home(path: &str) -> String {
    let rest = match path.strip_prefix('~') {
        Some(rest) if rest.is_empty() || rest.starts_with(is_separator) => rest,
        _ => return path.to_string(),
    };
    match std::env::var_os("HOME").or_else(|| std::env::var_os("USERPROFILE")) {
        Some(home) => format!("{}{}", home.to_string_lossy(), rest),
        None => path.to_string(),
    }
}

/// Expand `~`, convert to host notation and make absolute
pub fn normalize_path(path: &str) -> Result<PathBuf> {
    let expanded = expand_home(path);
    let normalized = normalize_cross_platform_path(&expanded)?;
    if normalized.is_absolute() {
        return Ok(normalized);
    }
    let cwd = std::env::current_dir().with_path(".")?;
    normalize_cross_platform_path(&cwd.join(normalized).to_string_lossy())
}

/// Whether `path` is written as a UNC path
pub fn is_unc_path(path: &str) -> bool {
    let rest = match path.strip_prefix(r"\\?\UNC\") {
        Some(rest) => rest,
        None if path.starts_with(r"\\?\") => return false,
        None => match path.strip_prefix(r"\\").or_else(|| path.strip_prefix("//")) {
            Some(rest) => rest,
            None => return false,
        },
    };
    rest.chars().next().is_some_and(|c| !is_separator(c))
}

/// Location category using host capabilities
pub fn get_path_type(path: &str) -> Result<PathType> {
    Ok(PathSpec::parse(path)?.path_type(&HostCapabilities::new()))
}

/// Split into drive (`C:` or `\\server\share`) and remainder
///
/// The drive is empty for paths without one.
pub fn split_drive_letter(path: &str) -> Result<(String, String)> {
    let spec = PathSpec::parse(path)?;
    let drive = match spec.root() {
        Root::Drive(letter) => format!("{}:", letter),
        Root::Unc { server } => match spec.components().first() {
            Some(share) => format!(r"\\{}\{}", server, share),
            None => format!(r"\\{}", server),
        },
        Root::Relative | Root::Posix => String::new(),
    };
    Ok((drive, spec.remainder()))
}

/// Convert separators to the host's
pub fn fix_path_separators(path: &str) -> String {
    if cfg!(windows) {
        path.replace('/', "\\")
    } else {
        path.replace('\\', "/")
    }
}

/// Whether the path exists after conversion to host notation
pub fn path_exists_cross_platform(path: &str) -> bool {
    PathResolver::host()
        .resolve(path)
        .map(|native| native.exists())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::StaticCapabilities;
    use proptest::prelude::*;

    fn render(path: &str, target: Dialect) -> String {
        normalize(path, Some(target)).unwrap().to_string()
    }

    #[test]
    fn test_detection_order() {
        let detect = |p: &str| PathSpec::parse_on(p, Platform::Linux).unwrap().dialect();
        assert_eq!(detect(r"\\server\share\dir"), Dialect::Unc);
        assert_eq!(detect("//server/share"), Dialect::Unc);
        assert_eq!(detect("/mnt/c/Users"), Dialect::Wsl);
        assert_eq!(detect("/mnt/d"), Dialect::Wsl);
        assert_eq!(detect("/c/Users"), Dialect::GitBash);
        assert_eq!(detect("/c"), Dialect::GitBash);
        assert_eq!(detect(r"C:\Users"), Dialect::NativeWindows);
        assert_eq!(detect("C:/Users"), Dialect::NativeWindows);
        assert_eq!(detect("C:"), Dialect::NativeWindows);
        assert_eq!(detect(r"\Windows\System32"), Dialect::NativeWindows);
        assert_eq!(detect("/mnt/cdrom"), Dialect::NativePosix);
        assert_eq!(detect("/home/user"), Dialect::NativePosix);
        assert_eq!(detect(r"some\escaped"), Dialect::NativePosix);

        let on_windows = PathSpec::parse_on(r"some\dir", Platform::Windows).unwrap();
        assert_eq!(on_windows.dialect(), Dialect::NativeWindows);
        assert_eq!(on_windows.components(), ["some", "dir"]);
    }

    #[test]
    fn test_rendering() {
        assert_eq!(render("/c/Users/foo", Dialect::NativeWindows), r"C:\Users\foo");
        assert_eq!(render(r"C:\Users\foo", Dialect::GitBash), "/c/Users/foo");
        assert_eq!(render(r"C:\Users\foo", Dialect::Wsl), "/mnt/c/Users/foo");
        assert_eq!(render(r"C:\Users\foo\file.txt", Dialect::NativePosix), "/c/Users/foo/file.txt");
        assert_eq!(render("/D/some/path", Dialect::NativeWindows), r"D:\some\path");
        assert_eq!(render("/c", Dialect::NativeWindows), r"C:\");
        assert_eq!(render("/c/", Dialect::NativeWindows), r"C:\");
        assert_eq!(render("C:", Dialect::GitBash), "/c");
        assert_eq!(render(r"\\srv\share\a", Dialect::NativePosix), "//srv/share/a");
        assert_eq!(render("//srv/share/a", Dialect::Unc), r"\\srv\share\a");
        assert_eq!(render("/home/user/file.txt", Dialect::NativePosix), "/home/user/file.txt");
        assert_eq!(render("/", Dialect::NativePosix), "/");
        assert_eq!(render("./a/..", Dialect::NativePosix), ".");
    }

    #[test]
    fn test_dot_segments() {
        assert_eq!(render("/usr/./lib/../bin", Dialect::NativePosix), "/usr/bin");
        assert_eq!(render("/usr/../../..", Dialect::NativePosix), "/");
        assert_eq!(render(r"\", Dialect::NativeWindows), r"\");
        assert_eq!(render(r"C:\..\x", Dialect::NativeWindows), r"C:\x");
        assert_eq!(render("../../a", Dialect::NativePosix), "../../a");
        assert_eq!(render("a/../../b", Dialect::NativePosix), "../b");
        assert_eq!(render(r"\\srv\share\..\..\x", Dialect::Unc), r"\\srv\share\x");
    }

    #[test]
    fn test_posix_backslashes_preserved() {
        let spec = PathSpec::parse_on(r"/tmp/a\ b", Platform::Linux).unwrap();
        assert_eq!(spec.components(), ["tmp", r"a\ b"]);
        assert_eq!(spec.render(Dialect::NativePosix), r"/tmp/a\ b");
    }

    #[test]
    fn test_malformed_paths() {
        for bad in ["", "   ", "//", r"\\", "///", r"\/\", r"\\\\", "CC:/x", "1:/x", ":"] {
            let err = PathSpec::parse_on(bad, Platform::Linux).unwrap_err();
            assert!(
                matches!(err, FilekitError::MalformedPath { .. }),
                "{:?} should be malformed",
                bad
            );
        }
        assert!(PathSpec::parse_on("/", Platform::Linux).is_ok());
        assert!(PathSpec::parse_on(r"\", Platform::Linux).is_ok());
    }

    #[test]
    fn test_split_drive_letter() {
        assert_eq!(
            split_drive_letter(r"C:\Users\foo").unwrap(),
            ("C:".to_string(), r"\Users\foo".to_string())
        );
        assert_eq!(
            split_drive_letter("/c/Users/foo").unwrap(),
            ("C:".to_string(), "/Users/foo".to_string())
        );
        assert_eq!(
            split_drive_letter("/mnt/d/data").unwrap(),
            ("D:".to_string(), "/data".to_string())
        );
        assert_eq!(
            split_drive_letter(r"\\srv\share\dir\f.txt").unwrap(),
            (r"\\srv\share".to_string(), r"\dir\f.txt".to_string())
        );
        assert_eq!(
            split_drive_letter("/home/user").unwrap(),
            (String::new(), "/home/user".to_string())
        );
    }

    #[test]
    fn test_unc_detection() {
        assert!(is_unc_path(r"\\server\share"));
        assert!(is_unc_path("//server/share"));
        assert!(is_unc_path(r"\\?\UNC\server\share"));
        assert!(!is_unc_path(r"\\?\C:\x"));
        assert!(!is_unc_path("//"));
        assert!(!is_unc_path("/home"));
        assert!(!is_unc_path(r"C:\x"));
    }

    #[test]
    fn test_verbatim_prefix() {
        let spec = PathSpec::parse(r"\\?\C:\very\long").unwrap();
        assert_eq!(spec.drive_letter(), Some('C'));
        assert_eq!(spec.components(), ["very", "long"]);

        let spec = PathSpec::parse(r"\\?\UNC\srv\share\x").unwrap();
        assert!(spec.is_unc());
        assert_eq!(spec.render(Dialect::Unc), r"\\srv\share\x");
    }

    #[test]
    fn test_path_type_through_capabilities() {
        let caps = StaticCapabilities::windows()
            .with_mapped_drive('Z', r"\\nas\media")
            .with_substituted_drive('S', r"C:\work");
        let resolver = PathResolver::new(Arc::new(caps));

        assert_eq!(resolver.path_type(r"Z:\movies").unwrap(), PathType::Network);
        assert_eq!(resolver.path_type(r"S:\src").unwrap(), PathType::Subst);
        assert_eq!(resolver.path_type(r"C:\x").unwrap(), PathType::Local);
        assert_eq!(resolver.path_type(r"\\srv\share").unwrap(), PathType::Unc);
        assert_eq!(resolver.path_type("relative").unwrap(), PathType::Local);
    }

    #[test]
    fn test_resolve_network_drive() {
        let caps = StaticCapabilities::windows().with_mapped_drive('z', r"\\nas\media\");
        let resolver = PathResolver::new(Arc::new(caps));

        let resolved = resolver.resolve_network_drive("/z/movies/a.mkv").unwrap().unwrap();
        assert_eq!(resolved.as_str(), r"\\nas\media\movies\a.mkv");
        assert!(resolver.resolve_network_drive(r"C:\x").unwrap().is_none());
    }

    #[test]
    fn test_unc_requires_capability() {
        let resolver = PathResolver::new(Arc::new(StaticCapabilities::posix()));
        let unc = resolver.normalize(r"\\srv\share\f", None).unwrap();
        assert!(matches!(
            resolver.to_native_path(&unc),
            Err(FilekitError::UnsupportedCapability(_))
        ));
        assert!(matches!(
            resolver.resolve_network_drive("Z:/x"),
            Err(FilekitError::UnsupportedCapability(_))
        ));

        let local = resolver.normalize("/tmp/f", None).unwrap();
        assert_eq!(resolver.to_native_path(&local).unwrap(), PathBuf::from("/tmp/f"));
    }

    #[test]
    fn test_wsl_keeps_mount_on_posix_filesystem() {
        let resolver = PathResolver::new(Arc::new(StaticCapabilities::posix()));
        assert_eq!(
            resolver.resolve("/mnt/c/Users/../data").unwrap(),
            PathBuf::from("/mnt/c/data")
        );
        assert_eq!(
            resolver.resolve(r"C:\Users\foo").unwrap(),
            PathBuf::from("/c/Users/foo")
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_host_helpers_on_unix() {
        assert_eq!(
            normalize_cross_platform_path(r"C:\Users\foo\file.txt").unwrap(),
            PathBuf::from("/c/Users/foo/file.txt")
        );
        assert_eq!(normalize_cross_platform_path("").unwrap(), PathBuf::from("."));
        assert_eq!(normalize_path("/some/./file.txt").unwrap(), PathBuf::from("/some/file.txt"));
        assert!(normalize_path("relative/file").unwrap().is_absolute());
        assert_eq!(fix_path_separators(r"a\b/c"), "a/b/c");

        let dir = tempfile::TempDir::new().unwrap();
        assert!(path_exists_cross_platform(&dir.path().to_string_lossy()));
        assert!(!path_exists_cross_platform("/no/such/path/ever/abc123xyz"));
    }

    #[cfg(unix)]
    #[test]
    fn test_tilde_expansion() {
        if let Some(home) = std::env::var_os("HOME") {
            let expanded = normalize_path("~/notes.txt").unwrap();
            assert!(expanded.starts_with(PathBuf::from(home)));
        }
    }

    fn any_dialect() -> impl Strategy<Value = Dialect> {
        prop_oneof![
            Just(Dialect::NativeWindows),
            Just(Dialect::NativePosix),
            Just(Dialect::GitBash),
            Just(Dialect::Wsl),
            Just(Dialect::Unc),
        ]
    }

    fn name() -> impl Strategy<Value = String> {
        "[A-Za-z0-9_]{2,8}(\\.[a-z]{1,3})?"
    }

    proptest! {
        #[test]
        fn prop_drive_spellings_agree(
            letter in proptest::char::range('a', 'z'),
            parts in proptest::collection::vec(name(), 0..5),
            target in any_dialect(),
        ) {
            let upper = letter.to_ascii_uppercase();
            let spellings = [
                format!("{}:\\{}", upper, parts.join("\\")),
                format!("{}:/{}", upper, parts.join("/")),
                format!("/{}/{}", letter, parts.join("/")),
                format!("/mnt/{}/{}", letter, parts.join("/")),
            ];
            let expected = render(&spellings[0], target);
            for spelling in &spellings[1..] {
                prop_assert_eq!(render(spelling, target), expected.clone());
            }
        }

        #[test]
        fn prop_normalize_is_idempotent(
            absolute in any::<bool>(),
            parts in proptest::collection::vec(
                prop_oneof![Just("..".to_string()), Just(".".to_string()), name()],
                1..6,
            ),
            target in any_dialect(),
        ) {
            let input = if absolute {
                format!("/{}", parts.join("/"))
            } else {
                parts.join("/")
            };
            let once = render(&input, target);
            let twice = render(&once, target);
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn prop_drive_paths_are_idempotent(
            letter in proptest::char::range('a', 'z'),
            parts in proptest::collection::vec(name(), 0..5),
            target in any_dialect(),
        ) {
            let input = format!("{}:\\{}", letter, parts.join("\\"));
            let once = render(&input, target);
            prop_assert_eq!(render(&once, target), once);
        }
    }
}
