pub mod walk;

use glob::Pattern;
use std::borrow::Cow;
use std::collections::HashSet;
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error};

pub use walk::enumerate;

/// A file handed to the scheduler: where to read it, and the key it is
/// recorded under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub relative_path: String,
    pub absolute_path: PathBuf,
}

impl SourceFile {
    pub fn new(root: &Path, absolute_path: PathBuf) -> Self {
        let relative_path = posix_relative_path(root, &absolute_path);
        Self {
            relative_path,
            absolute_path,
        }
    }
}

/// `/`-separated path of `path` below `root`. Falls back to the full path when
/// `path` is not under `root`.
///
/// Distinct paths always yield distinct keys: on unix, bytes that are not
/// UTF-8 are written as `\xNN` and a literal backslash as `\\`.
pub fn posix_relative_path(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| component_key(c.as_os_str()))
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(unix)]
fn component_key(name: &OsStr) -> Cow<'_, str> {
    use std::os::unix::ffi::OsStrExt;

    let bytes = name.as_bytes();
    match std::str::from_utf8(bytes) {
        Ok(s) if !s.contains('\\') => Cow::Borrowed(s),
        _ => Cow::Owned(escape_bytes(bytes)),
    }
}

#[cfg(not(unix))]
fn component_key(name: &OsStr) -> Cow<'_, str> {
    name.to_string_lossy()
}

#[cfg(unix)]
fn escape_bytes(mut bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() + 8);
    while !bytes.is_empty() {
        match std::str::from_utf8(bytes) {
            Ok(valid) => {
                push_escaped(&mut out, valid);
                break;
            }
            Err(e) => {
                let (valid, rest) = bytes.split_at(e.valid_up_to());
                push_escaped(&mut out, std::str::from_utf8(valid).unwrap_or_default());
                let invalid = e.error_len().unwrap_or(rest.len());
                for b in &rest[..invalid] {
                    out.push_str(&format!("\\x{:02x}", b));
                }
                bytes = &rest[invalid..];
            }
        }
    }
    out
}

#[cfg(unix)]
fn push_escaped(out: &mut String, s: &str) {
    for c in s.chars() {
        if c == '\\' {
            out.push_str("\\\\");
        } else {
            out.push(c);
        }
    }
}

/// Decides whether an enumerated file becomes part of a run.
pub trait FileFilter: Send + Sync {
    fn should_include(&self, relative_path: &str) -> bool;
}

/// Accepts everything.
pub struct IncludeAll;

impl FileFilter for IncludeAll {
    fn should_include(&self, _relative_path: &str) -> bool {
        true
    }
}

/// Glob ignore patterns plus optional size bounds.
///
/// Patterns are matched against the relative path and against the bare file
/// name, so `*.log` and `target/**` both behave as expected.
pub struct IgnoreFilter {
    root: PathBuf,
    patterns: Vec<Pattern>,
    min_size: Option<u64>,
    max_size: Option<u64>,
    excluded: HashSet<String>,
}

impl IgnoreFilter {
    pub fn new(root: &Path, ignore_globs: &[String]) -> Self {
        let patterns = ignore_globs
            .iter()
            .filter_map(|glob| match Pattern::new(glob) {
                Ok(p) => Some(p),
                Err(e) => {
                    error!("Invalid glob pattern '{}': {}", glob, e);
                    None
                }
            })
            .collect();

        Self {
            root: root.to_path_buf(),
            patterns,
            min_size: None,
            max_size: None,
            excluded: HashSet::new(),
        }
    }

    /// Leave out specific files, such as the run's own database, log or
    /// index. Paths outside the root are ignored.
    pub fn with_excluded_files(mut self, paths: &[PathBuf]) -> Self {
        for path in paths {
            if let Some(key) = self.key_under_root(path) {
                debug!("Excluding {} from the run", key);
                self.excluded.insert(key);
            }
        }
        self
    }

    /// Relative key of `path` when it lies below the root. `path` need not
    /// exist yet; relative paths are taken from the working directory.
    fn key_under_root(&self, path: &Path) -> Option<String> {
        let root = fs::canonicalize(&self.root).ok()?;
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir().ok()?.join(path)
        };
        let name = absolute.file_name()?;
        let parent = absolute.parent()?;
        let parent = fs::canonicalize(parent).unwrap_or_else(|_| parent.to_path_buf());
        let full = parent.join(name);
        full.strip_prefix(&root)
            .ok()
            .map(|relative| posix_relative_path(Path::new(""), relative))
    }

    pub fn with_size_bounds(mut self, min_size: Option<u64>, max_size: Option<u64>) -> Self {
        self.min_size = min_size;
        self.max_size = max_size;
        self
    }

    fn is_ignored(&self, relative_path: &str) -> bool {
        let file_name = relative_path.rsplit('/').next().unwrap_or(relative_path);
        self.patterns
            .iter()
            .any(|p| p.matches(relative_path) || p.matches(file_name))
    }

    fn within_size_bounds(&self, relative_path: &str) -> bool {
        if self.min_size.is_none() && self.max_size.is_none() {
            return true;
        }
        // Unknown size: let the scheduler record the IO failure instead.
        let size = match fs::metadata(self.root.join(relative_path)) {
            Ok(m) => m.len(),
            Err(_) => return true,
        };
        self.min_size.map_or(true, |min| size >= min) && self.max_size.map_or(true, |max| size <= max)
    }
}

impl FileFilter for IgnoreFilter {
    fn should_include(&self, relative_path: &str) -> bool {
        !self.excluded.contains(relative_path)
            && !self.is_ignored(relative_path)
            && self.within_size_bounds(relative_path)
    }
}
