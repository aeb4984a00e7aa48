//! The text index: one `<digest> <relative_path>` line per record, sorted by
//! relative path. Written after a scan, parsed back for verify and diff.

use crate::error::Error;
use crate::model::FileRecord;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, BufRead, Write};
use std::path::Path;

/// Expected digests keyed by relative path.
pub type IndexMap = BTreeMap<String, String>;

/// Write Ok records in index format. Failed records carry no digest and are
/// left out. `records` must already be sorted.
///
/// Paths holding a backslash or a line break are escaped as `sha256sum` does:
/// the line starts with `\\` and the path uses `\\\\`, `\\n` and `\\r`.
pub fn write_index<W: Write>(records: &[FileRecord], mut writer: W) -> io::Result<usize> {
    let mut written = 0;
    for record in records.iter().filter(|r| r.is_ok()) {
        let path = &record.relative_path;
        if path.contains(['\\', '\n', '\r']) {
            writeln!(writer, "\\{} {}", record.digest, escape_path(path))?;
        } else {
            writeln!(writer, "{} {}", record.digest, path)?;
        }
        written += 1;
    }
    writer.flush()?;
    Ok(written)
}

pub fn render_index(records: &[FileRecord]) -> String {
    let mut buffer = Vec::new();
    // Writing to a Vec cannot fail.
    let _ = write_index(records, &mut buffer);
    String::from_utf8_lossy(&buffer).into_owned()
}

pub fn save_index(records: &[FileRecord], path: &Path) -> Result<usize, Error> {
    let file = fs::File::create(path)?;
    Ok(write_index(records, io::BufWriter::new(file))?)
}

pub fn parse_index<R: BufRead>(reader: R) -> Result<IndexMap, Error> {
    let mut entries = IndexMap::new();

    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        let line_number = i + 1;
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() {
            continue;
        }

        let (escaped, line) = match line.strip_prefix('\\') {
            Some(rest) => (true, rest),
            None => (false, line),
        };
        let (digest, relative_path) = line.split_once(' ').ok_or_else(|| Error::IndexParse {
            line: line_number,
            reason: "expected '<digest> <relative_path>'".to_string(),
        })?;
        let relative_path = if escaped {
            unescape_path(relative_path).ok_or_else(|| Error::IndexParse {
                line: line_number,
                reason: format!("bad escape sequence in '{}'", relative_path),
            })?
        } else {
            relative_path.to_string()
        };

        if digest.is_empty() || !digest.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(Error::IndexParse {
                line: line_number,
                reason: format!("'{}' is not a hex digest", digest),
            });
        }
        if relative_path.is_empty() {
            return Err(Error::IndexParse {
                line: line_number,
                reason: "missing relative path".to_string(),
            });
        }
        if entries
            .insert(relative_path.clone(), digest.to_ascii_lowercase())
            .is_some()
        {
            return Err(Error::IndexParse {
                line: line_number,
                reason: format!("duplicate entry for '{}'", relative_path),
            });
        }
    }

    Ok(entries)
}

fn escape_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len() + 2);
    for c in path.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    out
}

fn unescape_path(escaped: &str) -> Option<String> {
    let mut out = String::with_capacity(escaped.len());
    let mut chars = escaped.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next()? {
            '\\' => out.push('\\'),
            'n' => out.push('\n'),
            'r' => out.push('\r'),
            _ => return None,
        }
    }
    Some(out)
}

pub fn load_index(path: &Path) -> Result<IndexMap, Error> {
    let file = fs::File::open(path)?;
    parse_index(io::BufReader::new(file))
}

/// Differences between an expected index and a fresh run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexDiff {
    pub matched: Vec<String>,
    /// (relative_path, expected digest, actual digest)
    pub modified: Vec<(String, String, String)>,
    /// In the index, not in the run.
    pub missing: Vec<String>,
    /// In the run, not in the index.
    pub added: Vec<String>,
    /// (relative_path, failure reason)
    pub failed: Vec<(String, String)>,
}

impl IndexDiff {
    pub fn is_clean(&self) -> bool {
        self.modified.is_empty() && self.missing.is_empty() && self.added.is_empty() && self.failed.is_empty()
    }
}

pub fn diff(expected: &IndexMap, records: &[FileRecord]) -> IndexDiff {
    let mut result = IndexDiff::default();
    let mut seen = std::collections::HashSet::new();

    for record in records {
        seen.insert(record.relative_path.as_str());
        if let Some(reason) = record.failure_reason() {
            result.failed.push((record.relative_path.clone(), reason.to_string()));
            continue;
        }
        match expected.get(&record.relative_path) {
            Some(digest) if *digest == record.digest => result.matched.push(record.relative_path.clone()),
            Some(digest) => result.modified.push((
                record.relative_path.clone(),
                digest.clone(),
                record.digest.clone(),
            )),
            None => result.added.push(record.relative_path.clone()),
        }
    }

    result.missing = expected
        .keys()
        .filter(|path| !seen.contains(path.as_str()))
        .cloned()
        .collect();
    result
}
