use super::SourceFile;
use crate::error::Error;
use rayon::prelude::*;
use std::fs;
use std::io;
use std::path::Path;
use std::sync::Mutex;
use tracing::{error, warn};

/// Parallel directory traversal. Returns every regular file below `root`,
/// sorted by relative path. Symlinks are skipped; unreadable directories and
/// entries that vanish mid-walk are logged and skipped.
pub fn enumerate(root: &Path) -> Result<Vec<SourceFile>, Error> {
    if !root.is_dir() {
        return Err(Error::RootMissing(root.display().to_string()));
    }

    let files = Mutex::new(Vec::new());
    visit_dirs(root, root, &files)?;

    let mut files = files
        .into_inner()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    files.sort_by(|a: &SourceFile, b| a.relative_path.cmp(&b.relative_path));
    Ok(files)
}

fn visit_dirs(root: &Path, dir: &Path, files: &Mutex<Vec<SourceFile>>) -> io::Result<()> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if dir == root => {
            return Err(io::Error::new(
                err.kind(),
                format!("Error reading directory {}: {}", dir.display(), err),
            ));
        }
        Err(err) if err.kind() == io::ErrorKind::PermissionDenied => {
            error!("Access denied reading directory {}: {}", dir.display(), err);
            return Ok(());
        }
        // Removed or replaced since its parent was listed.
        Err(err) => {
            warn!("Skipping directory {}: {}", dir.display(), err);
            return Ok(());
        }
    };

    entries.par_bridge().try_for_each(|entry_result| {
        let entry = match entry_result {
            Ok(entry) => entry,
            Err(err) => {
                warn!("Error reading entry in directory {}: {}", dir.display(), err);
                return Ok(());
            }
        };

        let path = entry.path();
        let metadata = match fs::symlink_metadata(&path) {
            Ok(metadata) => metadata,
            Err(err) => {
                warn!("Error getting metadata for {}: {}", path.display(), err);
                return Ok(());
            }
        };

        if metadata.is_dir() {
            visit_dirs(root, &path, files)?;
        } else if metadata.is_file() {
            let source = SourceFile::new(root, path);
            files
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .push(source);
        }
        Ok(())
    })
}
