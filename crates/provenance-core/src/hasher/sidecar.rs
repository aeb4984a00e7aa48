use super::Algorithm;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

const MIN_SIDECAR_HEX: usize = 40;
const MAX_SIDECAR_HEX: usize = 128;

/// `<path>.<algorithm>`, e.g. `release.tar.sha256`.
pub fn sidecar_path(path: &Path, algorithm: Algorithm) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".");
    name.push(algorithm.as_str());
    PathBuf::from(name)
}

/// Read a precomputed digest from the sidecar next to `path`.
///
/// Returns `None` when the sidecar is missing, unreadable, or holds no hex run
/// of the expected length; the caller then computes the digest itself.
pub fn read_sidecar_digest(path: &Path, algorithm: Algorithm, expected_len: usize) -> Option<String> {
    let sidecar = sidecar_path(path, algorithm);
    let content = match fs::read_to_string(&sidecar) {
        Ok(content) => content,
        Err(_) => return None,
    };

    match first_hex_run(&content) {
        Some(run) if run.len() == expected_len => Some(run.to_ascii_lowercase()),
        Some(run) => {
            debug!(
                "Ignoring sidecar {}: {} hex chars, expected {}",
                sidecar.display(),
                run.len(),
                expected_len
            );
            None
        }
        None => {
            debug!("Ignoring sidecar {}: no digest found", sidecar.display());
            None
        }
    }
}

/// First maximal run of hex digits whose length is within the sidecar bounds.
pub(crate) fn first_hex_run(content: &str) -> Option<&str> {
    let in_bounds = |len: usize| (MIN_SIDECAR_HEX..=MAX_SIDECAR_HEX).contains(&len);
    let mut start = None;

    for (i, b) in content.bytes().enumerate() {
        if b.is_ascii_hexdigit() {
            start.get_or_insert(i);
            continue;
        }
        if let Some(s) = start.take() {
            if in_bounds(i - s) {
                return Some(&content[s..i]);
            }
        }
    }

    match start {
        Some(s) if in_bounds(content.len() - s) => Some(&content[s..]),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_first_hex_run_skips_short_runs() {
        let digest = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";
        let content = format!("cafe {}  empty.txt\n", digest);
        assert_eq!(first_hex_run(&content), Some(digest));
    }

    #[test]
    fn test_first_hex_run_rejects_overlong_runs() {
        assert_eq!(first_hex_run(&"a".repeat(130)), None);
        assert_eq!(first_hex_run("no digest here"), None);
    }

    #[test]
    fn test_sidecar_read_and_fallthrough() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("data.bin");
        fs::write(&target, b"payload").unwrap();

        assert_eq!(read_sidecar_digest(&target, Algorithm::Sha1, 40), None);

        let digest = "A".repeat(40);
        fs::write(sidecar_path(&target, Algorithm::Sha1), format!("{}\n", digest)).unwrap();
        assert_eq!(
            read_sidecar_digest(&target, Algorithm::Sha1, 40),
            Some("a".repeat(40))
        );
        // Right file, wrong length for the algorithm.
        assert_eq!(read_sidecar_digest(&target, Algorithm::Sha1, 64), None);
    }
}
