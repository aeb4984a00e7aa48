use std::fs;
use std::io::Write;
use tempfile::tempdir;

use provenance_core::fingerprint::{self, compare};

fn write_file(dir: &std::path::Path, name: &str, size: usize) -> std::path::PathBuf {
    let path = dir.join(name);
    let mut file = fs::File::create(&path).unwrap();
    let mut remaining = size;
    let block: Vec<u8> = (0..4096u32).map(|i| (i * 7 % 251) as u8).collect();
    while remaining > 0 {
        let n = remaining.min(block.len());
        file.write_all(&block[..n]).unwrap();
        remaining -= n;
    }
    path
}

#[test]
fn test_dct_length_is_fixed_for_any_size() {
    let dir = tempdir().unwrap();
    for (name, size) in [
        ("empty.bin", 0),
        ("tiny.bin", 10),
        ("sample.bin", 65_536),
        ("large.bin", 10 * 1024 * 1024),
    ] {
        let path = write_file(dir.path(), name, size);
        let fp = fingerprint::fingerprint(&path).unwrap();
        assert_eq!(fp.dct_coefficients.len(), 32, "{}", name);
        assert_eq!(fp.perceptual_digest.len(), 16, "{}", name);
        assert!(fp.dct_coefficients.iter().all(|c| c.is_finite()), "{}", name);
    }
}

#[test]
fn test_only_leading_sample_matters() {
    let dir = tempdir().unwrap();
    let short = write_file(dir.path(), "short.bin", 65_536);
    let long = write_file(dir.path(), "long.bin", 200_000);

    let a = fingerprint::fingerprint(&short).unwrap();
    let b = fingerprint::fingerprint(&long).unwrap();
    assert_eq!(a, b);
}

#[test]
fn test_fingerprint_is_deterministic() {
    let dir = tempdir().unwrap();
    let path = write_file(dir.path(), "data.bin", 12_345);

    let a = fingerprint::fingerprint(&path).unwrap();
    let b = fingerprint::fingerprint(&path).unwrap();
    assert_eq!(a, b);

    let distance = compare(&a, &b);
    assert_eq!(distance.perceptual_hamming, 0);
    assert!((distance.similarity - 1.0).abs() < 1e-9);
}

#[test]
fn test_missing_file_is_an_io_error() {
    let dir = tempdir().unwrap();
    assert!(fingerprint::fingerprint(&dir.path().join("nope")).is_err());
}
