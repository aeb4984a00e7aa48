use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::tempdir;

use provenance_core::engine::pool::{PoolError, PoolFactory, Task, WorkerPool};
use provenance_core::engine::Capability;
use provenance_core::hasher::HelperConfig;
use provenance_core::scanner::{IgnoreFilter, IncludeAll, SourceFile};
use provenance_core::{Algorithm, Error, ExecutionMode, ScanConfig, Scheduler, SilentReporter};

const SHA256_HELLO: &str = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";
const SHA256_EMPTY: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

/// Layout:
///   root/
///     a.txt   ("hello")
///     b.bin   (70000 zero bytes)
///     c.txt   (empty)
fn create_small_tree(root: &Path) {
    fs::create_dir_all(root).unwrap();
    fs::write(root.join("a.txt"), "hello").unwrap();
    fs::write(root.join("b.bin"), vec![0u8; 70_000]).unwrap();
    fs::write(root.join("c.txt"), "").unwrap();
}

fn create_numbered_tree(root: &Path, count: usize) {
    for i in 0..count {
        let dir = root.join(format!("dir_{}", i % 5));
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(format!("file_{:03}.txt", i)), format!("content {}", i)).unwrap();
    }
}

/// Runs every task on the submitting thread.
struct InlinePool;

impl WorkerPool for InlinePool {
    fn size(&self) -> usize {
        2
    }

    fn submit(&self, task: Task) -> Result<(), PoolError> {
        task();
        Ok(())
    }
}

struct InlinePoolFactory;

impl PoolFactory for InlinePoolFactory {
    fn build(&self, _workers: usize) -> Result<Arc<dyn WorkerPool>, PoolError> {
        Ok(Arc::new(InlinePool))
    }
}

struct UnavailablePoolFactory;

impl PoolFactory for UnavailablePoolFactory {
    fn build(&self, _workers: usize) -> Result<Arc<dyn WorkerPool>, PoolError> {
        Err(PoolError::ConcurrencyUnavailable("threads disabled".to_string()))
    }
}

/// Accepts `limit` submissions (the probe included), then rejects.
struct RejectingPool {
    limit: usize,
    submitted: AtomicUsize,
}

impl WorkerPool for RejectingPool {
    fn size(&self) -> usize {
        2
    }

    fn submit(&self, task: Task) -> Result<(), PoolError> {
        if self.submitted.fetch_add(1, Ordering::SeqCst) >= self.limit {
            return Err(PoolError::Rejected("queue full".to_string()));
        }
        task();
        Ok(())
    }
}

struct RejectingPoolFactory {
    limit: usize,
}

impl PoolFactory for RejectingPoolFactory {
    fn build(&self, _workers: usize) -> Result<Arc<dyn WorkerPool>, PoolError> {
        Ok(Arc::new(RejectingPool {
            limit: self.limit,
            submitted: AtomicUsize::new(0),
        }))
    }
}

/// Runs the probe, then silently drops every task it accepts.
struct DroppingPool {
    submitted: AtomicUsize,
}

impl WorkerPool for DroppingPool {
    fn size(&self) -> usize {
        2
    }

    fn submit(&self, task: Task) -> Result<(), PoolError> {
        if self.submitted.fetch_add(1, Ordering::SeqCst) == 0 {
            task();
        }
        Ok(())
    }
}

struct DroppingPoolFactory;

impl PoolFactory for DroppingPoolFactory {
    fn build(&self, _workers: usize) -> Result<Arc<dyn WorkerPool>, PoolError> {
        Ok(Arc::new(DroppingPool {
            submitted: AtomicUsize::new(0),
        }))
    }
}

fn digests(records: &[provenance_core::FileRecord]) -> Vec<(String, String)> {
    records
        .iter()
        .map(|r| (r.relative_path.clone(), r.digest.clone()))
        .collect()
}

#[test]
fn test_small_tree_sha256() {
    let tmp = tempdir().unwrap();
    let root = tmp.path().join("root");
    create_small_tree(&root);

    let scheduler = Scheduler::new(ScanConfig::new(Algorithm::Sha256));
    let output = scheduler.scan_tree(&root, &IncludeAll, &SilentReporter).unwrap();

    let paths: Vec<&str> = output.records.iter().map(|r| r.relative_path.as_str()).collect();
    assert_eq!(paths, vec!["a.txt", "b.bin", "c.txt"]);
    assert!(output.records.iter().all(|r| r.is_ok()));
    assert_eq!(output.records[0].digest, SHA256_HELLO);
    assert_eq!(output.records[0].size_bytes, 5);
    assert_eq!(output.records[1].size_bytes, 70_000);
    assert_eq!(output.records[2].digest, SHA256_EMPTY);
    assert!(output.records.iter().all(|r| r.fingerprint.is_none()));

    assert_eq!(output.session.file_count, 3);
    assert_eq!(output.session.failed_count, 0);
    assert_eq!(output.session.total_size_bytes, 70_005);
    assert_eq!(output.capability, Capability::Available);
    assert_eq!(output.mode, ExecutionMode::Parallel);
}

#[test]
fn test_fingerprint_attached_when_enabled() {
    let tmp = tempdir().unwrap();
    let root = tmp.path().join("root");
    create_small_tree(&root);

    let config = ScanConfig::new(Algorithm::Sha1).with_fingerprint(true);
    let output = Scheduler::new(config)
        .scan_tree(&root, &IncludeAll, &SilentReporter)
        .unwrap();

    for record in &output.records {
        let fp = record.fingerprint.as_ref().expect("fingerprint missing");
        assert_eq!(fp.dct_coefficients.len(), 32);
    }
    let zeros = output.records[1].fingerprint.as_ref().unwrap();
    assert_eq!(zeros.entropy, 0.0);
}

#[test]
fn test_repeated_runs_are_identical() {
    let tmp = tempdir().unwrap();
    let root = tmp.path().join("root");
    create_numbered_tree(&root, 40);

    let scheduler = Scheduler::new(ScanConfig::new(Algorithm::Sha512).with_fingerprint(true));
    let first = scheduler.scan_tree(&root, &IncludeAll, &SilentReporter).unwrap();
    let second = scheduler.scan_tree(&root, &IncludeAll, &SilentReporter).unwrap();

    assert_eq!(first.records.len(), 40);
    assert_eq!(digests(&first.records), digests(&second.records));
    let fingerprints = |o: &provenance_core::ScanOutput| {
        o.records
            .iter()
            .map(|r| r.fingerprint.clone())
            .collect::<Vec<_>>()
    };
    assert_eq!(fingerprints(&first), fingerprints(&second));
}

#[test]
fn test_unavailable_concurrency_matches_sequential_run() {
    let tmp = tempdir().unwrap();
    let root = tmp.path().join("root");
    create_numbered_tree(&root, 50);

    let fallback = Scheduler::new(ScanConfig::new(Algorithm::Sha256))
        .with_pool_factory(Arc::new(UnavailablePoolFactory))
        .scan_tree(&root, &IncludeAll, &SilentReporter)
        .unwrap();
    let sequential = Scheduler::new(ScanConfig::new(Algorithm::Sha256).with_force_sequential(true))
        .scan_tree(&root, &IncludeAll, &SilentReporter)
        .unwrap();

    assert_eq!(fallback.records.len(), 50);
    assert_eq!(fallback.capability, Capability::Unavailable);
    assert_eq!(fallback.mode, ExecutionMode::Sequential);
    assert_eq!(sequential.capability, Capability::Unknown);
    assert_eq!(digests(&fallback.records), digests(&sequential.records));
}

#[test]
fn test_rejected_submission_falls_back_without_losing_files() {
    let tmp = tempdir().unwrap();
    let root = tmp.path().join("root");
    create_numbered_tree(&root, 30);

    // Probe plus ten files, then every submission is refused.
    let output = Scheduler::new(ScanConfig::new(Algorithm::Sha256))
        .with_pool_factory(Arc::new(RejectingPoolFactory { limit: 11 }))
        .scan_tree(&root, &IncludeAll, &SilentReporter)
        .unwrap();
    let reference = Scheduler::new(ScanConfig::new(Algorithm::Sha256))
        .with_pool_factory(Arc::new(InlinePoolFactory))
        .scan_tree(&root, &IncludeAll, &SilentReporter)
        .unwrap();

    assert_eq!(output.mode, ExecutionMode::ParallelWithFallback);
    assert_eq!(output.capability, Capability::Available);
    assert_eq!(output.failed_count(), 0);
    assert_eq!(digests(&output.records), digests(&reference.records));
    assert_eq!(output.session.execution_mode, "parallel-with-fallback");
}

#[test]
fn test_dropped_tasks_become_failed_records() {
    let tmp = tempdir().unwrap();
    let root = tmp.path().join("root");
    create_small_tree(&root);

    let output = Scheduler::new(ScanConfig::new(Algorithm::Sha256))
        .with_pool_factory(Arc::new(DroppingPoolFactory))
        .scan_tree(&root, &IncludeAll, &SilentReporter)
        .unwrap();

    assert_eq!(output.records.len(), 3);
    assert_eq!(output.failed_count(), 3);
    for record in &output.records {
        assert!(record.digest.is_empty());
        assert!(record.failure_reason().unwrap().contains("lost"));
    }
}

#[test]
fn test_digest_length_matches_algorithm() {
    let tmp = tempdir().unwrap();
    let root = tmp.path().join("root");
    create_small_tree(&root);

    for algorithm in [Algorithm::Sha1, Algorithm::Sha256, Algorithm::Sha384, Algorithm::Sha512] {
        let output = Scheduler::new(ScanConfig::new(algorithm))
            .scan_tree(&root, &IncludeAll, &SilentReporter)
            .unwrap();
        for record in &output.records {
            assert_eq!(record.algorithm, algorithm);
            assert_eq!(record.digest.len(), algorithm.hex_len(), "{}", algorithm);
            assert!(record.digest.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        }
    }
}

#[test]
fn test_sidecar_digest_overrides_computation() {
    let tmp = tempdir().unwrap();
    let root = tmp.path().join("root");
    create_small_tree(&root);
    let published = "ab".repeat(32);
    fs::write(root.join("a.txt.sha256"), format!("{}  a.txt\n", published.to_uppercase())).unwrap();

    let with_sidecar = Scheduler::new(ScanConfig::new(Algorithm::Sha256).with_sidecar(true))
        .scan_tree(&root, &IncludeAll, &SilentReporter)
        .unwrap();
    let without = Scheduler::new(ScanConfig::new(Algorithm::Sha256))
        .scan_tree(&root, &IncludeAll, &SilentReporter)
        .unwrap();

    let find = |o: &provenance_core::ScanOutput, path: &str| {
        o.records
            .iter()
            .find(|r| r.relative_path == path)
            .map(|r| r.digest.clone())
            .unwrap()
    };
    assert_eq!(find(&with_sidecar, "a.txt"), published);
    assert_eq!(find(&without, "a.txt"), SHA256_HELLO);
}

#[test]
fn test_missing_root_aborts() {
    let tmp = tempdir().unwrap();
    let scheduler = Scheduler::new(ScanConfig::new(Algorithm::Sha256));
    let err = scheduler
        .scan_tree(&tmp.path().join("nope"), &IncludeAll, &SilentReporter)
        .unwrap_err();
    assert!(matches!(err, Error::RootMissing(_)));
}

#[test]
fn test_duplicate_input_aborts() {
    let tmp = tempdir().unwrap();
    let root = tmp.path().join("root");
    create_small_tree(&root);

    let file = SourceFile::new(&root, root.join("a.txt"));
    let scheduler = Scheduler::new(ScanConfig::new(Algorithm::Sha256));
    let err = scheduler
        .run(&root, vec![file.clone(), file], &IncludeAll, &SilentReporter)
        .unwrap_err();
    assert!(matches!(err, Error::DuplicatePath(p) if p == "a.txt"));
}

#[test]
fn test_vanished_file_yields_failed_record() {
    let tmp = tempdir().unwrap();
    let root = tmp.path().join("root");
    create_small_tree(&root);

    let files = vec![
        SourceFile::new(&root, root.join("a.txt")),
        SourceFile::new(&root, root.join("gone.txt")),
    ];
    let output = Scheduler::new(ScanConfig::new(Algorithm::Sha256))
        .run(&root, files, &IncludeAll, &SilentReporter)
        .unwrap();

    assert_eq!(output.records.len(), 2);
    assert!(output.records[0].is_ok());
    assert!(output.records[1].failure_reason().unwrap().starts_with("IO error"));
    assert_eq!(output.session.failed_count, 1);
}

#[test]
fn test_ignore_filter_limits_the_run() {
    let tmp = tempdir().unwrap();
    let root = tmp.path().join("root");
    create_small_tree(&root);
    fs::create_dir_all(root.join(".git")).unwrap();
    fs::write(root.join(".git").join("HEAD"), "ref").unwrap();

    let filter = IgnoreFilter::new(&root, &[".git/*".to_string(), "*.bin".to_string()]);
    let output = Scheduler::new(ScanConfig::new(Algorithm::Sha256))
        .scan_tree(&root, &filter, &SilentReporter)
        .unwrap();

    let paths: Vec<&str> = output.records.iter().map(|r| r.relative_path.as_str()).collect();
    assert_eq!(paths, vec!["a.txt", "c.txt"]);
}

#[test]
fn test_empty_tree_produces_empty_session() {
    let tmp = tempdir().unwrap();
    let output = Scheduler::new(ScanConfig::new(Algorithm::Sha256))
        .scan_tree(tmp.path(), &IncludeAll, &SilentReporter)
        .unwrap();
    assert!(output.records.is_empty());
    assert_eq!(output.session.file_count, 0);
    assert_eq!(output.capability, Capability::Unknown);
}

#[cfg(unix)]
#[test]
fn test_blake2b_runs_sequentially_through_helper() {
    let tmp = tempdir().unwrap();
    let root = tmp.path().join("root");
    create_small_tree(&root);

    // Stand-in helper: prints a fixed digest of the requested size.
    let script = tmp.path().join("fake-b2sum.sh");
    fs::write(
        &script,
        "#!/bin/sh\nn=$2\nout=''\nwhile [ \"$n\" -gt 0 ]; do out=\"${out}ab\"; n=$((n - 1)); done\necho \"$out  $1\"\n",
    )
    .unwrap();
    let helper = HelperConfig {
        program: "sh".to_string(),
        args: vec![script.to_string_lossy().into_owned()],
        digest_size: 32,
    };

    let output = Scheduler::new(ScanConfig::new(Algorithm::Blake2b).with_helper(helper))
        .scan_tree(&root, &IncludeAll, &SilentReporter)
        .unwrap();

    assert_eq!(output.mode, ExecutionMode::Sequential);
    assert_eq!(output.capability, Capability::Unknown);
    assert_eq!(output.failed_count(), 0);
    for record in &output.records {
        assert_eq!(record.digest, "ab".repeat(32));
    }
}

#[test]
fn test_blake2b_missing_helper_fails_per_file() {
    let tmp = tempdir().unwrap();
    let root = tmp.path().join("root");
    create_small_tree(&root);

    let helper = HelperConfig {
        program: "provenance-helper-that-does-not-exist".to_string(),
        ..HelperConfig::default()
    };
    let output = Scheduler::new(ScanConfig::new(Algorithm::Blake2b).with_helper(helper))
        .scan_tree(&root, &IncludeAll, &SilentReporter)
        .unwrap();

    assert_eq!(output.records.len(), 3);
    assert_eq!(output.failed_count(), 3);
    assert!(output.records[0]
        .failure_reason()
        .unwrap()
        .contains("hashing helper failed"));
}

#[cfg(target_os = "linux")]
#[test]
fn test_undecodable_names_get_distinct_records() {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    let tmp = tempdir().unwrap();
    let root = tmp.path().join("root");
    fs::create_dir_all(&root).unwrap();
    fs::write(root.join(OsStr::from_bytes(b"\xff.bin")), "one").unwrap();
    fs::write(root.join(OsStr::from_bytes(b"\xfe.bin")), "two").unwrap();

    let output = Scheduler::new(ScanConfig::new(Algorithm::Sha256))
        .scan_tree(&root, &IncludeAll, &SilentReporter)
        .unwrap();

    let paths: Vec<&str> = output.records.iter().map(|r| r.relative_path.as_str()).collect();
    assert_eq!(paths, vec!["\\xfe.bin", "\\xff.bin"]);
    assert_eq!(output.failed_count(), 0);
    assert_ne!(output.records[0].digest, output.records[1].digest);
}
