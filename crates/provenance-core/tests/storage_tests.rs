use chrono::{Duration, TimeZone, Utc};
use std::fs;
use std::path::PathBuf;
use tempfile::tempdir;

use provenance_core::error::StoreError;
use provenance_core::model::HistoryEntry;
use provenance_core::scanner::IncludeAll;
use provenance_core::storage::{MemoryStore, ProvenanceStore, SqliteStore};
use provenance_core::{
    Algorithm, Error, FileRecord, ProvenanceRecorder, RecordStatus, ScanConfig, ScanSession, Scheduler,
    SilentReporter,
};

fn make_record(path: &str, digest: &str) -> FileRecord {
    FileRecord {
        relative_path: path.to_string(),
        absolute_path: PathBuf::from("/data").join(path),
        algorithm: Algorithm::Sha1,
        digest: digest.to_string(),
        size_bytes: 42,
        modified_time: Some(Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()),
        fingerprint: Some(provenance_core::fingerprint::from_sample(b"provenance")),
        status: RecordStatus::Ok,
    }
}

fn make_session(file_count: usize) -> ScanSession {
    let now = Utc::now();
    ScanSession {
        root_path: "/data".to_string(),
        algorithm: Algorithm::Sha1,
        file_count,
        failed_count: 0,
        total_size_bytes: 42 * file_count as u64,
        duration: std::time::Duration::from_millis(12),
        started_at: now,
        completed_at: now,
        execution_mode: "sequential".to_string(),
        release: None,
    }
}

fn assert_newest_first(history: &[HistoryEntry]) {
    for pair in history.windows(2) {
        assert!(pair[0].scan_time >= pair[1].scan_time);
    }
}

fn exercise_history(store: &mut dyn ProvenanceStore) {
    let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let t1 = t0 + Duration::days(1);
    let t2 = t0 + Duration::days(2);

    store.append_record(&make_record("a.txt", &"11".repeat(20)), t0).unwrap();
    store.append_record(&make_record("a.txt", &"33".repeat(20)), t2).unwrap();
    store.append_record(&make_record("a.txt", &"22".repeat(20)), t1).unwrap();
    store.append_record(&make_record("b.txt", &"44".repeat(20)), t1).unwrap();

    let history = store.history("a.txt").unwrap();
    assert_eq!(history.len(), 3);
    assert_newest_first(&history);
    assert_eq!(history[0].digest, "33".repeat(20));
    assert_eq!(history[0].scan_time, t2);
    assert_eq!(history[2].digest, "11".repeat(20));
    assert!(history[0].fingerprint.is_some());

    assert!(store.history("missing.txt").unwrap().is_empty());
}

#[test]
fn test_sqlite_history_newest_first() {
    let mut store = SqliteStore::open_in_memory().unwrap();
    exercise_history(&mut store);
}

#[test]
fn test_memory_history_newest_first() {
    let mut store = MemoryStore::new();
    exercise_history(&mut store);
    assert_eq!(store.len(), 4);
}

#[test]
fn test_sqlite_rejects_duplicate_key() {
    let mut store = SqliteStore::open_in_memory().unwrap();
    let t0 = Utc::now();
    let record = make_record("a.txt", &"11".repeat(20));
    store.append_record(&record, t0).unwrap();
    assert!(store.append_record(&record, t0).is_err());

    // Same path under a different scan time is a new row.
    store
        .append_record(&record, t0 + Duration::seconds(1))
        .unwrap();
    assert_eq!(store.history("a.txt").unwrap().len(), 2);
}

#[test]
fn test_sqlite_failed_record_round_trips_status() {
    let mut store = SqliteStore::open_in_memory().unwrap();
    let failed = FileRecord::failed("bad.txt", PathBuf::from("/data/bad.txt"), Algorithm::Sha1, "IO error: denied");
    store.append_record(&failed, Utc::now()).unwrap();

    let history = store.history("bad.txt").unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, RecordStatus::Failed("IO error: denied".to_string()));
    assert!(history[0].digest.is_empty());
}

#[test]
fn test_sqlite_store_persists_across_reopen() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("provenance.db");
    let db_path = db_path.to_str().unwrap();

    {
        let mut store = SqliteStore::open(db_path).unwrap();
        store
            .append_records(&[make_record("a.txt", &"11".repeat(20))], Utc::now())
            .unwrap();
        store.append_session(&make_session(1)).unwrap();
    }

    let store = SqliteStore::open(db_path).unwrap();
    assert_eq!(store.history("a.txt").unwrap().len(), 1);
    assert_eq!(store.session_count().unwrap(), 1);
}

/// A store whose backend is gone.
struct BrokenStore;

impl ProvenanceStore for BrokenStore {
    fn append_record(&mut self, _record: &FileRecord, _scan_time: chrono::DateTime<Utc>) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("disk full".to_string()))
    }

    fn append_session(&mut self, _session: &ScanSession) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("disk full".to_string()))
    }

    fn history(&self, _relative_path: &str) -> Result<Vec<HistoryEntry>, StoreError> {
        Err(StoreError::Unavailable("disk full".to_string()))
    }
}

#[test]
fn test_recorder_keeps_records_when_store_fails() {
    let mut recorder = ProvenanceRecorder::new(Box::new(BrokenStore));
    let records = vec![make_record("a.txt", &"11".repeat(20)), make_record("b.txt", &"22".repeat(20))];

    let err = recorder.record(records).unwrap_err();
    assert!(matches!(err, Error::StoreUnavailable(_)));
    assert_eq!(recorder.records().len(), 2);
    assert!(matches!(recorder.history("a.txt"), Err(Error::StoreUnavailable(_))));
}

#[test]
fn test_recorder_run_with_broken_store_warns() {
    let tmp = tempdir().unwrap();
    fs::write(tmp.path().join("a.txt"), "hello").unwrap();
    let output = Scheduler::new(ScanConfig::new(Algorithm::Sha256))
        .scan_tree(tmp.path(), &IncludeAll, &SilentReporter)
        .unwrap();

    let mut recorder = ProvenanceRecorder::new(Box::new(BrokenStore));
    let receipt = recorder.record_run(output);

    assert_eq!(receipt.stored_records, 0);
    assert!(!receipt.session_stored);
    assert_eq!(receipt.warnings.len(), 2);
    assert_eq!(recorder.records().len(), 1);
    assert!(recorder.session().is_some());
}

#[test]
fn test_recorder_with_sqlite_store() {
    let tmp = tempdir().unwrap();
    fs::write(tmp.path().join("a.txt"), "hello").unwrap();
    fs::write(tmp.path().join("b.txt"), "world").unwrap();
    let output = Scheduler::new(ScanConfig::new(Algorithm::Sha256))
        .scan_tree(tmp.path(), &IncludeAll, &SilentReporter)
        .unwrap();

    let store = SqliteStore::open_in_memory().unwrap();
    let mut recorder = ProvenanceRecorder::new(Box::new(store));
    let receipt = recorder.record_run(output);

    assert_eq!(receipt.stored_records, 2);
    assert!(receipt.session_stored);
    assert!(receipt.warnings.is_empty());

    let history = recorder.history("b.txt").unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].scan_time, recorder.scan_time());
}

#[test]
fn test_in_memory_recorder_answers_history_from_current_run() {
    let mut recorder = ProvenanceRecorder::in_memory();
    let ack = recorder.record(vec![make_record("a.txt", &"11".repeat(20))]).unwrap();
    assert_eq!(ack.stored, 0);

    let history = recorder.history("a.txt").unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].digest, "11".repeat(20));
}
