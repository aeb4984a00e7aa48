pub mod memory;
pub mod sqlite;

use crate::error::StoreError;
use crate::model::{FileRecord, HistoryEntry, ScanSession};
use chrono::{DateTime, SecondsFormat, Utc};

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Append-only provenance sink keyed by `(relative_path, algorithm, scan_time)`.
///
/// The engine needs nothing else from a store: it never updates or deletes.
pub trait ProvenanceStore: Send {
    /// Append one record. Must be atomic per record.
    fn append_record(&mut self, record: &FileRecord, scan_time: DateTime<Utc>) -> Result<(), StoreError>;

    fn append_records(&mut self, records: &[FileRecord], scan_time: DateTime<Utc>) -> Result<usize, StoreError> {
        for record in records {
            self.append_record(record, scan_time)?;
        }
        Ok(records.len())
    }

    fn append_session(&mut self, session: &ScanSession) -> Result<(), StoreError>;

    /// All stored rows for `relative_path`, newest scan first.
    fn history(&self, relative_path: &str) -> Result<Vec<HistoryEntry>, StoreError>;
}

/// Fixed-width UTC timestamps sort lexicographically in scan order.
pub(crate) fn format_timestamp(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("bad timestamp '{}': {}", value, e)))
}

pub(crate) fn history_entry(record: &FileRecord, scan_time: DateTime<Utc>) -> HistoryEntry {
    HistoryEntry {
        relative_path: record.relative_path.clone(),
        algorithm: record.algorithm,
        digest: record.digest.clone(),
        size_bytes: record.size_bytes,
        scan_time,
        status: record.status.clone(),
        fingerprint: record.fingerprint.clone(),
    }
}
