use super::{history_entry, ProvenanceStore};
use crate::error::StoreError;
use crate::model::{FileRecord, HistoryEntry, ScanSession};
use chrono::{DateTime, Utc};

/// Store that lives for the process only.
#[derive(Debug, Default)]
pub struct MemoryStore {
    rows: Vec<HistoryEntry>,
    sessions: Vec<ScanSession>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sessions(&self) -> &[ScanSession] {
        &self.sessions
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl ProvenanceStore for MemoryStore {
    fn append_record(&mut self, record: &FileRecord, scan_time: DateTime<Utc>) -> Result<(), StoreError> {
        let duplicate = self.rows.iter().any(|row| {
            row.relative_path == record.relative_path
                && row.algorithm == record.algorithm
                && row.scan_time == scan_time
        });
        if duplicate {
            return Err(StoreError::Unavailable(format!(
                "duplicate provenance key for {} ({}, {})",
                record.relative_path, record.algorithm, scan_time
            )));
        }
        self.rows.push(history_entry(record, scan_time));
        Ok(())
    }

    fn append_session(&mut self, session: &ScanSession) -> Result<(), StoreError> {
        self.sessions.push(session.clone());
        Ok(())
    }

    fn history(&self, relative_path: &str) -> Result<Vec<HistoryEntry>, StoreError> {
        let mut rows: Vec<HistoryEntry> = self
            .rows
            .iter()
            .filter(|row| row.relative_path == relative_path)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.scan_time.cmp(&a.scan_time));
        Ok(rows)
    }
}
