//! The provenance recorder: the one sink for finished runs.
//!
//! The current run's records and session are always kept in memory. Forwarding
//! to the persistent store is best effort; a store failure is reported as
//! [`Error::StoreUnavailable`] and never loses the in-memory result.

use crate::engine::ScanOutput;
use crate::error::Error;
use crate::model::{FileRecord, HistoryEntry, ScanSession};
use crate::storage::{history_entry, ProvenanceStore};
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack {
    /// Rows written to the persistent store; 0 when running without one.
    pub stored: usize,
}

/// Outcome of [`ProvenanceRecorder::record_run`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordReceipt {
    pub stored_records: usize,
    pub session_stored: bool,
    pub warnings: Vec<String>,
}

pub struct ProvenanceRecorder {
    store: Option<Box<dyn ProvenanceStore>>,
    scan_time: DateTime<Utc>,
    records: Vec<FileRecord>,
    session: Option<ScanSession>,
}

impl ProvenanceRecorder {
    pub fn new(store: Box<dyn ProvenanceStore>) -> Self {
        Self {
            store: Some(store),
            scan_time: Utc::now(),
            records: Vec::new(),
            session: None,
        }
    }

    /// A recorder that keeps results in memory only.
    pub fn in_memory() -> Self {
        Self {
            store: None,
            scan_time: Utc::now(),
            records: Vec::new(),
            session: None,
        }
    }

    /// Key under which this recorder appends records.
    pub fn with_scan_time(mut self, scan_time: DateTime<Utc>) -> Self {
        self.scan_time = scan_time;
        self
    }

    pub fn scan_time(&self) -> DateTime<Utc> {
        self.scan_time
    }

    pub fn record(&mut self, records: Vec<FileRecord>) -> Result<Ack, Error> {
        let stored = match self.store.as_mut() {
            Some(store) => store.append_records(&records, self.scan_time),
            None => Ok(0),
        };
        self.records.extend(records);
        let stored = stored?;
        debug!("Recorded {} records ({} stored)", self.records.len(), stored);
        Ok(Ack { stored })
    }

    pub fn record_session(&mut self, session: ScanSession) -> Result<Ack, Error> {
        let stored = match self.store.as_mut() {
            Some(store) => store.append_session(&session).map(|_| 1),
            None => Ok(0),
        };
        self.session = Some(session);
        Ok(Ack { stored: stored? })
    }

    /// Hand over a finished run. Store failures are downgraded to warnings.
    pub fn record_run(&mut self, output: ScanOutput) -> RecordReceipt {
        let mut receipt = RecordReceipt::default();

        match self.record(output.records) {
            Ok(ack) => receipt.stored_records = ack.stored,
            Err(e) => {
                warn!("Provenance records not stored: {}", e);
                receipt.warnings.push(e.to_string());
            }
        }

        match self.record_session(output.session) {
            Ok(ack) => receipt.session_stored = ack.stored > 0,
            Err(e) => {
                warn!("Scan session not stored: {}", e);
                receipt.warnings.push(e.to_string());
            }
        }

        receipt
    }

    /// Records of the current run, sorted as they were handed over.
    pub fn records(&self) -> &[FileRecord] {
        &self.records
    }

    pub fn session(&self) -> Option<&ScanSession> {
        self.session.as_ref()
    }

    /// Stored history for `relative_path`, newest first. Without a store only
    /// the current run is known.
    pub fn history(&self, relative_path: &str) -> Result<Vec<HistoryEntry>, Error> {
        match &self.store {
            Some(store) => Ok(store.history(relative_path)?),
            None => Ok(self
                .records
                .iter()
                .filter(|r| r.relative_path == relative_path)
                .map(|r| history_entry(r, self.scan_time))
                .collect()),
        }
    }
}
