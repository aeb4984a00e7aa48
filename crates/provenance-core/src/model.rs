use crate::hasher::Algorithm;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Number of DCT coefficients kept in every fingerprint.
pub const DCT_COEFFICIENTS: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason", rename_all = "lowercase")]
pub enum RecordStatus {
    Ok,
    Failed(String),
}

/// Non-cryptographic signal statistics over the leading bytes of a file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalFingerprint {
    pub entropy: f64,
    pub zero_crossing_rate: f64,
    pub spectral_centroid: f64,
    pub dct_coefficients: [f64; DCT_COEFFICIENTS],
    pub perceptual_digest: String,
}

/// One processed file. Built by the scheduler, handed once to the recorder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub relative_path: String,
    #[serde(skip)]
    pub absolute_path: PathBuf,
    pub algorithm: Algorithm,
    pub digest: String,
    pub size_bytes: u64,
    pub modified_time: Option<DateTime<Utc>>,
    pub fingerprint: Option<SignalFingerprint>,
    pub status: RecordStatus,
}

impl FileRecord {
    /// A record for a file whose processing failed. The digest stays empty.
    pub fn failed(
        relative_path: &str,
        absolute_path: PathBuf,
        algorithm: Algorithm,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            relative_path: relative_path.to_string(),
            absolute_path,
            algorithm,
            digest: String::new(),
            size_bytes: 0,
            modified_time: None,
            fingerprint: None,
            status: RecordStatus::Failed(reason.into()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == RecordStatus::Ok
    }

    pub fn failure_reason(&self) -> Option<&str> {
        match &self.status {
            RecordStatus::Ok => None,
            RecordStatus::Failed(reason) => Some(reason),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseMetadata {
    pub version: Option<String>,
    pub label: Option<String>,
}

/// Aggregate over one invocation. Created once at completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanSession {
    pub root_path: String,
    pub algorithm: Algorithm,
    pub file_count: usize,
    pub failed_count: usize,
    pub total_size_bytes: u64,
    pub duration: Duration,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub execution_mode: String,
    pub release: Option<ReleaseMetadata>,
}

/// One row of provenance history for a relative path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub relative_path: String,
    pub algorithm: Algorithm,
    pub digest: String,
    pub size_bytes: u64,
    pub scan_time: DateTime<Utc>,
    pub status: RecordStatus,
    pub fingerprint: Option<SignalFingerprint>,
}
