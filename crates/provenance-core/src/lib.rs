pub mod config;
pub mod engine;
pub mod error;
pub mod fingerprint;
pub mod hasher;
pub mod index;
pub mod model;
pub mod progress;
pub mod recorder;
pub mod scanner;
pub mod storage;

pub use config::{AppConfig, ScanConfig};
pub use engine::{ExecutionMode, ScanOutput, Scheduler};
pub use error::Error;
pub use hasher::{Algorithm, DigestProvider};
pub use model::{FileRecord, RecordStatus, ScanSession, SignalFingerprint};
pub use progress::{ProgressReporter, SilentReporter};
pub use recorder::ProvenanceRecorder;
