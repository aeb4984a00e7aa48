/// Trait for reporting scan progress.
///
/// Progress is a side channel: the scheduler calls it from its own thread only,
/// and nothing it does can influence the records produced.
/// All methods have default no-op implementations.
pub trait ProgressReporter: Send + Sync {
    fn on_enumerate_complete(&self, _total_files: usize, _duration_secs: f64) {}
    fn on_digest_start(&self, _total_files: usize) {}
    fn on_file_processed(&self, _processed: usize, _total_files: usize) {}
    fn on_fallback(&self, _reason: &str) {}
    fn on_digest_complete(&self, _total_files: usize, _failed: usize, _duration_secs: f64) {}
    fn on_record_start(&self) {}
    fn on_record_complete(&self, _rows: usize, _duration_secs: f64) {}
}

/// No-op progress reporter for silent operation.
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {}
