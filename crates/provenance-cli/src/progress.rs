use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use provenance_core::ProgressReporter;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

const TICK_CHARS: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏";

/// CLI progress reporter using indicatif progress bars.
///
/// - Digest phase: progress bar (total known after enumeration)
/// - Record phase: spinner
pub struct CliReporter {
    bar: Mutex<Option<ProgressBar>>,
}

impl CliReporter {
    pub fn new() -> Self {
        Self {
            bar: Mutex::new(None),
        }
    }

    fn slot(&self) -> MutexGuard<'_, Option<ProgressBar>> {
        self.bar.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn set_bar(&self, pb: ProgressBar) {
        let mut guard = self.slot();
        if let Some(old) = guard.take() {
            old.finish_and_clear();
        }
        *guard = Some(pb);
    }

    fn finish_bar(&self) {
        if let Some(pb) = self.slot().take() {
            pb.finish_and_clear();
        }
    }

    fn spinner(message: &'static str) -> ProgressBar {
        let pb = ProgressBar::new_spinner();
        let template = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        pb.set_style(template.tick_chars(TICK_CHARS));
        pb.set_message(message);
        pb.enable_steady_tick(Duration::from_millis(80));
        pb
    }
}

impl ProgressReporter for CliReporter {
    fn on_enumerate_complete(&self, total_files: usize, duration_secs: f64) {
        eprintln!(
            "  {} Enumerated {} files in {:.2}s",
            style("✓").green(),
            total_files,
            duration_secs
        );
    }

    fn on_digest_start(&self, total_files: usize) {
        let pb = ProgressBar::new(total_files as u64);
        let template = ProgressStyle::with_template(
            "  {spinner:.cyan} Digesting [{bar:30.cyan/dim}] {pos}/{len} files ({eta} remaining)",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar());
        pb.set_style(template.progress_chars("━╸─").tick_chars(TICK_CHARS));
        pb.enable_steady_tick(Duration::from_millis(80));
        self.set_bar(pb);
    }

    fn on_file_processed(&self, processed: usize, total_files: usize) {
        if let Some(pb) = self.slot().as_ref() {
            if pb.length() != Some(total_files as u64) {
                pb.set_length(total_files as u64);
            }
            pb.set_position(processed as u64);
        }
    }

    fn on_fallback(&self, reason: &str) {
        if let Some(pb) = self.slot().as_ref() {
            pb.println(format!("  {} {}; continuing sequentially", style("!").yellow(), reason));
        }
    }

    fn on_digest_complete(&self, total_files: usize, failed: usize, duration_secs: f64) {
        self.finish_bar();
        let mark = if failed == 0 {
            style("✓").green()
        } else {
            style("✗").red()
        };
        eprintln!(
            "  {} Digest complete: {} files, {} failed in {:.2}s",
            mark, total_files, failed, duration_secs
        );
    }

    fn on_record_start(&self) {
        self.set_bar(Self::spinner("Recording provenance..."));
    }

    fn on_record_complete(&self, rows: usize, duration_secs: f64) {
        self.finish_bar();
        eprintln!(
            "  {} Recorded {} rows in {:.2}s",
            style("✓").green(),
            rows,
            duration_secs
        );
    }
}
