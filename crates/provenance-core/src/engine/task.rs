use crate::fingerprint;
use crate::hasher::DigestProvider;
use crate::model::{FileRecord, RecordStatus};
use crate::scanner::SourceFile;
use chrono::{DateTime, Utc};
use std::any::Any;
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::Sender;
use tracing::{error, trace};

pub(crate) const LOST_RESULT: &str = "task result lost: worker dropped the task before completion";

/// Everything a worker needs to turn a file into a record. Shared read-only.
pub(crate) struct TaskContext {
    pub provider: DigestProvider,
    pub read_sidecar: bool,
    pub fingerprint: bool,
}

pub(crate) enum TaskOutcome {
    Finished(FileRecord),
    Lost,
}

pub(crate) struct TaskMessage {
    pub index: usize,
    pub outcome: TaskOutcome,
}

/// Reports a task's record back to the scheduler exactly once. A task that is
/// dropped before it runs reports [`TaskOutcome::Lost`] instead.
pub(crate) struct Completion {
    index: usize,
    tx: Option<Sender<TaskMessage>>,
}

impl Completion {
    pub fn new(index: usize, tx: Sender<TaskMessage>) -> Self {
        Self { index, tx: Some(tx) }
    }

    pub fn complete(mut self, record: FileRecord) {
        self.send(TaskOutcome::Finished(record));
    }

    fn send(&mut self, outcome: TaskOutcome) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(TaskMessage {
                index: self.index,
                outcome,
            });
        }
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        self.send(TaskOutcome::Lost);
    }
}

/// Process one file, converting panics into a Failed record.
pub(crate) fn run_task(ctx: &TaskContext, source: &SourceFile) -> FileRecord {
    panic::catch_unwind(AssertUnwindSafe(|| process_file(ctx, source))).unwrap_or_else(|payload| {
        let reason = format!("worker panicked: {}", panic_message(payload.as_ref()));
        error!("Error processing file '{}': {}", source.relative_path, reason);
        FileRecord::failed(
            &source.relative_path,
            source.absolute_path.clone(),
            ctx.provider.algorithm(),
            reason,
        )
    })
}

fn process_file(ctx: &TaskContext, source: &SourceFile) -> FileRecord {
    let path = &source.absolute_path;
    let mut record = FileRecord::failed(
        &source.relative_path,
        path.clone(),
        ctx.provider.algorithm(),
        String::new(),
    );

    let metadata = match fs::metadata(path) {
        Ok(metadata) if metadata.is_file() => metadata,
        Ok(_) => return fail(record, "IO error: not a regular file".to_string()),
        Err(e) => return fail(record, format!("IO error: {}", e)),
    };
    record.size_bytes = metadata.len();
    record.modified_time = metadata.modified().ok().map(DateTime::<Utc>::from);

    let digest = match ctx.provider.compute(path, ctx.read_sidecar) {
        Ok(digest) => digest,
        Err(e) => return fail(record, e.to_string()),
    };

    if ctx.fingerprint {
        match fingerprint::fingerprint(path) {
            Ok(fp) => record.fingerprint = Some(fp),
            Err(e) => return fail(record, format!("IO error: {}", e)),
        }
    }

    trace!("Digested {} ({} bytes)", source.relative_path, record.size_bytes);
    record.digest = digest;
    record.status = RecordStatus::Ok;
    record
}

fn fail(mut record: FileRecord, reason: String) -> FileRecord {
    error!("Error processing file '{}': {}", record.relative_path, reason);
    record.status = RecordStatus::Failed(reason);
    record
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
