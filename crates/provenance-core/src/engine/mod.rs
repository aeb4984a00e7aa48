//! The execution scheduler.
//!
//! A run moves through `Idle → Probing → {Parallel, Sequential} → Draining → Done`.
//! Concurrency is an internal optimisation only: every input file yields exactly
//! one record, and the records leave the scheduler sorted by relative path.

pub mod pool;
mod task;

use crate::config::ScanConfig;
use crate::error::Error;
use crate::hasher::{Algorithm, DigestProvider};
use crate::model::{FileRecord, ScanSession};
use crate::progress::ProgressReporter;
use crate::scanner::{self, FileFilter, SourceFile};
use chrono::Utc;
use pool::{PoolError, PoolFactory, RayonPoolFactory, WorkerPool};
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::time::{Duration, Instant};
use task::{Completion, TaskContext, TaskMessage, TaskOutcome, LOST_RESULT};
use tracing::{debug, info, trace, warn};

const PROBE_TIMEOUT: Duration = Duration::from_secs(10);
/// Tasks queued per worker before the scheduler waits for results.
const IN_FLIGHT_PER_WORKER: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Probing,
    Parallel,
    Sequential,
    Draining,
    Done,
}

/// Whether concurrent execution works here. Resolved at most once per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Capability {
    /// Not probed: the run was sequential by construction.
    Unknown,
    Available,
    Unavailable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExecutionMode {
    Sequential,
    Parallel,
    /// Parallel until a submission failed, sequential for the rest.
    ParallelWithFallback,
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExecutionMode::Sequential => "sequential",
            ExecutionMode::Parallel => "parallel",
            ExecutionMode::ParallelWithFallback => "parallel-with-fallback",
        };
        f.write_str(name)
    }
}

#[derive(Debug)]
pub struct ScanOutput {
    /// Sorted by `relative_path`, one per filtered input file.
    pub records: Vec<FileRecord>,
    pub session: ScanSession,
    pub capability: Capability,
    pub mode: ExecutionMode,
}

impl ScanOutput {
    pub fn failed_count(&self) -> usize {
        self.records.iter().filter(|r| !r.is_ok()).count()
    }
}

pub struct Scheduler {
    config: ScanConfig,
    provider: DigestProvider,
    pool_factory: Arc<dyn PoolFactory>,
}

/// Result slots for one run plus progress bookkeeping.
struct RunSlots<'a> {
    inputs: &'a [SourceFile],
    slots: Vec<Option<FileRecord>>,
    processed: usize,
    reporter: &'a dyn ProgressReporter,
}

impl<'a> RunSlots<'a> {
    fn new(inputs: &'a [SourceFile], reporter: &'a dyn ProgressReporter) -> Self {
        Self {
            inputs,
            slots: vec![None; inputs.len()],
            processed: 0,
            reporter,
        }
    }

    fn fill(&mut self, index: usize, record: FileRecord) {
        debug_assert!(self.slots[index].is_none(), "file processed twice");
        if self.slots[index].is_none() {
            self.processed += 1;
            self.reporter.on_file_processed(self.processed, self.inputs.len());
        }
        self.slots[index] = Some(record);
    }

    fn lost(&self, index: usize, algorithm: Algorithm) -> FileRecord {
        let source = &self.inputs[index];
        FileRecord::failed(
            &source.relative_path,
            source.absolute_path.clone(),
            algorithm,
            LOST_RESULT,
        )
    }
}

impl Scheduler {
    pub fn new(config: ScanConfig) -> Self {
        let provider = DigestProvider::for_algorithm(config.algorithm, &config.helper);
        Self {
            config,
            provider,
            pool_factory: Arc::new(RayonPoolFactory),
        }
    }

    /// Replace the worker pool implementation, e.g. to run without threads.
    pub fn with_pool_factory(mut self, pool_factory: Arc<dyn PoolFactory>) -> Self {
        self.pool_factory = pool_factory;
        self
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    pub fn provider(&self) -> &DigestProvider {
        &self.provider
    }

    /// Enumerate `root` and run over every file the filter accepts.
    pub fn scan_tree(
        &self,
        root: &Path,
        filter: &dyn FileFilter,
        reporter: &dyn ProgressReporter,
    ) -> Result<ScanOutput, Error> {
        let start = Instant::now();
        let files = scanner::enumerate(root)?;
        reporter.on_enumerate_complete(files.len(), start.elapsed().as_secs_f64());
        debug!(
            "Enumerated {} files below {} in {:.2}s",
            files.len(),
            root.display(),
            start.elapsed().as_secs_f64()
        );
        self.run(root, files, filter, reporter)
    }

    /// Compute a record for every file in `files` accepted by `filter`.
    ///
    /// Per-file failures become Failed records. Only a missing root or a path
    /// supplied twice aborts the run.
    pub fn run(
        &self,
        root: &Path,
        files: Vec<SourceFile>,
        filter: &dyn FileFilter,
        reporter: &dyn ProgressReporter,
    ) -> Result<ScanOutput, Error> {
        if !root.is_dir() {
            return Err(Error::RootMissing(root.display().to_string()));
        }

        let started_at = Utc::now();
        let start = Instant::now();
        let mut state = SchedulerState::Idle;

        let mut seen = HashSet::new();
        let mut inputs = Vec::with_capacity(files.len());
        for file in files {
            if !filter.should_include(&file.relative_path) {
                trace!("Filtered out {}", file.relative_path);
                continue;
            }
            if !seen.insert(file.relative_path.clone()) {
                return Err(Error::DuplicatePath(file.relative_path));
            }
            inputs.push(file);
        }

        info!(
            "Computing {} digests for {} files...",
            self.provider.algorithm(),
            inputs.len()
        );
        reporter.on_digest_start(inputs.len());

        let ctx = Arc::new(TaskContext {
            provider: self.provider.clone(),
            read_sidecar: self.config.read_sidecar,
            fingerprint: self.config.fingerprint,
        });
        let mut run = RunSlots::new(&inputs, reporter);

        let mut capability = Capability::Unknown;
        let mut mode = ExecutionMode::Sequential;
        let mut next = 0;

        if self.parallel_eligible(inputs.len()) {
            transition(&mut state, SchedulerState::Probing);
            match self.probe() {
                Ok(pool) => {
                    capability = Capability::Available;
                    transition(&mut state, SchedulerState::Parallel);
                    mode = ExecutionMode::Parallel;
                    next = self.run_parallel(pool.as_ref(), &ctx, &mut run);
                    if next < inputs.len() {
                        mode = ExecutionMode::ParallelWithFallback;
                    }
                }
                Err(e) => {
                    capability = Capability::Unavailable;
                    warn!("{}; falling back to sequential execution", e);
                    reporter.on_fallback(&e.to_string());
                }
            }
        }

        if next < inputs.len() {
            transition(&mut state, SchedulerState::Sequential);
            for index in next..inputs.len() {
                let record = task::run_task(&ctx, &inputs[index]);
                run.fill(index, record);
            }
        }

        transition(&mut state, SchedulerState::Draining);
        let algorithm = self.provider.algorithm();
        let slots = std::mem::take(&mut run.slots);
        let mut records: Vec<FileRecord> = slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| slot.unwrap_or_else(|| run.lost(index, algorithm)))
            .collect();
        records.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
        transition(&mut state, SchedulerState::Done);

        let duration = start.elapsed();
        let failed_count = records.iter().filter(|r| !r.is_ok()).count();
        reporter.on_digest_complete(records.len(), failed_count, duration.as_secs_f64());
        info!(
            "Processed {} files ({} failed) in {:.2}s, {} mode",
            records.len(),
            failed_count,
            duration.as_secs_f64(),
            mode
        );

        let session = ScanSession {
            root_path: root.display().to_string(),
            algorithm,
            file_count: records.len(),
            failed_count,
            total_size_bytes: records.iter().map(|r| r.size_bytes).sum(),
            duration,
            started_at,
            completed_at: Utc::now(),
            execution_mode: mode.to_string(),
            release: self.config.release.clone(),
        };

        Ok(ScanOutput {
            records,
            session,
            capability,
            mode,
        })
    }

    /// Delegated providers are never shared between workers; the provider
    /// decides, not the algorithm name.
    fn parallel_eligible(&self, file_count: usize) -> bool {
        if self.config.force_sequential {
            debug!("Sequential execution forced by configuration");
            return false;
        }
        if !self.provider.is_parallel_safe() {
            debug!(
                "{} provider is not safe to share across workers; running sequentially",
                self.provider.algorithm()
            );
            return false;
        }
        file_count > 0
    }

    /// Build the pool and round-trip one no-op task through it.
    fn probe(&self) -> Result<Arc<dyn WorkerPool>, PoolError> {
        let workers = self.config.worker_count();
        let pool = self.pool_factory.build(workers)?;

        let (tx, rx) = mpsc::channel();
        pool.submit(Box::new(move || {
            let _ = tx.send(());
        }))
        .map_err(|e| PoolError::ConcurrencyUnavailable(format!("probe task rejected: {}", e)))?;

        rx.recv_timeout(PROBE_TIMEOUT).map_err(|e| {
            PoolError::ConcurrencyUnavailable(format!("probe task did not report back: {}", e))
        })?;

        debug!("Concurrency probe succeeded with {} workers", pool.size());
        Ok(pool)
    }

    /// Dispatch files to the pool through a bounded in-flight window. Returns
    /// the index of the first file that was not dispatched; that is
    /// `inputs.len()` unless a submission failed.
    fn run_parallel(
        &self,
        pool: &dyn WorkerPool,
        ctx: &Arc<TaskContext>,
        run: &mut RunSlots<'_>,
    ) -> usize {
        let inputs = run.inputs;
        let (tx, rx) = mpsc::channel::<TaskMessage>();
        let window = pool.size().max(1) * IN_FLIGHT_PER_WORKER;
        let mut dispatched = vec![false; inputs.len()];
        let mut in_flight = 0usize;
        let mut next = 0usize;

        while next < inputs.len() {
            if in_flight >= window {
                if !self.receive_one(&rx, &dispatched, run) {
                    break;
                }
                in_flight -= 1;
            }

            let source = inputs[next].clone();
            let completion = Completion::new(next, tx.clone());
            let task_ctx = Arc::clone(ctx);
            let submitted = pool.submit(Box::new(move || {
                let record = task::run_task(&task_ctx, &source);
                completion.complete(record);
            }));

            match submitted {
                Ok(()) => {
                    dispatched[next] = true;
                    in_flight += 1;
                    next += 1;
                }
                Err(e) => {
                    warn!(
                        "Submission failed after {} of {} files ({}); draining and continuing sequentially",
                        next,
                        inputs.len(),
                        e
                    );
                    run.reporter.on_fallback(&e.to_string());
                    break;
                }
            }
        }

        debug!("Draining {} in-flight tasks", in_flight);
        while in_flight > 0 {
            if !self.receive_one(&rx, &dispatched, run) {
                break;
            }
            in_flight -= 1;
        }

        next
    }

    /// Wait for one result from a dispatched task. Messages from tasks that
    /// were rejected at submission are skipped; those files run sequentially.
    fn receive_one(
        &self,
        rx: &Receiver<TaskMessage>,
        dispatched: &[bool],
        run: &mut RunSlots<'_>,
    ) -> bool {
        loop {
            let message = match rx.recv() {
                Ok(message) => message,
                Err(_) => return false,
            };
            if !dispatched[message.index] {
                continue;
            }
            let record = match message.outcome {
                TaskOutcome::Finished(record) => record,
                TaskOutcome::Lost => {
                    warn!("{}: {}", run.inputs[message.index].relative_path, LOST_RESULT);
                    run.lost(message.index, self.provider.algorithm())
                }
            };
            run.fill(message.index, record);
            return true;
        }
    }
}

fn transition(state: &mut SchedulerState, next: SchedulerState) {
    debug!("Scheduler state: {:?} -> {:?}", state, next);
    *state = next;
}
