mod commands;
mod logging;
mod progress;

use std::fs;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::process;
use std::time::Instant;

use anyhow::{anyhow, bail, Context};
use clap::{CommandFactory, Parser};
use colored::*;
use commands::{Cli, Commands, CompareArgs, HistoryArgs, RunArgs, ScanArgs, VerifyArgs};
use dotenv::dotenv;
use progress::CliReporter;
use provenance_core::hasher::delegated::DEFAULT_HELPER_PROGRAM;
use provenance_core::index::{self, IndexDiff};
use provenance_core::scanner::IgnoreFilter;
use provenance_core::storage::{ProvenanceStore, SqliteStore};
use provenance_core::{
    fingerprint, AppConfig, FileRecord, ProgressReporter, ProvenanceRecorder, RecordStatus, ScanOutput,
    Scheduler,
};
use serde_json::json;
use tracing::{error, info, warn};

fn main() {
    dotenv().ok();

    let _guard = logging::init_logger();

    let args = Cli::parse();

    let config = match provenance_core::config::load_configuration(args.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            error!("Error loading configuration: {}", err);
            process::exit(1);
        }
    };

    let result = match args.command {
        Some(Commands::Scan(scan)) => run_scan(config, scan),
        Some(Commands::Verify(verify)) => run_verify(config, verify),
        Some(Commands::History(history)) => run_history(&config, history),
        Some(Commands::Compare(compare)) => run_compare(compare),
        Some(Commands::PrintConfig) => {
            println!("Configuration: {:#?}", config);
            Ok(true)
        }
        None => {
            let _ = Cli::command().print_long_help();
            Ok(true)
        }
    };

    match result {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(err) => {
            error!("Error: {:#}", err);
            process::exit(2);
        }
    }
}

/// Fold command-line overrides into the loaded configuration and resolve the
/// root directory.
fn apply_run_args(config: &mut AppConfig, run: &RunArgs) -> anyhow::Result<PathBuf> {
    if let Some(algorithm) = run.algorithm {
        config.algorithm = algorithm;
    }
    config.fingerprint |= run.fingerprint;
    config.read_sidecar |= run.sidecar;
    if let Some(jobs) = run.jobs {
        config.max_workers = jobs;
    }
    if config.blake2b.program == DEFAULT_HELPER_PROGRAM {
        if let Some(sibling) = sibling_helper() {
            config.blake2b.program = sibling.to_string_lossy().into_owned();
        }
    }

    let root = run
        .root
        .clone()
        .or_else(|| config.root_path.as_ref().map(PathBuf::from))
        .ok_or_else(|| anyhow!("no root directory given and `root_path` is not configured"))?;
    Ok(root)
}

/// The helper binary installed next to this executable, if any.
fn sibling_helper() -> Option<PathBuf> {
    let exe = std::env::current_exe().ok()?;
    let candidate = exe
        .parent()?
        .join(format!("{}{}", DEFAULT_HELPER_PROGRAM, std::env::consts::EXE_SUFFIX));
    candidate.is_file().then_some(candidate)
}

/// Files this process writes itself: the store with its SQLite side files and
/// the log. Scanning them would make every later verify report drift.
fn own_artifacts(config: &AppConfig) -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = ["", "-wal", "-shm", "-journal"]
        .iter()
        .map(|suffix| PathBuf::from(format!("{}{}", config.db_path, suffix)))
        .collect();
    paths.push(Path::new("./").join(logging::log_file_path()));
    paths
}

fn execute(
    config: &AppConfig,
    run: &RunArgs,
    root: &Path,
    excluded: &[PathBuf],
    reporter: &CliReporter,
) -> anyhow::Result<ScanOutput> {
    let scan_config = config.scan_config().with_force_sequential(run.sequential);
    let filter = IgnoreFilter::new(root, &config.ignore_patterns)
        .with_size_bounds(config.min_size, config.max_size)
        .with_excluded_files(excluded);
    let scheduler = Scheduler::new(scan_config);
    let output = scheduler
        .scan_tree(root, &filter, reporter)
        .with_context(|| format!("scan of {} failed", root.display()))?;
    Ok(output)
}

fn run_scan(mut config: AppConfig, args: ScanArgs) -> anyhow::Result<bool> {
    let root = apply_run_args(&mut config, &args.run)?;
    if let Some(db) = &args.db {
        config.db_path = db.clone();
    }
    if args.release_version.is_some() || args.release_label.is_some() {
        let mut release = config.release.take().unwrap_or_default();
        release.version = args.release_version.clone().or(release.version);
        release.label = args.release_label.clone().or(release.label);
        config.release = Some(release);
    }

    let mut excluded = own_artifacts(&config);
    excluded.extend(args.index.iter().chain(args.json.iter()).cloned());

    let reporter = CliReporter::new();
    let output = execute(&config, &args.run, &root, &excluded, &reporter)?;

    println!();
    info!(
        "{} files, {} failed, {} bytes, {} in {}",
        format!("{}", output.session.file_count).green(),
        format!("{}", output.session.failed_count).red(),
        format!("{}", output.session.total_size_bytes).cyan(),
        output.session.algorithm,
        format!("{:.2}s", output.session.duration.as_secs_f64()).green(),
    );
    info!("Execution mode: {} ({:?} concurrency)", output.mode, output.capability);
    for record in output.records.iter().filter(|r| !r.is_ok()) {
        warn!(
            "{}: {}",
            record.relative_path.yellow(),
            record.failure_reason().unwrap_or_default()
        );
    }

    if let Some(path) = &args.index {
        let written = index::save_index(&output.records, path)
            .with_context(|| format!("writing index {}", path.display()))?;
        info!("Index written to {} ({} entries)", path.display(), written);
    }
    if let Some(path) = &args.json {
        let file = fs::File::create(path).with_context(|| format!("creating {}", path.display()))?;
        let report = json!({ "session": &output.session, "records": &output.records });
        serde_json::to_writer_pretty(BufWriter::new(file), &report)?;
        info!("JSON report written to {}", path.display());
    }

    let mut recorder = if args.no_store {
        ProvenanceRecorder::in_memory()
    } else {
        match SqliteStore::open(&config.db_path) {
            Ok(store) => ProvenanceRecorder::new(Box::new(store)),
            Err(e) => {
                warn!("Provenance store {} unavailable: {}", config.db_path, e);
                ProvenanceRecorder::in_memory()
            }
        }
    };

    reporter.on_record_start();
    let start = Instant::now();
    let receipt = recorder.record_run(output);
    reporter.on_record_complete(receipt.stored_records, start.elapsed().as_secs_f64());
    for warning in &receipt.warnings {
        warn!("{}", warning);
    }

    Ok(true)
}

fn run_verify(mut config: AppConfig, args: VerifyArgs) -> anyhow::Result<bool> {
    let root = apply_run_args(&mut config, &args.run)?;
    let expected = index::load_index(&args.index)
        .with_context(|| format!("reading index {}", args.index.display()))?;

    let mut excluded = own_artifacts(&config);
    excluded.push(args.index.clone());

    let reporter = CliReporter::new();
    let output = execute(&config, &args.run, &root, &excluded, &reporter)?;
    let diff = index::diff(&expected, &output.records);

    print_diff(&diff);
    if config.fingerprint && !diff.modified.is_empty() {
        report_drift(&config, &diff, &output.records);
    }
    Ok(diff.is_clean())
}

/// For modified files, compare the current fingerprint with the one stored
/// alongside the expected digest, when the store has it.
fn report_drift(config: &AppConfig, diff: &IndexDiff, records: &[FileRecord]) {
    if !Path::new(&config.db_path).exists() {
        return;
    }
    let store = match SqliteStore::open(&config.db_path) {
        Ok(store) => store,
        Err(e) => {
            warn!("Provenance store {} unavailable: {}", config.db_path, e);
            return;
        }
    };

    for (path, expected, _) in &diff.modified {
        let current = records
            .iter()
            .find(|r| &r.relative_path == path)
            .and_then(|r| r.fingerprint.as_ref());
        let history = match store.history(path) {
            Ok(history) => history,
            Err(e) => {
                warn!("History for {} unavailable: {}", path, e);
                continue;
            }
        };
        let previous = history
            .iter()
            .find(|entry| &entry.digest == expected)
            .and_then(|entry| entry.fingerprint.as_ref());

        if let (Some(current), Some(previous)) = (current, previous) {
            let distance = fingerprint::compare(previous, current);
            println!(
                "    {} similarity {} (hamming {}, dct cosine {:.4})",
                path,
                format!("{:.4}", distance.similarity).cyan(),
                distance.perceptual_hamming,
                distance.dct_cosine
            );
        }
    }
}

fn print_diff(diff: &IndexDiff) {
    for (path, expected, actual) in &diff.modified {
        println!("{} {}", "MODIFIED".red(), path);
        println!("    expected {}", expected);
        println!("    actual   {}", actual);
    }
    for path in &diff.missing {
        println!("{}  {}", "MISSING".red(), path);
    }
    for path in &diff.added {
        println!("{}    {}", "ADDED".yellow(), path);
    }
    for (path, reason) in &diff.failed {
        println!("{}   {} ({})", "FAILED".red(), path, reason);
    }

    let summary = format!(
        "{} matched, {} modified, {} missing, {} added, {} failed",
        diff.matched.len(),
        diff.modified.len(),
        diff.missing.len(),
        diff.added.len(),
        diff.failed.len()
    );
    if diff.is_clean() {
        println!("{}", summary.green());
    } else {
        println!("{}", summary.red());
    }
}

fn run_history(config: &AppConfig, args: HistoryArgs) -> anyhow::Result<bool> {
    let db_path = args.db.as_deref().unwrap_or(&config.db_path);
    if !Path::new(db_path).exists() {
        bail!("provenance database {} does not exist", db_path);
    }
    let store = SqliteStore::open(db_path)?;
    let recorder = ProvenanceRecorder::new(Box::new(store));
    let history = recorder.history(&args.path)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&history)?);
        return Ok(true);
    }

    if history.is_empty() {
        println!("No history for {}", args.path);
        return Ok(true);
    }
    for entry in &history {
        let status = match &entry.status {
            RecordStatus::Ok => "ok".green(),
            RecordStatus::Failed(reason) => format!("failed: {}", reason).red(),
        };
        println!(
            "{}  {:<8} {:>12}  {}  {}",
            entry.scan_time.format("%Y-%m-%d %H:%M:%S"),
            entry.algorithm,
            entry.size_bytes,
            entry.digest,
            status
        );
    }
    Ok(true)
}

fn run_compare(args: CompareArgs) -> anyhow::Result<bool> {
    let left = fingerprint::fingerprint(&args.left)
        .with_context(|| format!("reading {}", args.left.display()))?;
    let right = fingerprint::fingerprint(&args.right)
        .with_context(|| format!("reading {}", args.right.display()))?;
    let distance = fingerprint::compare(&left, &right);

    if args.json {
        let report = json!({ "left": &left, "right": &right, "distance": &distance });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(true);
    }

    println!("perceptual  {} / {}", left.perceptual_digest, right.perceptual_digest);
    println!("hamming     {}", distance.perceptual_hamming);
    println!("dct cosine  {:.4}", distance.dct_cosine);
    println!("entropy     {:.4} / {:.4}", left.entropy, right.entropy);
    println!("similarity  {}", format!("{:.4}", distance.similarity).cyan());
    Ok(true)
}
