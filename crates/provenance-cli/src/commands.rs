use clap::{Args, Parser, Subcommand};
use provenance_core::Algorithm;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "provenance")]
#[command(about = "Integrity and provenance records for file trees", long_about = None)]
pub struct Cli {
    /// Configuration file (defaults to ./Provenance.{toml,json,yaml} if present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Digest every file below a root and record provenance
    Scan(ScanArgs),
    /// Rescan a root and compare it against a saved index
    Verify(VerifyArgs),
    /// Show recorded history for one relative path
    History(HistoryArgs),
    /// Compare the signal fingerprints of two files
    Compare(CompareArgs),
    /// Print configuration values
    PrintConfig,
}

/// Options shared by every command that runs the scheduler.
#[derive(Debug, Args)]
pub struct RunArgs {
    /// Root directory (overrides `root_path` from configuration)
    pub root: Option<PathBuf>,

    /// sha1, sha256, sha384, sha512 or blake2b
    #[arg(short, long)]
    pub algorithm: Option<Algorithm>,

    /// Attach a signal fingerprint to every record
    #[arg(long)]
    pub fingerprint: bool,

    /// Prefer digests published in `<file>.<algorithm>` sidecars
    #[arg(long)]
    pub sidecar: bool,

    /// Upper bound on worker threads
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Skip the concurrency probe and run on one thread
    #[arg(long)]
    pub sequential: bool,
}

#[derive(Debug, Args)]
pub struct ScanArgs {
    #[command(flatten)]
    pub run: RunArgs,

    /// Write a `<digest> <relative_path>` index file
    #[arg(long)]
    pub index: Option<PathBuf>,

    /// Write records and session as JSON
    #[arg(long)]
    pub json: Option<PathBuf>,

    /// SQLite database path (overrides `db_path`)
    #[arg(long)]
    pub db: Option<String>,

    /// Keep results in memory only
    #[arg(long)]
    pub no_store: bool,

    #[arg(long)]
    pub release_version: Option<String>,

    #[arg(long)]
    pub release_label: Option<String>,
}

#[derive(Debug, Args)]
pub struct VerifyArgs {
    #[command(flatten)]
    pub run: RunArgs,

    /// Index file written by `scan --index`
    #[arg(long)]
    pub index: PathBuf,
}

#[derive(Debug, Args)]
pub struct HistoryArgs {
    /// Relative path as recorded, `/`-separated
    pub path: String,

    #[arg(long)]
    pub db: Option<String>,

    /// Print JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct CompareArgs {
    pub left: PathBuf,
    pub right: PathBuf,

    #[arg(long)]
    pub json: bool,
}
