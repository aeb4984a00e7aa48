use thiserror::Error;

/// Failure computing a single digest. Always isolated to the file it concerns.
#[derive(Error, Debug)]
pub enum DigestError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("hashing helper failed: {0}")]
    HelperProcess(String),

    #[error("digest length mismatch: expected {expected} hex chars, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Digest error: {0}")]
    Digest(#[from] DigestError),

    #[error("Provenance store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Scan root is missing or not a directory: {0}")]
    RootMissing(String),

    #[error("Path supplied more than once in a single run: {0}")]
    DuplicatePath(String),

    #[error("Index parse error at line {line}: {reason}")]
    IndexParse { line: usize, reason: String },

    #[error("{0}")]
    Other(String),
}

/// Failure talking to a provenance store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Corrupt history row: {0}")]
    Corrupt(String),

    #[error("{0}")]
    Unavailable(String),
}

impl From<StoreError> for Error {
    fn from(e: StoreError) -> Self {
        Error::StoreUnavailable(e.to_string())
    }
}
