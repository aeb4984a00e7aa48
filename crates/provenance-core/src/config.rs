use crate::hasher::{Algorithm, HelperConfig};
use crate::model::ReleaseMetadata;
use config::{Config, ConfigError, Environment, File as ConfigFile};
use serde::Deserialize;
use std::path::Path;

pub const MAX_WORKERS: usize = 8;
const MAX_BLAKE2B_DIGEST_SIZE: usize = 64;

/// Settings loaded from `Provenance.{toml,json,yaml}` and `PROVENANCE_*`
/// environment variables. Missing keys take their defaults.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub root_path: Option<String>,
    pub ignore_patterns: Vec<String>,
    pub min_size: Option<u64>,
    pub max_size: Option<u64>,
    pub algorithm: Algorithm,
    pub fingerprint: bool,
    pub read_sidecar: bool,
    /// 0 picks the hardware parallelism, capped at 8.
    pub max_workers: usize,
    pub db_path: String,
    pub blake2b: HelperConfig,
    pub release: Option<ReleaseMetadata>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            root_path: None,
            ignore_patterns: vec![".git/*".to_string(), "node_modules/*".to_string()],
            min_size: None,
            max_size: None,
            algorithm: Algorithm::Sha256,
            fingerprint: false,
            read_sidecar: false,
            max_workers: 0,
            db_path: "provenance.db".to_string(),
            blake2b: HelperConfig::default(),
            release: None,
        }
    }
}

impl AppConfig {
    /// The immutable per-run configuration handed to the scheduler.
    pub fn scan_config(&self) -> ScanConfig {
        ScanConfig {
            algorithm: self.algorithm,
            fingerprint: self.fingerprint,
            read_sidecar: self.read_sidecar,
            max_workers: self.max_workers,
            force_sequential: false,
            helper: self.blake2b.clone(),
            release: self.release.clone(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_BLAKE2B_DIGEST_SIZE).contains(&self.blake2b.digest_size) {
            return Err(ConfigError::Message(format!(
                "blake2b.digest_size must be between 1 and {} bytes, got {}",
                MAX_BLAKE2B_DIGEST_SIZE, self.blake2b.digest_size
            )));
        }
        if let (Some(min), Some(max)) = (self.min_size, self.max_size) {
            if min > max {
                return Err(ConfigError::Message(format!(
                    "min_size ({}) is larger than max_size ({})",
                    min, max
                )));
            }
        }
        Ok(())
    }
}

/// Load configuration from an explicit file, or from an optional
/// `Provenance.*` file in the working directory, then apply environment
/// overrides such as `PROVENANCE_ALGORITHM=sha512`.
pub fn load_configuration(path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let file_source = match path {
        Some(path) => ConfigFile::from(path).required(true),
        None => ConfigFile::with_name("Provenance").required(false),
    };

    let builder = Config::builder()
        .add_source(file_source)
        .add_source(
            Environment::with_prefix("PROVENANCE")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;
    let config = builder.try_deserialize::<AppConfig>()?;
    config.validate()?;
    Ok(config)
}

#[derive(Debug, Clone)]
pub struct ScanConfig {
    pub algorithm: Algorithm,
    pub fingerprint: bool,
    pub read_sidecar: bool,
    pub max_workers: usize,
    /// Skip probing and run sequentially.
    pub force_sequential: bool,
    pub helper: HelperConfig,
    pub release: Option<ReleaseMetadata>,
}

impl ScanConfig {
    pub fn new(algorithm: Algorithm) -> Self {
        Self {
            algorithm,
            fingerprint: false,
            read_sidecar: false,
            max_workers: 0,
            force_sequential: false,
            helper: HelperConfig::default(),
            release: None,
        }
    }

    pub fn with_fingerprint(mut self, fingerprint: bool) -> Self {
        self.fingerprint = fingerprint;
        self
    }

    pub fn with_sidecar(mut self, read_sidecar: bool) -> Self {
        self.read_sidecar = read_sidecar;
        self
    }

    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers;
        self
    }

    pub fn with_force_sequential(mut self, force_sequential: bool) -> Self {
        self.force_sequential = force_sequential;
        self
    }

    pub fn with_helper(mut self, helper: HelperConfig) -> Self {
        self.helper = helper;
        self
    }

    pub fn with_release(mut self, release: Option<ReleaseMetadata>) -> Self {
        self.release = release;
        self
    }

    /// `min(8, available_parallelism)`, further limited by `max_workers`.
    pub fn worker_count(&self) -> usize {
        let hardware = std::thread::available_parallelism()
            .map_or(1, |n| n.get())
            .min(MAX_WORKERS);
        match self.max_workers {
            0 => hardware,
            limit => hardware.min(limit),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_worker_count_is_capped() {
        let config = ScanConfig::new(Algorithm::Sha256);
        assert!((1..=MAX_WORKERS).contains(&config.worker_count()));
        assert_eq!(config.with_max_workers(1).worker_count(), 1);
    }

    #[test]
    fn test_load_json_config_merges_over_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("provenance.json");
        fs::write(
            &path,
            r#"{ "algorithm": "sha512", "fingerprint": true, "blake2b": { "digest_size": 32 } }"#,
        )
        .unwrap();

        let config = load_configuration(Some(&path)).unwrap();
        assert_eq!(config.algorithm, Algorithm::Sha512);
        assert!(config.fingerprint);
        assert_eq!(config.blake2b.digest_size, 32);
        assert_eq!(config.blake2b.program, "provenance-b2sum");
        assert_eq!(config.db_path, "provenance.db");
    }

    #[test]
    fn test_invalid_digest_size_rejected() {
        let mut config = AppConfig::default();
        config.blake2b.digest_size = 65;
        assert!(config.validate().is_err());
    }
}
