use crate::error::DigestError;
use serde::Deserialize;
use std::path::Path;
use std::process::Command;
use tracing::trace;

pub const DEFAULT_BLAKE2B_DIGEST_SIZE: usize = 64;
pub const DEFAULT_HELPER_PROGRAM: &str = "provenance-b2sum";

/// How to invoke the external hashing helper.
///
/// The helper is called as `<program> <args...> <path> <digest_size_bytes>` and
/// must print the lowercase hex digest on stdout.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct HelperConfig {
    pub program: String,
    pub args: Vec<String>,
    pub digest_size: usize,
}

impl Default for HelperConfig {
    fn default() -> Self {
        Self {
            program: DEFAULT_HELPER_PROGRAM.to_string(),
            args: Vec::new(),
            digest_size: DEFAULT_BLAKE2B_DIGEST_SIZE,
        }
    }
}

/// BLAKE2B digests obtained from a helper process, one invocation per file.
#[derive(Debug, Clone)]
pub struct DelegatedDigest {
    helper: HelperConfig,
}

impl DelegatedDigest {
    pub fn new(helper: HelperConfig) -> Self {
        Self { helper }
    }

    pub fn expected_hex_len(&self) -> usize {
        self.helper.digest_size * 2
    }

    pub fn compute(&self, path: &Path) -> Result<String, DigestError> {
        trace!(
            "Delegating blake2b digest of {} to '{}'",
            path.display(),
            self.helper.program
        );

        let output = Command::new(&self.helper.program)
            .args(&self.helper.args)
            .arg(path)
            .arg(self.helper.digest_size.to_string())
            .output()
            .map_err(|e| {
                DigestError::HelperProcess(format!(
                    "could not run '{}': {}",
                    self.helper.program, e
                ))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DigestError::HelperProcess(format!(
                "'{}' exited with {}: {}",
                self.helper.program,
                output.status,
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_helper_output(&stdout, self.expected_hex_len())
    }
}

/// Takes the first whitespace-delimited token of the helper's stdout. Anything
/// that is not exactly `expected_len` hex characters is rejected whole.
pub(crate) fn parse_helper_output(stdout: &str, expected_len: usize) -> Result<String, DigestError> {
    let token = stdout.split_whitespace().next().unwrap_or_default();
    if token.is_empty() {
        return Err(DigestError::HelperProcess("helper printed no digest".to_string()));
    }
    if !token.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(DigestError::HelperProcess(format!(
            "helper printed a non-hex digest '{}'",
            token
        )));
    }
    if token.len() != expected_len {
        return Err(DigestError::HelperProcess(format!(
            "helper digest has {} hex chars, expected {}",
            token.len(),
            expected_len
        )));
    }
    Ok(token.to_ascii_lowercase())
}
