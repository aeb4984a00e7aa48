pub mod delegated;
pub mod native;
pub mod sidecar;

use crate::error::DigestError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tracing::trace;

pub use delegated::{DelegatedDigest, HelperConfig, DEFAULT_BLAKE2B_DIGEST_SIZE};
pub use native::NativeDigest;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Algorithm {
    Sha1,
    Sha256,
    Sha384,
    Sha512,
    Blake2b,
}

impl Algorithm {
    pub const ALL: [Algorithm; 5] = [
        Algorithm::Sha1,
        Algorithm::Sha256,
        Algorithm::Sha384,
        Algorithm::Sha512,
        Algorithm::Blake2b,
    ];

    /// Hex length of a digest at the algorithm's default output size.
    pub fn hex_len(self) -> usize {
        match self {
            Algorithm::Sha1 => 40,
            Algorithm::Sha256 => 64,
            Algorithm::Sha384 => 96,
            Algorithm::Sha512 | Algorithm::Blake2b => 128,
        }
    }

    /// Lowercase name, also used as the sidecar file extension.
    pub fn as_str(self) -> &'static str {
        match self {
            Algorithm::Sha1 => "sha1",
            Algorithm::Sha256 => "sha256",
            Algorithm::Sha384 => "sha384",
            Algorithm::Sha512 => "sha512",
            Algorithm::Blake2b => "blake2b",
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Algorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .collect::<String>()
            .to_lowercase();
        Algorithm::ALL
            .iter()
            .copied()
            .find(|a| a.as_str() == normalized)
            .ok_or_else(|| format!("unknown hash algorithm '{}'", s))
    }
}

/// The digest provider variants. Native digests run in-process; delegated
/// digests shell out to a helper and must not be shared across workers.
#[derive(Debug, Clone)]
pub enum DigestProvider {
    Native(NativeDigest),
    Delegated(DelegatedDigest),
}

impl DigestProvider {
    pub fn for_algorithm(algorithm: Algorithm, helper: &HelperConfig) -> Self {
        match algorithm {
            Algorithm::Blake2b => DigestProvider::Delegated(DelegatedDigest::new(helper.clone())),
            native => DigestProvider::Native(NativeDigest::new(native)),
        }
    }

    pub fn algorithm(&self) -> Algorithm {
        match self {
            DigestProvider::Native(native) => native.algorithm(),
            DigestProvider::Delegated(_) => Algorithm::Blake2b,
        }
    }

    pub fn is_parallel_safe(&self) -> bool {
        matches!(self, DigestProvider::Native(_))
    }

    pub fn expected_hex_len(&self) -> usize {
        match self {
            DigestProvider::Native(native) => native.algorithm().hex_len(),
            DigestProvider::Delegated(delegated) => delegated.expected_hex_len(),
        }
    }

    /// Compute the digest of `path`, consulting the sidecar file first when
    /// `read_sidecar` is set. The result always satisfies the length invariant.
    pub fn compute(&self, path: &Path, read_sidecar: bool) -> Result<String, DigestError> {
        let expected = self.expected_hex_len();

        if read_sidecar {
            if let Some(digest) = sidecar::read_sidecar_digest(path, self.algorithm(), expected) {
                trace!("Using sidecar digest for {}", path.display());
                return Ok(digest);
            }
        }

        let digest = match self {
            DigestProvider::Native(native) => native.compute(path)?,
            DigestProvider::Delegated(delegated) => delegated.compute(path)?,
        };

        if digest.len() != expected {
            return Err(DigestError::LengthMismatch {
                expected,
                actual: digest.len(),
            });
        }
        Ok(digest)
    }
}
