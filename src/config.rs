use serde::Deserialize;

use crate::Error;

pub const MIN_PRECISION: u8 = 4;
pub const MAX_PRECISION: u8 = 18;
pub const SPARSE_PRECISION: u8 = 25;

/// Which hashing strategy a sketch uses. Fast is a non-cryptographic 64-bit hash; Cryptographic
/// trades throughput for a hash that cannot be biased by an adversary choosing inputs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    Fast,
    Cryptographic,
}

/// Whether a sketch expects concurrent access. `SingleThreaded` skips lock acquisition entirely.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Concurrency {
    Concurrent,
    SingleThreaded,
}

/// Immutable construction-time configuration for a sketch. Unlike the reference sources, this
/// crate never reads configuration into a process-wide global behind a `sync.Once`-style guard:
/// a `Config` is a plain value, built once by the caller and passed into every constructor. A
/// long-lived embedding service that wants to cache it for the process lifetime does so itself,
/// one layer above this crate, typically by holding an `Arc<Config>`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Config {
    pub precision: u8,
    pub sparse_precision: u8,
    pub hash_algorithm: HashAlgorithm,
    pub bias_correction: bool,
    pub concurrency: Concurrency,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawConfig {
    precision: u8,
    #[serde(default = "default_hash_algorithm")]
    hash_algorithm: HashAlgorithm,
    #[serde(default = "default_true")]
    bias_correction: bool,
}

fn default_hash_algorithm() -> HashAlgorithm {
    HashAlgorithm::Fast
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Builds and validates a configuration directly, without a JSON round-trip. Defaults to
    /// HLL++ bias correction enabled and concurrent locking.
    pub fn new(precision: u8, hash_algorithm: HashAlgorithm) -> Result<Self, Error> {
        Self::build(precision, hash_algorithm, true, Concurrency::Concurrent)
    }

    pub fn with_concurrency(
        precision: u8,
        hash_algorithm: HashAlgorithm,
        bias_correction: bool,
        concurrency: Concurrency,
    ) -> Result<Self, Error> {
        Self::build(precision, hash_algorithm, bias_correction, concurrency)
    }

    fn build(
        precision: u8,
        hash_algorithm: HashAlgorithm,
        bias_correction: bool,
        concurrency: Concurrency,
    ) -> Result<Self, Error> {
        if !(MIN_PRECISION..=MAX_PRECISION).contains(&precision) {
            return Err(Error::InvalidInput(format!(
                "precision {precision} out of range [{MIN_PRECISION}, {MAX_PRECISION}]"
            )));
        }

        Ok(Config {
            precision,
            sparse_precision: SPARSE_PRECISION,
            hash_algorithm,
            bias_correction,
            concurrency,
        })
    }

    /// Parses `{ "precision": int, "hashAlgorithm": "fast" | "cryptographic" }` (plus optional
    /// `"biasCorrection": bool`) from a JSON document, validating the result.
    pub fn from_str(json: &str) -> Result<Self, Error> {
        let raw: RawConfig = serde_json::from_str(json)
            .map_err(|e| Error::InvalidInput(format!("malformed config: {e}")))?;
        Self::build(
            raw.precision,
            raw.hash_algorithm,
            raw.bias_correction,
            Concurrency::Concurrent,
        )
    }

    pub fn from_reader<R: std::io::Read>(reader: R) -> Result<Self, Error> {
        let raw: RawConfig = serde_json::from_reader(reader)
            .map_err(|e| Error::InvalidInput(format!("malformed config: {e}")))?;
        Self::build(
            raw.precision,
            raw.hash_algorithm,
            raw.bias_correction,
            Concurrency::Concurrent,
        )
    }

    pub fn m(&self) -> usize {
        1usize << self.precision
    }

    pub fn m_sparse(&self) -> usize {
        1usize << self.sparse_precision
    }
}
