use std::net::IpAddr;

use sha2::{Digest, Sha256};
use xxhash_rust::xxh64::xxh64;

use crate::config::HashAlgorithm;
use crate::Error;

/// Produces the 64-bit hash a sketch indexes registers by. Implementations must be
/// deterministic and must not panic on attacker-controlled input — unparseable keys are
/// reported as `Error::InvalidInput`, unlike the reference sources which `panic!` on a bad IP.
pub trait Hasher: Send + Sync {
    fn hash(&self, key: &[u8]) -> u64;

    /// Hashes an IP address from its canonical fixed-width byte form, so `::1` and
    /// `0:0:0:0:0:0:0:1` hash identically regardless of textual representation.
    fn hash_ip(&self, ip: &str) -> Result<u64, Error> {
        let addr: IpAddr = ip
            .parse()
            .map_err(|_| Error::InvalidInput(format!("not a valid IP address: {ip}")))?;
        let bytes = match addr {
            IpAddr::V4(v4) => v4.octets().to_vec(),
            IpAddr::V6(v6) => v6.octets().to_vec(),
        };
        Ok(self.hash(&bytes))
    }
}

/// Non-cryptographic xxh64 hash, seeded with 0.
#[derive(Clone, Copy, Debug, Default)]
pub struct FastHasher;

impl Hasher for FastHasher {
    fn hash(&self, key: &[u8]) -> u64 {
        xxh64(key, 0)
    }
}

/// SHA-256 of the key, truncated to its first 8 bytes (big-endian).
#[derive(Clone, Copy, Debug, Default)]
pub struct CryptographicHasher;

impl Hasher for CryptographicHasher {
    fn hash(&self, key: &[u8]) -> u64 {
        let digest = Sha256::digest(key);
        u64::from_be_bytes(digest[..8].try_into().unwrap())
    }
}

pub fn from_algorithm(algorithm: HashAlgorithm) -> Box<dyn Hasher> {
    match algorithm {
        HashAlgorithm::Fast => Box::new(FastHasher),
        HashAlgorithm::Cryptographic => Box::new(CryptographicHasher),
    }
}
