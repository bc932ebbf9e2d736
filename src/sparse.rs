use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use parking_lot::RwLock;

use crate::config::Config;
use crate::hash::{self, Hasher};
use crate::Error;

/// A 32-bit hash-encoded sparse entry: either `| index@p' | rho' | 1 |` when the zone bits
/// between precision `p` and `p'` are all zero (rho is not recoverable from `index@p'` alone
/// and must be stored), or `| index@p' | 0 |` when it is recoverable from those zone bits.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) struct Encoded(u32);

impl Encoded {
    fn index_key(self) -> u32 {
        if self.0 & 1 == 1 {
            self.0 >> 7
        } else {
            self.0 >> 1
        }
    }

    /// The explicitly stored rho field for flag=1 entries, 0 for flag=0 (whose rho is always
    /// re-derivable identically from `index_key` alone, so no entry can dominate another flag=0
    /// entry at the same key).
    fn raw_rho_field(self) -> u8 {
        if self.0 & 1 == 1 {
            ((self.0 >> 1) & 0x3F) as u8
        } else {
            0
        }
    }
}

/// Ascending by `index_key`, descending by stored rho within equal keys, so that sorting then
/// `dedup_by_key(Encoded::index_key)` keeps the dominant (max rho) entry for each key.
impl PartialOrd for Encoded {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Encoded {
    fn cmp(&self, other: &Self) -> Ordering {
        self.index_key()
            .cmp(&other.index_key())
            .then_with(|| other.raw_rho_field().cmp(&self.raw_rho_field()))
    }
}

fn encode_hash(h: u64, p: u8, p_prime: u8) -> Encoded {
    let idx_pprime = (h >> (64 - p_prime as u32)) as u32;
    let extra_bits = p_prime - p;
    let zone_mask = (1u32 << extra_bits) - 1;

    if idx_pprime & zone_mask == 0 {
        let remaining = h << p_prime;
        let lz = if p_prime == 64 { 0 } else { remaining.leading_zeros() };
        let rho = (extra_bits as u32 + 1 + lz).min(0x3F) as u8;
        Encoded((idx_pprime << 7) | ((rho as u32) << 1) | 1)
    } else {
        Encoded(idx_pprime << 1)
    }
}

/// Decodes an entry to its `(index, rho)` pair at dense precision `p`.
fn decode_at(entry: Encoded, p: u8, p_prime: u8) -> (u32, u8) {
    if entry.0 & 1 == 1 {
        (entry.0 >> 7 >> (p_prime - p), entry.raw_rho_field())
    } else {
        let idx_pprime = entry.0 >> 1;
        let extra_bits = p_prime - p;
        let zone = idx_pprime & ((1u32 << extra_bits) - 1);
        // rho is 1 + the count of *leading* zeros in the zone field, matching
        // `dense::rho_of`'s leading-zero convention, not trailing zeros of `zone`'s bit pattern.
        let leading_zeros_in_zone = zone.leading_zeros() + extra_bits as u32 - 32;
        let rho = 1 + leading_zeros_in_zone as u8;
        (idx_pprime >> extra_bits, rho)
    }
}

struct SparseState {
    sorted_list: Vec<Encoded>,
    staging: HashSet<Encoded>,
}

impl SparseState {
    fn drain(&mut self) {
        if self.staging.is_empty() {
            return;
        }
        let mut merged: Vec<Encoded> =
            Vec::with_capacity(self.sorted_list.len() + self.staging.len());
        merged.extend(self.sorted_list.drain(..));
        merged.extend(self.staging.drain());
        merged.sort_unstable();
        merged.dedup_by_key(|e| e.index_key());
        self.sorted_list = merged;
    }
}

static NONCE_COUNTER: AtomicU64 = AtomicU64::new(1);

/// High-precision hash-encoded sparse sketch: a sorted run-list plus an unsorted staging set,
/// merged in amortized batches. Accurate at small cardinalities while using far less memory
/// than a dense register array; promoted to dense once it no longer is (see `Hllpp::insert`).
pub struct SparseSketch {
    state: RwLock<SparseState>,
    nonce: u64,
    config: Config,
    hasher: Box<dyn Hasher>,
}

impl SparseSketch {
    pub fn new(config: Config) -> Self {
        SparseSketch {
            state: RwLock::new(SparseState {
                sorted_list: Vec::new(),
                staging: HashSet::new(),
            }),
            nonce: NONCE_COUNTER.fetch_add(1, AtomicOrdering::Relaxed),
            hasher: hash::from_algorithm(config.hash_algorithm),
            config,
        }
    }

    pub fn config(&self) -> Config {
        self.config
    }

    pub(crate) fn nonce(&self) -> u64 {
        self.nonce
    }

    fn merge_trigger(&self) -> usize {
        self.config.m() / 8
    }

    pub fn insert_key(&self, key: &[u8]) {
        let h = self.hasher.hash(key);
        self.insert_hash(h);
    }

    pub fn insert_ip(&self, ip: &str) -> Result<(), Error> {
        let h = self.hasher.hash_ip(ip)?;
        self.insert_hash(h);
        Ok(())
    }

    pub fn insert_hash(&self, h: u64) {
        let entry = encode_hash(h, self.config.precision, self.config.sparse_precision);
        let mut state = self.state.write();
        state.staging.insert(entry);
        if state.staging.len() >= self.merge_trigger() {
            state.drain();
        }
    }

    /// Number of entries in the sorted run-list once the staging set has been drained. Drives
    /// `Hllpp`'s sparse-to-dense promotion decision.
    pub fn len(&self) -> usize {
        let mut state = self.state.write();
        state.drain();
        state.sorted_list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn element_count(&self) -> u64 {
        let n = self.len();
        if n == 0 {
            return 0;
        }
        let m_prime = self.config.m_sparse() as f64;
        let zeros = m_prime - n as f64;
        (m_prime * (m_prime / zeros).ln()).round() as u64
    }

    pub fn reset(&self) {
        let mut state = self.state.write();
        state.sorted_list.clear();
        state.staging.clear();
    }

    /// Drains and returns a snapshot of the entries, for promotion or export.
    pub(crate) fn entries(&self) -> Vec<Encoded> {
        let mut state = self.state.write();
        state.drain();
        state.sorted_list.clone()
    }

    /// Drains and returns the raw 32-bit wire form of every entry, for `serialize::to_bytes`.
    pub(crate) fn raw_entries(&self) -> Vec<u32> {
        self.entries().into_iter().map(|e| e.0).collect()
    }

    /// Inserts an already-encoded entry verbatim, for `serialize::from_bytes` reconstructing a
    /// sketch from its wire form.
    pub(crate) fn insert_raw_entry(&self, raw: u32) {
        self.state.write().staging.insert(Encoded(raw));
    }

    /// Decodes all entries to `(index, rho)` pairs at dense precision `p`, for replaying into a
    /// freshly promoted `DenseSketch` or into an existing one during a sparse/dense merge.
    pub(crate) fn decoded_entries(&self) -> Vec<(u32, u8)> {
        self.entries()
            .into_iter()
            .map(|e| decode_at(e, self.config.precision, self.config.sparse_precision))
            .collect()
    }

    /// Merges another sparse sketch's entries into this one under the dominance rule, acquiring
    /// both sketches' internal locks in a fixed total order (by construction-time nonce, not
    /// address) to avoid deadlocking against a concurrent merge in the opposite direction.
    pub fn merge_sparse(&self, other: &SparseSketch) -> Result<(), Error> {
        if self.config.precision != other.config.precision
            || self.config.sparse_precision != other.config.sparse_precision
        {
            return Err(Error::InvalidInput(format!(
                "cannot merge sparse sketches of precision ({}, {}) and ({}, {})",
                self.config.precision,
                self.config.sparse_precision,
                other.config.precision,
                other.config.sparse_precision
            )));
        }

        if self.nonce == other.nonce {
            // merging a sketch with itself: nothing to do beyond draining staging.
            self.state.write().drain();
            return Ok(());
        }

        let other_entries = if self.nonce < other.nonce {
            let mut self_guard = self.state.write();
            let mut other_guard = other.state.write();
            other_guard.drain();
            self_guard.drain();
            other_guard.sorted_list.clone()
        } else {
            let mut other_guard = other.state.write();
            other_guard.drain();
            let mut self_guard = self.state.write();
            self_guard.drain();
            other_guard.sorted_list.clone()
        };

        let mut self_guard = self.state.write();
        let mut merged = Vec::with_capacity(self_guard.sorted_list.len() + other_entries.len());
        merged.extend(self_guard.sorted_list.drain(..));
        merged.extend(other_entries);
        merged.sort_unstable();
        merged.dedup_by_key(|e| e.index_key());
        self_guard.sorted_list = merged;
        Ok(())
    }
}
