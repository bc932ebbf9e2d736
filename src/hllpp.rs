use parking_lot::RwLock;

use crate::config::Config;
use crate::dense::DenseSketch;
use crate::sparse::SparseSketch;
use crate::Error;

enum Representation {
    Sparse(SparseSketch),
    Dense(DenseSketch),
}

/// The HLL++ format holder: owns either a `SparseSketch` or a `DenseSketch` behind one coarse
/// reader-writer lock, promoting sparse to dense when the sparse encoding no longer beats the
/// dense one. Promotion is one-way — once dense, a sketch never returns to sparse.
pub struct Hllpp {
    representation: RwLock<Representation>,
    config: Config,
}

impl Hllpp {
    /// Every sketch starts sparse: the whole point of the sparse representation is to stay
    /// small while cardinality is low, promoting only once it stops paying for itself.
    pub fn new(config: Config) -> Self {
        Hllpp {
            representation: RwLock::new(Representation::Sparse(SparseSketch::new(config))),
            config,
        }
    }

    pub fn config(&self) -> Config {
        self.config
    }

    pub fn insert_key(&self, key: &[u8]) {
        let needs_promotion = {
            let guard = self.representation.read();
            match &*guard {
                Representation::Sparse(sparse) => {
                    sparse.insert_key(key);
                    self.promotion_due(sparse)
                }
                Representation::Dense(dense) => {
                    dense.insert_key(key);
                    false
                }
            }
        };

        if needs_promotion {
            self.promote();
        }
    }

    pub fn insert_ip(&self, ip: &str) -> Result<(), Error> {
        let needs_promotion = {
            let guard = self.representation.read();
            match &*guard {
                Representation::Sparse(sparse) => {
                    sparse.insert_ip(ip)?;
                    self.promotion_due(sparse)
                }
                Representation::Dense(dense) => {
                    dense.insert_ip(ip)?;
                    false
                }
            }
        };

        if needs_promotion {
            self.promote();
        }
        Ok(())
    }

    /// Sparse encoding costs `len * (p + 6 + 5)` bits; dense costs `m * 6` bits. Promote once
    /// the former stops being the smaller of the two.
    fn promotion_due(&self, sparse: &SparseSketch) -> bool {
        let len = sparse.len();
        let sparse_bits = len * (self.config.precision as usize + 6 + 5);
        let dense_bits = self.config.m() * 6;
        sparse_bits >= dense_bits
    }

    /// Holds the write lock for the entire build-and-swap: replaying the sparse entries into a
    /// fresh `DenseSketch` under a read lock (then swapping under a separate write lock) would
    /// leave a window where a concurrent `insert_key` lands on the soon-to-be-discarded sparse
    /// state, losing that insert. One continuous write lock closes the window.
    fn promote(&self) {
        let mut guard = self.representation.write();

        let built = match &*guard {
            Representation::Sparse(sparse) if self.promotion_due(sparse) => {
                let dense = DenseSketch::new(self.config);
                let entries = sparse.decoded_entries();
                for (index, rho) in &entries {
                    dense.set_max(*index as usize, *rho);
                }
                Some((dense, entries.len()))
            }
            _ => None,
        };

        if let Some((dense, sparse_len)) = built {
            tracing::info!(
                precision = self.config.precision,
                sparse_len,
                "promoted sparse sketch to dense"
            );
            *guard = Representation::Dense(dense);
        }
    }

    pub fn element_count(&self) -> u64 {
        match &*self.representation.read() {
            Representation::Sparse(sparse) => sparse.element_count(),
            Representation::Dense(dense) => dense.element_count(),
        }
    }

    pub fn reset(&self) {
        match &*self.representation.write() {
            Representation::Sparse(sparse) => sparse.reset(),
            Representation::Dense(dense) => dense.reset(),
        }
    }

    pub fn is_dense(&self) -> bool {
        matches!(&*self.representation.read(), Representation::Dense(_))
    }

    /// Wraps an already-built `DenseSketch` as an `Hllpp`, used by `serialize::from_bytes`.
    pub(crate) fn from_dense(config: Config, dense: DenseSketch) -> Self {
        Hllpp {
            representation: RwLock::new(Representation::Dense(dense)),
            config,
        }
    }

    /// Wraps an already-built `SparseSketch` as an `Hllpp`, used by `serialize::from_bytes`.
    pub(crate) fn from_sparse(config: Config, sparse: SparseSketch) -> Self {
        Hllpp {
            representation: RwLock::new(Representation::Sparse(sparse)),
            config,
        }
    }

    pub(crate) fn with_dense<R>(&self, f: impl FnOnce(&DenseSketch) -> R) -> R {
        match &*self.representation.read() {
            Representation::Dense(dense) => f(dense),
            Representation::Sparse(_) => panic!("with_dense called on a sparse representation"),
        }
    }

    pub(crate) fn with_sparse<R>(&self, f: impl FnOnce(&SparseSketch) -> R) -> R {
        match &*self.representation.read() {
            Representation::Sparse(sparse) => f(sparse),
            Representation::Dense(_) => panic!("with_sparse called on a dense representation"),
        }
    }

    /// Merges `other` into `self`, handling all four combinations of sparse/dense formats.
    /// Sparse+sparse merges order their inner locks by a construction-time nonce, never by
    /// address, to avoid deadlocking a concurrent merge running in the opposite direction.
    pub fn merge(&self, other: &Hllpp) -> Result<(), Error> {
        if self.config.precision != other.config.precision {
            tracing::warn!(
                self_p = self.config.precision,
                other_p = other.config.precision,
                "refusing to merge HLLPP sketches with mismatched precision"
            );
            return Err(Error::InvalidInput(format!(
                "cannot merge sketches of precision {} and {}",
                self.config.precision, other.config.precision
            )));
        }

        enum Action {
            Done,
            Promote(DenseSketch),
        }

        let action = {
            let mut self_guard = self.representation.write();
            let other_guard = other.representation.read();

            let result: Result<Action, Error> = match &mut *self_guard {
                Representation::Dense(self_dense) => match &*other_guard {
                    Representation::Dense(other_dense) => {
                        self_dense.merge(other_dense).map(|()| Action::Done)
                    }
                    Representation::Sparse(other_sparse) => {
                        for (index, rho) in other_sparse.decoded_entries() {
                            self_dense.set_max(index as usize, rho);
                        }
                        Ok(Action::Done)
                    }
                },
                Representation::Sparse(self_sparse) => match &*other_guard {
                    Representation::Sparse(other_sparse) => {
                        self_sparse.merge_sparse(other_sparse).map(|()| Action::Done)
                    }
                    Representation::Dense(other_dense) => {
                        let dense = DenseSketch::new(self.config);
                        for (index, rho) in self_sparse.decoded_entries() {
                            dense.set_max(index as usize, rho);
                        }
                        dense.merge(other_dense).map(|()| Action::Promote(dense))
                    }
                },
            };
            result
            // self_guard and other_guard drop here
        }?;

        if let Action::Promote(dense) = action {
            *self.representation.write() = Representation::Dense(dense);
        }

        let needs_promotion = {
            let guard = self.representation.read();
            matches!(&*guard, Representation::Sparse(s) if self.promotion_due(s))
        };
        if needs_promotion {
            self.promote();
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HashAlgorithm;

    fn config(p: u8) -> Config {
        Config::new(p, HashAlgorithm::Fast).unwrap()
    }

    #[test]
    fn starts_sparse_and_promotes() {
        let h = Hllpp::new(config(10));
        assert!(!h.is_dense());
        for i in 0..50_000u32 {
            h.insert_key(&i.to_le_bytes());
        }
        assert!(h.is_dense());
    }

    #[test]
    fn ten_inserts_sparse_mode_exact() {
        let h = Hllpp::new(config(14));
        for i in 0..10u32 {
            h.insert_key(&i.to_le_bytes());
        }
        assert!(!h.is_dense());
        assert_eq!(h.element_count(), 10);
    }

    #[test]
    fn twenty_thousand_inserts_within_five_percent() {
        let h = Hllpp::new(config(14));
        for i in 0..20_000u32 {
            h.insert_key(&i.to_le_bytes());
        }
        let estimate = h.element_count() as f64;
        let error = (estimate - 20_000.0).abs() / 20_000.0;
        assert!(error < 0.05, "relative error {error} too high");
    }

    #[test]
    fn merge_sparse_and_dense_combines_counts() {
        let sparse = Hllpp::new(config(14));
        for i in 0..100u32 {
            sparse.insert_key(&(i + 1_000_000).to_le_bytes());
        }
        assert!(!sparse.is_dense());

        let dense = Hllpp::new(config(14));
        for i in 0..2_000_000u32 {
            dense.insert_key(&i.to_le_bytes());
        }
        assert!(dense.is_dense());

        sparse.merge(&dense).unwrap();
        let estimate = sparse.element_count() as f64;
        let error = (estimate - 2_000_100.0).abs() / 2_000_100.0;
        assert!(error < 0.02, "relative error {error} too high");
    }

    #[test]
    fn merge_rejects_mismatched_precision() {
        let a = Hllpp::new(config(10));
        let b = Hllpp::new(config(12));
        assert!(a.merge(&b).is_err());
    }

    #[test]
    fn reset_returns_to_empty() {
        let h = Hllpp::new(config(10));
        h.insert_key(b"x");
        h.reset();
        assert_eq!(h.element_count(), 0);
    }
}
