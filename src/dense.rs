use crate::bias::{self, BiasCorrector};
use crate::config::Config;
use crate::hash::{self, Hasher};
use crate::locks::StripedLocks;
use crate::registers::PackedRegisters;
use crate::Error;

fn alpha_m(m: usize) -> f64 {
    match m {
        16 => 0.673,
        32 => 0.697,
        64 => 0.709,
        _ => 0.7213 / (1.0 + 1.079 / m as f64),
    }
}

fn linear_counting(m: usize, zeros: u32) -> f64 {
    m as f64 * (m as f64 / zeros as f64).ln()
}

/// Standard HLL register array: a `PackedRegisters` behind `StripedLocks`, with HLL++ bias
/// correction layered on top of the raw estimator.
pub struct DenseSketch {
    registers: PackedRegisters,
    locks: StripedLocks,
    hasher: Box<dyn Hasher>,
    bias_corrector: Option<BiasCorrector>,
    config: Config,
}

impl DenseSketch {
    pub fn new(config: Config) -> Self {
        let m = config.m();
        let locks = match config.concurrency {
            crate::config::Concurrency::Concurrent => StripedLocks::for_size(m),
            crate::config::Concurrency::SingleThreaded => StripedLocks::single_threaded(),
        };
        let bias_corrector = config
            .bias_correction
            .then(|| BiasCorrector::for_precision(config.precision));

        DenseSketch {
            registers: PackedRegisters::new(m),
            locks,
            hasher: hash::from_algorithm(config.hash_algorithm),
            bias_corrector,
            config,
        }
    }

    pub fn config(&self) -> Config {
        self.config
    }

    pub fn m(&self) -> usize {
        self.registers.size()
    }

    pub fn get(&self, i: usize) -> u8 {
        self.registers.get(i)
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

    /// Inserts from an already-computed hash at this sketch's precision. Used directly by the
    /// dense insert paths above and by `HLLPP` when replaying decoded sparse entries.
    pub fn insert_hash(&self, h: u64) {
        let p = self.config.precision as u32;
        let idx = (h >> (64 - p)) as usize;
        let rho = rho_of(h, p);
        self.set_max(idx, rho);
    }

    pub fn set_max(&self, index: usize, rho: u8) {
        let _guard = self.locks.lock_for(index);
        self.registers.set_max(index, rho);
    }

    pub fn raw_estimate(&self) -> f64 {
        let m = self.registers.size();
        alpha_m(m) * (m as f64) * (m as f64) / self.registers.sum()
    }

    pub fn element_count(&self) -> u64 {
        let m = self.registers.size();
        let e = self.raw_estimate();
        let zeros = self.registers.zeros();

        let h = if let Some(corrector) = &self.bias_corrector {
            let e_prime = if e <= 5.0 * m as f64 {
                e - corrector.correction(e)
            } else {
                e
            };
            if zeros > 0 {
                let linear = linear_counting(m, zeros);
                if linear <= bias::threshold(self.config.precision) as f64 {
                    linear
                } else {
                    e_prime
                }
            } else {
                e_prime
            }
        } else if e <= 2.5 * m as f64 && zeros != 0 {
            linear_counting(m, zeros)
        } else {
            e
        };

        h.round() as u64
    }

    pub fn merge(&self, other: &DenseSketch) -> Result<(), Error> {
        if self.config.precision != other.config.precision {
            tracing::warn!(
                self_p = self.config.precision,
                other_p = other.config.precision,
                "refusing to merge dense sketches with mismatched precision"
            );
            return Err(Error::InvalidInput(format!(
                "cannot merge dense sketches of precision {} and {}",
                self.config.precision, other.config.precision
            )));
        }

        for i in 0..self.registers.size() {
            let v = other.get(i);
            if v > 0 {
                self.set_max(i, v);
            }
        }
        Ok(())
    }

    pub fn reset(&self) {
        self.registers.reset();
    }
}

/// `rho`: 1 + leading-zero-count of the `64 - p` bits following the top `p` index bits,
/// clamped to the maximum representable register value for that window.
fn rho_of(h: u64, p: u32) -> u8 {
    let w = h << p;
    if w == 0 {
        return (64 - p + 1) as u8;
    }
    let max_rho = (64 - p + 1) as u8;
    (1 + w.leading_zeros() as u8).min(max_rho)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HashAlgorithm;

    fn config(p: u8) -> Config {
        Config::new(p, HashAlgorithm::Fast).unwrap()
    }

    #[test]
    fn empty_sketch_has_zero_count() {
        let d = DenseSketch::new(config(10));
        assert_eq!(d.element_count(), 0);
    }

    #[test]
    fn single_insert_counts_one() {
        let d = DenseSketch::new(config(10));
        d.insert_key(b"10.0.0.1");
        assert_eq!(d.element_count(), 1);
    }

    #[test]
    fn repeated_insert_is_idempotent() {
        let d = DenseSketch::new(config(10));
        for _ in 0..1000 {
            d.insert_key(b"10.0.0.1");
        }
        assert_eq!(d.element_count(), 1);
    }

    #[test]
    fn cardinality_within_error_bounds() {
        let d = DenseSketch::new(config(14));
        for i in 0..20_000u32 {
            d.insert_key(&i.to_le_bytes());
        }
        let estimate = d.element_count() as f64;
        let error = (estimate - 20_000.0).abs() / 20_000.0;
        assert!(error < 0.05, "relative error {error} too high");
    }

    #[test]
    fn merge_rejects_mismatched_precision() {
        let a = DenseSketch::new(config(10));
        let b = DenseSketch::new(config(12));
        assert!(a.merge(&b).is_err());
    }

    #[test]
    fn merge_is_commutative_at_register_level() {
        let a = DenseSketch::new(config(10));
        let b = DenseSketch::new(config(10));
        for i in 0..5000u32 {
            a.insert_key(&i.to_le_bytes());
        }
        for i in 4000..9000u32 {
            b.insert_key(&i.to_le_bytes());
        }

        let merged_ab = DenseSketch::new(config(10));
        merged_ab.merge(&a).unwrap();
        merged_ab.merge(&b).unwrap();

        let merged_ba = DenseSketch::new(config(10));
        merged_ba.merge(&b).unwrap();
        merged_ba.merge(&a).unwrap();

        for i in 0..merged_ab.m() {
            assert_eq!(merged_ab.get(i), merged_ba.get(i));
        }
    }

    #[test]
    fn reset_clears_registers() {
        let d = DenseSketch::new(config(10));
        d.insert_key(b"x");
        d.reset();
        assert_eq!(d.element_count(), 0);
    }
}
