use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};

use crate::utils::{calc_position, divide_by_8_round_up, read_u8_bits, write_u8_bits};

const REG_WIDTH: u8 = 6;
const MAX_REGISTER_VALUE: u8 = (1 << REG_WIDTH) - 1;

/// A bit-packed array of 6-bit HLL counters with incrementally maintained aggregates:
/// `sum = Σ 2^-M[i]` and `zeros = |{i : M[i] = 0}|`.
///
/// The backing bytes are individually atomic so that two registers whose 6-bit fields share a
/// byte — unavoidable since `gcd(6, 8) = 2` — never tear each other's write even when a
/// `StripedLocks` bank assigns them to different stripes. `sum`/`zeros` are maintained with
/// atomics (CAS loop on bit-cast `f64`, `fetch_add`/`fetch_sub`) so the whole type is safe to
/// share behind an `&PackedRegisters` without an outer lock; callers still serialize the
/// logical read-modify-write of a single register through `StripedLocks::lock_for` to preserve
/// the "max wins" semantics, not to protect the bytes themselves.
pub struct PackedRegisters {
    data: Vec<AtomicU8>,
    size: usize,
    sum_bits: AtomicU64,
    zeros: AtomicU32,
}

impl PackedRegisters {
    pub fn new(size: usize) -> Self {
        let byte_len = divide_by_8_round_up(size as u32 * REG_WIDTH as u32) as usize;
        let data = (0..byte_len).map(|_| AtomicU8::new(0)).collect();
        PackedRegisters {
            data,
            size,
            sum_bits: AtomicU64::new((size as f64).to_bits()),
            zeros: AtomicU32::new(size as u32),
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn get(&self, i: usize) -> u8 {
        debug_assert!(i < self.size, "register index {i} out of range");
        let (idx, pos) = calc_position(i as u32, REG_WIDTH);
        read_u8_bits(&self.data, idx, pos, REG_WIDTH)
    }

    /// Sets register `i` to `value` if `value` is strictly greater than the current contents,
    /// keeping `sum`/`zeros` consistent with the new register contents. No-op otherwise.
    pub fn set_max(&self, i: usize, value: u8) {
        debug_assert!(i < self.size, "register index {i} out of range");
        debug_assert!(
            value <= MAX_REGISTER_VALUE,
            "register value {value} exceeds {MAX_REGISTER_VALUE}"
        );

        let current = self.get(i);
        if value <= current {
            return;
        }

        let (idx, pos) = calc_position(i as u32, REG_WIDTH);
        write_u8_bits(&self.data, idx, pos, value, REG_WIDTH);

        let delta = 2f64.powi(-(value as i32)) - 2f64.powi(-(current as i32));
        self.add_sum(delta);

        if current == 0 && value != 0 {
            self.zeros.fetch_sub(1, Ordering::Relaxed);
        }
    }

    fn add_sum(&self, delta: f64) {
        let mut current = self.sum_bits.load(Ordering::Relaxed);
        loop {
            let new = (f64::from_bits(current) + delta).to_bits();
            match self.sum_bits.compare_exchange_weak(
                current,
                new,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return,
                Err(observed) => current = observed,
            }
        }
    }

    pub fn sum(&self) -> f64 {
        f64::from_bits(self.sum_bits.load(Ordering::Relaxed))
    }

    pub fn zeros(&self) -> u32 {
        self.zeros.load(Ordering::Relaxed)
    }

    pub fn reset(&self) {
        for byte in &self.data {
            byte.store(0, Ordering::Relaxed);
        }
        self.sum_bits
            .store((self.size as f64).to_bits(), Ordering::Relaxed);
        self.zeros.store(self.size as u32, Ordering::Relaxed);
    }

    /// Builds a fresh `PackedRegisters` with the same size, registers all zeroed.
    pub fn clone_empty(&self) -> Self {
        PackedRegisters::new(self.size)
    }
}
