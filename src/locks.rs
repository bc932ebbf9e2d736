use parking_lot::{Mutex, MutexGuard};

/// A bank of mutexes sharding the register index space, or a no-op stand-in for sketches that
/// are only ever accessed from a single thread. Stripe counts are fixed powers of two so the
/// index-to-stripe mapping is a mask, matching the bucket lock manager thresholds used for this
/// algorithm's reference concurrency model.
pub enum StripedLocks {
    Striped { stripes: Vec<Mutex<()>>, mask: usize },
    SingleThreaded,
}

/// RAII guard returned by `lock_for`. Holding it serializes the logical read-modify-write
/// window of every register mapped to the same stripe.
pub enum StripeGuard<'a> {
    Locked(MutexGuard<'a, ()>),
    Noop,
}

impl StripedLocks {
    pub fn for_size(m: usize) -> Self {
        let stripes = stripe_count(m);
        let bank = (0..stripes).map(|_| Mutex::new(())).collect();
        StripedLocks::Striped {
            stripes: bank,
            mask: stripes - 1,
        }
    }

    pub fn single_threaded() -> Self {
        StripedLocks::SingleThreaded
    }

    pub fn lock_for(&self, index: usize) -> StripeGuard<'_> {
        match self {
            StripedLocks::Striped { stripes, mask } => {
                let stripe = index & mask;
                StripeGuard::Locked(stripes[stripe].lock())
            }
            StripedLocks::SingleThreaded => StripeGuard::Noop,
        }
    }
}

/// Number of stripes for a register array of size `m`, always a power of two.
fn stripe_count(m: usize) -> usize {
    if m <= 1024 {
        8
    } else if m <= 4096 {
        16
    } else if m <= 16384 {
        32
    } else {
        64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stripe_count_thresholds() {
        assert_eq!(stripe_count(16), 8);
        assert_eq!(stripe_count(1024), 8);
        assert_eq!(stripe_count(1025), 16);
        assert_eq!(stripe_count(4096), 16);
        assert_eq!(stripe_count(4097), 32);
        assert_eq!(stripe_count(16384), 32);
        assert_eq!(stripe_count(16385), 64);
        assert_eq!(stripe_count(1 << 18), 64);
    }

    #[test]
    fn single_threaded_guard_does_not_block() {
        let locks = StripedLocks::single_threaded();
        let _a = locks.lock_for(0);
        let _b = locks.lock_for(0);
    }

    #[test]
    fn striped_guard_serializes_same_stripe() {
        let locks = StripedLocks::for_size(1024);
        let _guard = locks.lock_for(5);
        // index 5 + 8 maps to the same stripe (mask = 7); re-acquiring would deadlock a single
        // thread, so we only assert the mapping here rather than attempting that lock.
        if let StripedLocks::Striped { mask, .. } = &locks {
            assert_eq!(5 & mask, 13 & mask);
        }
    }
}
