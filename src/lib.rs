//! A concurrent HyperLogLog++ cardinality estimator.
//!
//! A sketch starts in a high-precision sparse representation, promoting itself to a bit-packed
//! dense register array once the sparse encoding stops being the smaller of the two. Both
//! representations support concurrent inserts, and sketches in any combination of formats can
//! be merged.
//!
//! ```
//! use hllpp::{Config, HashAlgorithm, Hllpp};
//!
//! let config = Config::new(14, HashAlgorithm::Fast).unwrap();
//! let sketch = Hllpp::new(config);
//! sketch.insert_key(b"10.0.0.1");
//! sketch.insert_key(b"10.0.0.2");
//! assert_eq!(sketch.element_count(), 2);
//! ```

mod bias;
pub mod config;
mod dense;
mod error;
mod hash;
mod hllpp;
mod locks;
mod registers;
mod serialize;
mod sparse;

pub use config::{Concurrency, Config, HashAlgorithm};
pub use error::Error;
pub use hllpp::Hllpp;

impl Hllpp {
    /// Serializes this sketch to its wire form: a small header (`p`, `p'`, hash algorithm,
    /// variant) followed by the sparse run-list or the dense register bytes.
    pub fn export(&self) -> Vec<u8> {
        serialize::to_bytes(self)
    }

    /// Reconstructs a sketch from `export`'s output.
    pub fn import(bytes: &[u8]) -> Result<Hllpp, Error> {
        serialize::from_bytes(bytes)
    }
}
