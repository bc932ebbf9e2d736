use thiserror::Error;

/// Errors surfaced across the public API. Bugs internal to bit-packing (out-of-range register
/// index or value) remain `panic!`/`debug_assert!` sites, not `Result`s — see `registers.rs`.
#[derive(Clone, Debug, Error)]
pub enum Error {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error("serialization error: {0}")]
    SerializationError(String),
}
