//! Error taxonomy (`spec.md` §7).
//!
//! Not part of the teacher's dependency table — pulled in because the
//! rest of this codebase's lineage (the storage crates under
//! `examples/abiolaogu-tdb-fork`) models errors with `thiserror`.
use thiserror::Error;

/// Errors raised at construction or `reconfigure` time.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("key_size must be greater than zero")]
    InvalidKeySize,
    #[error("value_size must be greater than zero")]
    InvalidValueSize,
    #[error("allocation failed")]
    OutOfMemory,
}

/// Errors raised by fetch-style operations on a miss (`spec.md` §7).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("cache miss and no filler is registered")]
    NoProducer,
    #[error("filler failed to produce a value")]
    ProducerFailed,
}
