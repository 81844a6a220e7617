//! Typed error taxonomy for the public API
//!
//! Most failures inside the core are handled locally - logged and
//! skipped - and never leave the crate as an error at all. This enum
//! covers only the handful of outcomes an external caller (the HTTP
//! handler layer) must be able to match on to choose a status code.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("unknown book id: {0}")]
    UnknownBook(String),

    #[error("no library roots configured")]
    NoRootsConfigured,

    #[error("invalid range header")]
    InvalidRange,

    #[error("range not satisfiable for a {total_size}-byte object")]
    RangeNotSatisfiable { total_size: u64 },
}
