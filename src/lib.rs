//! Turns a filesystem tree of audiobooks into a single podcast feed.
//!
//! This crate owns the ingestion-and-streaming pipeline: scanning library
//! roots, probing and transcoding audio, and assembling the virtual byte
//! streams a podcast client pulls down. The outward HTTP surface (feed
//! XML, status pages) is intentionally outside this crate's scope - see
//! [`core::Core`] for the seam it hands off through.

pub mod audio;
pub mod core;
pub mod error;
pub mod models;
pub mod utils;

pub use core::Core;
pub use error::Error;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
