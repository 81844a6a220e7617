//! Transcode job model
//!
//! A [`Job`] is the unit of work passed from the Scanner (the sole
//! producer) to the Transcode Worker (the sole consumer) over the
//! job queue.

use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Job {
    pub source: PathBuf,
    pub target: PathBuf,
    pub expected_mtime_ms: i64,
}
