//! Transcode state models
//!
//! A [`TranscodeStatus`] tracks the normalization lifecycle of a single
//! `.m4b` source container, keyed by source path. The tuple
//! `(source, mtime_ms)` is its identity: a record whose `mtime_ms` no
//! longer matches the file on disk is stale and must be discarded.

use crate::models::book::BookCommon;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranscodeState {
    Pending,
    Working,
    Done,
    Failed,
}

/// A snapshot of the `Book` fields needed to promote a finished transcode
/// into the library index without re-scanning the source directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscodeMeta {
    pub common: BookCommon,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscodeStatus {
    pub source: PathBuf,
    pub target: PathBuf,
    pub mtime_ms: i64,
    pub state: TranscodeState,
    pub error: Option<String>,
    pub out_time_ms: Option<u64>,
    pub speed: Option<f64>,
    pub duration_ms: Option<u64>,
    pub meta: Option<TranscodeMeta>,
}

impl TranscodeStatus {
    pub fn new_pending(source: PathBuf, target: PathBuf, mtime_ms: i64, meta: Option<TranscodeMeta>) -> Self {
        Self {
            source,
            target,
            mtime_ms,
            state: TranscodeState::Pending,
            error: None,
            out_time_ms: None,
            speed: None,
            duration_ms: None,
            meta,
        }
    }

    /// A record is stale once the source's mtime no longer matches.
    pub fn is_stale(&self, current_mtime_ms: i64) -> bool {
        self.mtime_ms != current_mtime_ms
    }
}
