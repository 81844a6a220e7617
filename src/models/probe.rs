//! Probe result models
//!
//! A [`ProbeRecord`] is the cached result of running the probe engine
//! against an audio file: duration, tag dictionary, and embedded chapter
//! list, or a failure. Keyed by path + mtime by the probe cache.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One embedded chapter as reported by the probe engine, before conversion
/// into a [`crate::models::ChapterTiming`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeChapter {
    /// Start time in seconds.
    pub start_time: f64,
    /// End time in seconds.
    pub end_time: f64,
    /// Raw tag dictionary for this chapter (e.g. a `title` key).
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

/// Successful probe output for one audio file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProbeData {
    pub duration: Option<f64>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    #[serde(default)]
    pub chapters: Vec<ProbeChapter>,
}

/// One cache entry: success (`data`) or failure (`error`), keyed by the
/// source path's mtime at the time of the probe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeRecord {
    pub mtime_ms: i64,
    pub data: Option<ProbeData>,
    pub error: Option<String>,
}

impl ProbeRecord {
    pub fn success(mtime_ms: i64, data: ProbeData) -> Self {
        Self {
            mtime_ms,
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(mtime_ms: i64, error: String) -> Self {
        Self {
            mtime_ms,
            data: None,
            error: Some(error),
        }
    }

    pub fn is_failure(&self) -> bool {
        self.data.is_none() && self.error.as_deref().is_some_and(|e| !e.is_empty())
    }
}
