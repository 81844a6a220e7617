//! Probe Cache: mtime-keyed memoization over the external probe engine

use crate::audio::ProbeEngine;
use crate::models::{ChapterTiming, ProbeData, ProbeRecord};
use crate::utils::{load_json_array, save_json_array};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

const FILE_NAME: &str = "probe-cache.json";

/// One persisted row: `{ file, mtime_ms, data|null, error? }`.
#[derive(Debug, Serialize, Deserialize)]
struct PersistedEntry {
    file: PathBuf,
    mtime_ms: i64,
    data: Option<ProbeData>,
    error: Option<String>,
}

pub struct ProbeCache {
    engine: Arc<dyn ProbeEngine>,
    data_dir: PathBuf,
    entries: Mutex<HashMap<PathBuf, ProbeRecord>>,
}

impl ProbeCache {
    pub async fn load(engine: Arc<dyn ProbeEngine>, data_dir: PathBuf) -> Self {
        let path = data_dir.join(FILE_NAME);
        let rows: Vec<PersistedEntry> = load_json_array(&path).await;
        let entries = rows
            .into_iter()
            .map(|row| {
                (
                    row.file,
                    ProbeRecord {
                        mtime_ms: row.mtime_ms,
                        data: row.data,
                        error: row.error,
                    },
                )
            })
            .collect();

        Self {
            engine,
            data_dir,
            entries: Mutex::new(entries),
        }
    }

    /// `probe(path, mtime_ms) → ProbeData | null` - returns the cached
    /// value if the stored mtime matches, otherwise re-probes and
    /// persists the (possibly failed) result.
    pub async fn probe(&self, path: &Path, mtime_ms: i64) -> Option<ProbeData> {
        {
            let entries = self.entries.lock().await;
            if let Some(record) = entries.get(path) {
                if record.mtime_ms == mtime_ms {
                    return record.data.clone();
                }
            }
        }

        let record = match self.engine.probe(path).await {
            Ok(data) => ProbeRecord::success(mtime_ms, data),
            Err(e) => {
                tracing::warn!("Probe failed for {}: {e}", path.display());
                ProbeRecord::failure(mtime_ms, e.to_string())
            }
        };
        let data = record.data.clone();

        {
            let mut entries = self.entries.lock().await;
            entries.insert(path.to_path_buf(), record);
        }

        if let Err(e) = self.persist().await {
            tracing::warn!("Failed to persist probe cache: {e}");
        }

        data
    }

    pub async fn duration(&self, path: &Path, mtime_ms: i64) -> Option<f64> {
        self.probe(path, mtime_ms).await.and_then(|d| d.duration)
    }

    /// Maps the probed chapter list into [`ChapterTiming`]s. Chapters
    /// without a title get a synthesized `"Chapter {n}"`.
    pub async fn chapters(&self, path: &Path, mtime_ms: i64) -> Option<Vec<ChapterTiming>> {
        let data = self.probe(path, mtime_ms).await?;
        if data.chapters.is_empty() {
            return None;
        }

        Some(
            data.chapters
                .iter()
                .enumerate()
                .map(|(i, ch)| {
                    let title = ch
                        .tags
                        .get("title")
                        .cloned()
                        .unwrap_or_else(|| format!("Chapter {}", i + 1));
                    ChapterTiming::new(
                        i,
                        title,
                        (ch.start_time * 1000.0).round() as u64,
                        (ch.end_time * 1000.0).round() as u64,
                    )
                })
                .collect(),
        )
    }

    /// Entries whose probe failed (for operator display).
    pub async fn failures(&self) -> Vec<(PathBuf, String)> {
        let entries = self.entries.lock().await;
        entries
            .iter()
            .filter_map(|(path, record)| {
                record
                    .error
                    .as_ref()
                    .filter(|e| !e.is_empty())
                    .map(|e| (path.clone(), e.clone()))
            })
            .collect()
    }

    pub async fn persist(&self) -> anyhow::Result<()> {
        let path = self.data_dir.join(FILE_NAME);
        let entries = self.entries.lock().await;
        let rows: Vec<PersistedEntry> = entries
            .iter()
            .map(|(file, record)| PersistedEntry {
                file: file.clone(),
                mtime_ms: record.mtime_ms,
                data: record.data.clone(),
                error: record.error.clone(),
            })
            .collect();
        save_json_array(&path, &rows).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ProbeChapter;
    use anyhow::Result;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    struct CountingEngine {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ProbeEngine for CountingEngine {
        async fn probe(&self, _path: &Path) -> Result<ProbeData> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(ProbeData {
                duration: Some(123.0),
                tags: Default::default(),
                chapters: vec![ProbeChapter {
                    start_time: 0.0,
                    end_time: 10.0,
                    tags: Default::default(),
                }],
            })
        }
    }

    #[tokio::test]
    async fn unchanged_mtime_does_not_reprobe() {
        let dir = tempdir().unwrap();
        let engine = Arc::new(CountingEngine { calls: AtomicUsize::new(0) });
        let cache = ProbeCache::load(engine.clone(), dir.path().to_path_buf()).await;

        let path = Path::new("/fake/book.m4b");
        cache.probe(path, 1000).await;
        cache.probe(path, 1000).await;

        assert_eq!(engine.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn mtime_change_triggers_reprobe() {
        let dir = tempdir().unwrap();
        let engine = Arc::new(CountingEngine { calls: AtomicUsize::new(0) });
        let cache = ProbeCache::load(engine.clone(), dir.path().to_path_buf()).await;

        let path = Path::new("/fake/book.m4b");
        cache.probe(path, 1000).await;
        cache.probe(path, 2000).await;

        assert_eq!(engine.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn untitled_chapter_gets_synthesized_title() {
        let dir = tempdir().unwrap();
        let engine = Arc::new(CountingEngine { calls: AtomicUsize::new(0) });
        let cache = ProbeCache::load(engine, dir.path().to_path_buf()).await;

        let chapters = cache.chapters(Path::new("/fake/book.m4b"), 1000).await.unwrap();
        assert_eq!(chapters[0].title, "Chapter 1");
        assert_eq!(chapters[0].start_ms, 0);
        assert_eq!(chapters[0].end_ms, 10000);
    }
}
