//! Library Index: the in-memory map of ready Books
//!
//! Exclusively owns `Book` records. Mutated by the Scanner and the
//! Worker, read by HTTP handlers; guarded by a single mutex so writers
//! never interleave.

use crate::core::state_store::TranscodeStateStore;
use crate::models::{Book, BookId, TranscodeState};
use crate::utils::{load_json_array, save_json_array};
use anyhow::Result;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use tokio::sync::Mutex;

const FILE_NAME: &str = "library-index.json";

/// One `chapters(book)` entry.
#[derive(Debug, Clone, Serialize)]
pub struct ChapterEntry {
    pub start_time_seconds: f64,
    pub title: String,
}

/// The `chapters(book)` response shape. `None` for a book with no
/// chapters (e.g. a `single` with none embedded).
#[derive(Debug, Clone, Serialize)]
pub struct ChaptersResponse {
    pub version: String,
    pub chapters: Vec<ChapterEntry>,
}

pub fn chapters_response(book: &Book) -> Option<ChaptersResponse> {
    let chapters = book.chapters();
    if chapters.is_empty() {
        return None;
    }
    Some(ChaptersResponse {
        version: "1.2.0".to_string(),
        chapters: chapters
            .iter()
            .map(|c| ChapterEntry {
                start_time_seconds: c.start_ms as f64 / 1000.0,
                title: c.title.clone(),
            })
            .collect(),
    })
}

/// One entry in the operator-visible feed superset: either a streamable
/// `Book`, or a `single` still awaiting its transcode, surfaced so
/// operators can see it's in the pipeline.
#[derive(Debug, Clone)]
pub enum FeedEntry {
    Ready(Book),
    Pending { source: PathBuf, state: TranscodeState, error: Option<String> },
}

pub struct LibraryIndex {
    entries: Mutex<HashMap<String, Book>>,
    data_dir: PathBuf,
}

impl LibraryIndex {
    pub async fn load(data_dir: PathBuf) -> Self {
        let path = data_dir.join(FILE_NAME);
        let books: Vec<Book> = load_json_array(&path).await;
        let entries = books.into_iter().map(|b| (b.id().0.clone(), b)).collect();

        Self {
            entries: Mutex::new(entries),
            data_dir,
        }
    }

    pub async fn upsert(&self, book: Book) {
        let mut entries = self.entries.lock().await;
        entries.insert(book.id().0.clone(), book);
    }

    /// Evict a single id outright: a `single` whose mtime changed after a
    /// completed transcode is not streamable again until the Worker
    /// finishes the new job, not merely stale-but-kept.
    pub async fn remove(&self, id: &str) {
        self.entries.lock().await.remove(id);
    }

    /// Drop every entry whose id is not in `keep_ids`: a rescan that no
    /// longer references a book's source evicts it.
    pub async fn retain_ids(&self, keep_ids: &HashSet<BookId>) {
        let keep: HashSet<&str> = keep_ids.iter().map(|id| id.0.as_str()).collect();
        let mut entries = self.entries.lock().await;
        entries.retain(|id, _| keep.contains(id.as_str()));
    }

    pub async fn find(&self, id: &str) -> Option<Book> {
        self.entries.lock().await.get(id).cloned()
    }

    /// Streamable, ready books - canonical for the streaming surface.
    pub async fn books_sorted(&self) -> Vec<Book> {
        let entries = self.entries.lock().await;
        let mut books: Vec<Book> = entries.values().filter(|b| b.is_streamable()).cloned().collect();
        books.sort_by(|a, b| b.sort_key().cmp(&a.sort_key()));
        books
    }

    pub async fn persist(&self) -> Result<()> {
        let path = self.data_dir.join(FILE_NAME);
        let entries = self.entries.lock().await;
        let books: Vec<&Book> = entries.values().collect();
        save_json_array(&path, &books).await
    }

    /// Operator-visible superset of `books_sorted`: ready books plus
    /// `single` sources still pending/working/failed transcode, so they
    /// show up as "not yet streamable" rather than simply missing.
    pub async fn feed_books_sorted(&self, transcode_state: &TranscodeStateStore) -> Vec<FeedEntry> {
        let ready: Vec<Book> = {
            let entries = self.entries.lock().await;
            entries.values().cloned().collect()
        };
        let ready_sources: HashSet<PathBuf> = ready
            .iter()
            .filter_map(|b| match b {
                Book::Single { primary_file, .. } => Some(primary_file.clone()),
                Book::Multi { .. } => None,
            })
            .collect();

        let mut entries: Vec<FeedEntry> = ready.iter().cloned().map(FeedEntry::Ready).collect();
        for status in transcode_state.snapshot().await {
            if status.state == TranscodeState::Done && ready_sources.contains(&status.target) {
                continue;
            }
            entries.push(FeedEntry::Pending {
                source: status.source,
                state: status.state,
                error: status.error,
            });
        }

        entries.sort_by(|a, b| sort_key(b).cmp(&sort_key(a)));
        entries
    }
}

fn sort_key(entry: &FeedEntry) -> String {
    match entry {
        FeedEntry::Ready(book) => book.sort_key().to_string(),
        FeedEntry::Pending { .. } => String::new(),
    }
}
