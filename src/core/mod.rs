//! Core processing modules
//!
//! This module contains the ingestion-and-streaming pipeline: the
//! Scanner, Watcher/Debouncer, Probe Cache, Transcode State Store, Job
//! Queue, Transcode Worker, Library Index, Chapter-Tag Encoder, and
//! Virtual Stream Assembler. [`Core`] bundles the shared mutable state
//! (library index, transcode state, probe cache, job queue) behind one
//! value - no module-level statics.

mod assembler;
mod chapter_tag;
mod library;
mod probe_cache;
mod queue;
mod scanner;
mod state_store;
mod watcher;
mod worker;

pub use assembler::{
    estimated_tag_length, parse_range, stream, ByteRange, ByteStream, RangeOutcome, StreamResponse,
};
pub use chapter_tag::{encode as encode_chapter_tag, tag_length as chapter_tag_length, CoverArt};
pub use library::{chapters_response, ChapterEntry, ChaptersResponse, FeedEntry, LibraryIndex};
pub use probe_cache::ProbeCache;
pub use queue::JobQueue;
pub use state_store::TranscodeStateStore;
pub use watcher::{is_hidden, spawn_debounced_rescan, watch_roots, LibraryWatcher, DEFAULT_COALESCE_DELAY};
pub use worker::run as run_worker;

use crate::audio::{ConvertEngine, ProbeEngine};
use crate::error::Error;
use crate::models::{Book, Config, Job};
use crate::utils::load_or_create_api_key;
use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, Notify};

/// The process-owned shared state: every component that isn't purely
/// local talks to the world through one `Core` value instead of through
/// module-level globals.
pub struct Core {
    pub config: Config,
    pub library: Arc<LibraryIndex>,
    pub transcode_state: Arc<TranscodeStateStore>,
    pub probe_cache: Arc<ProbeCache>,
    pub queue: Arc<JobQueue>,
    pub convert_engine: Arc<dyn ConvertEngine>,
    /// 48-character hex API key, minted on first run and reused on every
    /// subsequent one. Consumed by the (external) HTTP auth layer; the
    /// core only owns its lifecycle.
    pub api_key: String,
    job_receiver: Mutex<Option<mpsc::UnboundedReceiver<Job>>>,
    /// Serializes rescans: a scan already running is waited on rather
    /// than overlapped with another.
    scan_lock: Mutex<()>,
}

impl Core {
    pub async fn bootstrap(
        config: Config,
        probe_engine: Arc<dyn ProbeEngine>,
        convert_engine: Arc<dyn ConvertEngine>,
    ) -> Result<Self> {
        tokio::fs::create_dir_all(&config.data_dir).await.ok();

        let library = Arc::new(LibraryIndex::load(config.data_dir.clone()).await);
        let transcode_state = Arc::new(TranscodeStateStore::load(config.data_dir.clone()).await);
        let probe_cache = Arc::new(ProbeCache::load(probe_engine, config.data_dir.clone()).await);
        let (queue, receiver) = JobQueue::new();
        let api_key = load_or_create_api_key(&config.data_dir).await?;

        Ok(Self {
            config,
            library,
            transcode_state,
            probe_cache,
            queue: Arc::new(queue),
            convert_engine,
            api_key,
            job_receiver: Mutex::new(Some(receiver)),
            scan_lock: Mutex::new(()),
        })
    }

    /// Run one full scan over every configured root. Concurrent callers
    /// serialize on each other rather than overlapping.
    pub async fn scan(&self) -> Result<()> {
        let _guard = self.scan_lock.lock().await;
        scanner::scan_roots(
            &self.config.roots,
            &self.probe_cache,
            &self.transcode_state,
            &self.library,
            &self.queue,
            &self.config.data_dir,
        )
        .await
    }

    /// Spawn the single transcode worker. Panics if called more than
    /// once - there is only one job receiver to hand out, and exactly
    /// one transcode runs at a time.
    pub fn spawn_worker(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let receiver = self
            .job_receiver
            .try_lock()
            .expect("spawn_worker called concurrently with itself")
            .take()
            .expect("spawn_worker called more than once");

        let convert_engine = Arc::clone(&self.convert_engine);
        let transcode_state = Arc::clone(&self.transcode_state);
        let library = Arc::clone(&self.library);
        let queue = Arc::clone(&self.queue);

        tokio::spawn(run_worker(receiver, convert_engine, transcode_state, library, queue))
    }

    /// Start the filesystem watcher over every configured root, debounced
    /// into serialized rescans.
    pub fn spawn_watcher(self: &Arc<Self>) -> Result<LibraryWatcher> {
        let trigger = Arc::new(Notify::new());
        let watcher = watch_roots(&self.config.roots, Arc::clone(&trigger))?;

        let core = Arc::clone(self);
        spawn_debounced_rescan(trigger, DEFAULT_COALESCE_DELAY, move || {
            let core = Arc::clone(&core);
            async move {
                if let Err(e) = core.scan().await {
                    tracing::warn!("Rescan failed: {e}");
                }
            }
        });

        Ok(watcher)
    }

    pub async fn find_book(&self, id: &str) -> Option<Book> {
        self.library.find(id).await
    }

    /// Feed entries sorted for the podcast surface. Errors with
    /// [`Error::NoRootsConfigured`] when the process was started with no
    /// library roots at all, so the HTTP layer can map it to a 500
    /// without having to special-case an empty list from a real scan.
    pub async fn feed(&self) -> Result<Vec<FeedEntry>, Error> {
        if self.config.roots.is_empty() {
            return Err(Error::NoRootsConfigured);
        }
        Ok(self.library.feed_books_sorted(&self.transcode_state).await)
    }

    pub fn data_dir(&self) -> &PathBuf {
        &self.config.data_dir
    }
}
