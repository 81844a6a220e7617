//! Transcode Worker
//!
//! Single consumer of the Job Queue. Invokes the convert engine, tracks
//! progress in the Transcode State Store, and on success promotes the
//! finished book into the Library Index without re-scanning its source
//! directory.

use crate::audio::ConvertEngine;
use crate::core::library::LibraryIndex;
use crate::core::queue::JobQueue;
use crate::core::state_store::TranscodeStateStore;
use crate::models::{Job, TranscodeState, TranscodeStatus};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, UNIX_EPOCH};
use tokio::sync::mpsc;

const PERSIST_INTERVAL: Duration = Duration::from_secs(2);
const LOG_THROTTLE: Duration = Duration::from_millis(1500);
const LOG_PROGRESS_STEP_MS: i64 = 5_000;

/// Run the worker loop forever, consuming jobs as they arrive.
pub async fn run(
    mut receiver: mpsc::UnboundedReceiver<Job>,
    convert_engine: Arc<dyn ConvertEngine>,
    transcode_state: Arc<TranscodeStateStore>,
    library: Arc<LibraryIndex>,
    queue: Arc<JobQueue>,
) {
    while let Some(job) = receiver.recv().await {
        let source = job.source.clone();
        let result = process_job(
            job,
            Arc::clone(&convert_engine),
            Arc::clone(&transcode_state),
            Arc::clone(&library),
        )
        .await;
        // Whether the job dropped as stale, succeeded, or failed, the
        // source is no longer "currently queued" - a future rescan may
        // requeue it if the source mtime has since changed.
        queue.mark_finished(&source);
        if let Err(e) = result {
            tracing::warn!("Transcode job failed for {}: {e}", source.display());
        }
    }
}

#[derive(Clone, Copy, Default)]
struct Progress {
    out_time_ms: Option<i64>,
    speed: Option<f64>,
}

async fn process_job(
    job: Job,
    convert_engine: Arc<dyn ConvertEngine>,
    transcode_state: Arc<TranscodeStateStore>,
    library: Arc<LibraryIndex>,
) -> anyhow::Result<()> {
    let current_mtime_ms = file_mtime_ms(&job.source);

    let Some(status) = transcode_state.get(&job.source).await else {
        tracing::debug!("No status for {}; dropping stale job", job.source.display());
        return Ok(());
    };

    if current_mtime_ms != Some(status.mtime_ms) || status.mtime_ms != job.expected_mtime_ms {
        tracing::debug!("{} changed since enqueue; dropping stale job", job.source.display());
        return Ok(());
    }

    let mut working = status;
    working.state = TranscodeState::Working;
    working.error = None;
    if working.duration_ms.is_none() {
        working.duration_ms = working
            .meta
            .as_ref()
            .and_then(|m| m.common.duration_seconds)
            .map(|s| (s * 1000.0).round() as u64);
    }
    transcode_state.upsert(working.clone()).await;
    if let Err(e) = transcode_state.persist().await {
        tracing::warn!("Failed to persist transcode state: {e}");
    }

    let cover = working.meta.as_ref().and_then(|m| m.common.cover_path.clone());

    // The convert engine's progress callback is synchronous (it runs
    // inline with stdout parsing), so it can only update a plain mutex.
    // A side task drains that mutex on an interval and does the actual
    // (async) state-store persistence and throttled logging.
    let shared_progress = Arc::new(Mutex::new(Progress::default()));
    let callback_progress = Arc::clone(&shared_progress);
    let mut progress = move |out_time_ms: Option<i64>, speed: Option<f64>| {
        if let Ok(mut p) = callback_progress.lock() {
            p.out_time_ms = out_time_ms;
            p.speed = speed;
        }
    };

    let reporter = spawn_progress_reporter(
        Arc::clone(&shared_progress),
        job.source.clone(),
        working.clone(),
        Arc::clone(&transcode_state),
    );

    let convert_result = convert_engine
        .convert(&job.source, &job.target, cover.as_deref(), &mut progress)
        .await;
    reporter.abort();

    match convert_result {
        Ok(()) => finish_success(&job, working, &transcode_state, &library).await,
        Err(e) => finish_failure(&job.source, e, &transcode_state).await,
    }

    Ok(())
}

/// Every `PERSIST_INTERVAL`, snapshot the shared progress into the
/// Transcode State Store and, no more often than `LOG_THROTTLE`, log
/// progress once it has advanced by at least `LOG_PROGRESS_STEP_MS`.
fn spawn_progress_reporter(
    shared: Arc<Mutex<Progress>>,
    source: std::path::PathBuf,
    base: TranscodeStatus,
    transcode_state: Arc<TranscodeStateStore>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut last_logged_ms: i64 = -LOG_PROGRESS_STEP_MS;
        let mut last_log = Instant::now() - LOG_THROTTLE;
        loop {
            tokio::time::sleep(PERSIST_INTERVAL).await;
            let progress = *shared.lock().unwrap_or_else(|e| e.into_inner());
            let Some(ms) = progress.out_time_ms else { continue };

            let mut snapshot = base.clone();
            snapshot.out_time_ms = Some(ms.max(0) as u64);
            snapshot.speed = progress.speed;
            transcode_state.upsert(snapshot).await;
            if let Err(e) = transcode_state.persist().await {
                tracing::warn!("Failed to persist transcode progress: {e}");
            }

            if last_log.elapsed() >= LOG_THROTTLE && ms - last_logged_ms >= LOG_PROGRESS_STEP_MS {
                tracing::info!(
                    "Transcoding {}: {:.1}s (speed {:.2}x)",
                    source.display(),
                    ms as f64 / 1000.0,
                    progress.speed.unwrap_or(0.0)
                );
                last_log = Instant::now();
                last_logged_ms = ms;
            }
        }
    })
}

async fn finish_success(
    job: &Job,
    mut status: TranscodeStatus,
    transcode_state: &TranscodeStateStore,
    library: &LibraryIndex,
) {
    if let Some(source_mtime) = file_mtime(&job.source) {
        let _ = filetime::set_file_mtime(&job.target, source_mtime);
    }
    let target_size = std::fs::metadata(&job.target).map(|m| m.len()).unwrap_or(0);

    status.state = TranscodeState::Done;
    status.error = None;
    status.out_time_ms = status.duration_ms;
    status.speed = None;
    transcode_state.upsert(status.clone()).await;

    if let Some(meta) = status.meta.clone() {
        let book = crate::models::Book::Single {
            common: meta.common,
            primary_file: job.target.clone(),
            total_size: target_size,
            chapters: None,
        };
        library.upsert(book).await;
    }

    if let Err(e) = transcode_state.persist().await {
        tracing::warn!("Failed to persist transcode state: {e}");
    }
    if let Err(e) = library.persist().await {
        tracing::warn!("Failed to persist library index: {e}");
    }

    tracing::info!("Transcode complete: {}", job.target.display());
}

async fn finish_failure(source: &Path, error: anyhow::Error, transcode_state: &TranscodeStateStore) {
    if let Some(mut status) = transcode_state.get(source).await {
        status.state = TranscodeState::Failed;
        status.error = Some(error.to_string());
        transcode_state.upsert(status).await;
        if let Err(e) = transcode_state.persist().await {
            tracing::warn!("Failed to persist transcode state: {e}");
        }
    }
    tracing::warn!("Transcode failed for {}: {error}", source.display());
}

fn file_mtime_ms(path: &Path) -> Option<i64> {
    let meta = std::fs::metadata(path).ok()?;
    let modified = meta.modified().ok()?;
    let since_epoch = modified.duration_since(UNIX_EPOCH).ok()?;
    Some(since_epoch.as_millis() as i64)
}

fn file_mtime(path: &Path) -> Option<filetime::FileTime> {
    let meta = std::fs::metadata(path).ok()?;
    Some(filetime::FileTime::from_last_modification_time(&meta))
}
