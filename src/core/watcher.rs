//! Watcher / Debouncer
//!
//! Subscribes to recursive filesystem change notifications for every
//! configured root and coalesces bursts of events into a single
//! debounced rescan trigger. The watcher never mutates state directly -
//! it only wakes the caller-supplied rescan closure.

use anyhow::{Context, Result};
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher as NotifyWatcherTrait};
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

/// Default coalescing delay between the first event in a burst and the
/// rescan it triggers.
pub const DEFAULT_COALESCE_DELAY: Duration = Duration::from_millis(500);

/// Holds the live `notify` watcher so it isn't dropped (and stopped)
/// while the process runs.
pub struct LibraryWatcher {
    _inner: RecommendedWatcher,
}

/// Start watching every root recursively. Each filesystem event notifies
/// `trigger`; the caller is responsible for running the debounce loop
/// via [`spawn_debounced_rescan`].
pub fn watch_roots(roots: &[std::path::PathBuf], trigger: Arc<Notify>) -> Result<LibraryWatcher> {
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<notify::Result<Event>>();

    let mut watcher =
        notify::recommended_watcher(move |res| {
            let _ = tx.send(res);
        })
        .context("Failed to create filesystem watcher")?;

    for root in roots {
        if let Err(e) = watcher.watch(root, RecursiveMode::Recursive) {
            tracing::warn!("Failed to watch {}: {e}", root.display());
        }
    }

    tokio::spawn(async move {
        while let Some(res) = rx.recv().await {
            match res {
                Ok(_event) => trigger.notify_one(),
                Err(e) => tracing::warn!("Watcher error: {e}"),
            }
        }
    });

    Ok(LibraryWatcher { _inner: watcher })
}

/// Run the debounce loop forever: wait for a notification, wait out the
/// coalescing delay (swallowing further events that arrive during it -
/// a single outstanding timer per process), then run `rescan`.
pub fn spawn_debounced_rescan<F, Fut>(trigger: Arc<Notify>, coalesce_delay: Duration, mut rescan: F)
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send,
{
    tokio::spawn(async move {
        loop {
            trigger.notified().await;
            tokio::time::sleep(coalesce_delay).await;
            rescan().await;
        }
    });
}

pub fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|s| s.to_str())
        .map(|s| s.starts_with('.'))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hidden_paths_are_detected() {
        assert!(is_hidden(Path::new("/a/.hidden")));
        assert!(!is_hidden(Path::new("/a/visible")));
    }
}
