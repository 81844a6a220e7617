//! End-to-end scenarios over the scanning and transcode pipeline,
//! mirroring the literal scan/rescan/restart scenarios 3-5: part removal
//! recomputes a multi book, a transcode survives a process restart, and a
//! source mtime bump invalidates a completed transcode.

use anyhow::Result;
use async_trait::async_trait;
use podible_core::audio::{ConvertEngine, ProbeEngine, ProgressFn};
use podible_core::models::{Config, ProbeData, TranscodeState};
use podible_core::Core;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::tempdir;

/// Reports a fixed duration per path, configured up front by the test.
struct FakeProbeEngine {
    durations: Mutex<HashMap<PathBuf, f64>>,
}

impl FakeProbeEngine {
    fn new() -> Self {
        Self { durations: Mutex::new(HashMap::new()) }
    }

    fn set(&self, path: &Path, seconds: f64) {
        self.durations.lock().unwrap().insert(path.to_path_buf(), seconds);
    }
}

#[async_trait]
impl ProbeEngine for FakeProbeEngine {
    async fn probe(&self, path: &Path) -> Result<ProbeData> {
        let duration = self.durations.lock().unwrap().get(path).copied();
        Ok(ProbeData { duration, tags: Default::default(), chapters: Vec::new() })
    }
}

/// Writes a fixed payload to the target instead of invoking `ffmpeg`.
struct FakeConvertEngine;

#[async_trait]
impl ConvertEngine for FakeConvertEngine {
    async fn convert(
        &self,
        _source: &Path,
        target: &Path,
        _cover: Option<&Path>,
        progress: &mut ProgressFn<'_>,
    ) -> Result<()> {
        progress(Some(0), Some(1.0));
        tokio::fs::write(target, b"normalized audio bytes").await?;
        Ok(())
    }
}

fn config(root: &Path, data_dir: &Path) -> Config {
    let mut config = Config::from_env(vec![root.to_path_buf()]);
    config.data_dir = data_dir.to_path_buf();
    config
}

#[tokio::test]
async fn multi_book_rescan_after_part_removal() {
    let library_dir = tempdir().unwrap();
    let data_dir = tempdir().unwrap();
    let book_dir = library_dir.path().join("Author").join("Book");
    std::fs::create_dir_all(&book_dir).unwrap();

    let part1 = book_dir.join("01.mp3");
    let part2 = book_dir.join("02.mp3");
    std::fs::write(&part1, vec![0u8; 100]).unwrap();
    std::fs::write(&part2, vec![0u8; 200]).unwrap();

    let probe = Arc::new(FakeProbeEngine::new());
    probe.set(&part1, 5.0);
    probe.set(&part2, 10.0);

    let core = Arc::new(
        Core::bootstrap(
            config(library_dir.path(), data_dir.path()),
            probe.clone(),
            Arc::new(FakeConvertEngine),
        )
        .await
        .unwrap(),
    );

    core.scan().await.unwrap();
    let books = core.library.books_sorted().await;
    assert_eq!(books.len(), 1);
    assert_eq!(books[0].total_size(), 300);
    assert_eq!(books[0].chapters().len(), 2);

    std::fs::remove_file(&part2).unwrap();
    core.scan().await.unwrap();

    let books = core.library.books_sorted().await;
    assert_eq!(books.len(), 1);
    assert_eq!(books[0].total_size(), 100);
    assert_eq!(books[0].chapters().len(), 1);
}

async fn wait_for_state(core: &Core, source: &Path, state: TranscodeState) {
    for _ in 0..100 {
        if let Some(status) = core.transcode_state.get(source).await {
            if status.state == state {
                return;
            }
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("timed out waiting for {source:?} to reach {state:?}");
}

#[tokio::test]
async fn transcode_recovery_across_restart() {
    let library_dir = tempdir().unwrap();
    let data_dir = tempdir().unwrap();
    let book_dir = library_dir.path().join("Author").join("Book");
    std::fs::create_dir_all(&book_dir).unwrap();

    let source = book_dir.join("book.m4b");
    std::fs::write(&source, vec![0u8; 10]).unwrap();

    let probe = Arc::new(FakeProbeEngine::new());
    probe.set(&source, 3600.0);

    let core = Arc::new(
        Core::bootstrap(
            config(library_dir.path(), data_dir.path()),
            probe.clone(),
            Arc::new(FakeConvertEngine),
        )
        .await
        .unwrap(),
    );
    core.scan().await.unwrap();
    core.spawn_worker();
    wait_for_state(&core, &source, TranscodeState::Done).await;

    let books = core.library.books_sorted().await;
    assert_eq!(books.len(), 1);
    drop(core);

    // Simulate a restart: a fresh Core over the same data directory.
    let core2 = Arc::new(
        Core::bootstrap(
            config(library_dir.path(), data_dir.path()),
            probe.clone(),
            Arc::new(FakeConvertEngine),
        )
        .await
        .unwrap(),
    );
    let books = core2.library.books_sorted().await;
    assert_eq!(books.len(), 1, "library index must survive a restart");
    let status = core2.transcode_state.get(&source).await.unwrap();
    assert_eq!(status.state, TranscodeState::Done);

    // Scenario 5: touching the source invalidates the completed transcode.
    let new_mtime = filetime::FileTime::from_unix_time(
        filetime::FileTime::from_last_modification_time(&std::fs::metadata(&source).unwrap())
            .unix_seconds()
            + 60,
        0,
    );
    filetime::set_file_mtime(&source, new_mtime).unwrap();

    core2.scan().await.unwrap();

    let status = core2.transcode_state.get(&source).await.unwrap();
    assert_eq!(status.state, TranscodeState::Pending);
    assert!(core2.library.books_sorted().await.is_empty());
}
