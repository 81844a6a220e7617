//! Atomic JSON persistence for the three data-directory artifacts
//! (probe cache, transcode state, library index).
//!
//! Every write goes to a temporary file in the same directory and is
//! renamed into place, so a crash mid-write never leaves a torn file
//! visible to the next startup. A missing or unreadable file is treated
//! as empty rather than an error, so a fresh data directory starts up
//! cleanly.

use anyhow::{Context, Result};
use serde::{de::DeserializeOwned, Serialize};
use std::path::Path;

/// Load a JSON array document, returning an empty `Vec` if the file is
/// missing or fails to parse.
pub async fn load_json_array<T: DeserializeOwned>(path: &Path) -> Vec<T> {
    match tokio::fs::read(path).await {
        Ok(bytes) => match serde_json::from_slice(&bytes) {
            Ok(items) => items,
            Err(e) => {
                tracing::warn!("Failed to parse {}: {} - treating as empty", path.display(), e);
                Vec::new()
            }
        },
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!("Failed to read {}: {} - treating as empty", path.display(), e);
            }
            Vec::new()
        }
    }
}

/// Persist a JSON array document atomically: write to `<path>.tmp` in the
/// same directory, then rename over `path`.
pub async fn save_json_array<T: Serialize>(path: &Path, items: &[T]) -> Result<()> {
    let parent = path
        .parent()
        .context("persisted path must have a parent directory")?;
    tokio::fs::create_dir_all(parent)
        .await
        .with_context(|| format!("Failed to create data directory {}", parent.display()))?;

    let tmp_path = path.with_extension("tmp");
    let json = serde_json::to_vec_pretty(items).context("Failed to serialize persisted state")?;

    tokio::fs::write(&tmp_path, &json)
        .await
        .with_context(|| format!("Failed to write {}", tmp_path.display()))?;

    tokio::fs::rename(&tmp_path, path)
        .await
        .with_context(|| format!("Failed to rename {} into place", tmp_path.display()))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::tempdir;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Item {
        name: String,
        value: u32,
    }

    #[tokio::test]
    async fn round_trips_through_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.json");

        let items = vec![
            Item { name: "a".into(), value: 1 },
            Item { name: "b".into(), value: 2 },
        ];

        save_json_array(&path, &items).await.unwrap();
        let loaded: Vec<Item> = load_json_array(&path).await;

        assert_eq!(loaded, items);
    }

    #[tokio::test]
    async fn missing_file_loads_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing.json");

        let loaded: Vec<Item> = load_json_array(&path).await;
        assert!(loaded.is_empty());
    }

    #[tokio::test]
    async fn corrupt_file_loads_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.json");
        tokio::fs::write(&path, b"not json").await.unwrap();

        let loaded: Vec<Item> = load_json_array(&path).await;
        assert!(loaded.is_empty());
    }

    #[tokio::test]
    async fn no_tmp_file_left_behind_after_save() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.json");

        save_json_array(&path, &[Item { name: "a".into(), value: 1 }])
            .await
            .unwrap();

        assert!(!path.with_extension("tmp").exists());
        assert!(path.exists());
    }
}
