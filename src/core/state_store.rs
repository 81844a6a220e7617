//! Transcode State Store
//!
//! Exclusively owns `TranscodeStatus` records, keyed by source path.
//! Mutated by the Scanner (creation, invalidation) and the Worker
//! (progress, terminal state); read by HTTP handlers for the status page.

use crate::models::{TranscodeState, TranscodeStatus};
use crate::utils::{load_json_array, save_json_array};
use anyhow::Result;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

const FILE_NAME: &str = "transcode-status.json";

pub struct TranscodeStateStore {
    entries: Mutex<HashMap<PathBuf, TranscodeStatus>>,
    data_dir: PathBuf,
}

impl TranscodeStateStore {
    pub async fn load(data_dir: PathBuf) -> Self {
        let path = data_dir.join(FILE_NAME);
        let records: Vec<TranscodeStatus> = load_json_array(&path).await;
        let entries = records.into_iter().map(|r| (r.source.clone(), r)).collect();

        Self {
            entries: Mutex::new(entries),
            data_dir,
        }
    }

    pub async fn get(&self, source: &Path) -> Option<TranscodeStatus> {
        self.entries.lock().await.get(source).cloned()
    }

    pub async fn upsert(&self, status: TranscodeStatus) {
        let mut entries = self.entries.lock().await;
        entries.insert(status.source.clone(), status);
    }

    pub async fn snapshot(&self) -> Vec<TranscodeStatus> {
        self.entries.lock().await.values().cloned().collect()
    }

    /// Per-state counts for the operator status page.
    pub async fn state_counts(&self) -> HashMap<TranscodeState, usize> {
        let entries = self.entries.lock().await;
        let mut counts = HashMap::new();
        for status in entries.values() {
            *counts.entry(status.state).or_insert(0) += 1;
        }
        counts
    }

    pub async fn persist(&self) -> Result<()> {
        let path = self.data_dir.join(FILE_NAME);
        let entries = self.entries.lock().await;
        let records: Vec<&TranscodeStatus> = entries.values().collect();
        save_json_array(&path, &records).await
    }
}
