//! Job Queue: single-producer (Scanner), single-consumer (Worker)
//!
//! Recast from the lineage's lazy wake-driven iterator as a plain
//! unbounded channel of [`Job`] values. The queue also tracks which
//! sources are currently queued or being worked, so a rescan does not
//! enqueue the same source twice.

use crate::models::Job;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio::sync::mpsc;

pub struct JobQueue {
    sender: mpsc::UnboundedSender<Job>,
    queued: Mutex<HashSet<PathBuf>>,
}

impl JobQueue {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Job>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            Self {
                sender,
                queued: Mutex::new(HashSet::new()),
            },
            receiver,
        )
    }

    pub fn is_queued(&self, source: &Path) -> bool {
        self.queued.lock().unwrap().contains(source)
    }

    /// Push a job unless its source is already queued or being worked.
    /// Returns whether the job was actually enqueued.
    pub fn push_if_absent(&self, job: Job) -> bool {
        let mut queued = self.queued.lock().unwrap();
        if queued.contains(&job.source) {
            return false;
        }
        queued.insert(job.source.clone());
        drop(queued);

        if self.sender.send(job).is_err() {
            tracing::warn!("Job queue receiver dropped; job lost");
            return false;
        }
        true
    }

    /// Clear a source from the queued set once the worker is done with
    /// it (success or failure), so future rescans can requeue it.
    pub fn mark_finished(&self, source: &Path) {
        self.queued.lock().unwrap().remove(source);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(source: &str) -> Job {
        Job {
            source: PathBuf::from(source),
            target: PathBuf::from("target.mp3"),
            expected_mtime_ms: 0,
        }
    }

    #[test]
    fn duplicate_source_is_not_requeued() {
        let (queue, _rx) = JobQueue::new();
        assert!(queue.push_if_absent(job("a.m4b")));
        assert!(!queue.push_if_absent(job("a.m4b")));
    }

    #[test]
    fn mark_finished_allows_requeue() {
        let (queue, _rx) = JobQueue::new();
        assert!(queue.push_if_absent(job("a.m4b")));
        queue.mark_finished(Path::new("a.m4b"));
        assert!(queue.push_if_absent(job("a.m4b")));
    }
}
