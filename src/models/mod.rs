//! Data models for the audiobook-to-podcast pipeline

mod book;
mod config;
mod job;
mod opf;
mod probe;
mod transcode;

pub use book::{
    validate_multi_segments, AudioMime, AudioSegment, Book, BookCommon, BookId, ChapterTiming,
};
pub use config::{Config, PodExplicit, PodType};
pub use job::Job;
pub use opf::{is_meaningful, meaningful, OpfMetadata};
pub use probe::{ProbeChapter, ProbeData, ProbeRecord};
pub use transcode::{TranscodeMeta, TranscodeState, TranscodeStatus};
