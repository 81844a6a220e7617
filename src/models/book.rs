//! Audiobook model
//!
//! A [`Book`] is one addressable audiobook as presented to the streaming
//! and feed layers. It is a tagged variant rather than a struct with
//! optional fields: a `single` book owns one normalized container file,
//! a `multi` book owns an ordered run of part files stitched virtually.
//! Exactly one of `primary_file` / `files` exists, enforced by construction.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Stable identifier for a book, derived from `slugify(author + "-" + title)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BookId(pub String);

impl std::fmt::Display for BookId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for BookId {
    fn from(s: String) -> Self {
        BookId(s)
    }
}

/// Audio MIME type, derived from a file's extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AudioMime {
    #[serde(rename = "audio/mpeg")]
    Mpeg,
    #[serde(rename = "audio/mp4")]
    Mp4,
}

impl AudioMime {
    /// Map a lowercased file extension to a MIME type.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "mp3" => Some(Self::Mpeg),
            "m4a" | "m4b" | "mp4" => Some(Self::Mp4),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mpeg => "audio/mpeg",
            Self::Mp4 => "audio/mp4",
        }
    }
}

/// One part file's byte and time extent within a `multi` book's virtual
/// concatenation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioSegment {
    pub path: PathBuf,
    pub name: String,
    pub size: u64,
    /// Inclusive start offset within the virtual concatenation.
    pub start: u64,
    /// Inclusive end offset within the virtual concatenation.
    pub end: u64,
    pub duration_ms: u64,
    pub title: Option<String>,
}

/// A synthesized chapter entry. `id` is always `"ch{n}"`, 0-based.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChapterTiming {
    pub id: String,
    pub title: String,
    pub start_ms: u64,
    pub end_ms: u64,
}

impl ChapterTiming {
    pub fn new(index: usize, title: String, start_ms: u64, end_ms: u64) -> Self {
        Self {
            id: format!("ch{index}"),
            title,
            start_ms,
            end_ms,
        }
    }

    pub fn duration_ms(&self) -> u64 {
        self.end_ms.saturating_sub(self.start_ms)
    }
}

/// Fields shared by both book variants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookCommon {
    pub id: BookId,
    pub title: String,
    pub author: String,
    pub mime: AudioMime,
    pub cover_path: Option<PathBuf>,
    pub epub_path: Option<PathBuf>,
    pub duration_seconds: Option<f64>,
    pub published_at: Option<String>,
    /// Recomputed per run from filesystem times; never persisted.
    #[serde(skip_serializing, default)]
    pub added_at: Option<String>,
    pub description: Option<String>,
    pub description_html: Option<String>,
    pub language: Option<String>,
    pub isbn: Option<String>,
    pub identifiers: std::collections::BTreeMap<String, String>,
}

/// An audiobook, either a single normalized container or an ordered run
/// of part files stitched virtually at stream time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Book {
    Single {
        #[serde(flatten)]
        common: BookCommon,
        primary_file: PathBuf,
        total_size: u64,
        chapters: Option<Vec<ChapterTiming>>,
    },
    Multi {
        #[serde(flatten)]
        common: BookCommon,
        files: Vec<AudioSegment>,
        total_size: u64,
        chapters: Vec<ChapterTiming>,
    },
}

impl Book {
    pub fn common(&self) -> &BookCommon {
        match self {
            Book::Single { common, .. } => common,
            Book::Multi { common, .. } => common,
        }
    }

    pub fn common_mut(&mut self) -> &mut BookCommon {
        match self {
            Book::Single { common, .. } => common,
            Book::Multi { common, .. } => common,
        }
    }

    pub fn id(&self) -> &BookId {
        &self.common().id
    }

    pub fn total_size(&self) -> u64 {
        match self {
            Book::Single { total_size, .. } => *total_size,
            Book::Multi { total_size, .. } => *total_size,
        }
    }

    pub fn chapters(&self) -> &[ChapterTiming] {
        match self {
            Book::Single { chapters, .. } => chapters.as_deref().unwrap_or(&[]),
            Book::Multi { chapters, .. } => chapters,
        }
    }

    pub fn is_multi(&self) -> bool {
        matches!(self, Book::Multi { .. })
    }

    /// A book is exposed to the feed only when streamable: `single` with
    /// an existing primary file, or `multi` with at least one non-empty
    /// part.
    pub fn is_streamable(&self) -> bool {
        match self {
            Book::Single { primary_file, .. } => {
                primary_file.is_file()
                    && std::fs::metadata(primary_file).map(|m| m.len() > 0).unwrap_or(false)
            }
            Book::Multi { files, .. } => files.iter().any(|f| f.size > 0),
        }
    }

    /// Sort key: `added_at`, falling back to `published_at`, descending.
    pub fn sort_key(&self) -> &str {
        let common = self.common();
        common
            .added_at
            .as_deref()
            .or(common.published_at.as_deref())
            .unwrap_or("")
    }
}

/// Validate the `multi` segment contiguity invariants (sorted, zero gap,
/// zero overlap). Returns an error describing the first violation found;
/// used by tests and by the scanner's own construction path as a sanity
/// check.
pub fn validate_multi_segments(files: &[AudioSegment]) -> Result<(), String> {
    let mut expected_start = 0u64;
    for (i, f) in files.iter().enumerate() {
        if f.start != expected_start {
            return Err(format!(
                "segment {i} start {} does not match expected {expected_start}",
                f.start
            ));
        }
        if f.end != f.start + f.size.saturating_sub(1) {
            return Err(format!(
                "segment {i} end {} does not match start+size-1 {}",
                f.end,
                f.start + f.size.saturating_sub(1)
            ));
        }
        expected_start = f.end + 1;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(start: u64, size: u64) -> AudioSegment {
        AudioSegment {
            path: PathBuf::from("x"),
            name: "x".into(),
            size,
            start,
            end: start + size - 1,
            duration_ms: 1000,
            title: None,
        }
    }

    #[test]
    fn mime_from_extension() {
        assert_eq!(AudioMime::from_extension("mp3"), Some(AudioMime::Mpeg));
        assert_eq!(AudioMime::from_extension("M4B"), Some(AudioMime::Mp4));
        assert_eq!(AudioMime::from_extension("m4a"), Some(AudioMime::Mp4));
        assert_eq!(AudioMime::from_extension("wav"), None);
    }

    #[test]
    fn contiguous_segments_validate() {
        let files = vec![seg(0, 100), seg(100, 200), seg(300, 50)];
        assert!(validate_multi_segments(&files).is_ok());
    }

    #[test]
    fn gap_fails_validation() {
        let files = vec![seg(0, 100), seg(150, 50)];
        assert!(validate_multi_segments(&files).is_err());
    }

    #[test]
    fn chapter_id_format() {
        let c = ChapterTiming::new(0, "Intro".into(), 0, 1000);
        assert_eq!(c.id, "ch0");
        assert_eq!(c.duration_ms(), 1000);
    }
}
