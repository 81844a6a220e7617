//! Virtual Stream Assembler
//!
//! Serves byte-range requests against the logical object `tag ‖ audio`:
//! for a `multi` book, `tag` is the chapter-tag encoder's output and
//! `audio` is the concatenation of part files; for a `single` book
//! there is no tag and `audio` is the normalized container. The body is
//! always emitted as a bounded-buffer stream - the full concatenation is
//! never materialized in memory.

use crate::core::chapter_tag::{self, CoverArt};
use crate::error::Error;
use crate::models::Book;
use futures::stream::{self, Stream, StreamExt};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

const CHUNK_SIZE: u64 = 64 * 1024;

pub type ByteStream = Pin<Box<dyn Stream<Item = std::io::Result<Vec<u8>>> + Send>>;

/// An inclusive byte range, `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }
}

/// The outcome of parsing a `Range` header against a total size.
/// Malformed input is indistinguishable from "no range" - both serve
/// the whole object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeOutcome {
    NoRange,
    Partial(ByteRange),
    NotSatisfiable,
}

/// Parse a `Range` header value. Only `bytes=A-B` syntax is accepted,
/// with `A`/`B` optional. Anything else - missing header, malformed
/// unit, non-numeric bounds, `A > B`, `A >= size`, a zero-length suffix
/// (`bytes=-0`) - is treated as malformed and falls back to serving the
/// whole object. `B > size-1` clamps to `size-1`.
pub fn parse_range(header: Option<&str>, total_size: u64) -> RangeOutcome {
    let Some(header) = header else {
        return RangeOutcome::NoRange;
    };
    let header = header.trim();
    let Some(spec) = header.strip_prefix("bytes=") else {
        return RangeOutcome::NoRange;
    };
    // Multiple ranges are not supported; treat as malformed.
    if spec.contains(',') {
        return RangeOutcome::NoRange;
    }
    let Some(dash) = spec.find('-') else {
        return RangeOutcome::NoRange;
    };
    let a_str = &spec[..dash];
    let b_str = &spec[dash + 1..];

    if a_str.is_empty() && b_str.is_empty() {
        return RangeOutcome::NoRange;
    }

    if a_str.is_empty() {
        // Suffix range: bytes=-N - last N bytes.
        let Ok(n) = b_str.parse::<u64>() else {
            return RangeOutcome::NoRange;
        };
        if n == 0 {
            return RangeOutcome::NoRange;
        }
        if total_size == 0 {
            return RangeOutcome::NotSatisfiable;
        }
        let start = total_size.saturating_sub(n);
        return RangeOutcome::Partial(ByteRange { start, end: total_size - 1 });
    }

    let Ok(a) = a_str.parse::<u64>() else {
        return RangeOutcome::NoRange;
    };

    if b_str.is_empty() {
        // bytes=A- - A through end.
        if a >= total_size {
            return RangeOutcome::NotSatisfiable;
        }
        return RangeOutcome::Partial(ByteRange { start: a, end: total_size - 1 });
    }

    let Ok(b) = b_str.parse::<u64>() else {
        return RangeOutcome::NoRange;
    };
    if a > b {
        return RangeOutcome::NoRange;
    }
    if a >= total_size {
        return RangeOutcome::NotSatisfiable;
    }
    let end = b.min(total_size - 1);
    RangeOutcome::Partial(ByteRange { start: a, end })
}

/// An HTTP-shaped response for the stream endpoint: status, headers,
/// and a body stream.
pub struct StreamResponse {
    pub status: u16,
    pub content_length: u64,
    pub content_range: Option<String>,
    pub accept_ranges: bool,
    pub body: ByteStream,
}

fn not_satisfiable(total_size: u64) -> Error {
    Error::RangeNotSatisfiable { total_size }
}

/// Serve `book` against an optional `Range` header.
pub async fn stream(book: &Book, range_header: Option<&str>) -> anyhow::Result<StreamResponse> {
    match book {
        Book::Single { primary_file, total_size, .. } => {
            stream_single(primary_file, *total_size, range_header)
        }
        Book::Multi { common, files, total_size, chapters, .. } => {
            let cover = match &common.cover_path {
                Some(path) => Some(tokio::fs::read(path).await.map(|bytes| (path.clone(), bytes))?),
                None => None,
            };
            let cover_art = cover
                .as_ref()
                .map(|(path, bytes)| CoverArt { mime: cover_mime(path), bytes });
            let tag = chapter_tag::encode(chapters, cover_art.as_ref());
            stream_multi(&tag, files, *total_size, range_header)
        }
    }
}

/// Exact byte length the chapter tag for `book` would have, computed
/// without reading the part audio. The cover contributes its on-disk
/// length only - frame sizes depend on byte length, not content.
pub fn estimated_tag_length(book: &Book) -> usize {
    let Book::Multi { common, chapters, .. } = book else {
        return 0;
    };
    if chapters.is_empty() && common.cover_path.is_none() {
        return 0;
    }
    match &common.cover_path {
        Some(path) => {
            let len = std::fs::metadata(path).map(|m| m.len() as usize).unwrap_or(0);
            let placeholder = vec![0u8; len];
            let cover = CoverArt { mime: cover_mime(path), bytes: &placeholder };
            chapter_tag::tag_length(chapters, Some(&cover))
        }
        None => chapter_tag::tag_length(chapters, None),
    }
}

fn cover_mime(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()).map(|e| e.to_lowercase()) {
        Some(ext) if ext == "png" => "image/png",
        _ => "image/jpeg",
    }
}

fn stream_single(
    primary_file: &Path,
    total_size: u64,
    range_header: Option<&str>,
) -> anyhow::Result<StreamResponse> {
    match parse_range(range_header, total_size) {
        RangeOutcome::NoRange => Ok(StreamResponse {
            status: 200,
            content_length: total_size,
            content_range: None,
            accept_ranges: true,
            body: file_range_stream(primary_file.to_path_buf(), 0, total_size),
        }),
        RangeOutcome::Partial(range) => Ok(StreamResponse {
            status: 206,
            content_length: range.len(),
            content_range: Some(format!("bytes {}-{}/{total_size}", range.start, range.end)),
            accept_ranges: true,
            body: file_range_stream(primary_file.to_path_buf(), range.start, range.len()),
        }),
        RangeOutcome::NotSatisfiable => Err(not_satisfiable(total_size).into()),
    }
}

fn stream_multi(
    tag: &[u8],
    files: &[crate::models::AudioSegment],
    audio_size: u64,
    range_header: Option<&str>,
) -> anyhow::Result<StreamResponse> {
    let tag_len = tag.len() as u64;
    let total_size = tag_len + audio_size;

    match parse_range(range_header, total_size) {
        RangeOutcome::NoRange => Ok(StreamResponse {
            status: 200,
            content_length: total_size,
            content_range: None,
            accept_ranges: true,
            body: assemble_body(tag, files, 0, total_size.saturating_sub(1)),
        }),
        RangeOutcome::Partial(range) => Ok(StreamResponse {
            status: 206,
            content_length: range.len(),
            content_range: Some(format!("bytes {}-{}/{total_size}", range.start, range.end)),
            accept_ranges: true,
            body: assemble_body(tag, files, range.start, range.end),
        }),
        RangeOutcome::NotSatisfiable => Err(not_satisfiable(total_size).into()),
    }
}

/// Map an absolute range over `tag ‖ audio` onto `(tag_slice?, [file
/// slice…])` and chain the resulting streams in order.
fn assemble_body(tag: &[u8], files: &[crate::models::AudioSegment], r0: u64, r1: u64) -> ByteStream {
    let tag_len = tag.len() as u64;
    let mut parts: Vec<ByteStream> = Vec::new();

    if r0 < tag_len {
        let slice_end = r1.min(tag_len.saturating_sub(1));
        let slice = tag[r0 as usize..=slice_end as usize].to_vec();
        parts.push(Box::pin(stream::once(async move { Ok(slice) })));
    }

    if r1 >= tag_len {
        let audio_start = r0.max(tag_len) - tag_len;
        let audio_end = r1 - tag_len;

        for f in files {
            if f.end < audio_start || f.start > audio_end {
                continue;
            }
            let sub_start = audio_start.max(f.start) - f.start;
            let sub_end = audio_end.min(f.end) - f.start;
            parts.push(file_range_stream(f.path.clone(), sub_start, sub_end - sub_start + 1));
        }
    }

    chain_all(parts)
}

fn chain_all(streams: Vec<ByteStream>) -> ByteStream {
    streams
        .into_iter()
        .fold(Box::pin(stream::empty()) as ByteStream, |acc, s| Box::pin(acc.chain(s)))
}

enum ReadState {
    NotOpened { path: PathBuf, start: u64, remaining: u64 },
    Open { file: tokio::fs::File, remaining: u64 },
}

/// Stream `len` bytes of `path` starting at `start`, in bounded
/// `CHUNK_SIZE` pieces, so memory use is independent of file size.
fn file_range_stream(path: PathBuf, start: u64, len: u64) -> ByteStream {
    if len == 0 {
        return Box::pin(stream::empty());
    }
    let state = ReadState::NotOpened { path, start, remaining: len };
    Box::pin(stream::unfold(Some(state), |state| async move {
        let state = state?;
        let (file, remaining) = match state {
            ReadState::NotOpened { path, start, remaining } => {
                match open_and_seek(&path, start).await {
                    Ok(file) => (file, remaining),
                    Err(e) => return Some((Err(e), None)),
                }
            }
            ReadState::Open { file, remaining } => (file, remaining),
        };
        if remaining == 0 {
            return None;
        }
        read_chunk(file, remaining).await
    }))
}

async fn open_and_seek(path: &Path, start: u64) -> std::io::Result<tokio::fs::File> {
    let mut file = tokio::fs::File::open(path).await?;
    if start > 0 {
        file.seek(std::io::SeekFrom::Start(start)).await?;
    }
    Ok(file)
}

async fn read_chunk(
    mut file: tokio::fs::File,
    remaining: u64,
) -> Option<(std::io::Result<Vec<u8>>, Option<ReadState>)> {
    let to_read = remaining.min(CHUNK_SIZE) as usize;
    let mut buf = vec![0u8; to_read];
    match file.read_exact(&mut buf).await {
        Ok(()) => {
            let next_remaining = remaining - to_read as u64;
            Some((Ok(buf), Some(ReadState::Open { file, remaining: next_remaining })))
        }
        Err(e) => Some((Err(e), None)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_range_when_header_absent() {
        assert_eq!(parse_range(None, 1000), RangeOutcome::NoRange);
    }

    #[test]
    fn explicit_bounds() {
        assert_eq!(
            parse_range(Some("bytes=0-99"), 1000),
            RangeOutcome::Partial(ByteRange { start: 0, end: 99 })
        );
    }

    #[test]
    fn open_ended_range_runs_to_last_byte() {
        assert_eq!(
            parse_range(Some("bytes=500-"), 1000),
            RangeOutcome::Partial(ByteRange { start: 500, end: 999 })
        );
    }

    #[test]
    fn suffix_range_serves_last_n_bytes() {
        assert_eq!(
            parse_range(Some("bytes=-1000"), 1_000_000),
            RangeOutcome::Partial(ByteRange { start: 999_000, end: 999_999 })
        );
    }

    #[test]
    fn zero_length_suffix_is_malformed() {
        assert_eq!(parse_range(Some("bytes=-0"), 1000), RangeOutcome::NoRange);
    }

    #[test]
    fn end_before_start_is_malformed() {
        assert_eq!(parse_range(Some("bytes=500-100"), 1000), RangeOutcome::NoRange);
    }

    #[test]
    fn start_past_end_is_not_satisfiable() {
        assert_eq!(parse_range(Some("bytes=1000-1200"), 1000), RangeOutcome::NotSatisfiable);
    }

    #[test]
    fn end_beyond_size_clamps() {
        assert_eq!(
            parse_range(Some("bytes=0-5000"), 1000),
            RangeOutcome::Partial(ByteRange { start: 0, end: 999 })
        );
    }

    #[test]
    fn malformed_unit_is_no_range() {
        assert_eq!(parse_range(Some("items=0-99"), 1000), RangeOutcome::NoRange);
    }

    #[test]
    fn non_numeric_bounds_are_malformed() {
        assert_eq!(parse_range(Some("bytes=a-b"), 1000), RangeOutcome::NoRange);
    }

    #[test]
    fn last_byte_range_is_single_byte() {
        assert_eq!(
            parse_range(Some("bytes=999-"), 1000),
            RangeOutcome::Partial(ByteRange { start: 999, end: 999 })
        );
    }

    #[tokio::test]
    async fn single_file_full_read_matches_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.mp3");
        tokio::fs::write(&path, b"hello world").await.unwrap();

        let mut stream = file_range_stream(path, 0, 11);
        let mut collected = Vec::new();
        while let Some(chunk) = stream.next().await {
            collected.extend(chunk.unwrap());
        }
        assert_eq!(collected, b"hello world");
    }

    #[tokio::test]
    async fn partial_file_read_respects_start_and_len() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.mp3");
        tokio::fs::write(&path, b"0123456789").await.unwrap();

        let mut stream = file_range_stream(path, 3, 4);
        let mut collected = Vec::new();
        while let Some(chunk) = stream.next().await {
            collected.extend(chunk.unwrap());
        }
        assert_eq!(collected, b"3456");
    }
}
