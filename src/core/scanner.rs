//! Scanner
//!
//! Walks the `<root>/<author>/<title>` directory layout, classifies each
//! title directory as `single` or `multi`, resolves display metadata and
//! cover art, and produces ready Books directly (`multi`) or transcode
//! jobs (un-normalized `single`). Idempotent: re-running over an
//! unchanged tree leaves state unchanged.

use crate::audio::{parse_opf, resolve_cover, resolve_title, resolve_author, resolve_description, resolve_language, resolve_date, CoverCandidates};
use crate::core::library::LibraryIndex;
use crate::core::probe_cache::ProbeCache;
use crate::core::queue::JobQueue;
use crate::core::state_store::TranscodeStateStore;
use crate::models::{
    validate_multi_segments, AudioMime, AudioSegment, Book, BookCommon, BookId,
    ChapterTiming, Job, OpfMetadata, TranscodeMeta, TranscodeState, TranscodeStatus,
};
use crate::utils::{book_id as slug_book_id, mtime_base36};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Runs one full scan over every configured root, mutating the Library
/// Index, Transcode State Store, Probe Cache, and Job Queue in place.
/// Persists the Library Index and Transcode State once at the end,
/// rather than per book.
pub async fn scan_roots(
    roots: &[PathBuf],
    probe_cache: &ProbeCache,
    transcode_state: &TranscodeStateStore,
    library: &LibraryIndex,
    queue: &JobQueue,
    data_dir: &Path,
) -> anyhow::Result<()> {
    let mut keep_ids: HashSet<BookId> = HashSet::new();

    for root in roots {
        if !root.is_dir() {
            tracing::warn!("Library root is not a directory: {}", root.display());
            continue;
        }

        let author_dirs = match std::fs::read_dir(root) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!("Failed to read root {}: {e}", root.display());
                continue;
            }
        };

        for author_entry in author_dirs.flatten() {
            let author_path = author_entry.path();
            if !author_path.is_dir() || is_hidden(&author_path) {
                continue;
            }
            let author_name = dir_name(&author_path);

            let title_dirs = match std::fs::read_dir(&author_path) {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::warn!("Failed to read author directory {}: {e}", author_path.display());
                    continue;
                }
            };

            for title_entry in title_dirs.flatten() {
                let title_path = title_entry.path();
                if !title_path.is_dir() || is_hidden(&title_path) {
                    continue;
                }
                let title_name = dir_name(&title_path);
                let id = slug_book_id(&author_name, &title_name);

                match scan_title_dir(
                    &author_name,
                    &title_name,
                    &id,
                    &title_path,
                    probe_cache,
                    transcode_state,
                    queue,
                    data_dir,
                )
                .await
                {
                    Ok(Some(book)) => {
                        keep_ids.insert(BookId(id.clone()));
                        library.upsert(book).await;
                    }
                    Ok(None) => {
                        // Not currently streamable: either a `single`
                        // awaiting/redoing its transcode (evicted below so
                        // it briefly drops out of the streamable set) or
                        // an empty/unclassifiable directory. The id is
                        // still tracked so the next rescan doesn't treat a
                        // skipped directory as deleted.
                        library.remove(&id).await;
                        keep_ids.insert(BookId(id));
                    }
                    Err(e) => {
                        tracing::warn!("Failed to scan {}: {e}", title_path.display());
                    }
                }
            }
        }
    }

    library.retain_ids(&keep_ids).await;

    if let Err(e) = library.persist().await {
        tracing::warn!("Failed to persist library index: {e}");
    }
    if let Err(e) = transcode_state.persist().await {
        tracing::warn!("Failed to persist transcode state: {e}");
    }

    Ok(())
}

struct Classification {
    single_source: Option<PathBuf>,
    parts: Vec<PathBuf>,
    raw_png: Option<PathBuf>,
    raw_jpg: Option<PathBuf>,
    epub: Option<PathBuf>,
    opf: Option<PathBuf>,
}

fn classify_dir(dir: &Path) -> std::io::Result<Classification> {
    let mut m4b = Vec::new();
    let mut parts = Vec::new();
    let mut raw_png = Vec::new();
    let mut raw_jpg = Vec::new();
    let mut epub = Vec::new();
    let mut opf = Vec::new();

    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .map(|s| s.to_lowercase())
            .unwrap_or_default();

        match ext.as_str() {
            "m4b" => m4b.push(path),
            "mp3" => parts.push(path),
            "png" => raw_png.push(path),
            "jpg" | "jpeg" => raw_jpg.push(path),
            "epub" => epub.push(path),
            "opf" => opf.push(path),
            _ => {}
        }
    }

    m4b.sort();
    parts.sort();
    raw_png.sort();
    raw_jpg.sort();
    epub.sort();
    opf.sort();

    Ok(Classification {
        single_source: m4b.into_iter().next(),
        parts,
        raw_png: raw_png.into_iter().next(),
        raw_jpg: raw_jpg.into_iter().next(),
        epub: epub.into_iter().next(),
        opf: opf.into_iter().next(),
    })
}

#[allow(clippy::too_many_arguments)]
async fn scan_title_dir(
    author: &str,
    title: &str,
    id: &str,
    dir: &Path,
    probe_cache: &ProbeCache,
    transcode_state: &TranscodeStateStore,
    queue: &JobQueue,
    data_dir: &Path,
) -> anyhow::Result<Option<Book>> {
    let classification = classify_dir(dir)?;

    let opf = match &classification.opf {
        Some(path) => match std::fs::read_to_string(path) {
            Ok(xml) => match parse_opf(&xml) {
                Ok(meta) => Some(meta),
                Err(e) => {
                    tracing::warn!("Malformed side-car metadata {}: {e}", path.display());
                    None
                }
            },
            Err(e) => {
                tracing::warn!("Failed to read {}: {e}", path.display());
                None
            }
        },
        None => None,
    };

    if let Some(source) = classification.single_source.clone() {
        return scan_single(
            author,
            title,
            id,
            dir,
            &source,
            opf.as_ref(),
            &classification,
            probe_cache,
            transcode_state,
            queue,
            data_dir,
        )
        .await;
    }

    if !classification.parts.is_empty() {
        return scan_multi(author, title, id, dir, &classification, opf.as_ref(), probe_cache, data_dir)
            .await
            .map(Some);
    }

    Ok(None)
}

#[allow(clippy::too_many_arguments)]
async fn scan_single(
    author: &str,
    title: &str,
    id: &str,
    dir: &Path,
    source: &Path,
    opf: Option<&OpfMetadata>,
    classification: &Classification,
    probe_cache: &ProbeCache,
    transcode_state: &TranscodeStateStore,
    queue: &JobQueue,
    data_dir: &Path,
) -> anyhow::Result<Option<Book>> {
    let mtime_ms = file_mtime_ms(source).unwrap_or(0);
    let probe = probe_cache.probe(source, mtime_ms).await;

    let Some(duration) = probe.as_ref().and_then(|p| p.duration) else {
        let status = failed_status(source.to_path_buf(), target_path(data_dir, id, mtime_ms), mtime_ms, "probe returned no duration");
        transcode_state.upsert(status).await;
        return Ok(None);
    };

    let tags = probe.map(|p| p.tags).unwrap_or_default();
    let target = target_path(data_dir, id, mtime_ms);
    let existing = transcode_state.get(source).await;

    if let Some(status) = &existing {
        if status.state == TranscodeState::Done
            && status.mtime_ms == mtime_ms
            && target.is_file()
            && std::fs::metadata(&target).map(|m| m.len() > 0).unwrap_or(false)
        {
            let common = build_common(author, title, id, dir, AudioMime::Mpeg, &tags, opf, classification, Some(duration), mtime_ms, data_dir).await;
            return Ok(Some(Book::Single {
                common,
                primary_file: target,
                total_size: std::fs::metadata(&target)?.len(),
                chapters: probe_cache.chapters(source, mtime_ms).await,
            }));
        }
    }

    let common = build_common(author, title, id, dir, AudioMime::Mpeg, &tags, opf, classification, Some(duration), mtime_ms, data_dir).await;
    let meta = TranscodeMeta { common };

    let preserved_error = existing
        .as_ref()
        .filter(|s| s.mtime_ms == mtime_ms)
        .and_then(|s| s.error.clone());

    let mut status = TranscodeStatus::new_pending(source.to_path_buf(), target.clone(), mtime_ms, Some(meta));
    status.error = preserved_error;
    status.duration_ms = Some((duration * 1000.0).round() as u64);
    transcode_state.upsert(status).await;

    if !queue.is_queued(source) {
        queue.push_if_absent(Job {
            source: source.to_path_buf(),
            target,
            expected_mtime_ms: mtime_ms,
        });
    }

    Ok(None)
}

#[allow(clippy::too_many_arguments)]
async fn scan_multi(
    author: &str,
    title: &str,
    id: &str,
    dir: &Path,
    classification: &Classification,
    opf: Option<&OpfMetadata>,
    probe_cache: &ProbeCache,
    data_dir: &Path,
) -> anyhow::Result<Book> {
    let mut files = Vec::with_capacity(classification.parts.len());
    let mut chapters = Vec::with_capacity(classification.parts.len());
    let mut start = 0u64;
    let mut start_ms = 0u64;
    let mut first_tags: BTreeMap<String, String> = BTreeMap::new();

    for (i, part) in classification.parts.iter().enumerate() {
        let meta = std::fs::metadata(part)?;
        let size = meta.len();
        let mtime_ms = file_mtime_ms(part).unwrap_or(0);
        let probe = probe_cache.probe(part, mtime_ms).await;

        let duration = probe.as_ref().and_then(|p| p.duration);
        if size == 0 || duration.is_none() {
            anyhow::bail!(
                "part {} has zero size or unknown duration; skipping book {}/{}",
                part.display(),
                author,
                title
            );
        }
        let duration_ms = (duration.unwrap() * 1000.0).round() as u64;

        let part_tags = probe.map(|p| p.tags).unwrap_or_default();
        if i == 0 {
            first_tags = part_tags.clone();
        }

        let name = part.file_name().and_then(|s| s.to_str()).unwrap_or("part").to_string();
        let part_title = part_tags
            .get("title")
            .cloned()
            .or_else(|| part.file_stem().and_then(|s| s.to_str()).map(|s| s.to_string()));

        files.push(AudioSegment {
            path: part.clone(),
            name: name.clone(),
            size,
            start,
            end: start + size - 1,
            duration_ms,
            title: part_title.clone(),
        });
        chapters.push(ChapterTiming::new(
            i,
            part_title.unwrap_or_else(|| format!("Chapter {}", i + 1)),
            start_ms,
            start_ms + duration_ms,
        ));

        start += size;
        start_ms += duration_ms;
    }

    validate_multi_segments(&files).map_err(|e| anyhow::anyhow!(e))?;

    let mime = classification
        .parts
        .first()
        .and_then(|p| p.extension())
        .and_then(|e| e.to_str())
        .and_then(AudioMime::from_extension)
        .unwrap_or(AudioMime::Mpeg);

    let duration_seconds = Some(start_ms as f64 / 1000.0);
    let fallback_mtime_ms = classification
        .parts
        .first()
        .and_then(|p| file_mtime_ms(p))
        .unwrap_or(0);
    let common = build_common(author, title, id, dir, mime, &first_tags, opf, classification, duration_seconds, fallback_mtime_ms, data_dir).await;
    let total_size = start;

    Ok(Book::Multi {
        common,
        files,
        total_size,
        chapters,
    })
}

#[allow(clippy::too_many_arguments)]
async fn build_common(
    author: &str,
    title: &str,
    id: &str,
    dir: &Path,
    mime: AudioMime,
    tags: &BTreeMap<String, String>,
    opf: Option<&OpfMetadata>,
    classification: &Classification,
    duration_seconds: Option<f64>,
    fallback_mtime_ms: i64,
    data_dir: &Path,
) -> BookCommon {
    let display_title = resolve_title(opf, title);
    let display_author = resolve_author(tags, opf, author);
    let (description, description_html) = resolve_description(tags, opf);
    let language = resolve_language(tags, opf);
    let published_at = resolve_date(tags, opf).or_else(|| Some(rfc3339_ms(fallback_mtime_ms)));

    let candidates = CoverCandidates {
        m4b: classification
            .single_source
            .as_ref()
            .map(|p| (p.clone(), file_mtime_ms(p).unwrap_or(0))),
        first_mp3: classification
            .parts
            .first()
            .map(|p| (p.clone(), file_mtime_ms(p).unwrap_or(0))),
        epub: classification.epub.clone(),
        raw_png: classification.raw_png.clone(),
        raw_jpg: classification.raw_jpg.clone(),
    };
    let cover_path = resolve_cover(&candidates, id, data_dir).await.ok().flatten();

    let identifiers = opf.map(|o| o.identifiers.clone()).unwrap_or_default();
    let isbn = identifiers.get("isbn").cloned();

    BookCommon {
        id: BookId(id.to_string()),
        title: display_title,
        author: display_author,
        mime,
        cover_path,
        epub_path: classification.epub.clone(),
        duration_seconds,
        published_at,
        added_at: Some(resolve_added_at(dir)),
        description,
        description_html,
        language,
        isbn,
        identifiers,
    }
}

fn resolve_added_at(dir: &Path) -> String {
    let meta = std::fs::metadata(dir).ok();
    let time = meta
        .as_ref()
        .and_then(|m| m.created().ok())
        .or_else(|| meta.and_then(|m| m.modified().ok()))
        .unwrap_or_else(SystemTime::now);
    rfc3339(time)
}

/// Format a system time as RFC3339, e.g. for `added_at`/`published_at`
/// when no embedded or side-car date is available.
fn rfc3339(time: SystemTime) -> String {
    let millis = time
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0);
    rfc3339_ms(millis)
}

fn rfc3339_ms(millis: i64) -> String {
    chrono::DateTime::<chrono::Utc>::from_timestamp_millis(millis)
        .unwrap_or_else(|| chrono::DateTime::<chrono::Utc>::from_timestamp(0, 0).unwrap())
        .to_rfc3339()
}

fn failed_status(source: PathBuf, target: PathBuf, mtime_ms: i64, error: &str) -> TranscodeStatus {
    TranscodeStatus {
        source,
        target,
        mtime_ms,
        state: TranscodeState::Failed,
        error: Some(error.to_string()),
        out_time_ms: None,
        speed: None,
        duration_ms: None,
        meta: None,
    }
}

fn target_path(data_dir: &Path, id: &str, mtime_ms: i64) -> PathBuf {
    data_dir.join(format!("{id}-{}.mp3", mtime_base36(mtime_ms)))
}

fn dir_name(path: &Path) -> String {
    path.file_name().and_then(|s| s.to_str()).unwrap_or("").to_string()
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|s| s.to_str())
        .map(|s| s.starts_with('.'))
        .unwrap_or(false)
}

fn file_mtime_ms(path: &Path) -> Option<i64> {
    let meta = std::fs::metadata(path).ok()?;
    let modified = meta.modified().ok()?;
    let since_epoch = modified.duration_since(UNIX_EPOCH).ok()?;
    Some(since_epoch.as_millis() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn classifies_m4b_over_mp3_parts() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("book.m4b"), b"x").unwrap();
        std::fs::write(dir.path().join("01.mp3"), b"x").unwrap();

        let c = classify_dir(dir.path()).unwrap();
        assert!(c.single_source.is_some());
    }

    #[test]
    fn classifies_multi_when_no_m4b() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("02.mp3"), b"x").unwrap();
        std::fs::write(dir.path().join("01.mp3"), b"x").unwrap();

        let c = classify_dir(dir.path()).unwrap();
        assert!(c.single_source.is_none());
        assert_eq!(c.parts.len(), 2);
        assert!(c.parts[0].ends_with("01.mp3"));
    }

    #[test]
    fn empty_directory_has_no_classification() {
        let dir = tempdir().unwrap();
        let c = classify_dir(dir.path()).unwrap();
        assert!(c.single_source.is_none());
        assert!(c.parts.is_empty());
    }
}
