//! Cover resolution order and caching
//!
//! Resolution order: embedded cover from the chosen `.m4b`, else from the
//! first `.mp3`, else an `.epub` cover (preferring filenames containing
//! "cover"), else the first raw `.png`, else the first raw `.jpg`/`.jpeg`.
//! Extracted covers are cached under the data directory keyed by source
//! basename + mtime, so repeat runs reuse the same file instead of
//! re-extracting.

use crate::utils::mtime_base36;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// The raw material a directory offers for cover resolution, already
/// classified and sorted by the scanner.
#[derive(Debug, Default, Clone)]
pub struct CoverCandidates {
    /// The chosen `.m4b` source and its mtime in milliseconds.
    pub m4b: Option<(PathBuf, i64)>,
    /// The first `.mp3` part and its mtime in milliseconds.
    pub first_mp3: Option<(PathBuf, i64)>,
    pub epub: Option<PathBuf>,
    pub raw_png: Option<PathBuf>,
    pub raw_jpg: Option<PathBuf>,
}

fn extract_m4a_cover(path: &Path) -> Result<Option<(Vec<u8>, &'static str)>> {
    let tag = mp4ameta::Tag::read_from_path(path).context("Failed to read M4A tag")?;
    Ok(tag.artworks().next().map(|art| {
        let ext = match art.fmt {
            mp4ameta::ImgFmt::Png => "png",
            mp4ameta::ImgFmt::Jpeg => "jpg",
            mp4ameta::ImgFmt::Bmp => "jpg",
        };
        (art.data.to_vec(), ext)
    }))
}

fn extract_mp3_cover(path: &Path) -> Result<Option<(Vec<u8>, &'static str)>> {
    let tag = id3::Tag::read_from_path(path).context("Failed to read ID3 tag")?;
    Ok(tag.pictures().next().map(|pic| {
        let ext = if pic.mime_type.contains("png") { "png" } else { "jpg" };
        (pic.data.clone(), ext)
    }))
}

fn extract_epub_cover(path: &Path) -> Result<Option<(Vec<u8>, &'static str)>> {
    let mut doc = epub::doc::EpubDoc::new(path).context("Failed to open epub")?;

    if let Ok((data, mime)) = doc.get_cover() {
        let ext = if mime.contains("png") { "png" } else { "jpg" };
        return Ok(Some((data, ext)));
    }

    let resource_ids: Vec<String> = doc.resources.keys().cloned().collect();
    let preferred = resource_ids
        .iter()
        .find(|id| id.to_lowercase().contains("cover"))
        .or_else(|| resource_ids.first());

    let Some(id) = preferred else { return Ok(None) };
    let Some((data, mime)) = doc.get_resource(id) else {
        return Ok(None);
    };

    let ext = if mime.contains("png") { "png" } else { "jpg" };
    Ok(Some((data, ext)))
}

fn cache_path(data_dir: &Path, slug: &str, mtime_ms: i64, ext: &str) -> PathBuf {
    data_dir.join(format!("cover-{slug}-{}.{ext}", mtime_base36(mtime_ms)))
}

async fn write_cached(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.ok();
    }
    tokio::fs::write(path, bytes)
        .await
        .with_context(|| format!("Failed to write cover {}", path.display()))
}

/// Resolve and, if the cover was extracted from an embedded source,
/// cache it under `data_dir`. Returns the path to a readable cover file.
pub async fn resolve(candidates: &CoverCandidates, slug: &str, data_dir: &Path) -> Result<Option<PathBuf>> {
    if let Some((path, mtime_ms)) = &candidates.m4b {
        match extract_m4a_cover(path) {
            Ok(Some((bytes, ext))) => {
                let cached = cache_path(data_dir, slug, *mtime_ms, ext);
                if !cached.exists() {
                    write_cached(&cached, &bytes).await?;
                }
                return Ok(Some(cached));
            }
            Ok(None) => {}
            Err(e) => tracing::warn!("Failed to extract cover from {}: {e}", path.display()),
        }
    }

    if let Some((path, mtime_ms)) = &candidates.first_mp3 {
        match extract_mp3_cover(path) {
            Ok(Some((bytes, ext))) => {
                let cached = cache_path(data_dir, slug, *mtime_ms, ext);
                if !cached.exists() {
                    write_cached(&cached, &bytes).await?;
                }
                return Ok(Some(cached));
            }
            Ok(None) => {}
            Err(e) => tracing::warn!("Failed to extract cover from {}: {e}", path.display()),
        }
    }

    if let Some(epub_path) = &candidates.epub {
        let mtime_ms = file_mtime_ms(epub_path).unwrap_or(0);
        match extract_epub_cover(epub_path) {
            Ok(Some((bytes, ext))) => {
                let cached = cache_path(data_dir, slug, mtime_ms, ext);
                if !cached.exists() {
                    write_cached(&cached, &bytes).await?;
                }
                return Ok(Some(cached));
            }
            Ok(None) => {}
            Err(e) => tracing::warn!("Failed to extract cover from {}: {e}", epub_path.display()),
        }
    }

    if let Some(png) = &candidates.raw_png {
        return Ok(Some(png.clone()));
    }

    if let Some(jpg) = &candidates.raw_jpg {
        return Ok(Some(jpg.clone()));
    }

    Ok(None)
}

fn file_mtime_ms(path: &Path) -> Option<i64> {
    let meta = std::fs::metadata(path).ok()?;
    let modified = meta.modified().ok()?;
    let since_epoch = modified.duration_since(std::time::UNIX_EPOCH).ok()?;
    Some(since_epoch.as_millis() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_path_uses_slug_and_encoded_mtime() {
        let path = cache_path(Path::new("/data"), "andy-weir-hail-mary", 36, "jpg");
        assert_eq!(path, PathBuf::from("/data/cover-andy-weir-hail-mary-10.jpg"));
    }

    #[tokio::test]
    async fn no_candidates_resolves_to_none() {
        let candidates = CoverCandidates::default();
        let result = resolve(&candidates, "slug", Path::new("/tmp")).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn raw_png_used_when_nothing_embedded() {
        let candidates = CoverCandidates {
            raw_png: Some(PathBuf::from("/books/author/title/cover.png")),
            ..Default::default()
        };
        let result = resolve(&candidates, "slug", Path::new("/tmp")).await.unwrap();
        assert_eq!(result, Some(PathBuf::from("/books/author/title/cover.png")));
    }
}
