//! Pluggable probe/convert engine
//!
//! The core depends only on these two traits; `FfmpegEngine` is the
//! default implementation, shelling out to `ffprobe`/`ffmpeg` the way the
//! lineage's `FFmpeg` wrapper did. A different engine can be substituted
//! without touching the scanner, worker, or assembler.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

use crate::models::{ProbeChapter, ProbeData};

/// Progress sample delivered by a convert engine while a transcode runs.
pub type ProgressFn<'a> = dyn FnMut(Option<i64>, Option<f64>) + Send + 'a;

/// Reads format duration, container tags, and embedded chapters without
/// decoding audio.
#[async_trait]
pub trait ProbeEngine: Send + Sync {
    async fn probe(&self, path: &Path) -> Result<ProbeData>;
}

/// Normalizes a source container into a streamable MPEG audio file,
/// carrying the source's tags, chapter marks, and optional cover art.
#[async_trait]
pub trait ConvertEngine: Send + Sync {
    async fn convert(
        &self,
        source: &Path,
        target: &Path,
        cover: Option<&Path>,
        progress: &mut ProgressFn<'_>,
    ) -> Result<()>;
}

/// Default engine backed by the `ffmpeg`/`ffprobe` CLI tools.
#[derive(Debug, Clone, Default)]
pub struct FfmpegEngine;

impl FfmpegEngine {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ProbeEngine for FfmpegEngine {
    async fn probe(&self, path: &Path) -> Result<ProbeData> {
        let output = Command::new("ffprobe")
            .args([
                "-v",
                "quiet",
                "-print_format",
                "json",
                "-show_format",
                "-show_chapters",
            ])
            .arg(path)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .context("Failed to execute ffprobe")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("ffprobe failed: {}", stderr.trim());
        }

        let json: Value =
            serde_json::from_slice(&output.stdout).context("Failed to parse ffprobe JSON output")?;

        parse_ffprobe_output(&json)
    }
}

fn parse_ffprobe_output(json: &Value) -> Result<ProbeData> {
    let format = &json["format"];

    let duration = format["duration"]
        .as_str()
        .and_then(|s| s.parse::<f64>().ok());

    let mut tags = BTreeMap::new();
    if let Some(obj) = format["tags"].as_object() {
        for (k, v) in obj {
            if let Some(s) = v.as_str() {
                tags.insert(k.to_lowercase(), s.to_string());
            }
        }
    }

    let mut chapters = Vec::new();
    if let Some(arr) = json["chapters"].as_array() {
        for ch in arr {
            let start_time = ch["start_time"].as_str().and_then(|s| s.parse::<f64>().ok());
            let end_time = ch["end_time"].as_str().and_then(|s| s.parse::<f64>().ok());

            let (Some(start_time), Some(end_time)) = (start_time, end_time) else {
                continue;
            };

            let mut chapter_tags = BTreeMap::new();
            if let Some(obj) = ch["tags"].as_object() {
                for (k, v) in obj {
                    if let Some(s) = v.as_str() {
                        chapter_tags.insert(k.to_lowercase(), s.to_string());
                    }
                }
            }

            chapters.push(ProbeChapter {
                start_time,
                end_time,
                tags: chapter_tags,
            });
        }
    }

    Ok(ProbeData {
        duration,
        tags,
        chapters,
    })
}

#[async_trait]
impl ConvertEngine for FfmpegEngine {
    async fn convert(
        &self,
        source: &Path,
        target: &Path,
        cover: Option<&Path>,
        progress: &mut ProgressFn<'_>,
    ) -> Result<()> {
        let mut cmd = Command::new("ffmpeg");
        cmd.args(["-y", "-i"]).arg(source);

        if let Some(cover_path) = cover {
            cmd.arg("-i").arg(cover_path);
            cmd.args(["-map", "0:a", "-map", "1:v", "-disposition:v", "attached_pic"]);
        } else {
            cmd.args(["-map", "0:a"]);
        }

        cmd.args([
            "-map_metadata",
            "0",
            "-map_chapters",
            "0",
            "-c:a",
            "libmp3lame",
            "-c:v",
            "copy",
            "-progress",
            "pipe:1",
            "-nostats",
        ]);
        cmd.arg(target);

        tracing::debug!("ffmpeg convert command: {:?}", cmd.as_std());
        tracing::info!(
            "Converting {} -> {}",
            source.display(),
            target.display()
        );

        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
        let mut child = cmd.spawn().context("Failed to spawn ffmpeg")?;

        let stdout = child.stdout.take().context("ffmpeg stdout not captured")?;
        let mut lines = BufReader::new(stdout).lines();

        let mut out_time_ms: Option<i64> = None;
        let mut speed: Option<f64> = None;

        while let Some(line) = lines.next_line().await.context("Failed reading ffmpeg progress")? {
            if let Some(value) = line.strip_prefix("out_time_ms=") {
                out_time_ms = value.trim().parse::<i64>().ok();
                progress(out_time_ms, speed);
            } else if let Some(value) = line.strip_prefix("out_time_us=") {
                out_time_ms = value.trim().parse::<i64>().ok().map(|us| us / 1000);
                progress(out_time_ms, speed);
            } else if let Some(value) = line.strip_prefix("speed=") {
                speed = value.trim().trim_end_matches('x').parse::<f64>().ok();
                progress(out_time_ms, speed);
            }
        }

        let status = child.wait().await.context("Failed waiting for ffmpeg")?;

        if !status.success() {
            let mut stderr_buf = String::new();
            if let Some(mut stderr) = child.stderr.take() {
                use tokio::io::AsyncReadExt;
                let _ = stderr.read_to_string(&mut stderr_buf).await;
            }
            anyhow::bail!("ffmpeg conversion failed: {}", stderr_buf.trim());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_format_duration_and_tags() {
        let json: Value = serde_json::from_str(
            r#"{
                "format": {
                    "duration": "3600.5",
                    "tags": { "Title": "Book", "Artist": "Author" }
                },
                "chapters": []
            }"#,
        )
        .unwrap();

        let data = parse_ffprobe_output(&json).unwrap();
        assert!((data.duration.unwrap() - 3600.5).abs() < 0.001);
        assert_eq!(data.tags.get("title"), Some(&"Book".to_string()));
        assert_eq!(data.tags.get("artist"), Some(&"Author".to_string()));
    }

    #[test]
    fn parses_chapters_with_lowercased_tags() {
        let json: Value = serde_json::from_str(
            r#"{
                "format": { "duration": "100.0" },
                "chapters": [
                    { "start_time": "0.0", "end_time": "10.0", "tags": { "TITLE": "Intro" } }
                ]
            }"#,
        )
        .unwrap();

        let data = parse_ffprobe_output(&json).unwrap();
        assert_eq!(data.chapters.len(), 1);
        assert_eq!(data.chapters[0].tags.get("title"), Some(&"Intro".to_string()));
    }

    #[test]
    fn missing_duration_is_absent_not_an_error() {
        let json: Value = serde_json::from_str(r#"{"format": {}, "chapters": []}"#).unwrap();
        let data = parse_ffprobe_output(&json).unwrap();
        assert!(data.duration.is_none());
    }
}
