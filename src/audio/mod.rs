//! Audio engine, metadata resolution, side-car parsing, and cover art
//!
//! - [`engine`]: the pluggable probe/convert seam and its `ffmpeg` default.
//! - [`metadata`]: case-insensitive display-metadata resolution rules.
//! - [`opf`]: `.opf` side-car XML parsing.
//! - [`cover`]: cover resolution order and on-disk caching.

mod cover;
mod engine;
mod metadata;
mod opf;

pub use cover::{resolve as resolve_cover, CoverCandidates};
pub use engine::{ConvertEngine, FfmpegEngine, ProbeEngine, ProgressFn};
pub use metadata::{resolve_author, resolve_date, resolve_description, resolve_language, resolve_title, tag_get};
pub use opf::parse_opf;
