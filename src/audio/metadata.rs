//! Display-metadata resolution
//!
//! Container tag dictionaries and `.opf` identifier maps are both
//! case-insensitive key spaces. Rather than repeating `tag.X || tag.x`
//! at every call site, lookups go through [`tag_get`] and the few
//! resolver functions below encode the precedence rules once.

use crate::models::{is_meaningful, meaningful, OpfMetadata};
use std::collections::BTreeMap;

/// Case-insensitive lookup into a tag dictionary whose keys are already
/// lowercased (as produced by the probe engine).
pub fn tag_get<'a>(tags: &'a BTreeMap<String, String>, key: &str) -> Option<&'a str> {
    tags.get(&key.to_lowercase())
        .map(|s| s.as_str())
        .filter(|v| is_meaningful(v))
}

/// Display title: opf title, else folder name.
pub fn resolve_title(opf: Option<&OpfMetadata>, folder_name: &str) -> String {
    opf.and_then(|o| meaningful(o.title.clone()))
        .unwrap_or_else(|| folder_name.to_string())
}

/// Display author: audio artist, else audio album-artist, else opf
/// creator, else folder name.
pub fn resolve_author(
    tags: &BTreeMap<String, String>,
    opf: Option<&OpfMetadata>,
    folder_name: &str,
) -> String {
    tag_get(tags, "artist")
        .or_else(|| tag_get(tags, "album_artist"))
        .map(|s| s.to_string())
        .or_else(|| opf.and_then(|o| meaningful(o.creator.clone())))
        .unwrap_or_else(|| folder_name.to_string())
}

/// Description: the longer of the opf description and the audio tag
/// description, plus the HTML form if the opf supplied one.
pub fn resolve_description(
    tags: &BTreeMap<String, String>,
    opf: Option<&OpfMetadata>,
) -> (Option<String>, Option<String>) {
    let audio_desc = tag_get(tags, "description")
        .or_else(|| tag_get(tags, "comment"))
        .map(|s| s.to_string());
    let opf_desc = opf.and_then(|o| meaningful(o.description.clone()));

    let description = match (&audio_desc, &opf_desc) {
        (Some(a), Some(o)) if o.len() > a.len() => Some(o.clone()),
        (Some(a), _) => Some(a.clone()),
        (None, Some(o)) => Some(o.clone()),
        (None, None) => None,
    };

    let description_html = opf.and_then(|o| meaningful(o.description_html.clone()));

    (description, description_html)
}

/// Language: audio tag, else opf.
pub fn resolve_language(tags: &BTreeMap<String, String>, opf: Option<&OpfMetadata>) -> Option<String> {
    tag_get(tags, "language")
        .map(|s| s.to_string())
        .or_else(|| opf.and_then(|o| meaningful(o.language.clone())))
}

/// Publication date: audio tag, else opf. Feeds into `published_at`
/// resolution alongside source mtime in the scanner.
pub fn resolve_date(tags: &BTreeMap<String, String>, opf: Option<&OpfMetadata>) -> Option<String> {
    tag_get(tags, "date")
        .or_else(|| tag_get(tags, "year"))
        .map(|s| s.to_string())
        .or_else(|| opf.and_then(|o| meaningful(o.date.clone())))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn title_falls_back_to_folder_name() {
        assert_eq!(resolve_title(None, "My Book"), "My Book");
    }

    #[test]
    fn author_prefers_artist_over_album_artist() {
        let t = tags(&[("artist", "A"), ("album_artist", "B")]);
        assert_eq!(resolve_author(&t, None, "Folder"), "A");
    }

    #[test]
    fn author_falls_back_through_chain() {
        let empty = tags(&[]);
        let opf = OpfMetadata {
            creator: Some("Opf Author".into()),
            ..Default::default()
        };
        assert_eq!(resolve_author(&empty, Some(&opf), "Folder"), "Opf Author");
        assert_eq!(resolve_author(&empty, None, "Folder"), "Folder");
    }

    #[test]
    fn description_picks_the_longer_one() {
        let t = tags(&[("description", "short")]);
        let opf = OpfMetadata {
            description: Some("a much longer description".into()),
            ..Default::default()
        };
        let (desc, _) = resolve_description(&t, Some(&opf));
        assert_eq!(desc, Some("a much longer description".into()));
    }

    #[test]
    fn sentinel_tag_values_are_ignored() {
        let t = tags(&[("description", "Unknown")]);
        let (desc, _) = resolve_description(&t, None);
        assert_eq!(desc, None);
    }
}
