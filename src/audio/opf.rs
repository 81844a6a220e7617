//! Side-car `.opf` metadata document parsing
//!
//! `.opf` is the package document format used by e-readers; audiobook
//! directories sometimes carry one alongside the audio as a metadata
//! side-car. Namespace prefixes (`dc:`, `opf:`) vary across producers,
//! so tags are matched on their local (post-colon) name.

use crate::models::OpfMetadata;
use anyhow::{Context, Result};
use quick_xml::events::Event;
use quick_xml::reader::Reader;

fn local_name(tag: &str) -> &str {
    tag.rsplit(':').next().unwrap_or(tag)
}

/// Parse an `.opf` XML document into [`OpfMetadata`].
///
/// Malformed XML returns an error; callers fall back to audio tags and
/// folder names instead.
pub fn parse_opf(xml: &str) -> Result<OpfMetadata> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut metadata = OpfMetadata::default();
    let mut buf = Vec::new();

    // (local tag name, pending identifier scheme) of the element whose
    // text content we're currently accumulating.
    let mut current: Option<(String, Option<String>)> = None;

    loop {
        match reader.read_event_into(&mut buf).context("Failed to parse .opf XML")? {
            Event::Eof => break,
            Event::Start(ref e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                let local = local_name(&name).to_string();

                let scheme = if local == "identifier" {
                    e.attributes().flatten().find_map(|attr| {
                        let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
                        if local_name(&key).eq_ignore_ascii_case("scheme") {
                            attr.unescape_value().ok().map(|v| v.to_string())
                        } else {
                            None
                        }
                    })
                } else {
                    None
                };

                current = Some((local, scheme));
            }
            Event::Text(e) => {
                if let Some((tag, scheme)) = &current {
                    let text = e.unescape().unwrap_or_default().trim().to_string();
                    if text.is_empty() {
                        continue;
                    }

                    match tag.as_str() {
                        "title" if metadata.title.is_none() => metadata.title = Some(text),
                        "creator" if metadata.creator.is_none() => metadata.creator = Some(text),
                        "description" if metadata.description.is_none() => {
                            metadata.description_html = Some(text.clone());
                            metadata.description = Some(strip_html(&text));
                        }
                        "language" if metadata.language.is_none() => metadata.language = Some(text),
                        "date" if metadata.date.is_none() => metadata.date = Some(text),
                        "identifier" => {
                            let key = scheme
                                .clone()
                                .unwrap_or_else(|| "identifier".to_string())
                                .to_lowercase();
                            metadata.identifiers.entry(key).or_insert(text);
                        }
                        _ => {}
                    }
                }
            }
            Event::End(_) => current = None,
            _ => {}
        }
        buf.clear();
    }

    Ok(metadata)
}

fn strip_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut in_tag = false;
    for ch in input.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(ch),
            _ => {}
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_core_fields() {
        let xml = r#"<?xml version="1.0"?>
            <package>
              <metadata>
                <dc:title>Project Hail Mary</dc:title>
                <dc:creator>Andy Weir</dc:creator>
                <dc:description>A lone astronaut.</dc:description>
                <dc:language>en</dc:language>
                <dc:date>2021-05-04</dc:date>
                <dc:identifier opf:scheme="ISBN">9780593135204</dc:identifier>
                <dc:identifier opf:scheme="ASIN">B08FG... </dc:identifier>
              </metadata>
            </package>"#;

        let meta = parse_opf(xml).unwrap();
        assert_eq!(meta.title.as_deref(), Some("Project Hail Mary"));
        assert_eq!(meta.creator.as_deref(), Some("Andy Weir"));
        assert_eq!(meta.description.as_deref(), Some("A lone astronaut."));
        assert_eq!(meta.language.as_deref(), Some("en"));
        assert_eq!(meta.identifiers.get("isbn").map(|s| s.as_str()), Some("9780593135204"));
        assert!(meta.identifiers.contains_key("asin"));
    }

    #[test]
    fn html_description_is_stripped_to_plain_text() {
        let xml = r#"<metadata><dc:description>&lt;p&gt;Hello &lt;b&gt;world&lt;/b&gt;&lt;/p&gt;</dc:description></metadata>"#;
        let meta = parse_opf(xml).unwrap();
        assert_eq!(meta.description.as_deref(), Some("Hello world"));
        assert!(meta.description_html.unwrap().contains("<b>"));
    }

    #[test]
    fn mismatched_tags_are_an_error() {
        let xml = "<metadata><dc:title>Title</dc:wrong></metadata>";
        assert!(parse_opf(xml).is_err());
    }
}
