//! Chapter-Tag Encoder
//!
//! Produces an ID3v2.4-shaped binary buffer - chapter table-of-contents
//! plus optional cover art - prepended to a `multi` book's virtual
//! stream. This is the system's core binary contract: every byte here
//! is dictated by the wire format, not by convenience.

use crate::models::ChapterTiming;

/// Cover art to embed as an `APIC` frame.
pub struct CoverArt<'a> {
    pub mime: &'a str,
    pub bytes: &'a [u8],
}

fn synchsafe(n: u32) -> [u8; 4] {
    [
        ((n >> 21) & 0x7F) as u8,
        ((n >> 14) & 0x7F) as u8,
        ((n >> 7) & 0x7F) as u8,
        (n & 0x7F) as u8,
    ]
}

fn frame(id: &[u8; 4], body: Vec<u8>) -> Vec<u8> {
    let mut out = Vec::with_capacity(10 + body.len());
    out.extend_from_slice(id);
    out.extend_from_slice(&synchsafe(body.len() as u32));
    out.push(0x00);
    out.push(0x00);
    out.extend(body);
    out
}

fn text_frame(id: &[u8; 4], text: &str) -> Vec<u8> {
    let mut body = Vec::with_capacity(1 + text.len());
    body.push(0x03);
    body.extend_from_slice(text.as_bytes());
    frame(id, body)
}

fn text_frame_len(text: &str) -> usize {
    10 + 1 + text.len()
}

fn apic_frame(cover: &CoverArt) -> Vec<u8> {
    let mut body = Vec::with_capacity(4 + cover.mime.len() + cover.bytes.len());
    body.push(0x03);
    body.extend_from_slice(cover.mime.as_bytes());
    body.push(0x00);
    body.push(0x03); // picture type: front cover
    body.push(0x00); // empty description
    body.extend_from_slice(cover.bytes);
    frame(b"APIC", body)
}

fn apic_frame_len(cover: &CoverArt) -> usize {
    10 + 4 + cover.mime.len() + cover.bytes.len()
}

fn ctoc_frame(chapters: &[ChapterTiming]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(b"toc");
    body.push(0x00);
    body.push(0x03); // flags: top-level + ordered
    body.push(chapters.len() as u8);
    for ch in chapters {
        body.extend_from_slice(ch.id.as_bytes());
        body.push(0x00);
    }
    body.extend(text_frame(b"TIT2", "Chapters"));
    frame(b"CTOC", body)
}

fn ctoc_frame_len(chapters: &[ChapterTiming]) -> usize {
    let mut body = 3 + 1 + 1 + 1; // "toc" + nul + flags + child-count
    for ch in chapters {
        body += ch.id.len() + 1;
    }
    body += text_frame_len("Chapters");
    10 + body
}

fn chap_frame(ch: &ChapterTiming) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(ch.id.as_bytes());
    body.push(0x00);
    body.extend_from_slice(&(ch.start_ms as u32).to_be_bytes());
    body.extend_from_slice(&(ch.end_ms as u32).to_be_bytes());
    body.extend_from_slice(&0xFFFF_FFFFu32.to_be_bytes());
    body.extend_from_slice(&0xFFFF_FFFFu32.to_be_bytes());
    body.extend(text_frame(b"TIT2", &ch.title));
    frame(b"CHAP", body)
}

fn chap_frame_len(ch: &ChapterTiming) -> usize {
    let body = ch.id.len() + 1 + 4 + 4 + 4 + 4 + text_frame_len(&ch.title);
    10 + body
}

/// Encode the chapter tag. Zero chapters and no cover produces an empty
/// buffer (length 0).
pub fn encode(chapters: &[ChapterTiming], cover: Option<&CoverArt>) -> Vec<u8> {
    if chapters.is_empty() && cover.is_none() {
        return Vec::new();
    }

    let mut payload = Vec::new();
    if let Some(c) = cover {
        payload.extend(apic_frame(c));
    }
    if !chapters.is_empty() {
        payload.extend(ctoc_frame(chapters));
        for ch in chapters {
            payload.extend(chap_frame(ch));
        }
    }

    let mut out = Vec::with_capacity(10 + payload.len());
    out.extend_from_slice(b"ID3");
    out.push(0x04);
    out.push(0x00);
    out.push(0x00);
    out.extend_from_slice(&synchsafe(payload.len() as u32));
    out.extend(payload);
    out
}

/// The exact byte length [`encode`] would produce, without materializing
/// the buffer - frame sizes are independent of the *values* in their
/// numeric fields, only their fixed widths.
pub fn tag_length(chapters: &[ChapterTiming], cover: Option<&CoverArt>) -> usize {
    if chapters.is_empty() && cover.is_none() {
        return 0;
    }

    let mut payload_len = 0usize;
    if let Some(c) = cover {
        payload_len += apic_frame_len(c);
    }
    if !chapters.is_empty() {
        payload_len += ctoc_frame_len(chapters);
        for ch in chapters {
            payload_len += chap_frame_len(ch);
        }
    }

    10 + payload_len
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chapters() -> Vec<ChapterTiming> {
        vec![
            ChapterTiming { id: "ch0".into(), title: "Intro".into(), start_ms: 0, end_ms: 10_000 },
            ChapterTiming { id: "ch1".into(), title: "End".into(), start_ms: 10_000, end_ms: 20_000 },
        ]
    }

    #[test]
    fn empty_chapters_and_no_cover_yields_empty_buffer() {
        assert_eq!(encode(&[], None), Vec::<u8>::new());
        assert_eq!(tag_length(&[], None), 0);
    }

    #[test]
    fn header_and_synchsafe_size_are_exact() {
        let buf = encode(&chapters(), None);

        assert_eq!(&buf[0..3], b"ID3");
        assert_eq!(&buf[3..6], &[0x04, 0x00, 0x00]);

        let declared = ((buf[6] as u32) << 21)
            | ((buf[7] as u32) << 14)
            | ((buf[8] as u32) << 7)
            | (buf[9] as u32);
        assert_eq!(declared as usize, buf.len() - 10);
    }

    #[test]
    fn length_prediction_matches_actual_encode() {
        let buf = encode(&chapters(), None);
        assert_eq!(buf.len(), tag_length(&chapters(), None));
    }

    #[test]
    fn length_prediction_matches_actual_encode_with_cover() {
        let cover = CoverArt { mime: "image/jpeg", bytes: &[1, 2, 3, 4, 5] };
        let buf = encode(&chapters(), Some(&cover));
        assert_eq!(buf.len(), tag_length(&chapters(), Some(&cover)));
    }

    #[test]
    fn untitled_chapter_list_still_encodes_toc_children() {
        let single = vec![ChapterTiming { id: "ch0".into(), title: "Only".into(), start_ms: 0, end_ms: 1000 }];
        let buf = encode(&single, None);
        assert!(!buf.is_empty());
        // CTOC body is "toc" + 0x00 + flags + child-count + ...
        let ctoc_body_start = 10 + 10; // outer header + CTOC frame header
        assert_eq!(buf[ctoc_body_start + 5], 1);
    }
}
