//! Book id slugification

/// Lowercase, collapse non-alphanumerics to single hyphens, trim leading
/// and trailing hyphens. Idempotent: `slugify(slugify(x)) == slugify(x)`.
pub fn slugify(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut last_was_hyphen = false;

    for ch in input.chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch.to_ascii_lowercase());
            last_was_hyphen = false;
        } else if !last_was_hyphen && !out.is_empty() {
            out.push('-');
            last_was_hyphen = true;
        }
    }

    while out.ends_with('-') {
        out.pop();
    }

    out
}

/// Build the book id from author + title. Derived from the folder name,
/// not the resolved display title, so it stays stable against tag edits.
pub fn book_id(author: &str, folder_title: &str) -> String {
    slugify(&format!("{author}-{folder_title}"))
}

/// Base-36 encode a millisecond timestamp for on-disk file names
/// (`cover-<slug>-<mtime36>.jpg`, `<slug>-<mtime36>.mp3`).
pub fn mtime_base36(mtime_ms: i64) -> String {
    if mtime_ms == 0 {
        return "0".to_string();
    }
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let mut n = mtime_ms.unsigned_abs();
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapses_non_alphanumerics() {
        assert_eq!(slugify("Andy Weir - Project Hail Mary!"), "andy-weir-project-hail-mary");
    }

    #[test]
    fn trims_edges() {
        assert_eq!(slugify("  --Hello World--  "), "hello-world");
    }

    #[test]
    fn idempotent() {
        let once = slugify("Some_Weird--Title!!");
        let twice = slugify(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn empty_input_is_empty() {
        assert_eq!(slugify(""), "");
        assert_eq!(slugify("!!!"), "");
    }

    #[test]
    fn book_id_combines_author_and_title() {
        assert_eq!(book_id("Isaac Asimov", "I, Robot"), "isaac-asimov-i-robot");
    }

    #[test]
    fn base36_encodes_mtime() {
        assert_eq!(mtime_base36(0), "0");
        assert_eq!(mtime_base36(35), "z");
        assert_eq!(mtime_base36(36), "10");
    }
}
