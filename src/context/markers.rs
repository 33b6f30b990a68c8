use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// In-text citation marker `{{cite:<uuid>}}`
    pub static ref CITE_PATTERN: Regex = Regex::new(r"\{\{cite:([^{}\s]+?)\}\}").unwrap();

    static ref CITE_AT_START: Regex = Regex::new(r"^\{\{cite:[^{}\s]+?\}\}").unwrap();
}

const MARKER_OPEN: &str = "{{cite:";

/// Serialized marker for a bib entry uuid
pub fn cite_marker(uuid: &str) -> String {
    format!("{{{{cite:{}}}}}", uuid)
}

/// Byte length of a marker starting at the beginning of `text`
pub fn marker_len_at_start(text: &str) -> Option<usize> {
    if !text.starts_with(MARKER_OPEN) {
        return None;
    }
    CITE_AT_START.find(text).map(|m| m.end())
}

/// Byte length of a marker ending at the end of `text`
pub fn marker_len_at_end(text: &str) -> Option<usize> {
    if !text.ends_with("}}") {
        return None;
    }
    let open = text.rfind(MARKER_OPEN)?;
    let tail = &text[open..];
    match CITE_AT_START.find(tail) {
        Some(m) if m.end() == tail.len() => Some(tail.len()),
        _ => None,
    }
}

/// Byte offset of the `n`-th character from the start, or the text length
pub fn char_offset(text: &str, n: usize) -> usize {
    text.char_indices().nth(n).map(|(i, _)| i).unwrap_or(text.len())
}

/// Byte offset where the last `n` characters begin, or 0
pub fn char_offset_from_end(text: &str, n: usize) -> usize {
    if n == 0 {
        return text.len();
    }
    text.char_indices().rev().nth(n - 1).map(|(i, _)| i).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cite_marker() {
        assert_eq!(cite_marker("abc"), "{{cite:abc}}");
        let m = CITE_PATTERN.captures("see {{cite:0f1e-22}}.").unwrap();
        assert_eq!(&m[1], "0f1e-22");
    }

    #[test]
    fn test_marker_at_edges() {
        assert_eq!(marker_len_at_start("{{cite:foo}} bar"), Some(12));
        assert_eq!(marker_len_at_start("{{notcite}}"), None);
        assert_eq!(marker_len_at_end("bar {{cite:foo}}"), Some(12));
        assert_eq!(marker_len_at_end("bar {{cite:foo}} x"), None);
        assert_eq!(marker_len_at_end("{x}}"), None);
    }

    #[test]
    fn test_char_offsets() {
        assert_eq!(char_offset("héllo", 2), 3);
        assert_eq!(char_offset("hé", 10), 3);
        assert_eq!(char_offset_from_end("héllo", 4), 1);
        assert_eq!(char_offset_from_end("hé", 10), 0);
        assert_eq!(char_offset_from_end("hé", 0), 3);
    }
}
