use std::collections::HashSet;

use deunicode::deunicode_char;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

fn push_ascii(folded: &mut String, c: char) {
    if c.is_ascii_alphanumeric() || c == '_' {
        folded.push(c.to_ascii_lowercase());
    } else {
        folded.push(' ');
    }
}

/// Normalize a title or author name for equality matching.
///
/// Lower-cases, decomposes diacritics and drops the combining marks, then
/// transliterates whatever is still non-ASCII (Greek, Cyrillic, CJK,
/// ligatures) to its closest ASCII spelling. Every non-word character
/// becomes a space and whitespace is collapsed. The result is a fixed point:
/// `normalize_title(&normalize_title(s)) == normalize_title(s)`.
pub fn normalize_title(s: &str) -> String {
    let mut folded = String::with_capacity(s.len());

    for c in s.to_lowercase().nfd() {
        if is_combining_mark(c) {
            continue;
        }
        if c.is_ascii() {
            push_ascii(&mut folded, c);
            continue;
        }
        match deunicode_char(c) {
            Some(ascii) => ascii.chars().for_each(|a| push_ascii(&mut folded, a)),
            None => folded.push(' '),
        }
    }

    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Last token of a normalized author display name
pub fn surname(author: &str) -> Option<String> {
    normalize_title(author)
        .rsplit(' ')
        .next()
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}

/// Token set of a normalized reference string, for surname membership checks
pub fn reference_tokens(raw: &str) -> HashSet<String> {
    normalize_title(raw)
        .split(' ')
        .filter(|t| !t.is_empty())
        .map(|t| t.to_string())
        .collect()
}

/// True if at least one author surname is a whole token of the reference
pub fn has_author_overlap(authors: &[String], ref_tokens: &HashSet<String>) -> bool {
    authors
        .iter()
        .filter_map(|a| surname(a))
        .any(|s| ref_tokens.contains(&s))
}
