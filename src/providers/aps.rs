//! DOI reconstruction for American Physical Society journal references.
//!
//! APS DOIs are predictable from the journal abbreviation, volume and
//! article number: `Phys. Rev. B 84, 245128` is `10.1103/physrevb.84.245128`.

use lazy_static::lazy_static;
use regex::Regex;

use super::reparse::TaggedSpan;

lazy_static! {
    // Parenthesised years sit between volume and article number in
    // `Phys. Rev. Lett. 73 (1994) 3070`
    static ref BRACKETED_YEAR: Regex = Regex::new(r"\((19[0-9][0-9]|20[01][0-9])\)").unwrap();
    static ref NON_WORD: Regex = Regex::new(r"[^\w]").unwrap();
}

const APS_PREFIX: &str = "10.1103";

fn lowercase_tokens(terms: &[TaggedSpan]) -> Vec<String> {
    terms
        .iter()
        .flat_map(|t| {
            let no_dates = BRACKETED_YEAR.replace_all(&t.term, " ");
            NON_WORD
                .replace_all(&no_dates, " ")
                .split_whitespace()
                .map(|p| p.to_lowercase())
                .collect::<Vec<_>>()
        })
        .collect()
}

fn find_sequence(tokens: &[String], needle: &[&str]) -> Option<usize> {
    tokens
        .windows(needle.len())
        .position(|w| w.iter().zip(needle).all(|(a, b)| a == b))
}

fn is_number(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_digit())
}

/// Guess the DOI of an APS journal article from typed citation spans
pub fn guess_aps_doi(terms: &[TaggedSpan]) -> Option<String> {
    let tokens = lowercase_tokens(terms);

    // journal token count: `phys rev <x>` or `rev mod phys`
    let (start, journal_len) = if let Some(i) = find_sequence(&tokens, &["phys", "rev"]) {
        (i, 3)
    } else if let Some(i) = find_sequence(&tokens, &["rev", "mod", "phys"]) {
        (i, 3)
    } else {
        return None;
    };

    let journal = tokens.get(start..start + journal_len)?.concat();
    let volume = tokens.get(start + journal_len)?;
    let article = tokens.get(start + journal_len + 1)?;

    if is_number(volume) && is_number(article) {
        Some(format!("{}/{}.{}.{}", APS_PREFIX, journal, volume, article))
    } else {
        None
    }
}
