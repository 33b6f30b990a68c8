use std::collections::HashSet;

use lazy_static::lazy_static;

lazy_static! {
    /// Tokens that end in a period without ending a sentence
    static ref ABBREVIATIONS: HashSet<&'static str> =
        ["al", "fig", "e.g", "i.e", "eq", "cf", "ref", "refs"].into_iter().collect();
}

/// Stand-in for the citation marker while tokenizing a window
const WINDOW_MARKER: &str = "TMP\u{200C}CIT";

fn is_terminal(c: char) -> bool {
    matches!(c, '.' | '!' | '?')
}

fn is_closing(c: char) -> bool {
    matches!(c, ')' | ']' | '"' | '\'' | '\u{201D}' | '\u{2019}')
}

/// True if the period ending at byte `dot` closes an abbreviation or an initial
fn is_abbreviation(text: &str, dot: usize) -> bool {
    let before = &text[..dot];
    let token_start = before
        .char_indices()
        .rev()
        .find(|(_, c)| c.is_whitespace())
        .map(|(i, c)| i + c.len_utf8())
        .unwrap_or(0);
    let token = before[token_start..]
        .trim_start_matches(|c: char| c.is_ascii_punctuation() && c != '.')
        .to_lowercase();

    if ABBREVIATIONS.contains(token.as_str()) {
        return true;
    }
    let mut chars = token.chars();
    matches!((chars.next(), chars.next()), (Some(c), None) if c.is_alphabetic())
}

/// Byte spans `[start, end)` of the sentences in `text`.
///
/// A sentence ends at `.`, `!` or `?` (plus trailing closing quotes or
/// brackets) followed by whitespace or the end of the text. Periods after
/// known abbreviations and single-letter initials do not end a sentence.
/// Spans exclude the whitespace between sentences.
pub fn sentence_spans(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start: Option<usize> = None;
    let mut iter = text.char_indices().peekable();

    while let Some((i, c)) = iter.next() {
        if start.is_none() {
            if c.is_whitespace() {
                continue;
            }
            start = Some(i);
        }

        if !is_terminal(c) {
            continue;
        }

        let mut end = i + c.len_utf8();
        while let Some(&(j, next)) = iter.peek() {
            if is_terminal(next) || is_closing(next) {
                end = j + next.len_utf8();
                iter.next();
            } else {
                break;
            }
        }

        let at_break = match iter.peek() {
            None => true,
            Some(&(_, next)) => next.is_whitespace(),
        };
        if !at_break || (c == '.' && end == i + 1 && is_abbreviation(text, i)) {
            continue;
        }

        if let Some(s) = start.take() {
            spans.push((s, end));
        }
    }

    if let Some(s) = start {
        let end = s + text[s..].trim_end().len();
        if end > s {
            spans.push((s, end));
        }
    }
    spans
}

/// Byte offset just after the `n`-th period counted backwards, or None if there are fewer
fn nth_period_from_end(text: &str, n: usize) -> Option<usize> {
    text.match_indices('.').rev().nth(n.checked_sub(1)?).map(|(i, _)| i + 1)
}

/// Byte offset just after the `n`-th period counted forwards
fn nth_period(text: &str, n: usize) -> Option<usize> {
    text.match_indices('.').nth(n.checked_sub(1)?).map(|(i, _)| i + 1)
}

/// Window of `num_sentences` sentences around a marker: `(pre_distance, post_distance)`.
///
/// The marker's own sentence counts as one; `ceil((N-1)/2)` full sentences
/// are taken on each side. Candidate spans are first cut by counting
/// periods (scaled by a safety multiplier), then tokenized properly; if
/// either side comes up short the multiplier is tripled and the cut
/// redone. A side without enough sentences extends to the text boundary.
pub fn sentence_window(pre: &str, post: &str, num_sentences: usize) -> (usize, usize) {
    let margin = num_sentences.saturating_sub(1).div_ceil(2);
    let mut multiplier = 3usize;

    loop {
        let dots = (margin + 1) * multiplier;
        let (pre_cut, pre_at_boundary) = match nth_period_from_end(pre, dots) {
            Some(i) => (&pre[i..], false),
            None => (pre, true),
        };
        let (post_cut, post_at_boundary) = match nth_period(post, dots) {
            Some(i) => (&post[..i], false),
            None => (post, true),
        };

        let joined = format!("{}{}{}", pre_cut, WINDOW_MARKER, post_cut);
        let marker_start = pre_cut.len();
        let marker_end = marker_start + WINDOW_MARKER.len();

        let mut before: Vec<usize> = Vec::new();
        let mut after: Vec<usize> = Vec::new();
        let mut middle = (marker_start, marker_end);
        for (s, e) in sentence_spans(&joined) {
            if s <= marker_start && marker_end <= e {
                middle = (s, e);
            } else if e <= marker_start {
                before.push(marker_start - s);
            } else if s >= marker_end {
                after.push(e - marker_end);
            }
        }

        let enough = before.len() >= margin && after.len() >= margin;
        if !enough && !(pre_at_boundary && post_at_boundary) {
            multiplier *= 3;
            continue;
        }

        let pre_dist = if margin == 0 {
            marker_start - middle.0
        } else if before.len() >= margin {
            before[before.len() - margin]
        } else {
            pre.len()
        };
        let post_dist = if margin == 0 {
            middle.1 - marker_end
        } else if after.len() >= margin {
            after[margin - 1]
        } else {
            post.len()
        };
        return (pre_dist.min(pre.len()), post_dist.min(post.len()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(text: &str, spans: &[(usize, usize)]) -> Vec<String> {
        spans.iter().map(|(s, e)| text[*s..*e].to_string()).collect()
    }

    #[test]
    fn test_sentence_spans_basic() {
        let text = "First one. Second one! Third?  Fourth without end";
        assert_eq!(
            texts(text, &sentence_spans(text)),
            vec!["First one.", "Second one!", "Third?", "Fourth without end"]
        );
    }

    #[test]
    fn test_sentence_spans_abbreviations() {
        let text = "As in Smith et al. (2001) and Fig. 3, see e.g. Eq. 4. J. Doe agrees. Next.";
        assert_eq!(
            texts(text, &sentence_spans(text)),
            vec![
                "As in Smith et al. (2001) and Fig. 3, see e.g. Eq. 4.",
                "J. Doe agrees.",
                "Next."
            ]
        );
    }

    #[test]
    fn test_sentence_spans_closing_quote_and_decimals() {
        let text = "He said \"stop.\" Then 3.14 was used (see Ref. 2.) Done.";
        assert_eq!(
            texts(text, &sentence_spans(text)),
            vec!["He said \"stop.\"", "Then 3.14 was used (see Ref. 2.)", "Done."]
        );
    }

    #[test]
    fn test_sentence_window_three() {
        let pre = "Zero. One. Two. The method of ";
        let post = " works well. Three. Four.";
        let (p, q) = sentence_window(pre, post, 3);
        assert_eq!(&pre[pre.len() - p..], "Two. The method of ");
        assert_eq!(&post[..q], " works well. Three.");
    }

    #[test]
    fn test_sentence_window_single() {
        let pre = "Zero. One. The method of ";
        let post = " works well. Three.";
        let (p, q) = sentence_window(pre, post, 1);
        assert_eq!(&pre[pre.len() - p..], "The method of ");
        assert_eq!(&post[..q], " works well.");
    }

    #[test]
    fn test_sentence_window_truncates_at_boundary() {
        let pre = "The method of ";
        let post = " works.";
        let (p, q) = sentence_window(pre, post, 5);
        assert_eq!(p, pre.len());
        assert_eq!(q, post.len());
    }

    #[test]
    fn test_sentence_window_many_decimals_before_marker() {
        // periods inside numbers make the first cut too short
        let pre = "Intro here. Values 1.1 2.2 3.3 4.4 5.5 6.6 7.7 8.8 9.9 were seen ";
        let post = " again. Tail.";
        let (p, q) = sentence_window(pre, post, 3);
        assert_eq!(
            &pre[pre.len() - p..],
            "Intro here. Values 1.1 2.2 3.3 4.4 5.5 6.6 7.7 8.8 9.9 were seen "
        );
        assert_eq!(&post[..q], " again. Tail.");
    }
}
