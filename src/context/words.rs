use super::markers::{marker_len_at_end, marker_len_at_start};

fn is_word_char(c: char) -> bool {
    !c.is_whitespace() && !c.is_ascii_punctuation()
}

/// Bytes to pass from the start of `text` to cover `num_words` words.
///
/// Citation markers are skipped whole and never count as words.
/// Stops at the end of the text if it runs out of words.
pub fn word_distance_forward(text: &str, num_words: usize) -> usize {
    let mut pos = 0;
    let mut words = 0;

    while words < num_words {
        let rest = &text[pos..];
        let Some(c) = rest.chars().next() else {
            break;
        };

        if c == '{' {
            if let Some(len) = marker_len_at_start(rest) {
                pos += len;
                continue;
            }
        }

        if is_word_char(c) {
            let word_len = rest
                .char_indices()
                .find(|(_, ch)| !is_word_char(*ch))
                .map(|(i, _)| i)
                .unwrap_or(rest.len());
            pos += word_len;
            words += 1;
        } else {
            pos += c.len_utf8();
        }
    }
    pos
}

/// Bytes to pass from the end of `text` backwards to cover `num_words` words
pub fn word_distance_backward(text: &str, num_words: usize) -> usize {
    let mut end = text.len();
    let mut words = 0;

    while words < num_words {
        let rest = &text[..end];
        let Some(c) = rest.chars().next_back() else {
            break;
        };

        if c == '}' {
            if let Some(len) = marker_len_at_end(rest) {
                end -= len;
                continue;
            }
        }

        if is_word_char(c) {
            let word_start = rest
                .char_indices()
                .rev()
                .find(|(_, ch)| !is_word_char(*ch))
                .map(|(i, ch)| i + ch.len_utf8())
                .unwrap_or(0);
            end = word_start;
            words += 1;
        } else {
            end -= c.len_utf8();
        }
    }
    text.len() - end
}

/// Window of `num_words` words around a marker: `(pre_distance, post_distance)`.
///
/// The budget is split evenly, the odd word going after the marker.
pub fn word_window(pre: &str, post: &str, num_words: usize) -> (usize, usize) {
    let pre_words = num_words / 2;
    let post_words = num_words - pre_words;
    (
        word_distance_backward(pre, pre_words),
        word_distance_forward(post, post_words),
    )
}
