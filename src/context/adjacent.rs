use std::collections::HashMap;

use super::markers::{char_offset, char_offset_from_end, CITE_PATTERN};

/// Characters on each side of a marker searched for co-citations
pub const ADJACENT_PERIMETER: usize = 50;

/// Citations directly adjacent to a marker on one side, resolved to work keys.
///
/// `text` is everything before (`backwards`) or after the marker. The
/// nearest marker inside the perimeter is taken, then the search continues
/// outward from it. Stops at the first marker whose uuid is not in
/// `uuid_to_work`. Results are in document order.
pub fn adjacent_citations(text: &str, uuid_to_work: &HashMap<String, String>, backwards: bool) -> Vec<String> {
    let mut found = Vec::new();
    let mut rest = text;

    loop {
        let (perimeter_start, perimeter) = if backwards {
            let start = char_offset_from_end(rest, ADJACENT_PERIMETER);
            (start, &rest[start..])
        } else {
            (0, &rest[..char_offset(rest, ADJACENT_PERIMETER)])
        };

        let nearest = if backwards {
            CITE_PATTERN.captures_iter(perimeter).last()
        } else {
            CITE_PATTERN.captures_iter(perimeter).next()
        };
        let Some(cap) = nearest else {
            break;
        };
        let (Some(whole), Some(uuid)) = (cap.get(0), cap.get(1)) else {
            break;
        };
        let Some(work) = uuid_to_work.get(uuid.as_str()) else {
            break;
        };
        found.push(work.clone());

        rest = if backwards {
            &rest[..perimeter_start + whole.start()]
        } else {
            &rest[whole.end()..]
        };
    }

    if backwards {
        found.reverse();
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph() -> HashMap<String, String> {
        [("a", "W1"), ("b", "W2"), ("c", "W3"), ("d", "W4")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_forward_chain() {
        let post = ", {{cite:c}}, {{cite:d}}] shows that";
        assert_eq!(adjacent_citations(post, &graph(), false), vec!["W3", "W4"]);
    }

    #[test]
    fn test_backward_chain_in_document_order() {
        let pre = "as shown in [{{cite:a}}, {{cite:b}}, ";
        assert_eq!(adjacent_citations(pre, &graph(), true), vec!["W1", "W2"]);
    }

    #[test]
    fn test_outside_perimeter_ignored() {
        let pre = format!("{{{{cite:a}}}}{}", " filler".repeat(10));
        assert!(adjacent_citations(&pre, &graph(), true).is_empty());
    }

    #[test]
    fn test_unknown_uuid_stops_search() {
        let post = " {{cite:zzz}} {{cite:c}}";
        assert!(adjacent_citations(post, &graph(), false).is_empty());

        let post = " {{cite:c}} {{cite:zzz}} {{cite:d}}";
        assert_eq!(adjacent_citations(post, &graph(), false), vec!["W3"]);
    }
}
