use log::debug;
use std::collections::HashSet;

use crate::common::CanonicalWork;
use crate::extract::{has_author_overlap, reference_tokens};
use crate::kb::{CanonicalStore, StoreError};

/// What to try after the current title query fails
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowState {
    /// Title is trusted as is
    NoRetry,
    /// Full title; on zero candidates retry without its first token
    RetryDropFirst,
    /// Drop-first variant; on failure retry the full title without its last token
    RetryDropLast,
    /// Drop-last variant; nothing left to try
    Exhausted,
}

impl WindowState {
    pub fn initial(may_narrow: bool) -> Self {
        if may_narrow {
            WindowState::RetryDropFirst
        } else {
            WindowState::NoRetry
        }
    }
}

fn drop_first(title: &str) -> String {
    title.split(' ').skip(1).collect::<Vec<_>>().join(" ")
}

fn drop_last(title: &str) -> String {
    let mut tokens: Vec<&str> = title.split(' ').collect();
    tokens.pop();
    tokens.join(" ")
}

/// Pick one work from a title-collision set.
///
/// Only candidates sharing an author surname with the reference survive;
/// among those the highest citation count wins, the first one on ties.
pub fn choose_candidate(
    candidates: Vec<CanonicalWork>,
    ref_tokens: &HashSet<String>,
) -> Option<CanonicalWork> {
    let mut best: Option<CanonicalWork> = None;
    for candidate in candidates {
        if !has_author_overlap(&candidate.authors, ref_tokens) {
            continue;
        }
        match &best {
            Some(b) if candidate.citation_count <= b.citation_count => {}
            _ => best = Some(candidate),
        }
    }
    best
}

/// Resolve a normalized title to at most one canonical work.
///
/// Issues at most three title queries: the full title and, only when
/// `may_narrow` is set and the full title has no candidates at all, the
/// drop-first and drop-last variants in that order.
pub async fn disambiguate(
    store: &dyn CanonicalStore,
    normalized_title: &str,
    raw_reference: &str,
    may_narrow: bool,
) -> Result<Option<CanonicalWork>, StoreError> {
    let ref_tokens = reference_tokens(raw_reference);
    let mut state = WindowState::initial(may_narrow);
    let mut query = normalized_title.to_string();

    loop {
        let mut had_candidates = false;
        if !query.is_empty() {
            let candidates = store.works_by_title(&query).await?;
            had_candidates = !candidates.is_empty();
            debug!("Title '{}' ({:?}): {} candidates", query, state, candidates.len());

            if let Some(work) = choose_candidate(candidates, &ref_tokens) {
                return Ok(Some(work));
            }
        }

        (state, query) = match state {
            WindowState::NoRetry | WindowState::Exhausted => return Ok(None),
            WindowState::RetryDropFirst if had_candidates => return Ok(None),
            WindowState::RetryDropFirst => (WindowState::RetryDropLast, drop_first(normalized_title)),
            WindowState::RetryDropLast => (WindowState::Exhausted, drop_last(normalized_title)),
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::IdentifierBundle;
    use crate::kb::MemoryCanonicalStore;

    fn work(title: &str, author: &str, count: u64, id: &str) -> CanonicalWork {
        CanonicalWork {
            normalized_title: title.to_string(),
            authors: vec![author.to_string()],
            citation_count: count,
            ids: IdentifierBundle {
                openalex: id.to_string(),
                ..Default::default()
            },
            discipline: String::new(),
        }
    }

    #[test]
    fn test_variants() {
        assert_eq!(drop_first("a b c"), "b c");
        assert_eq!(drop_last("a b c"), "a b");
        assert_eq!(drop_first("a"), "");
        assert_eq!(drop_last("a"), "");
    }

    #[test]
    fn test_choose_single_requires_overlap() {
        let tokens = reference_tokens("J. Smith, A title, 2001");
        assert!(choose_candidate(vec![work("t", "john smith", 1, "W1")], &tokens).is_some());
        assert!(choose_candidate(vec![work("t", "jane doe", 1, "W1")], &tokens).is_none());
    }

    #[test]
    fn test_choose_highest_citation_count() {
        let tokens = reference_tokens("Smith and Doe, A title");
        let chosen = choose_candidate(
            vec![
                work("t", "john smith", 12, "W12"),
                work("t", "jane doe", 87, "W87"),
                work("t", "max mustermann", 500, "W500"),
            ],
            &tokens,
        )
        .unwrap();
        assert_eq!(chosen.ids.openalex, "W87");
    }

    #[test]
    fn test_choose_tie_keeps_first() {
        let tokens = reference_tokens("Smith and Doe");
        let candidates = vec![work("t", "john smith", 5, "first"), work("t", "jane doe", 5, "second")];
        for _ in 0..3 {
            let chosen = choose_candidate(candidates.clone(), &tokens).unwrap();
            assert_eq!(chosen.ids.openalex, "first");
        }
    }

    #[tokio::test]
    async fn test_no_narrowing_without_flag() {
        let mut store = MemoryCanonicalStore::new();
        store.insert(work("quantum gravity", "john smith", 1, "W1"));

        let result = disambiguate(&store, "on quantum gravity", "J. Smith", false).await.unwrap();
        assert!(result.is_none());

        let result = disambiguate(&store, "on quantum gravity", "J. Smith", true).await.unwrap();
        assert_eq!(result.unwrap().ids.openalex, "W1");
    }

    #[tokio::test]
    async fn test_rejected_candidates_do_not_narrow() {
        let mut store = MemoryCanonicalStore::new();
        store.insert(work("on quantum gravity", "jane doe", 1, "W-full"));
        store.insert(work("quantum gravity", "john smith", 1, "W-narrow"));

        let result = disambiguate(&store, "on quantum gravity", "J. Smith", true).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_single_token_title() {
        let store = MemoryCanonicalStore::new();
        let result = disambiguate(&store, "supergravity", "J. Smith", true).await.unwrap();
        assert!(result.is_none());
    }
}
