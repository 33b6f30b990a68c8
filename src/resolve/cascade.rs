use log::debug;
use std::sync::Arc;
use std::time::Instant;

use super::disambiguate::disambiguate;
use super::stats::{Outcome, ResolveStats, Strategy};
use crate::common::{BibEntry, ResolvedIdentifiers};
use crate::extract::{arxiv_id_guesses, doi_from_link, find_arxiv_id, normalize_title};
use crate::kb::{CanonicalStore, StoreError};
use crate::providers::{
    guess_aps_doi, CitationReparser, CrossrefTitleCache, DoiTitleSource, SnapshotLookup,
};

/// Separator left in raw strings by the LaTeX conversion
const RAW_SEPARATOR: char = '¦';

/// The external collaborators one worker resolves against
#[derive(Clone)]
pub struct Providers {
    pub snapshot: Arc<dyn SnapshotLookup>,
    pub crossref: Arc<dyn DoiTitleSource>,
    pub reparser: Arc<dyn CitationReparser>,
    pub store: Arc<dyn CanonicalStore>,
}

/// Mutable state owned by one worker for the duration of one shard
#[derive(Debug, Default)]
pub struct WorkerState {
    pub doi_cache: CrossrefTitleCache,
    pub stats: ResolveStats,
}

impl WorkerState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Final statistics, with the cache counters folded in
    pub fn into_stats(self) -> ResolveStats {
        let mut stats = self.stats;
        stats.doi_cache.merge(&self.doi_cache.stats);
        stats
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub ids: ResolvedIdentifiers,
    pub outcome: Outcome,
}

impl Resolution {
    fn unresolved(outcome: Outcome) -> Self {
        Self {
            ids: ResolvedIdentifiers::default(),
            outcome,
        }
    }
}

/// Where the title handed to title matching came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TitleSource {
    Arxiv,
    Doi,
    Reparse,
}

struct BoundTitle {
    title: String,
    source: TitleSource,
    may_narrow: bool,
}

/// Runs the resolution cascade for single bib entries
pub struct Resolver {
    providers: Providers,
}

impl Resolver {
    pub fn new(providers: Providers) -> Self {
        Self { providers }
    }

    /// arXiv IDs to look up: the embedded ones, else one found in the raw string
    fn arxiv_candidates(entry: &BibEntry) -> Vec<String> {
        let embedded: Vec<String> = entry
            .embedded_arxiv_ids
            .iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if embedded.is_empty() {
            find_arxiv_id(&entry.raw_string).into_iter().collect()
        } else {
            embedded
        }
    }

    fn title_by_arxiv_id(&self, candidates: &[String]) -> Option<(String, String)> {
        for id in candidates {
            for guess in arxiv_id_guesses(id) {
                if let Some(title) = self.providers.snapshot.title(&guess) {
                    if !title.trim().is_empty() {
                        return Some((guess, title));
                    }
                }
            }
        }
        None
    }

    async fn title_by_doi(&self, entry: &BibEntry, state: &mut WorkerState) -> Option<String> {
        let dois: Vec<String> = entry
            .embedded_links
            .iter()
            .filter_map(|link| doi_from_link(link))
            .collect();

        for doi in dois {
            let title = state
                .doi_cache
                .title_for(&doi, self.providers.crossref.as_ref(), self.providers.store.as_ref())
                .await;
            if title.is_some() {
                return title;
            }
        }
        None
    }

    /// Re-parse the raw string; falls back to an APS DOI guess when the
    /// parse carries no title
    async fn title_by_reparse(&self, entry: &BibEntry, state: &mut WorkerState) -> Option<BoundTitle> {
        let cleaned: String = entry.raw_string.chars().filter(|&c| c != RAW_SEPARATOR).collect();
        let parsed = self.providers.reparser.reparse(&cleaned).await?;

        if let Some(title) = parsed.title {
            return Some(BoundTitle {
                title,
                source: TitleSource::Reparse,
                may_narrow: true,
            });
        }

        let doi = guess_aps_doi(&parsed.terms)?;
        let title = state
            .doi_cache
            .title_for(&doi, self.providers.crossref.as_ref(), self.providers.store.as_ref())
            .await?;
        state.stats.aps_doi_rebounds += 1;
        debug!("APS DOI rebound {} for {}", doi, entry.uuid);
        Some(BoundTitle {
            title,
            source: TitleSource::Reparse,
            may_narrow: false,
        })
    }

    /// Resolve one entry, recording its outcome and timings in `state`
    pub async fn resolve(&self, entry: &BibEntry, state: &mut WorkerState) -> Resolution {
        let resolution = self.run_cascade(entry, state).await;
        state.stats.record(resolution.outcome);
        debug!("{} -> {}", entry.uuid, resolution.outcome.as_str());
        resolution
    }

    async fn run_cascade(&self, entry: &BibEntry, state: &mut WorkerState) -> Resolution {
        let arxiv_candidates = Self::arxiv_candidates(entry);
        let mut entry_arxiv_id = arxiv_candidates.first().cloned();
        let mut bound: Option<BoundTitle> = None;

        if !arxiv_candidates.is_empty() {
            let started = Instant::now();
            if let Some((id, title)) = self.title_by_arxiv_id(&arxiv_candidates) {
                entry_arxiv_id = Some(id);
                bound = Some(BoundTitle {
                    title,
                    source: TitleSource::Arxiv,
                    may_narrow: false,
                });
            }
            state.stats.timings.add(Strategy::ArxivSnapshot, started.elapsed());
        }

        if bound.is_none() && !entry.embedded_links.is_empty() {
            let started = Instant::now();
            if let Some(title) = self.title_by_doi(entry, state).await {
                bound = Some(BoundTitle {
                    title,
                    source: TitleSource::Doi,
                    may_narrow: false,
                });
            }
            state.stats.timings.add(Strategy::CrossrefDoi, started.elapsed());
        }

        if bound.is_none() {
            let started = Instant::now();
            bound = self.title_by_reparse(entry, state).await;
            state.stats.timings.add(Strategy::Reparse, started.elapsed());
        }

        let Some(bound) = bound else {
            return Resolution::unresolved(Outcome::UnresolvedNoTitle);
        };
        let normalized = normalize_title(&bound.title);
        if normalized.is_empty() {
            return Resolution::unresolved(Outcome::UnresolvedNoTitle);
        }

        let started = Instant::now();
        let matched = disambiguate(
            self.providers.store.as_ref(),
            &normalized,
            &entry.raw_string,
            bound.may_narrow,
        )
        .await;
        state.stats.timings.add(Strategy::TitleMatch, started.elapsed());

        match matched {
            Ok(Some(work)) => Resolution {
                ids: ResolvedIdentifiers::from_work(&work, entry_arxiv_id.as_deref()),
                outcome: match bound.source {
                    TitleSource::Arxiv => Outcome::ResolvedByArxivId,
                    TitleSource::Doi => Outcome::ResolvedByDoi,
                    TitleSource::Reparse => Outcome::ResolvedByReparseTitleMatch,
                },
            },
            Ok(None) => Resolution::unresolved(Outcome::UnresolvedNoTitleMatch),
            Err(StoreError::Timeout) => Resolution::unresolved(Outcome::AbortedKbTimeout),
            Err(StoreError::Backend(e)) => {
                debug!("Knowledge base failure for {}: {}", entry.uuid, e);
                Resolution::unresolved(Outcome::FailedTransient)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{CanonicalWork, IdentifierBundle};
    use crate::kb::MemoryCanonicalStore;
    use crate::providers::{MemorySnapshot, ReparsedCitation, TaggedSpan};
    use async_trait::async_trait;
    use std::collections::HashMap;

    struct StaticDois(HashMap<String, String>);

    #[async_trait]
    impl DoiTitleSource for StaticDois {
        async fn fetch_title(&self, doi: &str) -> Option<String> {
            self.0.get(&doi.to_lowercase()).cloned()
        }
    }

    struct StaticReparser(Option<ReparsedCitation>);

    #[async_trait]
    impl CitationReparser for StaticReparser {
        async fn reparse(&self, _raw: &str) -> Option<ReparsedCitation> {
            self.0.clone()
        }
    }

    struct TimeoutStore;

    #[async_trait]
    impl CanonicalStore for TimeoutStore {
        async fn works_by_title(&self, _t: &str) -> Result<Vec<CanonicalWork>, StoreError> {
            Err(StoreError::Timeout)
        }
        async fn cached_doi_title(&self, _d: &str) -> Result<Option<String>, StoreError> {
            Err(StoreError::Timeout)
        }
        async fn store_doi_title(&self, _d: &str, _t: &str) -> Result<(), StoreError> {
            Err(StoreError::Timeout)
        }
    }

    fn kitaev_store() -> MemoryCanonicalStore {
        let mut store = MemoryCanonicalStore::new();
        store.insert(CanonicalWork {
            normalized_title: "anyons in an exactly solved model and beyond".to_string(),
            authors: vec!["alexei kitaev".to_string()],
            citation_count: 5000,
            ids: IdentifierBundle {
                openalex: "W2090".to_string(),
                doi: "10.1016/j.aop.2005.10.005".to_string(),
                ..Default::default()
            },
            discipline: "Physics".to_string(),
        });
        store
    }

    fn entry(raw: &str, links: &[&str]) -> BibEntry {
        BibEntry {
            uuid: "u1".to_string(),
            in_doc: "doc1".to_string(),
            raw_string: raw.to_string(),
            embedded_arxiv_ids: vec![],
            embedded_links: links.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn providers(store: Arc<dyn CanonicalStore>, reparsed: Option<ReparsedCitation>) -> Providers {
        let mut dois = HashMap::new();
        dois.insert(
            "10.1103/physrevb.84.245128".to_string(),
            "Anyons in an exactly solved model and beyond".to_string(),
        );
        Providers {
            snapshot: Arc::new(MemorySnapshot::new()),
            crossref: Arc::new(StaticDois(dois)),
            reparser: Arc::new(StaticReparser(reparsed)),
            store,
        }
    }

    #[tokio::test]
    async fn test_aps_rebound_resolves_as_reparse() {
        let reparsed = ReparsedCitation {
            title: None,
            journal: Some("Phys. Rev. B".to_string()),
            terms: vec![
                TaggedSpan { entity: "journal".to_string(), term: "Phys. Rev. B".to_string() },
                TaggedSpan { entity: "volume".to_string(), term: "84".to_string() },
                TaggedSpan { entity: "pages".to_string(), term: "245128".to_string() },
            ],
        };
        let resolver = Resolver::new(providers(Arc::new(kitaev_store()), Some(reparsed)));
        let mut state = WorkerState::new();

        let resolution = resolver
            .resolve(&entry("A. Kitaev, Phys. Rev. B 84, 245128", &[]), &mut state)
            .await;
        assert_eq!(resolution.outcome, Outcome::ResolvedByReparseTitleMatch);
        assert_eq!(resolution.ids.open_alex_id, "https://openalex.org/W2090");
        assert_eq!(state.stats.aps_doi_rebounds, 1);
    }

    #[tokio::test]
    async fn test_unreachable_reparser_is_no_title() {
        let resolver = Resolver::new(providers(Arc::new(kitaev_store()), None));
        let mut state = WorkerState::new();
        let resolution = resolver.resolve(&entry("Some unparseable thing", &[]), &mut state).await;
        assert_eq!(resolution.outcome, Outcome::UnresolvedNoTitle);
        assert!(resolution.ids.is_empty());
    }

    #[tokio::test]
    async fn test_kb_timeout_aborts_entry() {
        let reparsed = ReparsedCitation {
            title: Some("Anyons in an exactly solved model and beyond".to_string()),
            ..Default::default()
        };
        let resolver = Resolver::new(providers(Arc::new(TimeoutStore), Some(reparsed)));
        let mut state = WorkerState::new();
        let resolution = resolver.resolve(&entry("A. Kitaev, Anyons ...", &[]), &mut state).await;
        assert_eq!(resolution.outcome, Outcome::AbortedKbTimeout);
        assert_eq!(state.stats.aborted_kb_timeout, 1);
    }

    #[tokio::test]
    async fn test_separator_removed_before_reparse() {
        struct Echo;

        #[async_trait]
        impl CitationReparser for Echo {
            async fn reparse(&self, raw: &str) -> Option<ReparsedCitation> {
                Some(ReparsedCitation {
                    title: Some(raw.to_string()),
                    ..Default::default()
                })
            }
        }

        let mut p = providers(Arc::new(MemoryCanonicalStore::new()), None);
        p.reparser = Arc::new(Echo);
        let resolver = Resolver::new(p);
        let mut state = WorkerState::new();
        let resolution = resolver.resolve(&entry("¦¦¦", &[]), &mut state).await;
        assert_eq!(resolution.outcome, Outcome::UnresolvedNoTitle);
    }
}
