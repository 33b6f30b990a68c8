use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{info, warn};
use serde::Deserialize;
use std::collections::HashMap;
use std::io::BufRead;
use std::path::Path;
use std::sync::Mutex;
use std::time::Instant;

use super::{CanonicalStore, StoreError};
use crate::common::{format_elapsed, open_jsonl, CanonicalWork, IdentifierBundle};
use crate::extract::{doi_cache_key, normalize_title};

/// One line of a works dump
#[derive(Debug, Deserialize)]
struct DumpRecord {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    normalized_title: Option<String>,
    #[serde(default)]
    authors: Vec<String>,
    #[serde(default)]
    citation_count: u64,
    #[serde(default)]
    ids: IdentifierBundle,
    #[serde(default)]
    discipline: String,
}

impl DumpRecord {
    fn into_work(self) -> Option<CanonicalWork> {
        let normalized_title = match (self.normalized_title, self.title) {
            (Some(n), _) if !n.is_empty() => normalize_title(&n),
            (_, Some(t)) => normalize_title(&t),
            _ => return None,
        };
        if normalized_title.is_empty() {
            return None;
        }
        Some(CanonicalWork {
            normalized_title,
            authors: self.authors.iter().map(|a| normalize_title(a)).collect(),
            citation_count: self.citation_count,
            ids: self.ids,
            discipline: self.discipline,
        })
    }
}

/// Knowledge base held in memory, indexed by normalized title
#[derive(Debug, Default)]
pub struct MemoryCanonicalStore {
    by_title: HashMap<String, Vec<CanonicalWork>>,
    doi_titles: Mutex<HashMap<String, String>>,
}

impl MemoryCanonicalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a work; works sharing a title keep their insertion order
    pub fn insert(&mut self, work: CanonicalWork) {
        self.by_title
            .entry(work.normalized_title.clone())
            .or_default()
            .push(work);
    }

    pub fn len(&self) -> usize {
        self.by_title.values().map(|v| v.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_title.is_empty()
    }

    /// Load a JSONL(.gz) dump with one work per line
    pub fn load(path: &Path) -> Result<Self> {
        info!("Loading knowledge base dump from: {}", path.display());
        let start = Instant::now();

        let reader = open_jsonl(path)?;
        let mut store = Self::new();
        let mut lines_processed = 0usize;
        let mut lines_failed = 0usize;

        for line_result in reader.lines() {
            let line = line_result.context("Failed to read line")?;
            if line.trim().is_empty() {
                continue;
            }
            lines_processed += 1;

            match serde_json::from_str::<DumpRecord>(&line) {
                Ok(record) => match record.into_work() {
                    Some(work) => store.insert(work),
                    None => lines_failed += 1,
                },
                Err(_) => lines_failed += 1,
            }

            if lines_processed % 1_000_000 == 0 {
                info!("  Loaded {} works...", lines_processed);
            }
        }

        info!(
            "Loaded {} works ({} distinct titles) in {}",
            store.len(),
            store.by_title.len(),
            format_elapsed(start.elapsed())
        );
        if lines_failed > 0 {
            warn!("  ({} dump lines skipped)", lines_failed);
        }

        Ok(store)
    }
}

#[async_trait]
impl CanonicalStore for MemoryCanonicalStore {
    async fn works_by_title(&self, normalized_title: &str) -> Result<Vec<CanonicalWork>, StoreError> {
        Ok(self
            .by_title
            .get(normalized_title)
            .cloned()
            .unwrap_or_default())
    }

    async fn cached_doi_title(&self, doi: &str) -> Result<Option<String>, StoreError> {
        let cache = self
            .doi_titles
            .lock()
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(cache.get(&doi_cache_key(doi)).cloned())
    }

    async fn store_doi_title(&self, doi: &str, title: &str) -> Result<(), StoreError> {
        let mut cache = self
            .doi_titles
            .lock()
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        // first writer wins
        cache
            .entry(doi_cache_key(doi))
            .or_insert_with(|| title.to_string());
        Ok(())
    }
}
