use log::info;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::common::format_elapsed;
use crate::providers::CacheStats;

/// Terminal outcome of one bib entry; exactly one per processed entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    ResolvedByArxivId,
    ResolvedByDoi,
    ResolvedByReparseTitleMatch,
    UnresolvedNoTitle,
    UnresolvedNoTitleMatch,
    /// Knowledge-base statement timeout; the entry is not retried
    AbortedKbTimeout,
    /// Knowledge-base backend failure; the entry is retried on resume
    FailedTransient,
}

impl Outcome {
    /// Whether the entry goes into the done log
    pub fn marks_done(self) -> bool {
        self != Outcome::FailedTransient
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::ResolvedByArxivId => "resolved_by_arxiv_id",
            Outcome::ResolvedByDoi => "resolved_by_doi",
            Outcome::ResolvedByReparseTitleMatch => "resolved_by_reparse_title_match",
            Outcome::UnresolvedNoTitle => "unresolved_no_title",
            Outcome::UnresolvedNoTitleMatch => "unresolved_no_title_match",
            Outcome::AbortedKbTimeout => "aborted_kb_timeout",
            Outcome::FailedTransient => "failed_transient",
        }
    }
}

/// Cascade step whose time is aggregated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    ArxivSnapshot,
    CrossrefDoi,
    Reparse,
    TitleMatch,
}

/// Accumulated time and invocation count of one strategy
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Timing {
    pub total_secs: f64,
    pub calls: usize,
}

impl Timing {
    pub fn add(&mut self, elapsed: Duration) {
        self.total_secs += elapsed.as_secs_f64();
        self.calls += 1;
    }

    pub fn mean_secs(&self) -> f64 {
        if self.calls == 0 {
            0.0
        } else {
            self.total_secs / self.calls as f64
        }
    }

    fn merge(&mut self, other: &Timing) {
        self.total_secs += other.total_secs;
        self.calls += other.calls;
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StrategyTimings {
    pub arxiv_snapshot: Timing,
    pub crossref_doi: Timing,
    pub reparse: Timing,
    pub title_match: Timing,
}

impl StrategyTimings {
    pub fn add(&mut self, strategy: Strategy, elapsed: Duration) {
        match strategy {
            Strategy::ArxivSnapshot => self.arxiv_snapshot.add(elapsed),
            Strategy::CrossrefDoi => self.crossref_doi.add(elapsed),
            Strategy::Reparse => self.reparse.add(elapsed),
            Strategy::TitleMatch => self.title_match.add(elapsed),
        }
    }

    fn merge(&mut self, other: &StrategyTimings) {
        self.arxiv_snapshot.merge(&other.arxiv_snapshot);
        self.crossref_doi.merge(&other.crossref_doi);
        self.reparse.merge(&other.reparse);
        self.title_match.merge(&other.title_match);
    }
}

/// Statistics from resolving a batch of bib entries
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResolveStats {
    pub entries_total: usize,
    /// Skipped because a previous run completed them
    pub entries_skipped_done: usize,
    pub resolved_by_arxiv_id: usize,
    pub resolved_by_doi: usize,
    pub resolved_by_reparse_title_match: usize,
    pub unresolved_no_title: usize,
    pub unresolved_no_title_match: usize,
    pub aborted_kb_timeout: usize,
    pub failed_transient: usize,
    /// Titles recovered through a reconstructed APS DOI
    pub aps_doi_rebounds: usize,
    pub doi_cache: CacheStats,
    pub timings: StrategyTimings,
}

impl ResolveStats {
    pub fn record(&mut self, outcome: Outcome) {
        self.entries_total += 1;
        match outcome {
            Outcome::ResolvedByArxivId => self.resolved_by_arxiv_id += 1,
            Outcome::ResolvedByDoi => self.resolved_by_doi += 1,
            Outcome::ResolvedByReparseTitleMatch => self.resolved_by_reparse_title_match += 1,
            Outcome::UnresolvedNoTitle => self.unresolved_no_title += 1,
            Outcome::UnresolvedNoTitleMatch => self.unresolved_no_title_match += 1,
            Outcome::AbortedKbTimeout => self.aborted_kb_timeout += 1,
            Outcome::FailedTransient => self.failed_transient += 1,
        }
    }

    pub fn resolved(&self) -> usize {
        self.resolved_by_arxiv_id + self.resolved_by_doi + self.resolved_by_reparse_title_match
    }

    pub fn merge(&mut self, other: &ResolveStats) {
        self.entries_total += other.entries_total;
        self.entries_skipped_done += other.entries_skipped_done;
        self.resolved_by_arxiv_id += other.resolved_by_arxiv_id;
        self.resolved_by_doi += other.resolved_by_doi;
        self.resolved_by_reparse_title_match += other.resolved_by_reparse_title_match;
        self.unresolved_no_title += other.unresolved_no_title;
        self.unresolved_no_title_match += other.unresolved_no_title_match;
        self.aborted_kb_timeout += other.aborted_kb_timeout;
        self.failed_transient += other.failed_transient;
        self.aps_doi_rebounds += other.aps_doi_rebounds;
        self.doi_cache.merge(&other.doi_cache);
        self.timings.merge(&other.timings);
    }

    /// One-line running summary for periodic progress logs
    pub fn progress_line(&self) -> String {
        format!(
            "{} entries: {} resolved (arxiv {}, doi {}, reparse {}), no title {}, no match {}, timeouts {}, transient {}",
            self.entries_total,
            self.resolved(),
            self.resolved_by_arxiv_id,
            self.resolved_by_doi,
            self.resolved_by_reparse_title_match,
            self.unresolved_no_title,
            self.unresolved_no_title_match,
            self.aborted_kb_timeout,
            self.failed_transient
        )
    }

    pub fn log_summary(&self, elapsed: Duration) {
        let pct = |n: usize| {
            if self.entries_total == 0 {
                0.0
            } else {
                100.0 * n as f64 / self.entries_total as f64
            }
        };

        info!("");
        info!("==================== FINAL SUMMARY ====================");
        info!("Total time: {}", format_elapsed(elapsed));
        info!("");
        info!("Entries:");
        info!("  Processed:                        {}", self.entries_total);
        info!("  Skipped (already done):           {}", self.entries_skipped_done);
        info!("");
        info!("Outcomes:");
        info!("  Resolved by arXiv ID:             {} ({:.1}%)", self.resolved_by_arxiv_id, pct(self.resolved_by_arxiv_id));
        info!("  Resolved by DOI:                  {} ({:.1}%)", self.resolved_by_doi, pct(self.resolved_by_doi));
        info!("  Resolved by re-parsed title:      {} ({:.1}%)", self.resolved_by_reparse_title_match, pct(self.resolved_by_reparse_title_match));
        info!("  Unresolved, no title:             {} ({:.1}%)", self.unresolved_no_title, pct(self.unresolved_no_title));
        info!("  Unresolved, no title match:       {} ({:.1}%)", self.unresolved_no_title_match, pct(self.unresolved_no_title_match));
        info!("  Aborted (KB timeout):             {}", self.aborted_kb_timeout);
        info!("  Failed (transient, will retry):   {}", self.failed_transient);
        info!("  APS DOI rebounds:                 {}", self.aps_doi_rebounds);
        info!("");
        info!("DOI title lookups:");
        info!("  Worker cache hits:                {}", self.doi_cache.cache_hits);
        info!("  Shared cache hits:                {}", self.doi_cache.shared_cache_hits);
        info!("  Live API calls:                   {}", self.doi_cache.live_calls);
        info!("");
        info!("Strategy timings (total / calls / mean):");
        for (name, t) in [
            ("arXiv snapshot", &self.timings.arxiv_snapshot),
            ("Crossref DOI", &self.timings.crossref_doi),
            ("Re-parse", &self.timings.reparse),
            ("Title match", &self.timings.title_match),
        ] {
            info!(
                "  {:<16} {:>10.2}s / {:>8} / {:.3}s",
                name,
                t.total_secs,
                t.calls,
                t.mean_secs()
            );
        }
        info!("========================================================");
    }
}
