use anyhow::{Context, Result};
use log::{debug, error, info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use super::done_log::DoneLog;
use super::shard::{bib_entries, read_documents, read_mappings, write_enriched, MappingWriter, ShardPaths, ShardReport};
use crate::common::{create_shard_progress_bar, shard_name, KbLocation, MappingRecord, ResolverConfig};
use crate::kb::{open_store, CanonicalStore, MemoryCanonicalStore};
use crate::providers::{build_reparser, CrossrefClient, ParquetSnapshot};
use crate::resolve::{Providers, ResolveStats, Resolver, WorkerState};

/// Entries between two progress lines of a shard
pub const PROGRESS_EVERY: usize = 1000;

/// `run_report.json`: all shards processed in one invocation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub shards_completed: Vec<String>,
    pub shards_failed: Vec<String>,
    pub elapsed_secs: f64,
    pub stats: ResolveStats,
}

impl RunReport {
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("Failed to serialize run report")?;
        fs::write(path, json).with_context(|| format!("Failed to write run report to {:?}", path))?;
        Ok(())
    }
}

/// Resolve every entry of one shard that is not yet in its done log.
///
/// Mappings are appended as entries complete; the enriched shard and its
/// report are written at the end.
pub async fn resolve_shard(
    shard_path: &Path,
    output_dir: &Path,
    resolver: &Resolver,
    run_id: &str,
) -> Result<ShardReport> {
    let started = Instant::now();
    let shard = shard_name(shard_path);
    let paths = ShardPaths::new(output_dir, &shard);

    let docs = read_documents(shard_path)?;
    let mut done = DoneLog::open(&paths.done_log)?;
    let mut mappings = MappingWriter::open(&paths.mappings)?;
    if !done.is_empty() {
        info!("[shard {}] resuming, {} entries already done", shard, done.len());
    }

    let mut state = WorkerState::new();
    let mut skipped = 0;
    let mut total_entries = 0;

    for doc in &docs {
        for entry in bib_entries(doc) {
            total_entries += 1;
            if done.contains(&entry.uuid) {
                skipped += 1;
                continue;
            }

            let resolution = resolver.resolve(&entry, &mut state).await;
            if resolution.outcome.marks_done() {
                mappings.write(&MappingRecord {
                    uuid: entry.uuid.clone(),
                    in_doc: entry.in_doc.clone(),
                    ids: resolution.ids,
                })?;
                done.mark_done(&entry.uuid)?;
            }

            if state.stats.entries_total % PROGRESS_EVERY == 0 {
                info!("[shard {}] {}", shard, state.stats.progress_line());
            }
        }
    }
    done.sync()?;

    let mut stats = state.into_stats();
    stats.entries_skipped_done = skipped;

    let all_mappings = read_mappings(&paths.mappings)?;
    write_enriched(&docs, &all_mappings, &paths.enriched)?;

    let report = ShardReport {
        run_id: run_id.to_string(),
        shard: shard.clone(),
        documents: docs.len(),
        bib_entries: total_entries,
        elapsed_secs: started.elapsed().as_secs_f64(),
        stats,
    };
    report.save(&paths.report)?;

    info!(
        "[shard {}] done: {} processed, {} skipped, {} resolved",
        shard,
        report.stats.entries_total,
        skipped,
        report.stats.resolved()
    );
    Ok(report)
}

/// Connect the providers one worker resolves against. A dump-backed
/// knowledge base is loaded once and passed in as `preloaded`.
pub async fn build_providers(
    config: &ResolverConfig,
    preloaded: Option<Arc<dyn CanonicalStore>>,
) -> Result<Providers> {
    let snapshot = ParquetSnapshot::open(&config.snapshot_dir)?;
    let crossref = CrossrefClient::new(&config.crossref_url, &config.mailto, config.http_timeout)?;
    let reparser = build_reparser(&config.reparser, config.http_timeout)?;
    let store = match preloaded {
        Some(store) => store,
        None => open_store(&config.kb, config.statement_timeout).await?,
    };

    Ok(Providers {
        snapshot: Arc::new(snapshot),
        crossref: Arc::new(crossref),
        reparser: Arc::from(reparser),
        store,
    })
}

/// One shard on its own single-threaded runtime with its own connections
fn run_one_shard(
    shard_path: &Path,
    output_dir: &Path,
    config: &ResolverConfig,
    preloaded: Option<Arc<dyn CanonicalStore>>,
    run_id: &str,
) -> Result<ShardReport> {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build worker runtime")?;

    rt.block_on(async {
        let providers = build_providers(config, preloaded).await?;
        let resolver = Resolver::new(providers);
        resolve_shard(shard_path, output_dir, &resolver, run_id).await
    })
}

/// Process `shards` on a pool of `workers` threads, one shard per task.
///
/// A failing shard is logged and listed in the report; the others continue.
pub fn run_shards(
    shards: &[PathBuf],
    output_dir: &Path,
    config: &ResolverConfig,
    workers: usize,
    run_id: &str,
) -> Result<RunReport> {
    let started = Instant::now();
    fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create output directory: {}", output_dir.display()))?;

    let preloaded: Option<Arc<dyn CanonicalStore>> = match &config.kb {
        KbLocation::Dump(path) => {
            info!("Loading knowledge base dump {}", path.display());
            let store = MemoryCanonicalStore::load(path)?;
            info!("Loaded {} canonical works", store.len());
            Some(Arc::new(store))
        }
        KbLocation::Postgres(_) => None,
    };

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .build()
        .context("Failed to build worker pool")?;

    let progress = create_shard_progress_bar(shards.len() as u64);
    let report = Mutex::new(RunReport {
        run_id: run_id.to_string(),
        ..Default::default()
    });

    pool.install(|| {
        shards.par_iter().for_each(|shard_path| {
            let name = shard_name(shard_path);
            debug!("[shard {}] starting", name);
            let result = run_one_shard(shard_path, output_dir, config, preloaded.clone(), run_id);

            let mut report = match report.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            match result {
                Ok(shard_report) => {
                    report.stats.merge(&shard_report.stats);
                    report.shards_completed.push(name);
                }
                Err(e) => {
                    error!("[shard {}] failed: {:#}", name, e);
                    report.shards_failed.push(name);
                }
            }
            progress.set_message(format!("{} resolved", report.stats.resolved()));
            progress.inc(1);
        });
    });
    progress.finish_with_message("All shards processed");

    let mut report = match report.into_inner() {
        Ok(r) => r,
        Err(poisoned) => poisoned.into_inner(),
    };
    report.shards_completed.sort();
    report.shards_failed.sort();
    report.elapsed_secs = started.elapsed().as_secs_f64();

    if !report.shards_failed.is_empty() {
        warn!("{} shard(s) failed; rerun to resume them", report.shards_failed.len());
    }
    report.save(&output_dir.join("run_report.json"))?;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_run_report_save() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("run_report.json");
        let report = RunReport {
            run_id: "abc".to_string(),
            shards_completed: vec!["chunk_1".to_string()],
            ..Default::default()
        };
        report.save(&path).unwrap();

        let loaded: RunReport = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(loaded.run_id, "abc");
        assert_eq!(loaded.shards_completed, vec!["chunk_1"]);
    }
}
