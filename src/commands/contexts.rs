use anyhow::{Context, Result};
use crossbeam_channel::bounded;
use log::{debug, error, info};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Instant;

use crate::cli::ContextsArgs;
use crate::common::{create_count_progress_bar, format_elapsed, setup_logging};
use crate::context::{contexts_for_work, CitationGraph, ContextRecord, ContextSettings};

/// Statistics from a context generation run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContextStats {
    pub mapped_entries: usize,
    pub cited_works: usize,
    /// Works that passed the citing-entry pre-filter
    pub works_considered: usize,
    pub works_emitted: usize,
    pub contexts_written: usize,
    pub missing_texts: usize,
}

/// Generate context windows for every sufficiently cited work
pub fn generate_contexts(
    graph: &CitationGraph,
    texts_dir: &Path,
    settings: &ContextSettings,
    output: &Path,
) -> Result<ContextStats> {
    let candidates = graph.works_with_min_citations(settings.min_citing_docs);
    info!(
        "{} of {} cited works have at least {} citing entries",
        candidates.len(),
        graph.by_work.len(),
        settings.min_citing_docs
    );

    let (sender, receiver) = bounded::<Vec<ContextRecord>>(1024);

    let output_path = output.to_path_buf();
    let writer_thread = thread::spawn(move || -> Result<usize> {
        let file = File::create(&output_path)
            .with_context(|| format!("Failed to create output file: {}", output_path.display()))?;
        let mut writer = BufWriter::new(file);
        let mut count = 0;

        for records in receiver {
            for record in records {
                let line = serde_json::to_string(&record).context("Failed to serialize context")?;
                writeln!(writer, "{}", line).context("Failed to write to output file")?;
                count += 1;
                if count % 10000 == 0 {
                    writer.flush()?;
                }
            }
        }

        writer.flush()?;
        Ok(count)
    });

    let works_emitted = AtomicUsize::new(0);
    let missing_texts = AtomicUsize::new(0);
    let progress = create_count_progress_bar(candidates.len() as u64);

    candidates.par_iter().for_each(|(work, citing)| {
        let found = contexts_for_work(work, citing, texts_dir, &graph.uuid_to_work, settings);
        missing_texts.fetch_add(found.missing_texts, Ordering::Relaxed);

        if found.meets(settings) {
            works_emitted.fetch_add(1, Ordering::Relaxed);
            if sender.send(found.records).is_err() {
                debug!("Writer closed; dropping contexts for {}", work);
            }
        }
        progress.inc(1);
    });
    progress.finish_with_message("Context extraction complete");

    drop(sender);

    let contexts_written = match writer_thread.join() {
        Ok(Ok(count)) => count,
        Ok(Err(e)) => return Err(e.context("Context writer failed")),
        Err(e) => return Err(anyhow::anyhow!("Writer thread panicked: {:?}", e)),
    };

    Ok(ContextStats {
        mapped_entries: graph.uuid_to_work.len(),
        cited_works: graph.by_work.len(),
        works_considered: candidates.len(),
        works_emitted: works_emitted.load(Ordering::Relaxed),
        contexts_written,
        missing_texts: missing_texts.load(Ordering::Relaxed),
    })
}

/// Run the contexts command with the given arguments
pub fn run_contexts(args: ContextsArgs) -> Result<ContextStats> {
    let start_time = Instant::now();

    setup_logging(&args.log_level)?;

    info!("Starting citation context extraction");
    info!("Mappings: {}", args.mappings);
    info!("Texts: {}", args.texts);
    info!("Output: {}", args.output);
    info!("Window: {} {:?}", args.size, args.unit);

    let num_threads = if args.workers == 0 { num_cpus::get() } else { args.workers };
    if let Err(e) = rayon::ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .build_global()
    {
        error!("Failed to build thread pool: {}. Using default.", e);
    }

    let texts_dir = Path::new(&args.texts);
    if !texts_dir.is_dir() {
        return Err(anyhow::anyhow!("Text directory does not exist: {}", args.texts));
    }

    let graph = CitationGraph::load(Path::new(&args.mappings))?;
    info!(
        "Citation graph: {} mapped entries citing {} works",
        graph.uuid_to_work.len(),
        graph.by_work.len()
    );

    let settings = ContextSettings {
        unit: args.unit,
        size: args.size,
        min_contexts: args.min_contexts,
        min_citing_docs: args.min_citing_docs,
        with_placeholder: !args.no_placeholder,
    };

    let stats = generate_contexts(&graph, texts_dir, &settings, Path::new(&args.output))?;

    info!("==================== FINAL SUMMARY ====================");
    info!("Total execution time: {}", format_elapsed(start_time.elapsed()));
    info!("Mapped entries: {}", stats.mapped_entries);
    info!("Cited works: {}", stats.cited_works);
    info!("Works after citing-entry filter: {}", stats.works_considered);
    info!("Works emitted: {}", stats.works_emitted);
    info!("Contexts written: {}", stats.contexts_written);
    info!("Citing documents missing on disk: {}", stats.missing_texts);
    info!("Output file: {}", args.output);
    info!("========================================================");

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::ContextUnit;
    use crate::common::{MappingRecord, ResolvedIdentifiers};
    use tempfile::tempdir;

    fn mapping(uuid: &str, doc: &str, work: &str) -> MappingRecord {
        MappingRecord {
            uuid: uuid.to_string(),
            in_doc: doc.to_string(),
            ids: ResolvedIdentifiers {
                open_alex_id: work.to_string(),
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_generate_contexts_applies_thresholds() {
        let dir = tempdir().unwrap();
        let texts = dir.path().join("texts");
        std::fs::create_dir(&texts).unwrap();
        std::fs::write(texts.join("d1.txt"), "We follow {{cite:a1}}. Then {{cite:b1}} too.").unwrap();
        std::fs::write(texts.join("d2.txt"), "As in {{cite:a2}}, it holds.").unwrap();

        let graph = CitationGraph::from_records(vec![
            mapping("a1", "d1", "WA"),
            mapping("a2", "d2", "WA"),
            mapping("b1", "d1", "WB"),
        ]);
        let settings = ContextSettings {
            unit: ContextUnit::Sentences,
            size: 1,
            min_contexts: 2,
            min_citing_docs: 2,
            with_placeholder: true,
        };
        let output = dir.path().join("contexts.jsonl");

        let stats = generate_contexts(&graph, &texts, &settings, &output).unwrap();
        assert_eq!(stats.cited_works, 2);
        assert_eq!(stats.works_considered, 1);
        assert_eq!(stats.works_emitted, 1);
        assert_eq!(stats.contexts_written, 2);

        let lines: Vec<ContextRecord> = std::fs::read_to_string(&output)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert!(lines.iter().all(|r| r.window.cited_work_ref == "WA"));
        assert!(lines.iter().any(|r| r.context == "We follow MAINCIT ."));
    }

    #[test]
    fn test_generate_contexts_fails_when_output_unwritable() {
        let dir = tempdir().unwrap();
        let texts = dir.path().join("texts");
        std::fs::create_dir(&texts).unwrap();
        std::fs::write(texts.join("d1.txt"), "See {{cite:a1}} for details.").unwrap();

        let graph = CitationGraph::from_records(vec![mapping("a1", "d1", "WA")]);
        let settings = ContextSettings {
            unit: ContextUnit::Words,
            size: 4,
            min_contexts: 1,
            min_citing_docs: 1,
            with_placeholder: true,
        };
        let output = dir.path().join("missing").join("nested").join("contexts.jsonl");

        let result = generate_contexts(&graph, &texts, &settings, &output);
        assert!(result.is_err());
        assert!(!output.exists());
    }
}
