use anyhow::{Context, Result};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::io::BufRead;
use std::path::Path;
use std::time::Instant;

use crate::cli::SnapshotArgs;
use crate::common::{create_spinner, format_elapsed, open_jsonl, setup_logging};
use crate::streaming::SnapshotWriter;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SnapshotStats {
    pub lines_read: usize,
    pub records_written: usize,
    pub malformed_lines: usize,
    /// Records without a title or without a derivable year/month
    pub records_skipped: usize,
    pub partitions: usize,
}

#[derive(Deserialize)]
struct ArxivMetadata {
    id: Option<String>,
    title: Option<String>,
}

/// Convert an arXiv metadata JSONL(.gz) dump into the partitioned title snapshot
pub fn build_snapshot(input: &Path, output: &Path, flush_threshold: usize) -> Result<SnapshotStats> {
    let mut writer = SnapshotWriter::new(output, flush_threshold)?;
    let mut stats = SnapshotStats::default();
    let progress = create_spinner("Reading arXiv metadata...");

    for line in open_jsonl(input)?.lines() {
        let line = line.with_context(|| format!("Failed to read {}", input.display()))?;
        if line.trim().is_empty() {
            continue;
        }
        stats.lines_read += 1;

        let record: ArxivMetadata = match serde_json::from_str(&line) {
            Ok(r) => r,
            Err(e) => {
                debug!("Malformed metadata line {}: {}", stats.lines_read, e);
                stats.malformed_lines += 1;
                continue;
            }
        };

        let (Some(id), Some(title)) = (record.id, record.title) else {
            stats.records_skipped += 1;
            continue;
        };
        if title.trim().is_empty() || !writer.write(id.trim(), &title)? {
            stats.records_skipped += 1;
            continue;
        }
        stats.records_written += 1;

        if stats.lines_read % 100_000 == 0 {
            progress.set_message(format!("{} records written", stats.records_written));
        }
    }
    progress.finish_with_message("Metadata read");

    writer.flush_all()?;
    stats.partitions = writer.partition_count();
    Ok(stats)
}

/// Run the snapshot command with the given arguments
pub fn run_snapshot(args: SnapshotArgs) -> Result<SnapshotStats> {
    let start_time = Instant::now();

    setup_logging(&args.log_level)?;

    info!("Building arXiv title snapshot");
    info!("Input: {}", args.input);
    info!("Output: {}", args.output);

    if !Path::new(&args.input).exists() {
        return Err(anyhow::anyhow!("Input file does not exist: {}", args.input));
    }

    let stats = build_snapshot(Path::new(&args.input), Path::new(&args.output), args.flush_threshold)?;
    if stats.malformed_lines > 0 {
        warn!("{} malformed lines skipped", stats.malformed_lines);
    }

    info!("==================== FINAL SUMMARY ====================");
    info!("Total execution time: {}", format_elapsed(start_time.elapsed()));
    info!("Lines read: {}", stats.lines_read);
    info!("Records written: {}", stats.records_written);
    info!("Records skipped: {}", stats.records_skipped);
    info!("Partitions: {}", stats.partitions);
    info!("Output directory: {}", args.output);
    info!("========================================================");

    Ok(stats)
}
