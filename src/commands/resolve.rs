use anyhow::Result;
use log::info;
use std::path::Path;
use std::time::Instant;
use uuid::Uuid;

use crate::cli::ResolveArgs;
use crate::common::{collect_jsonl_files, setup_logging, ResolverConfig};
use crate::resolve::ResolveStats;
use crate::streaming::run_shards;

/// Run the resolve command with the given arguments
pub fn run_resolve(args: ResolveArgs) -> Result<ResolveStats> {
    let start_time = Instant::now();

    setup_logging(&args.log_level)?;

    info!("Starting bib entry resolution");
    info!("Input: {}", args.input);
    info!("Output: {}", args.output);
    info!("Snapshot: {}", args.snapshot);

    let input = Path::new(&args.input);
    if !input.exists() {
        return Err(anyhow::anyhow!("Input does not exist: {}", args.input));
    }

    let num_workers = if args.workers == 0 {
        let cores = num_cpus::get();
        info!("Auto-detected {} CPU cores. Using {} workers.", cores, cores);
        cores
    } else {
        info!("Using specified {} workers.", args.workers);
        args.workers
    };

    let config = ResolverConfig::from_args(&args);
    let shards = collect_jsonl_files(input)?;
    info!("Found {} shard(s)", shards.len());

    let run_id = Uuid::new_v4().to_string();
    info!("Run ID: {}", run_id);

    let report = run_shards(&shards, Path::new(&args.output), &config, num_workers, &run_id)?;

    report.stats.log_summary(start_time.elapsed());
    info!("Shards completed: {}", report.shards_completed.len());
    if !report.shards_failed.is_empty() {
        info!("Shards failed: {}", report.shards_failed.join(", "));
    }
    info!("Output directory: {}", args.output);

    Ok(report.stats)
}
