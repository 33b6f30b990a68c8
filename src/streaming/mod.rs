pub mod done_log;
pub mod harness;
pub mod shard;
pub mod snapshot_writer;

pub use done_log::DoneLog;
pub use harness::{build_providers, resolve_shard, run_shards, RunReport, PROGRESS_EVERY};
pub use shard::{
    bib_entries, read_documents, read_mappings, write_enriched, MappingWriter, ShardPaths, ShardReport,
};
pub use snapshot_writer::SnapshotWriter;
