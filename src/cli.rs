use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "bibitem-linker")]
#[command(about = "Resolve bibliography entries of parsed papers to canonical works and extract citation contexts")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Resolve bib entries of document shards to canonical knowledge-base works
    Resolve(ResolveArgs),

    /// Extract citation context windows for resolved citations
    Contexts(ContextsArgs),

    /// Build the partitioned arXiv title snapshot from an arXiv metadata dump
    Snapshot(SnapshotArgs),
}

/// Citation string parsing service flavour
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ReparserBackend {
    /// Neural ParsCit: JSON in, typed term list out
    Parscit,
    /// GROBID processCitation: form in, TEI XML out
    Grobid,
}

/// Context window size unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ContextUnit {
    Words,
    Sentences,
}

#[derive(Parser, Clone)]
pub struct ResolveArgs {
    /// Document shard (JSONL, optionally .gz) or a directory of shards
    #[arg(short, long, required = true)]
    pub input: String,

    /// Output directory for mappings, done logs, enriched shards and reports
    #[arg(short, long, required = true)]
    pub output: String,

    /// Knowledge base: postgres:// URL or path to a JSONL(.gz) dump of works
    #[arg(long, env = "BIBLINK_DATABASE_URL")]
    pub kb: String,

    /// Directory with the partitioned arXiv title snapshot
    #[arg(long, required = true)]
    pub snapshot: String,

    /// Number of worker threads (0 = number of CPU cores)
    #[arg(short, long, default_value = "0")]
    pub workers: usize,

    /// Citation string parsing service flavour
    #[arg(long, value_enum, default_value = "grobid")]
    pub reparser_backend: ReparserBackend,

    /// Citation string parsing service endpoint
    #[arg(long, env = "REPARSER_URL", default_value = "http://localhost:8070/api/processCitation")]
    pub reparser_url: String,

    /// Contact address sent to the Crossref API
    #[arg(long, env = "CROSSREF_MAILTO", default_value = "")]
    pub mailto: String,

    /// Crossref API base URL
    #[arg(long, env = "CROSSREF_API_URL", default_value = "https://api.crossref.org")]
    pub crossref_url: String,

    /// Timeout in seconds per external HTTP call
    #[arg(long, default_value = "30")]
    pub http_timeout: u64,

    /// Statement timeout in milliseconds per knowledge-base query
    #[arg(long, default_value = "60000")]
    pub statement_timeout: u64,

    /// Logging level (DEBUG, INFO, WARN, ERROR)
    #[arg(short, long, default_value = "INFO")]
    pub log_level: String,
}

#[derive(Parser, Clone)]
pub struct ContextsArgs {
    /// Mappings file produced by `resolve` or the resolve output directory
    #[arg(short, long, required = true)]
    pub mappings: String,

    /// Directory of plain-text documents named <in_doc>.txt
    #[arg(short, long, required = true)]
    pub texts: String,

    /// Output JSONL file with context windows
    #[arg(short, long, default_value = "contexts.jsonl")]
    pub output: String,

    /// Unit in which the window size is measured
    #[arg(long, value_enum, default_value = "sentences")]
    pub unit: ContextUnit,

    /// Window size in units
    #[arg(long, default_value = "3")]
    pub size: usize,

    /// Minimum number of contexts a cited work needs to be emitted
    #[arg(long, default_value = "1")]
    pub min_contexts: usize,

    /// Minimum number of citing documents a cited work needs to be emitted
    #[arg(long, default_value = "1")]
    pub min_citing_docs: usize,

    /// Do not insert the MAINCIT placeholder into rendered contexts
    #[arg(long, default_value = "false")]
    pub no_placeholder: bool,

    /// Number of worker threads (0 = number of CPU cores)
    #[arg(short, long, default_value = "0")]
    pub workers: usize,

    /// Logging level (DEBUG, INFO, WARN, ERROR)
    #[arg(short, long, default_value = "INFO")]
    pub log_level: String,
}

#[derive(Parser, Clone)]
pub struct SnapshotArgs {
    /// arXiv metadata snapshot (JSONL, optionally .gz)
    #[arg(short, long, required = true)]
    pub input: String,

    /// Output directory for the YYMM-partitioned Parquet files
    #[arg(short, long, required = true)]
    pub output: String,

    /// Rows buffered per partition before flushing to disk
    #[arg(long, default_value = "200000")]
    pub flush_threshold: usize,

    /// Logging level (DEBUG, INFO, WARN, ERROR)
    #[arg(short, long, default_value = "INFO")]
    pub log_level: String,
}
