use std::path::PathBuf;
use std::time::Duration;

use crate::cli::{ReparserBackend, ResolveArgs};

/// Where the canonical knowledge base lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KbLocation {
    /// PostgreSQL connection URL
    Postgres(String),
    /// JSONL(.gz) dump of canonical works, loaded into memory
    Dump(PathBuf),
}

impl KbLocation {
    pub fn parse(value: &str) -> Self {
        if value.starts_with("postgres://") || value.starts_with("postgresql://") {
            KbLocation::Postgres(value.to_string())
        } else {
            KbLocation::Dump(PathBuf::from(value))
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReparserConfig {
    pub backend: ReparserBackend,
    pub url: String,
}

/// Settings shared by every resolution worker, built once from the CLI
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    pub kb: KbLocation,
    pub snapshot_dir: PathBuf,
    pub crossref_url: String,
    pub mailto: String,
    pub reparser: ReparserConfig,
    pub http_timeout: Duration,
    pub statement_timeout: Duration,
}

impl ResolverConfig {
    pub fn from_args(args: &ResolveArgs) -> Self {
        Self {
            kb: KbLocation::parse(&args.kb),
            snapshot_dir: PathBuf::from(&args.snapshot),
            crossref_url: args.crossref_url.trim_end_matches('/').to_string(),
            mailto: args.mailto.clone(),
            reparser: ReparserConfig {
                backend: args.reparser_backend,
                url: args.reparser_url.clone(),
            },
            http_timeout: Duration::from_secs(args.http_timeout),
            statement_timeout: Duration::from_millis(args.statement_timeout),
        }
    }
}
