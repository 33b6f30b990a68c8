pub mod aps;
pub mod crossref;
pub mod reparse;
pub mod snapshot;

pub use aps::guess_aps_doi;
pub use crossref::{CacheStats, CrossrefClient, CrossrefTitleCache, DoiTitleSource};
pub use reparse::{build_reparser, CitationReparser, ReparsedCitation, TaggedSpan};
pub use snapshot::{partition_name, MemorySnapshot, ParquetSnapshot, SnapshotLookup};
