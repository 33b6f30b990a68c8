pub mod contexts;
pub mod resolve;
pub mod snapshot;

pub use contexts::{generate_contexts, run_contexts, ContextStats};
pub use resolve::run_resolve;
pub use snapshot::{build_snapshot, run_snapshot, SnapshotStats};
