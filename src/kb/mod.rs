pub mod memory;
pub mod postgres;

pub use memory::MemoryCanonicalStore;
pub use postgres::PgCanonicalStore;

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::common::{CanonicalWork, KbLocation};

/// Failures at the knowledge-base boundary.
///
/// Not-found is never an error here: an empty candidate list or `None`
/// is returned instead.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The statement exceeded its time budget
    #[error("knowledge base statement timed out")]
    Timeout,

    /// Any other backend failure (connection loss, protocol error, ...)
    #[error("knowledge base error: {0}")]
    Backend(String),
}

/// Read-mostly access to canonical works plus the shared DOI -> title cache table
#[async_trait]
pub trait CanonicalStore: Send + Sync {
    /// All works whose normalized title equals `normalized_title` exactly
    async fn works_by_title(&self, normalized_title: &str) -> Result<Vec<CanonicalWork>, StoreError>;

    async fn cached_doi_title(&self, doi: &str) -> Result<Option<String>, StoreError>;

    /// Insert into the cache table; a concurrent insert of the same DOI is not an error
    async fn store_doi_title(&self, doi: &str, title: &str) -> Result<(), StoreError>;
}

/// Open the knowledge base named by `location`
pub async fn open_store(
    location: &KbLocation,
    statement_timeout: Duration,
) -> Result<Arc<dyn CanonicalStore>> {
    match location {
        KbLocation::Postgres(url) => {
            let store = PgCanonicalStore::connect(url, statement_timeout).await?;
            Ok(Arc::new(store))
        }
        KbLocation::Dump(path) => {
            let store = MemoryCanonicalStore::load(path)?;
            Ok(Arc::new(store))
        }
    }
}
