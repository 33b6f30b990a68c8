use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{debug, info};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{PgPool, Row};
use std::str::FromStr;
use std::time::Duration;

use super::{CanonicalStore, StoreError};
use crate::common::{CanonicalWork, IdentifierBundle};
use crate::extract::doi_cache_key;

/// Postgres error code for `query_canceled`, raised when statement_timeout fires
const QUERY_CANCELED: &str = "57014";

/// Connections per worker; the cascade issues one statement at a time
const MAX_CONNECTIONS: u32 = 2;

fn map_sqlx_error(e: sqlx::Error) -> StoreError {
    match &e {
        sqlx::Error::Database(db) if db.code().as_deref() == Some(QUERY_CANCELED) => {
            StoreError::Timeout
        }
        _ => StoreError::Backend(e.to_string()),
    }
}

/// Knowledge base backed by PostgreSQL.
///
/// Expects a `works` table (`normalized_title`, `authors text[]`,
/// `citation_count`, `openalex_id`, `pubmed_id`, `pmc_id`, `doi`,
/// `arxiv_id`, `discipline`) indexed on `normalized_title`, and a
/// `doi_title_cache (doi text primary key, title text)` table.
pub struct PgCanonicalStore {
    pool: PgPool,
}

impl PgCanonicalStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect with `statement_timeout` applied to every session
    pub async fn connect(url: &str, statement_timeout: Duration) -> Result<Self> {
        let options = PgConnectOptions::from_str(url)
            .context("Invalid knowledge base URL")?
            .options([("statement_timeout", statement_timeout.as_millis().to_string())]);

        let pool = PgPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .acquire_timeout(statement_timeout)
            .connect_with(options)
            .await
            .context("Failed to connect to knowledge base")?;

        info!(
            "Connected to knowledge base (statement timeout {} ms)",
            statement_timeout.as_millis()
        );
        Ok(Self::new(pool))
    }
}

#[async_trait]
impl CanonicalStore for PgCanonicalStore {
    async fn works_by_title(&self, normalized_title: &str) -> Result<Vec<CanonicalWork>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT normalized_title, authors, citation_count,
                   openalex_id, pubmed_id, pmc_id, doi, arxiv_id, discipline
            FROM works
            WHERE normalized_title = $1
            "#,
        )
        .bind(normalized_title)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        let works = rows
            .into_iter()
            .map(|r| {
                let text = |name: &str| -> String {
                    r.try_get::<Option<String>, _>(name)
                        .ok()
                        .flatten()
                        .unwrap_or_default()
                };
                CanonicalWork {
                    normalized_title: text("normalized_title"),
                    authors: r
                        .try_get::<Option<Vec<String>>, _>("authors")
                        .ok()
                        .flatten()
                        .unwrap_or_default(),
                    citation_count: r
                        .try_get::<Option<i64>, _>("citation_count")
                        .ok()
                        .flatten()
                        .unwrap_or(0)
                        .max(0) as u64,
                    ids: IdentifierBundle {
                        openalex: text("openalex_id"),
                        pubmed: text("pubmed_id"),
                        pmc: text("pmc_id"),
                        doi: text("doi"),
                        arxiv: text("arxiv_id"),
                    },
                    discipline: text("discipline"),
                }
            })
            .collect::<Vec<_>>();

        debug!("{} candidates for title '{}'", works.len(), normalized_title);
        Ok(works)
    }

    async fn cached_doi_title(&self, doi: &str) -> Result<Option<String>, StoreError> {
        let row = sqlx::query("SELECT title FROM doi_title_cache WHERE doi = $1")
            .bind(doi_cache_key(doi))
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.and_then(|r| r.try_get::<Option<String>, _>("title").ok().flatten()))
    }

    async fn store_doi_title(&self, doi: &str, title: &str) -> Result<(), StoreError> {
        let result = sqlx::query("INSERT INTO doi_title_cache (doi, title) VALUES ($1, $2)")
            .bind(doi_cache_key(doi))
            .bind(title)
            .execute(&self.pool)
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                debug!("DOI {} already cached by another worker", doi);
                Ok(())
            }
            Err(e) => Err(map_sqlx_error(e)),
        }
    }
}
