use anyhow::{Context, Result};
use async_trait::async_trait;
use log::debug;
use reqwest::header::HeaderMap;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::extract::doi_cache_key;
use crate::kb::CanonicalStore;

/// Assumed when the server sends no `X-Rate-Limit-Limit`
const DEFAULT_RATE_LIMIT: f64 = 9001.0;
const DEFAULT_RATE_INTERVAL: &str = "1s";
/// Ceiling for a single rate-limit pause
pub const MAX_RATE_LIMIT_PAUSE: Duration = Duration::from_secs(3600);

/// DOI -> title metadata source
#[async_trait]
pub trait DoiTitleSource: Send + Sync {
    /// Title of the work registered under `doi`; `None` on any failure
    async fn fetch_title(&self, doi: &str) -> Option<String>;
}

/// Pause needed to keep to the server's cadence after a request that took `elapsed`.
///
/// `wait = interval / limit`; returns `None` when no pause is needed or the
/// headers are unparseable.
pub fn rate_limit_pause(limit: Option<&str>, interval: Option<&str>, elapsed: Duration) -> Option<Duration> {
    let limit: f64 = match limit {
        Some(l) => l.trim().parse().ok()?,
        None => DEFAULT_RATE_LIMIT,
    };
    let interval: f64 = interval
        .unwrap_or(DEFAULT_RATE_INTERVAL)
        .trim()
        .trim_end_matches('s')
        .parse()
        .ok()?;
    if limit <= 0.0 || interval < 0.0 || !interval.is_finite() {
        return None;
    }

    let wait = Duration::try_from_secs_f64(interval / limit).ok()?;
    if elapsed < wait {
        Some((wait - elapsed).min(MAX_RATE_LIMIT_PAUSE))
    } else {
        None
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

#[derive(Debug, Deserialize)]
struct WorkResponse {
    message: WorkMessage,
}

#[derive(Debug, Deserialize)]
struct WorkMessage {
    #[serde(default)]
    title: Vec<String>,
}

/// Client for the Crossref REST API (`GET /works/{doi}`)
pub struct CrossrefClient {
    client: Client,
    base_url: String,
    mailto: String,
}

impl CrossrefClient {
    pub fn new(base_url: &str, mailto: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("bibitem-linker/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build Crossref HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            mailto: mailto.to_string(),
        })
    }
}

#[async_trait]
impl DoiTitleSource for CrossrefClient {
    async fn fetch_title(&self, doi: &str) -> Option<String> {
        let url = format!("{}/works/{}", self.base_url, doi);
        let mut request = self.client.get(&url);
        if !self.mailto.is_empty() {
            request = request.query(&[("mailto", self.mailto.as_str())]);
        }

        let started = Instant::now();
        let response = match request.send().await {
            Ok(r) => r,
            Err(e) => {
                debug!("Crossref request failed for {}: {}", doi, e);
                return None;
            }
        };
        let elapsed = started.elapsed();

        let headers = response.headers();
        if let Some(pause) = rate_limit_pause(
            header_str(headers, "X-Rate-Limit-Limit"),
            header_str(headers, "X-Rate-Limit-Interval"),
            elapsed,
        ) {
            debug!("Crossref rate limit: sleeping {:?}", pause);
            tokio::time::sleep(pause).await;
        }

        if !response.status().is_success() {
            debug!("Crossref returned {} for {}", response.status(), doi);
            return None;
        }

        let body: WorkResponse = match response.json().await {
            Ok(b) => b,
            Err(e) => {
                debug!("Malformed Crossref response for {}: {}", doi, e);
                return None;
            }
        };

        body.message
            .title
            .into_iter()
            .map(|t| t.split_whitespace().collect::<Vec<_>>().join(" "))
            .find(|t| !t.is_empty())
    }
}

/// Efficiency counters for DOI title lookups
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Served from the worker-local cache
    pub cache_hits: usize,
    /// Served from the knowledge-base cache table
    pub shared_cache_hits: usize,
    /// Sent to the live API
    pub live_calls: usize,
}

impl CacheStats {
    pub fn merge(&mut self, other: &CacheStats) {
        self.cache_hits += other.cache_hits;
        self.shared_cache_hits += other.shared_cache_hits;
        self.live_calls += other.live_calls;
    }
}

/// Worker-local read-through DOI -> title cache.
///
/// Lookup order: this cache, the knowledge-base cache table, the live
/// source. Only successful lookups are cached.
#[derive(Debug, Default)]
pub struct CrossrefTitleCache {
    titles: HashMap<String, String>,
    pub stats: CacheStats,
}

impl CrossrefTitleCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.titles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.titles.is_empty()
    }

    pub async fn title_for(
        &mut self,
        doi: &str,
        source: &dyn DoiTitleSource,
        store: &dyn CanonicalStore,
    ) -> Option<String> {
        let key = doi_cache_key(doi);
        if let Some(title) = self.titles.get(&key) {
            self.stats.cache_hits += 1;
            return Some(title.clone());
        }

        match store.cached_doi_title(&key).await {
            Ok(Some(title)) => {
                self.stats.shared_cache_hits += 1;
                self.titles.insert(key, title.clone());
                return Some(title);
            }
            Ok(None) => {}
            Err(e) => debug!("DOI cache table lookup failed for {}: {}", key, e),
        }

        self.stats.live_calls += 1;
        let title = source.fetch_title(doi).await?;
        if let Err(e) = store.store_doi_title(&key, &title).await {
            debug!("DOI cache table insert failed for {}: {}", key, e);
        }
        self.titles.insert(key, title.clone());
        Some(title)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kb::MemoryCanonicalStore;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_rate_limit_pause() {
        // 50 requests per second: 20ms cadence
        let pause = rate_limit_pause(Some("50"), Some("1s"), Duration::from_millis(5)).unwrap();
        assert_eq!(pause, Duration::from_millis(15));

        assert_eq!(rate_limit_pause(Some("50"), Some("1s"), Duration::from_millis(30)), None);
    }

    #[test]
    fn test_rate_limit_defaults_are_permissive() {
        assert_eq!(rate_limit_pause(None, None, Duration::from_millis(1)), None);
    }

    #[test]
    fn test_rate_limit_pause_is_capped() {
        let pause = rate_limit_pause(Some("1"), Some("999999s"), Duration::ZERO).unwrap();
        assert_eq!(pause, MAX_RATE_LIMIT_PAUSE);
    }

    #[test]
    fn test_rate_limit_malformed_headers() {
        assert_eq!(rate_limit_pause(Some("many"), Some("1s"), Duration::ZERO), None);
        assert_eq!(rate_limit_pause(Some("0"), Some("1s"), Duration::ZERO), None);
        assert_eq!(rate_limit_pause(Some("10"), Some("soon"), Duration::ZERO), None);
    }

    #[tokio::test]
    async fn test_fetch_title() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/works/10.1007/jhep05.2013.093"))
            .and(query_param("mailto", "ops@example.org"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("X-Rate-Limit-Limit", "1000")
                    .insert_header("X-Rate-Limit-Interval", "1s")
                    .set_body_string(
                        r#"{"status":"ok","message":{"title":["Exact Results in D=2\n Supersymmetric Gauge Theories"]}}"#,
                    ),
            )
            .mount(&server)
            .await;

        let client = CrossrefClient::new(&server.uri(), "ops@example.org", Duration::from_secs(5)).unwrap();
        assert_eq!(
            client.fetch_title("10.1007/jhep05.2013.093").await.as_deref(),
            Some("Exact Results in D=2 Supersymmetric Gauge Theories")
        );
    }

    #[tokio::test]
    async fn test_fetch_title_failures_are_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/works/10.1234/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/works/10.1234/garbled"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/works/10.1234/untitled"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"message":{"title":[]}}"#))
            .mount(&server)
            .await;

        let client = CrossrefClient::new(&server.uri(), "", Duration::from_secs(5)).unwrap();
        assert_eq!(client.fetch_title("10.1234/missing").await, None);
        assert_eq!(client.fetch_title("10.1234/garbled").await, None);
        assert_eq!(client.fetch_title("10.1234/untitled").await, None);

        let unreachable = CrossrefClient::new("http://127.0.0.1:9", "", Duration::from_millis(200)).unwrap();
        assert_eq!(unreachable.fetch_title("10.1234/any").await, None);
    }

    struct CountingSource {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl DoiTitleSource for CountingSource {
        async fn fetch_title(&self, doi: &str) -> Option<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if doi.ends_with("missing") {
                None
            } else {
                Some(format!("Title of {}", doi))
            }
        }
    }

    #[tokio::test]
    async fn test_cache_serves_repeat_lookups() {
        let source = CountingSource { calls: AtomicUsize::new(0) };
        let store = MemoryCanonicalStore::new();
        let mut cache = CrossrefTitleCache::new();

        let first = cache.title_for("10.1234/A", &source, &store).await;
        let second = cache.title_for("10.1234/a", &source, &store).await;

        assert_eq!(first, second);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.stats.live_calls, 1);
        assert_eq!(cache.stats.cache_hits, 1);
    }

    #[tokio::test]
    async fn test_cache_uses_shared_table() {
        let source = CountingSource { calls: AtomicUsize::new(0) };
        let store = MemoryCanonicalStore::new();
        store.store_doi_title("10.1234/b", "Shared Title").await.unwrap();

        let mut cache = CrossrefTitleCache::new();
        assert_eq!(
            cache.title_for("10.1234/B", &source, &store).await.as_deref(),
            Some("Shared Title")
        );
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
        assert_eq!(cache.stats.shared_cache_hits, 1);
    }

    #[tokio::test]
    async fn test_cache_writes_through_and_skips_failures() {
        let source = CountingSource { calls: AtomicUsize::new(0) };
        let store = MemoryCanonicalStore::new();
        let mut cache = CrossrefTitleCache::new();

        cache.title_for("10.1234/c", &source, &store).await;
        assert_eq!(
            store.cached_doi_title("10.1234/c").await.unwrap().as_deref(),
            Some("Title of 10.1234/c")
        );

        assert_eq!(cache.title_for("10.1234/missing", &source, &store).await, None);
        assert_eq!(cache.title_for("10.1234/missing", &source, &store).await, None);
        assert_eq!(cache.stats.live_calls, 3);
        assert_eq!(cache.len(), 1);
    }
}
