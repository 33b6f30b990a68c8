use anyhow::{Context, Result};
use async_trait::async_trait;
use log::debug;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::cli::ReparserBackend;
use crate::common::ReparserConfig;

/// One typed span of a parsed citation string
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaggedSpan {
    pub entity: String,
    pub term: String,
}

impl TaggedSpan {
    fn new(entity: &str, term: &str) -> Self {
        Self {
            entity: entity.to_string(),
            term: term.to_string(),
        }
    }
}

/// Structured view of a raw citation string recovered by a parsing service
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReparsedCitation {
    pub title: Option<String>,
    pub journal: Option<String>,
    /// All typed spans in service order
    pub terms: Vec<TaggedSpan>,
}

impl ReparsedCitation {
    fn from_terms(terms: Vec<TaggedSpan>) -> Self {
        let join = |entity: &str| -> Option<String> {
            let parts: Vec<&str> = terms
                .iter()
                .filter(|t| t.entity == entity)
                .map(|t| t.term.trim())
                .filter(|t| !t.is_empty())
                .collect();
            if parts.is_empty() {
                None
            } else {
                Some(parts.join(" "))
            }
        };
        Self {
            title: join("title"),
            journal: join("journal"),
            terms,
        }
    }
}

/// Remote citation-string parser.
///
/// `None` means the service could not be used (unreachable, timeout, bad
/// status, unreadable body). A usable answer without a title is
/// `Some` with `title == None`.
#[async_trait]
pub trait CitationReparser: Send + Sync {
    async fn reparse(&self, raw: &str) -> Option<ReparsedCitation>;
}

fn http_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .context("Failed to build re-parser HTTP client")
}

/// Build the client for the configured backend
pub fn build_reparser(config: &ReparserConfig, timeout: Duration) -> Result<Box<dyn CitationReparser>> {
    Ok(match config.backend {
        ReparserBackend::Parscit => Box::new(ParsCitClient::new(&config.url, timeout)?),
        ReparserBackend::Grobid => Box::new(GrobidClient::new(&config.url, timeout)?),
    })
}

#[derive(Debug, Deserialize)]
struct ParsCitResponse {
    #[serde(default)]
    data: Vec<TaggedSpan>,
}

/// Neural ParsCit: `{"string": ...}` in, `{"data": [{"entity", "term"}]}` out
pub struct ParsCitClient {
    client: Client,
    url: String,
}

impl ParsCitClient {
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            url: url.to_string(),
        })
    }
}

#[async_trait]
impl CitationReparser for ParsCitClient {
    async fn reparse(&self, raw: &str) -> Option<ReparsedCitation> {
        let response = self
            .client
            .post(&self.url)
            .json(&serde_json::json!({ "string": raw }))
            .send()
            .await
            .map_err(|e| debug!("ParsCit request failed: {}", e))
            .ok()?;

        if !response.status().is_success() {
            debug!("ParsCit returned {}", response.status());
            return None;
        }

        let body: ParsCitResponse = response
            .json()
            .await
            .map_err(|e| debug!("Malformed ParsCit response: {}", e))
            .ok()?;
        Some(ReparsedCitation::from_terms(body.data))
    }
}

/// GROBID `processCitation`: form field `citations`, TEI XML out
pub struct GrobidClient {
    client: Client,
    url: String,
}

impl GrobidClient {
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            url: url.to_string(),
        })
    }
}

#[async_trait]
impl CitationReparser for GrobidClient {
    async fn reparse(&self, raw: &str) -> Option<ReparsedCitation> {
        let response = self
            .client
            .post(&self.url)
            .header("Accept", "application/xml")
            .form(&[("citations", raw)])
            .send()
            .await
            .map_err(|e| debug!("GROBID request failed: {}", e))
            .ok()?;

        // 204: GROBID found nothing to parse
        if response.status() == reqwest::StatusCode::NO_CONTENT {
            return Some(ReparsedCitation::default());
        }
        if !response.status().is_success() {
            debug!("GROBID returned {}", response.status());
            return None;
        }

        let body = response
            .text()
            .await
            .map_err(|e| debug!("GROBID body unreadable: {}", e))
            .ok()?;
        parse_tei_citation(&body)
    }
}

fn attr(e: &BytesStart, name: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == name)
        .and_then(|a| a.unescape_value().ok().map(|v| v.to_string()))
}

/// Span kind a TEI element contributes, if any
fn span_kind(e: &BytesStart) -> Option<&'static str> {
    match e.name().as_ref() {
        b"title" => {
            let level = attr(e, b"level");
            let kind = attr(e, b"type");
            match (level.as_deref(), kind.as_deref()) {
                (Some("j"), _) => Some("journal"),
                (_, Some("main")) => Some("title"),
                (_, None) => Some("fallback_title"),
                _ => None,
            }
        }
        b"biblScope" => match attr(e, b"unit").as_deref() {
            Some("volume") => Some("volume"),
            Some("issue") => Some("issue"),
            Some("page") => Some("pages"),
            _ => None,
        },
        b"date" => Some("date"),
        b"surname" => Some("author"),
        _ => None,
    }
}

/// Value carried in attributes of an empty element (`<date when=".."/>`, `<biblScope from=".."/>`)
fn empty_value(e: &BytesStart) -> Option<String> {
    attr(e, b"when").or_else(|| attr(e, b"from"))
}

/// Extract typed spans from a GROBID TEI `<biblStruct>`.
///
/// `<title level="a" type="main">` is the title; a `<title>` without a type
/// (other than a journal title) is used when no main title is present.
pub fn parse_tei_citation(xml: &str) -> Option<ReparsedCitation> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut spans: Vec<TaggedSpan> = Vec::new();
    let mut current: Option<(&'static str, String, Vec<u8>, Option<String>)> = None;
    let mut depth = 0usize;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                if current.is_some() {
                    depth += 1;
                } else if let Some(kind) = span_kind(&e) {
                    current = Some((kind, String::new(), e.name().as_ref().to_vec(), empty_value(&e)));
                    depth = 0;
                }
            }
            Ok(Event::Empty(e)) => {
                if current.is_none() {
                    if let (Some(kind), Some(value)) = (span_kind(&e), empty_value(&e)) {
                        spans.push(TaggedSpan::new(kind, &value));
                    }
                }
            }
            Ok(Event::Text(e)) => {
                if let Some((_, text, _, _)) = current.as_mut() {
                    let chunk = e.unescape().unwrap_or_default();
                    if !text.is_empty() {
                        text.push(' ');
                    }
                    text.push_str(&chunk);
                }
            }
            Ok(Event::End(e)) => {
                if current.is_some() && depth > 0 {
                    depth -= 1;
                } else if let Some((kind, text, name, attr_value)) = current.take() {
                    if e.name().as_ref() == name.as_slice() {
                        let value = if text.trim().is_empty() {
                            attr_value.unwrap_or_default()
                        } else {
                            text
                        };
                        if !value.trim().is_empty() {
                            spans.push(TaggedSpan::new(kind, value.trim()));
                        }
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                debug!("Malformed GROBID TEI: {}", e);
                return None;
            }
            _ => {}
        }
        buf.clear();
    }

    let has_main_title = spans.iter().any(|s| s.entity == "title");
    let terms = spans
        .into_iter()
        .filter_map(|mut s| {
            if s.entity == "fallback_title" {
                if has_main_title {
                    return None;
                }
                s.entity = "title".to_string();
            }
            Some(s)
        })
        .collect();

    Some(ReparsedCitation::from_terms(terms))
}
