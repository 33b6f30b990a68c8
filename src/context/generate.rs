use anyhow::{Context, Result};
use lazy_static::lazy_static;
use log::{debug, warn};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::io::BufRead;
use std::path::{Path, PathBuf};

use super::adjacent::adjacent_citations;
use super::markers::{cite_marker, CITE_PATTERN};
use super::sentences::sentence_window;
use super::words::word_window;
use crate::cli::ContextUnit;
use crate::common::{open_jsonl, ContextWindow, MappingRecord};

lazy_static! {
    static ref WHITESPACE_RUN: Regex = Regex::new(r"\s+").unwrap();
}

const MAIN_PLACEHOLDER: &str = " MAINCIT ";
const OTHER_PLACEHOLDER: &str = " CIT ";

#[derive(Debug, Clone)]
pub struct ContextSettings {
    pub unit: ContextUnit,
    pub size: usize,
    pub min_contexts: usize,
    pub min_citing_docs: usize,
    pub with_placeholder: bool,
}

/// Output line: the window plus its rendered single-line text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextRecord {
    #[serde(flatten)]
    pub window: ContextWindow,
    pub context: String,
}

/// Which bib entries cite which canonical work
#[derive(Debug, Default)]
pub struct CitationGraph {
    /// uuid -> cited work
    pub uuid_to_work: HashMap<String, String>,
    /// cited work -> (uuid, citing document), sorted by document
    pub by_work: BTreeMap<String, Vec<(String, String)>>,
}

impl CitationGraph {
    pub fn from_records(records: impl IntoIterator<Item = MappingRecord>) -> Self {
        // last record for a uuid wins
        let mut latest: HashMap<String, MappingRecord> = HashMap::new();
        for record in records {
            latest.insert(record.uuid.clone(), record);
        }

        let mut graph = CitationGraph::default();
        for (uuid, record) in latest {
            let work = record.ids.open_alex_id;
            if work.is_empty() {
                continue;
            }
            graph.uuid_to_work.insert(uuid.clone(), work.clone());
            graph.by_work.entry(work).or_default().push((uuid, record.in_doc));
        }
        for citing in graph.by_work.values_mut() {
            citing.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        }
        graph
    }

    /// Read `*.mappings.jsonl` files; a directory is searched non-recursively
    pub fn load(path: &Path) -> Result<Self> {
        let files: Vec<PathBuf> = if path.is_dir() {
            let mut files = Vec::new();
            for entry in std::fs::read_dir(path)
                .with_context(|| format!("Failed to read directory: {}", path.display()))?
            {
                let p = entry?.path();
                if p.to_string_lossy().ends_with(".mappings.jsonl") {
                    files.push(p);
                }
            }
            files.sort();
            files
        } else {
            vec![path.to_path_buf()]
        };

        let mut records = Vec::new();
        for file in &files {
            for (line_no, line) in open_jsonl(file)?.lines().enumerate() {
                let line = line.with_context(|| format!("Failed to read {}", file.display()))?;
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<MappingRecord>(&line) {
                    Ok(record) => records.push(record),
                    Err(e) => warn!("{}:{}: unparseable mapping: {}", file.display(), line_no + 1, e),
                }
            }
        }
        Ok(Self::from_records(records))
    }

    /// Works cited by at least `min_citing` entries
    pub fn works_with_min_citations(&self, min_citing: usize) -> Vec<(&String, &Vec<(String, String)>)> {
        self.by_work
            .iter()
            .filter(|(_, citing)| citing.len() >= min_citing)
            .collect()
    }
}

/// Single-line rendering of a context: other markers become ` CIT `,
/// whitespace is collapsed
pub fn render_context(pre: &str, post: &str, with_placeholder: bool) -> String {
    let placeholder = if with_placeholder { MAIN_PLACEHOLDER } else { "" };
    let joined = format!("{}{}{}", pre, placeholder, post);
    let replaced = CITE_PATTERN.replace_all(&joined, OTHER_PLACEHOLDER);
    WHITESPACE_RUN.replace_all(&replaced, " ").trim().to_string()
}

/// Context window for the marker occupying `text[start..end]`
pub fn window_at(
    text: &str,
    start: usize,
    end: usize,
    cited_work: &str,
    citing_doc: &str,
    uuid_to_work: &HashMap<String, String>,
    settings: &ContextSettings,
) -> ContextRecord {
    let pre = &text[..start];
    let post = &text[end..];

    let mut adjacent = adjacent_citations(pre, uuid_to_work, true);
    adjacent.extend(adjacent_citations(post, uuid_to_work, false));

    let (pre_dist, post_dist) = match settings.unit {
        ContextUnit::Words => word_window(pre, post, settings.size),
        ContextUnit::Sentences => sentence_window(pre, post, settings.size),
    };
    let pre_text = &pre[pre.len() - pre_dist..];
    let post_text = &post[..post_dist];

    ContextRecord {
        context: render_context(pre_text, post_text, settings.with_placeholder),
        window: ContextWindow {
            cited_work_ref: cited_work.to_string(),
            citing_doc_id: citing_doc.to_string(),
            pre_text: pre_text.to_string(),
            post_text: post_text.to_string(),
            adjacent_citations: adjacent,
        },
    }
}

/// Contexts gathered for one cited work
#[derive(Debug, Default)]
pub struct WorkContexts {
    pub records: Vec<ContextRecord>,
    /// Citing documents in which at least one marker was found
    pub citing_docs: usize,
    pub missing_texts: usize,
}

impl WorkContexts {
    pub fn meets(&self, settings: &ContextSettings) -> bool {
        self.records.len() >= settings.min_contexts && self.citing_docs >= settings.min_citing_docs
    }
}

/// Read the citing documents of one work and cut a window at every marker
pub fn contexts_for_work(
    work: &str,
    citing: &[(String, String)],
    texts_dir: &Path,
    uuid_to_work: &HashMap<String, String>,
    settings: &ContextSettings,
) -> WorkContexts {
    let mut result = WorkContexts::default();

    for (uuid, in_doc) in citing {
        let path = texts_dir.join(format!("{}.txt", in_doc));
        let bytes = match std::fs::read(&path) {
            Ok(b) => b,
            Err(e) => {
                debug!("No text for {}: {}", in_doc, e);
                result.missing_texts += 1;
                continue;
            }
        };
        let text = String::from_utf8_lossy(&bytes);

        let marker = cite_marker(uuid);
        let before = result.records.len();
        for (start, m) in text.match_indices(&marker) {
            result.records.push(window_at(
                &text,
                start,
                start + m.len(),
                work,
                in_doc,
                uuid_to_work,
                settings,
            ));
        }
        if result.records.len() > before {
            result.citing_docs += 1;
        }
    }
    result
}
