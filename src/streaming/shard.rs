use anyhow::{Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::common::{open_jsonl, BibEntry, MappingRecord, ResolvedIdentifiers};
use crate::resolve::ResolveStats;

/// Files a shard produces inside the output directory
#[derive(Debug, Clone)]
pub struct ShardPaths {
    pub mappings: PathBuf,
    pub done_log: PathBuf,
    pub enriched: PathBuf,
    pub report: PathBuf,
}

impl ShardPaths {
    pub fn new(output_dir: &Path, shard: &str) -> Self {
        Self {
            mappings: output_dir.join(format!("{}.mappings.jsonl", shard)),
            done_log: output_dir.join(format!("{}.done.log", shard)),
            enriched: output_dir.join(format!("{}.jsonl", shard)),
            report: output_dir.join(format!("{}.report.json", shard)),
        }
    }
}

/// Read every document of a shard; unparseable lines are skipped with a warning
pub fn read_documents(path: &Path) -> Result<Vec<Value>> {
    let mut docs = Vec::new();
    for (line_no, line) in open_jsonl(path)?.lines().enumerate() {
        let line = line.with_context(|| format!("Failed to read {}", path.display()))?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Value>(&line) {
            Ok(doc) => docs.push(doc),
            Err(e) => warn!("{}:{}: skipping malformed document: {}", path.display(), line_no + 1, e),
        }
    }
    Ok(docs)
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str())
            .map(|s| s.to_string())
            .collect(),
        _ => Vec::new(),
    }
}

/// Bib entries of one document, in the document's key order
pub fn bib_entries(doc: &Value) -> Vec<BibEntry> {
    let Some(in_doc) = doc.get("paper_id").and_then(|v| match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }) else {
        return Vec::new();
    };
    let Some(Value::Object(entries)) = doc.get("bib_entries") else {
        return Vec::new();
    };

    entries
        .iter()
        .map(|(uuid, entry)| BibEntry {
            uuid: uuid.clone(),
            in_doc: in_doc.clone(),
            raw_string: entry
                .get("bib_entry_raw")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            embedded_arxiv_ids: string_list(entry.get("contained_arXiv_ids")),
            embedded_links: string_list(entry.get("contained_links")),
        })
        .collect()
}

/// Append-only writer for `<shard>.mappings.jsonl`
pub struct MappingWriter {
    writer: BufWriter<File>,
    written: usize,
}

impl MappingWriter {
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open mappings file: {:?}", path))?;
        Ok(Self {
            writer: BufWriter::new(file),
            written: 0,
        })
    }

    /// Write one record and flush it
    pub fn write(&mut self, record: &MappingRecord) -> Result<()> {
        let line = serde_json::to_string(record).context("Failed to serialize mapping")?;
        writeln!(self.writer, "{}", line).context("Failed to write mapping")?;
        self.writer.flush().context("Failed to flush mappings file")?;
        self.written += 1;
        Ok(())
    }

    pub fn written(&self) -> usize {
        self.written
    }
}

/// uuid -> identifiers from a mappings file; the last line for a uuid wins
pub fn read_mappings(path: &Path) -> Result<HashMap<String, ResolvedIdentifiers>> {
    let mut mappings = HashMap::new();
    if !path.exists() {
        return Ok(mappings);
    }
    let file = File::open(path).with_context(|| format!("Failed to open mappings: {:?}", path))?;
    for line in BufReader::new(file).lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<MappingRecord>(&line) {
            Ok(record) => {
                mappings.insert(record.uuid, record.ids);
            }
            // a crash can leave a torn final line
            Err(e) => warn!("Skipping unreadable mapping line in {:?}: {}", path, e),
        }
    }
    Ok(mappings)
}

/// Write `docs` with every bib entry carrying its `ids` and `discipline`.
/// Entries without a mapping get empty identifiers.
pub fn write_enriched(
    docs: &[Value],
    mappings: &HashMap<String, ResolvedIdentifiers>,
    path: &Path,
) -> Result<usize> {
    let file = File::create(path).with_context(|| format!("Failed to create enriched shard: {:?}", path))?;
    let mut writer = BufWriter::new(file);
    let empty = ResolvedIdentifiers::default();
    let mut count = 0;

    for doc in docs {
        let mut doc = doc.clone();
        if let Some(Value::Object(entries)) = doc.get_mut("bib_entries") {
            for (uuid, entry) in entries.iter_mut() {
                let ids = mappings.get(uuid).unwrap_or(&empty);
                if let Value::Object(fields) = entry {
                    enrich_entry(fields, ids)?;
                }
            }
        }
        let line = serde_json::to_string(&doc).context("Failed to serialize document")?;
        writeln!(writer, "{}", line)?;
        count += 1;
    }
    writer.flush()?;
    Ok(count)
}

fn enrich_entry(fields: &mut Map<String, Value>, ids: &ResolvedIdentifiers) -> Result<()> {
    fields.insert("ids".to_string(), serde_json::to_value(ids)?);
    fields.insert("discipline".to_string(), Value::String(ids.discipline.clone()));
    Ok(())
}

/// `<shard>.report.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShardReport {
    pub run_id: String,
    pub shard: String,
    pub documents: usize,
    pub bib_entries: usize,
    pub elapsed_secs: f64,
    pub stats: ResolveStats,
}

impl ShardReport {
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("Failed to serialize shard report")?;
        std::fs::write(path, json).with_context(|| format!("Failed to write report to {:?}", path))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn doc() -> Value {
        json!({
            "paper_id": "1301.0001",
            "title": "kept verbatim",
            "bib_entries": {
                "u1": {
                    "bib_entry_raw": "N. Doroud et al., arXiv:1206.2606 [hep-th].",
                    "contained_arXiv_ids": ["1206.2606"],
                    "contained_links": []
                },
                "u2": {
                    "bib_entry_raw": "Some reference",
                    "contained_links": ["http://dx.doi.org/10.1007/JHEP05(2013)093"]
                }
            }
        })
    }

    #[test]
    fn test_bib_entries() {
        let entries = bib_entries(&doc());
        assert_eq!(entries.len(), 2);
        let u1 = entries.iter().find(|e| e.uuid == "u1").unwrap();
        assert_eq!(u1.in_doc, "1301.0001");
        assert_eq!(u1.embedded_arxiv_ids, vec!["1206.2606"]);
        let u2 = entries.iter().find(|e| e.uuid == "u2").unwrap();
        assert!(u2.embedded_arxiv_ids.is_empty());
        assert_eq!(u2.embedded_links.len(), 1);
    }

    #[test]
    fn test_bib_entries_without_paper_id() {
        assert!(bib_entries(&json!({"bib_entries": {"u": {}}})).is_empty());
    }

    #[test]
    fn test_mappings_last_line_wins() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("s.mappings.jsonl");

        let mut writer = MappingWriter::open(&path).unwrap();
        for work in ["https://openalex.org/W1", "https://openalex.org/W2"] {
            writer
                .write(&MappingRecord {
                    uuid: "u1".to_string(),
                    in_doc: "d".to_string(),
                    ids: ResolvedIdentifiers {
                        open_alex_id: work.to_string(),
                        ..Default::default()
                    },
                })
                .unwrap();
        }
        assert_eq!(writer.written(), 2);

        let mappings = read_mappings(&path).unwrap();
        assert_eq!(mappings["u1"].open_alex_id, "https://openalex.org/W2");
    }

    #[test]
    fn test_read_mappings_tolerates_torn_line() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("s.mappings.jsonl");
        std::fs::write(&path, "{\"uuid\":\"u1\",\"in_doc\":\"d\",\"ids\":{\"open_alex_id\":\"\",\"semantic_open_alex_id\":\"\",\"pubmed_id\":\"\",\"pmc_id\":\"\",\"doi\":\"\",\"arxiv_id\":\"\",\"discipline\":\"\"}}\n{\"uuid\":\"u2\",\"in").unwrap();
        let mappings = read_mappings(&path).unwrap();
        assert_eq!(mappings.len(), 1);
    }

    #[test]
    fn test_write_enriched() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("s.jsonl");

        let mut mappings = HashMap::new();
        mappings.insert(
            "u1".to_string(),
            ResolvedIdentifiers {
                open_alex_id: "https://openalex.org/W1".to_string(),
                discipline: "Physics".to_string(),
                ..Default::default()
            },
        );

        assert_eq!(write_enriched(&[doc()], &mappings, &path).unwrap(), 1);

        let written: Value = serde_json::from_str(std::fs::read_to_string(&path).unwrap().trim()).unwrap();
        assert_eq!(written["title"], "kept verbatim");
        assert_eq!(written["bib_entries"]["u1"]["ids"]["open_alex_id"], "https://openalex.org/W1");
        assert_eq!(written["bib_entries"]["u1"]["discipline"], "Physics");
        assert_eq!(written["bib_entries"]["u2"]["ids"]["doi"], "");
    }
}
