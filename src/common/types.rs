use serde::{Deserialize, Serialize};

/// A single bibliography entry extracted from a parsed document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BibEntry {
    pub uuid: String,           // Primary key, also used in {{cite:<uuid>}} markers
    pub in_doc: String,         // Owning document identifier
    pub raw_string: String,     // Free-text reference as it appeared in the bibliography
    pub embedded_arxiv_ids: Vec<String>,
    pub embedded_links: Vec<String>,
}

/// External identifiers attached to a canonical work in the knowledge base
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifierBundle {
    #[serde(default)]
    pub openalex: String,
    #[serde(default)]
    pub pubmed: String,
    #[serde(default)]
    pub pmc: String,
    #[serde(default)]
    pub doi: String,
    #[serde(default)]
    pub arxiv: String,
}

/// A canonical knowledge-base record (read-only from our side)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalWork {
    pub normalized_title: String,
    /// Normalized display names
    pub authors: Vec<String>,
    pub citation_count: u64,
    pub ids: IdentifierBundle,
    #[serde(default)]
    pub discipline: String,
}

const OPENALEX_BASE: &str = "https://openalex.org/";
const SEMOPENALEX_BASE: &str = "https://semopenalex.org/";

/// Identifiers resolved for one bib entry; empty strings mark absent values
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedIdentifiers {
    pub open_alex_id: String,
    pub semantic_open_alex_id: String,
    pub pubmed_id: String,
    pub pmc_id: String,
    pub doi: String,
    pub arxiv_id: String,
    pub discipline: String,
}

impl ResolvedIdentifiers {
    /// Build the identifier record for a matched work. `entry_arxiv_id` is
    /// used when the knowledge base itself carries no arXiv ID.
    pub fn from_work(work: &CanonicalWork, entry_arxiv_id: Option<&str>) -> Self {
        let bare = work
            .ids
            .openalex
            .strip_prefix(OPENALEX_BASE)
            .unwrap_or(&work.ids.openalex);
        let (open_alex_id, semantic_open_alex_id) = if bare.is_empty() {
            (String::new(), String::new())
        } else {
            (
                format!("{}{}", OPENALEX_BASE, bare),
                format!("{}{}", SEMOPENALEX_BASE, bare),
            )
        };

        let arxiv_id = if work.ids.arxiv.is_empty() {
            entry_arxiv_id.unwrap_or_default().to_string()
        } else {
            work.ids.arxiv.clone()
        };

        Self {
            open_alex_id,
            semantic_open_alex_id,
            pubmed_id: work.ids.pubmed.clone(),
            pmc_id: work.ids.pmc.clone(),
            doi: work.ids.doi.clone(),
            arxiv_id,
            discipline: work.discipline.clone(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// Text surrounding one occurrence of a citation marker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextWindow {
    pub cited_work_ref: String,
    pub citing_doc_id: String,
    pub pre_text: String,
    pub post_text: String,
    pub adjacent_citations: Vec<String>,
}

/// One line of a `<shard>.mappings.jsonl` file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingRecord {
    pub uuid: String,
    pub in_doc: String,
    pub ids: ResolvedIdentifiers,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn work(openalex: &str, arxiv: &str) -> CanonicalWork {
        CanonicalWork {
            normalized_title: "exact results in d 2 supersymmetric gauge theories".to_string(),
            authors: vec!["nima doroud".to_string()],
            citation_count: 87,
            ids: IdentifierBundle {
                openalex: openalex.to_string(),
                pubmed: String::new(),
                pmc: String::new(),
                doi: "10.1007/jhep05(2013)093".to_string(),
                arxiv: arxiv.to_string(),
            },
            discipline: "Physics".to_string(),
        }
    }

    #[test]
    fn test_from_work_builds_openalex_urls() {
        let ids = ResolvedIdentifiers::from_work(&work("W2013", ""), None);
        assert_eq!(ids.open_alex_id, "https://openalex.org/W2013");
        assert_eq!(ids.semantic_open_alex_id, "https://semopenalex.org/W2013");
        assert_eq!(ids.doi, "10.1007/jhep05(2013)093");
        assert_eq!(ids.discipline, "Physics");
    }

    #[test]
    fn test_from_work_accepts_prefixed_openalex_id() {
        let ids = ResolvedIdentifiers::from_work(&work("https://openalex.org/W2013", ""), None);
        assert_eq!(ids.open_alex_id, "https://openalex.org/W2013");
    }

    #[test]
    fn test_from_work_arxiv_fallback() {
        let ids = ResolvedIdentifiers::from_work(&work("W1", ""), Some("1206.2606"));
        assert_eq!(ids.arxiv_id, "1206.2606");

        let ids = ResolvedIdentifiers::from_work(&work("W1", "1206.2606"), Some("0000.0000"));
        assert_eq!(ids.arxiv_id, "1206.2606");
    }

    #[test]
    fn test_default_is_empty() {
        assert!(ResolvedIdentifiers::default().is_empty());
        assert!(!ResolvedIdentifiers::from_work(&work("W1", ""), None).is_empty());
    }
}
