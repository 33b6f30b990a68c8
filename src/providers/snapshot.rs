use anyhow::{Context, Result};
use log::{debug, warn};
use polars::prelude::*;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::extract::arxiv_year_month;

/// Partition file stem for an arXiv ID issued in (year, month): `YYMM`
pub fn partition_name(year: u8, month: u8) -> String {
    format!("{:02}{:02}", year, month)
}

/// Point lookup of arXiv ID -> title in an offline snapshot
pub trait SnapshotLookup: Send + Sync {
    fn title(&self, arxiv_id: &str) -> Option<String>;
}

type Partition = Arc<HashMap<String, String>>;

/// Snapshot stored as one Parquet file per `YYMM` partition (columns `aid`, `title`).
///
/// Partitions are loaded on first access and kept for the worker's lifetime.
pub struct ParquetSnapshot {
    dir: PathBuf,
    partitions: Mutex<HashMap<String, Partition>>,
}

impl ParquetSnapshot {
    pub fn open(dir: &Path) -> Result<Self> {
        if !dir.is_dir() {
            anyhow::bail!("Snapshot directory not found: {}", dir.display());
        }
        Ok(Self {
            dir: dir.to_path_buf(),
            partitions: Mutex::new(HashMap::new()),
        })
    }

    fn load_partition(&self, name: &str) -> Result<HashMap<String, String>> {
        let path = self.dir.join(format!("{}.parquet", name));
        if !path.exists() {
            return Ok(HashMap::new());
        }

        let df = LazyFrame::scan_parquet(&path, Default::default())
            .with_context(|| format!("Failed to scan snapshot partition: {:?}", path))?
            .select([col("aid"), col("title")])
            .collect()
            .context("Failed to collect snapshot partition")?;

        let aids = df.column("aid")?.str()?;
        let titles = df.column("title")?.str()?;

        let mut map = HashMap::with_capacity(df.height());
        for (aid, title) in aids.into_iter().zip(titles.into_iter()) {
            if let (Some(aid), Some(title)) = (aid, title) {
                map.insert(aid.to_string(), title.to_string());
            }
        }
        debug!("Loaded snapshot partition {} ({} rows)", name, map.len());
        Ok(map)
    }

    fn partition(&self, name: &str) -> Partition {
        let mut partitions = match self.partitions.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(p) = partitions.get(name) {
            return Arc::clone(p);
        }

        let loaded = self.load_partition(name).unwrap_or_else(|e| {
            warn!("Snapshot partition {} unreadable: {:#}", name, e);
            HashMap::new()
        });
        let loaded = Arc::new(loaded);
        partitions.insert(name.to_string(), Arc::clone(&loaded));
        loaded
    }
}

impl SnapshotLookup for ParquetSnapshot {
    fn title(&self, arxiv_id: &str) -> Option<String> {
        let (year, month) = arxiv_year_month(arxiv_id)?;
        self.partition(&partition_name(year, month))
            .get(arxiv_id)
            .cloned()
    }
}

/// In-memory snapshot, for tests and small corpora
#[derive(Debug, Default)]
pub struct MemorySnapshot {
    titles: HashMap<String, String>,
}

impl MemorySnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, arxiv_id: &str, title: &str) {
        self.titles.insert(arxiv_id.to_string(), title.to_string());
    }
}

impl SnapshotLookup for MemorySnapshot {
    fn title(&self, arxiv_id: &str) -> Option<String> {
        arxiv_year_month(arxiv_id)?;
        self.titles.get(arxiv_id).cloned()
    }
}
