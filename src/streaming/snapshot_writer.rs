use anyhow::{Context, Result};
use log::{debug, info};
use polars::prelude::*;
use std::collections::HashMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

use crate::extract::arxiv_year_month;
use crate::providers::partition_name;

/// Buffered `aid`/`title` rows of one `YYMM` partition
struct SnapshotBuffer {
    aids: Vec<String>,
    titles: Vec<String>,
    file_path: PathBuf,
    rows_written: usize,
}

impl SnapshotBuffer {
    fn new(dir: &Path, partition: &str) -> Self {
        Self {
            aids: Vec::new(),
            titles: Vec::new(),
            file_path: dir.join(format!("{}.parquet", partition)),
            rows_written: 0,
        }
    }

    fn len(&self) -> usize {
        self.aids.len()
    }

    fn to_dataframe(&self) -> Result<DataFrame> {
        DataFrame::new(vec![
            Column::new("aid".into(), &self.aids),
            Column::new("title".into(), &self.titles),
        ])
        .map_err(|e| anyhow::anyhow!("Failed to create DataFrame: {}", e))
    }

    fn clear(&mut self) {
        self.aids.clear();
        self.titles.clear();
    }
}

/// Writes the arXiv title snapshot as one Parquet file per `YYMM` partition
pub struct SnapshotWriter {
    dir: PathBuf,
    buffers: HashMap<String, SnapshotBuffer>,
    flush_threshold: usize,
    total_rows_written: usize,
}

/// True for `YYMM.parquet` partition files
fn is_partition_file(path: &Path) -> bool {
    path.extension().is_some_and(|e| e == "parquet")
        && path
            .file_stem()
            .and_then(|s| s.to_str())
            .is_some_and(|s| s.len() == 4 && s.bytes().all(|b| b.is_ascii_digit()))
}

impl SnapshotWriter {
    /// Partitions left in `dir` by an earlier run are removed, so a rebuild
    /// replaces the snapshot instead of appending to it.
    pub fn new(dir: &Path, flush_threshold: usize) -> Result<Self> {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create snapshot directory: {:?}", dir))?;

        let mut removed = 0;
        for entry in fs::read_dir(dir).with_context(|| format!("Failed to read {:?}", dir))? {
            let path = entry?.path();
            if path.is_file() && is_partition_file(&path) {
                fs::remove_file(&path)
                    .with_context(|| format!("Failed to remove stale partition: {:?}", path))?;
                removed += 1;
            }
        }
        if removed > 0 {
            info!("Removed {} partition file(s) from a previous snapshot", removed);
        }

        Ok(Self {
            dir: dir.to_path_buf(),
            buffers: HashMap::new(),
            flush_threshold: flush_threshold.max(1),
            total_rows_written: 0,
        })
    }

    /// Buffer one record. Returns false, writing nothing, when no
    /// year/month can be derived from `aid`.
    pub fn write(&mut self, aid: &str, title: &str) -> Result<bool> {
        let Some((year, month)) = arxiv_year_month(aid) else {
            return Ok(false);
        };
        let partition = partition_name(year, month);

        let buffer = self
            .buffers
            .entry(partition.clone())
            .or_insert_with(|| SnapshotBuffer::new(&self.dir, &partition));
        buffer.aids.push(aid.to_string());
        buffer.titles.push(title.split_whitespace().collect::<Vec<_>>().join(" "));

        if buffer.len() >= self.flush_threshold {
            self.flush_partition(&partition)?;
        }
        Ok(true)
    }

    fn flush_partition(&mut self, partition: &str) -> Result<()> {
        let buffer = self
            .buffers
            .get_mut(partition)
            .ok_or_else(|| anyhow::anyhow!("Partition {} not found", partition))?;
        if buffer.len() == 0 {
            return Ok(());
        }

        let mut df = buffer.to_dataframe()?;
        let rows = df.height();

        if buffer.file_path.exists() {
            let existing = LazyFrame::scan_parquet(&buffer.file_path, Default::default())
                .context("Failed to read existing partition file")?
                .collect()
                .context("Failed to collect existing partition data")?;
            df = concat([existing.lazy(), df.lazy()], UnionArgs::default())
                .context("Failed to concat dataframes")?
                .collect()
                .context("Failed to collect concatenated dataframe")?;
        }

        let file = File::create(&buffer.file_path)
            .with_context(|| format!("Failed to create partition file: {:?}", buffer.file_path))?;
        ParquetWriter::new(file)
            .with_compression(ParquetCompression::Zstd(None))
            .finish(&mut df)
            .context("Failed to write partition parquet")?;

        buffer.rows_written += rows;
        self.total_rows_written += rows;
        buffer.clear();
        debug!("Flushed partition {} ({} rows, {} total)", partition, rows, buffer.rows_written);
        Ok(())
    }

    pub fn flush_all(&mut self) -> Result<()> {
        let partitions: Vec<String> = self.buffers.keys().cloned().collect();
        for partition in partitions {
            self.flush_partition(&partition)?;
        }
        info!("Flushed all partitions ({} total rows)", self.total_rows_written);
        Ok(())
    }

    pub fn partition_count(&self) -> usize {
        self.buffers.len()
    }

    pub fn total_rows_written(&self) -> usize {
        self.total_rows_written
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{ParquetSnapshot, SnapshotLookup};
    use tempfile::tempdir;

    #[test]
    fn test_partitions_by_year_month() {
        let dir = tempdir().unwrap();
        let mut writer = SnapshotWriter::new(dir.path(), 100).unwrap();

        assert!(writer.write("1206.2606", "Exact Results in D=2\n  Supersymmetric Gauge Theories").unwrap());
        assert!(writer.write("hep-th/9901001", "Old style").unwrap());
        assert!(!writer.write("not-an-id", "Nothing").unwrap());
        writer.flush_all().unwrap();

        assert!(dir.path().join("1206.parquet").exists());
        assert!(dir.path().join("9901.parquet").exists());
        assert_eq!(writer.partition_count(), 2);
        assert_eq!(writer.total_rows_written(), 2);

        let snapshot = ParquetSnapshot::open(dir.path()).unwrap();
        assert_eq!(
            snapshot.title("1206.2606").as_deref(),
            Some("Exact Results in D=2 Supersymmetric Gauge Theories")
        );
    }

    #[test]
    fn test_flush_threshold_appends() {
        let dir = tempdir().unwrap();
        let mut writer = SnapshotWriter::new(dir.path(), 1).unwrap();
        writer.write("1206.0001", "A").unwrap();
        writer.write("1206.0002", "B").unwrap();
        writer.flush_all().unwrap();

        let df = LazyFrame::scan_parquet(dir.path().join("1206.parquet"), Default::default())
            .unwrap()
            .collect()
            .unwrap();
        assert_eq!(df.height(), 2);
    }

    #[test]
    fn test_rebuild_replaces_previous_partitions() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), "keep").unwrap();

        for _ in 0..2 {
            let mut writer = SnapshotWriter::new(dir.path(), 100).unwrap();
            writer.write("1206.0001", "A").unwrap();
            writer.write("1206.0002", "B").unwrap();
            writer.flush_all().unwrap();
        }

        let df = LazyFrame::scan_parquet(dir.path().join("1206.parquet"), Default::default())
            .unwrap()
            .collect()
            .unwrap();
        assert_eq!(df.height(), 2);
        assert!(dir.path().join("notes.txt").exists());
    }
}
