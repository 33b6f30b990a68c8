use anyhow::{Context, Result};
use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Append-only log of completed bib entry uuids for one shard.
///
/// Durability: every `mark_done` writes one line and flushes it to the OS
/// before returning, so a uuid is only visible in the log after everything
/// written before it (the shard's mapping line) has been flushed. `sync`
/// additionally fsyncs and is called when the shard finishes. Duplicate
/// lines are harmless; loading builds a set.
pub struct DoneLog {
    path: PathBuf,
    done: HashSet<String>,
    writer: BufWriter<File>,
}

impl DoneLog {
    /// Load the uuids already in the log at `path` (creating it if missing)
    /// and open it for appending
    pub fn open(path: &Path) -> Result<Self> {
        let done = Self::read_keys(path)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {:?}", parent))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open done log: {:?}", path))?;

        Ok(Self {
            path: path.to_path_buf(),
            done,
            writer: BufWriter::new(file),
        })
    }

    /// Uuids recorded in the log at `path`; empty if it doesn't exist
    pub fn read_keys(path: &Path) -> Result<HashSet<String>> {
        let mut done = HashSet::new();
        if !path.exists() {
            return Ok(done);
        }
        let file = File::open(path).with_context(|| format!("Failed to read done log: {:?}", path))?;
        for line in BufReader::new(file).lines() {
            let line = line.with_context(|| format!("Failed to read done log: {:?}", path))?;
            let key = line.trim();
            if !key.is_empty() {
                done.insert(key.to_string());
            }
        }
        Ok(done)
    }

    pub fn contains(&self, uuid: &str) -> bool {
        self.done.contains(uuid)
    }

    pub fn len(&self) -> usize {
        self.done.len()
    }

    pub fn is_empty(&self) -> bool {
        self.done.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record `uuid` as complete
    pub fn mark_done(&mut self, uuid: &str) -> Result<()> {
        writeln!(self.writer, "{}", uuid).context("Failed to append to done log")?;
        self.writer.flush().context("Failed to flush done log")?;
        self.done.insert(uuid.to_string());
        Ok(())
    }

    pub fn sync(&mut self) -> Result<()> {
        self.writer.flush()?;
        self.writer
            .get_ref()
            .sync_all()
            .with_context(|| format!("Failed to sync done log: {:?}", self.path))
    }
}
