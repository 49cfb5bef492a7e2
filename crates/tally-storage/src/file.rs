use crate::error::{Result, StorageError};
use crate::memory::MemoryStore;
use crate::MetricStore;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tally_common::types::{MetricBatch, MetricRecord};

/// A JSON document holding the full aggregate state as a list of records.
#[derive(Debug, Clone)]
pub struct SnapshotFile {
    path: PathBuf,
}

impl SnapshotFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_err(&self, source: std::io::Error) -> StorageError {
        StorageError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }

    /// Writes `records` as one JSON array.
    ///
    /// The document goes to a sibling `.tmp` file first and is renamed into
    /// place, so readers never observe a half-written snapshot. An empty
    /// record list leaves the existing file untouched.
    pub fn save(&self, records: &[MetricRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| self.io_err(e))?;
        }

        let body = serde_json::to_vec(records)?;
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        std::fs::write(&tmp, body).map_err(|e| self.io_err(e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| self.io_err(e))?;
        Ok(())
    }

    /// Reads the snapshot back. A missing or empty file yields no records.
    ///
    /// The document itself must be a JSON array; individual entries that do
    /// not decode as a record (an unknown `type`, a wrong field type) are
    /// logged and skipped.
    pub fn load(&self) -> Result<Vec<MetricRecord>> {
        let content = match std::fs::read(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(self.io_err(e)),
        };
        if content.iter().all(u8::is_ascii_whitespace) {
            return Ok(Vec::new());
        }
        let entries: Vec<serde_json::Value> = serde_json::from_slice(&content)?;
        let records = entries
            .into_iter()
            .enumerate()
            .filter_map(|(index, entry)| match serde_json::from_value(entry) {
                Ok(record) => Some(record),
                Err(e) => {
                    tracing::warn!(
                        index,
                        error = %e,
                        path = %self.path.display(),
                        "Skipping undecodable snapshot record"
                    );
                    None
                }
            })
            .collect();
        Ok(records)
    }
}

/// Memory store whose state is periodically externalized to a snapshot file.
///
/// Live reads and writes go straight to the inner [`MemoryStore`]; only the
/// persistence scheduler calls [`FileStore::save`] and [`FileStore::load`].
#[derive(Debug)]
pub struct FileStore {
    memory: MemoryStore,
    snapshot: SnapshotFile,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            memory: MemoryStore::new(),
            snapshot: SnapshotFile::new(path),
        }
    }

    pub fn snapshot_path(&self) -> &Path {
        self.snapshot.path()
    }

    pub fn save(&self, records: &[MetricRecord]) -> Result<()> {
        self.snapshot.save(records)
    }

    pub fn load(&self) -> Result<Vec<MetricRecord>> {
        self.snapshot.load()
    }
}

#[async_trait]
impl MetricStore for FileStore {
    async fn store_counter(&self, id: &str, delta: i64) -> Result<()> {
        self.memory.store_counter(id, delta).await
    }

    async fn store_gauge(&self, id: &str, value: f64) -> Result<()> {
        self.memory.store_gauge(id, value).await
    }

    async fn store_all(&self, batch: &MetricBatch) -> Result<()> {
        self.memory.store_all(batch).await
    }

    async fn counter(&self, id: &str) -> Result<i64> {
        self.memory.counter(id).await
    }

    async fn gauge(&self, id: &str) -> Result<f64> {
        self.memory.gauge(id).await
    }

    async fn all_counters(&self) -> Result<HashMap<String, i64>> {
        self.memory.all_counters().await
    }

    async fn all_gauges(&self) -> Result<HashMap<String, f64>> {
        self.memory.all_gauges().await
    }

    async fn health_check(&self, deadline: Duration) -> Result<()> {
        self.memory.health_check(deadline).await
    }
}
