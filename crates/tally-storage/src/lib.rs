//! Aggregate metric storage for the tally collector.
//!
//! Every backend implements [`MetricStore`] with the same semantics: storing
//! a counter adds its delta to the running total, storing a gauge replaces
//! the previous reading. Three backends ship:
//!
//! - [`memory::MemoryStore`], a read-write-locked pair of maps;
//! - [`file::FileStore`], a memory store plus a JSON snapshot file driven by
//!   the collector's persistence scheduler;
//! - [`database::SqliteStore`], a SQLite table with atomic upserts and
//!   classifier-driven retries.

pub mod database;
pub mod error;
pub mod file;
pub mod memory;


use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tally_common::types::{MetricBatch, MetricRecord};

pub use database::{SqliteErrorClassifier, SqliteStore};
pub use error::{Result, StorageError};
pub use file::{FileStore, SnapshotFile};
pub use memory::MemoryStore;

/// Storage capability shared by request handlers, the persistence scheduler
/// and the restore path.
///
/// Implementations must be safe to share across threads (`Send + Sync`)
/// because the store is accessed from every inbound request concurrently.
#[async_trait]
pub trait MetricStore: Send + Sync {
    /// Adds `delta` to the counter total, creating it at `delta` if absent.
    async fn store_counter(&self, id: &str, delta: i64) -> Result<()>;

    /// Replaces the gauge reading unconditionally.
    async fn store_gauge(&self, id: &str, value: f64) -> Result<()>;

    /// Applies a whole batch in order.
    ///
    /// A malformed record rejects the batch with [`StorageError::Validation`]
    /// before anything is written.
    async fn store_all(&self, batch: &MetricBatch) -> Result<()>;

    /// Returns the counter total or [`StorageError::NotFound`].
    async fn counter(&self, id: &str) -> Result<i64>;

    /// Returns the latest gauge reading or [`StorageError::NotFound`].
    async fn gauge(&self, id: &str) -> Result<f64>;

    /// Owned copy of every counter total.
    async fn all_counters(&self) -> Result<HashMap<String, i64>>;

    /// Owned copy of every gauge reading.
    async fn all_gauges(&self) -> Result<HashMap<String, f64>>;

    /// Verifies the backend can serve requests within `deadline`.
    async fn health_check(&self, deadline: Duration) -> Result<()>;

    /// Flattens the aggregate state into records: gauges first, then
    /// counters, each sorted by id so snapshot files are stable.
    async fn snapshot(&self) -> Result<Vec<MetricRecord>> {
        let mut gauges: Vec<_> = self.all_gauges().await?.into_iter().collect();
        let mut counters: Vec<_> = self.all_counters().await?.into_iter().collect();
        gauges.sort_by(|a, b| a.0.cmp(&b.0));
        counters.sort_by(|a, b| a.0.cmp(&b.0));

        let mut records = Vec::with_capacity(gauges.len() + counters.len());
        records.extend(gauges.into_iter().map(|(id, v)| MetricRecord::gauge(id, v)));
        records.extend(counters.into_iter().map(|(id, d)| MetricRecord::counter(id, d)));
        Ok(records)
    }
}
