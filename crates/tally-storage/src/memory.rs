use crate::error::{Result, StorageError};
use crate::MetricStore;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tally_common::types::{Metric, MetricBatch, MetricKind};

#[derive(Debug, Default)]
struct Aggregates {
    counters: HashMap<String, i64>,
    gauges: HashMap<String, f64>,
}

impl Aggregates {
    fn add_counter(&mut self, id: &str, delta: i64) {
        match self.counters.get_mut(id) {
            Some(total) => *total = total.saturating_add(delta),
            None => {
                self.counters.insert(id.to_string(), delta);
            }
        }
    }

    fn set_gauge(&mut self, id: &str, value: f64) {
        match self.gauges.get_mut(id) {
            Some(current) => *current = value,
            None => {
                self.gauges.insert(id.to_string(), value);
            }
        }
    }

    fn apply(&mut self, metric: &Metric) {
        match metric {
            Metric::Counter { id, delta } => self.add_counter(id, *delta),
            Metric::Gauge { id, value } => self.set_gauge(id, *value),
        }
    }
}

/// Volatile store: one read-write lock over the counter and gauge maps.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Aggregates>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock for reading, recovering from a poisoned lock if necessary.
    fn read(&self) -> RwLockReadGuard<'_, Aggregates> {
        self.inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Lock for writing, recovering from a poisoned lock if necessary.
    fn write(&self) -> RwLockWriteGuard<'_, Aggregates> {
        self.inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl MetricStore for MemoryStore {
    async fn store_counter(&self, id: &str, delta: i64) -> Result<()> {
        self.write().add_counter(id, delta);
        Ok(())
    }

    async fn store_gauge(&self, id: &str, value: f64) -> Result<()> {
        self.write().set_gauge(id, value);
        Ok(())
    }

    async fn store_all(&self, batch: &MetricBatch) -> Result<()> {
        // Validate everything first so a bad record leaves no partial effect.
        let metrics = batch.validate()?;

        let mut guard = self.write();
        for metric in &metrics {
            guard.apply(metric);
        }
        Ok(())
    }

    async fn counter(&self, id: &str) -> Result<i64> {
        self.read()
            .counters
            .get(id)
            .copied()
            .ok_or_else(|| StorageError::not_found(MetricKind::Counter, id))
    }

    async fn gauge(&self, id: &str) -> Result<f64> {
        self.read()
            .gauges
            .get(id)
            .copied()
            .ok_or_else(|| StorageError::not_found(MetricKind::Gauge, id))
    }

    async fn all_counters(&self) -> Result<HashMap<String, i64>> {
        Ok(self.read().counters.clone())
    }

    async fn all_gauges(&self) -> Result<HashMap<String, f64>> {
        Ok(self.read().gauges.clone())
    }

    async fn health_check(&self, _deadline: Duration) -> Result<()> {
        Ok(())
    }
}
