use crate::persistence::PersistenceScheduler;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tally_common::types::MetricBatch;
use tally_storage::{MetricStore, Result};

/// Ingest and read boundary shared by every HTTP handler.
pub struct MetricsService {
    store: Arc<dyn MetricStore>,
    persistence: Option<Arc<PersistenceScheduler>>,
}

impl MetricsService {
    pub fn new(
        store: Arc<dyn MetricStore>,
        persistence: Option<Arc<PersistenceScheduler>>,
    ) -> Self {
        Self { store, persistence }
    }

    pub async fn store_counter(&self, id: &str, delta: i64) -> Result<()> {
        self.store.store_counter(id, delta).await?;
        self.after_write().await
    }

    pub async fn store_gauge(&self, id: &str, value: f64) -> Result<()> {
        self.store.store_gauge(id, value).await?;
        self.after_write().await
    }

    pub async fn store_all(&self, batch: &MetricBatch) -> Result<()> {
        self.store.store_all(batch).await?;
        self.after_write().await
    }

    /// Forces a snapshot. A no-op when no snapshot file is configured.
    pub async fn persist(&self) -> Result<()> {
        if let Some(persistence) = &self.persistence {
            persistence.persist().await?;
        }
        Ok(())
    }

    pub async fn ping(&self, deadline: Duration) -> Result<()> {
        self.store.health_check(deadline).await
    }

    pub async fn counter(&self, id: &str) -> Result<i64> {
        self.store.counter(id).await
    }

    pub async fn gauge(&self, id: &str) -> Result<f64> {
        self.store.gauge(id).await
    }

    pub async fn all_counters(&self) -> Result<HashMap<String, i64>> {
        self.store.all_counters().await
    }

    pub async fn all_gauges(&self) -> Result<HashMap<String, f64>> {
        self.store.all_gauges().await
    }

    // The write is already visible in memory when a synchronous save fails.
    async fn after_write(&self) -> Result<()> {
        match &self.persistence {
            Some(persistence) if persistence.is_synchronous() => {
                if let Err(e) = persistence.persist().await {
                    tracing::error!(error = %e, "Synchronous snapshot save failed");
                    return Err(e);
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}
