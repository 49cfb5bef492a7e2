use std::sync::Arc;
use std::time::Duration;
use tally_common::types::Metric;
use tally_storage::{FileStore, MetricStore, Result};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Writes the file store's aggregate state to its snapshot file.
///
/// With a zero interval the scheduler is synchronous: no timer runs and the
/// service persists after every write. Otherwise a background task saves on
/// every tick and once more when cancelled.
pub struct PersistenceScheduler {
    store: Arc<FileStore>,
    interval: Duration,
    // Serializes snapshot-then-save so an older state never lands last.
    save_lock: Mutex<()>,
}

impl PersistenceScheduler {
    pub fn new(store: Arc<FileStore>, interval: Duration) -> Self {
        Self {
            store,
            interval,
            save_lock: Mutex::new(()),
        }
    }

    pub fn is_synchronous(&self) -> bool {
        self.interval.is_zero()
    }

    /// Saves the current state. Returns the number of records written.
    pub async fn persist(&self) -> Result<usize> {
        let _guard = self.save_lock.lock().await;
        let records = self.store.snapshot().await?;
        self.store.save(&records)?;
        tracing::debug!(
            count = records.len(),
            path = %self.store.snapshot_path().display(),
            "Snapshot saved"
        );
        Ok(records.len())
    }

    /// Replays the saved snapshot through the normal store path, so counters
    /// accumulate onto whatever is already present. Malformed records are
    /// skipped.
    pub async fn restore(&self) -> Result<usize> {
        let records = self.store.load()?;
        let mut restored = 0;
        for record in records {
            match record.validate() {
                Ok(Metric::Counter { id, delta }) => self.store.store_counter(&id, delta).await?,
                Ok(Metric::Gauge { id, value }) => self.store.store_gauge(&id, value).await?,
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping malformed snapshot record");
                    continue;
                }
            }
            restored += 1;
        }
        tracing::info!(
            restored,
            path = %self.store.snapshot_path().display(),
            "Snapshot restored"
        );
        Ok(restored)
    }

    /// Starts the periodic saver. Returns `None` in synchronous mode.
    pub fn spawn(self: Arc<Self>, cancel: CancellationToken) -> Option<JoinHandle<()>> {
        if self.is_synchronous() {
            tracing::info!("Synchronous persistence, no snapshot timer");
            return None;
        }
        Some(tokio::spawn(async move { self.run(cancel).await }))
    }

    async fn run(&self, cancel: CancellationToken) {
        let mut tick = tokio::time::interval(self.interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // Skip the immediate first tick.
        tick.tick().await;

        tracing::info!(interval_secs = self.interval.as_secs(), "Snapshot scheduler started");

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    if let Err(e) = self.persist().await {
                        tracing::error!(error = %e, "Snapshot save failed");
                    }
                }
                _ = cancel.cancelled() => break,
            }
        }

        match self.persist().await {
            Ok(count) => tracing::info!(count, "Final snapshot saved"),
            Err(e) => tracing::error!(error = %e, "Final snapshot save failed"),
        }
    }
}
