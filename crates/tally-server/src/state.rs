use crate::config::ServerConfig;
use crate::persistence::PersistenceScheduler;
use crate::service::MetricsService;
use anyhow::Context;
use std::sync::Arc;
use tally_storage::{FileStore, MemoryStore, MetricStore, SqliteStore};
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
pub struct AppState {
    pub metrics: Arc<MetricsService>,
}

impl AppState {
    pub fn new(metrics: MetricsService) -> Self {
        Self {
            metrics: Arc::new(metrics),
        }
    }
}

/// Picks the storage backend from the config.
///
/// A database path wins over the snapshot file; with neither, metrics live
/// only in memory. When a snapshot file is used and `restore` is set, the
/// previous snapshot is replayed before this returns; a snapshot that cannot
/// be read is logged and the collector starts empty.
pub async fn build_store(
    config: &ServerConfig,
    cancel: CancellationToken,
) -> anyhow::Result<(Arc<dyn MetricStore>, Option<Arc<PersistenceScheduler>>)> {
    if let Some(path) = config.database_path() {
        let store = SqliteStore::open(&path, config.retry_policy(), cancel)
            .with_context(|| format!("failed to open database {}", path.display()))?;
        tracing::info!(path = %path.display(), "Using SQLite metric store");
        let store: Arc<dyn MetricStore> = Arc::new(store);
        return Ok((store, None));
    }

    if let Some(path) = config.snapshot_path() {
        let file = Arc::new(FileStore::new(&path));
        let scheduler = Arc::new(PersistenceScheduler::new(
            Arc::clone(&file),
            config.store_interval(),
        ));
        if config.restore {
            if let Err(e) = scheduler.restore().await {
                tracing::error!(
                    error = %e,
                    path = %path.display(),
                    "Failed to restore snapshot, starting with empty state"
                );
            }
        }
        tracing::info!(
            path = %path.display(),
            interval_secs = config.store_interval_secs,
            "Using file snapshot metric store"
        );
        let store: Arc<dyn MetricStore> = file;
        return Ok((store, Some(scheduler)));
    }

    tracing::info!("Using in-memory metric store");
    let store: Arc<dyn MetricStore> = Arc::new(MemoryStore::new());
    Ok((store, None))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config_in(dir: &TempDir) -> ServerConfig {
        ServerConfig {
            file_storage_path: Some(dir.path().join("metrics.json").display().to_string()),
            ..ServerConfig::default()
        }
    }

    #[tokio::test]
    async fn database_path_selects_sqlite_without_scheduler() {
        let dir = TempDir::new().unwrap();
        let config = ServerConfig {
            database_path: Some(dir.path().join("metrics.db").display().to_string()),
            ..config_in(&dir)
        };
        let (store, scheduler) = build_store(&config, CancellationToken::new()).await.unwrap();
        assert!(scheduler.is_none());
        store.store_counter("PollCount", 1).await.unwrap();
        assert!(dir.path().join("metrics.db").exists());
    }

    #[tokio::test]
    async fn snapshot_path_restores_previous_state() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("metrics.json"),
            r#"[{"id":"PollCount","type":"counter","delta":7}]"#,
        )
        .unwrap();

        let (store, scheduler) = build_store(&config_in(&dir), CancellationToken::new())
            .await
            .unwrap();
        assert!(scheduler.is_some());
        assert_eq!(store.counter("PollCount").await.unwrap(), 7);
    }

    #[tokio::test]
    async fn unknown_snapshot_kind_is_skipped_not_fatal() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("metrics.json"),
            r#"[{"id":"PollCount","type":"counter","delta":7},
                {"id":"H","type":"histogram","value":1.0}]"#,
        )
        .unwrap();

        let (store, _) = build_store(&config_in(&dir), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(store.counter("PollCount").await.unwrap(), 7);
        assert!(store.gauge("H").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn unreadable_snapshot_starts_empty() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("metrics.json"), "{not json").unwrap();

        let (store, scheduler) = build_store(&config_in(&dir), CancellationToken::new())
            .await
            .unwrap();
        assert!(scheduler.is_some());
        assert!(store.all_counters().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn restore_disabled_starts_empty() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("metrics.json"),
            r#"[{"id":"PollCount","type":"counter","delta":7}]"#,
        )
        .unwrap();
        let config = ServerConfig {
            restore: false,
            ..config_in(&dir)
        };

        let (store, _) = build_store(&config, CancellationToken::new()).await.unwrap();
        assert!(store.all_counters().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn no_paths_fall_back_to_memory() {
        let config = ServerConfig {
            file_storage_path: None,
            ..ServerConfig::default()
        };
        let (store, scheduler) = build_store(&config, CancellationToken::new()).await.unwrap();
        assert!(scheduler.is_none());
        store.health_check(std::time::Duration::from_secs(1)).await.unwrap();
    }
}
