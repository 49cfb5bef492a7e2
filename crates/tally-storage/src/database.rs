use crate::error::{Result, StorageError};
use crate::MetricStore;
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tally_common::retry::{Classification, ErrorClassifier, RetryExecutor, RetryPolicy};
use tally_common::types::{Metric, MetricBatch, MetricKind};
use tokio_util::sync::CancellationToken;

const METRICS_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS metrics (
    id TEXT NOT NULL,
    kind TEXT NOT NULL,
    delta INTEGER,
    value REAL,
    updated_at INTEGER NOT NULL,
    PRIMARY KEY (id, kind)
);
";

// Accumulation happens inside the upsert, never as read-modify-write. The sum
// saturates at the i64 bounds; plain `+` would silently turn the column REAL.
const UPSERT_COUNTER: &str = "
INSERT INTO metrics (id, kind, delta, value, updated_at) VALUES (?1, 'counter', ?2, NULL, ?3)
ON CONFLICT (id, kind) DO UPDATE SET
    delta = CASE
        WHEN excluded.delta > 0 AND metrics.delta > 9223372036854775807 - excluded.delta
            THEN 9223372036854775807
        WHEN excluded.delta < 0 AND metrics.delta < (-9223372036854775807 - 1) - excluded.delta
            THEN (-9223372036854775807 - 1)
        ELSE metrics.delta + excluded.delta
    END,
    updated_at = excluded.updated_at
";

const UPSERT_GAUGE: &str = "
INSERT INTO metrics (id, kind, delta, value, updated_at) VALUES (?1, 'gauge', NULL, ?2, ?3)
ON CONFLICT (id, kind) DO UPDATE SET
    value = excluded.value,
    updated_at = excluded.updated_at
";

const BUSY_TIMEOUT: Duration = Duration::from_millis(250);

/// Decides which SQLite failures are worth another attempt.
///
/// Lock and busy conflicts, a database that cannot be opened yet, I/O
/// hiccups and schema changes are transient. Constraint, type, size and
/// misuse errors are permanent, and so is anything unrecognised.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteErrorClassifier;

impl SqliteErrorClassifier {
    pub fn classify_code(code: ErrorCode) -> Classification {
        match code {
            ErrorCode::DatabaseBusy
            | ErrorCode::DatabaseLocked
            | ErrorCode::CannotOpen
            | ErrorCode::SystemIoFailure
            | ErrorCode::SchemaChanged => Classification::Retriable,

            ErrorCode::ConstraintViolation
            | ErrorCode::TypeMismatch
            | ErrorCode::TooBig
            | ErrorCode::ParameterOutOfRange
            | ErrorCode::ReadOnly
            | ErrorCode::NotADatabase
            | ErrorCode::ApiMisuse => Classification::NonRetriable,

            _ => Classification::NonRetriable,
        }
    }
}

impl ErrorClassifier<rusqlite::Error> for SqliteErrorClassifier {
    fn classify(&self, err: &rusqlite::Error) -> Classification {
        match err {
            rusqlite::Error::SqliteFailure(e, _) => Self::classify_code(e.code),
            _ => Classification::NonRetriable,
        }
    }
}

/// Durable store backed by a single SQLite table keyed by `(id, kind)`.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    retry: RetryExecutor<SqliteErrorClassifier>,
}

impl SqliteStore {
    pub fn open(path: &Path, policy: RetryPolicy, cancel: CancellationToken) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| StorageError::Io {
                path: parent.display().to_string(),
                source,
            })?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::init(conn, policy, cancel)
    }

    pub fn open_in_memory(policy: RetryPolicy, cancel: CancellationToken) -> Result<Self> {
        Self::init(Connection::open_in_memory()?, policy, cancel)
    }

    fn init(conn: Connection, policy: RetryPolicy, cancel: CancellationToken) -> Result<Self> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch(METRICS_SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
            retry: RetryExecutor::new(policy, SqliteErrorClassifier, cancel),
        })
    }

    /// Lock the connection, recovering from a poisoned Mutex if necessary.
    fn lock_conn(&self) -> MutexGuard<'_, Connection> {
        self.conn
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Runs `op` under the retry executor. The connection lock is held for
    /// one attempt at a time and never across a backoff wait.
    async fn with_retry<T, F>(&self, op: F) -> Result<T>
    where
        F: Fn(&mut Connection) -> rusqlite::Result<T> + Send + Sync,
        T: Send,
    {
        let op = &op;
        let value = self
            .retry
            .execute(move || async move {
                let mut conn = self.lock_conn();
                op(&mut *conn)
            })
            .await?;
        Ok(value)
    }
}

/// Applies every metric inside one transaction.
///
/// Dropping the transaction on error rolls it back, so a retried batch always
/// starts from the pre-batch state and no delta is counted twice.
fn upsert_batch(conn: &mut Connection, metrics: &[Metric], now_ms: i64) -> rusqlite::Result<()> {
    let tx = conn.transaction()?;
    {
        let mut counter_stmt = tx.prepare_cached(UPSERT_COUNTER)?;
        let mut gauge_stmt = tx.prepare_cached(UPSERT_GAUGE)?;
        for metric in metrics {
            match metric {
                Metric::Counter { id, delta } => {
                    counter_stmt.execute(params![id, delta, now_ms])?;
                }
                Metric::Gauge { id, value } => {
                    gauge_stmt.execute(params![id, value, now_ms])?;
                }
            }
        }
    }
    tx.commit()
}

#[async_trait]
impl MetricStore for SqliteStore {
    async fn store_counter(&self, id: &str, delta: i64) -> Result<()> {
        let now_ms = Utc::now().timestamp_millis();
        self.with_retry(|conn| {
            conn.prepare_cached(UPSERT_COUNTER)?
                .execute(params![id, delta, now_ms])
                .map(|_| ())
        })
        .await
    }

    async fn store_gauge(&self, id: &str, value: f64) -> Result<()> {
        let now_ms = Utc::now().timestamp_millis();
        self.with_retry(|conn| {
            conn.prepare_cached(UPSERT_GAUGE)?
                .execute(params![id, value, now_ms])
                .map(|_| ())
        })
        .await
    }

    async fn store_all(&self, batch: &MetricBatch) -> Result<()> {
        let metrics = batch.validate()?;
        if metrics.is_empty() {
            return Ok(());
        }
        let now_ms = Utc::now().timestamp_millis();
        self.with_retry(|conn| upsert_batch(conn, &metrics, now_ms))
            .await?;
        tracing::debug!(count = metrics.len(), "Metric batch committed");
        Ok(())
    }

    async fn counter(&self, id: &str) -> Result<i64> {
        self.with_retry(|conn| {
            conn.query_row(
                "SELECT delta FROM metrics WHERE id = ?1 AND kind = 'counter'",
                [id],
                |row| row.get::<_, i64>(0),
            )
            .optional()
        })
        .await?
        .ok_or_else(|| StorageError::not_found(MetricKind::Counter, id))
    }

    async fn gauge(&self, id: &str) -> Result<f64> {
        self.with_retry(|conn| {
            conn.query_row(
                "SELECT value FROM metrics WHERE id = ?1 AND kind = 'gauge'",
                [id],
                |row| row.get::<_, f64>(0),
            )
            .optional()
        })
        .await?
        .ok_or_else(|| StorageError::not_found(MetricKind::Gauge, id))
    }

    async fn all_counters(&self) -> Result<HashMap<String, i64>> {
        self.with_retry(|conn| {
            let mut stmt =
                conn.prepare_cached("SELECT id, delta FROM metrics WHERE kind = 'counter'")?;
            let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
            let map = rows.collect::<rusqlite::Result<HashMap<String, i64>>>()?;
            Ok(map)
        })
        .await
    }

    async fn all_gauges(&self) -> Result<HashMap<String, f64>> {
        self.with_retry(|conn| {
            let mut stmt =
                conn.prepare_cached("SELECT id, value FROM metrics WHERE kind = 'gauge'")?;
            let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
            let map = rows.collect::<rusqlite::Result<HashMap<String, f64>>>()?;
            Ok(map)
        })
        .await
    }

    async fn health_check(&self, deadline: Duration) -> Result<()> {
        let check =
            self.with_retry(|conn| conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0)));
        tokio::time::timeout(deadline, check)
            .await
            .map_err(|_| StorageError::Timeout(deadline))??;
        Ok(())
    }
}
