use anyhow::{ensure, Context};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tally_common::retry::RetryPolicy;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// Seconds between snapshot writes; 0 writes after every update.
    #[serde(default = "default_store_interval")]
    pub store_interval_secs: u64,
    /// Snapshot file. An empty string disables file persistence.
    #[serde(default = "default_file_storage_path")]
    pub file_storage_path: Option<String>,
    /// Load the previous snapshot before serving.
    #[serde(default = "default_restore")]
    pub restore: bool,
    /// SQLite database file. When set, it replaces the snapshot file.
    #[serde(default)]
    pub database_path: Option<String>,
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_secs: u64,
}

fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_store_interval() -> u64 {
    300
}

fn default_file_storage_path() -> Option<String> {
    Some("data/metrics.json".to_string())
}

fn default_restore() -> bool {
    true
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_shutdown_grace() -> u64 {
    5
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            store_interval_secs: default_store_interval(),
            file_storage_path: default_file_storage_path(),
            restore: default_restore(),
            database_path: None,
            retry_attempts: default_retry_attempts(),
            shutdown_grace_secs: default_shutdown_grace(),
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl ServerConfig {
    /// Reads a TOML config file. A missing file yields the defaults.
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let config = match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str::<Self>(&content)
                .with_context(|| format!("invalid server config {path}"))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path, "Config file not found, using defaults");
                Self::default()
            }
            Err(e) => return Err(e).with_context(|| format!("failed to read {path}")),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.listen_socket_addr()?;
        ensure!(self.retry_attempts >= 1, "retry_attempts must be >= 1");
        Ok(())
    }

    pub fn listen_socket_addr(&self) -> anyhow::Result<SocketAddr> {
        self.listen_addr
            .parse()
            .with_context(|| format!("invalid listen_addr '{}'", self.listen_addr))
    }

    pub fn snapshot_path(&self) -> Option<PathBuf> {
        non_empty(&self.file_storage_path).map(PathBuf::from)
    }

    pub fn database_path(&self) -> Option<PathBuf> {
        non_empty(&self.database_path).map(PathBuf::from)
    }

    pub fn store_interval(&self) -> Duration {
        Duration::from_secs(self.store_interval_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::default().with_max_attempts(self.retry_attempts)
    }
}
