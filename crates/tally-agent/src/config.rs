use anyhow::{ensure, Context};
use serde::Deserialize;
use std::time::Duration;
use tally_common::retry::RetryPolicy;

#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Collector address; `http://` is assumed when no scheme is given.
    #[serde(default = "default_server_endpoint")]
    pub server_endpoint: String,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_report_interval")]
    pub report_interval_secs: u64,
    /// Number of batches the scraper may queue ahead of the reporter.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_secs: u64,
}

fn default_server_endpoint() -> String {
    "localhost:8080".to_string()
}

fn default_poll_interval() -> u64 {
    2
}

fn default_report_interval() -> u64 {
    10
}

fn default_queue_capacity() -> usize {
    256
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_request_timeout() -> u64 {
    10
}

fn default_shutdown_grace() -> u64 {
    5
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            server_endpoint: default_server_endpoint(),
            poll_interval_secs: default_poll_interval(),
            report_interval_secs: default_report_interval(),
            queue_capacity: default_queue_capacity(),
            retry_attempts: default_retry_attempts(),
            request_timeout_secs: default_request_timeout(),
            shutdown_grace_secs: default_shutdown_grace(),
        }
    }
}

impl AgentConfig {
    /// Reads a TOML config file. A missing file yields the defaults.
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let config = match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str::<Self>(&content)
                .with_context(|| format!("invalid agent config {path}"))?,
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
        ensure!(self.poll_interval_secs > 0, "poll_interval_secs must be > 0");
        ensure!(self.report_interval_secs > 0, "report_interval_secs must be > 0");
        ensure!(self.queue_capacity > 0, "queue_capacity must be > 0");
        ensure!(self.retry_attempts >= 1, "retry_attempts must be >= 1");
        ensure!(
            !self.server_endpoint.trim().is_empty(),
            "server_endpoint must not be empty"
        );
        Ok(())
    }

    /// Base URL of the collector, with a scheme.
    pub fn endpoint_url(&self) -> String {
        let addr = self.server_endpoint.trim().trim_end_matches('/');
        if addr.contains("://") {
            return addr.to_string();
        }
        format!("http://{addr}")
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_secs(self.report_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::default().with_max_attempts(self.retry_attempts)
    }
}
