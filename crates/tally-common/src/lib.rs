//! Types and machinery shared by the tally agent and collector.
//!
//! [`types`] holds the metric record that flows through the whole pipeline;
//! [`retry`] holds the classifier-driven retry executor used by both the
//! agent's network sender and the collector's database store.

pub mod retry;
pub mod types;

pub use retry::{Classification, ErrorClassifier, RetryError, RetryExecutor, RetryPolicy};
pub use types::{Metric, MetricBatch, MetricKind, MetricRecord, ValidationError};
