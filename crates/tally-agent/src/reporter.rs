use crate::transport::{DeliveryClassifier, Transport};
use rand::Rng;
use std::time::Duration;
use tally_common::retry::{RetryExecutor, RetryPolicy};
use tally_common::types::{MetricBatch, MetricRecord};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

pub const RANDOM_VALUE: &str = "RandomValue";

/// What happened on one report tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportOutcome {
    /// Nothing was queued; the transport was not called.
    Skipped,
    /// The combined batch was accepted; holds the record count.
    Delivered(usize),
    /// Delivery failed for good and the batch was dropped.
    Discarded(usize),
}

/// Periodic sender draining the scraper's queue.
///
/// Delivery is at-most-once: a batch that fails after the retry budget is
/// logged and discarded, never re-queued.
pub struct Reporter<T> {
    transport: T,
    queue: mpsc::Receiver<MetricBatch>,
    retry: RetryExecutor<DeliveryClassifier>,
    interval: Duration,
    shutdown_grace: Duration,
}

impl<T: Transport> Reporter<T> {
    /// `cancel` also interrupts retry backoff, so a shutdown never waits out
    /// a pending delay.
    pub fn new(
        transport: T,
        queue: mpsc::Receiver<MetricBatch>,
        policy: RetryPolicy,
        interval: Duration,
        shutdown_grace: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            transport,
            queue,
            retry: RetryExecutor::new(policy, DeliveryClassifier, cancel),
            interval,
            shutdown_grace,
        }
    }

    /// Takes every batch queued right now, in FIFO order, as one batch.
    fn drain(&mut self) -> Option<MetricBatch> {
        let mut combined = MetricBatch::new();
        while let Ok(batch) = self.queue.try_recv() {
            combined.extend(batch);
        }
        (!combined.is_empty()).then_some(combined)
    }

    async fn deliver(&self, mut batch: MetricBatch) -> ReportOutcome {
        let random: f64 = rand::thread_rng().gen();
        batch.push(MetricRecord::gauge(RANDOM_VALUE, random));
        let count = batch.len();

        let transport = &self.transport;
        let batch = &batch;
        match self.retry.execute(move || transport.send_batch(batch)).await {
            Ok(()) => {
                tracing::debug!(count, "Metrics reported");
                ReportOutcome::Delivered(count)
            }
            Err(e) => {
                tracing::warn!(
                    count,
                    attempts = e.attempts(),
                    error = %e.last_error(),
                    "Failed to report metrics, discarding batch"
                );
                ReportOutcome::Discarded(count)
            }
        }
    }

    /// One report cycle: drain, then send if anything was queued.
    pub async fn report_once(&mut self) -> ReportOutcome {
        match self.drain() {
            Some(batch) => self.deliver(batch).await,
            None => {
                tracing::debug!("Report queue empty, skipping cycle");
                ReportOutcome::Skipped
            }
        }
    }

    /// Reports every interval until `cancel` fires, then makes one bounded
    /// attempt to flush whatever is still queued.
    pub async fn run(mut self, cancel: CancellationToken) {
        let mut tick = tokio::time::interval(self.interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; report after a full interval.
        tick.tick().await;

        tracing::info!(interval_secs = self.interval.as_secs(), "Reporter started");

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    self.report_once().await;
                }
                _ = cancel.cancelled() => break,
            }
        }

        self.flush().await;
        tracing::info!("Reporter stopped");
    }

    async fn flush(&mut self) {
        let Some(batch) = self.drain() else {
            return;
        };
        let grace = self.shutdown_grace;
        match tokio::time::timeout(grace, self.deliver(batch)).await {
            Ok(outcome) => tracing::info!(?outcome, "Flushed queued metrics on shutdown"),
            Err(_) => tracing::warn!(
                grace_secs = grace.as_secs(),
                "Shutdown flush timed out, abandoning queued metrics"
            ),
        }
    }
}
