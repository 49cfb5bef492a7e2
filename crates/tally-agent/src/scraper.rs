use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tally_collector::Collector;
use tally_common::types::{MetricBatch, MetricRecord};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

pub const POLL_COUNT: &str = "PollCount";

/// Periodic sampler feeding the bounded report queue.
///
/// When the queue is full the newest batch is dropped and counted; the
/// scraper never waits on the reporter.
pub struct Scraper {
    collectors: Vec<Box<dyn Collector>>,
    queue: mpsc::Sender<MetricBatch>,
    interval: Duration,
    dropped: Arc<AtomicU64>,
}

impl Scraper {
    pub fn new(
        collectors: Vec<Box<dyn Collector>>,
        queue: mpsc::Sender<MetricBatch>,
        interval: Duration,
    ) -> Self {
        Self {
            collectors,
            queue,
            interval,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Shared handle to the number of batches dropped on a full queue.
    pub fn dropped_counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.dropped)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Runs every collector once. A failing collector is skipped for this
    /// cycle; `PollCount` is always appended with a delta of one.
    pub fn sample(&mut self) -> MetricBatch {
        let mut batch = MetricBatch::new();
        for collector in &mut self.collectors {
            match collector.collect() {
                Ok(records) => {
                    for record in records {
                        batch.push(record);
                    }
                }
                Err(e) => {
                    tracing::warn!(collector = collector.name(), error = %e, "Collection failed")
                }
            }
        }
        batch.push(MetricRecord::counter(POLL_COUNT, 1));
        batch
    }

    /// Samples once and enqueues the batch. Returns whether it was queued.
    pub fn scrape_once(&mut self) -> bool {
        let batch = self.sample();
        let count = batch.len();
        match self.queue.try_send(batch) {
            Ok(()) => {
                tracing::debug!(count, "Batch queued");
                true
            }
            Err(TrySendError::Full(_)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::warn!(count, dropped, "Report queue full, dropping batch");
                false
            }
            Err(TrySendError::Closed(_)) => {
                tracing::warn!(count, "Report queue closed, dropping batch");
                false
            }
        }
    }

    /// Samples on every tick until `cancel` fires. The queue sender is
    /// dropped on return, which lets the reporter see the queue close.
    pub async fn run(mut self, cancel: CancellationToken) {
        let mut tick = tokio::time::interval(self.interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            interval_secs = self.interval.as_secs(),
            collectors = self.collectors.len(),
            "Scraper started"
        );

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    self.scrape_once();
                }
                _ = cancel.cancelled() => break,
            }
        }

        tracing::info!(dropped = self.dropped(), "Scraper stopped");
    }
}
