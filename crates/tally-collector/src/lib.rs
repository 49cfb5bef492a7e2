//! Metric samplers for the tally agent.
//!
//! Each [`Collector`] reads one category of runtime state (own process,
//! memory, load, CPU) and returns it as [`MetricRecord`]s that the agent's
//! scraper folds into a single batch per poll cycle.

pub mod cpu;
pub mod load;
pub mod memory;
pub mod process;

use anyhow::Result;
use tally_common::types::MetricRecord;

pub use cpu::CpuCollector;
pub use load::LoadCollector;
pub use memory::MemoryCollector;
pub use process::ProcessCollector;

/// A sampler that runs on the agent host.
///
/// Implementations are registered with the scraper and called once per poll
/// interval. The trait requires `Send + Sync` so the scraper can own its
/// collectors inside a spawned task.
pub trait Collector: Send + Sync {
    /// Short name used in log fields (e.g. `"cpu"`).
    fn name(&self) -> &str;

    /// Samples current values.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying system API call fails.
    fn collect(&mut self) -> Result<Vec<MetricRecord>>;
}

/// The default sampler set used by the agent binary.
pub fn default_collectors() -> Vec<Box<dyn Collector>> {
    vec![
        Box::new(ProcessCollector::new()),
        Box::new(MemoryCollector::new()),
        Box::new(LoadCollector::new()),
        Box::new(CpuCollector::new()),
    ]
}
