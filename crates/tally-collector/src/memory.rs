use crate::Collector;
use anyhow::Result;
use sysinfo::System;
use tally_common::types::MetricRecord;

pub struct MemoryCollector {
    system: System,
}

impl MemoryCollector {
    pub fn new() -> Self {
        Self {
            system: System::new(),
        }
    }
}

impl Default for MemoryCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl Collector for MemoryCollector {
    fn name(&self) -> &str {
        "memory"
    }

    fn collect(&mut self) -> Result<Vec<MetricRecord>> {
        self.system.refresh_memory();

        Ok(vec![
            MetricRecord::gauge("TotalMemory", self.system.total_memory() as f64),
            MetricRecord::gauge("UsedMemory", self.system.used_memory() as f64),
            MetricRecord::gauge("FreeMemory", self.system.free_memory() as f64),
            MetricRecord::gauge("AvailableMemory", self.system.available_memory() as f64),
            // Swap
            MetricRecord::gauge("TotalSwap", self.system.total_swap() as f64),
            MetricRecord::gauge("UsedSwap", self.system.used_swap() as f64),
        ])
    }
}
