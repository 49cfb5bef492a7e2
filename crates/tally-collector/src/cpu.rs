use crate::Collector;
use anyhow::Result;
use sysinfo::System;
use tally_common::types::MetricRecord;

pub struct CpuCollector {
    system: System,
}

impl CpuCollector {
    pub fn new() -> Self {
        let mut system = System::new();
        // Usage is computed between two refreshes; prime the first one.
        system.refresh_cpu_all();
        Self { system }
    }
}

impl Default for CpuCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl Collector for CpuCollector {
    fn name(&self) -> &str {
        "cpu"
    }

    fn collect(&mut self) -> Result<Vec<MetricRecord>> {
        self.system.refresh_cpu_all();
        let cpus = self.system.cpus();
        let mut records = Vec::with_capacity(cpus.len() + 1);

        records.push(MetricRecord::gauge(
            "CPUutilization",
            self.system.global_cpu_usage() as f64,
        ));
        for (i, cpu) in cpus.iter().enumerate() {
            records.push(MetricRecord::gauge(
                format!("CPUutilization{}", i + 1),
                cpu.cpu_usage() as f64,
            ));
        }

        Ok(records)
    }
}
