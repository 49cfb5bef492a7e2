use crate::Collector;
use anyhow::{anyhow, Result};
use sysinfo::{Pid, ProcessesToUpdate, System};
use tally_common::types::MetricRecord;

/// Samples the agent's own process: resident and virtual memory, CPU share,
/// run time and, where the platform reports them, thread count.
pub struct ProcessCollector {
    system: System,
    pid: Option<Pid>,
}

impl ProcessCollector {
    pub fn new() -> Self {
        let pid = sysinfo::get_current_pid().ok();
        if pid.is_none() {
            tracing::warn!("Current process id unavailable, process metrics disabled");
        }
        Self {
            system: System::new(),
            pid,
        }
    }
}

impl Default for ProcessCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl Collector for ProcessCollector {
    fn name(&self) -> &str {
        "process"
    }

    fn collect(&mut self) -> Result<Vec<MetricRecord>> {
        let pid = self
            .pid
            .ok_or_else(|| anyhow!("current process id unavailable"))?;
        self.system
            .refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        let process = self
            .system
            .process(pid)
            .ok_or_else(|| anyhow!("process {pid} not found"))?;

        let mut records = vec![
            MetricRecord::gauge("ProcessMemory", process.memory() as f64),
            MetricRecord::gauge("ProcessVirtualMemory", process.virtual_memory() as f64),
            MetricRecord::gauge("ProcessCpuUsage", process.cpu_usage() as f64),
            MetricRecord::gauge("ProcessRunTime", process.run_time() as f64),
        ];
        if let Some(tasks) = process.tasks() {
            records.push(MetricRecord::gauge("ProcessThreads", tasks.len() as f64));
        }
        Ok(records)
    }
}
