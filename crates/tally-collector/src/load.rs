use crate::Collector;
use anyhow::Result;
use sysinfo::System;
use tally_common::types::MetricRecord;

#[derive(Default)]
pub struct LoadCollector;

impl LoadCollector {
    pub fn new() -> Self {
        Self
    }
}

impl Collector for LoadCollector {
    fn name(&self) -> &str {
        "load"
    }

    fn collect(&mut self) -> Result<Vec<MetricRecord>> {
        let load_avg = System::load_average();

        Ok(vec![
            MetricRecord::gauge("LoadAverage1", load_avg.one),
            MetricRecord::gauge("LoadAverage5", load_avg.five),
            MetricRecord::gauge("LoadAverage15", load_avg.fifteen),
        ])
    }
}
