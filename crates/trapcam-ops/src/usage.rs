use std::collections::HashMap;

use trapcam_types::telemetry::{DataUsageReport, UsageCategory};

/// Bytes exchanged with the backend, bucketed by category until flushed.
#[derive(Debug, Clone)]
pub struct UsageLedger {
    enabled: bool,
    flush_every_polls: u32,
    buckets: HashMap<UsageCategory, u64>,
}

impl UsageLedger {
    pub fn new(enabled: bool, flush_every_polls: u32) -> Self {
        Self {
            enabled,
            flush_every_polls,
            buckets: HashMap::new(),
        }
    }

    pub fn disabled() -> Self {
        Self::new(false, 0)
    }

    pub fn add(&mut self, category: UsageCategory, bytes: usize) {
        if !self.enabled || bytes == 0 {
            return;
        }
        *self.buckets.entry(category).or_default() += bytes as u64;
    }

    pub fn total(&self, category: UsageCategory) -> u64 {
        self.buckets.get(&category).copied().unwrap_or(0)
    }

    /// Whether the poll with ordinal `poll_count` (1-based) should trigger a flush.
    pub fn flush_due(&self, poll_count: u64) -> bool {
        self.enabled
            && self.flush_every_polls > 0
            && poll_count > 0
            && poll_count % self.flush_every_polls as u64 == 0
    }

    /// Non-empty buckets in a stable order.
    pub fn pending(&self) -> Vec<DataUsageReport> {
        UsageCategory::ALL
            .iter()
            .filter_map(|category| {
                let bytes = self.total(*category);
                (bytes > 0).then_some(DataUsageReport {
                    category: *category,
                    bytes,
                })
            })
            .collect()
    }

    /// Subtract a delivered report; bytes added since it was taken are kept.
    pub fn acknowledge(&mut self, report: &DataUsageReport) {
        if let Some(total) = self.buckets.get_mut(&report.category) {
            *total = total.saturating_sub(report.bytes);
        }
    }
}
