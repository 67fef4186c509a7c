use std::fmt;

use serde::{Deserialize, Serialize};

/// Buckets used when accounting bytes exchanged with the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UsageCategory {
    Photo,
    Stream,
    System,
}

impl UsageCategory {
    pub const ALL: [UsageCategory; 3] = [
        UsageCategory::Photo,
        UsageCategory::Stream,
        UsageCategory::System,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            UsageCategory::Photo => "photo",
            UsageCategory::Stream => "stream",
            UsageCategory::System => "system",
        }
    }
}

impl fmt::Display for UsageCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// JSON body posted to the data-usage endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataUsageReport {
    #[serde(rename = "type")]
    pub category: UsageCategory,
    pub bytes: u64,
}

/// JSON body posted to the energy endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnergySample {
    pub voltage: f64,
    pub current: f64,
    pub watts: f64,
    #[serde(rename = "cpuTemp")]
    pub cpu_temp: f64,
}

impl EnergySample {
    pub fn new(voltage: f64, current: f64, cpu_temp: f64) -> Self {
        Self {
            voltage,
            current,
            watts: voltage * current,
            cpu_temp,
        }
    }
}

/// Aggregated agent counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentCounters {
    pub polls: u64,
    pub poll_failures: u64,
    pub photos_uploaded: u64,
    pub frames_uploaded: u64,
    pub capture_failures: u64,
    pub encode_failures: u64,
    pub upload_failures: u64,
    pub streams_completed: u64,
    pub link_losses: u64,
}
