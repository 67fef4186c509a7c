use std::path::PathBuf;

use tokio::fs;
use tracing::debug;
use trapcam_types::{config::OpsConfig, telemetry::EnergySample};

/// Periodic power and CPU-temperature sample.
///
/// Voltage and current are nominal figures from the config; only the
/// temperature is measured. A sample is skipped when the thermal zone cannot
/// be read.
#[derive(Debug, Clone)]
pub struct EnergySampler {
    every_polls: u32,
    voltage: f64,
    current: f64,
    thermal_zone: PathBuf,
}

impl EnergySampler {
    pub fn new(config: &OpsConfig) -> Self {
        Self {
            every_polls: config.energy_sample_every_polls,
            voltage: config.energy_voltage,
            current: config.energy_current,
            thermal_zone: PathBuf::from(&config.thermal_zone_path),
        }
    }

    pub fn due(&self, poll_count: u64) -> bool {
        self.every_polls > 0 && poll_count > 0 && poll_count % self.every_polls as u64 == 0
    }

    pub async fn sample(&self) -> Option<EnergySample> {
        let cpu_temp = self.read_cpu_temperature().await?;
        Some(EnergySample::new(self.voltage, self.current, cpu_temp))
    }

    /// Degrees Celsius from a sysfs thermal zone, which reports millidegrees.
    async fn read_cpu_temperature(&self) -> Option<f64> {
        let raw = match fs::read_to_string(&self.thermal_zone).await {
            Ok(raw) => raw,
            Err(err) => {
                debug!(
                    "Cannot read CPU temperature from {}: {err}",
                    self.thermal_zone.display()
                );
                return None;
            }
        };
        match raw.trim().parse::<i64>() {
            Ok(millis) => Some(millis as f64 / 1000.0),
            Err(err) => {
                debug!(
                    "Unexpected CPU temperature '{}' in {}: {err}",
                    raw.trim(),
                    self.thermal_zone.display()
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sampler_reading(name: &str, contents: Option<&str>) -> EnergySampler {
        let path = std::env::temp_dir().join(format!(
            "trapcam-thermal-{}-{name}",
            std::process::id()
        ));
        match contents {
            Some(contents) => std::fs::write(&path, contents).expect("write thermal zone"),
            None => {
                let _ = std::fs::remove_file(&path);
            }
        }
        EnergySampler::new(&OpsConfig {
            energy_sample_every_polls: 3,
            thermal_zone_path: path.display().to_string(),
            ..OpsConfig::default()
        })
    }

    #[test]
    fn due_every_n_polls() {
        let sampler = sampler_reading("due", None);
        let due: Vec<u64> = (0..10).filter(|poll| sampler.due(*poll)).collect();
        assert_eq!(due, vec![3, 6, 9]);

        let disabled = EnergySampler::new(&OpsConfig {
            energy_sample_every_polls: 0,
            ..OpsConfig::default()
        });
        assert!(!(0..10).any(|poll| disabled.due(poll)));
    }

    #[tokio::test]
    async fn sample_reads_millidegrees() {
        let sampler = sampler_reading("ok", Some("48500\n"));
        let sample = sampler.sample().await.expect("sample");
        assert_eq!(sample.cpu_temp, 48.5);
        assert_eq!(sample.voltage, 5.0);
        assert!((sample.watts - 4.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn unreadable_zone_skips_sample() {
        assert!(sampler_reading("missing", None).sample().await.is_none());
        assert!(sampler_reading("garbage", Some("hot")).sample().await.is_none());
    }
}
