use std::{fs, path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{image::CapturePreset, TrapcamError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub base_url: String,
    pub device_id: String,
    #[serde(default)]
    pub api_token: Option<String>,
    #[serde(default = "default_http_timeout_ms")]
    pub http_timeout_ms: u64,
    /// Ceiling for one assembled upload body, emulating the device heap.
    #[serde(default)]
    pub max_upload_bytes: Option<usize>,
}

impl NetworkConfig {
    /// Shared secret, if one is configured. An empty token means no auth.
    pub fn auth_token(&self) -> Option<&str> {
        self.api_token
            .as_deref()
            .map(str::trim)
            .filter(|token| !token.is_empty())
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }

    fn base(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    pub fn control_url(&self) -> String {
        format!(
            "{}/api/camera/{}/take-photo-or-video",
            self.base(),
            self.device_id
        )
    }

    pub fn photo_url(&self) -> String {
        format!("{}/api/cameras/{}/photo", self.base(), self.device_id)
    }

    pub fn live_frame_url(&self) -> String {
        format!("{}/api/cameras/{}/live-frame", self.base(), self.device_id)
    }

    pub fn data_usage_url(&self) -> String {
        format!("{}/api/cameras/{}/data-usage", self.base(), self.device_id)
    }

    pub fn energy_url(&self) -> String {
        format!("{}/api/cameras/{}/energy", self.base(), self.device_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    pub probe_timeout_ms: u64,
    pub reconnect_window_ms: u64,
    pub reconnect_backoff_ms: u64,
    pub reconnect_check_interval_ms: u64,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            probe_timeout_ms: 2_000,
            reconnect_window_ms: 60_000,
            reconnect_backoff_ms: 500,
            reconnect_check_interval_ms: 1_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraBackend {
    Fswebcam,
    Synthetic,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraConfig {
    pub backend: CameraBackend,
    #[serde(default = "default_device")]
    pub device: String,
    #[serde(default = "default_snapshot_path")]
    pub snapshot_path: String,
    #[serde(default = "CapturePreset::capture")]
    pub capture: CapturePreset,
    #[serde(default = "CapturePreset::stream")]
    pub stream: CapturePreset,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub poll_interval_ms: u32,
    pub frame_delay_ms: u32,
    pub loop_yield_ms: u64,
    pub restart_delay_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1_000,
            frame_delay_ms: 100,
            loop_yield_ms: 10,
            restart_delay_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpsConfig {
    #[serde(default)]
    pub debug: bool,
    #[serde(default)]
    pub log_level: Option<String>,
    #[serde(default = "default_true")]
    pub usage_enabled: bool,
    #[serde(default = "default_usage_flush")]
    pub usage_flush_every_polls: u32,
    /// Post an energy sample every N polls; 0 disables sampling.
    #[serde(default = "default_energy_every")]
    pub energy_sample_every_polls: u32,
    /// Nominal supply voltage reported with each sample.
    #[serde(default = "default_energy_voltage")]
    pub energy_voltage: f64,
    /// Nominal current draw in amperes reported with each sample.
    #[serde(default = "default_energy_current")]
    pub energy_current: f64,
    #[serde(default = "default_thermal_zone_path")]
    pub thermal_zone_path: String,
}

impl OpsConfig {
    /// Filter directive handed to the tracing subscriber.
    pub fn filter_directive(&self) -> String {
        match &self.log_level {
            Some(level) if !level.trim().is_empty() => level.trim().to_string(),
            _ if self.debug => "debug".into(),
            _ => "info".into(),
        }
    }
}

impl Default for OpsConfig {
    fn default() -> Self {
        Self {
            debug: false,
            log_level: None,
            usage_enabled: true,
            usage_flush_every_polls: default_usage_flush(),
            energy_sample_every_polls: default_energy_every(),
            energy_voltage: default_energy_voltage(),
            energy_current: default_energy_current(),
            thermal_zone_path: default_thermal_zone_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrapcamConfig {
    pub network: NetworkConfig,
    #[serde(default)]
    pub link: LinkConfig,
    pub camera: CameraConfig,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub ops: OpsConfig,
}

impl TrapcamConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref).map_err(|err| {
            TrapcamError::Configuration(format!(
                "unable to read config file {}: {err}",
                path_ref.display()
            ))
        })?;
        Self::from_toml(&contents).map_err(|err| {
            TrapcamError::Configuration(format!(
                "failed to parse config file {}: {err}",
                path_ref.display()
            ))
        })
    }

    pub fn from_toml(contents: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    pub fn validate(&self) -> Result<()> {
        let base = self.network.base_url.trim();
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(TrapcamError::Configuration(format!(
                "network.base_url must be an http(s) URL, got '{base}'"
            )));
        }
        if self.network.device_id.trim().is_empty() {
            return Err(TrapcamError::Configuration(
                "network.device_id must not be empty".into(),
            ));
        }
        if self.network.http_timeout_ms == 0 {
            return Err(TrapcamError::Configuration(
                "network.http_timeout_ms must be greater than zero".into(),
            ));
        }
        if self.timing.poll_interval_ms == 0 || self.timing.frame_delay_ms == 0 {
            return Err(TrapcamError::Configuration(
                "timing.poll_interval_ms and timing.frame_delay_ms must be greater than zero"
                    .into(),
            ));
        }
        if self.link.probe_timeout_ms == 0 || self.link.reconnect_window_ms == 0 {
            return Err(TrapcamError::Configuration(
                "link.probe_timeout_ms and link.reconnect_window_ms must be greater than zero"
                    .into(),
            ));
        }
        for (name, value) in [
            ("energy_voltage", self.ops.energy_voltage),
            ("energy_current", self.ops.energy_current),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(TrapcamError::Configuration(format!(
                    "ops.{name} must be a non-negative number"
                )));
            }
        }
        for (name, preset) in [("capture", &self.camera.capture), ("stream", &self.camera.stream)] {
            if preset.width == 0 || preset.height == 0 {
                return Err(TrapcamError::Configuration(format!(
                    "camera.{name} resolution must be non-zero"
                )));
            }
            if preset.quality > CapturePreset::MAX_QUALITY {
                return Err(TrapcamError::Configuration(format!(
                    "camera.{name}.quality must be between 0 and {}",
                    CapturePreset::MAX_QUALITY
                )));
            }
        }
        Ok(())
    }
}

fn default_http_timeout_ms() -> u64 {
    5_000
}

fn default_device() -> String {
    "/dev/video0".into()
}

fn default_snapshot_path() -> String {
    "/tmp/trapcam_snapshot.jpg".into()
}

fn default_true() -> bool {
    true
}

fn default_usage_flush() -> u32 {
    4
}

fn default_energy_every() -> u32 {
    5
}

fn default_energy_voltage() -> f64 {
    5.0
}

fn default_energy_current() -> f64 {
    0.8
}

fn default_thermal_zone_path() -> String {
    "/sys/class/thermal/thermal_zone0/temp".into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn sample() -> TrapcamConfig {
        TrapcamConfig {
            network: NetworkConfig {
                base_url: "http://192.168.1.6:3001/".into(),
                device_id: "1764782851247".into(),
                api_token: Some("secret".into()),
                http_timeout_ms: 5_000,
                max_upload_bytes: None,
            },
            link: LinkConfig::default(),
            camera: CameraConfig {
                backend: CameraBackend::Synthetic,
                device: default_device(),
                snapshot_path: default_snapshot_path(),
                capture: CapturePreset::capture(),
                stream: CapturePreset::stream(),
            },
            timing: TimingConfig::default(),
            ops: OpsConfig::default(),
        }
    }

    #[test]
    fn endpoint_urls() {
        let config = sample();
        assert_eq!(
            config.network.control_url(),
            "http://192.168.1.6:3001/api/camera/1764782851247/take-photo-or-video"
        );
        assert_eq!(
            config.network.photo_url(),
            "http://192.168.1.6:3001/api/cameras/1764782851247/photo"
        );
        assert_eq!(
            config.network.live_frame_url(),
            "http://192.168.1.6:3001/api/cameras/1764782851247/live-frame"
        );
        assert_eq!(
            config.network.data_usage_url(),
            "http://192.168.1.6:3001/api/cameras/1764782851247/data-usage"
        );
        assert_eq!(
            config.network.energy_url(),
            "http://192.168.1.6:3001/api/cameras/1764782851247/energy"
        );
    }

    #[test]
    fn empty_token_means_no_auth() {
        let mut config = sample();
        assert_eq!(config.network.auth_token(), Some("secret"));
        config.network.api_token = Some("  ".into());
        assert_eq!(config.network.auth_token(), None);
        config.network.api_token = None;
        assert_eq!(config.network.auth_token(), None);
    }

    #[test]
    fn load_config_from_file() {
        let temp_path = std::env::temp_dir().join("trapcam-config-test.toml");
        let config = sample();
        let doc = toml::to_string(&config).expect("serialize config");
        fs::write(&temp_path, doc).expect("write temp config");

        let loaded = TrapcamConfig::from_file(&temp_path).expect("load config");
        assert_eq!(loaded.network.device_id, config.network.device_id);
        assert_eq!(loaded.camera.stream, config.camera.stream);
        assert_eq!(loaded.timing.frame_delay_ms, 100);
        fs::remove_file(&temp_path).expect("cleanup temp config");
    }

    #[test]
    fn minimal_document_uses_defaults() {
        let doc = r#"
            [network]
            base_url = "http://10.0.0.2:3001"
            device_id = "cam-01"

            [camera]
            backend = "fswebcam"
        "#;
        let config = TrapcamConfig::from_toml(doc).expect("parse minimal config");
        assert_eq!(config.network.http_timeout_ms, 5_000);
        assert_eq!(config.camera.capture, CapturePreset::capture());
        assert_eq!(config.timing.poll_interval_ms, 1_000);
        assert_eq!(config.ops.usage_flush_every_polls, 4);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_tables_keep_remaining_defaults() {
        let doc = r#"
            [network]
            base_url = "http://10.0.0.2:3001"
            device_id = "cam-07"

            [camera]
            backend = "synthetic"

            [link]
            reconnect_window_ms = 15000

            [timing]
            poll_interval_ms = 500

            [ops]
            energy_sample_every_polls = 0
        "#;
        let config = TrapcamConfig::from_toml(doc).expect("parse partial tables");
        assert_eq!(config.network.device_id, "cam-07");
        assert_eq!(config.timing.poll_interval_ms, 500);
        assert_eq!(config.timing.frame_delay_ms, 100);
        assert_eq!(config.timing.restart_delay_ms, 5_000);
        assert_eq!(config.link.reconnect_window_ms, 15_000);
        assert_eq!(config.link.probe_timeout_ms, 2_000);
        assert_eq!(config.link.reconnect_check_interval_ms, 1_000);
        assert_eq!(config.ops.energy_sample_every_polls, 0);
        assert_eq!(
            config.ops.thermal_zone_path,
            "/sys/class/thermal/thermal_zone0/temp"
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_configuration_rules() {
        let mut config = sample();
        assert!(config.validate().is_ok());
        config.network.base_url = "192.168.1.6".into();
        assert!(config.validate().is_err());
        config.network.base_url = "http://192.168.1.6:3001".into();
        config.network.device_id = " ".into();
        assert!(config.validate().is_err());
        config.network.device_id = "cam-01".into();
        config.timing.frame_delay_ms = 0;
        assert!(config.validate().is_err());
        config.timing.frame_delay_ms = 100;
        config.camera.stream.quality = 64;
        assert!(config.validate().is_err());
        config.camera.stream.quality = 20;
        config.camera.capture.width = 0;
        assert!(config.validate().is_err());
        config.camera.capture.width = 640;
        config.ops.energy_current = -0.5;
        assert!(config.validate().is_err());
        config.ops.energy_current = 0.8;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn log_filter_prefers_explicit_level() {
        let mut ops = OpsConfig::default();
        assert_eq!(ops.filter_directive(), "info");
        ops.debug = true;
        assert_eq!(ops.filter_directive(), "debug");
        ops.log_level = Some("trapcam_agent=trace".into());
        assert_eq!(ops.filter_directive(), "trapcam_agent=trace");
    }
}
