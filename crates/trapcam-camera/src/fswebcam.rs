use std::path::PathBuf;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};
use trapcam_types::{
    config::CameraConfig,
    image::{CapturePreset, ImageBuffer},
    Result,
};

use crate::{camera_error, BufferSlot, ImageSource};

const FSWEBCAM: &str = "fswebcam";

/// USB webcam driven through the `fswebcam` command-line grabber.
pub struct FswebcamSource {
    device: String,
    snapshot_path: PathBuf,
    preset: CapturePreset,
    slot: BufferSlot,
}

impl FswebcamSource {
    pub fn new(config: CameraConfig) -> Self {
        Self {
            device: config.device,
            snapshot_path: PathBuf::from(config.snapshot_path),
            preset: config.capture,
            slot: BufferSlot::default(),
        }
    }

    fn capture_args(&self) -> Vec<String> {
        vec![
            "-q".into(),
            "-d".into(),
            self.device.clone(),
            "-r".into(),
            self.preset.resolution(),
            "--jpeg".into(),
            self.preset.jpeg_percent().to_string(),
            "--no-banner".into(),
            self.snapshot_path.display().to_string(),
        ]
    }

    async fn run(&self, args: &[String]) -> Result<()> {
        let output = Command::new(FSWEBCAM)
            .args(args)
            .output()
            .await
            .map_err(|err| camera_error(format!("failed to run {FSWEBCAM} {args:?}: {err}")))?;

        if output.status.success() {
            Ok(())
        } else {
            Err(camera_error(format!(
                "{FSWEBCAM} exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )))
        }
    }

    async fn grab(&self) -> Result<ImageBuffer> {
        // Stale snapshots from a previous grab must never be uploaded twice.
        let _ = tokio::fs::remove_file(&self.snapshot_path).await;
        self.run(&self.capture_args()).await?;
        let data = tokio::fs::read(&self.snapshot_path).await.map_err(|err| {
            camera_error(format!(
                "snapshot missing at {}: {err}",
                self.snapshot_path.display()
            ))
        })?;
        if data.is_empty() {
            return Err(camera_error("fswebcam produced an empty frame"));
        }
        Ok(ImageBuffer::jpeg(data, self.preset.width, self.preset.height))
    }
}

#[async_trait]
impl ImageSource for FswebcamSource {
    async fn init(&mut self) -> Result<()> {
        info!("Probing {FSWEBCAM} for device {}", self.device);
        self.run(&["--version".to_string()]).await?;
        Ok(())
    }

    async fn capture(&mut self) -> Result<ImageBuffer> {
        self.slot.claim()?;
        match self.grab().await {
            Ok(buffer) => {
                debug!("Captured {} bytes at {}", buffer.len(), self.preset.resolution());
                Ok(buffer)
            }
            Err(err) => {
                self.slot.abandon();
                Err(err)
            }
        }
    }

    fn release(&mut self, buffer: ImageBuffer) {
        self.slot.release(buffer);
    }

    async fn apply_preset(&mut self, preset: CapturePreset) -> Result<()> {
        // fswebcam takes resolution and quality per invocation.
        self.preset = preset;
        Ok(())
    }

    fn preset(&self) -> CapturePreset {
        self.preset
    }
}
