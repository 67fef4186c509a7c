//! Image source capability and its implementations.

mod fswebcam;
mod synthetic;

pub use fswebcam::FswebcamSource;
pub use synthetic::SyntheticSource;

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use tracing::{debug, info};
use trapcam_types::{
    config::{CameraBackend, CameraConfig},
    image::{CapturePreset, ImageBuffer},
    Result, TrapcamError,
};

/// Acquires one encoded image at a time.
///
/// At most one buffer may be outstanding: `capture` fails until the previous
/// buffer has been handed back through `release`.
#[async_trait]
pub trait ImageSource: Send {
    async fn init(&mut self) -> Result<()>;
    async fn capture(&mut self) -> Result<ImageBuffer>;
    fn release(&mut self, buffer: ImageBuffer);
    async fn apply_preset(&mut self, preset: CapturePreset) -> Result<()>;
    fn preset(&self) -> CapturePreset;
}

#[async_trait]
impl ImageSource for Box<dyn ImageSource> {
    async fn init(&mut self) -> Result<()> {
        (**self).init().await
    }

    async fn capture(&mut self) -> Result<ImageBuffer> {
        (**self).capture().await
    }

    fn release(&mut self, buffer: ImageBuffer) {
        (**self).release(buffer)
    }

    async fn apply_preset(&mut self, preset: CapturePreset) -> Result<()> {
        (**self).apply_preset(preset).await
    }

    fn preset(&self) -> CapturePreset {
        (**self).preset()
    }
}

/// Tracks the single outstanding buffer a source may hand out.
#[derive(Debug, Default)]
pub struct BufferSlot {
    outstanding: bool,
}

impl BufferSlot {
    pub fn claim(&mut self) -> Result<()> {
        if self.outstanding {
            return Err(camera_error(
                "capture requested while a buffer is still outstanding",
            ));
        }
        self.outstanding = true;
        Ok(())
    }

    /// Undo a claim whose capture did not produce a buffer.
    pub fn abandon(&mut self) {
        self.outstanding = false;
    }

    pub fn release(&mut self, buffer: ImageBuffer) {
        debug!("Releasing image buffer ({} bytes)", buffer.len());
        self.outstanding = false;
    }
}

/// Build the source selected by the camera config.
pub fn source_from_config(config: &CameraConfig) -> Box<dyn ImageSource> {
    match config.backend {
        CameraBackend::Fswebcam => Box::new(FswebcamSource::new(config.clone())),
        CameraBackend::Synthetic => Box::new(SyntheticSource::new(config.capture)),
    }
}

/// What a `MockImageSource` has been asked to do.
#[derive(Debug, Default, Clone)]
pub struct MockCameraLog {
    pub captures: u32,
    pub failed_captures: u32,
    pub releases: u32,
    pub presets: Vec<CapturePreset>,
    pub overlapping_captures: u32,
}

/// Scripted source used for integration and testing.
pub struct MockImageSource {
    frame: Vec<u8>,
    script: VecDeque<bool>,
    fail_init: bool,
    preset: CapturePreset,
    slot: BufferSlot,
    log: Arc<Mutex<MockCameraLog>>,
}

impl MockImageSource {
    pub fn new(frame: Vec<u8>) -> Self {
        Self {
            frame,
            script: VecDeque::new(),
            fail_init: false,
            preset: CapturePreset::capture(),
            slot: BufferSlot::default(),
            log: Arc::new(Mutex::new(MockCameraLog::default())),
        }
    }

    /// Queue capture outcomes; once drained every capture succeeds.
    pub fn with_script(mut self, outcomes: impl IntoIterator<Item = bool>) -> Self {
        self.script.extend(outcomes);
        self
    }

    pub fn failing_always(mut self) -> Self {
        self.script = std::iter::repeat(false).take(u16::MAX as usize).collect();
        self
    }

    pub fn failing_init(mut self) -> Self {
        self.fail_init = true;
        self
    }

    pub fn log_handle(&self) -> Arc<Mutex<MockCameraLog>> {
        Arc::clone(&self.log)
    }

    fn with_log(&self, update: impl FnOnce(&mut MockCameraLog)) {
        if let Ok(mut guard) = self.log.lock() {
            update(&mut guard);
        }
    }
}

#[async_trait]
impl ImageSource for MockImageSource {
    async fn init(&mut self) -> Result<()> {
        if self.fail_init {
            return Err(camera_error("mock sensor did not respond"));
        }
        info!("Mock image source ready");
        Ok(())
    }

    async fn capture(&mut self) -> Result<ImageBuffer> {
        if let Err(err) = self.slot.claim() {
            self.with_log(|log| log.overlapping_captures += 1);
            return Err(err);
        }
        let succeed = self.script.pop_front().unwrap_or(true);
        self.with_log(|log| log.captures += 1);
        if !succeed {
            self.slot.abandon();
            self.with_log(|log| log.failed_captures += 1);
            return Err(camera_error("mock capture returned no frame"));
        }
        Ok(ImageBuffer::jpeg(
            self.frame.clone(),
            self.preset.width,
            self.preset.height,
        ))
    }

    fn release(&mut self, buffer: ImageBuffer) {
        self.slot.release(buffer);
        self.with_log(|log| log.releases += 1);
    }

    async fn apply_preset(&mut self, preset: CapturePreset) -> Result<()> {
        self.preset = preset;
        self.with_log(|log| log.presets.push(preset));
        Ok(())
    }

    fn preset(&self) -> CapturePreset {
        self.preset
    }
}

/// Generate an error aligned with camera semantics.
pub fn camera_error(message: impl Into<String>) -> TrapcamError {
    TrapcamError::Camera(message.into())
}
