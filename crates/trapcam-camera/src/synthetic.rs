use async_trait::async_trait;
use image::{codecs::jpeg::JpegEncoder, ColorType, Rgb, RgbImage};
use tracing::{debug, info};
use trapcam_types::{
    image::{CapturePreset, ImageBuffer},
    Result,
};

use crate::{camera_error, BufferSlot, ImageSource};

/// Source that renders a moving gradient test pattern, for benches without a sensor.
pub struct SyntheticSource {
    preset: CapturePreset,
    frame_index: u32,
    slot: BufferSlot,
}

impl SyntheticSource {
    pub fn new(preset: CapturePreset) -> Self {
        Self {
            preset,
            frame_index: 0,
            slot: BufferSlot::default(),
        }
    }

    fn render(&self) -> Result<Vec<u8>> {
        let CapturePreset { width, height, .. } = self.preset;
        let (w, h) = (width.max(1), height.max(1));
        let shift = self.frame_index.wrapping_mul(7);
        let pattern = RgbImage::from_fn(width, height, |x, y| {
            let r = (((x + shift % w) % w) * 255 / w) as u8;
            let g = (y * 255 / h) as u8;
            let b = (shift % 256) as u8;
            Rgb([r, g, b])
        });

        let mut encoded = Vec::new();
        JpegEncoder::new_with_quality(&mut encoded, self.preset.jpeg_percent())
            .encode(pattern.as_raw(), width, height, ColorType::Rgb8)
            .map_err(|err| camera_error(format!("test pattern encoding failed: {err}")))?;
        Ok(encoded)
    }
}

#[async_trait]
impl ImageSource for SyntheticSource {
    async fn init(&mut self) -> Result<()> {
        info!("Synthetic image source ready at {}", self.preset.resolution());
        Ok(())
    }

    async fn capture(&mut self) -> Result<ImageBuffer> {
        self.slot.claim()?;
        let encoded = match self.render() {
            Ok(encoded) => encoded,
            Err(err) => {
                self.slot.abandon();
                return Err(err);
            }
        };
        self.frame_index = self.frame_index.wrapping_add(1);
        debug!("Rendered synthetic frame {} ({} bytes)", self.frame_index, encoded.len());
        Ok(ImageBuffer::jpeg(encoded, self.preset.width, self.preset.height))
    }

    fn release(&mut self, buffer: ImageBuffer) {
        self.slot.release(buffer);
    }

    async fn apply_preset(&mut self, preset: CapturePreset) -> Result<()> {
        self.preset = preset;
        Ok(())
    }

    fn preset(&self) -> CapturePreset {
        self.preset
    }
}
