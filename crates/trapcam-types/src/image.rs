use serde::{Deserialize, Serialize};

/// Encoded JPEG frame handed out by an image source.
///
/// Deliberately not `Clone`: a buffer is owned by exactly one action and goes
/// back to its source through `ImageSource::release`.
#[derive(Debug)]
pub struct ImageBuffer {
    data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl ImageBuffer {
    pub fn jpeg(data: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            data,
            width,
            height,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Paired resolution and JPEG quality applied to the sensor.
///
/// Quality uses the sensor scale: 0..=63, lower means better.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturePreset {
    pub width: u32,
    pub height: u32,
    pub quality: u8,
}

impl CapturePreset {
    pub const MAX_QUALITY: u8 = 63;

    /// VGA at high quality, used for single photos.
    pub const fn capture() -> Self {
        Self {
            width: 640,
            height: 480,
            quality: 10,
        }
    }

    /// QVGA at medium quality, used while streaming.
    pub const fn stream() -> Self {
        Self {
            width: 320,
            height: 240,
            quality: 20,
        }
    }

    pub fn resolution(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }

    /// Map the sensor scale onto the conventional 1..=100 JPEG scale.
    pub fn jpeg_percent(&self) -> u8 {
        let quality = self.quality.min(Self::MAX_QUALITY) as u32;
        let percent = 100 - (quality * 99) / Self::MAX_QUALITY as u32;
        percent.clamp(1, 100) as u8
    }
}
