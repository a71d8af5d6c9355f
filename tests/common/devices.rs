//! Fake devices and polling helpers

use async_trait::async_trait;
use fieldops::client::media::{Camera, CameraDevice, CaptureMode, CapturedBlob, DeviceError, Facing, Frame};
use std::future::Future;
use std::time::Duration;

/// Camera that always captures the same image
pub struct StillCamera {
    pub image: Vec<u8>,
}

impl StillCamera {
    /// A PNG of the given size
    pub fn png(width: u32, height: u32) -> Self {
        let image = image::RgbImage::from_fn(width, height, |x, y| image::Rgb([(x % 256) as u8, (y % 256) as u8, 64]));
        let mut png = Vec::new();
        image::DynamicImage::ImageRgb8(image)
            .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
            .expect("Failed to encode test image");
        Self { image: png }
    }
}

struct StillDevice {
    image: Vec<u8>,
}

#[async_trait]
impl CameraDevice for StillDevice {
    async fn preview_frame(&mut self) -> Result<Frame, DeviceError> {
        Ok(Frame {
            width: 1,
            height: 1,
            rgb: vec![0, 0, 0],
        })
    }

    async fn capture(&mut self) -> Result<CapturedBlob, DeviceError> {
        Ok(CapturedBlob {
            bytes: self.image.clone(),
            mime_type: "image/png".to_string(),
        })
    }

    fn release(&mut self) {}
}

#[async_trait]
impl Camera for StillCamera {
    async fn open(&self, _mode: CaptureMode, _facing: Facing) -> Result<Box<dyn CameraDevice>, DeviceError> {
        Ok(Box::new(StillDevice {
            image: self.image.clone(),
        }))
    }
}

/// Poll `check` until it returns true, for at most two seconds
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
