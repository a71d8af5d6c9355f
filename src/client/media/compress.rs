//! Photo downscaling and video compression

use super::MediaError;
use async_trait::async_trait;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;

/// A re-encoded photo
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedPhoto {
    pub jpeg: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Fit a photo within `max_dimension` on its longest edge and re-encode it
/// as JPEG. Smaller photos keep their size but are still re-encoded.
pub fn downscale_photo(raw: &[u8], max_dimension: u32, quality: u8) -> Result<EncodedPhoto, MediaError> {
    let image = image::load_from_memory(raw).map_err(|e| MediaError::Encode(e.to_string()))?;
    let image = if image.width().max(image.height()) > max_dimension {
        image.resize(max_dimension, max_dimension, FilterType::Triangle)
    } else {
        image
    };

    let rgb = image.to_rgb8();
    let mut jpeg = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut jpeg, quality.clamp(1, 100));
    rgb.write_with_encoder(encoder)
        .map_err(|e| MediaError::Encode(e.to_string()))?;

    Ok(EncodedPhoto {
        jpeg,
        width: rgb.width(),
        height: rgb.height(),
    })
}

/// Shrinks oversized videos before upload
#[async_trait]
pub trait VideoCompressor: Send + Sync {
    async fn compress(&self, video: Vec<u8>, mime_type: &str) -> Result<Vec<u8>, MediaError>;
}

/// Leaves videos untouched
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCompressor;

#[async_trait]
impl VideoCompressor for NoopCompressor {
    async fn compress(&self, video: Vec<u8>, _mime_type: &str) -> Result<Vec<u8>, MediaError> {
        Ok(video)
    }
}

#[cfg(test)]
pub(crate) fn sample_png(width: u32, height: u32) -> Vec<u8> {
    let image = image::RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
    });
    let mut png = Vec::new();
    image::DynamicImage::ImageRgb8(image)
        .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
        .unwrap();
    png
}
