//! Image preprocessing
//!
//! Decodes uploaded bytes (JPEG/PNG/WebP/GIF/...) into a three-channel RGB
//! image. Size limits are checked on the encoded length and on the header
//! dimensions before the full decode, so oversized uploads are rejected
//! without allocating their pixel buffer.

use crate::config::ImageLimits;
use image::{ImageFormat, ImageReader, RgbImage};
use std::io::Cursor;
use thiserror::Error;

/// Preprocessing errors
#[derive(Debug, Error)]
pub enum PreprocessError {
    /// Bytes are not a supported raster image or are corrupt
    #[error("Image decode failed: {0}")]
    Decode(String),

    /// Encoded size or dimensions exceed configured limits
    #[error("Image too large: {0}")]
    TooLarge(String),
}

/// Decoded RGB image, independent of the source encoding
#[derive(Debug, Clone)]
pub struct NormalizedImage {
    pixels: RgbImage,
    source_format: ImageFormat,
}

impl NormalizedImage {
    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    /// Always 3 (RGB, no alpha)
    pub fn channels(&self) -> u8 {
        3
    }

    pub fn pixels(&self) -> &RgbImage {
        &self.pixels
    }

    /// Encoding the image arrived in (diagnostics only)
    pub fn source_format(&self) -> ImageFormat {
        self.source_format
    }
}

/// Image preprocessor bound to a set of limits
#[derive(Debug, Clone, Default)]
pub struct ImagePreprocessor {
    limits: ImageLimits,
}

impl ImagePreprocessor {
    pub fn new(limits: ImageLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &ImageLimits {
        &self.limits
    }

    /// Decode raw bytes into a normalized RGB image
    pub fn decode_and_normalize(&self, bytes: &[u8]) -> Result<NormalizedImage, PreprocessError> {
        if bytes.is_empty() {
            return Err(PreprocessError::Decode("empty image data".to_string()));
        }
        if bytes.len() > self.limits.max_bytes {
            return Err(PreprocessError::TooLarge(format!(
                "{} bytes exceeds limit of {} bytes",
                bytes.len(),
                self.limits.max_bytes
            )));
        }

        let source_format = guessed_reader(bytes)?
            .format()
            .ok_or_else(|| PreprocessError::Decode("unrecognized image format".to_string()))?;

        let (width, height) = guessed_reader(bytes)?
            .into_dimensions()
            .map_err(|e| PreprocessError::Decode(e.to_string()))?;
        if width == 0 || height == 0 {
            return Err(PreprocessError::Decode(format!(
                "degenerate image dimensions {}x{}",
                width, height
            )));
        }
        if width > self.limits.max_width || height > self.limits.max_height {
            return Err(PreprocessError::TooLarge(format!(
                "{}x{} exceeds limit of {}x{}",
                width, height, self.limits.max_width, self.limits.max_height
            )));
        }

        let decoded = guessed_reader(bytes)?
            .decode()
            .map_err(|e| PreprocessError::Decode(e.to_string()))?;

        tracing::debug!(
            format = ?source_format,
            width,
            height,
            color = ?decoded.color(),
            "Image decoded"
        );

        Ok(NormalizedImage {
            pixels: decoded.to_rgb8(),
            source_format,
        })
    }
}

fn guessed_reader(bytes: &[u8]) -> Result<ImageReader<Cursor<&[u8]>>, PreprocessError> {
    ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| PreprocessError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Rgb, RgbImage, Rgba, RgbaImage};

    fn encode(image: DynamicImage, format: ImageFormat) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        image.write_to(&mut buf, format).unwrap();
        buf.into_inner()
    }

    #[test]
    fn test_png_with_alpha_normalizes_to_rgb() {
        let rgba = RgbaImage::from_pixel(8, 6, Rgba([200, 100, 50, 128]));
        let bytes = encode(DynamicImage::ImageRgba8(rgba), ImageFormat::Png);

        let image = ImagePreprocessor::default().decode_and_normalize(&bytes).unwrap();
        assert_eq!((image.width(), image.height()), (8, 6));
        assert_eq!(image.channels(), 3);
        assert_eq!(image.source_format(), ImageFormat::Png);
        assert_eq!(image.pixels().get_pixel(0, 0), &Rgb([200, 100, 50]));
    }

    #[test]
    fn test_garbage_is_decode_error() {
        let result = ImagePreprocessor::default().decode_and_normalize(b"definitely not an image");
        assert!(matches!(result, Err(PreprocessError::Decode(_))));
    }

    #[test]
    fn test_empty_is_decode_error() {
        let result = ImagePreprocessor::default().decode_and_normalize(&[]);
        assert!(matches!(result, Err(PreprocessError::Decode(_))));
    }

    #[test]
    fn test_truncated_png_is_decode_error() {
        let rgb = RgbImage::from_pixel(32, 32, Rgb([1, 2, 3]));
        let bytes = encode(DynamicImage::ImageRgb8(rgb), ImageFormat::Png);
        let truncated = &bytes[..bytes.len() / 2];

        let result = ImagePreprocessor::default().decode_and_normalize(truncated);
        assert!(matches!(result, Err(PreprocessError::Decode(_))));
    }

    #[test]
    fn test_byte_limit() {
        let rgb = RgbImage::from_pixel(16, 16, Rgb([9, 9, 9]));
        let bytes = encode(DynamicImage::ImageRgb8(rgb), ImageFormat::Png);
        let preprocessor = ImagePreprocessor::new(ImageLimits {
            max_bytes: bytes.len() - 1,
            ..Default::default()
        });

        let result = preprocessor.decode_and_normalize(&bytes);
        assert!(matches!(result, Err(PreprocessError::TooLarge(_))));
    }

    #[test]
    fn test_dimension_limit() {
        let rgb = RgbImage::from_pixel(40, 10, Rgb([9, 9, 9]));
        let bytes = encode(DynamicImage::ImageRgb8(rgb), ImageFormat::Png);
        let preprocessor = ImagePreprocessor::new(ImageLimits {
            max_width: 32,
            max_height: 32,
            ..Default::default()
        });

        let result = preprocessor.decode_and_normalize(&bytes);
        assert!(matches!(result, Err(PreprocessError::TooLarge(_))));
    }
}
