//! Raster transformer: decode, rotate, resize, encode.
//!
//! Pixel work runs on tokio's blocking pool.

use super::encode::ImageEncoder;
use super::orientation::ImageOrientation;
use crate::transformer::{
    ImageTransformer, TransformError, TransformOptions, TransformedImage,
};
use async_trait::async_trait;
use bytes::Bytes;
use image::imageops::FilterType;
use image::{GenericImageView, ImageReader};
use std::io::Cursor;

#[derive(Debug, Clone, Copy, Default)]
pub struct RasterTransformer;

impl RasterTransformer {
    pub fn new() -> Self {
        Self
    }

    /// Synchronous transform; callers on the async runtime go through
    /// [`ImageTransformer::transform`].
    pub fn transform_blocking(
        data: &[u8],
        options: &TransformOptions,
    ) -> Result<TransformedImage, TransformError> {
        if options.target_width == Some(0) {
            return Err(TransformError::InvalidWidth(0));
        }

        let reader = ImageReader::new(Cursor::new(data))
            .with_guessed_format()
            .map_err(|e| TransformError::Decode(e.to_string()))?;
        let source_format = reader.format();
        let mut img = reader
            .decode()
            .map_err(|e| TransformError::Decode(e.to_string()))?;

        if let Some(rotation) = options.rotation {
            tracing::debug!(degrees = rotation.degrees(), "Applying rotation");
            img = ImageOrientation::rotate(img, rotation);
        }

        if let Some(target_width) = options.target_width {
            let (width, height) = img.dimensions();
            if target_width < width {
                let target_height =
                    ((height as u64 * target_width as u64) / width as u64).max(1) as u32;
                img = img.resize_exact(target_width, target_height, FilterType::Lanczos3);
            }
        }

        let (encoded, format) = ImageEncoder::encode(&img, &options.encode, source_format)?;

        Ok(TransformedImage {
            data: encoded,
            content_type: format.to_mime_type().to_string(),
        })
    }
}

#[async_trait]
impl ImageTransformer for RasterTransformer {
    async fn transform(
        &self,
        data: Bytes,
        options: TransformOptions,
    ) -> Result<TransformedImage, TransformError> {
        let start = std::time::Instant::now();
        let input_size = data.len();

        let result =
            tokio::task::spawn_blocking(move || Self::transform_blocking(&data, &options))
                .await
                .map_err(|e| TransformError::Task(e.to_string()))??;

        tracing::debug!(
            input_bytes = input_size,
            output_bytes = result.data.len(),
            content_type = %result.content_type,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Image transform complete"
        );

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transformer::{EncodeSettings, Rotation};
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};

    fn create_test_image(width: u32, height: u32, format: ImageFormat) -> Bytes {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([200, 20, 20])));
        let mut buffer = Vec::new();
        img.write_to(&mut Cursor::new(&mut buffer), format).unwrap();
        Bytes::from(buffer)
    }

    fn dimensions(data: &[u8]) -> (u32, u32) {
        image::load_from_memory(data).unwrap().dimensions()
    }

    #[tokio::test]
    async fn resizes_preserving_aspect_ratio() {
        let input = create_test_image(400, 200, ImageFormat::Jpeg);
        let out = RasterTransformer
            .transform(
                input,
                TransformOptions::resize(100, EncodeSettings::Jpeg { quality: 85 }),
            )
            .await
            .unwrap();

        assert_eq!(out.content_type, "image/jpeg");
        assert_eq!(dimensions(&out.data), (100, 50));
    }

    #[tokio::test]
    async fn never_upscales() {
        let input = create_test_image(120, 80, ImageFormat::Png);
        let out = RasterTransformer
            .transform(input, TransformOptions::resize(1600, EncodeSettings::Png))
            .await
            .unwrap();

        assert_eq!(dimensions(&out.data), (120, 80));
    }

    #[tokio::test]
    async fn rotates_before_resizing() {
        let input = create_test_image(400, 200, ImageFormat::Png);
        let options =
            TransformOptions::rotate(Rotation::Deg90, EncodeSettings::Png).with_width(100);
        let out = RasterTransformer.transform(input, options).await.unwrap();

        // 400x200 turns into 200x400, then scales to width 100.
        assert_eq!(dimensions(&out.data), (100, 200));
    }

    #[tokio::test]
    async fn generic_reencode_keeps_source_format() {
        let input = create_test_image(10, 10, ImageFormat::Png);
        let out = RasterTransformer
            .transform(
                input,
                TransformOptions::rotate(Rotation::Deg180, EncodeSettings::Generic),
            )
            .await
            .unwrap();

        assert_eq!(out.content_type, "image/png");
        assert_eq!(image::guess_format(&out.data).unwrap(), ImageFormat::Png);
    }

    #[tokio::test]
    async fn generic_reencode_writes_png_for_unwritable_sources() {
        for format in [ImageFormat::Bmp, ImageFormat::Tiff] {
            let input = create_test_image(4, 2, format);
            let out = RasterTransformer
                .transform(
                    input,
                    TransformOptions::rotate(Rotation::Deg90, EncodeSettings::Generic),
                )
                .await
                .unwrap();

            assert_eq!(out.content_type, "image/png");
            assert_eq!(image::guess_format(&out.data).unwrap(), ImageFormat::Png);
            assert_eq!(dimensions(&out.data), (2, 4));
        }
    }

    #[tokio::test]
    async fn corrupt_input_is_a_decode_error() {
        let err = RasterTransformer
            .transform(
                Bytes::from_static(b"not an image"),
                TransformOptions::resize(300, EncodeSettings::Png),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, TransformError::Decode(_)));
    }

    #[test]
    fn zero_width_is_rejected() {
        let input = create_test_image(10, 10, ImageFormat::Png);
        let err = RasterTransformer::transform_blocking(
            &input,
            &TransformOptions::resize(0, EncodeSettings::Png),
        )
        .unwrap_err();
        assert!(matches!(err, TransformError::InvalidWidth(0)));
    }
}
