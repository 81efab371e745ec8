//! Per-format encoding

use crate::transformer::{EncodeSettings, OutputFormat, QualitySettings, TransformError};
use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, GenericImageView, ImageFormat};
use std::io::Cursor;

pub struct ImageEncoder;

impl ImageEncoder {
    /// Concrete output format for `settings`. `Generic` keeps the decoded
    /// source format when it can be written, PNG otherwise.
    pub fn resolve_format(settings: &EncodeSettings, source: Option<ImageFormat>) -> OutputFormat {
        settings.format().unwrap_or(match source {
            Some(ImageFormat::Jpeg) => OutputFormat::Jpeg,
            Some(ImageFormat::WebP) => OutputFormat::WebP,
            Some(ImageFormat::Gif) => OutputFormat::Gif,
            _ => OutputFormat::Png,
        })
    }

    /// Encode `img`, returning the bytes and the format actually written.
    pub fn encode(
        img: &DynamicImage,
        settings: &EncodeSettings,
        source: Option<ImageFormat>,
    ) -> Result<(Bytes, OutputFormat), TransformError> {
        let format = Self::resolve_format(settings, source);
        let defaults = QualitySettings::default();

        let data = match format {
            OutputFormat::Jpeg => {
                let quality = match settings {
                    EncodeSettings::Jpeg { quality } => *quality,
                    _ => defaults.jpeg,
                };
                Self::encode_jpeg(img, quality)?
            }
            OutputFormat::WebP => {
                let quality = match settings {
                    EncodeSettings::WebP { quality } => *quality,
                    _ => defaults.webp,
                };
                Self::encode_webp(img, quality)
            }
            OutputFormat::Png => Self::write_with(img, ImageFormat::Png)?,
            // GIF frames are palette-quantised from RGBA.
            OutputFormat::Gif => {
                Self::write_with(&DynamicImage::ImageRgba8(img.to_rgba8()), ImageFormat::Gif)?
            }
        };

        Ok((data, format))
    }

    fn encode_jpeg(img: &DynamicImage, quality: u8) -> Result<Bytes, TransformError> {
        // JPEG has no alpha channel.
        let rgb = img.to_rgb8();
        let (width, height) = rgb.dimensions();
        let mut buffer = Vec::with_capacity((width * height) as usize / 4);

        JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100))
            .encode_image(&rgb)
            .map_err(|e| TransformError::Encode {
                format: "jpeg".to_string(),
                message: e.to_string(),
            })?;

        Ok(Bytes::from(buffer))
    }

    fn encode_webp(img: &DynamicImage, quality: u8) -> Bytes {
        let (width, height) = img.dimensions();
        let rgba = img.to_rgba8();

        let encoder = webp::Encoder::from_rgba(&rgba, width, height);
        let webp_data = encoder.encode(quality.clamp(1, 100) as f32);

        Bytes::copy_from_slice(&webp_data)
    }

    fn write_with(img: &DynamicImage, format: ImageFormat) -> Result<Bytes, TransformError> {
        let mut buffer = Vec::new();
        img.write_to(&mut Cursor::new(&mut buffer), format)
            .map_err(|e| TransformError::Encode {
                format: format!("{:?}", format).to_lowercase(),
                message: e.to_string(),
            })?;
        Ok(Bytes::from(buffer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn sample() -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(8, 6, Rgba([10, 200, 30, 128])))
    }

    #[test]
    fn generic_keeps_writable_source_format() {
        assert_eq!(
            ImageEncoder::resolve_format(&EncodeSettings::Generic, Some(ImageFormat::Jpeg)),
            OutputFormat::Jpeg
        );
        assert_eq!(
            ImageEncoder::resolve_format(&EncodeSettings::Generic, Some(ImageFormat::Bmp)),
            OutputFormat::Png
        );
        assert_eq!(
            ImageEncoder::resolve_format(&EncodeSettings::Png, Some(ImageFormat::Jpeg)),
            OutputFormat::Png
        );
    }

    #[test]
    fn jpeg_drops_alpha_and_encodes() {
        let (data, format) =
            ImageEncoder::encode(&sample(), &EncodeSettings::Jpeg { quality: 85 }, None).unwrap();
        assert_eq!(format, OutputFormat::Jpeg);
        assert_eq!(&data[..2], &[0xFF, 0xD8]);
        assert_eq!(image::guess_format(&data).unwrap(), ImageFormat::Jpeg);
    }

    #[test]
    fn webp_output_is_riff() {
        let (data, format) =
            ImageEncoder::encode(&sample(), &EncodeSettings::WebP { quality: 80 }, None).unwrap();
        assert_eq!(format, OutputFormat::WebP);
        assert_eq!(&data[..4], b"RIFF");
        assert_eq!(&data[8..12], b"WEBP");
    }

    #[test]
    fn png_and_gif_round_trip_dimensions() {
        for settings in [EncodeSettings::Png, EncodeSettings::Gif] {
            let (data, _) = ImageEncoder::encode(&sample(), &settings, None).unwrap();
            let decoded = image::load_from_memory(&data).unwrap();
            assert_eq!(decoded.dimensions(), (8, 6));
        }
    }
}
