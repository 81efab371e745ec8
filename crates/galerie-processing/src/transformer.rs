//! Image transform contract
//!
//! The pipeline treats image work as a black box: bytes in, resized and/or
//! rotated and re-encoded bytes out. Implementations may be slow but must be
//! free of side effects.

use async_trait::async_trait;
use bytes::Bytes;
use galerie_core::AppError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Transform errors. All of them are permanent: retrying the same input
/// cannot succeed.
#[derive(Debug, Error)]
pub enum TransformError {
    #[error("Failed to decode image: {0}")]
    Decode(String),

    #[error("Failed to encode image as {format}: {message}")]
    Encode { format: String, message: String },

    #[error("Unsupported rotation: {0} degrees (expected 90, 180 or 270)")]
    InvalidRotation(u16),

    #[error("Invalid target width: {0}")]
    InvalidWidth(u32),

    #[error("Transform task failed: {0}")]
    Task(String),
}

impl From<TransformError> for AppError {
    fn from(err: TransformError) -> Self {
        match err {
            TransformError::InvalidRotation(_) | TransformError::InvalidWidth(_) => {
                AppError::InvalidInput(err.to_string())
            }
            other => AppError::ImageProcessing(other.to_string()),
        }
    }
}

/// Clockwise quarter-turn rotation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Rotation {
    #[serde(rename = "90")]
    Deg90,
    #[serde(rename = "180")]
    Deg180,
    #[serde(rename = "270")]
    Deg270,
}

impl Rotation {
    pub fn degrees(self) -> u16 {
        match self {
            Rotation::Deg90 => 90,
            Rotation::Deg180 => 180,
            Rotation::Deg270 => 270,
        }
    }
}

impl TryFrom<u16> for Rotation {
    type Error = TransformError;

    fn try_from(degrees: u16) -> Result<Self, Self::Error> {
        match degrees {
            90 => Ok(Rotation::Deg90),
            180 => Ok(Rotation::Deg180),
            270 => Ok(Rotation::Deg270),
            other => Err(TransformError::InvalidRotation(other)),
        }
    }
}

/// Output format for encoded images
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Jpeg,
    Png,
    WebP,
    Gif,
}

impl OutputFormat {
    /// Format for a MIME type, or `None` for types without dedicated settings.
    pub fn from_mime_type(mime_type: &str) -> Option<Self> {
        match mime_type.trim().to_lowercase().as_str() {
            "image/jpeg" | "image/jpg" | "image/pjpeg" => Some(OutputFormat::Jpeg),
            "image/png" => Some(OutputFormat::Png),
            "image/webp" => Some(OutputFormat::WebP),
            "image/gif" => Some(OutputFormat::Gif),
            _ => None,
        }
    }

    pub fn to_mime_type(self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "image/jpeg",
            OutputFormat::Png => "image/png",
            OutputFormat::WebP => "image/webp",
            OutputFormat::Gif => "image/gif",
        }
    }
}

/// Lossy encoder qualities (1-100)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QualitySettings {
    pub jpeg: u8,
    pub webp: u8,
}

impl Default for QualitySettings {
    fn default() -> Self {
        Self { jpeg: 85, webp: 80 }
    }
}

/// Codec and quality hint passed to the transformer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodeSettings {
    Jpeg { quality: u8 },
    Png,
    WebP { quality: u8 },
    Gif,
    /// Re-encode in whatever format the input was decoded from, or PNG when
    /// that format cannot be written.
    Generic,
}

impl EncodeSettings {
    /// Settings chosen by an asset's MIME type. Unknown types get `Generic`.
    pub fn for_mime_type(mime_type: &str, quality: &QualitySettings) -> Self {
        match OutputFormat::from_mime_type(mime_type) {
            Some(OutputFormat::Jpeg) => EncodeSettings::Jpeg {
                quality: quality.jpeg,
            },
            Some(OutputFormat::Png) => EncodeSettings::Png,
            Some(OutputFormat::WebP) => EncodeSettings::WebP {
                quality: quality.webp,
            },
            Some(OutputFormat::Gif) => EncodeSettings::Gif,
            None => EncodeSettings::Generic,
        }
    }

    pub fn format(&self) -> Option<OutputFormat> {
        match self {
            EncodeSettings::Jpeg { .. } => Some(OutputFormat::Jpeg),
            EncodeSettings::Png => Some(OutputFormat::Png),
            EncodeSettings::WebP { .. } => Some(OutputFormat::WebP),
            EncodeSettings::Gif => Some(OutputFormat::Gif),
            EncodeSettings::Generic => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformOptions {
    /// Resize to this width, preserving aspect ratio. Never upscales.
    pub target_width: Option<u32>,
    pub encode: EncodeSettings,
    /// Applied before resizing.
    pub rotation: Option<Rotation>,
}

impl TransformOptions {
    pub fn resize(width: u32, encode: EncodeSettings) -> Self {
        Self {
            target_width: Some(width),
            encode,
            rotation: None,
        }
    }

    pub fn rotate(rotation: Rotation, encode: EncodeSettings) -> Self {
        Self {
            target_width: None,
            encode,
            rotation: Some(rotation),
        }
    }

    pub fn with_width(mut self, width: u32) -> Self {
        self.target_width = Some(width);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformedImage {
    pub data: Bytes,
    pub content_type: String,
}

#[async_trait]
pub trait ImageTransformer: Send + Sync {
    async fn transform(
        &self,
        data: Bytes,
        options: TransformOptions,
    ) -> Result<TransformedImage, TransformError>;
}
