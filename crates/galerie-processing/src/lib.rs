//! Galerie Processing Library
//!
//! The [`ImageTransformer`] contract the pipeline depends on, and the raster
//! implementation built on the `image` crate.

#[cfg(feature = "image")]
pub mod image;
pub mod transformer;

#[cfg(feature = "image")]
pub use image::RasterTransformer;
pub use transformer::{
    EncodeSettings, ImageTransformer, OutputFormat, QualitySettings, Rotation, TransformError,
    TransformOptions, TransformedImage,
};
