//! Raster image processing on the `image` crate
//!
//! - Orientation (quarter-turn rotation)
//! - Per-format encoding
//! - The [`RasterTransformer`] that chains decode, rotate, resize and encode

pub mod encode;
pub mod orientation;
pub mod raster;

pub use encode::ImageEncoder;
pub use orientation::ImageOrientation;
pub use raster::RasterTransformer;
