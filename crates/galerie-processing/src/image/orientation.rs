use crate::transformer::Rotation;
use image::DynamicImage;

/// Image orientation operations
pub struct ImageOrientation;

impl ImageOrientation {
    /// Rotate clockwise by a quarter-turn multiple. The pixel type is preserved.
    pub fn rotate(img: DynamicImage, rotation: Rotation) -> DynamicImage {
        match rotation {
            Rotation::Deg90 => img.rotate90(),
            Rotation::Deg180 => img.rotate180(),
            Rotation::Deg270 => img.rotate270(),
        }
    }
}
