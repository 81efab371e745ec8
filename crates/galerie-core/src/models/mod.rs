pub mod asset;
pub mod variant;

pub use asset::{Asset, VariantStatus};
pub use variant::{VariantSet, VariantSpec, DEFAULT_VARIANTS};
