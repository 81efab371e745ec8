//! Shared pipeline dependencies
//!
//! One [`PipelineContext`] is built at startup and cloned into the derivative
//! queue and the rotation coordinator, so both see the same storage, status
//! store, transformer and variant table.

use std::sync::Arc;

use galerie_core::{PipelineConfig, VariantSet};
use galerie_db::AssetStatusStore;
use galerie_processing::{EncodeSettings, ImageTransformer, QualitySettings};
use galerie_storage::Storage;

#[derive(Clone)]
pub struct PipelineContext {
    pub storage: Arc<dyn Storage>,
    pub store: Arc<dyn AssetStatusStore>,
    pub transformer: Arc<dyn ImageTransformer>,
    pub variants: Arc<VariantSet>,
    pub quality: QualitySettings,
}

impl PipelineContext {
    pub fn new(
        storage: Arc<dyn Storage>,
        store: Arc<dyn AssetStatusStore>,
        transformer: Arc<dyn ImageTransformer>,
        variants: VariantSet,
    ) -> Self {
        Self {
            storage,
            store,
            transformer,
            variants: Arc::new(variants),
            quality: QualitySettings::default(),
        }
    }

    /// Build from configuration: variant table and encoder qualities.
    pub fn from_config(
        config: &PipelineConfig,
        storage: Arc<dyn Storage>,
        store: Arc<dyn AssetStatusStore>,
        transformer: Arc<dyn ImageTransformer>,
    ) -> Self {
        Self::new(storage, store, transformer, config.variants.clone()).with_quality(
            QualitySettings {
                jpeg: config.jpeg_quality,
                webp: config.webp_quality,
            },
        )
    }

    pub fn with_quality(mut self, quality: QualitySettings) -> Self {
        self.quality = quality;
        self
    }

    /// Encoder settings for an asset of the given MIME type.
    pub fn encode_settings(&self, mime_type: &str) -> EncodeSettings {
        EncodeSettings::for_mime_type(mime_type, &self.quality)
    }
}
