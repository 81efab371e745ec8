//! Derivation job: fetch the original once, write every variant.

use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use futures::future::join_all;
use galerie_core::{AppError, Asset, VariantSpec, VariantStatus};
use galerie_processing::{EncodeSettings, TransformOptions};
use galerie_storage::keys;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::context::PipelineContext;

/// One unit of derivation work. Held in memory only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivationJob {
    pub asset_id: Uuid,
    pub original_key: String,
    pub mime_type: String,
}

impl DerivationJob {
    pub fn new(
        asset_id: Uuid,
        original_key: impl Into<String>,
        mime_type: impl Into<String>,
    ) -> Result<Self, AppError> {
        let job = Self {
            asset_id,
            original_key: original_key.into(),
            mime_type: mime_type.into(),
        };
        job.validate()?;
        Ok(job)
    }

    pub fn from_asset(asset: &Asset) -> Self {
        Self {
            asset_id: asset.id,
            original_key: asset.original_key.clone(),
            mime_type: asset.mime_type.clone(),
        }
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.asset_id.is_nil() {
            return Err(AppError::invalid_input("asset_id must not be empty"));
        }
        if self.original_key.trim().is_empty() {
            return Err(AppError::invalid_input("original_key must not be empty"));
        }
        Ok(())
    }
}

/// Run one job to a terminal status. Errors are recorded, never returned.
#[tracing::instrument(skip(ctx, job), fields(asset_id = %job.asset_id, key = %job.original_key))]
pub(crate) async fn run(ctx: &PipelineContext, job: &DerivationJob) -> VariantStatus {
    let start = std::time::Instant::now();

    match derive_all(ctx, job).await {
        Ok(()) => match ctx
            .store
            .set_status(job.asset_id, VariantStatus::Completed)
            .await
        {
            Ok(()) => {
                tracing::info!(
                    variants = ctx.variants.len(),
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "Variants derived"
                );
                VariantStatus::Completed
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to record completed status");
                mark_failed(ctx, job).await
            }
        },
        Err(e) => {
            tracing::error!(
                error = %e,
                duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                "Variant derivation failed"
            );
            mark_failed(ctx, job).await
        }
    }
}

async fn mark_failed(ctx: &PipelineContext, job: &DerivationJob) -> VariantStatus {
    if let Err(e) = ctx
        .store
        .set_status(job.asset_id, VariantStatus::Failed)
        .await
    {
        tracing::error!(error = %e, "Failed to record failed status");
    }
    VariantStatus::Failed
}

async fn derive_all(ctx: &PipelineContext, job: &DerivationJob) -> Result<(), AppError> {
    ctx.store
        .set_status(job.asset_id, VariantStatus::Processing)
        .await?;

    let original = ctx.storage.get(&job.original_key).await?;
    let encode = ctx.encode_settings(&job.mime_type);

    // Transforms run on the blocking pool and cannot be cancelled, so every
    // variant settles before the job gives up its slot. After the first
    // failure the others skip their remaining writes.
    let abandoned = AtomicBool::new(false);
    let results = join_all(ctx.variants.iter().map(|variant| {
        derive_variant(ctx, job, variant, original.clone(), encode, &abandoned)
    }))
    .await;

    results.into_iter().collect()
}

async fn derive_variant(
    ctx: &PipelineContext,
    job: &DerivationJob,
    variant: &VariantSpec,
    original: Bytes,
    encode: EncodeSettings,
    abandoned: &AtomicBool,
) -> Result<(), AppError> {
    let key = keys::derive_variant_key(&job.original_key, variant);

    let transformed = ctx
        .transformer
        .transform(original, TransformOptions::resize(variant.width, encode))
        .await
        .map_err(|e| {
            abandoned.store(true, Ordering::SeqCst);
            AppError::from(e)
        })?;

    if abandoned.load(Ordering::SeqCst) {
        tracing::debug!(variant = %variant.name, "Sibling variant failed, not writing");
        return Ok(());
    }

    ctx.storage
        .put(&key, transformed.data, &transformed.content_type)
        .await
        .map_err(|e| {
            abandoned.store(true, Ordering::SeqCst);
            AppError::from(e)
        })?;

    tracing::debug!(variant = %variant.name, width = variant.width, key = %key, "Variant written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_nil_id_and_empty_key() {
        assert!(matches!(
            DerivationJob::new(Uuid::nil(), "media/a.jpg", "image/jpeg"),
            Err(AppError::InvalidInput(_))
        ));
        assert!(matches!(
            DerivationJob::new(Uuid::new_v4(), "  ", "image/jpeg"),
            Err(AppError::InvalidInput(_))
        ));
        assert!(DerivationJob::new(Uuid::new_v4(), "media/a.jpg", "image/jpeg").is_ok());
    }

    #[test]
    fn built_from_asset() {
        let asset = Asset::new(Uuid::new_v4(), "media/a.png", "image/png");
        let job = DerivationJob::from_asset(&asset);
        assert_eq!(job.asset_id, asset.id);
        assert_eq!(job.original_key, "media/a.png");
        assert_eq!(job.mime_type, "image/png");
    }
}
