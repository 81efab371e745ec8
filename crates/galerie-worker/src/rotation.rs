//! In-place rotation of an asset's original and its derived variants
//!
//! Rotation overwrites stored objects under their existing keys, so two
//! rotations of the same asset must never interleave. The coordinator takes a
//! per-asset lease from the status store before touching anything and always
//! gives it back, whatever the outcome. Rotations of different assets run
//! independently.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use galerie_core::{AppError, Asset, PipelineConfig, RotationInFlightPolicy, VariantSpec, VariantStatus};
use galerie_db::AssetStatusStore;
use galerie_processing::{EncodeSettings, Rotation, TransformOptions};
use galerie_storage::keys;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::context::PipelineContext;

#[derive(Debug, Clone)]
pub struct RotationConfig {
    /// How long a lease survives a crashed holder.
    pub lease_ttl: Duration,
    pub in_flight_policy: RotationInFlightPolicy,
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            lease_ttl: Duration::from_secs(300),
            in_flight_policy: RotationInFlightPolicy::Skip,
        }
    }
}

impl RotationConfig {
    pub fn from_pipeline(config: &PipelineConfig) -> Self {
        Self {
            lease_ttl: config.rotation_lease_ttl,
            in_flight_policy: config.rotation_in_flight_policy,
        }
    }
}

/// Result for one representation. Serializes as `"success"`, `"skipped"` or
/// `{"failed": "<reason>"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RotationOutcome {
    Success,
    /// The variant has not been derived yet.
    Skipped,
    Failed(String),
}

impl RotationOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RotationOutcome::Success)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RotationReport {
    pub asset_id: Uuid,
    pub degrees: u16,
    pub original: RotationOutcome,
    /// Keyed by variant name.
    pub variants: BTreeMap<String, RotationOutcome>,
    /// New `updated_at` when at least one representation was rewritten.
    pub modified_at: Option<DateTime<Utc>>,
}

impl RotationReport {
    /// Query string that invalidates cached URLs of the rewritten objects.
    pub fn cache_buster(&self) -> Option<String> {
        self.modified_at
            .map(|ts| format!("v={}", ts.timestamp_millis()))
    }

    pub fn rewritten_count(&self) -> usize {
        usize::from(self.original.is_success())
            + self.variants.values().filter(|o| o.is_success()).count()
    }

    pub fn is_complete(&self) -> bool {
        self.original.is_success()
            && self
                .variants
                .values()
                .all(|o| !matches!(o, RotationOutcome::Failed(_)))
    }
}

/// Rotation lease owned by one `rotate` call.
///
/// Released explicitly on the normal path. If the call is dropped mid-way the
/// release is spawned from `Drop` so the asset does not stay locked until
/// the lease expires.
struct HeldLease {
    store: Arc<dyn AssetStatusStore>,
    asset_id: Uuid,
    owner: Uuid,
    released: bool,
}

impl HeldLease {
    async fn release(mut self) {
        release_lease(self.store.as_ref(), self.asset_id, self.owner).await;
        self.released = true;
    }
}

impl Drop for HeldLease {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let (store, asset_id, owner) = (self.store.clone(), self.asset_id, self.owner);
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                tracing::debug!(asset_id = %asset_id, "Rotation dropped, releasing lease");
                runtime.spawn(async move { release_lease(store.as_ref(), asset_id, owner).await });
            }
            Err(_) => {
                tracing::warn!(asset_id = %asset_id, "No runtime to release rotation lease");
            }
        }
    }
}

async fn release_lease(store: &dyn AssetStatusStore, asset_id: Uuid, owner: Uuid) {
    if let Err(e) = store.release_lease(asset_id, owner).await {
        // The lease expires on its own after lease_ttl.
        tracing::warn!(asset_id = %asset_id, error = %e, "Failed to release rotation lease");
    }
}

pub struct RotationCoordinator {
    ctx: PipelineContext,
    config: RotationConfig,
}

impl RotationCoordinator {
    pub fn new(ctx: PipelineContext, config: RotationConfig) -> Self {
        Self { ctx, config }
    }

    pub fn config(&self) -> &RotationConfig {
        &self.config
    }

    /// Rotate the original and every derived variant by `degrees` clockwise.
    ///
    /// Fails with `AlreadyInProgress` when another rotation of the same asset
    /// holds the lease. Per-representation failures are reported in the
    /// returned [`RotationReport`], not as an error.
    #[tracing::instrument(skip(self))]
    pub async fn rotate(&self, asset_id: Uuid, degrees: u16) -> Result<RotationReport, AppError> {
        let rotation = Rotation::try_from(degrees)?;
        let owner = Uuid::new_v4();

        let acquired = self
            .ctx
            .store
            .try_acquire_lease(asset_id, owner, self.config.lease_ttl)
            .await?;
        if !acquired {
            tracing::info!("Rotation already in progress");
            return Err(AppError::AlreadyInProgress(asset_id));
        }

        let lease = HeldLease {
            store: self.ctx.store.clone(),
            asset_id,
            owner,
            released: false,
        };
        let result = self.rotate_leased(asset_id, rotation).await;
        lease.release().await;

        result
    }

    async fn rotate_leased(
        &self,
        asset_id: Uuid,
        rotation: Rotation,
    ) -> Result<RotationReport, AppError> {
        let start = std::time::Instant::now();
        let asset = self
            .ctx
            .store
            .get_asset(asset_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("asset {}", asset_id)))?;

        let in_flight = matches!(
            asset.variant_status,
            VariantStatus::Pending | VariantStatus::Processing
        );
        if in_flight && self.config.in_flight_policy == RotationInFlightPolicy::Reject {
            return Err(AppError::DerivationInProgress(asset_id));
        }

        let encode = self.ctx.encode_settings(&asset.mime_type);

        let (original, new_mime_type) = match self.rotate_original(&asset, rotation, encode).await
        {
            Ok(content_type) => (RotationOutcome::Success, Some(content_type)),
            Err(e) => {
                tracing::error!(key = %asset.original_key, error = %e, "Failed to rotate original");
                (RotationOutcome::Failed(e.to_string()), None)
            }
        };

        let variants: BTreeMap<String, RotationOutcome> = join_all(
            self.ctx
                .variants
                .iter()
                .map(|variant| self.rotate_variant(&asset, variant, rotation, encode)),
        )
        .await
        .into_iter()
        .collect();

        let mut report = RotationReport {
            asset_id,
            degrees: rotation.degrees(),
            original,
            variants,
            modified_at: None,
        };

        if report.rewritten_count() > 0 {
            let mime_change = new_mime_type.filter(|mime| *mime != asset.mime_type);
            report.modified_at = Some(self.ctx.store.touch(asset_id, mime_change.as_deref()).await?);
        }

        tracing::info!(
            rewritten = report.rewritten_count(),
            complete = report.is_complete(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Rotation finished"
        );
        Ok(report)
    }

    /// Returns the content type the original was rewritten with.
    async fn rotate_original(
        &self,
        asset: &Asset,
        rotation: Rotation,
        encode: EncodeSettings,
    ) -> Result<String, AppError> {
        let data = self.ctx.storage.get(&asset.original_key).await?;
        let rotated = self
            .ctx
            .transformer
            .transform(data, TransformOptions::rotate(rotation, encode))
            .await?;
        self.ctx
            .storage
            .put(&asset.original_key, rotated.data, &rotated.content_type)
            .await?;
        Ok(rotated.content_type)
    }

    async fn rotate_variant(
        &self,
        asset: &Asset,
        variant: &VariantSpec,
        rotation: Rotation,
        encode: EncodeSettings,
    ) -> (String, RotationOutcome) {
        let key = keys::derive_variant_key(&asset.original_key, variant);

        let outcome = match self.rotate_object(&key, variant.width, rotation, encode).await {
            Ok(true) => RotationOutcome::Success,
            Ok(false) => {
                tracing::debug!(key = %key, "Variant not derived yet, skipping");
                RotationOutcome::Skipped
            }
            Err(e) => {
                tracing::error!(key = %key, error = %e, "Failed to rotate variant");
                RotationOutcome::Failed(e.to_string())
            }
        };
        (variant.name.clone(), outcome)
    }

    /// `Ok(false)` when there is nothing stored under `key`.
    async fn rotate_object(
        &self,
        key: &str,
        width: u32,
        rotation: Rotation,
        encode: EncodeSettings,
    ) -> Result<bool, AppError> {
        if !self.ctx.storage.exists(key).await? {
            return Ok(false);
        }
        let data = self.ctx.storage.get(key).await?;
        let rotated = self
            .ctx
            .transformer
            .transform(data, TransformOptions::rotate(rotation, encode).with_width(width))
            .await?;
        self.ctx
            .storage
            .put(key, rotated.data, &rotated.content_type)
            .await?;
        Ok(true)
    }
}
