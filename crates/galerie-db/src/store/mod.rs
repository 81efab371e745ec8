//! Asset status store
//!
//! Holds each asset's `variant_status`, its last-modified marker and the
//! per-asset rotation lease. Status writes are checked against the allowed
//! transitions; a rejected write returns `AppError::InvalidStatusTransition`.

pub mod memory;
pub mod postgres;
pub mod retrying;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use galerie_core::{AppError, Asset, VariantStatus};
use std::time::Duration;
use uuid::Uuid;

pub use memory::InMemoryAssetStore;
pub use postgres::PostgresAssetStore;
pub use retrying::RetryingAssetStore;

#[async_trait]
pub trait AssetStatusStore: Send + Sync {
    /// Record a freshly uploaded asset with status `pending`.
    async fn register_asset(
        &self,
        id: Uuid,
        original_key: &str,
        mime_type: &str,
    ) -> Result<Asset, AppError>;

    async fn get_asset(&self, id: Uuid) -> Result<Option<Asset>, AppError>;

    /// Move an asset to `status`. Fails with `NotFound` for unknown assets and
    /// `InvalidStatusTransition` when the current status cannot reach `status`.
    async fn set_status(&self, id: Uuid, status: VariantStatus) -> Result<(), AppError>;

    /// Bump `updated_at` (strictly increasing) and optionally replace the
    /// stored MIME type. Returns the new `updated_at`.
    async fn touch(&self, id: Uuid, mime_type: Option<&str>) -> Result<DateTime<Utc>, AppError>;

    /// Assets currently in any of `statuses`, oldest first.
    async fn list_by_status(&self, statuses: &[VariantStatus]) -> Result<Vec<Asset>, AppError>;

    /// Take the rotation lease for `asset_id` unless another owner holds an
    /// unexpired one. Returns whether `owner` now holds it.
    async fn try_acquire_lease(
        &self,
        asset_id: Uuid,
        owner: Uuid,
        ttl: Duration,
    ) -> Result<bool, AppError>;

    /// Drop the lease if `owner` still holds it.
    async fn release_lease(&self, asset_id: Uuid, owner: Uuid) -> Result<(), AppError>;
}

/// Reject a transition the status model does not allow.
pub(crate) fn check_transition(
    asset_id: Uuid,
    from: VariantStatus,
    to: VariantStatus,
) -> Result<(), AppError> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(AppError::InvalidStatusTransition { asset_id, from, to })
    }
}
