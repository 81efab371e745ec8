//! Startup recovery and manual re-derivation.

use galerie_core::{AppError, VariantStatus};
use galerie_db::AssetStatusStore;
use uuid::Uuid;

use crate::job::DerivationJob;
use crate::queue::DerivativeQueue;

/// Re-enqueue every asset left `pending` or `processing`, oldest first.
///
/// Call once at startup, before accepting new uploads: the queue is not
/// persisted, so these are the jobs a previous process never finished.
pub async fn reconcile(
    store: &dyn AssetStatusStore,
    queue: &DerivativeQueue,
) -> Result<usize, AppError> {
    let unfinished = store
        .list_by_status(&[VariantStatus::Pending, VariantStatus::Processing])
        .await?;

    for asset in &unfinished {
        queue.enqueue_job(DerivationJob::from_asset(asset))?;
    }

    tracing::info!(requeued = unfinished.len(), "Reconciled unfinished derivations");
    Ok(unfinished.len())
}

/// Derive an asset's variants again, e.g. after a failure or a variant table
/// change. Existing variant objects are overwritten.
pub async fn requeue(
    store: &dyn AssetStatusStore,
    queue: &DerivativeQueue,
    asset_id: Uuid,
) -> Result<(), AppError> {
    let asset = store
        .get_asset(asset_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("asset {}", asset_id)))?;

    match asset.variant_status {
        VariantStatus::Processing => return Err(AppError::DerivationInProgress(asset_id)),
        VariantStatus::Completed | VariantStatus::Failed => {
            store.set_status(asset_id, VariantStatus::Pending).await?;
        }
        VariantStatus::Pending => {}
    }

    queue.enqueue_job(DerivationJob::from_asset(&asset))?;
    tracing::info!(asset_id = %asset_id, "Derivation requeued");
    Ok(())
}
