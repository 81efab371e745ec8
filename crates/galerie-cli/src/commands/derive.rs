use crate::commands::print_json;
use crate::pipeline::Pipeline;
use anyhow::Context;
use galerie_worker::{reconcile, requeue};
use uuid::Uuid;

/// Derive (or re-derive) one asset's variants and wait for the result.
pub async fn derive(pipeline: &Pipeline, asset_id: Uuid) -> anyhow::Result<()> {
    let queue = pipeline.queue()?;
    requeue(pipeline.store.as_ref(), &queue, asset_id).await?;
    queue.wait_idle().await;

    let asset = pipeline
        .store
        .get_asset(asset_id)
        .await?
        .with_context(|| format!("Asset {} disappeared during derivation", asset_id))?;

    print_json(&serde_json::json!({
        "asset_id": asset.id,
        "variant_status": asset.variant_status,
    }))
}

/// Re-enqueue every unfinished asset and wait for the queue to drain.
pub async fn reconcile_all(pipeline: &Pipeline) -> anyhow::Result<()> {
    let queue = pipeline.queue()?;
    let requeued = reconcile(pipeline.store.as_ref(), &queue).await?;
    queue.wait_idle().await;

    print_json(&serde_json::json!({ "requeued": requeued }))
}
