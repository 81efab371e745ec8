use crate::commands::print_json;
use crate::pipeline::Pipeline;
use uuid::Uuid;

pub async fn rotate(pipeline: &Pipeline, asset_id: Uuid, degrees: u16) -> anyhow::Result<()> {
    let report = pipeline.rotations().rotate(asset_id, degrees).await?;

    if !report.is_complete() {
        tracing::warn!(asset_id = %asset_id, "Rotation finished with failures");
    }

    let cache_buster = report.cache_buster();
    print_json(&serde_json::json!({
        "report": report,
        "cache_buster": cache_buster,
    }))
}
