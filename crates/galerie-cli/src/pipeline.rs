//! Wiring of configured backends into a [`PipelineContext`].

use anyhow::Context;
use galerie_core::PipelineConfig;
use galerie_db::{setup_database, AssetStatusStore, PostgresAssetStore, RetryingAssetStore};
use galerie_processing::RasterTransformer;
use galerie_storage::create_storage;
use galerie_worker::{
    DerivativeQueue, DerivativeQueueConfig, PipelineContext, RotationConfig, RotationCoordinator,
};
use std::sync::Arc;

pub struct Pipeline {
    pub config: PipelineConfig,
    pub store: Arc<dyn AssetStatusStore>,
    pub ctx: PipelineContext,
}

impl Pipeline {
    /// Asset statuses live in PostgreSQL, so `DATABASE_URL` is required.
    pub async fn from_config(config: PipelineConfig) -> anyhow::Result<Self> {
        if config.database_url.is_none() {
            anyhow::bail!("DATABASE_URL must be set to derive, reconcile or rotate assets");
        }

        let storage = create_storage(&config)
            .await
            .context("Failed to initialize storage backend")?;

        let pool = setup_database(&config).await?;
        let store: Arc<dyn AssetStatusStore> = Arc::new(RetryingAssetStore::new(
            Arc::new(PostgresAssetStore::new(pool)),
            config.database_retry.clone(),
        ));

        let ctx = PipelineContext::from_config(
            &config,
            storage,
            store.clone(),
            Arc::new(RasterTransformer::new()),
        );

        Ok(Self { config, store, ctx })
    }

    pub fn queue(&self) -> anyhow::Result<DerivativeQueue> {
        let queue = DerivativeQueue::new(
            self.ctx.clone(),
            DerivativeQueueConfig::from_pipeline(&self.config),
        )?;
        Ok(queue)
    }

    pub fn rotations(&self) -> RotationCoordinator {
        RotationCoordinator::new(self.ctx.clone(), RotationConfig::from_pipeline(&self.config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn refuses_to_start_without_a_database() {
        let config = PipelineConfig::from_lookup(|name| {
            (name == "STORAGE_BACKEND").then(|| "memory".to_string())
        })
        .unwrap();
        let err = Pipeline::from_config(config).await.err().unwrap();
        assert!(err.to_string().contains("DATABASE_URL"));
    }
}
