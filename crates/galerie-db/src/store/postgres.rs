//! PostgreSQL asset status store: `assets` and `asset_leases` tables.

use super::AssetStatusStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use galerie_core::{AppError, Asset, VariantStatus};
use sqlx::{PgPool, Postgres};
use std::time::Duration;
use uuid::Uuid;

const ASSET_COLUMNS: &str = "id, original_key, mime_type, variant_status, created_at, updated_at";

#[derive(Clone)]
pub struct PostgresAssetStore {
    pool: PgPool,
}

impl PostgresAssetStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl AssetStatusStore for PostgresAssetStore {
    #[tracing::instrument(skip(self), fields(db.table = "assets"))]
    async fn register_asset(
        &self,
        id: Uuid,
        original_key: &str,
        mime_type: &str,
    ) -> Result<Asset, AppError> {
        let asset = sqlx::query_as::<Postgres, Asset>(&format!(
            r#"
            INSERT INTO assets (id, original_key, mime_type, variant_status)
            VALUES ($1, $2, $3, 'pending')
            RETURNING {}
            "#,
            ASSET_COLUMNS
        ))
        .bind(id)
        .bind(original_key)
        .bind(mime_type)
        .fetch_one(&self.pool)
        .await?;
        Ok(asset)
    }

    #[tracing::instrument(skip(self), fields(db.table = "assets", db.record_id = %id))]
    async fn get_asset(&self, id: Uuid) -> Result<Option<Asset>, AppError> {
        let asset = sqlx::query_as::<Postgres, Asset>(&format!(
            "SELECT {} FROM assets WHERE id = $1",
            ASSET_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(asset)
    }

    #[tracing::instrument(skip(self), fields(db.table = "assets", db.record_id = %id))]
    async fn set_status(&self, id: Uuid, status: VariantStatus) -> Result<(), AppError> {
        // Check and write in a single statement.
        let allowed_from = VariantStatus::predecessors(status);
        let updated: Option<(Uuid,)> = sqlx::query_as(
            r#"
            UPDATE assets
            SET variant_status = $2
            WHERE id = $1 AND variant_status = ANY($3)
            RETURNING id
            "#,
        )
        .bind(id)
        .bind(status)
        .bind(&allowed_from)
        .fetch_optional(&self.pool)
        .await?;

        if updated.is_some() {
            return Ok(());
        }

        let current: Option<(VariantStatus,)> =
            sqlx::query_as("SELECT variant_status FROM assets WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        match current {
            None => Err(AppError::NotFound(format!("asset {}", id))),
            Some((from,)) => Err(AppError::InvalidStatusTransition {
                asset_id: id,
                from,
                to: status,
            }),
        }
    }

    #[tracing::instrument(skip(self), fields(db.table = "assets", db.record_id = %id))]
    async fn touch(&self, id: Uuid, mime_type: Option<&str>) -> Result<DateTime<Utc>, AppError> {
        let updated_at: Option<(DateTime<Utc>,)> = sqlx::query_as(
            r#"
            UPDATE assets
            SET updated_at = GREATEST(NOW(), updated_at + INTERVAL '1 millisecond'),
                mime_type = COALESCE($2, mime_type)
            WHERE id = $1
            RETURNING updated_at
            "#,
        )
        .bind(id)
        .bind(mime_type)
        .fetch_optional(&self.pool)
        .await?;

        updated_at
            .map(|(ts,)| ts)
            .ok_or_else(|| AppError::NotFound(format!("asset {}", id)))
    }

    #[tracing::instrument(skip(self), fields(db.table = "assets"))]
    async fn list_by_status(&self, statuses: &[VariantStatus]) -> Result<Vec<Asset>, AppError> {
        if statuses.is_empty() {
            return Ok(Vec::new());
        }
        let assets = sqlx::query_as::<Postgres, Asset>(&format!(
            "SELECT {} FROM assets WHERE variant_status = ANY($1) ORDER BY created_at ASC",
            ASSET_COLUMNS
        ))
        .bind(statuses)
        .fetch_all(&self.pool)
        .await?;
        Ok(assets)
    }

    #[tracing::instrument(skip(self), fields(db.table = "asset_leases", db.record_id = %asset_id))]
    async fn try_acquire_lease(
        &self,
        asset_id: Uuid,
        owner: Uuid,
        ttl: Duration,
    ) -> Result<bool, AppError> {
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let acquired: Option<(Uuid,)> = sqlx::query_as(
            r#"
            INSERT INTO asset_leases (asset_id, owner, acquired_at, expires_at)
            VALUES ($1, $2, NOW(), NOW() + ($3::BIGINT * INTERVAL '1 millisecond'))
            ON CONFLICT (asset_id) DO UPDATE
                SET owner = EXCLUDED.owner,
                    acquired_at = EXCLUDED.acquired_at,
                    expires_at = EXCLUDED.expires_at
                WHERE asset_leases.expires_at < NOW()
            RETURNING owner
            "#,
        )
        .bind(asset_id)
        .bind(owner)
        .bind(ttl_ms)
        .fetch_optional(&self.pool)
        .await?;

        Ok(acquired.map(|(holder,)| holder == owner).unwrap_or(false))
    }

    #[tracing::instrument(skip(self), fields(db.table = "asset_leases", db.record_id = %asset_id))]
    async fn release_lease(&self, asset_id: Uuid, owner: Uuid) -> Result<(), AppError> {
        sqlx::query("DELETE FROM asset_leases WHERE asset_id = $1 AND owner = $2")
            .bind(asset_id)
            .bind(owner)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
