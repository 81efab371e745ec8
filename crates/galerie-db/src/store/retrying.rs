//! Retry wrapper around any [`AssetStatusStore`].
//!
//! Transient database failures are retried under the database retry policy;
//! once every attempt is spent the caller sees `DependencyUnavailable`.

use super::AssetStatusStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use galerie_core::{AppError, Asset, RetryConfig, RetryPolicy, Retryable, VariantStatus};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

#[derive(Clone)]
pub struct RetryingAssetStore {
    inner: Arc<dyn AssetStatusStore>,
    policy: RetryPolicy,
}

impl RetryingAssetStore {
    pub fn new(inner: Arc<dyn AssetStatusStore>, config: RetryConfig) -> Self {
        Self::with_policy(inner, RetryPolicy::new(config))
    }

    pub fn with_policy(inner: Arc<dyn AssetStatusStore>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    fn finish<T>(&self, result: Result<T, AppError>) -> Result<T, AppError> {
        match result {
            Err(e) if e.is_transient() => {
                tracing::error!(
                    error = %e,
                    attempts = self.policy.config().max_attempts,
                    "Database unavailable after retries"
                );
                Err(AppError::unavailable("database", e))
            }
            other => other,
        }
    }
}

#[async_trait]
impl AssetStatusStore for RetryingAssetStore {
    async fn register_asset(
        &self,
        id: Uuid,
        original_key: &str,
        mime_type: &str,
    ) -> Result<Asset, AppError> {
        let result = self
            .policy
            .run("db.register_asset", || {
                self.inner.register_asset(id, original_key, mime_type)
            })
            .await;
        self.finish(result)
    }

    async fn get_asset(&self, id: Uuid) -> Result<Option<Asset>, AppError> {
        let result = self
            .policy
            .run("db.get_asset", || self.inner.get_asset(id))
            .await;
        self.finish(result)
    }

    async fn set_status(&self, id: Uuid, status: VariantStatus) -> Result<(), AppError> {
        let result = self
            .policy
            .run("db.set_status", || self.inner.set_status(id, status))
            .await;
        self.finish(result)
    }

    async fn touch(&self, id: Uuid, mime_type: Option<&str>) -> Result<DateTime<Utc>, AppError> {
        let result = self
            .policy
            .run("db.touch", || self.inner.touch(id, mime_type))
            .await;
        self.finish(result)
    }

    async fn list_by_status(&self, statuses: &[VariantStatus]) -> Result<Vec<Asset>, AppError> {
        let result = self
            .policy
            .run("db.list_by_status", || self.inner.list_by_status(statuses))
            .await;
        self.finish(result)
    }

    async fn try_acquire_lease(
        &self,
        asset_id: Uuid,
        owner: Uuid,
        ttl: Duration,
    ) -> Result<bool, AppError> {
        let result = self
            .policy
            .run("db.try_acquire_lease", || {
                self.inner.try_acquire_lease(asset_id, owner, ttl)
            })
            .await;
        self.finish(result)
    }

    async fn release_lease(&self, asset_id: Uuid, owner: Uuid) -> Result<(), AppError> {
        let result = self
            .policy
            .run("db.release_lease", || self.inner.release_lease(asset_id, owner))
            .await;
        self.finish(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InMemoryAssetStore;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails `get_asset` with a pool timeout for the first `failures` calls.
    struct Warming {
        inner: InMemoryAssetStore,
        failures: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl AssetStatusStore for Warming {
        async fn register_asset(
            &self,
            id: Uuid,
            original_key: &str,
            mime_type: &str,
        ) -> Result<Asset, AppError> {
            self.inner.register_asset(id, original_key, mime_type).await
        }

        async fn get_asset(&self, id: Uuid) -> Result<Option<Asset>, AppError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) < self.failures {
                return Err(AppError::Database(sqlx::Error::PoolTimedOut));
            }
            self.inner.get_asset(id).await
        }

        async fn set_status(&self, id: Uuid, status: VariantStatus) -> Result<(), AppError> {
            self.inner.set_status(id, status).await
        }

        async fn touch(&self, id: Uuid, mime_type: Option<&str>) -> Result<DateTime<Utc>, AppError> {
            self.inner.touch(id, mime_type).await
        }

        async fn list_by_status(&self, statuses: &[VariantStatus]) -> Result<Vec<Asset>, AppError> {
            self.inner.list_by_status(statuses).await
        }

        async fn try_acquire_lease(
            &self,
            asset_id: Uuid,
            owner: Uuid,
            ttl: Duration,
        ) -> Result<bool, AppError> {
            self.inner.try_acquire_lease(asset_id, owner, ttl).await
        }

        async fn release_lease(&self, asset_id: Uuid, owner: Uuid) -> Result<(), AppError> {
            self.inner.release_lease(asset_id, owner).await
        }
    }

    fn fast() -> RetryConfig {
        RetryConfig {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1),
            backoff_multiplier: 2.0,
            max_delay: Duration::from_millis(4),
        }
    }

    async fn warming(failures: u32) -> (Arc<Warming>, Uuid) {
        let inner = InMemoryAssetStore::new();
        let id = Uuid::new_v4();
        inner
            .register_asset(id, "media/a.jpg", "image/jpeg")
            .await
            .unwrap();
        let store = Arc::new(Warming {
            inner,
            failures,
            calls: AtomicU32::new(0),
        });
        (store, id)
    }

    #[tokio::test]
    async fn retries_pool_timeouts() {
        let (backend, id) = warming(2).await;
        let store = RetryingAssetStore::new(backend.clone(), fast());

        let asset = store.get_asset(id).await.unwrap();
        assert!(asset.is_some());
        assert_eq!(backend.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausted_retries_report_dependency_unavailable() {
        let (backend, id) = warming(u32::MAX).await;
        let store = RetryingAssetStore::new(backend.clone(), fast());

        let err = store.get_asset(id).await.unwrap_err();
        assert!(matches!(
            err,
            AppError::DependencyUnavailable {
                dependency: "database",
                ..
            }
        ));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn invalid_transition_is_not_retried() {
        let (backend, id) = warming(0).await;
        let store = RetryingAssetStore::new(backend, fast());

        let err = store
            .set_status(id, VariantStatus::Completed)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidStatusTransition { .. }));
    }
}
