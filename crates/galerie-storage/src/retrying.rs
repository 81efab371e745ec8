//! Retry wrapper around any [`Storage`] backend.
//!
//! Every pipeline call to object storage goes through [`RetryingStorage`], so
//! a bucket that is still being provisioned or a briefly unreachable endpoint
//! does not fail a derivation outright.

use crate::traits::{Storage, StorageError, StorageResult};
use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use galerie_core::{RetryConfig, RetryPolicy, Retryable};
use std::sync::Arc;

#[derive(Clone)]
pub struct RetryingStorage {
    inner: Arc<dyn Storage>,
    policy: RetryPolicy,
}

impl RetryingStorage {
    pub fn new(inner: Arc<dyn Storage>, config: RetryConfig) -> Self {
        Self::with_policy(inner, RetryPolicy::new(config))
    }

    pub fn with_policy(inner: Arc<dyn Storage>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &Arc<dyn Storage> {
        &self.inner
    }

    /// A transient error that survives the policy means every attempt was spent.
    fn finish<T>(&self, result: StorageResult<T>) -> StorageResult<T> {
        match result {
            Err(e) if e.is_transient() => Err(StorageError::Unavailable {
                attempts: self.policy.config().max_attempts,
                message: e.to_string(),
            }),
            other => other,
        }
    }
}

#[async_trait]
impl Storage for RetryingStorage {
    async fn get(&self, storage_key: &str) -> StorageResult<Bytes> {
        let result = self
            .policy
            .run("storage.get", || self.inner.get(storage_key))
            .await;
        self.finish(result)
    }

    async fn put(&self, storage_key: &str, data: Bytes, content_type: &str) -> StorageResult<()> {
        let result = self
            .policy
            .run("storage.put", || {
                self.inner.put(storage_key, data.clone(), content_type)
            })
            .await;
        self.finish(result)
    }

    async fn delete(&self, storage_key: &str) -> StorageResult<()> {
        let result = self
            .policy
            .run("storage.delete", || self.inner.delete(storage_key))
            .await;
        self.finish(result)
    }

    async fn exists(&self, storage_key: &str) -> StorageResult<bool> {
        let result = self
            .policy
            .run("storage.exists", || self.inner.exists(storage_key))
            .await;
        self.finish(result)
    }

    fn public_url(&self, storage_key: &str) -> String {
        self.inner.public_url(storage_key)
    }

    fn backend_type(&self) -> StorageBackend {
        self.inner.backend_type()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryStorage;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    /// Fails the first `failures` reads with a cold-start error.
    struct ColdStart {
        inner: MemoryStorage,
        failures: u32,
        calls: AtomicU32,
        message: &'static str,
    }

    #[async_trait]
    impl Storage for ColdStart {
        async fn get(&self, storage_key: &str) -> StorageResult<Bytes> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                return Err(StorageError::BackendError(self.message.to_string()));
            }
            self.inner.get(storage_key).await
        }

        async fn put(&self, storage_key: &str, data: Bytes, content_type: &str) -> StorageResult<()> {
            self.inner.put(storage_key, data, content_type).await
        }

        async fn delete(&self, storage_key: &str) -> StorageResult<()> {
            self.inner.delete(storage_key).await
        }

        async fn exists(&self, storage_key: &str) -> StorageResult<bool> {
            self.inner.exists(storage_key).await
        }

        fn public_url(&self, storage_key: &str) -> String {
            self.inner.public_url(storage_key)
        }

        fn backend_type(&self) -> StorageBackend {
            StorageBackend::Memory
        }
    }

    fn fast() -> RetryConfig {
        RetryConfig {
            max_attempts: 5,
            initial_delay: Duration::from_millis(1),
            backoff_multiplier: 1.5,
            max_delay: Duration::from_millis(4),
        }
    }

    async fn cold_start(failures: u32, message: &'static str) -> Arc<ColdStart> {
        let inner = MemoryStorage::new();
        inner
            .put("media/a.jpg", Bytes::from_static(b"img"), "image/jpeg")
            .await
            .unwrap();
        Arc::new(ColdStart {
            inner,
            failures,
            calls: AtomicU32::new(0),
            message,
        })
    }

    #[tokio::test]
    async fn rides_out_bucket_provisioning() {
        let backend = cold_start(3, "NoSuchBucket").await;
        let storage = RetryingStorage::new(backend.clone(), fast());

        let data = storage.get("media/a.jpg").await.unwrap();
        assert_eq!(data, Bytes::from_static(b"img"));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn exhausted_retries_surface_unavailable() {
        let backend = cold_start(u32::MAX, "connection refused").await;
        let storage = RetryingStorage::new(backend.clone(), fast());

        let err = storage.get("media/a.jpg").await.unwrap_err();
        assert!(matches!(err, StorageError::Unavailable { attempts: 5, .. }));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn permanent_errors_are_not_retried() {
        let backend = cold_start(u32::MAX, "access denied").await;
        let storage = RetryingStorage::new(backend.clone(), fast());

        let err = storage.get("media/a.jpg").await.unwrap_err();
        assert!(matches!(err, StorageError::BackendError(_)));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn not_found_passes_through_once() {
        let backend = cold_start(0, "").await;
        let storage = RetryingStorage::new(backend.clone(), fast());

        assert!(matches!(
            storage.get("media/missing.jpg").await,
            Err(StorageError::NotFound(_))
        ));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }
}
