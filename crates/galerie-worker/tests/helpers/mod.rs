#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use galerie_core::{RetryConfig, VariantSet};
use galerie_db::{AssetStatusStore, InMemoryAssetStore};
use galerie_processing::{ImageTransformer, TransformError, TransformOptions, TransformedImage};
use galerie_storage::{MemoryStorage, Storage, StorageBackend, StorageError, StorageResult};
use galerie_worker::PipelineContext;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

/// Fake transformer that appends a trace of each call to the input bytes,
/// e.g. `original:photo.jpg|w=300|r=0`.
#[derive(Default)]
pub struct StubTransformer {
    delay: Duration,
    fail_on: Option<String>,
    fail_at_width: Option<(String, u32)>,
    detached: bool,
    in_flight: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
    calls: Mutex<Vec<TransformOptions>>,
}

impl StubTransformer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Fail every call whose input contains `marker`.
    pub fn failing_on(mut self, marker: &str) -> Self {
        self.fail_on = Some(marker.to_string());
        self
    }

    /// Fail right away for inputs containing `marker` resized to `width`.
    pub fn failing_at_width(mut self, marker: &str, width: u32) -> Self {
        self.fail_at_width = Some((marker.to_string(), width));
        self
    }

    /// Run each call on its own task, so dropping the caller's future does
    /// not stop the work (like `spawn_blocking`).
    pub fn detached(mut self) -> Self {
        self.detached = true;
        self
    }

    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<TransformOptions> {
        self.calls.lock().unwrap().clone()
    }
}

struct InFlight(Arc<AtomicUsize>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

struct StubCall {
    delay: Duration,
    fail_on: Option<String>,
    fail_at_width: Option<(String, u32)>,
    in_flight: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
    data: Bytes,
    options: TransformOptions,
}

impl StubCall {
    async fn run(self) -> Result<TransformedImage, TransformError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = InFlight(self.in_flight.clone());
        self.peak.fetch_max(now, Ordering::SeqCst);

        let input = String::from_utf8_lossy(&self.data).to_string();
        let options = self.options;

        if let Some((marker, width)) = &self.fail_at_width {
            if input.contains(marker.as_str()) && options.target_width == Some(*width) {
                return Err(TransformError::Decode(format!("cannot resize {}", marker)));
            }
        }

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        if let Some(marker) = &self.fail_on {
            if input.contains(marker.as_str()) {
                return Err(TransformError::Decode(format!("cannot decode {}", marker)));
            }
        }

        let width = options
            .target_width
            .map(|w| w.to_string())
            .unwrap_or_else(|| "-".to_string());
        let degrees = options.rotation.map(|r| r.degrees()).unwrap_or(0);
        let content_type = options
            .encode
            .format()
            .map(|f| f.to_mime_type())
            .unwrap_or("image/png");

        Ok(TransformedImage {
            data: Bytes::from(format!("{}|w={}|r={}", input, width, degrees)),
            content_type: content_type.to_string(),
        })
    }
}

#[async_trait]
impl ImageTransformer for StubTransformer {
    async fn transform(
        &self,
        data: Bytes,
        options: TransformOptions,
    ) -> Result<TransformedImage, TransformError> {
        self.calls.lock().unwrap().push(options.clone());

        let call = StubCall {
            delay: self.delay,
            fail_on: self.fail_on.clone(),
            fail_at_width: self.fail_at_width.clone(),
            in_flight: self.in_flight.clone(),
            peak: self.peak.clone(),
            data,
            options,
        };

        if self.detached {
            tokio::spawn(call.run())
                .await
                .map_err(|e| TransformError::Task(e.to_string()))?
        } else {
            call.run().await
        }
    }
}

/// Storage whose first `failures` reads fail with a connection error.
pub struct FlakyStorage {
    inner: MemoryStorage,
    failures: u32,
    gets: AtomicU32,
}

impl FlakyStorage {
    pub fn new(inner: MemoryStorage, failures: u32) -> Self {
        Self {
            inner,
            failures,
            gets: AtomicU32::new(0),
        }
    }

    pub fn get_calls(&self) -> u32 {
        self.gets.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Storage for FlakyStorage {
    async fn get(&self, storage_key: &str) -> StorageResult<Bytes> {
        if self.gets.fetch_add(1, Ordering::SeqCst) < self.failures {
            return Err(StorageError::BackendError(
                "connection refused by object store".to_string(),
            ));
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

pub fn fast_retry(max_attempts: u32) -> RetryConfig {
    RetryConfig {
        max_attempts,
        initial_delay: Duration::from_millis(1),
        backoff_multiplier: 2.0,
        max_delay: Duration::from_millis(5),
    }
}

pub struct Harness {
    pub storage: MemoryStorage,
    pub store: InMemoryAssetStore,
    pub transformer: Arc<StubTransformer>,
    pub ctx: PipelineContext,
}

impl Harness {
    pub fn new(variants: &str, transformer: StubTransformer) -> Self {
        let storage = MemoryStorage::new();
        Self::with_storage(variants, transformer, storage.clone(), Arc::new(storage))
    }

    /// `backend` is what the pipeline talks to; `storage` is the map behind it.
    pub fn with_storage(
        variants: &str,
        transformer: StubTransformer,
        storage: MemoryStorage,
        backend: Arc<dyn Storage>,
    ) -> Self {
        let store = InMemoryAssetStore::new();
        let transformer = Arc::new(transformer);
        let ctx = PipelineContext::new(
            backend,
            Arc::new(store.clone()),
            transformer.clone(),
            VariantSet::parse(variants).unwrap(),
        );
        Self {
            storage,
            store,
            transformer,
            ctx,
        }
    }

    /// Store an original under `media/<name>` and register it as pending.
    pub async fn upload(&self, name: &str, mime_type: &str) -> Uuid {
        let id = Uuid::new_v4();
        let key = format!("media/{}", name);
        self.storage
            .put(&key, Bytes::from(format!("original:{}", name)), mime_type)
            .await
            .unwrap();
        self.store.register_asset(id, &key, mime_type).await.unwrap();
        id
    }

    pub fn text(&self, key: &str) -> String {
        let object = self
            .storage
            .object(key)
            .unwrap_or_else(|| panic!("missing object {}", key));
        String::from_utf8(object.data.to_vec()).unwrap()
    }
}
