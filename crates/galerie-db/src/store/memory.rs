//! In-memory asset status store with the same semantics as the PostgreSQL one.
//!
//! Leases only exclude callers sharing this instance, so it is suitable for a
//! single process (tests, local runs).

use super::{check_transition, AssetStatusStore};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use galerie_core::{AppError, Asset, VariantStatus};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use uuid::Uuid;

#[derive(Debug, Clone, Copy)]
struct Lease {
    owner: Uuid,
    expires_at: Instant,
}

#[derive(Default)]
struct State {
    assets: HashMap<Uuid, Asset>,
    history: HashMap<Uuid, Vec<VariantStatus>>,
    leases: HashMap<Uuid, Lease>,
}

#[derive(Clone, Default)]
pub struct InMemoryAssetStore {
    state: Arc<Mutex<State>>,
}

impl InMemoryAssetStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>, AppError> {
        self.state
            .lock()
            .map_err(|_| AppError::Internal("asset store lock poisoned".to_string()))
    }

    /// Every status the asset has been written with, in order, starting with
    /// `pending` at registration.
    pub fn status_history(&self, id: Uuid) -> Vec<VariantStatus> {
        self.lock()
            .ok()
            .and_then(|state| state.history.get(&id).cloned())
            .unwrap_or_default()
    }

    /// Current holder of an unexpired lease, if any.
    pub fn lease_holder(&self, asset_id: Uuid) -> Option<Uuid> {
        let state = self.lock().ok()?;
        state
            .leases
            .get(&asset_id)
            .filter(|lease| lease.expires_at > Instant::now())
            .map(|lease| lease.owner)
    }
}

#[async_trait]
impl AssetStatusStore for InMemoryAssetStore {
    async fn register_asset(
        &self,
        id: Uuid,
        original_key: &str,
        mime_type: &str,
    ) -> Result<Asset, AppError> {
        let mut state = self.lock()?;
        if state.assets.contains_key(&id) {
            return Err(AppError::invalid_input(format!("asset {} already exists", id)));
        }
        let asset = Asset::new(id, original_key, mime_type);
        state.assets.insert(id, asset.clone());
        state.history.insert(id, vec![VariantStatus::Pending]);
        Ok(asset)
    }

    async fn get_asset(&self, id: Uuid) -> Result<Option<Asset>, AppError> {
        Ok(self.lock()?.assets.get(&id).cloned())
    }

    async fn set_status(&self, id: Uuid, status: VariantStatus) -> Result<(), AppError> {
        let mut state = self.lock()?;
        let asset = state
            .assets
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("asset {}", id)))?;

        check_transition(id, asset.variant_status, status)?;
        asset.variant_status = status;
        state.history.entry(id).or_default().push(status);
        Ok(())
    }

    async fn touch(&self, id: Uuid, mime_type: Option<&str>) -> Result<DateTime<Utc>, AppError> {
        let mut state = self.lock()?;
        let asset = state
            .assets
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("asset {}", id)))?;

        let now = Utc::now();
        let floor = asset.updated_at + ChronoDuration::milliseconds(1);
        asset.updated_at = now.max(floor);
        if let Some(mime_type) = mime_type {
            asset.mime_type = mime_type.to_string();
        }
        Ok(asset.updated_at)
    }

    async fn list_by_status(&self, statuses: &[VariantStatus]) -> Result<Vec<Asset>, AppError> {
        let state = self.lock()?;
        let mut assets: Vec<Asset> = state
            .assets
            .values()
            .filter(|asset| statuses.contains(&asset.variant_status))
            .cloned()
            .collect();
        assets.sort_by_key(|asset| asset.created_at);
        Ok(assets)
    }

    async fn try_acquire_lease(
        &self,
        asset_id: Uuid,
        owner: Uuid,
        ttl: Duration,
    ) -> Result<bool, AppError> {
        let mut state = self.lock()?;
        let now = Instant::now();

        if let Some(existing) = state.leases.get(&asset_id) {
            if existing.expires_at > now {
                return Ok(false);
            }
            tracing::debug!(
                asset_id = %asset_id,
                previous_owner = %existing.owner,
                "Taking over expired rotation lease"
            );
        }

        state.leases.insert(
            asset_id,
            Lease {
                owner,
                expires_at: now + ttl,
            },
        );
        Ok(true)
    }

    async fn release_lease(&self, asset_id: Uuid, owner: Uuid) -> Result<(), AppError> {
        let mut state = self.lock()?;
        if state
            .leases
            .get(&asset_id)
            .is_some_and(|lease| lease.owner == owner)
        {
            state.leases.remove(&asset_id);
        }
        Ok(())
    }
}
