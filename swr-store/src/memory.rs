//! # In-Memory Entity Store
//!
//! Non-durable [`EntityStore`] implementation holding JSON payloads in a
//! `HashMap`. Follows the same reserved-key, decode-skip, replace-all, and
//! lifecycle rules as the SQLite store, which makes it a drop-in backend
//! for tests and for callers that want SWR semantics without a database.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use swr_traits::{CacheEntity, Clock, SystemClock};

use crate::error::{Result, StoreError};
use crate::store::{EntityStore, SyncStamp, DEFAULT_SYNC_KEY};

/// In-memory store for one cached collection.
pub struct MemoryEntityStore<T: CacheEntity> {
    state: RwLock<MemoryState>,
    sync_key: String,
    clock: Arc<dyn Clock>,
    _marker: PhantomData<fn() -> T>,
}

struct MemoryState {
    entries: HashMap<String, String>,
    last_sync: Option<DateTime<Utc>>,
    opened: bool,
    closed: bool,
}

impl<T: CacheEntity> MemoryEntityStore<T> {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(MemoryState {
                entries: HashMap::new(),
                last_sync: None,
                opened: false,
                closed: false,
            }),
            sync_key: DEFAULT_SYNC_KEY.to_string(),
            clock: Arc::new(SystemClock),
            _marker: PhantomData,
        }
    }

    /// Override the reserved sync-metadata key.
    ///
    /// Must match the key configured on the owning orchestrator.
    pub fn with_sync_key(mut self, sync_key: impl Into<String>) -> Self {
        self.sync_key = sync_key.into();
        self
    }

    /// Override the time source used for the last-sync record.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn check_open(state: &MemoryState) -> Result<()> {
        if state.closed {
            return Err(StoreError::Closed);
        }
        if !state.opened {
            return Err(StoreError::Uninitialized);
        }
        Ok(())
    }

    fn entity_key(&self, id: &T::Id) -> Result<String> {
        let key = id.to_string();
        if key == self.sync_key {
            return Err(StoreError::ReservedKey(key));
        }
        Ok(key)
    }
}

impl<T: CacheEntity> Default for MemoryEntityStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T: CacheEntity> EntityStore<T> for MemoryEntityStore<T> {
    async fn initialize(&self) -> Result<()> {
        let mut state = self.state.write().await;
        if state.closed {
            return Err(StoreError::Closed);
        }
        state.opened = true;
        Ok(())
    }

    async fn get_all(&self) -> Result<Vec<T>> {
        let state = self.state.read().await;
        Self::check_open(&state)?;

        let mut items = Vec::with_capacity(state.entries.len());
        for (key, payload) in &state.entries {
            match serde_json::from_str::<T>(payload) {
                Ok(item) => items.push(item),
                Err(e) => {
                    warn!(key = %key, error = %e, "Skipping undecodable cache entry");
                }
            }
        }

        Ok(items)
    }

    async fn get_by_id(&self, id: &T::Id) -> Result<Option<T>> {
        let key = self.entity_key(id)?;
        let state = self.state.read().await;
        Self::check_open(&state)?;

        let Some(payload) = state.entries.get(&key) else {
            return Ok(None);
        };

        match serde_json::from_str::<T>(payload) {
            Ok(item) => Ok(Some(item)),
            Err(e) => {
                warn!(key = %key, error = %e, "Skipping undecodable cache entry");
                Ok(None)
            }
        }
    }

    async fn save_all(&self, items: &[T]) -> Result<()> {
        let mut entries = HashMap::with_capacity(items.len());
        for item in items {
            let key = self.entity_key(&item.id())?;
            entries.insert(key, serde_json::to_string(item)?);
        }

        let mut state = self.state.write().await;
        Self::check_open(&state)?;

        state.entries = entries;
        // Round-trip through the durable stamp shape so timestamps carry
        // the same millisecond precision as the SQLite store.
        state.last_sync = SyncStamp::from(self.clock.now()).to_datetime();

        debug!(count = items.len(), "Replaced cache collection");
        Ok(())
    }

    async fn save(&self, item: &T) -> Result<()> {
        let key = self.entity_key(&item.id())?;
        let payload = serde_json::to_string(item)?;

        let mut state = self.state.write().await;
        Self::check_open(&state)?;

        state.entries.insert(key, payload);
        Ok(())
    }

    async fn delete(&self, id: &T::Id) -> Result<()> {
        let key = self.entity_key(id)?;

        let mut state = self.state.write().await;
        Self::check_open(&state)?;

        if state.entries.remove(&key).is_none() {
            return Err(StoreError::NotFound { key });
        }

        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        let mut state = self.state.write().await;
        Self::check_open(&state)?;

        state.entries.clear();
        state.last_sync = None;

        debug!("Cleared cache collection");
        Ok(())
    }

    async fn last_sync_time(&self) -> Result<Option<DateTime<Utc>>> {
        let state = self.state.read().await;
        Self::check_open(&state)?;
        Ok(state.last_sync)
    }

    async fn dispose(&self) -> Result<()> {
        let mut state = self.state.write().await;
        state.closed = true;
        state.entries.clear();
        Ok(())
    }
}

#[cfg(test)]
impl<T: CacheEntity> MemoryEntityStore<T> {
    async fn insert_raw(&self, key: &str, payload: &str) {
        let mut state = self.state.write().await;
        state.entries.insert(key.to_string(), payload.to_string());
    }
}
