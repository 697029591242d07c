//! # Entity Store Contract
//!
//! Durable key-value persistence for one cached collection, plus a single
//! reserved record tracking when the collection was last replaced.
//!
//! ## Overview
//!
//! One store instance owns one logical collection: every entity is persisted
//! under its stringified identifier, and one reserved key holds the last-sync
//! timestamp. The cache orchestrator is the intended sole writer; it relies
//! on [`save_all`](EntityStore::save_all) replacing the whole collection so
//! readers never observe a mix of old and new entities.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use swr_traits::CacheEntity;

use crate::error::Result;

/// Reserved key for the last-sync metadata record.
///
/// Entity identifiers must never render to this string. Stores reject it
/// wherever an entity key is expected.
pub const DEFAULT_SYNC_KEY: &str = "__sync_metadata__";

/// Persisted shape of the reserved sync-metadata record.
///
/// Stored as JSON under the store's sync key; `timestamp` is Unix millis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStamp {
    pub timestamp: i64,
}

impl SyncStamp {
    pub fn new(timestamp: i64) -> Self {
        Self { timestamp }
    }

    /// Convert to a UTC datetime; `None` if the millis are out of range.
    pub fn to_datetime(self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.timestamp)
    }
}

impl From<DateTime<Utc>> for SyncStamp {
    fn from(at: DateTime<Utc>) -> Self {
        Self::new(at.timestamp_millis())
    }
}

/// Persistence contract consumed by the cache orchestrator.
///
/// Implementations must be safe to share behind `Arc` across async tasks.
#[async_trait]
pub trait EntityStore<T: CacheEntity>: Send + Sync {
    /// Open the underlying store.
    ///
    /// Safe to call multiple times; must complete before any other
    /// operation is used.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be opened.
    async fn initialize(&self) -> Result<()>;

    /// Read all persisted entities, excluding the reserved sync record.
    ///
    /// Entries whose payload no longer decodes are skipped and logged
    /// individually; a partially unreadable collection is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying read fails as a whole.
    async fn get_all(&self) -> Result<Vec<T>>;

    /// Look up a single entity by identifier.
    ///
    /// # Errors
    ///
    /// Returns an error if the identifier is the reserved sync key or the
    /// underlying read fails.
    async fn get_by_id(&self, id: &T::Id) -> Result<Option<T>>;

    /// Replace the entire collection with `items`.
    ///
    /// Deletes every non-reserved entry, writes the new set, and updates
    /// the last-sync record, all atomically from the caller's perspective.
    ///
    /// # Errors
    ///
    /// Returns an error if any item's identifier is the reserved sync key,
    /// serialization fails, or the underlying write fails. On error the
    /// previous collection is left intact.
    async fn save_all(&self, items: &[T]) -> Result<()>;

    /// Insert or update a single entity.
    ///
    /// Does not touch the last-sync record.
    ///
    /// # Errors
    ///
    /// Returns an error if the identifier is the reserved sync key or the
    /// underlying write fails.
    async fn save(&self, item: &T) -> Result<()>;

    /// Delete a single entity by identifier.
    ///
    /// # Errors
    ///
    /// Returns an error if the identifier is the reserved sync key, the
    /// entry does not exist, or the underlying write fails.
    async fn delete(&self, id: &T::Id) -> Result<()>;

    /// Remove every entry in the collection, including the sync record.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying write fails.
    async fn clear(&self) -> Result<()>;

    /// Time of the last completed [`save_all`](EntityStore::save_all),
    /// `None` if the collection has never been replaced (or was cleared).
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying read fails.
    async fn last_sync_time(&self) -> Result<Option<DateTime<Utc>>>;

    /// Release underlying resources.
    ///
    /// Safe to call once; the store is unusable afterward and every other
    /// operation fails with [`StoreError::Closed`](crate::StoreError::Closed).
    ///
    /// # Errors
    ///
    /// Returns an error if releasing resources fails.
    async fn dispose(&self) -> Result<()>;
}
