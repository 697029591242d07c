//! # SQLite Entity Store
//!
//! Durable [`EntityStore`] implementation backed by a SQLite connection
//! pool. One store instance owns one namespace in the shared
//! `cache_entries` table; payloads are JSON-encoded entities.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::{debug, warn};

use swr_traits::{CacheEntity, Clock, SystemClock};

use crate::db;
use crate::error::{Result, StoreError};
use crate::store::{EntityStore, SyncStamp, DEFAULT_SYNC_KEY};

// ============================================================================
// Store
// ============================================================================

/// SQLite-backed store for one cached collection.
///
/// The pool is treated as owned: [`dispose`](EntityStore::dispose) closes
/// it. Callers sharing a pool across collections should hand each store its
/// own pool handle created over the same database file instead.
///
/// # Examples
///
/// ```rust,ignore
/// use swr_store::{db, SqliteEntityStore};
///
/// let pool = db::create_pool(db::DatabaseConfig::new("cache.db")).await?;
/// let store = SqliteEntityStore::<Article>::new(pool, "articles");
/// store.initialize().await?;
/// ```
pub struct SqliteEntityStore<T: CacheEntity> {
    pool: SqlitePool,
    namespace: String,
    sync_key: String,
    clock: Arc<dyn Clock>,
    opened: AtomicBool,
    closed: AtomicBool,
    _marker: PhantomData<fn() -> T>,
}

impl<T: CacheEntity> SqliteEntityStore<T> {
    /// Create a new store over `pool`, scoped to `namespace`.
    pub fn new(pool: SqlitePool, namespace: impl Into<String>) -> Self {
        Self {
            pool,
            namespace: namespace.into(),
            sync_key: DEFAULT_SYNC_KEY.to_string(),
            clock: Arc::new(SystemClock),
            opened: AtomicBool::new(false),
            closed: AtomicBool::new(false),
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

    /// Collection namespace this store is scoped to.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StoreError::Closed);
        }
        if !self.opened.load(Ordering::Acquire) {
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

#[async_trait]
impl<T: CacheEntity> EntityStore<T> for SqliteEntityStore<T> {
    async fn initialize(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StoreError::Closed);
        }
        if self.opened.load(Ordering::Acquire) {
            return Ok(());
        }

        db::run_migrations(&self.pool).await?;
        self.opened.store(true, Ordering::Release);

        debug!(namespace = %self.namespace, "Cache store opened");
        Ok(())
    }

    async fn get_all(&self) -> Result<Vec<T>> {
        self.ensure_open()?;

        let rows = sqlx::query_as::<_, (String, String)>(
            r#"
            SELECT entry_key, payload
            FROM cache_entries
            WHERE namespace = ? AND entry_key <> ?
            "#,
        )
        .bind(&self.namespace)
        .bind(&self.sync_key)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::Database)?;

        let mut items = Vec::with_capacity(rows.len());
        for (entry_key, payload) in rows {
            match serde_json::from_str::<T>(&payload) {
                Ok(item) => items.push(item),
                Err(e) => {
                    warn!(
                        namespace = %self.namespace,
                        key = %entry_key,
                        error = %e,
                        "Skipping undecodable cache entry"
                    );
                }
            }
        }

        Ok(items)
    }

    async fn get_by_id(&self, id: &T::Id) -> Result<Option<T>> {
        self.ensure_open()?;
        let key = self.entity_key(id)?;

        let payload = sqlx::query_scalar::<_, String>(
            "SELECT payload FROM cache_entries WHERE namespace = ? AND entry_key = ?",
        )
        .bind(&self.namespace)
        .bind(&key)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::Database)?;

        let Some(payload) = payload else {
            return Ok(None);
        };

        // An undecodable entry is treated as absent, matching get_all's
        // skip policy; the next save_all overwrites it.
        match serde_json::from_str::<T>(&payload) {
            Ok(item) => Ok(Some(item)),
            Err(e) => {
                warn!(
                    namespace = %self.namespace,
                    key = %key,
                    error = %e,
                    "Skipping undecodable cache entry"
                );
                Ok(None)
            }
        }
    }

    async fn save_all(&self, items: &[T]) -> Result<()> {
        self.ensure_open()?;

        let mut entries = Vec::with_capacity(items.len());
        for item in items {
            let key = self.entity_key(&item.id())?;
            entries.push((key, serde_json::to_string(item)?));
        }

        let stamp = SyncStamp::new(self.clock.unix_timestamp_millis());
        let stamp_payload = serde_json::to_string(&stamp)?;

        let mut tx = self.pool.begin().await.map_err(StoreError::Database)?;

        sqlx::query("DELETE FROM cache_entries WHERE namespace = ? AND entry_key <> ?")
            .bind(&self.namespace)
            .bind(&self.sync_key)
            .execute(&mut *tx)
            .await
            .map_err(StoreError::Database)?;

        for (key, payload) in &entries {
            sqlx::query(
                r#"
                INSERT OR REPLACE INTO cache_entries (namespace, entry_key, payload)
                VALUES (?, ?, ?)
                "#,
            )
            .bind(&self.namespace)
            .bind(key)
            .bind(payload)
            .execute(&mut *tx)
            .await
            .map_err(StoreError::Database)?;
        }

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO cache_entries (namespace, entry_key, payload)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(&self.namespace)
        .bind(&self.sync_key)
        .bind(&stamp_payload)
        .execute(&mut *tx)
        .await
        .map_err(StoreError::Database)?;

        tx.commit().await.map_err(StoreError::Database)?;

        debug!(
            namespace = %self.namespace,
            count = entries.len(),
            "Replaced cache collection"
        );
        Ok(())
    }

    async fn save(&self, item: &T) -> Result<()> {
        self.ensure_open()?;
        let key = self.entity_key(&item.id())?;
        let payload = serde_json::to_string(item)?;

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO cache_entries (namespace, entry_key, payload)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(&self.namespace)
        .bind(&key)
        .bind(&payload)
        .execute(&self.pool)
        .await
        .map_err(StoreError::Database)?;

        Ok(())
    }

    async fn delete(&self, id: &T::Id) -> Result<()> {
        self.ensure_open()?;
        let key = self.entity_key(id)?;

        let result = sqlx::query("DELETE FROM cache_entries WHERE namespace = ? AND entry_key = ?")
            .bind(&self.namespace)
            .bind(&key)
            .execute(&self.pool)
            .await
            .map_err(StoreError::Database)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound { key });
        }

        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.ensure_open()?;

        sqlx::query("DELETE FROM cache_entries WHERE namespace = ?")
            .bind(&self.namespace)
            .execute(&self.pool)
            .await
            .map_err(StoreError::Database)?;

        debug!(namespace = %self.namespace, "Cleared cache collection");
        Ok(())
    }

    async fn last_sync_time(&self) -> Result<Option<DateTime<Utc>>> {
        self.ensure_open()?;

        let payload = sqlx::query_scalar::<_, String>(
            "SELECT payload FROM cache_entries WHERE namespace = ? AND entry_key = ?",
        )
        .bind(&self.namespace)
        .bind(&self.sync_key)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::Database)?;

        let Some(payload) = payload else {
            return Ok(None);
        };

        match serde_json::from_str::<SyncStamp>(&payload) {
            Ok(stamp) => Ok(stamp.to_datetime()),
            Err(e) => {
                warn!(
                    namespace = %self.namespace,
                    error = %e,
                    "Skipping undecodable sync-metadata record"
                );
                Ok(None)
            }
        }
    }

    async fn dispose(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        self.pool.close().await;
        debug!(namespace = %self.namespace, "Cache store closed");
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;
    use chrono::TimeZone;
    use serde::{Deserialize, Serialize};
    use std::collections::HashSet;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct TestItem {
        id: String,
        name: String,
    }

    impl TestItem {
        fn new(id: &str, name: &str) -> Self {
            Self {
                id: id.to_string(),
                name: name.to_string(),
            }
        }
    }

    impl CacheEntity for TestItem {
        type Id = String;

        fn id(&self) -> String {
            self.id.clone()
        }
    }

    struct FixedClock(DateTime<Utc>);

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.0
        }
    }

    async fn open_store() -> SqliteEntityStore<TestItem> {
        let pool = create_test_pool().await.unwrap();
        let store = SqliteEntityStore::new(pool, "test_items");
        store.initialize().await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_operations_require_initialize() {
        let pool = create_test_pool().await.unwrap();
        let store = SqliteEntityStore::<TestItem>::new(pool, "test_items");

        let result = store.get_all().await;
        assert!(matches!(result, Err(StoreError::Uninitialized)));
    }

    #[tokio::test]
    async fn test_initialize_is_idempotent() {
        let store = open_store().await;
        store.initialize().await.unwrap();
        store.initialize().await.unwrap();

        assert!(store.get_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_all_round_trip_is_set_equal() {
        let store = open_store().await;
        let items = vec![
            TestItem::new("3", "three"),
            TestItem::new("1", "one"),
            TestItem::new("2", "two"),
        ];

        store.save_all(&items).await.unwrap();
        let read = store.get_all().await.unwrap();

        let saved_ids: HashSet<String> = items.iter().map(|i| i.id()).collect();
        let read_ids: HashSet<String> = read.iter().map(|i| i.id()).collect();
        assert_eq!(read_ids, saved_ids);
        assert_eq!(read.len(), items.len());
    }

    #[tokio::test]
    async fn test_save_all_replaces_previous_collection() {
        let store = open_store().await;

        store
            .save_all(&[TestItem::new("1", "one"), TestItem::new("2", "two")])
            .await
            .unwrap();
        store.save_all(&[TestItem::new("3", "three")]).await.unwrap();

        let read = store.get_all().await.unwrap();
        assert_eq!(read, vec![TestItem::new("3", "three")]);
        assert_eq!(store.get_by_id(&"1".to_string()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_save_all_updates_last_sync_time() {
        let at = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let pool = create_test_pool().await.unwrap();
        let store = SqliteEntityStore::<TestItem>::new(pool, "test_items")
            .with_clock(Arc::new(FixedClock(at)));
        store.initialize().await.unwrap();

        assert_eq!(store.last_sync_time().await.unwrap(), None);

        store.save_all(&[TestItem::new("1", "one")]).await.unwrap();
        assert_eq!(store.last_sync_time().await.unwrap(), Some(at));
    }

    #[tokio::test]
    async fn test_save_does_not_update_last_sync_time() {
        let store = open_store().await;

        store.save(&TestItem::new("1", "one")).await.unwrap();

        assert_eq!(store.last_sync_time().await.unwrap(), None);
        assert_eq!(
            store.get_by_id(&"1".to_string()).await.unwrap(),
            Some(TestItem::new("1", "one"))
        );
    }

    #[tokio::test]
    async fn test_sync_record_is_excluded_from_get_all() {
        let store = open_store().await;

        store.save_all(&[TestItem::new("1", "one")]).await.unwrap();

        let read = store.get_all().await.unwrap();
        assert_eq!(read.len(), 1);
        assert_eq!(read[0].id, "1");
    }

    #[tokio::test]
    async fn test_reserved_key_is_rejected() {
        let store = open_store().await;
        let reserved = DEFAULT_SYNC_KEY.to_string();

        let item = TestItem::new(DEFAULT_SYNC_KEY, "impostor");

        assert!(matches!(
            store.save(&item).await,
            Err(StoreError::ReservedKey(_))
        ));
        assert!(matches!(
            store.save_all(std::slice::from_ref(&item)).await,
            Err(StoreError::ReservedKey(_))
        ));
        assert!(matches!(
            store.get_by_id(&reserved).await,
            Err(StoreError::ReservedKey(_))
        ));
        assert!(matches!(
            store.delete(&reserved).await,
            Err(StoreError::ReservedKey(_))
        ));
    }

    #[tokio::test]
    async fn test_get_all_skips_undecodable_entries() {
        let pool = create_test_pool().await.unwrap();
        let store = SqliteEntityStore::<TestItem>::new(pool.clone(), "test_items");
        store.initialize().await.unwrap();

        store.save_all(&[TestItem::new("1", "one")]).await.unwrap();

        // Corrupt row written behind the store's back.
        sqlx::query(
            "INSERT INTO cache_entries (namespace, entry_key, payload) VALUES (?, ?, ?)",
        )
        .bind("test_items")
        .bind("corrupt")
        .bind("not json at all")
        .execute(&pool)
        .await
        .unwrap();

        let read = store.get_all().await.unwrap();
        assert_eq!(read, vec![TestItem::new("1", "one")]);

        assert_eq!(store.get_by_id(&"corrupt".to_string()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_delete_missing_entry_is_not_found() {
        let store = open_store().await;

        let result = store.delete(&"ghost".to_string()).await;
        assert!(matches!(result, Err(StoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_clear_removes_entries_and_sync_record() {
        let store = open_store().await;

        store.save_all(&[TestItem::new("1", "one")]).await.unwrap();
        store.clear().await.unwrap();

        assert!(store.get_all().await.unwrap().is_empty());
        assert_eq!(store.last_sync_time().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_namespaces_are_isolated() {
        let pool = create_test_pool().await.unwrap();
        let first = SqliteEntityStore::<TestItem>::new(pool.clone(), "first");
        let second = SqliteEntityStore::<TestItem>::new(pool, "second");
        first.initialize().await.unwrap();
        second.initialize().await.unwrap();

        first.save_all(&[TestItem::new("1", "one")]).await.unwrap();

        assert_eq!(first.get_all().await.unwrap().len(), 1);
        assert!(second.get_all().await.unwrap().is_empty());
        assert_eq!(second.last_sync_time().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_dispose_makes_store_unusable() {
        let store = open_store().await;

        store.dispose().await.unwrap();
        store.dispose().await.unwrap();

        assert!(matches!(store.get_all().await, Err(StoreError::Closed)));
        assert!(matches!(store.initialize().await, Err(StoreError::Closed)));
    }

    #[tokio::test]
    async fn test_collection_survives_reopen_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.db");

        {
            let pool = crate::db::create_pool(crate::db::DatabaseConfig::new(&path))
                .await
                .unwrap();
            let store = SqliteEntityStore::<TestItem>::new(pool, "test_items");
            store.initialize().await.unwrap();
            store
                .save_all(&[TestItem::new("1", "one"), TestItem::new("2", "two")])
                .await
                .unwrap();
            store.dispose().await.unwrap();
        }

        let pool = crate::db::create_pool(crate::db::DatabaseConfig::new(&path))
            .await
            .unwrap();
        let store = SqliteEntityStore::<TestItem>::new(pool, "test_items");
        store.initialize().await.unwrap();

        let read = store.get_all().await.unwrap();
        assert_eq!(read.len(), 2);
        assert!(store.last_sync_time().await.unwrap().is_some());
    }
}
