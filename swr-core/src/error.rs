//! Error types for cache orchestration

use swr_store::StoreError;
use swr_traits::SourceError;
use thiserror::Error;

/// Errors surfaced by the cache orchestrator.
///
/// Only precondition violations ([`Disposed`](CacheError::Disposed),
/// [`ReservedId`](CacheError::ReservedId)) are returned to callers
/// directly. Fetch and persistence failures travel through state
/// emissions instead, so the type is `Clone` and comparable for use
/// inside [`CacheState`](crate::state::CacheState).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// The orchestrator was torn down; the operation will never succeed.
    #[error("Cache orchestrator has been disposed")]
    Disposed,

    /// The identifier collides with the reserved sync-metadata key.
    #[error("Identifier is reserved for sync metadata: {0}")]
    ReservedId(String),

    /// The remote source failed to deliver a fresh collection.
    #[error("Remote fetch failed: {0}")]
    Fetch(#[from] SourceError),

    /// The persistent store failed underneath the orchestrator.
    #[error("Store operation failed: {0}")]
    Store(String),
}

impl From<StoreError> for CacheError {
    fn from(err: StoreError) -> Self {
        CacheError::Store(err.to_string())
    }
}

/// Result type for cache orchestration operations.
pub type Result<T> = std::result::Result<T, CacheError>;
