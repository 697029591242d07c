//! # Cache Persistence Module
//!
//! Owns the durable side of the stale-while-revalidate cache: the
//! [`EntityStore`] contract the orchestrator consumes, a SQLite-backed
//! implementation, and an in-memory implementation for tests and
//! ephemeral use.
//!
//! ## Overview
//!
//! This module manages:
//! - The per-collection key-value persistence contract
//! - SQLite schema and migrations for the shared `cache_entries` table
//! - Connection pool configuration and creation
//! - The reserved last-sync metadata record
//!
//! ## Layout
//!
//! Each entity is stored under `stringified(id) → JSON(entity)` within its
//! collection's namespace; one reserved key per namespace holds a
//! `{"timestamp": millis}` record updated on every bulk replace.

pub mod db;
pub mod error;
pub mod memory;
pub mod sqlite;
pub mod store;

pub use error::{Result, StoreError};

// Re-export commonly used types
pub use db::{create_pool, create_test_pool, DatabaseConfig};
pub use memory::MemoryEntityStore;
pub use sqlite::SqliteEntityStore;
pub use store::{EntityStore, SyncStamp, DEFAULT_SYNC_KEY};
