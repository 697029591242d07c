//! # Cache Orchestration Module
//!
//! Stale-while-revalidate caching for collections of entities: show
//! persisted data immediately, refresh it from the remote source in the
//! background, and keep showing what you have when the refresh fails.
//!
//! ## Overview
//!
//! A [`CacheOrchestrator`] owns one cached collection. It wires together
//! a persistent store (`swr-store`), a remote source strategy
//! (`swr-traits`), and a broadcast channel of [`CacheState`] snapshots
//! that interested parties subscribe to. Subscribers always receive the
//! current snapshot on subscription, then every transition after it:
//!
//! ```text
//! loading -> cached (is_loading) -> network
//!                 \-> error (data preserved)
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//!
//! use swr_core::{CacheConfig, CacheOrchestrator};
//! use swr_store::{create_pool, DatabaseConfig, SqliteEntityStore};
//!
//! let pool = create_pool(DatabaseConfig::new("cache.db")).await?;
//! let store = Arc::new(SqliteEntityStore::new(pool, "albums"));
//! let source = Arc::new(AlbumApi::new(client));
//!
//! let cache = CacheOrchestrator::new(CacheConfig::new(), store, source);
//! let mut updates = cache.subscribe();
//!
//! while updates.changed().await.is_ok() {
//!     let state = updates.borrow().clone();
//!     render(state.data(), state.is_loading(), state.error_message());
//! }
//! ```

pub mod config;
pub mod error;
pub mod orchestrator;
pub mod state;

pub use config::CacheConfig;
pub use error::{CacheError, Result};
pub use orchestrator::CacheOrchestrator;
pub use state::{CacheState, DataSource};
