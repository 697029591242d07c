//! # Cache Collaborator Traits
//!
//! Contracts between the cache orchestration core and the application code
//! that feeds it.
//!
//! ## Overview
//!
//! This crate defines the seams the orchestrator consumes but never
//! implements itself. Each trait represents a capability supplied at
//! construction time: what an entity looks like, where fresh copies of the
//! collection come from, and what "now" means.
//!
//! ## Traits
//!
//! - [`CacheEntity`](entity::CacheEntity) - Identity and wire form of a cached value
//! - [`EntitySource`](entity::EntitySource) - Remote fetch plus optional transform/error hooks
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//!
//! ## Error Handling
//!
//! Remote failures are reported as [`SourceError`](error::SourceError), a
//! cloneable transport-defined cause. Source implementations should convert
//! their transport's errors into it with actionable messages; the core
//! carries the value into emitted states rather than unwinding.
//!
//! ## Thread Safety
//!
//! All traits require `Send + Sync` so implementations can be shared across
//! async tasks behind `Arc`.
//!
//! ## Examples
//!
//! ### Implementing EntitySource
//!
//! ```ignore
//! use swr_traits::{CacheEntity, EntitySource, SourceError};
//! use async_trait::async_trait;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! pub struct Article {
//!     pub id: String,
//!     pub title: String,
//! }
//!
//! impl CacheEntity for Article {
//!     type Id = String;
//!
//!     fn id(&self) -> String {
//!         self.id.clone()
//!     }
//! }
//!
//! pub struct ArticleApi {
//!     client: reqwest::Client,
//! }
//!
//! #[async_trait]
//! impl EntitySource<Article> for ArticleApi {
//!     async fn fetch(&self) -> Result<Vec<Article>, SourceError> {
//!         // Call the backing API and map transport errors.
//!         todo!()
//!     }
//! }
//! ```

pub mod entity;
pub mod error;
pub mod time;

pub use error::SourceError;

// Re-export commonly used types
pub use entity::{CacheEntity, EntitySource};
pub use time::{Clock, SystemClock};
