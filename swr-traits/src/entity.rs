//! Entity and Remote Source Contracts
//!
//! Defines what a cacheable value is and where fresh copies of the
//! collection come from.

use std::fmt::Display;
use std::hash::Hash;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::error;

use crate::error::SourceError;

/// A value that can live in a cached collection.
///
/// The serde bounds supply the persisted wire form; [`id`](CacheEntity::id)
/// supplies the storage key. Identifiers are rendered with `Display` when
/// persisted, so two distinct identifiers must not render to the same
/// string.
///
/// # Example
///
/// ```ignore
/// use serde::{Deserialize, Serialize};
/// use swr_traits::CacheEntity;
///
/// #[derive(Debug, Clone, Serialize, Deserialize)]
/// struct Track {
///     id: u64,
///     title: String,
/// }
///
/// impl CacheEntity for Track {
///     type Id = u64;
///
///     fn id(&self) -> u64 {
///         self.id
///     }
/// }
/// ```
pub trait CacheEntity: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {
    /// Stable identifier type for this entity.
    type Id: Display + Eq + Hash + Clone + Send + Sync;

    /// Identifier of this entity, stable across fetches.
    fn id(&self) -> Self::Id;
}

/// Remote data source for one cached collection.
///
/// [`fetch`](EntitySource::fetch) is the only required operation; the
/// transform hooks default to identity and the error hook defaults to a
/// structured log event. Implementations own transport concerns entirely,
/// including timeouts and retries.
///
/// The transforms let an implementation persist a different subset than it
/// displays: `transform_for_cache` runs on fetched items before they are
/// written to the store, `transform_for_display` runs before items are
/// emitted to subscribers (including items hydrated from the store).
#[async_trait]
pub trait EntitySource<T: CacheEntity>: Send + Sync {
    /// Fetch the full collection from the remote system.
    async fn fetch(&self) -> Result<Vec<T>, SourceError>;

    /// Filter or reshape items before they are persisted.
    fn transform_for_cache(&self, items: Vec<T>) -> Vec<T> {
        items
    }

    /// Filter or reshape items before they are emitted to subscribers.
    fn transform_for_display(&self, items: Vec<T>) -> Vec<T> {
        items
    }

    /// Observe a failed refresh cycle.
    ///
    /// Invoked once per failure, after the corresponding error state has
    /// been emitted. The cause is usually a [`SourceError`] from
    /// [`fetch`](EntitySource::fetch), but persistence failures inside the
    /// refresh cycle arrive here too; downcast when the distinction
    /// matters. The failure never propagates to whoever triggered the
    /// refresh, so this hook is the place to wire error reporting.
    fn on_fetch_error(&self, cause: &(dyn std::error::Error + 'static)) {
        error!(cause = %cause, "Refresh cycle failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Sample {
        id: String,
        label: String,
    }

    impl CacheEntity for Sample {
        type Id = String;

        fn id(&self) -> String {
            self.id.clone()
        }
    }

    struct StaticSource {
        items: Vec<Sample>,
    }

    #[async_trait]
    impl EntitySource<Sample> for StaticSource {
        async fn fetch(&self) -> Result<Vec<Sample>, SourceError> {
            Ok(self.items.clone())
        }
    }

    #[tokio::test]
    async fn default_transforms_are_identity() {
        let source = StaticSource {
            items: vec![Sample {
                id: "a".to_string(),
                label: "first".to_string(),
            }],
        };

        let fetched = source.fetch().await.unwrap();
        let cached = source.transform_for_cache(fetched.clone());
        let displayed = source.transform_for_display(fetched.clone());

        assert_eq!(cached, fetched);
        assert_eq!(displayed, fetched);
    }

    #[test]
    fn entity_round_trips_through_json() {
        let sample = Sample {
            id: "42".to_string(),
            label: "answer".to_string(),
        };

        let json = serde_json::to_string(&sample).unwrap();
        let back: Sample = serde_json::from_str(&json).unwrap();

        assert_eq!(back, sample);
        assert_eq!(back.id(), "42");
    }
}
