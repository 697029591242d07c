//! # Cache State Model
//!
//! Immutable snapshots of one cached collection, as observed by
//! subscribers. A snapshot is only ever produced by the constructors and
//! transition methods here, which keep the provenance invariant intact:
//! a state with [`DataSource::None`] never carries data.
//!
//! Staleness is not stored. It is computed on demand from `last_updated`
//! against a caller-supplied clock reading, so two observers with
//! different TTL policies can disagree about the same snapshot.

use chrono::{DateTime, Duration, Utc};

use crate::error::CacheError;

/// Provenance of the data carried by a [`CacheState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSource {
    /// No data has been established yet.
    None,
    /// Data was hydrated from the persistent store.
    Cache,
    /// Data came from the most recent remote fetch.
    Network,
}

impl DataSource {
    /// Stable lowercase name, used in log fields.
    pub fn as_str(&self) -> &'static str {
        match self {
            DataSource::None => "none",
            DataSource::Cache => "cache",
            DataSource::Network => "network",
        }
    }
}

impl std::fmt::Display for DataSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One observable snapshot of a cached collection.
///
/// Data presence and error presence are independent axes: a snapshot can
/// hold yesterday's items alongside today's failure. Fields are private
/// so every snapshot in circulation went through a transition method.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheState<T> {
    data: Option<T>,
    last_updated: Option<DateTime<Utc>>,
    is_loading: bool,
    source: DataSource,
    error: Option<CacheError>,
    error_message: Option<String>,
}

impl<T> CacheState<T> {
    /// Neutral state: no data, no error, nothing in flight.
    pub fn empty() -> Self {
        Self {
            data: None,
            last_updated: None,
            is_loading: false,
            source: DataSource::None,
            error: None,
            error_message: None,
        }
    }

    /// Initial state: a load is underway and nothing is known yet.
    pub fn loading() -> Self {
        Self {
            is_loading: true,
            ..Self::empty()
        }
    }

    /// Transition to store-hydrated data.
    ///
    /// Keeps `is_loading` set because hydration happens while the network
    /// leg of a refresh cycle is still pending. `sync_time` is the
    /// persisted last-sync instant, absent when the store never recorded
    /// one. Clears any previous error.
    pub fn with_cache_data(self, data: T, sync_time: Option<DateTime<Utc>>) -> Self {
        Self {
            data: Some(data),
            last_updated: sync_time,
            is_loading: true,
            source: DataSource::Cache,
            error: None,
            error_message: None,
        }
    }

    /// Transition to freshly fetched data, stamped at `now`.
    ///
    /// Ends the in-flight cycle and clears any previous error.
    pub fn with_network_data(self, data: T, now: DateTime<Utc>) -> Self {
        Self {
            data: Some(data),
            last_updated: Some(now),
            is_loading: false,
            source: DataSource::Network,
            error: None,
            error_message: None,
        }
    }

    /// Transition to a failure, keeping whatever data was already shown.
    ///
    /// `message` overrides the human-readable description; when absent
    /// the cause's own rendering is used. `data`, `last_updated` and
    /// `source` survive untouched, so subscribers keep displaying stale
    /// content alongside the failure.
    pub fn with_error(self, cause: CacheError, message: Option<String>) -> Self {
        let error_message = message.unwrap_or_else(|| cause.to_string());
        Self {
            is_loading: false,
            error: Some(cause),
            error_message: Some(error_message),
            ..self
        }
    }

    /// Forced-loading copy used when a visible refresh starts.
    ///
    /// Keeps data and provenance, clears the error so subscribers stop
    /// showing a failure that is being retried.
    pub fn refreshing(self) -> Self {
        Self {
            is_loading: true,
            error: None,
            error_message: None,
            ..self
        }
    }

    /// Carried data, if any.
    pub fn data(&self) -> Option<&T> {
        self.data.as_ref()
    }

    /// Instant the data was last confirmed fresh, if known.
    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.last_updated
    }

    /// Whether a refresh cycle is in flight.
    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    /// Where the carried data came from.
    pub fn source(&self) -> DataSource {
        self.source
    }

    /// The most recent failure, if one is being displayed.
    pub fn error(&self) -> Option<&CacheError> {
        self.error.as_ref()
    }

    /// Human-readable rendering of the failure, if one is displayed.
    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    /// Whether the snapshot carries data.
    pub fn has_data(&self) -> bool {
        self.data.is_some()
    }

    /// Whether the snapshot carries a failure.
    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }

    /// Whether the data is older than `ttl` at instant `now`.
    ///
    /// A snapshot with no `last_updated` is always stale. Age exactly
    /// equal to the TTL is still fresh; staleness begins strictly past
    /// it.
    pub fn is_stale(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        match self.last_updated {
            Some(at) => now - at > ttl,
            None => true,
        }
    }
}

impl<T> Default for CacheState<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T: Clone> CacheState<Vec<T>> {
    /// Project a collection snapshot down to its first element.
    ///
    /// Loading, provenance, timestamps and errors carry over unchanged;
    /// an empty collection projects to a data-less snapshot.
    pub fn project_first(&self) -> CacheState<T> {
        CacheState {
            data: self.data.as_ref().and_then(|items| items.first().cloned()),
            last_updated: self.last_updated,
            is_loading: self.is_loading,
            source: self.source,
            error: self.error.clone(),
            error_message: self.error_message.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use swr_traits::SourceError;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn network_failure() -> CacheError {
        CacheError::Fetch(SourceError::Network("timed out".to_string()))
    }

    #[test]
    fn loading_is_the_initial_shape() {
        let state: CacheState<Vec<i32>> = CacheState::loading();

        assert!(state.is_loading());
        assert!(!state.has_data());
        assert!(!state.has_error());
        assert_eq!(state.source(), DataSource::None);
        assert_eq!(state.last_updated(), None);
    }

    #[test]
    fn with_cache_data_keeps_loading_and_clears_error() {
        let state = CacheState::loading()
            .with_error(network_failure(), None)
            .with_cache_data(vec![1, 2], Some(at(100)));

        assert!(state.is_loading());
        assert_eq!(state.data(), Some(&vec![1, 2]));
        assert_eq!(state.source(), DataSource::Cache);
        assert_eq!(state.last_updated(), Some(at(100)));
        assert!(!state.has_error());
    }

    #[test]
    fn with_network_data_ends_the_cycle() {
        let state = CacheState::loading().with_network_data(vec![7], at(200));

        assert!(!state.is_loading());
        assert_eq!(state.data(), Some(&vec![7]));
        assert_eq!(state.source(), DataSource::Network);
        assert_eq!(state.last_updated(), Some(at(200)));
        assert!(!state.has_error());
    }

    #[test]
    fn with_error_preserves_data_and_source() {
        let state = CacheState::loading()
            .with_network_data(vec![7], at(200))
            .with_error(network_failure(), None);

        assert!(!state.is_loading());
        assert!(state.has_data());
        assert!(state.has_error());
        assert_eq!(state.data(), Some(&vec![7]));
        assert_eq!(state.source(), DataSource::Network);
        assert_eq!(state.last_updated(), Some(at(200)));
    }

    #[test]
    fn with_error_defaults_message_to_cause_description() {
        let state: CacheState<Vec<i32>> =
            CacheState::loading().with_error(network_failure(), None);

        assert_eq!(
            state.error_message(),
            Some("Remote fetch failed: Network error: timed out")
        );

        let state: CacheState<Vec<i32>> = CacheState::loading()
            .with_error(network_failure(), Some("friendly words".to_string()));

        assert_eq!(state.error_message(), Some("friendly words"));
    }

    #[test]
    fn refreshing_keeps_data_and_clears_error() {
        let state = CacheState::loading()
            .with_network_data(vec![3], at(50))
            .with_error(network_failure(), None)
            .refreshing();

        assert!(state.is_loading());
        assert!(!state.has_error());
        assert_eq!(state.error_message(), None);
        assert_eq!(state.data(), Some(&vec![3]));
        assert_eq!(state.source(), DataSource::Network);
        assert_eq!(state.last_updated(), Some(at(50)));
    }

    #[test]
    fn staleness_begins_strictly_past_the_ttl() {
        let ttl = Duration::minutes(5);
        let updated = at(1_000);
        let state = CacheState::loading().with_network_data(vec![1], updated);

        // One millisecond short of the boundary.
        assert!(!state.is_stale(ttl, updated + ttl - Duration::milliseconds(1)));
        // Exactly at the boundary.
        assert!(!state.is_stale(ttl, updated + ttl));
        // One millisecond past it.
        assert!(state.is_stale(ttl, updated + ttl + Duration::milliseconds(1)));
    }

    #[test]
    fn missing_timestamp_is_always_stale() {
        let state: CacheState<Vec<i32>> = CacheState::loading();

        assert!(state.is_stale(Duration::weeks(52), at(0)));

        // Hydrated from a store that never recorded a sync.
        let state = CacheState::loading().with_cache_data(vec![1], None);
        assert!(state.has_data());
        assert!(state.is_stale(Duration::weeks(52), at(0)));
    }

    #[test]
    fn sourceless_states_never_carry_data() {
        let empty: CacheState<Vec<i32>> = CacheState::empty();
        let loading: CacheState<Vec<i32>> = CacheState::loading();
        let failed: CacheState<Vec<i32>> =
            CacheState::loading().with_error(network_failure(), None);

        for state in [empty, loading, failed] {
            assert_eq!(state.source(), DataSource::None);
            assert!(!state.has_data());
        }
    }

    #[test]
    fn project_first_takes_the_head_element() {
        let state = CacheState::loading().with_network_data(vec!["a", "b"], at(10));
        let first = state.project_first();

        assert_eq!(first.data(), Some(&"a"));
        assert_eq!(first.source(), DataSource::Network);
        assert_eq!(first.last_updated(), Some(at(10)));
        assert!(!first.is_loading());
    }

    #[test]
    fn project_first_of_empty_collection_has_no_data() {
        let state: CacheState<Vec<i32>> =
            CacheState::loading().with_network_data(vec![], at(10));
        let first = state.project_first();

        assert!(!first.has_data());
        // Provenance survives projection even when the collection is empty.
        assert_eq!(first.source(), DataSource::Network);
    }

    #[test]
    fn project_first_carries_the_error() {
        let state = CacheState::loading()
            .with_network_data(vec![1], at(10))
            .with_error(network_failure(), None);
        let first = state.project_first();

        assert!(first.has_error());
        assert_eq!(first.data(), Some(&1));
        assert_eq!(
            first.error_message(),
            Some("Remote fetch failed: Network error: timed out")
        );
    }
}
