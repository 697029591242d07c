//! # Cache Orchestrator Module
//!
//! Drives the stale-while-revalidate cycle for one cached collection:
//! hydrate persisted data immediately, refresh from the remote source in
//! the background, and never let a failed refresh take already-displayed
//! data away from subscribers.
//!
//! State flows through a [`watch`] channel. Every emission replaces the
//! previous snapshot and new subscribers always observe the current one
//! first, so late observers never start from nothing.
//!
//! All lifecycle bookkeeping lives behind a single async mutex. Remote
//! calls and store writes happen outside it, and every fetch re-checks
//! the disposed flag before touching the store or the channel, so a
//! refresh that resolves after [`dispose`](CacheOrchestrator::dispose)
//! discards its result wholesale.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{watch, Mutex};
use tokio_stream::wrappers::WatchStream;
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, info, instrument, warn};

use swr_store::EntityStore;
use swr_traits::{CacheEntity, Clock, EntitySource, SystemClock};

use crate::config::CacheConfig;
use crate::error::{CacheError, Result};
use crate::state::CacheState;

// ============================================================================
// Internal Types
// ============================================================================

/// Gate applied before a fetch attempt starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FetchGate {
    /// No gating. Explicit, user-initiated work.
    Always,
    /// Skip when a fetch is already in flight.
    IfIdle,
    /// Skip when in flight or still inside the throttle window.
    Throttled,
}

/// Mutable orchestrator internals, guarded by one lock.
struct Inner<T: CacheEntity> {
    /// Set before the first await of `initialize`, so concurrent calls
    /// collapse into one.
    initialized: bool,
    /// One-way flag. Once set, results of in-flight work are discarded.
    disposed: bool,
    /// Instant of the most recent fetch attempt, successful or not.
    last_refresh_attempt: Option<DateTime<Utc>>,
    /// Broadcast side of the state channel. Taken on dispose, which
    /// closes the channel while receivers keep the final snapshot.
    state_tx: Option<watch::Sender<CacheState<Vec<T>>>>,
}

impl<T: CacheEntity> Inner<T> {
    /// Apply a transition to the current snapshot and broadcast the
    /// result. Callers reach this through the lock, which serializes
    /// emissions into a single observable order.
    fn emit<F>(&self, transition: F)
    where
        F: FnOnce(CacheState<Vec<T>>) -> CacheState<Vec<T>>,
    {
        if let Some(tx) = self.state_tx.as_ref() {
            let current = tx.borrow().clone();
            let next = transition(current);
            tx.send(next).ok();
        }
    }
}

// ============================================================================
// Cache Orchestrator
// ============================================================================

/// Stale-while-revalidate orchestrator for one cached collection.
///
/// Owns a persistent [`EntityStore`], a remote [`EntitySource`], and the
/// state channel subscribers observe. See the module docs for the
/// lifecycle; the short version:
///
/// - [`initialize`](Self::initialize) hydrates from the store, emits,
///   then refreshes from the remote source.
/// - [`refresh`](Self::refresh) forces a visible refresh,
///   [`silent_refresh`](Self::silent_refresh) runs a throttled
///   background one.
/// - [`invalidate`](Self::invalidate) clears everything and starts over.
/// - [`dispose`](Self::dispose) tears the orchestrator down for good.
///
/// Fetch and persistence failures are emitted as error states carrying
/// the previous data; they never propagate to whoever triggered the
/// refresh. Only precondition violations are returned as errors.
pub struct CacheOrchestrator<T: CacheEntity> {
    /// Policy: TTL, refresh throttle, reserved sync key, auto-init.
    config: CacheConfig,
    /// Durable store for the collection.
    store: Arc<dyn EntityStore<T>>,
    /// Remote source of fresh collections.
    source: Arc<dyn EntitySource<T>>,
    /// Time source for throttle arithmetic and freshness stamps.
    clock: Arc<dyn Clock>,
    /// Lifecycle flags, throttle bookkeeping and the channel sender.
    inner: Arc<Mutex<Inner<T>>>,
    /// Kept outside the lock for synchronous snapshots and subscriptions.
    state_rx: watch::Receiver<CacheState<Vec<T>>>,
}

impl<T: CacheEntity> CacheOrchestrator<T> {
    /// Create an orchestrator using the system clock.
    ///
    /// When `config.auto_initialize` is set, initialization starts on a
    /// background task, so this must be called from within a Tokio
    /// runtime.
    pub fn new(
        config: CacheConfig,
        store: Arc<dyn EntityStore<T>>,
        source: Arc<dyn EntitySource<T>>,
    ) -> Self {
        Self::with_clock(config, store, source, Arc::new(SystemClock))
    }

    /// Create an orchestrator with an explicit time source.
    pub fn with_clock(
        config: CacheConfig,
        store: Arc<dyn EntityStore<T>>,
        source: Arc<dyn EntitySource<T>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (state_tx, state_rx) = watch::channel(CacheState::loading());

        let orchestrator = Self {
            config,
            store,
            source,
            clock,
            inner: Arc::new(Mutex::new(Inner {
                initialized: false,
                disposed: false,
                last_refresh_attempt: None,
                state_tx: Some(state_tx),
            })),
            state_rx,
        };

        if orchestrator.config.auto_initialize {
            let task = orchestrator.clone_for_task();
            tokio::spawn(async move {
                if let Err(e) = task.initialize().await {
                    warn!(error = %e, "Background initialization failed");
                }
            });
        }

        orchestrator
    }

    /// Clone for a background task (avoids `Arc<Arc<...>>`).
    fn clone_for_task(&self) -> Self {
        Self {
            config: self.config.clone(),
            store: Arc::clone(&self.store),
            source: Arc::clone(&self.source),
            clock: Arc::clone(&self.clock),
            inner: Arc::clone(&self.inner),
            state_rx: self.state_rx.clone(),
        }
    }

    // ========================================================================
    // Observation
    // ========================================================================

    /// Subscribe to state updates.
    ///
    /// The receiver immediately holds the current snapshot and observes
    /// every emission after it. Receivers stay usable after
    /// [`dispose`](Self::dispose); they keep returning the final
    /// snapshot.
    pub fn subscribe(&self) -> watch::Receiver<CacheState<Vec<T>>> {
        self.state_rx.clone()
    }

    /// Stream of snapshots, beginning with the current one.
    pub fn stream(&self) -> WatchStream<CacheState<Vec<T>>> {
        WatchStream::new(self.state_rx.clone())
    }

    /// Stream of single-item projections of the collection snapshots.
    ///
    /// Useful when the collection is known to hold at most one entity.
    pub fn stream_first(&self) -> impl Stream<Item = CacheState<T>> + Unpin {
        WatchStream::new(self.state_rx.clone()).map(|state| state.project_first())
    }

    /// Synchronous snapshot of the current state.
    pub fn current_state(&self) -> CacheState<Vec<T>> {
        self.state_rx.borrow().clone()
    }

    /// Whether initialization has started (it may still be running).
    pub async fn is_initialized(&self) -> bool {
        self.inner.lock().await.initialized
    }

    /// Whether the orchestrator has been torn down.
    pub async fn is_disposed(&self) -> bool {
        self.inner.lock().await.disposed
    }

    // ========================================================================
    // Lifecycle Operations
    // ========================================================================

    /// Open the store, hydrate persisted data and refresh from remote.
    ///
    /// Concurrent and repeated calls collapse into a single run. When the
    /// store holds data it is emitted first, so subscribers see cached
    /// content before the network round-trip completes; the follow-up
    /// fetch is then silent. On a cold start the fetch is the visible
    /// initial load instead.
    ///
    /// Store and fetch failures do not propagate: they are emitted as
    /// error states and reported to the source's error hook.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Disposed`] if called after `dispose`.
    #[instrument(skip(self))]
    pub async fn initialize(&self) -> Result<()> {
        {
            let mut inner = self.inner.lock().await;
            if inner.disposed {
                return Err(CacheError::Disposed);
            }
            if inner.initialized {
                debug!("Already initialized, skipping");
                return Ok(());
            }
            inner.initialized = true;
        }

        info!("Initializing cache");

        if let Err(e) = self.store.initialize().await {
            self.report_failure(CacheError::from(e)).await;
            return Ok(());
        }

        let hydrated = match self.hydrate().await {
            Ok(hydrated) => hydrated,
            Err(e) => {
                self.report_failure(e).await;
                return Ok(());
            }
        };

        // With cached data on screen the refresh stays in the background;
        // on a cold start it is the visible initial load.
        self.run_fetch(FetchGate::Always, hydrated).await;
        Ok(())
    }

    /// Force an immediate, visible refresh.
    ///
    /// Never throttled. Flips the state to loading (clearing any
    /// displayed error) before the remote call; the outcome arrives on
    /// the state channel, not in the return value.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Disposed`] if called after `dispose`.
    #[instrument(skip(self))]
    pub async fn refresh(&self) -> Result<()> {
        self.ensure_live().await?;
        info!("Manual refresh requested");
        self.run_fetch(FetchGate::Always, false).await;
        Ok(())
    }

    /// Background refresh honoring the throttle window.
    ///
    /// Skipped without error when the previous attempt is closer than
    /// the configured throttle or when a visible fetch is already in
    /// flight. The state never flips to loading, so subscribers only
    /// notice if the data actually changes or the fetch fails.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Disposed`] if called after `dispose`.
    #[instrument(skip(self))]
    pub async fn silent_refresh(&self) -> Result<()> {
        self.ensure_live().await?;
        self.run_fetch(FetchGate::Throttled, true).await;
        Ok(())
    }

    /// Discard all cached data and start the lifecycle over.
    ///
    /// Clears the store, resets the initialization flag, emits a fresh
    /// loading state and re-runs the full initialize sequence.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Disposed`] if called after `dispose`, or
    /// the store failure if clearing fails.
    #[instrument(skip(self))]
    pub async fn invalidate(&self) -> Result<()> {
        self.ensure_live().await?;
        info!("Invalidating cache");

        self.store.clear().await?;

        {
            let mut inner = self.inner.lock().await;
            if inner.disposed {
                return Err(CacheError::Disposed);
            }
            inner.initialized = false;
            inner.emit(|_| CacheState::loading());
        }

        self.initialize().await
    }

    /// Look up a single entity, store-first.
    ///
    /// With `fetch_if_missing`, a store miss triggers one silent
    /// fetch-and-persist cycle followed by a re-read. The fallback fetch
    /// is skipped when one is already in flight, in which case the miss
    /// is returned as-is.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Disposed`] after disposal,
    /// [`CacheError::ReservedId`] when `id` renders to the reserved
    /// sync-metadata key, or the store failure if the lookup fails.
    #[instrument(skip(self, id))]
    pub async fn get_by_id(&self, id: &T::Id, fetch_if_missing: bool) -> Result<Option<T>> {
        self.ensure_live().await?;

        let key = id.to_string();
        if key == self.config.sync_key {
            return Err(CacheError::ReservedId(key));
        }

        if let Some(item) = self.store.get_by_id(id).await? {
            return Ok(Some(item));
        }
        if !fetch_if_missing {
            return Ok(None);
        }

        debug!(key = %key, "Entity missing from store, fetching");
        if !self.run_fetch(FetchGate::IfIdle, true).await {
            return Ok(None);
        }

        self.ensure_live().await?;
        Ok(self.store.get_by_id(id).await?)
    }

    /// Tear the orchestrator down.
    ///
    /// Idempotent. Closes the state channel (subscribers keep the final
    /// snapshot), then closes the store. A fetch that is still in flight
    /// discards its result when it resolves; nothing is persisted or
    /// emitted after this returns.
    #[instrument(skip(self))]
    pub async fn dispose(&self) {
        {
            let mut inner = self.inner.lock().await;
            if inner.disposed {
                debug!("Already disposed");
                return;
            }
            inner.disposed = true;
            // Dropping the sender closes the channel; receivers keep the
            // final snapshot.
            inner.state_tx.take();
        }

        if let Err(e) = self.store.dispose().await {
            warn!(error = %e, "Store dispose failed");
        }

        info!("Cache orchestrator disposed");
    }

    // ========================================================================
    // Fetch Pipeline
    // ========================================================================

    /// Fail fast when the orchestrator is gone.
    async fn ensure_live(&self) -> Result<()> {
        if self.inner.lock().await.disposed {
            return Err(CacheError::Disposed);
        }
        Ok(())
    }

    /// Emit persisted data if the store holds any.
    ///
    /// Returns whether the store was non-empty. The emitted snapshot
    /// keeps `is_loading` set because the network leg is still ahead.
    async fn hydrate(&self) -> Result<bool> {
        let items = self.store.get_all().await?;
        if items.is_empty() {
            debug!("Store is empty, cold start");
            return Ok(false);
        }

        let sync_time = self.store.last_sync_time().await?;
        let display_items = self.source.transform_for_display(items);
        let count = display_items.len();

        let inner = self.inner.lock().await;
        if inner.disposed {
            debug!("Disposed during hydration, discarding");
            return Ok(true);
        }
        inner.emit(|state| state.with_cache_data(display_items, sync_time));
        info!(count, "Hydrated cache from store");
        Ok(true)
    }

    /// Shared fetch routine behind every refresh path.
    ///
    /// Returns whether a remote call was made. The gate decision, the
    /// attempt stamp and the optional loading emission share one
    /// critical section, so concurrent callers cannot slip past an
    /// `IfIdle` or `Throttled` gate together. The attempt is stamped
    /// before the remote call: the throttle spaces attempts, not
    /// completions.
    async fn run_fetch(&self, gate: FetchGate, silent: bool) -> bool {
        {
            let mut inner = self.inner.lock().await;
            if inner.disposed {
                return false;
            }

            let in_flight = self.state_rx.borrow().is_loading();
            match gate {
                FetchGate::Always => {}
                FetchGate::IfIdle => {
                    if in_flight {
                        debug!("Fetch already in flight, skipping");
                        return false;
                    }
                }
                FetchGate::Throttled => {
                    if in_flight {
                        debug!("Fetch already in flight, skipping");
                        return false;
                    }
                    if let Some(last) = inner.last_refresh_attempt {
                        let elapsed = self.clock.now() - last;
                        if elapsed < self.config.refresh_throttle {
                            debug!(
                                elapsed_ms = elapsed.num_milliseconds(),
                                "Refresh throttled"
                            );
                            return false;
                        }
                    }
                }
            }

            inner.last_refresh_attempt = Some(self.clock.now());

            if !silent {
                inner.emit(|state| state.refreshing());
            }
        }

        match self.source.fetch().await {
            Ok(items) => self.complete_fetch(items).await,
            Err(cause) => self.report_failure(CacheError::Fetch(cause)).await,
        }
        true
    }

    /// Persist a fetched collection and emit it.
    async fn complete_fetch(&self, items: Vec<T>) {
        if self.inner.lock().await.disposed {
            debug!("Disposed during fetch, discarding result");
            return;
        }

        let cache_items = self.source.transform_for_cache(items.clone());
        if let Err(e) = self.store.save_all(&cache_items).await {
            self.report_failure(CacheError::from(e)).await;
            return;
        }

        let display_items = self.source.transform_for_display(items);
        let count = display_items.len();

        let inner = self.inner.lock().await;
        if inner.disposed {
            debug!("Disposed during fetch, discarding result");
            return;
        }
        let now = self.clock.now();
        inner.emit(|state| state.with_network_data(display_items, now));
        info!(count, "Cache refreshed from remote");
    }

    /// Convert a refresh-cycle failure into an error emission plus a
    /// hook invocation, unless disposal happened first.
    async fn report_failure(&self, error: CacheError) {
        {
            let inner = self.inner.lock().await;
            if inner.disposed {
                debug!("Disposed during fetch, discarding failure");
                return;
            }
            warn!(error = %error, "Refresh cycle failed");
            let cause = error.clone();
            inner.emit(|state| state.with_error(cause, None));
        }

        // Outside the lock: implementations may do arbitrary work here.
        self.source.on_fetch_error(&error);
    }
}

// ============================================================================
// Tests
// ============================================================================
