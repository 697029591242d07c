//! Cache orchestrator configuration

use chrono::Duration;
use swr_store::DEFAULT_SYNC_KEY;

/// Policy knobs for one [`CacheOrchestrator`](crate::CacheOrchestrator).
///
/// # Examples
///
/// ```rust,ignore
/// use chrono::Duration;
/// use swr_core::CacheConfig;
///
/// let config = CacheConfig::new()
///     .ttl(Duration::minutes(15))
///     .refresh_throttle(Duration::seconds(60))
///     .auto_initialize(false);
/// ```
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Age past which cached data classifies as stale.
    pub ttl: Duration,
    /// Minimum spacing between background refresh attempts.
    pub refresh_throttle: Duration,
    /// Reserved identifier under which the store keeps sync metadata.
    /// Must match the key configured on the store itself.
    pub sync_key: String,
    /// Kick off initialization in the background at construction.
    pub auto_initialize: bool,
}

impl CacheConfig {
    /// Configuration with default policy: 5 minute TTL, 30 second
    /// throttle, background initialization enabled.
    pub fn new() -> Self {
        Self {
            ttl: Duration::minutes(5),
            refresh_throttle: Duration::seconds(30),
            sync_key: DEFAULT_SYNC_KEY.to_string(),
            auto_initialize: true,
        }
    }

    /// Set the staleness TTL.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Set the minimum spacing between background refresh attempts.
    pub fn refresh_throttle(mut self, throttle: Duration) -> Self {
        self.refresh_throttle = throttle;
        self
    }

    /// Override the reserved sync-metadata key.
    pub fn sync_key(mut self, key: impl Into<String>) -> Self {
        self.sync_key = key.into();
        self
    }

    /// Enable or disable background initialization at construction.
    pub fn auto_initialize(mut self, auto: bool) -> Self {
        self.auto_initialize = auto;
        self
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self::new()
    }
}
