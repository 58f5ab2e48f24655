//! Single-flight TTL cache for resolved policies
//!
//! Each key maps to a slot that is either an in-flight build (a shared
//! future every concurrent caller awaits) or a completed entry with an
//! absolute expiry. The map is a `DashMap`, so locking is per shard and no
//! lock is ever held across an `.await`: callers for different keys never
//! wait on each other.
//!
//! Expiry is checked lazily on access. An expired entry is treated exactly
//! like a missing one and triggers a fresh single-flight build. Failed builds
//! are handed to every caller that shared them and then dropped, so the next
//! lookup starts over.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use crate::error::{AuthzError, Result};
use crate::policy::Policy;

/// Default lifetime of a cached policy (60 minutes)
pub const DEFAULT_CACHE_DURATION: Duration = Duration::from_secs(60 * 60);

/// Process-wide cache configuration, fixed at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheOptions {
    /// How long a built policy stays visible after insertion
    pub default_duration: Duration,
}

impl CacheOptions {
    pub fn new(default_duration: Duration) -> Self {
        Self { default_duration }
    }

    /// Reject settings that would make every entry expire immediately
    pub fn validate(&self) -> Result<()> {
        if self.default_duration.is_zero() {
            return Err(AuthzError::Config(
                "cache default duration must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            default_duration: DEFAULT_CACHE_DURATION,
        }
    }
}

type BuildResult = Result<Arc<Policy>>;
type SharedBuild = Shared<BoxFuture<'static, BuildResult>>;

/// Completed entry
struct CacheEntry {
    policy: Arc<Policy>,
    /// `None` when the duration overflows the clock, i.e. never expires
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn new(policy: Arc<Policy>, ttl: Duration) -> Self {
        Self {
            policy,
            expires_at: Instant::now().checked_add(ttl),
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        matches!(self.expires_at, Some(at) if now >= at)
    }
}

enum Slot {
    Building { id: u64, build: SharedBuild },
    Ready(CacheEntry),
}

impl Slot {
    fn is_build(&self, build_id: u64) -> bool {
        matches!(self, Slot::Building { id, .. } if *id == build_id)
    }
}

/// What a locked lookup found
enum Lookup {
    Hit(Arc<Policy>),
    Join(u64, SharedBuild),
    Expired,
}

/// Time-bounded, single-flight map from policy name to policy
pub struct PolicyCache {
    /// Key-striped slot map
    slots: DashMap<String, Slot>,

    /// Cache configuration
    options: CacheOptions,

    /// Identifies builds so a stale completion never overwrites a newer slot
    next_build_id: AtomicU64,

    /// Cache statistics
    stats: DashMap<String, usize>,
}

impl PolicyCache {
    /// Create a cache with the given options
    pub fn new(options: CacheOptions) -> Self {
        Self {
            slots: DashMap::new(),
            options,
            next_build_id: AtomicU64::new(1),
            stats: DashMap::new(),
        }
    }

    pub fn options(&self) -> &CacheOptions {
        &self.options
    }

    /// Return the live policy for `key`, building it with `factory` if absent
    /// or expired
    ///
    /// Concurrent callers for the same key share one invocation of `factory`
    /// and all receive the same `Arc<Policy>` (or the same error).
    pub async fn get_or_create<F, Fut>(&self, key: &str, factory: F) -> Result<Arc<Policy>>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<Policy>> + Send + 'static,
    {
        if let Some(policy) = self.get_live(key) {
            self.increment_stat("hits");
            return Ok(policy);
        }

        let (id, build) = match self.slots.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                let lookup = match occupied.get() {
                    Slot::Ready(entry) if !entry.is_expired(Instant::now()) => {
                        Lookup::Hit(Arc::clone(&entry.policy))
                    }
                    Slot::Ready(_) => Lookup::Expired,
                    Slot::Building { id, build } => Lookup::Join(*id, build.clone()),
                };

                match lookup {
                    Lookup::Hit(policy) => {
                        self.increment_stat("hits");
                        return Ok(policy);
                    }
                    Lookup::Join(id, build) => {
                        self.increment_stat("joins");
                        (id, build)
                    }
                    Lookup::Expired => {
                        self.increment_stat("expirations");
                        debug!(policy = %key, "Cached policy expired, rebuilding");
                        let (id, build) = self.start_build(factory);
                        occupied.insert(Slot::Building {
                            id,
                            build: build.clone(),
                        });
                        (id, build)
                    }
                }
            }
            Entry::Vacant(vacant) => {
                self.increment_stat("misses");
                let (id, build) = self.start_build(factory);
                vacant.insert(Slot::Building {
                    id,
                    build: build.clone(),
                });
                (id, build)
            }
        };

        let result = build.await;
        self.finish_build(key, id, &result);
        result
    }

    /// Live policy for `key` without building
    pub fn get(&self, key: &str) -> Option<Arc<Policy>> {
        self.get_live(key)
    }

    /// Whether `key` currently has a live entry
    pub fn contains(&self, key: &str) -> bool {
        self.get_live(key).is_some()
    }

    /// Drop every expired entry, returning how many were removed
    ///
    /// Lookups never depend on this; it only reclaims memory for names that
    /// stopped being used.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut removed = 0;

        self.slots.retain(|_, slot| match slot {
            Slot::Ready(entry) if entry.is_expired(now) => {
                removed += 1;
                false
            }
            _ => true,
        });

        if removed > 0 {
            debug!(removed, "Purged expired policies");
        }
        removed
    }

    /// Number of slots, including in-flight builds
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        let mut entries = 0;
        let mut in_flight = 0;
        for slot in self.slots.iter() {
            match slot.value() {
                Slot::Ready(_) => entries += 1,
                Slot::Building { .. } => in_flight += 1,
            }
        }

        CacheStats {
            hits: self.get_stat("hits"),
            misses: self.get_stat("misses"),
            expirations: self.get_stat("expirations"),
            joins: self.get_stat("joins"),
            builds: self.get_stat("builds"),
            failed_builds: self.get_stat("failed_builds"),
            entries,
            in_flight,
        }
    }

    fn get_live(&self, key: &str) -> Option<Arc<Policy>> {
        let slot = self.slots.get(key)?;
        match slot.value() {
            Slot::Ready(entry) if !entry.is_expired(Instant::now()) => {
                Some(Arc::clone(&entry.policy))
            }
            _ => None,
        }
    }

    /// Wrap `factory` in a shared future; nothing runs until first poll
    ///
    /// A panicking factory resolves to [`AuthzError::Internal`] so the slot
    /// goes through the normal failure path instead of wedging the key.
    fn start_build<F, Fut>(&self, factory: F) -> (u64, SharedBuild)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<Policy>> + Send + 'static,
    {
        let id = self.next_build_id.fetch_add(1, Ordering::Relaxed);
        let build = async move {
            match AssertUnwindSafe(async move { factory().await }).catch_unwind().await {
                Ok(result) => result.map(Arc::new),
                Err(payload) => Err(AuthzError::Internal(format!(
                    "policy factory panicked: {}",
                    panic_message(payload.as_ref())
                ))),
            }
        }
        .boxed()
        .shared();
        (id, build)
    }

    /// Promote or discard build `id`; the first caller to get here wins
    fn finish_build(&self, key: &str, id: u64, result: &BuildResult) {
        match result {
            Ok(policy) => {
                if let Some(mut slot) = self.slots.get_mut(key) {
                    if slot.is_build(id) {
                        *slot = Slot::Ready(CacheEntry::new(
                            Arc::clone(policy),
                            self.options.default_duration,
                        ));
                        self.increment_stat("builds");
                    }
                }
            }
            Err(e) => {
                if self.slots.remove_if(key, |_, slot| slot.is_build(id)).is_some() {
                    self.increment_stat("failed_builds");
                    debug!(policy = %key, error = %e, "Policy build failed, not cached");
                }
            }
        }
    }

    fn increment_stat(&self, key: &str) {
        self.stats
            .entry(key.to_string())
            .and_modify(|count| *count += 1)
            .or_insert(1);
    }

    fn get_stat(&self, key: &str) -> usize {
        self.stats.get(key).map(|v| *v).unwrap_or(0)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "unknown panic"
    }
}

impl Default for PolicyCache {
    fn default() -> Self {
        Self::new(CacheOptions::default())
    }
}

/// Cache statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
    pub expirations: usize,
    /// Callers that awaited a build started by someone else
    pub joins: usize,
    /// Successful builds
    pub builds: usize,
    pub failed_builds: usize,
    /// Live or expired-but-unpurged entries
    pub entries: usize,
    pub in_flight: usize,
}

impl CacheStats {
    /// Calculate cache hit rate
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses + self.expirations;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
