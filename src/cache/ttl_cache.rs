//! # TTL Cache with Single-Flight Refresh
//!
//! Keyed cache whose entries expire after a fixed time-to-live. Each key owns a refresh
//! lock so that at most one loader runs per key at a time; concurrent readers wait on
//! that lock for a bounded time and then fall back to the last known value.
//!
//! ## Read Path
//!
//! 1. Fresh entry present: return it without locking
//! 2. Otherwise wait (bounded) for the key's refresh lock
//! 3. Lock acquired: re-check freshness, else run the loader and store the result
//! 4. Lock not acquired in time: return the stale value, or [`CacheError::LockTimeout`]
//!    when the key has never been loaded
//!
//! Loader failures are returned to the caller and never stored.

use dashmap::DashMap;
use std::fmt::Display;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::BridgeError;

/// Errors returned by [`TtlCache::get_or_load`]
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CacheError<E> {
    /// The loader ran and failed
    #[error("cache loader failed: {0}")]
    Load(E),

    /// The refresh lock was busy past the bound and nothing was cached yet
    #[error("refresh lock for '{key}' not acquired within {waited:?} and no cached value")]
    LockTimeout { key: String, waited: Duration },
}

impl From<CacheError<BridgeError>> for BridgeError {
    fn from(error: CacheError<BridgeError>) -> Self {
        match error {
            CacheError::Load(inner) => inner,
            CacheError::LockTimeout { key, .. } => BridgeError::CacheLockTimeout { key },
        }
    }
}

/// A cached value with its expiry
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub value: V,
    pub expires_at: Instant,
}

impl<V> CacheEntry<V> {
    pub fn is_fresh(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

#[derive(Debug)]
struct CacheSlot<V> {
    entry: parking_lot::RwLock<Option<CacheEntry<V>>>,
    refresh: tokio::sync::Mutex<()>,
}

impl<V: Clone> CacheSlot<V> {
    fn new() -> Self {
        Self {
            entry: parking_lot::RwLock::new(None),
            refresh: tokio::sync::Mutex::new(()),
        }
    }

    fn fresh_value(&self) -> Option<V> {
        let now = Instant::now();
        self.entry
            .read()
            .as_ref()
            .filter(|entry| entry.is_fresh(now))
            .map(|entry| entry.value.clone())
    }

    fn last_known(&self) -> Option<V> {
        self.entry.read().as_ref().map(|entry| entry.value.clone())
    }
}

/// Keyed TTL cache with per-key single-flight refresh
#[derive(Debug)]
pub struct TtlCache<K, V>
where
    K: Eq + Hash,
{
    slots: DashMap<K, Arc<CacheSlot<V>>>,
    ttl: Duration,
    lock_timeout: Duration,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone + Display,
    V: Clone,
{
    #[must_use]
    pub fn new(ttl: Duration, lock_timeout: Duration) -> Self {
        Self {
            slots: DashMap::new(),
            ttl,
            lock_timeout,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Return the cached value for `key`, running `loader` when it is missing or expired
    pub async fn get_or_load<F, Fut, E>(&self, key: &K, loader: F) -> Result<V, CacheError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let slot = self.slot(key);

        if let Some(value) = slot.fresh_value() {
            return Ok(value);
        }

        let _guard = match tokio::time::timeout(self.lock_timeout, slot.refresh.lock()).await {
            Ok(guard) => guard,
            Err(_) => {
                return match slot.last_known() {
                    Some(stale) => {
                        warn!(key = %key, "Refresh lock busy, serving last known value");
                        Ok(stale)
                    }
                    None => Err(CacheError::LockTimeout {
                        key: key.to_string(),
                        waited: self.lock_timeout,
                    }),
                };
            }
        };

        // Another caller may have refreshed while we waited
        if let Some(value) = slot.fresh_value() {
            return Ok(value);
        }

        debug!(key = %key, "Cache entry missing or expired, loading");
        let value = loader().await.map_err(CacheError::Load)?;

        *slot.entry.write() = Some(CacheEntry {
            value: value.clone(),
            expires_at: Instant::now() + self.ttl,
        });

        Ok(value)
    }

    /// Unexpired value for `key`, without loading
    pub fn peek(&self, key: &K) -> Option<V> {
        self.slots.get(key).and_then(|slot| slot.fresh_value())
    }

    /// Last stored value for `key` even if expired
    pub fn last_known(&self, key: &K) -> Option<V> {
        self.slots.get(key).and_then(|slot| slot.last_known())
    }

    /// Drop the stored value for `key`; the next read reloads
    pub fn invalidate(&self, key: &K) {
        if let Some(slot) = self.slots.get(key) {
            *slot.entry.write() = None;
        }
    }

    /// Drop every stored value
    pub fn clear(&self) {
        for slot in self.slots.iter() {
            *slot.entry.write() = None;
        }
    }

    /// Number of keys holding a value, fresh or stale
    pub fn len(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| slot.entry.read().is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slot(&self, key: &K) -> Arc<CacheSlot<V>> {
        // Clone the Arc so no shard guard is held across an await
        self.slots
            .entry(key.clone())
            .or_insert_with(|| Arc::new(CacheSlot::new()))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn cache(ttl_ms: u64, lock_ms: u64) -> Arc<TtlCache<String, u32>> {
        Arc::new(TtlCache::new(
            Duration::from_millis(ttl_ms),
            Duration::from_millis(lock_ms),
        ))
    }

    #[tokio::test]
    async fn test_concurrent_reads_load_once() {
        let cache = cache(20_000, 5_000);
        let calls = Arc::new(AtomicUsize::new(0));
        let key = "pod".to_string();

        let load = |calls: Arc<AtomicUsize>| async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok::<u32, String>(7)
        };

        let (a, b) = tokio::join!(
            cache.get_or_load(&key, || load(calls.clone())),
            cache.get_or_load(&key, || load(calls.clone())),
        );

        assert_eq!(a.unwrap(), 7);
        assert_eq!(b.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entry_is_reloaded() {
        let cache = cache(1_000, 5_000);
        let key = "pod".to_string();

        let first = cache.get_or_load(&key, || async { Ok::<u32, String>(1) }).await;
        assert_eq!(first.unwrap(), 1);

        let cached = cache.get_or_load(&key, || async { Ok::<u32, String>(2) }).await;
        assert_eq!(cached.unwrap(), 1);

        tokio::time::advance(Duration::from_millis(1_001)).await;
        assert_eq!(cache.peek(&key), None);
        assert_eq!(cache.last_known(&key), Some(1));

        let reloaded = cache.get_or_load(&key, || async { Ok::<u32, String>(2) }).await;
        assert_eq!(reloaded.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_loader_errors_are_not_cached() {
        let cache = cache(20_000, 5_000);
        let key = "pod".to_string();

        let failed = cache
            .get_or_load(&key, || async { Err::<u32, String>("boom".to_string()) })
            .await;
        assert_eq!(failed, Err(CacheError::Load("boom".to_string())));
        assert!(cache.is_empty());

        let loaded = cache.get_or_load(&key, || async { Ok::<u32, String>(3) }).await;
        assert_eq!(loaded.unwrap(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_busy_lock_serves_stale_value() {
        let cache = cache(1_000, 100);
        let key = "pod".to_string();

        cache
            .get_or_load(&key, || async { Ok::<u32, String>(1) })
            .await
            .unwrap();
        tokio::time::advance(Duration::from_millis(1_500)).await;

        let slow = {
            let cache = cache.clone();
            let key = key.clone();
            tokio::spawn(async move {
                cache
                    .get_or_load(&key, || async {
                        tokio::time::sleep(Duration::from_secs(10)).await;
                        Ok::<u32, String>(2)
                    })
                    .await
            })
        };
        tokio::task::yield_now().await;

        let stale = cache.get_or_load(&key, || async { Ok::<u32, String>(99) }).await;
        assert_eq!(stale.unwrap(), 1);

        assert_eq!(slow.await.unwrap().unwrap(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_busy_lock_without_value_is_lock_timeout() {
        let cache = cache(1_000, 100);
        let key = "pod".to_string();

        let slow = {
            let cache = cache.clone();
            let key = key.clone();
            tokio::spawn(async move {
                cache
                    .get_or_load(&key, || async {
                        tokio::time::sleep(Duration::from_secs(10)).await;
                        Ok::<u32, String>(2)
                    })
                    .await
            })
        };
        tokio::task::yield_now().await;

        let result = cache.get_or_load(&key, || async { Ok::<u32, String>(99) }).await;
        assert!(matches!(result, Err(CacheError::LockTimeout { ref key, .. }) if key == "pod"));

        slow.abort();
    }

    #[tokio::test]
    async fn test_invalidate_and_clear() {
        let cache = cache(20_000, 5_000);
        for name in ["pod", "agent"] {
            cache
                .get_or_load(&name.to_string(), || async { Ok::<u32, String>(1) })
                .await
                .unwrap();
        }
        assert_eq!(cache.len(), 2);

        cache.invalidate(&"pod".to_string());
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.peek(&"pod".to_string()), None);

        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_lock_timeout_maps_to_bridge_error() {
        let error: BridgeError = CacheError::<BridgeError>::LockTimeout {
            key: "pod".to_string(),
            waited: Duration::from_secs(5),
        }
        .into();
        assert_eq!(
            error,
            BridgeError::CacheLockTimeout {
                key: "pod".to_string()
            }
        );
    }
}
