//! Memoized lookup over a key-value store
//!
//! [`MemoizedStore::resolve`] answers from the store when it can and falls
//! back to the supplied computation otherwise. Store trouble never costs the
//! caller a result: with the default [`StoreFailurePolicy::Degrade`] an
//! unreadable store behaves like an empty one and a failed write is logged.

use crate::cache::backend::KeyValueStore;
use crate::cache::config::{CacheConfig, StoreFailurePolicy};
use crate::cache::types::{CacheStats, CachedResult, StatsCounters};
use crate::error::{CacheError, Result};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

type FillLocks = StdMutex<HashMap<String, Arc<Mutex<()>>>>;

/// Store key of `key` under an optional namespace
///
/// Namespaced keys start with `<namespace>:`. A variant key starts with a
/// chromosome name or the hashed-key prefix, neither of which can open with
/// `<`, so a namespace purge never reaches keys written without one.
pub fn namespaced_key(namespace: Option<&str>, key: &str) -> String {
    match namespace {
        Some(namespace) => format!("{}{}", namespace_prefix(namespace), key),
        None => key.to_string(),
    }
}

fn namespace_prefix(namespace: &str) -> String {
    format!("<{}>:", namespace)
}

/// Outcome of one store read
enum Lookup {
    Hit(CachedResult),
    Absent,
    /// Read failed or the entry did not decode; already counted and logged
    Unusable,
}

/// Cache in front of an expensive computation
pub struct MemoizedStore<S> {
    store: S,
    config: CacheConfig,
    stats: StatsCounters,
    fill_locks: FillLocks,
}

impl<S: KeyValueStore> MemoizedStore<S> {
    pub fn new(store: S, config: CacheConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            store,
            config,
            stats: StatsCounters::default(),
            fill_locks: StdMutex::new(HashMap::new()),
        })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.snapshot()
    }

    /// Key as written to the store, with the namespace prefix if any
    pub fn store_key(&self, key: &str) -> String {
        namespaced_key(self.config.namespace.as_deref(), key)
    }

    /// Return the cached result for `key`, computing and storing it on a miss
    ///
    /// A hit costs one store read and never runs `compute`. Compute errors
    /// are returned as [`CacheError::Compute`]; store errors only surface
    /// under [`StoreFailurePolicy::Strict`].
    pub async fn resolve<F, Fut>(&self, key: &str, compute: F) -> Result<CachedResult>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<CachedResult>>,
    {
        let store_key = self.store_key(key);

        let first = self.lookup(&store_key).await?;
        let _fill = match first {
            Lookup::Hit(value) => return Ok(value),
            Lookup::Absent if self.config.single_flight => {
                let guard = self.acquire_fill_lock(&store_key).await;
                // another caller may have filled the key while we waited
                if let Lookup::Hit(value) = self.lookup(&store_key).await? {
                    return Ok(value);
                }
                Some(guard)
            }
            // a store that just failed is not asked again
            Lookup::Absent | Lookup::Unusable => None,
        };

        StatsCounters::incr(&self.stats.misses);
        debug!("Cache miss: {}", store_key);

        StatsCounters::incr(&self.stats.computes);
        let value = compute().await.map_err(CacheError::compute)?;

        self.write(&store_key, &value).await?;
        Ok(value)
    }

    /// Delete the cached result of one key
    pub async fn invalidate(&self, key: &str) -> Result<bool> {
        let store_key = self.store_key(key);
        let removed = self.store.delete(&store_key).await?;
        if removed {
            StatsCounters::incr(&self.stats.invalidations);
            info!("Invalidated cache entry: {}", store_key);
        } else {
            debug!("No cache entry to invalidate: {}", store_key);
        }
        Ok(removed)
    }

    /// Delete every cached result under the configured namespace
    ///
    /// Without a namespace there is no way to tell this cache's keys from
    /// anything else in the database, so the call fails instead of flushing it.
    pub async fn invalidate_all(&self) -> Result<u64> {
        let namespace = self.config.namespace.as_deref().ok_or_else(|| {
            CacheError::Unsupported(
                "invalidate_all requires a key namespace; refusing to flush the whole database"
                    .to_string(),
            )
        })?;
        let removed = self
            .store
            .delete_prefix(&namespace_prefix(namespace))
            .await?;
        StatsCounters::add(&self.stats.invalidations, removed);
        info!("Invalidated {} cache entries in namespace {}", removed, namespace);
        Ok(removed)
    }

    /// Read and decode a stored value; errors only on a strict read failure
    async fn lookup(&self, store_key: &str) -> Result<Lookup> {
        match self.store.get(store_key).await {
            Ok(Some(raw)) => match serde_json::from_str::<CachedResult>(&raw) {
                Ok(value) => {
                    StatsCounters::incr(&self.stats.hits);
                    debug!("Cache hit: {}", store_key);
                    Ok(Lookup::Hit(value))
                }
                Err(e) => {
                    StatsCounters::incr(&self.stats.decode_failures);
                    warn!(
                        "Discarding undecodable cache entry {}: {}",
                        store_key, e
                    );
                    Ok(Lookup::Unusable)
                }
            },
            Ok(None) => Ok(Lookup::Absent),
            Err(e) => {
                StatsCounters::incr(&self.stats.read_fallbacks);
                match self.config.failure_policy {
                    StoreFailurePolicy::Strict => Err(e),
                    StoreFailurePolicy::Degrade => {
                        warn!("Cache read failed for {}, recomputing: {}", store_key, e);
                        Ok(Lookup::Unusable)
                    }
                }
            }
        }
    }

    async fn write(&self, store_key: &str, value: &CachedResult) -> Result<()> {
        let serialized = serde_json::to_string(value)?;
        if let Err(e) = self.store.set(store_key, &serialized).await {
            StatsCounters::incr(&self.stats.write_failures);
            match self.config.failure_policy {
                StoreFailurePolicy::Strict => return Err(e),
                StoreFailurePolicy::Degrade => {
                    warn!("Cache write failed for {}: {}", store_key, e);
                }
            }
        }
        Ok(())
    }

    async fn acquire_fill_lock(&self, store_key: &str) -> FillGuard<'_> {
        let lock = {
            let mut locks = self
                .fill_locks
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            Arc::clone(
                locks
                    .entry(store_key.to_string())
                    .or_insert_with(|| Arc::new(Mutex::new(()))),
            )
        };
        let guard = Arc::clone(&lock).lock_owned().await;
        FillGuard {
            locks: &self.fill_locks,
            key: store_key.to_string(),
            lock,
            guard: Some(guard),
        }
    }
}

/// Holds a per-key fill lock; the map entry is dropped with the last holder
struct FillGuard<'a> {
    locks: &'a FillLocks,
    key: String,
    lock: Arc<Mutex<()>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for FillGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // one reference in the map, one here: nobody else is waiting
        if Arc::strong_count(&self.lock) == 2 {
            locks.remove(&self.key);
        }
    }
}
