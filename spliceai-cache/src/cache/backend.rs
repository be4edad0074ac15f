//! Key-value store backends
//!
//! The memoization layer only needs string `get`/`set`. Deletion is optional:
//! a backend that cannot delete keeps the default methods, which fail with
//! [`CacheError::Unsupported`] rather than pretending to succeed.

use crate::cache::config::RedisConfig;
use crate::error::{CacheError, Result};
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{OnceCell, RwLock};
use tracing::{debug, info};

const SCAN_BATCH: usize = 500;

/// String key-value store
pub trait KeyValueStore {
    /// Fetch a value, `None` when the key is absent
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<String>>> + Send;

    /// Store a value without expiry, replacing any previous one
    fn set(&self, key: &str, value: &str) -> impl Future<Output = Result<()>> + Send;

    /// Delete one key; returns whether it existed
    fn delete(&self, _key: &str) -> impl Future<Output = Result<bool>> + Send {
        async { Err(CacheError::Unsupported("delete on this store".to_string())) }
    }

    /// Delete every key starting with `prefix`; returns the number removed
    fn delete_prefix(&self, _prefix: &str) -> impl Future<Output = Result<u64>> + Send {
        async { Err(CacheError::Unsupported("prefix delete on this store".to_string())) }
    }

    /// Check that the store answers
    fn ping(&self) -> impl Future<Output = Result<()>> + Send {
        async { Ok(()) }
    }
}

/// In-process store for tests and runs without a cache server
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<RwLock<HashMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Raw stored value, bypassing deserialization
    pub async fn raw(&self, key: &str) -> Option<String> {
        self.entries.read().await.get(key).cloned()
    }
}

impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.entries.write().await.remove(key).is_some())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<u64> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|key, _| !key.starts_with(prefix));
        Ok((before - entries.len()) as u64)
    }
}

/// Redis backend
///
/// The connection is opened lazily on first use and shared afterwards;
/// a multiplexed connection is cheap to clone and safe to use concurrently.
#[derive(Clone)]
pub struct RedisStore {
    client: redis::Client,
    connection: Arc<OnceCell<MultiplexedConnection>>,
}

impl RedisStore {
    /// Create a store from connection settings; no network I/O happens here
    pub fn new(config: &RedisConfig) -> Result<Self> {
        info!(
            "Using redis cache at {}:{} (db {})",
            config.host, config.port, config.db
        );
        let client = redis::Client::open(config.connection_info())?;
        Ok(Self::from_client(client))
    }

    /// Create a store from a `redis://` URL
    pub fn open(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)?;
        Ok(Self::from_client(client))
    }

    fn from_client(client: redis::Client) -> Self {
        Self {
            client,
            connection: Arc::new(OnceCell::new()),
        }
    }

    async fn connection(&self) -> Result<MultiplexedConnection> {
        let conn = self
            .connection
            .get_or_try_init(|| async {
                debug!("Opening redis connection");
                self.client.get_multiplexed_async_connection().await
            })
            .await?;
        Ok(conn.clone())
    }
}

impl KeyValueStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.connection().await?;
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut conn = self.connection().await?;
        let _: () = conn.set(key, value).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let mut conn = self.connection().await?;
        let removed: u64 = conn.del(key).await?;
        Ok(removed > 0)
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<u64> {
        let mut conn = self.connection().await?;
        let pattern = format!("{}*", prefix);
        let mut cursor: u64 = 0;
        let mut removed = 0;

        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await?;

            if !keys.is_empty() {
                let n: u64 = conn.del(&keys).await?;
                removed += n;
            }

            if next == 0 {
                break;
            }
            cursor = next;
        }

        debug!("Deleted {} keys matching {}", removed, pattern);
        Ok(removed)
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.connection().await?;
        let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        if pong != "PONG" {
            return Err(CacheError::Store(format!("unexpected PING reply: {}", pong)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_get_set() {
        let store = MemoryStore::new();
        assert_eq!(store.get("k").await.unwrap(), None);

        store.set("k", "[\"v\"]").await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("[\"v\"]"));

        store.set("k", "[]").await.unwrap();
        assert_eq!(store.raw("k").await.as_deref(), Some("[]"));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_memory_store_delete() {
        let store = MemoryStore::new();
        store.set("ns:a", "1").await.unwrap();
        store.set("ns:b", "2").await.unwrap();
        store.set("other:c", "3").await.unwrap();

        assert!(store.delete("ns:a").await.unwrap());
        assert!(!store.delete("ns:a").await.unwrap());

        assert_eq!(store.delete_prefix("ns:").await.unwrap(), 1);
        assert_eq!(store.len().await, 1);
        assert!(store.get("other:c").await.unwrap().is_some());
    }

    struct ReadOnly;

    impl KeyValueStore for ReadOnly {
        async fn get(&self, _key: &str) -> Result<Option<String>> {
            Ok(None)
        }

        async fn set(&self, _key: &str, _value: &str) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_default_deletes_are_unsupported() {
        let store = ReadOnly;
        assert!(matches!(
            store.delete("k").await,
            Err(CacheError::Unsupported(_))
        ));
        assert!(matches!(
            store.delete_prefix("ns:").await,
            Err(CacheError::Unsupported(_))
        ));
        assert!(store.ping().await.is_ok());
    }

    #[test]
    fn test_redis_store_is_lazy() {
        // no server needed until the first command
        let store = RedisStore::new(&RedisConfig::new("127.0.0.1", 1));
        assert!(store.is_ok());

        assert!(RedisStore::open("not a url").is_err());
    }
}
