//! Integration tests for memoized lookup
//!
//! These tests verify the cache-hit/miss control flow including:
//! - Miss-then-hit round trips
//! - Empty results
//! - Degraded and strict handling of store failures
//! - Single-flight under concurrent misses
//! - Invalidation

use spliceai_cache::cache::{
    CacheConfig, CachedResult, KeyValueStore, MemoizedStore, MemoryStore, StoreFailurePolicy,
};
use spliceai_cache::{CacheError, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const KEY: &str = "1:1000:A:C|ctx|50|0";
const SCORE: &str = "C|GENE1|0.1|0.0|0.0|0.0|2|0|0|0";

/// Compute callback that counts its invocations
#[derive(Clone, Default)]
struct Counter(Arc<AtomicUsize>);

impl Counter {
    fn calls(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    async fn compute(&self, value: CachedResult) -> anyhow::Result<CachedResult> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Ok(value)
    }
}

/// Store whose every operation fails; counts read attempts
#[derive(Default)]
struct UnreachableStore {
    gets: AtomicUsize,
}

impl UnreachableStore {
    fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }
}

impl KeyValueStore for UnreachableStore {
    async fn get(&self, _key: &str) -> Result<Option<String>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        Err(CacheError::Store("Connection refused (os error 111)".to_string()))
    }

    async fn set(&self, _key: &str, _value: &str) -> Result<()> {
        Err(CacheError::Store("Connection refused (os error 111)".to_string()))
    }
}

/// Store that reads fine but rejects writes
#[derive(Default)]
struct ReadOnlyStore {
    inner: MemoryStore,
}

impl KeyValueStore for ReadOnlyStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.inner.get(key).await
    }

    async fn set(&self, _key: &str, _value: &str) -> Result<()> {
        Err(CacheError::Store("READONLY You can't write against a read only replica.".to_string()))
    }
}

fn memory_memo() -> MemoizedStore<MemoryStore> {
    MemoizedStore::new(MemoryStore::new(), CacheConfig::default()).unwrap()
}

#[tokio::test]
async fn test_miss_then_hit() {
    let memo = memory_memo();
    let counter = Counter::default();

    let first = memo
        .resolve(KEY, || counter.compute(vec![SCORE.to_string()]))
        .await
        .unwrap();
    assert_eq!(first, vec![SCORE.to_string()]);
    assert_eq!(counter.calls(), 1);

    // the store holds the serialized list under the exact key
    let raw = memo.store().raw(KEY).await.unwrap();
    assert_eq!(serde_json::from_str::<Vec<String>>(&raw).unwrap(), first);

    let second = memo
        .resolve(KEY, || counter.compute(vec!["should not run".to_string()]))
        .await
        .unwrap();
    assert_eq!(second, first);
    assert_eq!(counter.calls(), 1);

    let stats = memo.stats();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.computes, 1);
}

#[tokio::test]
async fn test_empty_result_is_cached() {
    let memo = memory_memo();
    let counter = Counter::default();

    let first = memo.resolve(KEY, || counter.compute(Vec::new())).await.unwrap();
    let second = memo.resolve(KEY, || counter.compute(Vec::new())).await.unwrap();

    assert!(first.is_empty());
    assert!(second.is_empty());
    assert_eq!(counter.calls(), 1);
    assert_eq!(memo.store().raw(KEY).await.as_deref(), Some("[]"));
}

#[tokio::test]
async fn test_reads_existing_entries() {
    // entries written by another process in the same JSON layout
    let store = MemoryStore::new();
    store
        .set(KEY, &format!("[\"{}\"]", SCORE))
        .await
        .unwrap();
    let memo = MemoizedStore::new(store, CacheConfig::default()).unwrap();
    let counter = Counter::default();

    let value = memo.resolve(KEY, || counter.compute(Vec::new())).await.unwrap();
    assert_eq!(value, vec![SCORE.to_string()]);
    assert_eq!(counter.calls(), 0);
}

#[tokio::test]
async fn test_unreachable_store_degrades_to_compute() {
    let memo = MemoizedStore::new(UnreachableStore::default(), CacheConfig::default()).unwrap();
    let counter = Counter::default();

    for round in 1..=2 {
        let value = memo
            .resolve(KEY, || counter.compute(vec![SCORE.to_string()]))
            .await
            .unwrap();
        assert_eq!(value, vec![SCORE.to_string()]);
        // a failed read is not retried under the fill lock
        assert_eq!(memo.store().gets(), round);
    }
    assert_eq!(counter.calls(), 2);

    let stats = memo.stats();
    assert_eq!(stats.read_fallbacks, 2);
    assert_eq!(stats.write_failures, 2);
    assert_eq!(stats.hits, 0);
}

#[tokio::test]
async fn test_write_failure_still_returns_value() {
    let memo = MemoizedStore::new(ReadOnlyStore::default(), CacheConfig::default()).unwrap();
    let counter = Counter::default();

    let value = memo
        .resolve(KEY, || counter.compute(vec![SCORE.to_string()]))
        .await
        .unwrap();
    assert_eq!(value, vec![SCORE.to_string()]);
    assert_eq!(memo.stats().write_failures, 1);
}

#[tokio::test]
async fn test_strict_policy_surfaces_store_errors() {
    let config = CacheConfig::builder()
        .failure_policy(StoreFailurePolicy::Strict)
        .build();
    let memo = MemoizedStore::new(UnreachableStore::default(), config).unwrap();
    let counter = Counter::default();

    let result = memo
        .resolve(KEY, || counter.compute(vec![SCORE.to_string()]))
        .await;
    assert!(matches!(result, Err(CacheError::Store(_))));
    assert_eq!(counter.calls(), 0);

    let config = CacheConfig::builder()
        .failure_policy(StoreFailurePolicy::Strict)
        .build();
    let memo = MemoizedStore::new(ReadOnlyStore::default(), config).unwrap();
    let result = memo
        .resolve(KEY, || counter.compute(vec![SCORE.to_string()]))
        .await;
    assert!(matches!(result, Err(CacheError::Store(_))));
}

#[tokio::test]
async fn test_undecodable_entry_is_recomputed_and_overwritten() {
    let store = MemoryStore::new();
    store.set(KEY, "{not json").await.unwrap();
    let memo = MemoizedStore::new(store, CacheConfig::default()).unwrap();
    let counter = Counter::default();

    let value = memo
        .resolve(KEY, || counter.compute(vec![SCORE.to_string()]))
        .await
        .unwrap();
    assert_eq!(value, vec![SCORE.to_string()]);
    assert_eq!(counter.calls(), 1);
    assert_eq!(memo.stats().decode_failures, 1);

    let raw = memo.store().raw(KEY).await.unwrap();
    assert_eq!(serde_json::from_str::<Vec<String>>(&raw).unwrap(), value);
}

#[tokio::test]
async fn test_compute_error_propagates_and_nothing_is_stored() {
    let memo = memory_memo();

    let result = memo
        .resolve(KEY, || async { Err(anyhow::anyhow!("model crashed")) })
        .await;
    match result {
        Err(CacheError::Compute(message)) => assert!(message.contains("model crashed")),
        other => panic!("expected compute error, got {:?}", other),
    }
    assert!(memo.store().is_empty().await);
}

#[tokio::test]
async fn test_single_flight_computes_once() {
    let memo = memory_memo();
    let counter = Counter::default();

    let counter_ref = &counter;
    let slow = move || async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        counter_ref.compute(vec![SCORE.to_string()]).await
    };

    let (a, b, c) = tokio::join!(
        memo.resolve(KEY, slow),
        memo.resolve(KEY, slow),
        memo.resolve(KEY, slow)
    );
    assert_eq!(a.unwrap(), vec![SCORE.to_string()]);
    assert_eq!(b.unwrap(), vec![SCORE.to_string()]);
    assert_eq!(c.unwrap(), vec![SCORE.to_string()]);
    assert_eq!(counter.calls(), 1);
}

#[tokio::test]
async fn test_without_single_flight_concurrent_misses_all_compute() {
    let config = CacheConfig::builder().single_flight(false).build();
    let memo = MemoizedStore::new(MemoryStore::new(), config).unwrap();
    let counter = Counter::default();

    let counter_ref = &counter;
    let slow = move || async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        counter_ref.compute(vec![SCORE.to_string()]).await
    };

    let (a, b) = tokio::join!(memo.resolve(KEY, slow), memo.resolve(KEY, slow));
    assert_eq!(a.unwrap(), b.unwrap());
    assert_eq!(counter.calls(), 2);
    assert_eq!(memo.store().len().await, 1);
}

#[tokio::test]
async fn test_namespace_prefixes_store_keys() {
    let config = CacheConfig::builder().namespace("spliceai").build();
    let memo = MemoizedStore::new(MemoryStore::new(), config).unwrap();
    let counter = Counter::default();

    memo.resolve(KEY, || counter.compute(vec![SCORE.to_string()]))
        .await
        .unwrap();
    assert!(memo.store().raw(&format!("<spliceai>:{}", KEY)).await.is_some());
    assert!(memo.store().raw(KEY).await.is_none());
}

#[tokio::test]
async fn test_invalidate_forces_recompute() {
    let memo = memory_memo();
    let counter = Counter::default();

    memo.resolve(KEY, || counter.compute(vec![SCORE.to_string()]))
        .await
        .unwrap();
    assert!(memo.invalidate(KEY).await.unwrap());
    assert!(!memo.invalidate(KEY).await.unwrap());

    memo.resolve(KEY, || counter.compute(vec![SCORE.to_string()]))
        .await
        .unwrap();
    assert_eq!(counter.calls(), 2);
    assert_eq!(memo.stats().invalidations, 1);
}

#[tokio::test]
async fn test_invalidate_all_requires_namespace() {
    let memo = memory_memo();
    memo.resolve(KEY, || async { Ok(Vec::new()) }).await.unwrap();

    let result = memo.invalidate_all().await;
    assert!(matches!(result, Err(CacheError::Unsupported(_))));
    assert_eq!(memo.store().len().await, 1);
}

#[tokio::test]
async fn test_invalidate_all_clears_only_namespace() {
    let store = MemoryStore::new();
    store.set("unrelated", "keep").await.unwrap();
    let config = CacheConfig::builder().namespace("spliceai").build();
    let memo = MemoizedStore::new(store, config).unwrap();

    memo.resolve("k1", || async { Ok(Vec::new()) }).await.unwrap();
    memo.resolve("k2", || async { Ok(Vec::new()) }).await.unwrap();

    assert_eq!(memo.invalidate_all().await.unwrap(), 2);
    assert_eq!(memo.store().len().await, 1);
    assert_eq!(memo.store().raw("unrelated").await.as_deref(), Some("keep"));
}

#[tokio::test]
async fn test_invalidate_all_spares_keys_sharing_the_namespace_text() {
    // namespace "1" against a chr1 key and a key of an older "1:old" layout
    let chr1 = "1:1000:A:C|Annotator(/r, grch38)|50|0";
    let old = "1:old:2:5:G:T|ctx|50|0";
    let store = MemoryStore::new();
    store.set(chr1, "[]").await.unwrap();
    store.set(old, "[]").await.unwrap();

    let config = CacheConfig::builder().namespace("1").build();
    let memo = MemoizedStore::new(store, config).unwrap();
    memo.resolve(KEY, || async { Ok(Vec::new()) }).await.unwrap();

    assert_eq!(memo.invalidate_all().await.unwrap(), 1);
    assert_eq!(memo.store().len().await, 2);
    assert!(memo.store().raw(chr1).await.is_some());
    assert!(memo.store().raw(old).await.is_some());
}

#[tokio::test]
async fn test_invalidate_on_store_without_delete_fails_loudly() {
    let memo = MemoizedStore::new(UnreachableStore::default(), CacheConfig::default()).unwrap();
    assert!(matches!(
        memo.invalidate(KEY).await,
        Err(CacheError::Unsupported(_))
    ));
}
