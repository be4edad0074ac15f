//! # Memoization layer
//!
//! Turns a variant plus its annotation context into a canonical cache key,
//! and uses that key to gate the expensive SpliceAI computation behind a
//! key-value store lookup.
//!
//! ## Features
//!
//! - **Canonical keys**: deterministic `identity|context|distance|mask` keys,
//!   escaped against delimiter forgery, or SHA-256 hashed
//! - **Degrading store access**: an unreachable store means "recompute", never a crash
//! - **Single-flight**: concurrent misses on one key compute once
//! - **Invalidation**: exact-key delete and namespace-wide purge
//!
//! ## Example
//!
//! ```rust
//! use spliceai_cache::cache::{
//!     AnnotationContext, CacheConfig, KeyDeriver, MemoizedStore, MemoryStore, ScoringParams,
//! };
//! use spliceai_cache::vcf::VcfRecord;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let deriver = KeyDeriver::new(
//!     AnnotationContext::new("/data/hg38.fa", "grch38"),
//!     ScoringParams::new(50, 0),
//! );
//! let memo = MemoizedStore::new(MemoryStore::new(), CacheConfig::default())?;
//!
//! let record = VcfRecord::parse("1\t1000\t.\tA\tC\t.\t.\t.", 1)?;
//! let key = deriver.key_for(&record)?;
//! let scores = memo
//!     .resolve(&key, || async {
//!         Ok(vec!["C|GENE1|0.1|0.0|0.0|0.0|2|0|0|0".to_string()])
//!     })
//!     .await?;
//! assert_eq!(scores.len(), 1);
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod config;
pub mod key;
pub mod memo;
pub mod types;

pub use backend::{KeyValueStore, MemoryStore, RedisStore};
pub use config::{CacheConfig, CacheConfigBuilder, RedisConfig, StoreFailurePolicy};
pub use key::{
    derive_key, variant_identity, AnnotationContext, KeyDeriver, KeyEncoding, ParamValue,
    ScoringParams, KEY_DELIMITER, SV_DESCRIPTORS,
};
pub use memo::{namespaced_key, MemoizedStore};
pub use types::{CacheKey, CacheStats, CachedResult};
