//! # spliceai-cache
//!
//! Memoized SpliceAI annotation: re-annotating a variant that was already
//! scored under the same reference, gene annotation and parameters costs one
//! key-value store read instead of a model run.
//!
//! ## Pieces
//!
//! - [`cache::KeyDeriver`] turns a record plus its context into a cache key
//! - [`cache::MemoizedStore`] answers from the store or runs the computation
//! - [`cache::RedisStore`] / [`cache::MemoryStore`] hold the results
//! - [`pipeline::Annotator`] streams a VCF through all of the above
//!
//! ## Annotating a stream
//!
//! ```no_run
//! use spliceai_cache::cache::{
//!     AnnotationContext, CacheConfig, CachedResult, KeyDeriver, MemoizedStore, RedisConfig,
//!     RedisStore, ScoringParams,
//! };
//! use spliceai_cache::pipeline::Annotator;
//! use spliceai_cache::scorer::DeltaScorer;
//! use spliceai_cache::vcf::{open_input, open_output, VcfReader, VcfRecord, VcfWriter};
//!
//! struct NoScores;
//!
//! impl DeltaScorer for NoScores {
//!     async fn score(
//!         &self,
//!         _record: &VcfRecord,
//!         _context: &AnnotationContext,
//!         _params: &ScoringParams,
//!     ) -> anyhow::Result<CachedResult> {
//!         Ok(Vec::new())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = RedisStore::new(&RedisConfig::new("127.0.0.1", 6379))?;
//!     let memo = MemoizedStore::new(store, CacheConfig::default())?;
//!     let deriver = KeyDeriver::new(
//!         AnnotationContext::new("/data/hg38.fa", "grch38"),
//!         ScoringParams::new(50, 0),
//!     );
//!
//!     let reader = VcfReader::new(open_input(None)?)?;
//!     let mut writer = VcfWriter::new(open_output(None)?);
//!     let report = Annotator::new(deriver, &memo, NoScores)
//!         .run(reader, &mut writer)
//!         .await?;
//!     eprintln!("{}", report);
//!     Ok(())
//! }
//! ```

pub mod annotation;
pub mod cache;
pub mod error;
pub mod pipeline;
pub mod scorer;
pub mod vcf;

// Re-export main types for convenience
pub use annotation::{merge_scores, SpliceAiScore, SPLICEAI_HEADER_LINE, SPLICEAI_INFO_ID};
pub use cache::{
    AnnotationContext, CacheConfig, CacheKey, CacheStats, CachedResult, KeyDeriver, KeyEncoding,
    KeyValueStore, MemoizedStore, MemoryStore, ParamValue, RedisConfig, RedisStore,
    ScoringParams, StoreFailurePolicy,
};
pub use error::{CacheError, FieldError, Result};
pub use pipeline::{Annotator, PipelineReport};
pub use scorer::DeltaScorer;
pub use vcf::{InfoValue, VariantRecord, VcfHeader, VcfReader, VcfRecord, VcfWriter};
