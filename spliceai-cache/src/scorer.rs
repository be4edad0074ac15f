//! The expensive computation behind a cache miss

use crate::cache::key::{AnnotationContext, ScoringParams};
use crate::cache::types::CachedResult;
use crate::vcf::VcfRecord;
use std::future::Future;

/// Computes SpliceAI delta scores for one record
///
/// Implementations must be a pure function of their inputs: a cached result
/// is reused for any later record with the same cache key.
pub trait DeltaScorer {
    /// One annotation string per scored allele; empty when nothing was scored
    fn score(
        &self,
        record: &VcfRecord,
        context: &AnnotationContext,
        params: &ScoringParams,
    ) -> impl Future<Output = anyhow::Result<CachedResult>>;
}
