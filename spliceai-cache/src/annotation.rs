//! SpliceAI annotation strings and their placement on records
//!
//! Each alternate allele gets one string of ten `|`-separated fields:
//!
//! ```text
//! ALLELE|SYMBOL|DS_AG|DS_AL|DS_DG|DS_DL|DP_AG|DP_AL|DP_DG|DP_DL
//! ```
//!
//! delta scores (DS) and delta positions (DP) for acceptor gain/loss and
//! donor gain/loss. Downstream tools parse this layout, so strings are
//! carried byte-for-byte; [`SpliceAiScore`] keeps numeric fields as text.

use crate::cache::types::CachedResult;
use crate::error::{CacheError, Result};
use crate::vcf::{VcfHeader, VcfRecord};
use std::fmt;
use std::str::FromStr;

/// INFO field id of the annotation
pub const SPLICEAI_INFO_ID: &str = "SpliceAI";

/// Header declaration of the annotation INFO field
pub const SPLICEAI_HEADER_LINE: &str = "##INFO=<ID=SpliceAI,Number=.,Type=String,Description=\"SpliceAIv1.3.1 variant annotation. These include delta scores (DS) and delta positions (DP) for acceptor gain (AG), acceptor loss (AL), donor gain (DG), and donor loss (DL). Format: ALLELE|SYMBOL|DS_AG|DS_AL|DS_DG|DS_DL|DP_AG|DP_AL|DP_DG|DP_DL\">";

const FIELD_COUNT: usize = 10;

/// One allele's SpliceAI annotation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpliceAiScore {
    pub allele: String,
    pub symbol: String,
    /// AG, AL, DG, DL
    pub delta_scores: [String; 4],
    /// AG, AL, DG, DL
    pub delta_positions: [String; 4],
}

impl SpliceAiScore {
    /// Highest of the four delta scores
    pub fn max_delta_score(&self) -> Option<f64> {
        self.delta_scores
            .iter()
            .filter_map(|s| s.parse::<f64>().ok())
            .fold(None, |max, v| Some(max.map_or(v, |m: f64| m.max(v))))
    }
}

impl FromStr for SpliceAiScore {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self> {
        let fields: Vec<&str> = s.split('|').collect();
        if fields.len() != FIELD_COUNT {
            return Err(CacheError::Serialization(format!(
                "SpliceAI annotation '{}' has {} fields, expected {}",
                s,
                fields.len(),
                FIELD_COUNT
            )));
        }
        let owned = |range: std::ops::Range<usize>| -> [String; 4] {
            let v = &fields[range];
            [
                v[0].to_string(),
                v[1].to_string(),
                v[2].to_string(),
                v[3].to_string(),
            ]
        };
        Ok(Self {
            allele: fields[0].to_string(),
            symbol: fields[1].to_string(),
            delta_scores: owned(2..6),
            delta_positions: owned(6..10),
        })
    }
}

impl fmt::Display for SpliceAiScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}|{}|{}|{}",
            self.allele,
            self.symbol,
            self.delta_scores.join("|"),
            self.delta_positions.join("|")
        )
    }
}

/// Declare the annotation INFO field on a header
pub fn add_header_line(header: &mut VcfHeader) {
    header.add_info_line(SPLICEAI_INFO_ID, SPLICEAI_HEADER_LINE);
}

/// Attach annotations to a record; an empty result leaves the record
/// untouched. Returns whether the field was set.
pub fn merge_scores(record: &mut VcfRecord, scores: &CachedResult) -> bool {
    if scores.is_empty() {
        return false;
    }
    record.set_info(SPLICEAI_INFO_ID, scores.join(","));
    true
}
