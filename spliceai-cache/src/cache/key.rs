//! Cache key derivation
//!
//! A key is built from four components:
//!
//! 1. the variant identity, `chrom:pos:ref:alt1,alt2[:NAME=value...]`
//! 2. the annotation context identifier, `Annotator(<reference>, <annotation>)`
//! 3. the maximum distance parameter
//! 4. the mask parameter
//!
//! With [`KeyEncoding::Delimited`] they are joined with `|` after escaping
//! `\` and `|` inside each component, so a component can never forge a
//! delimiter. For ordinary inputs the escape is the identity and keys keep
//! the plain `identity|context|distance|mask` layout. [`KeyEncoding::Hashed`]
//! replaces the readable key by a SHA-256 digest of the length-prefixed
//! components.

use crate::cache::types::CacheKey;
use crate::error::{FieldError, Result};
use crate::vcf::{InfoValue, VariantRecord};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

/// INFO fields that identify structural variants (VCF 4.4, section 3),
/// in the order they are appended to the identity
pub const SV_DESCRIPTORS: [&str; 13] = [
    "IMPRECISE", "NOVEL", "END", "LEN", "SVLEN", "SVTYPE", "CIPOS", "CIEND", "HOMLEN", "HOMSEQ",
    "BKPTID", "MEINFO", "METRANS",
];

/// Separator between key components
pub const KEY_DELIMITER: &str = "|";

const DELIMITER_CHAR: char = '|';
const ESCAPE: char = '\\';
const HASHED_KEY_PREFIX: &str = "spliceai:v1:";

/// How the key components are combined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyEncoding {
    /// Escaped, `|`-joined readable key
    #[default]
    Delimited,

    /// `spliceai:v1:<sha256 hex>`
    Hashed,
}

impl fmt::Display for KeyEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyEncoding::Delimited => write!(f, "delimited"),
            KeyEncoding::Hashed => write!(f, "hashed"),
        }
    }
}

impl FromStr for KeyEncoding {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "delimited" => Ok(KeyEncoding::Delimited),
            "hashed" => Ok(KeyEncoding::Hashed),
            other => Err(format!(
                "unknown key encoding '{}', expected 'delimited' or 'hashed'",
                other
            )),
        }
    }
}

/// A scoring parameter, either global or one value per alternate allele
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Single(i64),
    PerAllele(Vec<i64>),
}

impl ParamValue {
    /// The value as a single integer, if it is one
    pub fn as_single(&self) -> Option<i64> {
        match self {
            ParamValue::Single(v) => Some(*v),
            ParamValue::PerAllele(_) => None,
        }
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        ParamValue::Single(v)
    }
}

impl From<Vec<i64>> for ParamValue {
    fn from(v: Vec<i64>) -> Self {
        ParamValue::PerAllele(v)
    }
}

// `50` or `[50, 100]`; keys written by earlier tools use the same rendering
impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Single(v) => write!(f, "{}", v),
            ParamValue::PerAllele(values) => {
                write!(f, "[")?;
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", v)?;
                }
                write!(f, "]")
            }
        }
    }
}

/// Scoring parameters that change the computed result
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScoringParams {
    /// Maximum distance between the variant and a gained/lost splice site
    pub max_distance: ParamValue,
    /// Mask scores of annotated gains and unannotated losses (0/1)
    pub mask: ParamValue,
}

impl ScoringParams {
    /// Single values for every allele
    pub fn new(max_distance: i64, mask: i64) -> Self {
        Self::from_values(ParamValue::Single(max_distance), ParamValue::Single(mask))
    }

    pub fn from_values(max_distance: ParamValue, mask: ParamValue) -> Self {
        Self { max_distance, mask }
    }
}

impl Default for ScoringParams {
    fn default() -> Self {
        Self::new(50, 0)
    }
}

/// Reference genome and gene annotation a prediction was computed against
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AnnotationContext {
    /// Path to the reference genome FASTA
    pub reference: String,
    /// `grch37`, `grch38` or a path to a custom annotation file
    pub annotation: String,
}

impl AnnotationContext {
    pub fn new(reference: impl Into<String>, annotation: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
            annotation: annotation.into(),
        }
    }

    /// Context component of the cache key
    pub fn id(&self) -> String {
        format!("Annotator({}, {})", self.reference, self.annotation)
    }
}

/// Identity string of a variant: `chrom:pos:ref:alts` plus present SV descriptors
pub fn variant_identity<R: VariantRecord + ?Sized>(record: &R) -> Result<String> {
    let mut parts = vec![
        record.chrom().to_string(),
        record.pos().to_string(),
        record.reference().to_string(),
        record.alts().join(","),
    ];

    for name in SV_DESCRIPTORS {
        match record.info(name) {
            Ok(InfoValue::Flag) => parts.push(format!("{}=true", name)),
            Ok(InfoValue::Value(value)) if !is_missing(value) => {
                parts.push(format!("{}={}", name, value))
            }
            Ok(InfoValue::Value(_)) | Err(FieldError::NotPresent(_)) => {}
            Err(e) => return Err(e.into()),
        }
    }

    Ok(parts.join(":"))
}

fn is_missing(value: &str) -> bool {
    value.is_empty() || value == "."
}

fn escape_component(component: &str) -> Cow<'_, str> {
    if !component.contains([DELIMITER_CHAR, ESCAPE]) {
        return Cow::Borrowed(component);
    }
    let mut escaped = String::with_capacity(component.len() + 4);
    for c in component.chars() {
        if c == DELIMITER_CHAR || c == ESCAPE {
            escaped.push(ESCAPE);
        }
        escaped.push(c);
    }
    Cow::Owned(escaped)
}

/// Combine the key components with the given encoding
pub fn derive_key(
    identity: &str,
    context_id: &str,
    max_distance: &ParamValue,
    mask: &ParamValue,
    encoding: KeyEncoding,
) -> CacheKey {
    let max_distance = max_distance.to_string();
    let mask = mask.to_string();
    let components = [identity, context_id, max_distance.as_str(), mask.as_str()];

    match encoding {
        KeyEncoding::Delimited => components
            .iter()
            .map(|c| escape_component(c))
            .collect::<Vec<_>>()
            .join(KEY_DELIMITER),
        KeyEncoding::Hashed => {
            let mut hasher = Sha256::new();
            for component in components {
                hasher.update(component.len().to_string().as_bytes());
                hasher.update(b":");
                hasher.update(component.as_bytes());
            }
            format!("{}{:x}", HASHED_KEY_PREFIX, hasher.finalize())
        }
    }
}

/// Derives cache keys for records under one context and parameter set
#[derive(Debug, Clone)]
pub struct KeyDeriver {
    context: AnnotationContext,
    context_id: String,
    params: ScoringParams,
    encoding: KeyEncoding,
}

impl KeyDeriver {
    pub fn new(context: AnnotationContext, params: ScoringParams) -> Self {
        let context_id = context.id();
        Self {
            context,
            context_id,
            params,
            encoding: KeyEncoding::default(),
        }
    }

    pub fn with_encoding(mut self, encoding: KeyEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn context(&self) -> &AnnotationContext {
        &self.context
    }

    pub fn params(&self) -> &ScoringParams {
        &self.params
    }

    pub fn encoding(&self) -> KeyEncoding {
        self.encoding
    }

    /// Cache key of a record
    pub fn key_for<R: VariantRecord + ?Sized>(&self, record: &R) -> Result<CacheKey> {
        let identity = variant_identity(record)?;
        Ok(derive_key(
            &identity,
            &self.context_id,
            &self.params.max_distance,
            &self.params.mask,
            self.encoding,
        ))
    }
}
