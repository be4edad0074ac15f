//! Error types for cache operations
//!
//! This module defines the error types of the spliceai-cache library. Record
//! accessors report through [`FieldError`]; everything else surfaces as a
//! [`CacheError`].

use thiserror::Error;

/// Failure reading a named field from a variant record
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FieldError {
    /// The field is not declared or not set on this record
    #[error("Field not present: {0}")]
    NotPresent(String),

    /// The field is present but cannot be read unambiguously
    #[error("Invalid field {name}: {reason}")]
    Invalid { name: String, reason: String },
}

/// Main error type for cache operations
#[derive(Error, Debug)]
pub enum CacheError {
    /// Key-value store error - connection, authentication or command failure
    #[error("Store error: {0}")]
    Store(String),

    /// Serialization/Deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Operation the configured store or cache setup cannot perform
    #[error("Operation not supported: {0}")]
    Unsupported(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed VCF input
    #[error("VCF error at line {line}: {reason}")]
    Vcf { line: usize, reason: String },

    /// Record field error other than absence
    #[error(transparent)]
    Field(#[from] FieldError),

    /// The expensive computation behind a cache miss failed
    #[error("Compute error: {0}")]
    Compute(String),

    /// I/O error while reading or writing records
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for cache operations
pub type Result<T> = std::result::Result<T, CacheError>;

impl From<redis::RedisError> for CacheError {
    fn from(e: redis::RedisError) -> Self {
        CacheError::Store(e.to_string())
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(e: serde_json::Error) -> Self {
        CacheError::Serialization(e.to_string())
    }
}

impl CacheError {
    /// Wrap a compute failure, keeping the whole context chain in the message
    pub fn compute(e: anyhow::Error) -> Self {
        CacheError::Compute(format!("{:#}", e))
    }
}
