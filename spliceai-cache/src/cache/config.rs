//! Configuration for the cache system

use crate::cache::key::KeyEncoding;
use crate::error::{CacheError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// What to do when the backing store fails a read or a write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreFailurePolicy {
    /// Treat read failures as misses and log write failures; always recompute
    #[default]
    Degrade,

    /// Propagate store failures to the caller
    Strict,
}

impl fmt::Display for StoreFailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreFailurePolicy::Degrade => write!(f, "degrade"),
            StoreFailurePolicy::Strict => write!(f, "strict"),
        }
    }
}

impl FromStr for StoreFailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "degrade" => Ok(StoreFailurePolicy::Degrade),
            "strict" => Ok(StoreFailurePolicy::Strict),
            other => Err(format!(
                "unknown store failure policy '{}', expected 'degrade' or 'strict'",
                other
            )),
        }
    }
}

/// Configuration for the memoized store and the annotation pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// How cache keys are rendered
    pub key_encoding: KeyEncoding,

    /// Tag for every key written to the store, as `<namespace>:`.
    /// Required for bulk invalidation.
    pub namespace: Option<String>,

    /// Behavior on store read/write failures
    pub failure_policy: StoreFailurePolicy,

    /// Serialize concurrent misses on the same key through an in-process lock
    pub single_flight: bool,

    /// Number of records resolved concurrently; 1 processes strictly one at a time
    pub concurrency: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            key_encoding: KeyEncoding::Delimited,
            namespace: None,
            failure_policy: StoreFailurePolicy::Degrade,
            single_flight: true,
            concurrency: 1,
        }
    }
}

impl CacheConfig {
    /// Create a new builder for cache configuration
    pub fn builder() -> CacheConfigBuilder {
        CacheConfigBuilder::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(CacheError::Config(
                "concurrency must be greater than 0".to_string(),
            ));
        }

        if let Some(namespace) = &self.namespace {
            if namespace.is_empty() {
                return Err(CacheError::Config("namespace must not be empty".to_string()));
            }
            // The namespace ends up in a SCAN MATCH pattern
            if namespace.contains(['*', '?', '[', ']', '\\']) {
                return Err(CacheError::Config(format!(
                    "namespace '{}' must not contain glob characters",
                    namespace
                )));
            }
            if namespace.contains([':', '<', '>']) {
                return Err(CacheError::Config(format!(
                    "namespace '{}' must not contain ':', '<' or '>'",
                    namespace
                )));
            }
        }

        Ok(())
    }
}

/// Builder for cache configuration
#[derive(Debug, Default)]
pub struct CacheConfigBuilder {
    key_encoding: Option<KeyEncoding>,
    namespace: Option<String>,
    failure_policy: Option<StoreFailurePolicy>,
    single_flight: Option<bool>,
    concurrency: Option<usize>,
}

impl CacheConfigBuilder {
    /// Set the key encoding
    pub fn key_encoding(mut self, encoding: KeyEncoding) -> Self {
        self.key_encoding = Some(encoding);
        self
    }

    /// Set the key namespace
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Set the store failure policy
    pub fn failure_policy(mut self, policy: StoreFailurePolicy) -> Self {
        self.failure_policy = Some(policy);
        self
    }

    /// Enable or disable per-key single-flight
    pub fn single_flight(mut self, enable: bool) -> Self {
        self.single_flight = Some(enable);
        self
    }

    /// Set how many records are resolved concurrently
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = Some(concurrency);
        self
    }

    /// Build the cache configuration
    pub fn build(self) -> CacheConfig {
        let defaults = CacheConfig::default();

        CacheConfig {
            key_encoding: self.key_encoding.unwrap_or(defaults.key_encoding),
            namespace: self.namespace.or(defaults.namespace),
            failure_policy: self.failure_policy.unwrap_or(defaults.failure_policy),
            single_flight: self.single_flight.unwrap_or(defaults.single_flight),
            concurrency: self.concurrency.unwrap_or(defaults.concurrency),
        }
    }
}

/// Connection settings for the Redis backend
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
    /// Logical database number
    pub db: i64,
    pub password: Option<String>,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 6379,
            db: 0,
            password: None,
        }
    }
}

// Keeps the password out of logs
impl fmt::Debug for RedisConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("db", &self.db)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

impl RedisConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    pub fn with_db(mut self, db: i64) -> Self {
        self.db = db;
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Read the password from the first line of a secret file
    pub fn with_password_file(self, path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let password = content.lines().next().unwrap_or_default().trim();
        if password.is_empty() {
            return Err(CacheError::Config(format!(
                "password file {} is empty",
                path.display()
            )));
        }
        Ok(self.with_password(password))
    }

    /// Connection info for the redis client
    pub fn connection_info(&self) -> redis::ConnectionInfo {
        redis::ConnectionInfo {
            addr: redis::ConnectionAddr::Tcp(self.host.clone(), self.port),
            redis: redis::RedisConnectionInfo {
                db: self.db,
                password: self.password.clone(),
                ..Default::default()
            },
        }
    }
}
