//! Logging setup for the command line tool

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Accepted `-V/--verbosity` values
pub const VERBOSITY_LEVELS: [&str; 5] = ["debug", "info", "warning", "error", "critical"];

#[derive(Debug, thiserror::Error)]
#[error("invalid verbosity level {0:?} (expected one of: {levels})", levels = VERBOSITY_LEVELS.join(", "))]
pub struct VerbosityError(String);

/// Log verbosity as named on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verbosity {
    Debug,
    #[default]
    Info,
    Warning,
    Error,
    Critical,
}

impl Verbosity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verbosity::Debug => "debug",
            Verbosity::Info => "info",
            Verbosity::Warning => "warning",
            Verbosity::Error => "error",
            Verbosity::Critical => "critical",
        }
    }

    /// Matching tracing level; `critical` has no own level and maps to ERROR
    pub fn level(&self) -> Level {
        match self {
            Verbosity::Debug => Level::DEBUG,
            Verbosity::Info => Level::INFO,
            Verbosity::Warning => Level::WARN,
            Verbosity::Error | Verbosity::Critical => Level::ERROR,
        }
    }
}

impl fmt::Display for Verbosity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Verbosity {
    type Err = VerbosityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "debug" => Ok(Verbosity::Debug),
            "info" => Ok(Verbosity::Info),
            "warning" => Ok(Verbosity::Warning),
            "error" => Ok(Verbosity::Error),
            "critical" => Ok(Verbosity::Critical),
            _ => Err(VerbosityError(s.to_string())),
        }
    }
}

/// Filter directive for a verbosity, unless `RUST_LOG` is set
pub fn filter_for(verbosity: Verbosity) -> EnvFilter {
    match std::env::var("RUST_LOG") {
        Ok(directives) if !directives.is_empty() => EnvFilter::new(directives),
        _ => EnvFilter::new(verbosity.level().as_str().to_ascii_lowercase()),
    }
}

/// Install the global subscriber; logs go to stderr so stdout stays VCF
pub fn init_logging(verbosity: Verbosity) {
    tracing_subscriber::registry()
        .with(filter_for(verbosity))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!("DEBUG".parse::<Verbosity>().unwrap(), Verbosity::Debug);
        assert_eq!("Warning".parse::<Verbosity>().unwrap(), Verbosity::Warning);
        assert_eq!("critical".parse::<Verbosity>().unwrap(), Verbosity::Critical);
    }

    #[test]
    fn test_unknown_level_lists_accepted_ones() {
        let err = "verbose".parse::<Verbosity>().unwrap_err().to_string();
        assert!(err.contains("verbose"));
        for level in VERBOSITY_LEVELS {
            assert!(err.contains(level));
        }
    }

    #[test]
    fn test_levels() {
        assert_eq!(Verbosity::default(), Verbosity::Info);
        assert_eq!(Verbosity::Warning.level(), Level::WARN);
        assert_eq!(Verbosity::Critical.level(), Level::ERROR);
        for name in VERBOSITY_LEVELS {
            assert_eq!(name.parse::<Verbosity>().unwrap().to_string(), name);
        }
    }
}
