//! Error types for the Quicksilver JIT bookkeeping layer
//!
//! Invariant violations inside plans and value recoveries are fatal
//! assertions. The errors here cover the boundaries: configuration,
//! scheduling requests and profiler output.

use crate::jit::CompilationKey;
use std::fmt;
use thiserror::Error;

/// Where an option value came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionSource {
    /// A JSON configuration document
    Json,
    /// A `QUICKSILVER_JIT_*` environment variable
    Environment,
    /// A command-line flag
    CommandLine,
}

impl fmt::Display for OptionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionSource::Json => write!(f, "json"),
            OptionSource::Environment => write!(f, "environment"),
            OptionSource::CommandLine => write!(f, "command line"),
        }
    }
}

/// Main error type for the JIT layer
#[derive(Error, Debug)]
pub enum Error {
    /// An option had a value that could not be parsed
    #[error("InvalidOption: {name}={value:?} ({source_kind}): {reason}")]
    InvalidOption {
        name: String,
        value: String,
        source_kind: OptionSource,
        reason: String,
    },

    /// Malformed JSON configuration
    #[error("ConfigError: {source}")]
    ConfigError {
        #[from]
        source: serde_json::Error,
    },

    /// IO error
    #[error("IOError: {source}")]
    IoError {
        #[from]
        source: std::io::Error,
    },

    /// A plan with the same key is already queued or compiling
    #[error("SchedulingError: a plan for {key} is already in the worklist")]
    DuplicatePlan { key: CompilationKey },

    /// No plan with this key is known to the worklist
    #[error("SchedulingError: no plan for {key}")]
    UnknownPlan { key: CompilationKey },
}

impl Error {
    /// Create an invalid option error
    pub fn invalid_option(
        name: impl Into<String>,
        value: impl Into<String>,
        source_kind: OptionSource,
        reason: impl Into<String>,
    ) -> Self {
        Error::InvalidOption {
            name: name.into(),
            value: value.into(),
            source_kind,
            reason: reason.into(),
        }
    }
}

/// Result type alias for the JIT layer
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_option_display() {
        let err = Error::invalid_option(
            "report_compile_times",
            "maybe",
            OptionSource::Environment,
            "expected a boolean",
        );
        assert_eq!(
            err.to_string(),
            "InvalidOption: report_compile_times=\"maybe\" (environment): expected a boolean"
        );
    }

    #[test]
    fn test_config_error_from_serde() {
        let parse: std::result::Result<serde_json::Value, _> = serde_json::from_str("{");
        let err: Error = parse.unwrap_err().into();
        assert!(err.to_string().starts_with("ConfigError:"));
    }
}
