//! JIT options
//!
//! Boolean and count flags consulted by plans while they compile. Options
//! load from a JSON document and can be overridden per process through
//! `QUICKSILVER_JIT_<NAME>` environment variables, e.g.
//! `QUICKSILVER_JIT_REPORT_DFG_COMPILE_TIMES=1`.

use crate::error::{Error, OptionSource, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Prefix for environment overrides
pub const ENV_PREFIX: &str = "QUICKSILVER_JIT_";

/// Runtime configuration for JIT plans and the worklist
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct JitOptions {
    /// Report compile times for every tier
    pub report_compile_times: bool,
    /// Report compile times for baseline plans
    pub report_baseline_compile_times: bool,
    /// Report compile times for DFG plans
    pub report_dfg_compile_times: bool,
    /// Report compile times for FTL plans
    pub report_ftl_compile_times: bool,
    /// Accumulate process-wide compile time totals
    pub report_total_compile_times: bool,
    /// Emit signpost intervals for each plan stage
    pub use_compiler_signpost: bool,
    /// Log when optimizing plans start compiling
    pub log_compilation_changes: bool,
    /// Log per-phase timing lines
    pub log_phase_times: bool,
    /// Number of compiler threads owned by a worklist
    pub number_of_worklist_threads: usize,
}

impl Default for JitOptions {
    fn default() -> Self {
        Self {
            report_compile_times: false,
            report_baseline_compile_times: false,
            report_dfg_compile_times: false,
            report_ftl_compile_times: false,
            report_total_compile_times: false,
            use_compiler_signpost: false,
            log_compilation_changes: false,
            log_phase_times: false,
            number_of_worklist_threads: 2,
        }
    }
}

impl JitOptions {
    /// Parse options from a JSON document. Missing fields keep their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let options: JitOptions = serde_json::from_str(json)?;
        options.validate(OptionSource::Json)?;
        Ok(options)
    }

    /// Read options from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Apply `QUICKSILVER_JIT_*` overrides from the process environment
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides(std::env::vars(), OptionSource::Environment)
    }

    /// Apply overrides from `(NAME, value)` pairs. Names use the
    /// environment spelling (`QUICKSILVER_JIT_LOG_PHASE_TIMES`); pairs
    /// without the prefix are ignored.
    pub fn with_overrides<I, K, V>(mut self, vars: I, source: OptionSource) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (key, value) in vars {
            let Some(name) = key.as_ref().strip_prefix(ENV_PREFIX) else {
                continue;
            };
            self.set(&name.to_ascii_lowercase(), value.as_ref(), source)?;
        }
        self.validate(source)?;
        Ok(self)
    }

    /// Set one option by its snake_case name
    pub fn set(&mut self, name: &str, value: &str, source: OptionSource) -> Result<()> {
        let flag = match name {
            "report_compile_times" => &mut self.report_compile_times,
            "report_baseline_compile_times" => &mut self.report_baseline_compile_times,
            "report_dfg_compile_times" => &mut self.report_dfg_compile_times,
            "report_ftl_compile_times" => &mut self.report_ftl_compile_times,
            "report_total_compile_times" => &mut self.report_total_compile_times,
            "use_compiler_signpost" => &mut self.use_compiler_signpost,
            "log_compilation_changes" => &mut self.log_compilation_changes,
            "log_phase_times" => &mut self.log_phase_times,
            "number_of_worklist_threads" => {
                self.number_of_worklist_threads = value.trim().parse().map_err(|_| {
                    Error::invalid_option(name, value, source, "expected a thread count")
                })?;
                return Ok(());
            }
            _ => return Err(Error::invalid_option(name, value, source, "unknown option")),
        };
        *flag = parse_bool(value)
            .ok_or_else(|| Error::invalid_option(name, value, source, "expected a boolean"))?;
        Ok(())
    }

    fn validate(&self, source: OptionSource) -> Result<()> {
        if self.number_of_worklist_threads == 0 {
            return Err(Error::invalid_option(
                "number_of_worklist_threads",
                "0",
                source,
                "a worklist needs at least one thread",
            ));
        }
        Ok(())
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let options = JitOptions::default();
        assert!(!options.report_compile_times);
        assert!(!options.use_compiler_signpost);
        assert_eq!(options.number_of_worklist_threads, 2);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let options = JitOptions::from_json_str(r#"{ "report_dfg_compile_times": true }"#).unwrap();
        assert!(options.report_dfg_compile_times);
        assert!(!options.report_ftl_compile_times);
        assert_eq!(options.number_of_worklist_threads, 2);
    }

    #[test]
    fn test_unknown_json_field_rejected() {
        let err = JitOptions::from_json_str(r#"{ "report_everything": true }"#).unwrap_err();
        assert!(matches!(err, Error::ConfigError { .. }));
    }

    #[test]
    fn test_zero_threads_rejected() {
        let err = JitOptions::from_json_str(r#"{ "number_of_worklist_threads": 0 }"#).unwrap_err();
        assert!(matches!(err, Error::InvalidOption { .. }));
    }

    #[test]
    fn test_overrides() {
        let options = JitOptions::default()
            .with_overrides(
                [
                    ("QUICKSILVER_JIT_REPORT_TOTAL_COMPILE_TIMES", "yes"),
                    ("QUICKSILVER_JIT_NUMBER_OF_WORKLIST_THREADS", "4"),
                    ("PATH", "/usr/bin"),
                ],
                OptionSource::Environment,
            )
            .unwrap();
        assert!(options.report_total_compile_times);
        assert_eq!(options.number_of_worklist_threads, 4);
    }

    #[test]
    fn test_override_bad_boolean() {
        let err = JitOptions::default()
            .with_overrides(
                [("QUICKSILVER_JIT_LOG_PHASE_TIMES", "sometimes")],
                OptionSource::Environment,
            )
            .unwrap_err();
        match err {
            Error::InvalidOption { name, source_kind, .. } => {
                assert_eq!(name, "log_phase_times");
                assert_eq!(source_kind, OptionSource::Environment);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_override_unknown_name() {
        let err = JitOptions::default()
            .with_overrides([("QUICKSILVER_JIT_TURBO", "1")], OptionSource::Environment)
            .unwrap_err();
        assert!(err.to_string().contains("unknown option"));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "use_compiler_signpost": true, "number_of_worklist_threads": 3 }}"#).unwrap();
        let options = JitOptions::from_file(file.path()).unwrap();
        assert!(options.use_compiler_signpost);
        assert_eq!(options.number_of_worklist_threads, 3);
    }

    #[test]
    fn test_from_missing_file() {
        let err = JitOptions::from_file("/nonexistent/quicksilver-jit.json").unwrap_err();
        assert!(matches!(err, Error::IoError { .. }));
    }
}
