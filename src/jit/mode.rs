use crate::gc::CellId;
use serde::Serialize;
use std::fmt;

/// Concrete kind of compilation a plan performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum JitCompilationMode {
    /// Sentinel for "no mode"; never valid for a live plan
    InvalidCompilation,
    Baseline,
    Dfg,
    /// DFG code that is linked lazily and shareable across code blocks
    UnlinkedDfg,
    Ftl,
    /// FTL code entered from a running loop
    FtlForOsrEntry,
}

impl JitCompilationMode {
    pub const fn is_dfg(self) -> bool {
        matches!(self, JitCompilationMode::Dfg | JitCompilationMode::UnlinkedDfg)
    }

    pub const fn is_ftl(self) -> bool {
        matches!(self, JitCompilationMode::Ftl | JitCompilationMode::FtlForOsrEntry)
    }

    /// Any mode that runs the optimizing pipeline
    pub const fn is_optimizing(self) -> bool {
        self.is_dfg() || self.is_ftl()
    }

    pub const fn name(self) -> &'static str {
        match self {
            JitCompilationMode::InvalidCompilation => "InvalidCompilationMode",
            JitCompilationMode::Baseline => "BaselineMode",
            JitCompilationMode::Dfg => "DFGMode",
            JitCompilationMode::UnlinkedDfg => "UnlinkedDFGMode",
            JitCompilationMode::Ftl => "FTLMode",
            JitCompilationMode::FtlForOsrEntry => "FTLForOSREntryMode",
        }
    }
}

impl fmt::Display for JitCompilationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Logical tier a mode belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Tier {
    Baseline,
    Dfg,
    Ftl,
}

impl Tier {
    /// Tier of `mode`.
    ///
    /// # Panics
    ///
    /// Panics on [`JitCompilationMode::InvalidCompilation`].
    pub fn of(mode: JitCompilationMode) -> Tier {
        match mode {
            JitCompilationMode::Baseline => Tier::Baseline,
            JitCompilationMode::Dfg | JitCompilationMode::UnlinkedDfg => Tier::Dfg,
            JitCompilationMode::Ftl | JitCompilationMode::FtlForOsrEntry => Tier::Ftl,
            JitCompilationMode::InvalidCompilation => {
                panic!("invalid compilation mode has no tier")
            }
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tier::Baseline => write!(f, "Baseline"),
            Tier::Dfg => write!(f, "DFG"),
            Tier::Ftl => write!(f, "FTL"),
        }
    }
}

/// Outcome of a plan's compile step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum CompilationPath {
    Fail,
    Baseline,
    Dfg,
    Ftl,
    Cancel,
}

impl CompilationPath {
    pub const fn name(self) -> &'static str {
        match self {
            CompilationPath::Fail => "N/A (fail)",
            CompilationPath::Baseline => "Baseline",
            CompilationPath::Dfg => "DFG",
            CompilationPath::Ftl => "FTL",
            CompilationPath::Cancel => "Canceled",
        }
    }
}

impl fmt::Display for CompilationPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Lifecycle stage of a plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum JitPlanStage {
    Preparing = 0,
    Compiling = 1,
    Ready = 2,
    Canceled = 3,
}

impl fmt::Display for JitPlanStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JitPlanStage::Preparing => write!(f, "Preparing"),
            JitPlanStage::Compiling => write!(f, "Compiling"),
            JitPlanStage::Ready => write!(f, "Ready"),
            JitPlanStage::Canceled => write!(f, "Canceled"),
        }
    }
}

/// Identifies compilations that would produce the same code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CompilationKey {
    /// The unlinked code for baseline plans, otherwise the baseline alternative
    pub code_block: CellId,
    pub mode: JitCompilationMode,
}

impl CompilationKey {
    pub fn new(code_block: CellId, mode: JitCompilationMode) -> Self {
        Self { code_block, mode }
    }
}

impl fmt::Display for CompilationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.code_block, self.mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_of_every_mode() {
        assert_eq!(Tier::of(JitCompilationMode::Baseline), Tier::Baseline);
        assert_eq!(Tier::of(JitCompilationMode::Dfg), Tier::Dfg);
        assert_eq!(Tier::of(JitCompilationMode::UnlinkedDfg), Tier::Dfg);
        assert_eq!(Tier::of(JitCompilationMode::Ftl), Tier::Ftl);
        assert_eq!(Tier::of(JitCompilationMode::FtlForOsrEntry), Tier::Ftl);
    }

    #[test]
    #[should_panic(expected = "has no tier")]
    fn test_invalid_mode_has_no_tier() {
        Tier::of(JitCompilationMode::InvalidCompilation);
    }

    #[test]
    fn test_mode_predicates() {
        assert!(JitCompilationMode::UnlinkedDfg.is_dfg());
        assert!(JitCompilationMode::FtlForOsrEntry.is_ftl());
        assert!(!JitCompilationMode::Baseline.is_optimizing());
        assert_eq!(JitCompilationMode::Dfg.to_string(), "DFGMode");
    }

    #[test]
    fn test_key_display() {
        let key = CompilationKey::new(CellId::from_raw(3), JitCompilationMode::Ftl);
        assert_eq!(key.to_string(), "(cell#3, FTLMode)");
        assert_eq!(CompilationPath::Fail.to_string(), "N/A (fail)");
    }
}
