//! Compile time accounting and signposts
//!
//! Signposts are `tracing` events under the `quicksilver_jit::signpost`
//! target. Each plan stage is one interval, identified by the plan id with
//! the stage packed into the low four bits so that consecutive intervals of
//! the same plan never share an id.

use super::mode::JitPlanStage;
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// Running totals of compile time, shared by every VM that is handed the
/// same accumulator
#[derive(Debug, Default)]
pub struct CompileTimeTotals {
    totals: Mutex<CompileTimeSnapshot>,
}

/// A copy of the accumulated totals
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CompileTimeSnapshot {
    pub baseline: Duration,
    pub dfg: Duration,
    pub ftl: Duration,
    /// Time FTL plans spent in the DFG pipeline before the backend started
    pub ftl_dfg: Duration,
    /// Time FTL plans spent in the backend
    pub ftl_b3: Duration,
}

impl CompileTimeTotals {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_baseline(&self, elapsed: Duration) {
        self.totals.lock().baseline += elapsed;
    }

    pub fn add_dfg(&self, elapsed: Duration) {
        self.totals.lock().dfg += elapsed;
    }

    /// Account one FTL compile, split at the start of the backend
    pub fn add_ftl(&self, total: Duration, dfg_phase: Duration, b3_phase: Duration) {
        let mut totals = self.totals.lock();
        totals.ftl += total;
        totals.ftl_dfg += dfg_phase;
        totals.ftl_b3 += b3_phase;
    }

    pub fn snapshot(&self) -> CompileTimeSnapshot {
        *self.totals.lock()
    }

    /// Return the totals and start over from zero
    pub fn reset(&self) -> CompileTimeSnapshot {
        std::mem::take(&mut *self.totals.lock())
    }
}

impl fmt::Display for CompileTimeSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Total Baseline compile time: {:.3} ms", millis(self.baseline))?;
        writeln!(f, "Total DFG compile time: {:.3} ms", millis(self.dfg))?;
        writeln!(f, "Total FTL compile time: {:.3} ms", millis(self.ftl))?;
        writeln!(f, "Total FTL (DFG) compile time: {:.3} ms", millis(self.ftl_dfg))?;
        write!(f, "Total FTL (B3) compile time: {:.3} ms", millis(self.ftl_b3))
    }
}

pub(crate) fn millis(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}

/// Whether a signpost interval ended normally or by cancellation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SignpostDetail {
    None,
    Canceled,
}

impl SignpostDetail {
    fn as_str(self) -> &'static str {
        match self {
            SignpostDetail::None => "",
            SignpostDetail::Canceled => "Canceled",
        }
    }
}

/// Interval id for `plan_id` while in `stage`
pub(crate) fn signpost_id(plan_id: u64, stage: JitPlanStage) -> u64 {
    debug_assert!(plan_id & 0xf == 0);
    plan_id | stage as u64
}

fn interval_name(stage: JitPlanStage) -> &'static str {
    match stage {
        JitPlanStage::Preparing => "JITPlanQueued",
        JitPlanStage::Compiling => "JITCompiler",
        JitPlanStage::Ready => "JITPlanReady",
        JitPlanStage::Canceled => unreachable!("canceled plans have no open signpost"),
    }
}

pub(crate) fn begin_signpost(plan_id: u64, stage: JitPlanStage, message: &str) {
    tracing::info!(
        target: "quicksilver_jit::signpost",
        id = signpost_id(plan_id, stage),
        interval = interval_name(stage),
        phase = "begin",
        "{message}"
    );
}

pub(crate) fn end_signpost(plan_id: u64, stage: JitPlanStage, message: &str, detail: SignpostDetail) {
    tracing::info!(
        target: "quicksilver_jit::signpost",
        id = signpost_id(plan_id, stage),
        interval = interval_name(stage),
        phase = "end",
        detail = detail.as_str(),
        "{message}"
    );
}
