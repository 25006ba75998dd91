//! Execution context for JIT plans
//!
//! The VM owns the heap plans report liveness against, the options they
//! consult, and the counter of plans that are still active. Plans borrow the
//! VM and never own it.

use crate::gc::Heap;
use crate::jit::CompileTimeTotals;
use crate::options::JitOptions;
use crate::profiler::Database;
use std::sync::atomic::{AtomicIsize, Ordering};
use std::sync::Arc;

/// The owning execution context of a set of JIT plans
pub struct Vm {
    /// Cells and mark bits
    heap: Heap,
    /// Flags consulted by plans
    options: JitOptions,
    /// One unit per plan that has been created and neither cancelled nor dropped
    active_jit_plans: AtomicIsize,
    /// Process-wide compile time accumulator
    compile_time_totals: Arc<CompileTimeTotals>,
    /// Attached per-bytecode profiler, if any
    per_bytecode_profiler: Option<Arc<Database>>,
}

impl Vm {
    /// Create a VM with a private compile time accumulator
    pub fn new(options: JitOptions) -> Self {
        Self {
            heap: Heap::new(),
            options,
            active_jit_plans: AtomicIsize::new(0),
            compile_time_totals: Arc::new(CompileTimeTotals::new()),
            per_bytecode_profiler: None,
        }
    }

    /// Share a compile time accumulator with other VMs
    pub fn with_compile_time_totals(mut self, totals: Arc<CompileTimeTotals>) -> Self {
        self.compile_time_totals = totals;
        self
    }

    /// Attach a per-bytecode profiler
    pub fn with_profiler(mut self, database: Arc<Database>) -> Self {
        self.per_bytecode_profiler = Some(database);
        self
    }

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    pub fn options(&self) -> &JitOptions {
        &self.options
    }

    pub fn compile_time_totals(&self) -> &Arc<CompileTimeTotals> {
        &self.compile_time_totals
    }

    pub fn per_bytecode_profiler(&self) -> Option<&Database> {
        self.per_bytecode_profiler.as_deref()
    }

    /// Adjust the active plan count. Called by plans from any thread.
    pub fn change_number_of_active_jit_plans(&self, delta: isize) {
        self.active_jit_plans.fetch_add(delta, Ordering::AcqRel);
    }

    pub fn number_of_active_jit_plans(&self) -> isize {
        self.active_jit_plans.load(Ordering::Acquire)
    }
}

impl Default for Vm {
    fn default() -> Self {
        Self::new(JitOptions::default())
    }
}
