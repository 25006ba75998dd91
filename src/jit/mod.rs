//! JIT compilation plans
//!
//! Bookkeeping for tiered compilation: one [`JitPlan`] per in-flight
//! compile, the [`Worklist`] that runs plans on compiler threads, and the
//! safepoint protocol that lets the collector and cancellation cooperate
//! with those threads.
//!
//! The compilers themselves are outside this module. A plan delegates the
//! actual work to a [`PlanDriver`], which reports the [`CompilationPath`]
//! it took.
//!
//! # Example
//!
//! ```
//! use quicksilver_jit::bytecode::{CodeBlock, JitType};
//! use quicksilver_jit::jit::{CompilationPath, CompileContext, JitCompilationMode, JitPlan, PlanDriver, Worklist};
//! use quicksilver_jit::runtime::Vm;
//!
//! struct Nop;
//!
//! impl PlanDriver for Nop {
//!     fn compile_in_thread_impl(&mut self, _cx: &mut CompileContext<'_, '_>) -> CompilationPath {
//!         CompilationPath::Baseline
//!     }
//!
//!     fn code_size(&self) -> usize {
//!         0
//!     }
//! }
//!
//! let vm = Vm::default();
//! let block = CodeBlock::new(vm.heap(), "main", "1 + 1", JitType::Interpreter);
//! let worklist = Worklist::new(&vm);
//! worklist.enqueue(JitPlan::new(&vm, JitCompilationMode::Baseline, &block, Box::new(Nop))).unwrap();
//!
//! let completed = worklist.run(|worklist| {
//!     worklist.wait_until_idle();
//!     worklist.complete_ready_plans()
//! });
//! assert_eq!(completed[0].path, CompilationPath::Baseline);
//! ```

mod mode;
mod plan;
mod reg;
mod safepoint;
mod telemetry;
mod worklist;

pub use mode::{CompilationKey, CompilationPath, JitCompilationMode, JitPlanStage, Tier};
pub use plan::{CompileContext, JitPlan, PlanDriver};
pub use reg::{Fpr, Gpr, Reg, NUMBER_OF_FPRS, NUMBER_OF_GPRS};
pub use safepoint::{Safepoint, SafepointResult, WorklistThread};
pub use telemetry::{CompileTimeSnapshot, CompileTimeTotals};
pub use worklist::{CompletedPlan, SuspendedThreads, Worklist};
