//! JIT plans
//!
//! A [`JitPlan`] is one compilation of one code block at one tier. It moves
//! through `Preparing -> Compiling -> Ready` as the worklist drives it, and
//! may be cancelled from any stage before that. The plan borrows its VM and
//! code block; cancelling drops both borrows so a dead plan pins nothing.
//!
//! Every plan holds one unit of the VM's active plan count from creation
//! until it is either cancelled or dropped, whichever comes first.

use super::mode::{CompilationKey, CompilationPath, JitCompilationMode, JitPlanStage, Tier};
use super::safepoint::{Safepoint, SafepointResult, WorklistThread};
use super::telemetry::{begin_signpost, end_signpost, millis, SignpostDetail};
use crate::bytecode::CodeBlock;
use crate::gc::SlotVisitor;
use crate::profiler::CompilationRecord;
use crate::runtime::Vm;
use parking_lot::{Mutex, MutexGuard, RwLock};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

static NEXT_PLAN_ID: AtomicU64 = AtomicU64::new(1);

/// Low bits of a plan id left free for the stage in signpost ids
const PLAN_ID_SHIFT: u32 = 4;

type FinalizationTask<'a> = Box<dyn FnOnce() + Send + 'a>;

/// The tier-specific half of a plan: the compiler itself
pub trait PlanDriver: Send {
    /// Compile the plan's code block and report which path was taken.
    ///
    /// Must return [`CompilationPath::Cancel`] exactly when the plan was
    /// cancelled while compiling, which a driver observes through
    /// [`CompileContext::safepoint`].
    fn compile_in_thread_impl(&mut self, cx: &mut CompileContext<'_, '_>) -> CompilationPath;

    /// Bytes of machine code produced
    fn code_size(&self) -> usize;
}

struct PlanState<'a> {
    stage: JitPlanStage,
    vm: Option<&'a Vm>,
    code_block: Option<&'a CodeBlock>,
}

/// One in-flight compilation
pub struct JitPlan<'a> {
    id: u64,
    mode: JitCompilationMode,
    state: RwLock<PlanState<'a>>,
    /// Compiler thread running this plan, if any
    thread: Mutex<Option<Arc<WorklistThread>>>,
    signpost_message: Option<String>,
    driver: Mutex<Box<dyn PlanDriver + 'a>>,
    main_thread_finalization_tasks: Mutex<Vec<FinalizationTask<'a>>>,
    time_before_ftl: Mutex<Option<Instant>>,
}

impl<'a> JitPlan<'a> {
    pub fn new(
        vm: &'a Vm,
        mode: JitCompilationMode,
        code_block: &'a CodeBlock,
        driver: Box<dyn PlanDriver + 'a>,
    ) -> Self {
        let id = NEXT_PLAN_ID.fetch_add(1, Ordering::Relaxed) << PLAN_ID_SHIFT;
        let signpost_message = vm
            .options()
            .use_compiler_signpost
            .then(|| format!("{mode} {code_block}"));
        vm.change_number_of_active_jit_plans(1);

        let plan = Self {
            id,
            mode,
            state: RwLock::new(PlanState {
                stage: JitPlanStage::Preparing,
                vm: Some(vm),
                code_block: Some(code_block),
            }),
            thread: Mutex::new(None),
            signpost_message,
            driver: Mutex::new(driver),
            main_thread_finalization_tasks: Mutex::new(Vec::new()),
            time_before_ftl: Mutex::new(None),
        };
        plan.begin_signpost(JitPlanStage::Preparing);
        plan
    }

    // ==================== Identity ====================

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn mode(&self) -> JitCompilationMode {
        self.mode
    }

    pub fn stage(&self) -> JitPlanStage {
        self.state.read().stage
    }

    pub fn tier(&self) -> Tier {
        Tier::of(self.mode)
    }

    pub fn is_baseline(&self) -> bool {
        self.mode == JitCompilationMode::Baseline
    }

    pub fn is_dfg(&self) -> bool {
        self.mode.is_dfg()
    }

    pub fn is_ftl(&self) -> bool {
        self.mode.is_ftl()
    }

    /// The VM, until the plan is cancelled
    pub fn vm(&self) -> Option<&'a Vm> {
        self.state.read().vm
    }

    /// The code block being compiled, until the plan is cancelled
    pub fn code_block(&self) -> Option<&'a CodeBlock> {
        self.state.read().code_block
    }

    fn live_code_block(&self, operation: &str) -> &'a CodeBlock {
        match self.code_block() {
            Some(code_block) => code_block,
            None => panic!("{operation} on cancelled plan {self}"),
        }
    }

    /// Which compilations this one duplicates.
    ///
    /// Baseline plans are keyed by the unlinked code they compile, so every
    /// code block sharing bytecode shares the plan. Optimizing plans are
    /// keyed by the baseline code block they will replace.
    pub fn key(&self) -> CompilationKey {
        let code_block = self.live_code_block("key");
        let cell = if self.is_baseline() {
            code_block.unlinked_code_block()
        } else {
            code_block.baseline_alternative().cell()
        };
        CompilationKey::new(cell, self.mode)
    }

    // ==================== Lifecycle ====================

    pub fn notify_compiling(&self) {
        self.advance(JitPlanStage::Preparing, JitPlanStage::Compiling);
    }

    pub fn notify_ready(&self) {
        self.advance(JitPlanStage::Compiling, JitPlanStage::Ready);
    }

    fn advance(&self, from: JitPlanStage, to: JitPlanStage) {
        let mut state = self.state.write();
        assert!(
            state.stage == from,
            "plan {self} cannot become {to} from {}",
            state.stage
        );
        self.end_signpost(from, SignpostDetail::None);
        state.stage = to;
        self.begin_signpost(to);
    }

    /// Abandon the plan and release its VM and code block.
    ///
    /// # Panics
    ///
    /// Panics if the plan is already cancelled, or if its compiler thread is
    /// parked at a safepoint that keeps the plan's dependencies live.
    pub fn cancel(&self) {
        let mut state = self.state.write();
        assert!(
            state.stage != JitPlanStage::Canceled,
            "plan {self} is already canceled"
        );
        assert!(
            !self.safepoint_keeps_dependencies_live(),
            "cannot cancel plan {self} while its safepoint keeps dependencies live"
        );
        let Some(vm) = state.vm.take() else {
            unreachable!("live plan {self} has no vm");
        };

        self.end_signpost(state.stage, SignpostDetail::Canceled);
        vm.change_number_of_active_jit_plans(-1);
        state.stage = JitPlanStage::Canceled;
        state.code_block = None;
        tracing::debug!(target: "quicksilver_jit::codeblock", plan = self.id, mode = %self.mode, "plan cancelled");
    }

    pub fn is_canceled(&self) -> bool {
        self.stage() == JitPlanStage::Canceled
    }

    // ==================== GC ====================

    /// Whether the code block's executable survived the last collection
    pub fn is_known_to_be_live_after_gc(&self) -> bool {
        let state = self.state.read();
        match (state.stage, state.vm, state.code_block) {
            (JitPlanStage::Canceled, ..) => false,
            (_, Some(vm), Some(code_block)) => vm.heap().is_marked(code_block.owner_executable()),
            _ => false,
        }
    }

    /// Whether the code block's executable has been marked by a collection
    /// still in progress
    pub fn is_known_to_be_live_during_gc(&self, visitor: &dyn SlotVisitor) -> bool {
        let state = self.state.read();
        match (state.stage, state.code_block) {
            (JitPlanStage::Canceled, _) => false,
            (_, Some(code_block)) => visitor.is_marked(code_block.owner_executable()),
            _ => false,
        }
    }

    /// Hand the code block to `visit` if the plan is live.
    ///
    /// The compiler writes into the code block without barriers, so the
    /// collector has to rescan all of it rather than trust the barriers.
    pub fn iterate_code_blocks_for_gc(
        &self,
        visitor: &dyn SlotVisitor,
        visit: impl FnOnce(&'a CodeBlock),
    ) -> bool {
        if !self.is_known_to_be_live_during_gc(visitor) {
            return false;
        }
        match self.code_block() {
            Some(code_block) => {
                visit(code_block);
                true
            }
            None => false,
        }
    }

    /// Append the code block to `visitor` as a root if the plan is live
    pub fn check_liveness_and_visit_children(&self, visitor: &mut dyn SlotVisitor) -> bool {
        if !self.is_known_to_be_live_during_gc(visitor) {
            return false;
        }
        match self.code_block() {
            Some(code_block) => {
                visitor.append_unbarriered(code_block);
                true
            }
            None => false,
        }
    }

    pub fn is_in_safepoint(&self) -> bool {
        self.current_safepoint().is_some()
    }

    pub fn safepoint_keeps_dependencies_live(&self) -> bool {
        self.current_safepoint()
            .is_some_and(|safepoint| safepoint.keep_dependencies_live())
    }

    fn current_safepoint(&self) -> Option<Safepoint> {
        self.thread.lock().as_ref().and_then(|thread| thread.safepoint())
    }

    /// The compiler thread currently running the plan
    pub fn thread(&self) -> Option<Arc<WorklistThread>> {
        self.thread.lock().clone()
    }

    // ==================== Compilation ====================

    /// Whether this plan prints a compile time line when it finishes
    pub fn report_compile_times(&self) -> bool {
        let Some(vm) = self.vm() else {
            return false;
        };
        let options = vm.options();
        options.report_compile_times
            || (options.report_baseline_compile_times && self.is_baseline())
            || (options.report_dfg_compile_times && self.is_dfg())
            || (options.report_ftl_compile_times && self.is_ftl())
    }

    /// Whether this plan measures its compile time at all
    pub fn compute_compile_times(&self) -> bool {
        let Some(vm) = self.vm() else {
            return false;
        };
        self.report_compile_times()
            || vm.options().report_total_compile_times
            || vm.per_bytecode_profiler().is_some()
    }

    /// Run the compiler for this plan on `thread`.
    ///
    /// The plan records `thread` as its current thread for the duration of
    /// the call, and the thread's right-to-run is held except while the
    /// driver is parked at a safepoint.
    pub fn compile_in_thread(&self, thread: &Arc<WorklistThread>) -> CompilationPath {
        let _thread_scope = ThreadScope::enter(&self.thread, Arc::clone(thread));
        let right_to_run = thread.acquire_right_to_run();

        let (vm, code_block) = {
            let state = self.state.read();
            match (state.vm, state.code_block) {
                (Some(vm), Some(code_block)) => (vm, code_block),
                _ => {
                    tracing::debug!(target: "quicksilver_jit::codeblock", plan = self.id, "cancelled before compiling");
                    return CompilationPath::Cancel;
                }
            }
        };

        let compute_compile_times = self.compute_compile_times();
        let report_compile_times = compute_compile_times && self.report_compile_times();
        let before = compute_compile_times.then(Instant::now);
        let code_block_name = report_compile_times.then(|| code_block.to_string());

        let options = vm.options();
        if (self.mode.is_optimizing() && options.log_compilation_changes) || options.log_phase_times {
            tracing::debug!(
                target: "quicksilver_jit::codeblock",
                "compiling {code_block} with {}, instructions size = {}",
                self.mode,
                code_block.instructions_size()
            );
        }

        let (path, code_size, canceled) = {
            let mut driver = self.driver.lock();
            let mut cx = CompileContext {
                plan: self,
                thread,
                right_to_run,
            };
            let path = driver.compile_in_thread_impl(&mut cx);
            // Checked before giving up the right to run, after which the
            // plan may legitimately be cancelled.
            (path, driver.code_size(), self.is_canceled())
        };
        assert_eq!(
            path == CompilationPath::Cancel,
            canceled,
            "plan {self} finished on path {path} with canceled = {canceled}"
        );

        let Some(before) = before else {
            return path;
        };
        let after = Instant::now();
        let elapsed = after - before;
        let ftl_split = self.is_ftl().then(|| {
            let time_before_ftl = self.time_before_ftl.lock().unwrap_or(after);
            (
                time_before_ftl.saturating_duration_since(before),
                after.saturating_duration_since(time_before_ftl),
            )
        });

        if options.report_total_compile_times {
            let totals = vm.compile_time_totals();
            match ftl_split {
                Some((dfg_phase, b3_phase)) => totals.add_ftl(elapsed, dfg_phase, b3_phase),
                None if self.is_baseline() => totals.add_baseline(elapsed),
                None => totals.add_dfg(elapsed),
            }
        }

        if let Some(code_block) = self.code_block() {
            log_compile_event(code_block, path, elapsed, ftl_split);
        }

        if let Some(database) = vm.per_bytecode_profiler() {
            database.add_compilation(CompilationRecord {
                code_block: code_block.to_string(),
                mode: self.mode,
                path,
                elapsed_ms: millis(elapsed),
                code_size,
            });
        }

        if let Some(name) = code_block_name {
            let mut line = format!(
                "Optimized {name} using {} with {path} into {code_size} bytes in {:.6} ms",
                self.mode,
                millis(elapsed)
            );
            if let (CompilationPath::Ftl, Some((dfg_phase, b3_phase))) = (path, ftl_split) {
                line.push_str(&format!(
                    " (DFG: {:.6}, B3: {:.6})",
                    millis(dfg_phase),
                    millis(b3_phase)
                ));
            }
            eprintln!("{line}.");
        }
        path
    }

    // ==================== Finalization ====================

    /// Queue work that must run on the main thread once the plan is ready
    pub fn add_main_thread_finalization_task(&self, task: impl FnOnce() + Send + 'a) {
        self.main_thread_finalization_tasks.lock().push(Box::new(task));
    }

    /// Run and discard every queued finalization task
    pub fn run_main_thread_finalization_tasks(&self) {
        let tasks = std::mem::take(&mut *self.main_thread_finalization_tasks.lock());
        for task in tasks {
            task();
        }
    }

    // ==================== Signposts ====================

    fn begin_signpost(&self, stage: JitPlanStage) {
        if let Some(message) = &self.signpost_message {
            begin_signpost(self.id, stage, message);
        }
    }

    fn end_signpost(&self, stage: JitPlanStage, detail: SignpostDetail) {
        if let Some(message) = &self.signpost_message {
            end_signpost(self.id, stage, message, detail);
        }
    }
}

impl Drop for JitPlan<'_> {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        if let Some(vm) = state.vm {
            if let Some(message) = &self.signpost_message {
                end_signpost(self.id, state.stage, message, SignpostDetail::None);
            }
            vm.change_number_of_active_jit_plans(-1);
        }
    }
}

impl fmt::Display for JitPlan<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "plan#{} ({})", self.id >> PLAN_ID_SHIFT, self.mode)
    }
}

impl fmt::Debug for JitPlan<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JitPlan")
            .field("id", &(self.id >> PLAN_ID_SHIFT))
            .field("mode", &self.mode)
            .field("stage", &self.stage())
            .finish()
    }
}

fn log_compile_event(
    code_block: &CodeBlock,
    path: CompilationPath,
    elapsed: Duration,
    ftl_split: Option<(Duration, Duration)>,
) {
    let event = match path {
        CompilationPath::Ftl => "ftlCompile",
        CompilationPath::Dfg => "dfgCompile",
        CompilationPath::Baseline => "baselineCompile",
        CompilationPath::Fail => "failed compilation",
        CompilationPath::Cancel => "cancelled compilation",
    };
    match (path, ftl_split) {
        (CompilationPath::Ftl, Some((dfg_phase, b3_phase))) => tracing::info!(
            target: "quicksilver_jit::codeblock",
            code_block = %code_block,
            elapsed_ms = millis(elapsed),
            dfg_ms = millis(dfg_phase),
            b3_ms = millis(b3_phase),
            path = path.name(),
            "{event}"
        ),
        _ => tracing::info!(
            target: "quicksilver_jit::codeblock",
            code_block = %code_block,
            elapsed_ms = millis(elapsed),
            path = path.name(),
            "{event}"
        ),
    }
}

/// Restores the plan's previous thread when compilation returns or unwinds
struct ThreadScope<'p> {
    slot: &'p Mutex<Option<Arc<WorklistThread>>>,
    previous: Option<Arc<WorklistThread>>,
}

impl<'p> ThreadScope<'p> {
    fn enter(slot: &'p Mutex<Option<Arc<WorklistThread>>>, thread: Arc<WorklistThread>) -> Self {
        let previous = slot.lock().replace(thread);
        Self { slot, previous }
    }
}

impl Drop for ThreadScope<'_> {
    fn drop(&mut self) {
        *self.slot.lock() = self.previous.take();
    }
}

/// A driver's view of the plan and thread it compiles on
pub struct CompileContext<'p, 'a> {
    plan: &'p JitPlan<'a>,
    thread: &'p WorklistThread,
    right_to_run: MutexGuard<'p, ()>,
}

impl<'p, 'a> CompileContext<'p, 'a> {
    pub fn plan(&self) -> &'p JitPlan<'a> {
        self.plan
    }

    pub fn mode(&self) -> JitCompilationMode {
        self.plan.mode
    }

    /// The code block, or `None` once the plan is cancelled
    pub fn code_block(&self) -> Option<&'a CodeBlock> {
        self.plan.code_block()
    }

    pub fn thread(&self) -> &'p WorklistThread {
        self.thread
    }

    /// Park at a safepoint, letting the collector or a canceller run.
    ///
    /// With `keep_dependencies_live` the collector must treat the plan's
    /// code block as live and the plan cannot be cancelled meanwhile.
    pub fn safepoint(&mut self, keep_dependencies_live: bool) -> SafepointResult {
        self.thread
            .set_safepoint(Some(Safepoint::new(keep_dependencies_live)));
        MutexGuard::unlocked_fair(&mut self.right_to_run, || {});
        self.thread.set_safepoint(None);
        if self.plan.is_canceled() {
            SafepointResult::Cancelled
        } else {
            SafepointResult::Resumed
        }
    }

    /// Mark the end of the DFG pipeline of an FTL compile
    pub fn mark_ftl_backend_start(&mut self) {
        *self.plan.time_before_ftl.lock() = Some(Instant::now());
    }
}
