//! The JIT worklist
//!
//! Plans are queued on the main thread, compiled by a fixed set of compiler
//! threads, and handed back to the main thread once ready. The worklist
//! also implements the collector's side of the plan protocol: finding the
//! code blocks that in-flight plans keep alive and cancelling plans whose
//! code died.
//!
//! ## Locking
//!
//! The worklist lock is always taken before any thread's right-to-run.
//! Compiler threads never hold both: they take the worklist lock to pick up
//! and retire plans, and the right-to-run only while compiling. Every
//! cancellation happens with the worklist lock held and the plan's
//! compiler thread suspended.

use super::mode::{CompilationKey, CompilationPath, JitPlanStage};
use super::plan::JitPlan;
use super::safepoint::WorklistThread;
use crate::bytecode::CodeBlock;
use crate::error::{Error, Result};
use crate::gc::SlotVisitor;
use crate::runtime::Vm;
use parking_lot::{Condvar, Mutex, MutexGuard};
use rustc_hash::FxHashMap as HashMap;
use std::collections::VecDeque;
use std::sync::Arc;

/// A plan the main thread has taken back from the worklist
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletedPlan {
    pub key: CompilationKey,
    pub path: CompilationPath,
}

struct WorklistState<'a> {
    queue: VecDeque<Arc<JitPlan<'a>>>,
    plans: HashMap<CompilationKey, Arc<JitPlan<'a>>>,
    /// Keys of plans that reached Ready, in completion order
    ready: Vec<(CompilationKey, CompilationPath)>,
    running: usize,
    shutting_down: bool,
}

/// Compiler threads and the plans they work on
pub struct Worklist<'a> {
    vm: &'a Vm,
    threads: Vec<Arc<WorklistThread>>,
    state: Mutex<WorklistState<'a>>,
    planned: Condvar,
    idle: Condvar,
}

/// Keeps every compiler thread out of plan state until dropped
pub struct SuspendedThreads<'w> {
    _guards: Vec<MutexGuard<'w, ()>>,
}

impl<'a> Worklist<'a> {
    /// Create a worklist with `number_of_worklist_threads` threads from the
    /// VM's options
    pub fn new(vm: &'a Vm) -> Self {
        let count = vm.options().number_of_worklist_threads;
        Self {
            vm,
            threads: (0..count).map(|i| Arc::new(WorklistThread::new(i))).collect(),
            state: Mutex::new(WorklistState {
                queue: VecDeque::new(),
                plans: HashMap::default(),
                ready: Vec::new(),
                running: 0,
                shutting_down: false,
            }),
            planned: Condvar::new(),
            idle: Condvar::new(),
        }
    }

    pub fn vm(&self) -> &'a Vm {
        self.vm
    }

    pub fn threads(&self) -> &[Arc<WorklistThread>] {
        &self.threads
    }

    // ==================== Scheduling ====================

    /// Queue `plan` for compilation.
    ///
    /// Fails with [`Error::DuplicatePlan`] if a plan with the same key is
    /// still in the worklist; the rejected plan is dropped.
    pub fn enqueue(&self, plan: JitPlan<'a>) -> Result<Arc<JitPlan<'a>>> {
        let key = plan.key();
        let mut state = self.state.lock();
        if state.plans.contains_key(&key) {
            return Err(Error::DuplicatePlan { key });
        }
        let plan = Arc::new(plan);
        state.plans.insert(key, Arc::clone(&plan));
        state.queue.push_back(Arc::clone(&plan));
        tracing::debug!(target: "quicksilver_jit::worklist", %key, queued = state.queue.len(), "enqueued");
        self.planned.notify_one();
        Ok(plan)
    }

    /// Stage of the plan with `key`, if the worklist still holds it
    pub fn compilation_state(&self, key: &CompilationKey) -> Option<JitPlanStage> {
        self.state.lock().plans.get(key).map(|plan| plan.stage())
    }

    pub fn queue_length(&self) -> usize {
        self.state.lock().queue.len()
    }

    /// Number of plans held, in any stage
    pub fn len(&self) -> usize {
        self.state.lock().plans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run the compiler threads for the duration of `main`.
    ///
    /// Threads stop when `main` returns; plans still queued at that point
    /// stay queued for the next `run`.
    pub fn run<R>(&self, main: impl FnOnce(&Self) -> R) -> R {
        self.state.lock().shutting_down = false;
        std::thread::scope(|scope| {
            for thread in &self.threads {
                scope.spawn(move || self.work(thread));
            }
            let _shutdown = Shutdown(self);
            main(self)
        })
    }

    fn shut_down(&self) {
        self.state.lock().shutting_down = true;
        self.planned.notify_all();
    }

    fn work(&self, thread: &Arc<WorklistThread>) {
        tracing::debug!(target: "quicksilver_jit::worklist", thread = thread.index(), "started");
        while let Some(plan) = self.next_plan() {
            let path = plan.compile_in_thread(thread);

            let mut state = self.state.lock();
            state.running -= 1;
            if !plan.is_canceled() {
                plan.notify_ready();
                state.ready.push((plan.key(), path));
            }
            if state.running == 0 && state.queue.is_empty() {
                self.idle.notify_all();
            }
        }
        tracing::debug!(target: "quicksilver_jit::worklist", thread = thread.index(), "stopped");
    }

    fn next_plan(&self) -> Option<Arc<JitPlan<'a>>> {
        let mut state = self.state.lock();
        loop {
            if state.shutting_down {
                return None;
            }
            match state.queue.pop_front() {
                Some(plan) if plan.is_canceled() => continue,
                Some(plan) => {
                    plan.notify_compiling();
                    state.running += 1;
                    return Some(plan);
                }
                None => self.planned.wait(&mut state),
            }
        }
    }

    /// Block until nothing is queued or compiling
    pub fn wait_until_idle(&self) {
        let mut state = self.state.lock();
        while state.running > 0 || !state.queue.is_empty() {
            self.idle.wait(&mut state);
        }
    }

    /// Take every ready plan out of the worklist and run its main thread
    /// finalization tasks
    pub fn complete_ready_plans(&self) -> Vec<CompletedPlan> {
        let (ready, plans) = {
            let mut state = self.state.lock();
            let ready = std::mem::take(&mut state.ready);
            let plans: Vec<_> = ready
                .iter()
                .filter_map(|(key, _)| state.plans.remove(key))
                .collect();
            (ready, plans)
        };
        for plan in &plans {
            plan.run_main_thread_finalization_tasks();
        }
        ready
            .into_iter()
            .map(|(key, path)| CompletedPlan { key, path })
            .collect()
    }

    // ==================== Cancellation ====================

    /// Cancel the plan with `key`
    pub fn cancel_plan(&self, key: &CompilationKey) -> Result<()> {
        let mut state = self.state.lock();
        if !state.plans.contains_key(key) {
            return Err(Error::UnknownPlan { key: *key });
        }
        self.cancel_matching(&mut state, |plan_key, _| plan_key == key);
        Ok(())
    }

    /// Cancel every plan compiling `code_block`. Returns how many were cancelled.
    pub fn cancel_plans_for_code_block(&self, code_block: &CodeBlock) -> usize {
        let cell = code_block.cell();
        let mut state = self.state.lock();
        self.cancel_matching(&mut state, |_, plan| {
            plan.code_block().is_some_and(|block| block.cell() == cell)
        })
    }

    fn cancel_matching(
        &self,
        state: &mut WorklistState<'a>,
        matches: impl Fn(&CompilationKey, &JitPlan<'a>) -> bool,
    ) -> usize {
        let mut cancelled = 0;
        loop {
            let suspended = self.suspend_all_threads();
            let mut blocked = false;
            let keys: Vec<CompilationKey> = state
                .plans
                .iter()
                .filter_map(|(key, plan)| matches(key, plan).then_some(*key))
                .collect();
            for key in keys {
                let plan = &state.plans[&key];
                if plan.safepoint_keeps_dependencies_live() {
                    blocked = true;
                    continue;
                }
                self.remove_cancelled(state, key);
                cancelled += 1;
            }
            drop(suspended);
            if !blocked {
                return cancelled;
            }
            // Let the compiler thread leave its safepoint before retrying.
            std::thread::yield_now();
        }
    }

    fn remove_cancelled(&self, state: &mut WorklistState<'a>, key: CompilationKey) {
        if let Some(plan) = state.plans.remove(&key) {
            plan.cancel();
            state.queue.retain(|queued| !Arc::ptr_eq(queued, &plan));
            state.ready.retain(|(ready_key, _)| *ready_key != key);
            tracing::debug!(target: "quicksilver_jit::worklist", %key, "cancelled");
        }
        if state.running == 0 && state.queue.is_empty() {
            self.idle.notify_all();
        }
    }

    // ==================== GC ====================

    /// Wait for every compiler thread to be idle or parked at a safepoint
    pub fn suspend_all_threads(&self) -> SuspendedThreads<'_> {
        SuspendedThreads {
            _guards: self.threads.iter().map(|thread| thread.suspend()).collect(),
        }
    }

    /// Append the code blocks of live plans to `visitor` as roots. Returns
    /// how many plans were visited.
    pub fn visit_weak_references(&self, visitor: &mut dyn SlotVisitor) -> usize {
        let state = self.state.lock();
        let _suspended = self.suspend_all_threads();
        let mut visited = 0;
        for plan in state.plans.values() {
            let keep_live = plan.safepoint_keeps_dependencies_live();
            if plan.check_liveness_and_visit_children(visitor) {
                visited += 1;
            } else if keep_live {
                if let Some(code_block) = plan.code_block() {
                    visitor.append_unbarriered(code_block);
                    visited += 1;
                }
            }
        }
        visited
    }

    /// Call `visit` with the code block of every live plan
    pub fn iterate_code_blocks_for_gc(
        &self,
        visitor: &dyn SlotVisitor,
        mut visit: impl FnMut(&'a CodeBlock),
    ) {
        let state = self.state.lock();
        for plan in state.plans.values() {
            plan.iterate_code_blocks_for_gc(visitor, &mut visit);
        }
    }

    /// After a collection, cancel every plan whose code block died.
    ///
    /// Plans whose compiler thread is parked at a safepoint that keeps
    /// dependencies live are skipped. Returns the keys of cancelled plans.
    pub fn remove_dead_plans(&self) -> Vec<CompilationKey> {
        let mut state = self.state.lock();
        let suspended = self.suspend_all_threads();
        let dead: Vec<CompilationKey> = state
            .plans
            .iter()
            .filter(|(_, plan)| {
                !plan.is_known_to_be_live_after_gc() && !plan.safepoint_keeps_dependencies_live()
            })
            .map(|(key, _)| *key)
            .collect();
        for key in &dead {
            self.remove_cancelled(&mut state, *key);
        }
        drop(suspended);
        if !dead.is_empty() {
            tracing::debug!(target: "quicksilver_jit::gc", removed = dead.len(), "removed dead plans");
        }
        dead
    }
}

struct Shutdown<'w, 'a>(&'w Worklist<'a>);

impl Drop for Shutdown<'_, '_> {
    fn drop(&mut self) {
        self.0.shut_down();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::JitType;
    use crate::jit::{CompileContext, JitCompilationMode, PlanDriver};
    use crate::options::JitOptions;

    struct Immediate(CompilationPath);

    impl PlanDriver for Immediate {
        fn compile_in_thread_impl(&mut self, cx: &mut CompileContext<'_, '_>) -> CompilationPath {
            if cx.safepoint(false).did_get_cancelled() {
                return CompilationPath::Cancel;
            }
            self.0
        }

        fn code_size(&self) -> usize {
            32
        }
    }

    fn vm() -> Vm {
        Vm::new(JitOptions {
            number_of_worklist_threads: 2,
            ..Default::default()
        })
    }

    #[test]
    fn test_duplicate_keys_rejected() {
        let vm = vm();
        let block = CodeBlock::new(vm.heap(), "f", "1", JitType::Baseline);
        let worklist = Worklist::new(&vm);
        let first = JitPlan::new(&vm, JitCompilationMode::Baseline, &block, Box::new(Immediate(CompilationPath::Baseline)));
        let second = JitPlan::new(&vm, JitCompilationMode::Baseline, &block, Box::new(Immediate(CompilationPath::Baseline)));

        let key = worklist.enqueue(first).unwrap().key();
        assert!(matches!(worklist.enqueue(second), Err(Error::DuplicatePlan { .. })));
        assert_eq!(vm.number_of_active_jit_plans(), 1);
        assert_eq!(worklist.compilation_state(&key), Some(JitPlanStage::Preparing));
    }

    #[test]
    fn test_run_compiles_everything() {
        let vm = vm();
        let blocks: Vec<CodeBlock> = (0..6)
            .map(|i| CodeBlock::new(vm.heap(), format!("f{i}"), "x", JitType::Baseline))
            .collect();
        let worklist = Worklist::new(&vm);
        for block in &blocks {
            let plan = JitPlan::new(&vm, JitCompilationMode::Baseline, block, Box::new(Immediate(CompilationPath::Baseline)));
            worklist.enqueue(plan).unwrap();
        }

        let completed = worklist.run(|worklist| {
            worklist.wait_until_idle();
            worklist.complete_ready_plans()
        });
        assert_eq!(completed.len(), 6);
        assert!(completed.iter().all(|plan| plan.path == CompilationPath::Baseline));
        assert!(worklist.is_empty());
        assert_eq!(vm.number_of_active_jit_plans(), 0);
    }

    #[test]
    fn test_cancel_unknown_plan() {
        let vm = vm();
        let worklist = Worklist::new(&vm);
        let key = CompilationKey::new(vm.heap().allocate_cell(), JitCompilationMode::Dfg);
        assert!(matches!(worklist.cancel_plan(&key), Err(Error::UnknownPlan { .. })));
    }

    #[test]
    fn test_cancel_queued_plan() {
        let vm = vm();
        let block = CodeBlock::new(vm.heap(), "f", "1", JitType::Baseline);
        let worklist = Worklist::new(&vm);
        let plan = worklist
            .enqueue(JitPlan::new(&vm, JitCompilationMode::Baseline, &block, Box::new(Immediate(CompilationPath::Baseline))))
            .unwrap();

        assert_eq!(worklist.cancel_plans_for_code_block(&block), 1);
        assert!(plan.is_canceled());
        assert_eq!(worklist.queue_length(), 0);
        assert_eq!(vm.number_of_active_jit_plans(), 0);
    }

    #[test]
    fn test_remove_dead_plans_after_gc() {
        let vm = vm();
        let live = CodeBlock::new(vm.heap(), "live", "1", JitType::Baseline);
        let dead = CodeBlock::new(vm.heap(), "dead", "2", JitType::Baseline);
        let worklist = Worklist::new(&vm);
        for block in [&live, &dead] {
            worklist
                .enqueue(JitPlan::new(&vm, JitCompilationMode::Baseline, block, Box::new(Immediate(CompilationPath::Baseline))))
                .unwrap();
        }

        let mut visitor = vm.heap().begin_marking();
        visitor.mark(live.owner_executable());
        assert_eq!(worklist.visit_weak_references(&mut visitor), 1);
        vm.heap().finish_marking(visitor);

        let removed = worklist.remove_dead_plans();
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].code_block, dead.unlinked_code_block());
        assert_eq!(worklist.len(), 1);
        assert_eq!(vm.number_of_active_jit_plans(), 1);
    }
}
