//! Shared test helpers for integration tests

use quicksilver_jit::bytecode::{CodeBlock, JitType};
use quicksilver_jit::jit::{CompilationPath, CompileContext, PlanDriver};
use quicksilver_jit::runtime::Vm;
use quicksilver_jit::JitOptions;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A VM whose worklists run `threads` compiler threads
pub fn vm_with_threads(threads: usize) -> Vm {
    Vm::new(JitOptions {
        number_of_worklist_threads: threads,
        ..Default::default()
    })
}

/// A baseline code block and the code block an optimizing tier would
/// replace it with
#[allow(dead_code)]
pub fn baseline_and_replacement(vm: &Vm, name: &str, jit_type: JitType) -> (Arc<CodeBlock>, CodeBlock) {
    let baseline = Arc::new(CodeBlock::new(vm.heap(), name, "return a + b", JitType::Baseline));
    let replacement = CodeBlock::replacement(vm.heap(), Arc::clone(&baseline), jit_type);
    (baseline, replacement)
}

/// Finishes on a fixed path after one safepoint
pub struct Fixed(pub CompilationPath);

impl PlanDriver for Fixed {
    fn compile_in_thread_impl(&mut self, cx: &mut CompileContext<'_, '_>) -> CompilationPath {
        if cx.safepoint(false).did_get_cancelled() {
            return CompilationPath::Cancel;
        }
        if cx.mode().is_ftl() {
            cx.mark_ftl_backend_start();
        }
        self.0
    }

    fn code_size(&self) -> usize {
        256
    }
}

/// Parks at safepoints until released or cancelled
#[allow(dead_code)]
pub struct Parked {
    pub path: CompilationPath,
    pub keep_dependencies_live: bool,
    pub entered: Arc<AtomicBool>,
    pub release: Arc<AtomicBool>,
}

#[allow(dead_code)]
impl Parked {
    pub fn new(path: CompilationPath, keep_dependencies_live: bool) -> Self {
        Self {
            path,
            keep_dependencies_live,
            entered: Arc::new(AtomicBool::new(false)),
            release: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl PlanDriver for Parked {
    fn compile_in_thread_impl(&mut self, cx: &mut CompileContext<'_, '_>) -> CompilationPath {
        self.entered.store(true, Ordering::SeqCst);
        loop {
            if cx.safepoint(self.keep_dependencies_live).did_get_cancelled() {
                return CompilationPath::Cancel;
            }
            if self.release.load(Ordering::SeqCst) {
                return self.path;
            }
            std::thread::yield_now();
        }
    }

    fn code_size(&self) -> usize {
        0
    }
}

/// Spin until `flag` is set
#[allow(dead_code)]
pub fn wait_for(flag: &AtomicBool) {
    while !flag.load(Ordering::SeqCst) {
        std::thread::yield_now();
    }
}
