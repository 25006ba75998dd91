//! Quicksilver JIT CLI
//!
//! Drives the plan worklist with simulated compilers and prints value
//! recoveries, for inspecting the bookkeeping without a full engine.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use quicksilver_jit::bytecode::{
    CodeBlock, DataFormat, DumpContext, JitType, MinifiedId, ValueRecovery, VirtualRegister,
};
use quicksilver_jit::jit::{
    CompilationPath, CompileContext, Fpr, Gpr, JitCompilationMode, JitPlan, PlanDriver, Worklist,
};
use quicksilver_jit::profiler::Database;
use quicksilver_jit::runtime::{CallFrame, JsValue, Register, Vm};
use quicksilver_jit::{JitOptions, OptionSource, VERSION};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rustc_hash::FxHashMap as HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "quicksilver-jit")]
#[command(author, version, about = "Quicksilver JIT plan and value recovery tools", long_about = None)]
struct Cli {
    /// JSON options file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override one option, e.g. `-o log_phase_times=true`
    #[arg(short = 'o', long = "option", global = true, value_name = "NAME=VALUE")]
    overrides: Vec<String>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a batch of simulated code blocks on the worklist
    Simulate {
        /// Number of code blocks to compile
        #[arg(short, long, default_value_t = 32)]
        plans: usize,

        /// Compiler threads (overrides the options file)
        #[arg(short, long)]
        threads: Option<usize>,

        /// Seed for the simulated workloads
        #[arg(long, default_value_t = 0x5EED)]
        seed: u64,

        /// Share of code blocks that die before the mid-run collection
        #[arg(long, default_value_t = 0.25)]
        kill_ratio: f64,

        /// Share of plans whose compiler gives up
        #[arg(long, default_value_t = 0.1)]
        fail_ratio: f64,

        /// Print a compile time line for every plan
        #[arg(long)]
        report_times: bool,

        /// Write per-compilation records as JSON
        #[arg(long)]
        profile: Option<PathBuf>,
    },

    /// Show how sample values are recovered at an OSR exit
    Recoveries {
        /// Shift displaced stack slots by this many locals
        #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
        locals_offset: i32,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let options = load_options(cli.config.as_ref(), &cli.overrides)?;
    match cli.command {
        Commands::Simulate {
            plans,
            threads,
            seed,
            kill_ratio,
            fail_ratio,
            report_times,
            profile,
        } => {
            let mut options = options;
            if let Some(threads) = threads {
                anyhow::ensure!(threads > 0, "a worklist needs at least one thread");
                options.number_of_worklist_threads = threads;
            }
            options.report_compile_times |= report_times;
            options.report_total_compile_times = true;
            let settings = Simulation {
                plans,
                seed,
                kill_ratio: kill_ratio.clamp(0.0, 1.0),
                fail_ratio: fail_ratio.clamp(0.0, 1.0),
            };
            simulate(options, settings, profile)
        }
        Commands::Recoveries { locals_offset } => show_recoveries(locals_offset),
    }
}

fn setup_logging(verbosity: u8) {
    let default_level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_options(config: Option<&PathBuf>, overrides: &[String]) -> Result<JitOptions> {
    let options = match config {
        Some(path) => JitOptions::from_file(path)
            .with_context(|| format!("failed to load options from '{}'", path.display()))?,
        None => JitOptions::default(),
    };
    let mut options = options.with_env_overrides()?;
    for entry in overrides {
        let (name, value) = entry
            .split_once('=')
            .with_context(|| format!("expected NAME=VALUE, got '{entry}'"))?;
        options.set(name.trim(), value, OptionSource::CommandLine)?;
    }
    Ok(options)
}

// ==================== Simulation ====================

struct Simulation {
    plans: usize,
    seed: u64,
    kill_ratio: f64,
    fail_ratio: f64,
}

/// Stands in for a tier's compiler: a few slices of work separated by
/// safepoints, then a random outcome
struct SimulatedCompiler {
    rng: StdRng,
    slices: u32,
    fail_ratio: f64,
    code_size: usize,
}

impl PlanDriver for SimulatedCompiler {
    fn compile_in_thread_impl(&mut self, cx: &mut CompileContext<'_, '_>) -> CompilationPath {
        let mode = cx.mode();
        for slice in 0..self.slices {
            std::thread::sleep(Duration::from_micros(self.rng.gen_range(50..400)));
            if mode.is_ftl() && slice == self.slices / 2 {
                cx.mark_ftl_backend_start();
            }
            let keep_live = self.rng.gen_bool(0.3);
            if cx.safepoint(keep_live).did_get_cancelled() {
                return CompilationPath::Cancel;
            }
        }

        if self.rng.gen_bool(self.fail_ratio) {
            return CompilationPath::Fail;
        }
        self.code_size = cx
            .code_block()
            .map_or(0, |block| block.instructions_size() * self.rng.gen_range(4..16));
        match mode {
            JitCompilationMode::Baseline => CompilationPath::Baseline,
            mode if mode.is_ftl() => CompilationPath::Ftl,
            _ => CompilationPath::Dfg,
        }
    }

    fn code_size(&self) -> usize {
        self.code_size
    }
}

const MODES: [JitCompilationMode; 4] = [
    JitCompilationMode::Baseline,
    JitCompilationMode::Dfg,
    JitCompilationMode::Ftl,
    JitCompilationMode::FtlForOsrEntry,
];

fn simulate(options: JitOptions, settings: Simulation, profile: Option<PathBuf>) -> Result<()> {
    let database = profile.as_ref().map(|_| Arc::new(Database::new()));
    let mut vm = Vm::new(options);
    if let Some(database) = &database {
        vm = vm.with_profiler(Arc::clone(database));
    }

    let mut rng = StdRng::seed_from_u64(settings.seed);
    let baselines: Vec<Arc<CodeBlock>> = (0..settings.plans)
        .map(|i| {
            let size = rng.gen_range(16..2048);
            let source = format!("function f{i}() {{ /* {size} */ }}");
            Arc::new(
                CodeBlock::new(vm.heap(), format!("f{i}"), &source, JitType::Baseline)
                    .with_instructions_size(size),
            )
        })
        .collect();
    let targets: Vec<(JitCompilationMode, CodeBlock)> = baselines
        .iter()
        .map(|baseline| {
            let mode = MODES[rng.gen_range(0..MODES.len())];
            let jit_type = match mode {
                JitCompilationMode::Baseline => JitType::Baseline,
                mode if mode.is_ftl() => JitType::Ftl,
                _ => JitType::Dfg,
            };
            (mode, CodeBlock::replacement(vm.heap(), Arc::clone(baseline), jit_type))
        })
        .collect();

    let worklist = Worklist::new(&vm);
    for (mode, code_block) in &targets {
        let driver = SimulatedCompiler {
            rng: StdRng::seed_from_u64(rng.gen()),
            slices: rng.gen_range(1..6),
            fail_ratio: settings.fail_ratio,
            code_size: 0,
        };
        worklist.enqueue(JitPlan::new(&vm, *mode, code_block, Box::new(driver)))?;
    }
    tracing::info!(plans = worklist.len(), threads = worklist.threads().len(), "queued");

    let survivors: Vec<bool> = targets
        .iter()
        .map(|_| !rng.gen_bool(settings.kill_ratio))
        .collect();

    let (dead, completed) = worklist.run(|worklist| {
        std::thread::sleep(Duration::from_millis(2));

        let mut visitor = vm.heap().begin_marking();
        for ((_, code_block), alive) in targets.iter().zip(&survivors) {
            if *alive {
                visitor.mark(code_block.owner_executable());
            }
        }
        let visited = worklist.visit_weak_references(&mut visitor);
        vm.heap().finish_marking(visitor);
        let dead = worklist.remove_dead_plans();
        tracing::info!(visited, removed = dead.len(), "collection finished");

        worklist.wait_until_idle();
        (dead, worklist.complete_ready_plans())
    });

    let mut per_path: HashMap<CompilationPath, usize> = HashMap::default();
    for plan in &completed {
        *per_path.entry(plan.path).or_default() += 1;
    }
    let mut rows: Vec<_> = per_path.into_iter().collect();
    rows.sort_by_key(|(path, _)| path.name());

    println!("Quicksilver JIT {VERSION}");
    println!("=== Simulation ({} plans) ===", settings.plans);
    for (path, count) in rows {
        println!("  {:<12} {count:>5}", path.name());
    }
    println!("  {:<12} {:>5}", "collected", dead.len());
    println!("  {:<12} {:>5}", "active", vm.number_of_active_jit_plans());
    println!();
    println!("{}", vm.compile_time_totals().snapshot());

    if let (Some(path), Some(database)) = (profile, database) {
        database
            .save(&path)
            .with_context(|| format!("failed to write profile to '{}'", path.display()))?;
        println!();
        print!("{}", database.summary());
        println!("Profile written to {}", path.display());
    }
    Ok(())
}

// ==================== Recoveries ====================

fn show_recoveries(locals_offset: i32) -> Result<()> {
    let vm = Vm::default();
    let heap = vm.heap();
    let object = heap.allocate_cell();

    let mut frame = CallFrame::new(heap, 4, 3);
    frame.set_gpr(Gpr::RAX, 7);
    frame.set_gpr(Gpr::RBX, object.to_bits());
    frame.set_gpr(Gpr::RCX, 1);
    frame.set_fpr(Fpr::XMM0, 2.5);
    frame.set_slot(VirtualRegister::local(0), Register::from_int32(-3));
    frame.set_slot(VirtualRegister::local(1), Register::from_double(0.125));
    frame.set_slot(VirtualRegister::local(2), Register::from_js_value(JsValue::null()));
    frame.set_slot(VirtualRegister::local(3), Register::from_cell(object));
    frame.set_slot(VirtualRegister::argument(1), Register::from_js_value(JsValue::int32(10)));
    frame.set_slot(VirtualRegister::argument(2), Register::from_js_value(JsValue::int32(20)));

    let recoveries = [
        ValueRecovery::in_gpr(Gpr::RAX, DataFormat::Int32),
        ValueRecovery::in_gpr(Gpr::RBX, DataFormat::Cell),
        ValueRecovery::in_gpr(Gpr::RCX, DataFormat::Boolean),
        ValueRecovery::in_fpr(Fpr::XMM0, DataFormat::Double),
        ValueRecovery::displaced_in_js_stack(VirtualRegister::local(0), DataFormat::Int32),
        ValueRecovery::displaced_in_js_stack(VirtualRegister::local(1), DataFormat::Double),
        ValueRecovery::displaced_in_js_stack(VirtualRegister::local(2), DataFormat::Js),
        ValueRecovery::displaced_in_js_stack(VirtualRegister::local(3), DataFormat::Cell),
        ValueRecovery::constant(JsValue::int32(42)),
        ValueRecovery::constant(JsValue::undefined()),
        ValueRecovery::constant(JsValue::int32(42)),
        ValueRecovery::direct_arguments_that_were_not_created(MinifiedId::new(7)),
    ];
    for recovery in recoveries.iter().filter(|recovery| recovery.is_in_js_stack()) {
        anyhow::ensure!(
            recovery.virtual_register().checked_add(locals_offset).is_some(),
            "locals offset {locals_offset} moves {recovery} outside the frame"
        );
    }

    let mut context = DumpContext::new();
    println!("{:<24} {:<24} {:<20} value", "recovery", "shifted", "format");
    for recovery in recoveries {
        let mut dumped = String::new();
        let _ = recovery.dump_in_context(&mut dumped, Some(&mut context));
        let shifted = recovery.with_locals_offset(locals_offset).to_string();
        let format = if recovery.is_in_registers() || recovery.is_in_js_stack() {
            recovery.data_format().name()
        } else {
            "-"
        };
        println!(
            "{dumped:<24} {shifted:<24} {format:<20} {}",
            recovery.recover(&frame)
        );
    }
    if !context.is_empty() {
        println!();
        print!("{}", context.legend());
    }
    for arguments in frame.materialized_arguments() {
        println!(
            "materialized {}({}) with {} values",
            arguments.kind,
            arguments.node,
            arguments.values.len()
        );
    }
    Ok(())
}
