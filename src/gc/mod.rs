//! Heap liveness interface for the JIT
//!
//! Plans never own the code blocks they compile. Instead, the collector asks
//! each plan whether its target is still reachable, either against the mark
//! bits of the last finished collection ([`Heap::is_marked`]) or against a
//! marking pass that is still running ([`SlotVisitor`]).
//!
//! ## Design
//!
//! Cells are identified by [`CellId`]. A marking pass is a
//! [`MarkingVisitor`] that accumulates mark bits privately; publishing it
//! with [`Heap::finish_marking`] replaces the heap's mark set, which is what
//! post-GC queries observe.

use crate::bytecode::CodeBlock;
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Cell ids are 16-byte granular so a boxed cell never sets a tag bit.
const CELL_ALIGNMENT_SHIFT: u32 = 4;

/// Largest id whose boxed form stays below the number tag.
const MAX_CELL_ID: u64 = (1 << 44) - 1;

/// Identity of a garbage-collected cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellId(u64);

impl CellId {
    /// Wrap a raw cell index. Zero is reserved for the empty value.
    pub fn from_raw(raw: u64) -> Self {
        assert!(raw != 0 && raw <= MAX_CELL_ID, "cell id {raw} out of range");
        Self(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Pointer-like bit pattern used by boxed and unboxed cell values
    pub const fn to_bits(self) -> u64 {
        self.0 << CELL_ALIGNMENT_SHIFT
    }

    /// Inverse of [`CellId::to_bits`]
    pub fn from_bits(bits: u64) -> Self {
        assert!(
            bits & ((1 << CELL_ALIGNMENT_SHIFT) - 1) == 0,
            "misaligned cell bits {bits:#x}"
        );
        Self::from_raw(bits >> CELL_ALIGNMENT_SHIFT)
    }
}

impl fmt::Display for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cell#{}", self.0)
    }
}

/// GC statistics
#[derive(Debug, Clone, Default)]
pub struct GcStats {
    /// Total cells allocated
    pub total_allocations: u64,
    /// Cells marked by the last collection
    pub live_cells: usize,
    /// Number of finished collections
    pub collections: u64,
    /// Total time spent marking
    pub total_marking_time: Duration,
    /// Longest single marking pass
    pub max_marking_time: Duration,
}

/// Marking interface used while a collection is in progress.
///
/// Implementations must tolerate being queried from a concurrent marking
/// thread while compiler threads are still running.
pub trait SlotVisitor {
    /// Whether `cell` has been marked by this pass
    fn is_marked(&self, cell: CellId) -> bool;

    /// Treat `code_block` as a root without consulting write barriers
    fn append_unbarriered(&mut self, code_block: &CodeBlock);
}

/// Cell allocator and the mark bits of the last finished collection
pub struct Heap {
    next_cell: AtomicU64,
    marks: RwLock<FxHashSet<CellId>>,
    stats: Mutex<GcStats>,
}

impl Heap {
    pub fn new() -> Self {
        Self {
            next_cell: AtomicU64::new(1),
            marks: RwLock::new(FxHashSet::default()),
            stats: Mutex::new(GcStats::default()),
        }
    }

    /// Allocate a fresh cell id
    pub fn allocate_cell(&self) -> CellId {
        let raw = self.next_cell.fetch_add(1, Ordering::Relaxed);
        self.stats.lock().total_allocations += 1;
        CellId::from_raw(raw)
    }

    /// Whether `cell` survived the last finished collection
    pub fn is_marked(&self, cell: CellId) -> bool {
        self.marks.read().contains(&cell)
    }

    /// Start a marking pass
    pub fn begin_marking(&self) -> MarkingVisitor {
        MarkingVisitor::new()
    }

    /// Publish a marking pass as the heap's current mark set
    pub fn finish_marking(&self, visitor: MarkingVisitor) {
        let elapsed = visitor.started.elapsed();
        let live = visitor.marks.len();
        *self.marks.write() = visitor.marks;

        let mut stats = self.stats.lock();
        stats.collections += 1;
        stats.live_cells = live;
        stats.total_marking_time += elapsed;
        stats.max_marking_time = stats.max_marking_time.max(elapsed);
        tracing::debug!(
            target: "quicksilver_jit::gc",
            live_cells = live,
            elapsed_us = elapsed.as_micros() as u64,
            "marking finished"
        );
    }

    pub fn stats(&self) -> GcStats {
        self.stats.lock().clone()
    }
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}

/// One marking pass
#[derive(Debug)]
pub struct MarkingVisitor {
    marks: FxHashSet<CellId>,
    unbarriered_code_blocks: usize,
    started: Instant,
}

impl MarkingVisitor {
    fn new() -> Self {
        Self {
            marks: FxHashSet::default(),
            unbarriered_code_blocks: 0,
            started: Instant::now(),
        }
    }

    /// Mark a root cell. Returns true if it was not yet marked.
    pub fn mark(&mut self, cell: CellId) -> bool {
        self.marks.insert(cell)
    }

    /// Number of code blocks appended without a barrier
    pub fn unbarriered_code_blocks(&self) -> usize {
        self.unbarriered_code_blocks
    }

    pub fn marked_count(&self) -> usize {
        self.marks.len()
    }
}

impl SlotVisitor for MarkingVisitor {
    fn is_marked(&self, cell: CellId) -> bool {
        self.marks.contains(&cell)
    }

    fn append_unbarriered(&mut self, code_block: &CodeBlock) {
        self.unbarriered_code_blocks += 1;
        // A code block keeps its executable, unlinked code and alternatives alive.
        let mut current = Some(code_block);
        while let Some(block) = current {
            if !self.mark(block.cell()) {
                break;
            }
            self.mark(block.owner_executable());
            self.mark(block.unlinked_code_block());
            current = block.alternative();
        }
    }
}
