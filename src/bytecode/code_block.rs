//! Code blocks
//!
//! A code block is one compiled representation of a function body. Each
//! optimizing tier produces a new code block whose `alternative` points at
//! the code block it replaces, ending at the baseline version.

use crate::gc::{CellId, Heap};
use rustc_hash::FxHasher;
use serde::Serialize;
use std::fmt;
use std::hash::Hasher;
use std::sync::Arc;

/// Which tier produced a code block's machine code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum JitType {
    None,
    Interpreter,
    Baseline,
    Dfg,
    Ftl,
}

impl JitType {
    /// Interpreter and baseline code are both valid OSR exit targets
    pub const fn is_baseline_code(self) -> bool {
        matches!(self, JitType::Interpreter | JitType::Baseline)
    }

    pub const fn name(self) -> &'static str {
        match self {
            JitType::None => "None",
            JitType::Interpreter => "LLInt",
            JitType::Baseline => "Baseline",
            JitType::Dfg => "DFG",
            JitType::Ftl => "FTL",
        }
    }
}

impl fmt::Display for JitType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The target of a compilation plan
#[derive(Debug)]
pub struct CodeBlock {
    cell: CellId,
    owner_executable: CellId,
    unlinked_code_block: CellId,
    name: String,
    hash: u32,
    jit_type: JitType,
    instructions_size: usize,
    alternative: Option<Arc<CodeBlock>>,
}

impl CodeBlock {
    /// Create a code block for a freshly linked executable
    pub fn new(heap: &Heap, name: impl Into<String>, source: &str, jit_type: JitType) -> Self {
        let mut hasher = FxHasher::default();
        hasher.write(source.as_bytes());
        Self {
            cell: heap.allocate_cell(),
            owner_executable: heap.allocate_cell(),
            unlinked_code_block: heap.allocate_cell(),
            name: name.into(),
            hash: hasher.finish() as u32,
            jit_type,
            instructions_size: source.len(),
            alternative: None,
        }
    }

    /// Create the code block that will replace `alternative` once compiled
    pub fn replacement(heap: &Heap, alternative: Arc<CodeBlock>, jit_type: JitType) -> Self {
        Self {
            cell: heap.allocate_cell(),
            owner_executable: alternative.owner_executable,
            unlinked_code_block: alternative.unlinked_code_block,
            name: alternative.name.clone(),
            hash: alternative.hash,
            jit_type,
            instructions_size: alternative.instructions_size,
            alternative: Some(alternative),
        }
    }

    pub fn with_instructions_size(mut self, size: usize) -> Self {
        self.instructions_size = size;
        self
    }

    pub fn cell(&self) -> CellId {
        self.cell
    }

    /// The executable this code block was compiled from
    pub fn owner_executable(&self) -> CellId {
        self.owner_executable
    }

    /// Shared, unlinked bytecode for the executable
    pub fn unlinked_code_block(&self) -> CellId {
        self.unlinked_code_block
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn hash(&self) -> u32 {
        self.hash
    }

    pub fn jit_type(&self) -> JitType {
        self.jit_type
    }

    pub fn instructions_size(&self) -> usize {
        self.instructions_size
    }

    pub fn alternative(&self) -> Option<&CodeBlock> {
        self.alternative.as_deref()
    }

    /// The end of the alternative chain, which must be baseline code
    pub fn baseline_alternative(&self) -> &CodeBlock {
        let mut result = self;
        while let Some(alternative) = result.alternative() {
            result = alternative;
        }
        assert!(
            result.jit_type.is_baseline_code() || result.jit_type == JitType::None,
            "baseline alternative of {self} has jit type {}",
            result.jit_type
        );
        result
    }
}

impl fmt::Display for CodeBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}#{:08x}:[{}, {}]",
            self.name, self.hash, self.jit_type, self.instructions_size
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replacement_shares_executable() {
        let heap = Heap::new();
        let baseline = Arc::new(CodeBlock::new(&heap, "loop", "for (;;) {}", JitType::Baseline));
        let dfg = CodeBlock::replacement(&heap, Arc::clone(&baseline), JitType::Dfg);

        assert_ne!(dfg.cell(), baseline.cell());
        assert_eq!(dfg.owner_executable(), baseline.owner_executable());
        assert_eq!(dfg.unlinked_code_block(), baseline.unlinked_code_block());
        assert_eq!(dfg.hash(), baseline.hash());
    }

    #[test]
    fn test_baseline_alternative_walks_chain() {
        let heap = Heap::new();
        let baseline = Arc::new(CodeBlock::new(&heap, "f", "x + 1", JitType::Baseline));
        let dfg = Arc::new(CodeBlock::replacement(&heap, Arc::clone(&baseline), JitType::Dfg));
        let ftl = CodeBlock::replacement(&heap, Arc::clone(&dfg), JitType::Ftl);

        assert_eq!(ftl.baseline_alternative().cell(), baseline.cell());
        assert_eq!(baseline.baseline_alternative().cell(), baseline.cell());
    }

    #[test]
    #[should_panic(expected = "baseline alternative")]
    fn test_baseline_alternative_rejects_optimized_root() {
        let heap = Heap::new();
        let orphan = CodeBlock::new(&heap, "g", "1", JitType::Dfg);
        orphan.baseline_alternative();
    }

    #[test]
    fn test_display() {
        let heap = Heap::new();
        let block = CodeBlock::new(&heap, "add", "a + b", JitType::Baseline).with_instructions_size(12);
        let text = block.to_string();
        assert!(text.starts_with("add#"));
        assert!(text.ends_with(":[Baseline, 12]"));
    }
}
