//! Per-bytecode profiler database
//!
//! When a database is attached to the VM, every plan that measures its
//! compile time also records a [`CompilationRecord`]. The database can be
//! written out as JSON for offline tools.
//!
//! # Example
//! ```text
//! let database = Arc::new(Database::new());
//! let vm = Vm::new(options).with_profiler(Arc::clone(&database));
//! // ... run plans ...
//! database.save("compilations.json")?;
//! ```

use crate::error::Result;
use crate::jit::{CompilationPath, JitCompilationMode};
use parking_lot::Mutex;
use rustc_hash::FxHashMap as HashMap;
use serde::Serialize;
use std::fmt::Write;
use std::path::Path;

/// One finished compilation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompilationRecord {
    /// Display form of the code block
    pub code_block: String,
    pub mode: JitCompilationMode,
    pub path: CompilationPath,
    /// Wall-clock compile time in milliseconds
    pub elapsed_ms: f64,
    /// Machine code size produced
    pub code_size: usize,
}

/// Collected compilation records
#[derive(Debug, Default)]
pub struct Database {
    compilations: Mutex<Vec<CompilationRecord>>,
}

#[derive(Serialize)]
struct Document<'r> {
    compilations: &'r [CompilationRecord],
}

impl Database {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record. Safe to call from compiler threads.
    pub fn add_compilation(&self, record: CompilationRecord) {
        self.compilations.lock().push(record);
    }

    pub fn compilations(&self) -> Vec<CompilationRecord> {
        self.compilations.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.compilations.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn to_json(&self) -> Result<String> {
        let compilations = self.compilations.lock();
        let document = Document {
            compilations: &compilations,
        };
        Ok(serde_json::to_string_pretty(&document)?)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Count and total time per path, one line each
    pub fn summary(&self) -> String {
        let compilations = self.compilations.lock();
        let mut per_path: HashMap<&'static str, (usize, f64)> = HashMap::default();
        for record in compilations.iter() {
            let entry = per_path.entry(record.path.name()).or_default();
            entry.0 += 1;
            entry.1 += record.elapsed_ms;
        }
        let mut rows: Vec<_> = per_path.into_iter().collect();
        rows.sort_by(|a, b| a.0.cmp(b.0));

        let mut out = String::new();
        let _ = writeln!(out, "=== Compilations ({}) ===", compilations.len());
        for (path, (count, total)) in rows {
            let _ = writeln!(out, "  {path:<12} {count:>5} plans {total:>10.3} ms");
        }
        out
    }
}
