//! Compiler thread safepoints
//!
//! A compiler thread holds its right-to-run lock for as long as it touches
//! plan state. At a safepoint it publishes a [`Safepoint`] record and lets go
//! of the lock, so the collector (or a canceller) that acquires every
//! thread's right-to-run knows each thread is either idle or parked.
//!
//! A safepoint that keeps dependencies live promises the collector that the
//! plan's code block will be visited, so the plan must not be cancelled
//! while the thread is parked there.

use parking_lot::{Mutex, MutexGuard};
use std::fmt;

/// Record of a thread parked at a safepoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Safepoint {
    keep_dependencies_live: bool,
}

impl Safepoint {
    pub fn new(keep_dependencies_live: bool) -> Self {
        Self {
            keep_dependencies_live,
        }
    }

    pub fn keep_dependencies_live(&self) -> bool {
        self.keep_dependencies_live
    }
}

/// What a compiler thread finds when it leaves a safepoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SafepointResult {
    Resumed,
    /// The plan was cancelled while the thread was parked
    Cancelled,
}

impl SafepointResult {
    pub fn did_get_cancelled(self) -> bool {
        self == SafepointResult::Cancelled
    }
}

/// One compiler thread as seen by plans and the collector
pub struct WorklistThread {
    index: usize,
    right_to_run: Mutex<()>,
    safepoint: Mutex<Option<Safepoint>>,
}

impl WorklistThread {
    pub fn new(index: usize) -> Self {
        Self {
            index,
            right_to_run: Mutex::new(()),
            safepoint: Mutex::new(None),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// The safepoint the thread is parked at, if any
    pub fn safepoint(&self) -> Option<Safepoint> {
        *self.safepoint.lock()
    }

    pub(crate) fn set_safepoint(&self, safepoint: Option<Safepoint>) {
        *self.safepoint.lock() = safepoint;
    }

    /// Block until the thread is idle or parked at a safepoint, and keep it
    /// from resuming until the guard is dropped
    pub fn suspend(&self) -> MutexGuard<'_, ()> {
        self.right_to_run.lock()
    }

    pub(crate) fn acquire_right_to_run(&self) -> MutexGuard<'_, ()> {
        self.right_to_run.lock()
    }
}

impl fmt::Debug for WorklistThread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorklistThread")
            .field("index", &self.index)
            .field("safepoint", &self.safepoint())
            .finish()
    }
}

impl fmt::Display for WorklistThread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "JIT Worklist Helper Thread #{}", self.index)
    }
}
