//! Call frames as seen by an OSR exit
//!
//! When optimized code exits, the exit stub spills the machine registers and
//! hands the runtime a frame whose stack slots may still hold values in the
//! optimized code's layout. [`OsrExitFrame`] is the read interface value
//! recoveries use; [`CallFrame`] is an owned snapshot implementing it.

use super::register::Register;
use super::value::JsValue;
use crate::bytecode::{ArgumentsKind, MinifiedId, VirtualRegister, THIS_ARGUMENT_OFFSET};
use crate::gc::Heap;
use crate::jit::{Fpr, Gpr, NUMBER_OF_FPRS, NUMBER_OF_GPRS};
use parking_lot::Mutex;

/// Machine state captured at an OSR exit
pub trait OsrExitFrame {
    /// Contents of a stack slot
    fn slot(&self, reg: VirtualRegister) -> Register;

    /// Saved contents of a general-purpose register
    fn gpr(&self, gpr: Gpr) -> u64;

    /// Saved contents of a floating-point register
    fn fpr(&self, fpr: Fpr) -> f64;

    /// Allocate the arguments object the optimizer proved was never created
    fn materialize_arguments(&self, kind: ArgumentsKind, node: MinifiedId) -> JsValue;
}

/// An arguments object built during an exit
#[derive(Debug, Clone, PartialEq)]
pub struct MaterializedArguments {
    pub kind: ArgumentsKind,
    pub node: MinifiedId,
    pub object: JsValue,
    /// Argument values excluding `this`
    pub values: Vec<JsValue>,
}

/// Owned snapshot of a frame and the register file at an exit
pub struct CallFrame<'h> {
    heap: &'h Heap,
    num_locals: u32,
    /// Slots from `loc{num_locals - 1}` up to the last argument
    slots: Vec<Register>,
    gprs: [u64; NUMBER_OF_GPRS],
    fprs: [f64; NUMBER_OF_FPRS],
    materialized: Mutex<Vec<MaterializedArguments>>,
}

impl<'h> CallFrame<'h> {
    /// Create a frame with `num_locals` locals and `num_arguments` arguments
    /// including `this`.
    pub fn new(heap: &'h Heap, num_locals: u32, num_arguments: u32) -> Self {
        let len = num_locals as usize + THIS_ARGUMENT_OFFSET as usize + num_arguments as usize;
        Self {
            heap,
            num_locals,
            slots: vec![Register::from_js_value(JsValue::undefined()); len],
            gprs: [0; NUMBER_OF_GPRS],
            fprs: [0.0; NUMBER_OF_FPRS],
            materialized: Mutex::new(Vec::new()),
        }
    }

    fn index(&self, reg: VirtualRegister) -> usize {
        let index = reg.offset() + self.num_locals as i32;
        assert!(
            index >= 0 && (index as usize) < self.slots.len(),
            "{reg} is outside the frame"
        );
        index as usize
    }

    pub fn set_slot(&mut self, reg: VirtualRegister, value: Register) {
        let index = self.index(reg);
        self.slots[index] = value;
    }

    pub fn set_gpr(&mut self, gpr: Gpr, bits: u64) {
        self.gprs[gpr.index() as usize] = bits;
    }

    pub fn set_fpr(&mut self, fpr: Fpr, value: f64) {
        self.fprs[fpr.index() as usize] = value;
    }

    /// Number of arguments including `this`
    pub fn argument_count_including_this(&self) -> u32 {
        (self.slots.len() - self.num_locals as usize - THIS_ARGUMENT_OFFSET as usize) as u32
    }

    /// Arguments objects built by recoveries so far
    pub fn materialized_arguments(&self) -> Vec<MaterializedArguments> {
        self.materialized.lock().clone()
    }
}

impl OsrExitFrame for CallFrame<'_> {
    fn slot(&self, reg: VirtualRegister) -> Register {
        self.slots[self.index(reg)]
    }

    fn gpr(&self, gpr: Gpr) -> u64 {
        self.gprs[gpr.index() as usize]
    }

    fn fpr(&self, fpr: Fpr) -> f64 {
        self.fprs[fpr.index() as usize]
    }

    fn materialize_arguments(&self, kind: ArgumentsKind, node: MinifiedId) -> JsValue {
        let values = (1..self.argument_count_including_this())
            .map(|i| self.slot(VirtualRegister::argument(i)).js_value())
            .collect();
        let object = JsValue::cell(self.heap.allocate_cell());
        self.materialized.lock().push(MaterializedArguments {
            kind,
            node,
            object,
            values,
        });
        object
    }
}
