//! Runtime state visible to the JIT
//!
//! Boxed values, stack slots, the frame an OSR exit reads from, and the
//! [`Vm`] that plans belong to.

mod frame;
mod register;
mod value;
mod vm;

pub use frame::{CallFrame, MaterializedArguments, OsrExitFrame};
pub use register::Register;
pub use value::{narrow_tag, purify_nan, EncodedJsValue, JsValue, INT52_SHIFT_AMOUNT};
pub use vm::Vm;
