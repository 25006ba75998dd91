//! Bytecode-level metadata shared by all tiers
//!
//! Code blocks, the virtual registers their bytecode addresses, and the
//! value recoveries optimized code records so an OSR exit can rebuild each
//! virtual register's value for the baseline tier.

mod code_block;
mod data_format;
mod minified_id;
mod value_recovery;
mod virtual_register;

pub use code_block::{CodeBlock, JitType};
pub use data_format::DataFormat;
pub use minified_id::MinifiedId;
#[cfg(feature = "jsvalue32_64")]
pub use value_recovery::JsValueRegs;
pub use value_recovery::{ArgumentsKind, DumpContext, ValueRecovery, ValueRecoveryTechnique};
pub use virtual_register::{
    VirtualRegister, CALL_FRAME_HEADER_SIZE, FIRST_CONSTANT_REGISTER_INDEX, THIS_ARGUMENT_OFFSET,
};
