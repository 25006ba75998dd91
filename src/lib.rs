//! Quicksilver JIT: tiered compilation bookkeeping for the Quicksilver runtime
//!
//! This crate tracks in-flight compilations across the Baseline, DFG and FTL
//! tiers and describes how every live value is rebuilt when optimized code
//! exits back to a lower tier.
//!
//! # Quick Start
//!
//! ```
//! use quicksilver_jit::bytecode::{DataFormat, ValueRecovery, VirtualRegister};
//!
//! let recovery = ValueRecovery::displaced_in_js_stack(VirtualRegister::local(3), DataFormat::Double);
//! assert!(recovery.is_in_js_stack());
//! assert_eq!(recovery.to_string(), "*double(loc3)");
//! ```
//!
//! # Module Overview
//!
//! | Category | Modules |
//! |----------|---------|
//! | **Recovery** | [`bytecode`], [`runtime`] |
//! | **Plans** | [`jit`], [`gc`] |
//! | **Ambient** | [`options`], [`profiler`], [`error`](Error) |
#![allow(clippy::new_without_default)]

pub mod bytecode;
pub mod gc;
pub mod jit;
pub mod options;
pub mod profiler;
pub mod runtime;

mod error;

pub use error::{Error, OptionSource, Result};
pub use jit::{JitPlan, Worklist};
pub use options::JitOptions;
pub use runtime::Vm;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
