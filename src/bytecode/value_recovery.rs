//! Value recoveries
//!
//! For every bytecode virtual register that is live at an OSR exit, the
//! optimizing tiers record a [`ValueRecovery`] telling the exit path where
//! the value currently lives and in what representation: a machine
//! register, a displaced stack slot, an inline constant, or an arguments
//! object that was never allocated.
//!
//! There is one recovery per live register per exit site, so the type is a
//! small `Copy` value of at most two machine words.
//!
//! ## Example
//!
//! ```
//! use quicksilver_jit::bytecode::{DataFormat, ValueRecovery, ValueRecoveryTechnique, VirtualRegister};
//!
//! let recovery = ValueRecovery::displaced_in_js_stack(VirtualRegister::new(4), DataFormat::Int32);
//! assert_eq!(recovery.technique(), ValueRecoveryTechnique::Int32DisplacedInJsStack);
//!
//! let inlined = recovery.with_locals_offset(-2);
//! assert_eq!(inlined.virtual_register().offset(), 2);
//! ```

use super::{DataFormat, MinifiedId, VirtualRegister};
use crate::gc::CellId;
use crate::jit::{Fpr, Gpr, Reg};
use crate::runtime::{purify_nan, JsValue, OsrExitFrame};
use rustc_hash::FxHashMap;
use std::fmt::{self, Write};
use std::ops::Not;

/// How a value is recovered at an OSR exit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueRecoveryTechnique {
    // In a general-purpose register
    InGpr,
    UnboxedInt32InGpr,
    UnboxedInt52InGpr,
    UnboxedStrictInt52InGpr,
    UnboxedBooleanInGpr,
    UnboxedCellInGpr,
    #[cfg(feature = "jsvalue32_64")]
    InPair,
    // In a floating-point register
    InFpr,
    UnboxedDoubleInFpr,
    // Spilled to the interpreter's stack
    DisplacedInJsStack,
    Int32DisplacedInJsStack,
    #[cfg(feature = "jsvalue32_64")]
    Int32TagDisplacedInJsStack,
    Int52DisplacedInJsStack,
    StrictInt52DisplacedInJsStack,
    DoubleDisplacedInJsStack,
    CellDisplacedInJsStack,
    BooleanDisplacedInJsStack,
    // Arguments objects the optimizer never allocated
    DirectArgumentsThatWereNotCreated,
    ClonedArgumentsThatWereNotCreated,
    Constant,
    DontKnow,
}

/// Shape of an arguments object that was never created
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArgumentsKind {
    Direct,
    Cloned,
}

impl fmt::Display for ArgumentsKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgumentsKind::Direct => write!(f, "DirectArguments"),
            ArgumentsKind::Cloned => write!(f, "ClonedArguments"),
        }
    }
}

/// Tag and payload registers of a value split across two registers
#[cfg(feature = "jsvalue32_64")]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JsValueRegs {
    pub tag: Gpr,
    pub payload: Gpr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum GprFormat {
    Boxed,
    Int32,
    Int52,
    StrictInt52,
    Boolean,
    Cell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum FprFormat {
    Boxed,
    Double,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum StackFormat {
    Boxed,
    Int32,
    #[cfg(feature = "jsvalue32_64")]
    Int32Tag,
    Int52,
    StrictInt52,
    Double,
    Cell,
    Boolean,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Source {
    Gpr(GprFormat, Gpr),
    #[cfg(feature = "jsvalue32_64")]
    Pair(JsValueRegs),
    Fpr(FprFormat, Fpr),
    Stack(StackFormat, VirtualRegister),
    Arguments(ArgumentsKind, MinifiedId),
    Constant(JsValue),
    DontKnow,
}

/// Where to find the value of one virtual register at one exit site
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ValueRecovery(Source);

impl Default for ValueRecovery {
    fn default() -> Self {
        ValueRecovery(Source::DontKnow)
    }
}

impl ValueRecovery {
    // ==================== Construction ====================

    /// A value in a general-purpose register
    pub fn in_gpr(gpr: Gpr, format: DataFormat) -> Self {
        assert!(format != DataFormat::None, "register recovery needs a data format");
        #[cfg(feature = "jsvalue32_64")]
        assert!(
            matches!(format, DataFormat::Int32 | DataFormat::Cell | DataFormat::Boolean),
            "{format} does not fit in one register; use a pair"
        );
        let format = match format {
            DataFormat::Int32 => GprFormat::Int32,
            DataFormat::Int52 => GprFormat::Int52,
            DataFormat::StrictInt52 => GprFormat::StrictInt52,
            DataFormat::Boolean => GprFormat::Boolean,
            DataFormat::Cell => GprFormat::Cell,
            _ => GprFormat::Boxed,
        };
        ValueRecovery(Source::Gpr(format, gpr))
    }

    /// A value in a floating-point register, either an unboxed double or boxed
    pub fn in_fpr(fpr: Fpr, format: DataFormat) -> Self {
        assert!(
            format == DataFormat::Double || format.is_js(),
            "{format} cannot live in a float register"
        );
        let format = if format == DataFormat::Double {
            FprFormat::Double
        } else {
            FprFormat::Boxed
        };
        ValueRecovery(Source::Fpr(format, fpr))
    }

    pub fn in_register(reg: Reg, format: DataFormat) -> Self {
        match reg {
            Reg::Gpr(gpr) => Self::in_gpr(gpr, format),
            Reg::Fpr(fpr) => Self::in_fpr(fpr, format),
        }
    }

    /// A boxed value split across a tag and a payload register
    #[cfg(feature = "jsvalue32_64")]
    pub fn in_pair(tag: Gpr, payload: Gpr) -> Self {
        ValueRecovery(Source::Pair(JsValueRegs { tag, payload }))
    }

    /// A value spilled to the interpreter's stack
    pub fn displaced_in_js_stack(reg: VirtualRegister, format: DataFormat) -> Self {
        let format = match format {
            DataFormat::Int32 => StackFormat::Int32,
            DataFormat::Int52 => StackFormat::Int52,
            DataFormat::StrictInt52 => StackFormat::StrictInt52,
            DataFormat::Double => StackFormat::Double,
            DataFormat::Cell => StackFormat::Cell,
            DataFormat::Boolean => StackFormat::Boolean,
            _ => {
                assert!(
                    format != DataFormat::None && format != DataFormat::Storage,
                    "{format} cannot be displaced to the stack"
                );
                StackFormat::Boxed
            }
        };
        ValueRecovery(Source::Stack(format, reg))
    }

    /// One half of a callee-save register spilled to the stack
    #[cfg(feature = "jsvalue32_64")]
    pub fn callee_save_gpr_displaced_in_js_stack(reg: VirtualRegister, in_tag: bool) -> Self {
        let format = if in_tag {
            StackFormat::Int32Tag
        } else {
            StackFormat::Int32
        };
        ValueRecovery(Source::Stack(format, reg))
    }

    pub fn constant(value: JsValue) -> Self {
        ValueRecovery(Source::Constant(value))
    }

    pub fn direct_arguments_that_were_not_created(id: MinifiedId) -> Self {
        ValueRecovery(Source::Arguments(ArgumentsKind::Direct, id))
    }

    pub fn cloned_arguments_that_were_not_created(id: MinifiedId) -> Self {
        ValueRecovery(Source::Arguments(ArgumentsKind::Cloned, id))
    }

    // ==================== Classification ====================

    pub fn technique(&self) -> ValueRecoveryTechnique {
        use ValueRecoveryTechnique as T;
        match self.0 {
            Source::Gpr(format, _) => match format {
                GprFormat::Boxed => T::InGpr,
                GprFormat::Int32 => T::UnboxedInt32InGpr,
                GprFormat::Int52 => T::UnboxedInt52InGpr,
                GprFormat::StrictInt52 => T::UnboxedStrictInt52InGpr,
                GprFormat::Boolean => T::UnboxedBooleanInGpr,
                GprFormat::Cell => T::UnboxedCellInGpr,
            },
            #[cfg(feature = "jsvalue32_64")]
            Source::Pair(_) => T::InPair,
            Source::Fpr(FprFormat::Boxed, _) => T::InFpr,
            Source::Fpr(FprFormat::Double, _) => T::UnboxedDoubleInFpr,
            Source::Stack(format, _) => match format {
                StackFormat::Boxed => T::DisplacedInJsStack,
                StackFormat::Int32 => T::Int32DisplacedInJsStack,
                #[cfg(feature = "jsvalue32_64")]
                StackFormat::Int32Tag => T::Int32TagDisplacedInJsStack,
                StackFormat::Int52 => T::Int52DisplacedInJsStack,
                StackFormat::StrictInt52 => T::StrictInt52DisplacedInJsStack,
                StackFormat::Double => T::DoubleDisplacedInJsStack,
                StackFormat::Cell => T::CellDisplacedInJsStack,
                StackFormat::Boolean => T::BooleanDisplacedInJsStack,
            },
            Source::Arguments(ArgumentsKind::Direct, _) => T::DirectArgumentsThatWereNotCreated,
            Source::Arguments(ArgumentsKind::Cloned, _) => T::ClonedArgumentsThatWereNotCreated,
            Source::Constant(_) => T::Constant,
            Source::DontKnow => T::DontKnow,
        }
    }

    pub fn is_set(&self) -> bool {
        !matches!(self.0, Source::DontKnow)
    }

    pub fn is_constant(&self) -> bool {
        matches!(self.0, Source::Constant(_))
    }

    pub fn is_in_gpr(&self) -> bool {
        matches!(self.0, Source::Gpr(..))
    }

    pub fn is_in_fpr(&self) -> bool {
        matches!(self.0, Source::Fpr(..))
    }

    pub fn is_in_js_stack(&self) -> bool {
        matches!(self.0, Source::Stack(..))
    }

    /// Whether the value is held in the registers that carry a full boxed value
    #[cfg(feature = "jsvalue32_64")]
    pub fn is_in_js_value_regs(&self) -> bool {
        matches!(self.0, Source::Pair(_))
    }

    /// Whether the value is held in the registers that carry a full boxed value
    #[cfg(not(feature = "jsvalue32_64"))]
    pub fn is_in_js_value_regs(&self) -> bool {
        self.is_in_gpr()
    }

    pub fn is_in_registers(&self) -> bool {
        self.is_in_js_value_regs() || self.is_in_gpr() || self.is_in_fpr()
    }

    /// Representation of the recovered bits
    pub fn data_format(&self) -> DataFormat {
        match self.0 {
            Source::Gpr(format, _) => match format {
                GprFormat::Boxed => DataFormat::Js,
                GprFormat::Int32 => DataFormat::Int32,
                GprFormat::Int52 => DataFormat::Int52,
                GprFormat::StrictInt52 => DataFormat::StrictInt52,
                GprFormat::Boolean => DataFormat::Boolean,
                GprFormat::Cell => DataFormat::Cell,
            },
            #[cfg(feature = "jsvalue32_64")]
            Source::Pair(_) => DataFormat::Js,
            Source::Fpr(FprFormat::Boxed, _) => DataFormat::Js,
            Source::Fpr(FprFormat::Double, _) => DataFormat::Double,
            Source::Stack(format, _) => match format {
                StackFormat::Boxed => DataFormat::Js,
                StackFormat::Int32 => DataFormat::Int32,
                #[cfg(feature = "jsvalue32_64")]
                StackFormat::Int32Tag => DataFormat::Int32,
                StackFormat::Int52 => DataFormat::Int52,
                StackFormat::StrictInt52 => DataFormat::StrictInt52,
                StackFormat::Double => DataFormat::Double,
                StackFormat::Cell => DataFormat::Cell,
                StackFormat::Boolean => DataFormat::Boolean,
            },
            Source::Constant(_) => DataFormat::Js,
            Source::Arguments(..) | Source::DontKnow => DataFormat::None,
        }
    }

    // ==================== Accessors ====================

    pub fn gpr(&self) -> Gpr {
        match self.0 {
            Source::Gpr(_, gpr) => gpr,
            _ => panic!("{self} is not in a general register"),
        }
    }

    pub fn fpr(&self) -> Fpr {
        match self.0 {
            Source::Fpr(_, fpr) => fpr,
            _ => panic!("{self} is not in a float register"),
        }
    }

    #[cfg(feature = "jsvalue32_64")]
    pub fn js_value_regs(&self) -> JsValueRegs {
        match self.0 {
            Source::Pair(regs) => regs,
            _ => panic!("{self} is not in a register pair"),
        }
    }

    #[cfg(feature = "jsvalue32_64")]
    pub fn tag_gpr(&self) -> Gpr {
        self.js_value_regs().tag
    }

    #[cfg(feature = "jsvalue32_64")]
    pub fn payload_gpr(&self) -> Gpr {
        self.js_value_regs().payload
    }

    pub fn virtual_register(&self) -> VirtualRegister {
        match self.0 {
            Source::Stack(_, reg) => reg,
            _ => panic!("{self} is not on the stack"),
        }
    }

    pub fn constant_value(&self) -> JsValue {
        match self.0 {
            Source::Constant(value) => value,
            _ => panic!("{self} is not a constant"),
        }
    }

    pub fn node_id(&self) -> MinifiedId {
        match self.0 {
            Source::Arguments(_, id) => id,
            _ => panic!("{self} does not name an arguments node"),
        }
    }

    // ==================== Transforms ====================

    /// Shift a stack slot by `offset`, used when inlining renumbers locals.
    /// Every other technique is returned unchanged.
    ///
    /// # Panics
    ///
    /// Panics if the shifted slot falls outside the `i32` offset range.
    pub fn with_locals_offset(&self, offset: i32) -> Self {
        match self.0 {
            Source::Stack(format, reg) => ValueRecovery(Source::Stack(format, reg + offset)),
            _ => *self,
        }
    }

    /// Call `visit` for each machine register this recovery reads
    pub fn for_each_reg(&self, mut visit: impl FnMut(Reg)) {
        match self.0 {
            Source::Gpr(_, gpr) => visit(Reg::Gpr(gpr)),
            Source::Fpr(_, fpr) => visit(Reg::Fpr(fpr)),
            #[cfg(feature = "jsvalue32_64")]
            Source::Pair(regs) => {
                visit(Reg::Gpr(regs.payload));
                visit(Reg::Gpr(regs.tag));
            }
            _ => {}
        }
    }

    // ==================== Recovery ====================

    /// Reconstruct the boxed value from the machine state at an exit.
    ///
    /// # Panics
    ///
    /// Panics for [`ValueRecoveryTechnique::DontKnow`], which no valid exit
    /// path can reach.
    pub fn recover(&self, frame: &dyn OsrExitFrame) -> JsValue {
        match self.0 {
            Source::Gpr(format, gpr) => {
                let bits = frame.gpr(gpr);
                match format {
                    GprFormat::Boxed => JsValue::decode(bits),
                    GprFormat::Int32 => JsValue::int32(bits as u32 as i32),
                    GprFormat::Int52 => JsValue::number_from_i64(
                        (bits as i64) >> crate::runtime::INT52_SHIFT_AMOUNT,
                    ),
                    GprFormat::StrictInt52 => JsValue::number_from_i64(bits as i64),
                    GprFormat::Boolean => JsValue::boolean(bits & 1 != 0),
                    GprFormat::Cell => JsValue::cell(CellId::from_bits(bits)),
                }
            }
            #[cfg(feature = "jsvalue32_64")]
            Source::Pair(regs) => JsValue::from_tag_payload(
                frame.gpr(regs.tag) as u32,
                frame.gpr(regs.payload) as u32,
            ),
            Source::Fpr(FprFormat::Boxed, fpr) => JsValue::decode(frame.fpr(fpr).to_bits()),
            Source::Fpr(FprFormat::Double, fpr) => JsValue::number(purify_nan(frame.fpr(fpr))),
            Source::Stack(format, reg) => {
                let slot = frame.slot(reg);
                match format {
                    StackFormat::Boxed => slot.js_value(),
                    StackFormat::Int32 => JsValue::int32(slot.unboxed_int32()),
                    #[cfg(feature = "jsvalue32_64")]
                    StackFormat::Int32Tag => {
                        panic!("{self} holds only a tag and cannot be recovered on its own")
                    }
                    StackFormat::Int52 => JsValue::number_from_i64(slot.unboxed_int52()),
                    StackFormat::StrictInt52 => {
                        JsValue::number_from_i64(slot.unboxed_strict_int52())
                    }
                    StackFormat::Double => JsValue::number(purify_nan(slot.unboxed_double())),
                    StackFormat::Cell => JsValue::cell(slot.unboxed_cell()),
                    // Wide code spills booleans boxed; narrow code spills the payload.
                    #[cfg(not(feature = "jsvalue32_64"))]
                    StackFormat::Boolean => slot.js_value(),
                    #[cfg(feature = "jsvalue32_64")]
                    StackFormat::Boolean => JsValue::boolean(slot.unboxed_boolean()),
                }
            }
            Source::Arguments(kind, id) => frame.materialize_arguments(kind, id),
            Source::Constant(value) => value,
            Source::DontKnow => panic!("no recovery recorded for this value"),
        }
    }

    // ==================== Dumping ====================

    /// Write the recovery, naming constants through `context` when given
    pub fn dump_in_context(
        &self,
        out: &mut dyn Write,
        context: Option<&mut DumpContext>,
    ) -> fmt::Result {
        match self.0 {
            Source::Gpr(format, gpr) => match format {
                GprFormat::Boxed => write!(out, "{gpr}"),
                GprFormat::Int32 => write!(out, "int32({gpr})"),
                GprFormat::Int52 => write!(out, "int52({gpr})"),
                GprFormat::StrictInt52 => write!(out, "strictInt52({gpr})"),
                GprFormat::Boolean => write!(out, "bool({gpr})"),
                GprFormat::Cell => write!(out, "cell({gpr})"),
            },
            #[cfg(feature = "jsvalue32_64")]
            Source::Pair(regs) => write!(out, "pair({}, {})", regs.tag, regs.payload),
            Source::Fpr(FprFormat::Boxed, fpr) => write!(out, "{fpr}"),
            Source::Fpr(FprFormat::Double, fpr) => write!(out, "double({fpr})"),
            Source::Stack(format, reg) => match format {
                StackFormat::Boxed => write!(out, "*{reg}"),
                StackFormat::Int32 => write!(out, "*int32({reg})"),
                #[cfg(feature = "jsvalue32_64")]
                StackFormat::Int32Tag => write!(out, "*int32Tag({reg})"),
                StackFormat::Int52 => write!(out, "*int52({reg})"),
                StackFormat::StrictInt52 => write!(out, "*strictInt52({reg})"),
                StackFormat::Double => write!(out, "*double({reg})"),
                StackFormat::Cell => write!(out, "*cell({reg})"),
                StackFormat::Boolean => write!(out, "*bool({reg})"),
            },
            Source::Arguments(kind, id) => write!(out, "{kind}({id})"),
            Source::Constant(value) => match context {
                Some(context) => write!(out, "[{}]", context.name_constant(value)),
                None => write!(out, "[{value}]"),
            },
            Source::DontKnow => write!(out, "!"),
        }
    }
}

impl Not for ValueRecovery {
    type Output = bool;

    fn not(self) -> bool {
        !self.is_set()
    }
}

impl fmt::Display for ValueRecovery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.dump_in_context(f, None)
    }
}

/// Shared naming of constants across a dump of many recoveries
#[derive(Debug, Default)]
pub struct DumpContext {
    names: FxHashMap<JsValue, usize>,
    constants: Vec<JsValue>,
}

impl DumpContext {
    pub fn new() -> Self {
        Self::default()
    }

    fn name_constant(&mut self, value: JsValue) -> String {
        let next = self.constants.len();
        let index = *self.names.entry(value).or_insert(next);
        if index == next {
            self.constants.push(value);
        }
        format!("c{index}")
    }

    pub fn is_empty(&self) -> bool {
        self.constants.is_empty()
    }

    /// One `cN = value` line per named constant, in naming order
    pub fn legend(&self) -> String {
        let mut out = String::new();
        for (index, value) in self.constants.iter().enumerate() {
            let _ = writeln!(out, "c{index} = {value}");
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gc::Heap;
    use crate::runtime::{CallFrame, Register};
    use pretty_assertions::assert_eq;

    fn stack(offset: i32, format: DataFormat) -> ValueRecovery {
        ValueRecovery::displaced_in_js_stack(VirtualRegister::new(offset), format)
    }

    fn samples() -> Vec<ValueRecovery> {
        let mut samples = vec![
            ValueRecovery::default(),
            ValueRecovery::in_gpr(Gpr::RAX, DataFormat::Int32),
            ValueRecovery::in_gpr(Gpr::RBX, DataFormat::Cell),
            ValueRecovery::in_gpr(Gpr::RCX, DataFormat::Boolean),
            ValueRecovery::in_fpr(Fpr::XMM0, DataFormat::Double),
            ValueRecovery::in_fpr(Fpr::XMM1, DataFormat::Js),
            stack(-3, DataFormat::Js),
            stack(-1, DataFormat::Int32),
            stack(-2, DataFormat::Int52),
            stack(-4, DataFormat::StrictInt52),
            stack(6, DataFormat::Double),
            stack(7, DataFormat::Cell),
            stack(-5, DataFormat::Boolean),
            ValueRecovery::constant(JsValue::int32(5)),
            ValueRecovery::direct_arguments_that_were_not_created(MinifiedId::new(3)),
            ValueRecovery::cloned_arguments_that_were_not_created(MinifiedId::new(4)),
        ];
        #[cfg(not(feature = "jsvalue32_64"))]
        samples.extend([
            ValueRecovery::in_gpr(Gpr::RDX, DataFormat::Js),
            ValueRecovery::in_gpr(Gpr::R8, DataFormat::Int52),
            ValueRecovery::in_gpr(Gpr::R9, DataFormat::StrictInt52),
        ]);
        #[cfg(feature = "jsvalue32_64")]
        samples.extend([
            ValueRecovery::in_pair(Gpr::RDX, Gpr::RAX),
            ValueRecovery::callee_save_gpr_displaced_in_js_stack(VirtualRegister::local(2), true),
        ]);
        samples
    }

    #[test]
    fn test_descriptor_is_compact() {
        assert!(std::mem::size_of::<ValueRecovery>() <= 16);
    }

    #[test]
    fn test_default_is_dont_know() {
        let recovery = ValueRecovery::default();
        assert!(!recovery.is_set());
        assert!(!recovery);
        assert_eq!(recovery.technique(), ValueRecoveryTechnique::DontKnow);
        assert_eq!(recovery.data_format(), DataFormat::None);
        assert_eq!(recovery.to_string(), "!");
    }

    #[test]
    fn test_constructed_recoveries_are_set() {
        for recovery in samples().into_iter().skip(1) {
            assert!(recovery.is_set(), "{recovery}");
            assert!(!(!recovery), "{recovery}");
        }
    }

    #[test]
    fn test_gpr_formats() {
        let cases = [
            (DataFormat::Int32, ValueRecoveryTechnique::UnboxedInt32InGpr),
            (DataFormat::Cell, ValueRecoveryTechnique::UnboxedCellInGpr),
            (DataFormat::Boolean, ValueRecoveryTechnique::UnboxedBooleanInGpr),
        ];
        for (format, technique) in cases {
            let recovery = ValueRecovery::in_gpr(Gpr::R12, format);
            assert_eq!(recovery.technique(), technique);
            assert_eq!(recovery.data_format(), format);
            assert!(recovery.is_in_gpr());
            assert!(recovery.is_in_registers());
            assert!(!recovery.is_in_fpr());
            assert!(!recovery.is_in_js_stack());
            assert_eq!(recovery.gpr(), Gpr::R12);
        }
    }

    #[cfg(not(feature = "jsvalue32_64"))]
    #[test]
    fn test_wide_gpr_formats() {
        let boxed = ValueRecovery::in_gpr(Gpr::RSI, DataFormat::JsInt32);
        assert_eq!(boxed.technique(), ValueRecoveryTechnique::InGpr);
        assert_eq!(boxed.data_format(), DataFormat::Js);
        assert!(boxed.is_in_js_value_regs());

        let int52 = ValueRecovery::in_gpr(Gpr::RSI, DataFormat::Int52);
        assert_eq!(int52.technique(), ValueRecoveryTechnique::UnboxedInt52InGpr);
        let strict = ValueRecovery::in_gpr(Gpr::RSI, DataFormat::StrictInt52);
        assert_eq!(strict.technique(), ValueRecoveryTechnique::UnboxedStrictInt52InGpr);
        assert_eq!(strict.data_format(), DataFormat::StrictInt52);
    }

    #[test]
    #[should_panic(expected = "needs a data format")]
    fn test_gpr_without_format_panics() {
        ValueRecovery::in_gpr(Gpr::RAX, DataFormat::None);
    }

    #[test]
    fn test_fpr_formats() {
        let double = ValueRecovery::in_fpr(Fpr::XMM2, DataFormat::Double);
        assert_eq!(double.technique(), ValueRecoveryTechnique::UnboxedDoubleInFpr);
        assert_eq!(double.data_format(), DataFormat::Double);
        assert_eq!(double.fpr(), Fpr::XMM2);

        let boxed = ValueRecovery::in_fpr(Fpr::XMM2, DataFormat::JsDouble);
        assert_eq!(boxed.technique(), ValueRecoveryTechnique::InFpr);
        assert_eq!(boxed.data_format(), DataFormat::Js);
        assert!(boxed.is_in_registers());
        assert!(!boxed.is_in_gpr());
    }

    #[test]
    #[should_panic(expected = "cannot live in a float register")]
    fn test_fpr_rejects_int32() {
        ValueRecovery::in_fpr(Fpr::XMM0, DataFormat::Int32);
    }

    #[test]
    fn test_in_register_dispatches() {
        let recovery = ValueRecovery::in_register(Reg::Fpr(Fpr::XMM3), DataFormat::Double);
        assert!(recovery.is_in_fpr());
        let recovery = ValueRecovery::in_register(Reg::Gpr(Gpr::RDI), DataFormat::Int32);
        assert!(recovery.is_in_gpr());
    }

    #[test]
    fn test_displaced_formats() {
        use ValueRecoveryTechnique as T;
        let cases = [
            (DataFormat::Js, T::DisplacedInJsStack, DataFormat::Js),
            (DataFormat::JsCell, T::DisplacedInJsStack, DataFormat::Js),
            (DataFormat::Dead, T::DisplacedInJsStack, DataFormat::Js),
            (DataFormat::Int32, T::Int32DisplacedInJsStack, DataFormat::Int32),
            (DataFormat::Int52, T::Int52DisplacedInJsStack, DataFormat::Int52),
            (DataFormat::StrictInt52, T::StrictInt52DisplacedInJsStack, DataFormat::StrictInt52),
            (DataFormat::Double, T::DoubleDisplacedInJsStack, DataFormat::Double),
            (DataFormat::Cell, T::CellDisplacedInJsStack, DataFormat::Cell),
            (DataFormat::Boolean, T::BooleanDisplacedInJsStack, DataFormat::Boolean),
        ];
        for (format, technique, reported) in cases {
            let recovery = stack(-7, format);
            assert_eq!(recovery.technique(), technique, "{format}");
            assert_eq!(recovery.data_format(), reported, "{format}");
            assert!(recovery.is_in_js_stack());
            assert!(!recovery.is_in_registers());
            assert_eq!(recovery.virtual_register(), VirtualRegister::new(-7));
        }
    }

    #[test]
    #[should_panic(expected = "cannot be displaced")]
    fn test_displaced_storage_panics() {
        stack(-1, DataFormat::Storage);
    }

    #[test]
    fn test_displaced_int32_scenario() {
        let recovery = stack(4, DataFormat::Int32);
        assert_eq!(recovery.technique(), ValueRecoveryTechnique::Int32DisplacedInJsStack);
        assert_eq!(recovery.data_format(), DataFormat::Int32);
        assert!(recovery.is_in_js_stack());
        assert_eq!(recovery.virtual_register().offset(), 4);

        let shifted = recovery.with_locals_offset(-2);
        assert_eq!(shifted.virtual_register().offset(), 2);
        assert_eq!(shifted.technique(), recovery.technique());
    }

    #[test]
    fn test_with_locals_offset_laws() {
        for recovery in samples() {
            assert_eq!(recovery.with_locals_offset(0), recovery);
            assert_eq!(
                recovery.with_locals_offset(3).with_locals_offset(-5),
                recovery.with_locals_offset(-2)
            );
            if !recovery.is_in_js_stack() {
                assert_eq!(recovery.with_locals_offset(11), recovery);
            }
        }
    }

    #[test]
    fn test_constant_and_arguments() {
        let constant = ValueRecovery::constant(JsValue::double(2.5));
        assert!(constant.is_constant());
        assert_eq!(constant.data_format(), DataFormat::Js);
        assert_eq!(constant.constant_value(), JsValue::double(2.5));

        let direct = ValueRecovery::direct_arguments_that_were_not_created(MinifiedId::new(9));
        assert_eq!(direct.technique(), ValueRecoveryTechnique::DirectArgumentsThatWereNotCreated);
        assert_eq!(direct.data_format(), DataFormat::None);
        assert_eq!(direct.node_id(), MinifiedId::new(9));

        let cloned = ValueRecovery::cloned_arguments_that_were_not_created(MinifiedId::new(9));
        assert_eq!(cloned.technique(), ValueRecoveryTechnique::ClonedArgumentsThatWereNotCreated);
        assert_ne!(direct, cloned);
    }

    #[test]
    #[should_panic(expected = "is not in a general register")]
    fn test_wrong_accessor_panics() {
        stack(-1, DataFormat::Int32).gpr();
    }

    #[test]
    fn test_data_format_is_none_only_without_a_value() {
        for recovery in samples() {
            let none = recovery.data_format() == DataFormat::None;
            let expected = matches!(
                recovery.technique(),
                ValueRecoveryTechnique::DontKnow
                    | ValueRecoveryTechnique::DirectArgumentsThatWereNotCreated
                    | ValueRecoveryTechnique::ClonedArgumentsThatWereNotCreated
            );
            assert_eq!(none, expected, "{recovery}");
        }
    }

    #[test]
    fn test_for_each_reg() {
        let mut seen = Vec::new();
        ValueRecovery::in_gpr(Gpr::R10, DataFormat::Int32).for_each_reg(|reg| seen.push(reg));
        ValueRecovery::in_fpr(Fpr::XMM1, DataFormat::Double).for_each_reg(|reg| seen.push(reg));
        stack(-1, DataFormat::Int32).for_each_reg(|reg| seen.push(reg));
        ValueRecovery::constant(JsValue::null()).for_each_reg(|reg| seen.push(reg));
        assert_eq!(seen, vec![Reg::Gpr(Gpr::R10), Reg::Fpr(Fpr::XMM1)]);
    }

    #[test]
    fn test_dump_notation() {
        let dumped: Vec<String> = [
            ValueRecovery::in_gpr(Gpr::RAX, DataFormat::Int32),
            ValueRecovery::in_fpr(Fpr::XMM0, DataFormat::Double),
            stack(-4, DataFormat::Js),
            stack(6, DataFormat::Double),
            ValueRecovery::constant(JsValue::int32(5)),
            ValueRecovery::direct_arguments_that_were_not_created(MinifiedId::new(7)),
        ]
        .iter()
        .map(ToString::to_string)
        .collect();
        assert_eq!(
            dumped,
            vec!["int32(rax)", "double(xmm0)", "*loc3", "*double(arg1)", "[Int32: 5]", "DirectArguments(@7)"]
        );
    }

    #[test]
    fn test_dump_in_context_names_constants() {
        let mut context = DumpContext::new();
        let mut out = String::new();
        for recovery in [
            ValueRecovery::constant(JsValue::int32(1)),
            ValueRecovery::constant(JsValue::null()),
            ValueRecovery::constant(JsValue::int32(1)),
        ] {
            recovery.dump_in_context(&mut out, Some(&mut context)).unwrap();
            out.push(' ');
        }
        assert_eq!(out, "[c0] [c1] [c0] ");
        assert_eq!(context.legend(), "c0 = Int32: 1\nc1 = Null\n");
    }

    #[test]
    fn test_recover_from_stack() {
        let heap = Heap::new();
        let cell = heap.allocate_cell();
        let mut frame = CallFrame::new(&heap, 8, 1);
        frame.set_slot(VirtualRegister::local(0), Register::from_js_value(JsValue::null()));
        frame.set_slot(VirtualRegister::local(1), Register::from_int32(-12));
        frame.set_slot(VirtualRegister::local(2), Register::from_int52(1 << 40));
        frame.set_slot(VirtualRegister::local(3), Register::from_strict_int52(77));
        frame.set_slot(VirtualRegister::local(4), Register::from_double(0.25));
        frame.set_slot(VirtualRegister::local(5), Register::from_cell(cell));
        frame.set_slot(VirtualRegister::local(6), Register::from_double(3.0));

        let recover = |index, format| {
            ValueRecovery::displaced_in_js_stack(VirtualRegister::local(index), format).recover(&frame)
        };
        assert_eq!(recover(0, DataFormat::Js), JsValue::null());
        assert_eq!(recover(1, DataFormat::Int32), JsValue::int32(-12));
        assert_eq!(recover(2, DataFormat::Int52), JsValue::double((1i64 << 40) as f64));
        assert_eq!(recover(3, DataFormat::StrictInt52), JsValue::int32(77));
        assert_eq!(recover(4, DataFormat::Double), JsValue::double(0.25));
        assert_eq!(recover(5, DataFormat::Cell), JsValue::cell(cell));
        assert_eq!(recover(6, DataFormat::Double), JsValue::int32(3));
    }

    #[test]
    fn test_recover_from_registers() {
        let heap = Heap::new();
        let mut frame = CallFrame::new(&heap, 0, 1);
        frame.set_gpr(Gpr::RAX, (-3i32) as u32 as u64);
        frame.set_gpr(Gpr::RCX, 1);
        frame.set_fpr(Fpr::XMM0, f64::from_bits(0x7ff8_dead_beef_0001));

        let int32 = ValueRecovery::in_gpr(Gpr::RAX, DataFormat::Int32).recover(&frame);
        assert_eq!(int32, JsValue::int32(-3));
        let boolean = ValueRecovery::in_gpr(Gpr::RCX, DataFormat::Boolean).recover(&frame);
        assert_eq!(boolean, JsValue::boolean(true));
        let nan = ValueRecovery::in_fpr(Fpr::XMM0, DataFormat::Double).recover(&frame);
        assert_eq!(nan, JsValue::double(f64::NAN));
    }

    #[test]
    fn test_recover_constant_and_arguments() {
        let heap = Heap::new();
        let frame = CallFrame::new(&heap, 0, 2);
        let constant = ValueRecovery::constant(JsValue::boolean(false));
        assert_eq!(constant.recover(&frame), JsValue::boolean(false));

        let arguments = ValueRecovery::cloned_arguments_that_were_not_created(MinifiedId::new(2));
        let object = arguments.recover(&frame);
        assert!(object.is_cell());
        let materialized = frame.materialized_arguments();
        assert_eq!(materialized[0].kind, ArgumentsKind::Cloned);
    }

    #[test]
    #[should_panic(expected = "no recovery recorded")]
    fn test_recover_dont_know_panics() {
        let heap = Heap::new();
        let frame = CallFrame::new(&heap, 0, 1);
        ValueRecovery::default().recover(&frame);
    }

    #[cfg(feature = "jsvalue32_64")]
    #[test]
    fn test_pair() {
        let pair = ValueRecovery::in_pair(Gpr::RDX, Gpr::RAX);
        assert!(pair.is_in_js_value_regs());
        assert!(!pair.is_in_gpr());
        assert!(pair.is_in_registers());
        assert_eq!(pair.tag_gpr(), Gpr::RDX);
        assert_eq!(pair.payload_gpr(), Gpr::RAX);
        let mut seen = Vec::new();
        pair.for_each_reg(|reg| seen.push(reg));
        assert_eq!(seen, vec![Reg::Gpr(Gpr::RAX), Reg::Gpr(Gpr::RDX)]);

        let tag = ValueRecovery::callee_save_gpr_displaced_in_js_stack(VirtualRegister::local(0), true);
        assert_eq!(tag.technique(), ValueRecoveryTechnique::Int32TagDisplacedInJsStack);
        assert_eq!(tag.with_locals_offset(-1).virtual_register(), VirtualRegister::local(1));
    }
}
