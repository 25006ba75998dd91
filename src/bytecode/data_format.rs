//! Data formats
//!
//! How a value is represented in a machine register or stack slot. The
//! unboxed formats occupy the low bits; [`DataFormat::Js`] is a flag that
//! marks a boxed value, optionally combined with the type it is known to
//! hold.

use std::fmt;

const JS_FLAG: u8 = 8;

/// Representation of a value in a register or stack slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DataFormat {
    None = 0,
    Int32 = 1,
    /// 52-bit integer, shifted left by [`crate::runtime::INT52_SHIFT_AMOUNT`]
    Int52 = 2,
    /// 52-bit integer, not shifted
    StrictInt52 = 3,
    Double = 4,
    Boolean = 5,
    Cell = 6,
    Storage = 7,
    Js = JS_FLAG,
    JsInt32 = JS_FLAG | 1,
    JsDouble = JS_FLAG | 4,
    JsBoolean = JS_FLAG | 5,
    JsCell = JS_FLAG | 6,
    /// OSR-only: the value is dead and recovers as `undefined`
    Dead = 33,
}

impl DataFormat {
    /// Whether the value is boxed
    pub const fn is_js(self) -> bool {
        (self as u8) & JS_FLAG != 0 && (self as u8) < 32
    }

    pub const fn name(self) -> &'static str {
        match self {
            DataFormat::None => "None",
            DataFormat::Int32 => "Int32",
            DataFormat::Int52 => "Int52",
            DataFormat::StrictInt52 => "StrictInt52",
            DataFormat::Double => "Double",
            DataFormat::Boolean => "Boolean",
            DataFormat::Cell => "Cell",
            DataFormat::Storage => "Storage",
            DataFormat::Js => "JS",
            DataFormat::JsInt32 => "JSInt32",
            DataFormat::JsDouble => "JSDouble",
            DataFormat::JsBoolean => "JSBoolean",
            DataFormat::JsCell => "JSCell",
            DataFormat::Dead => "Dead",
        }
    }
}

impl fmt::Display for DataFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
