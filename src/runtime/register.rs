use super::value::{EncodedJsValue, JsValue, INT52_SHIFT_AMOUNT};
use crate::gc::CellId;
use std::fmt;

/// One machine word of the interpreter's value stack.
///
/// Optimized code may leave a slot boxed or unboxed; the accessors reinterpret
/// the bits according to the format the code generator recorded.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Register(u64);

impl Register {
    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u64 {
        self.0
    }

    pub const fn from_js_value(value: JsValue) -> Self {
        Self(value.encode())
    }

    pub const fn from_int32(value: i32) -> Self {
        Self(value as u32 as u64)
    }

    /// Store a 52-bit integer in the shifted `Int52` format
    pub const fn from_int52(value: i64) -> Self {
        Self((value << INT52_SHIFT_AMOUNT) as u64)
    }

    pub const fn from_strict_int52(value: i64) -> Self {
        Self(value as u64)
    }

    pub fn from_double(value: f64) -> Self {
        Self(value.to_bits())
    }

    pub const fn from_cell(cell: CellId) -> Self {
        Self(cell.to_bits())
    }

    pub const fn from_boolean(value: bool) -> Self {
        Self(value as u64)
    }

    /// Build a slot from its narrow tag and payload halves
    pub const fn from_tag_payload(tag: u32, payload: u32) -> Self {
        Self(((tag as u64) << 32) | payload as u64)
    }

    pub const fn js_value(self) -> JsValue {
        JsValue::decode(self.0 as EncodedJsValue)
    }

    /// Low 32 bits
    pub const fn payload(self) -> u32 {
        self.0 as u32
    }

    /// High 32 bits
    pub const fn tag(self) -> u32 {
        (self.0 >> 32) as u32
    }

    pub const fn unboxed_int32(self) -> i32 {
        self.payload() as i32
    }

    pub const fn unboxed_int52(self) -> i64 {
        (self.0 as i64) >> INT52_SHIFT_AMOUNT
    }

    pub const fn unboxed_strict_int52(self) -> i64 {
        self.0 as i64
    }

    pub fn unboxed_double(self) -> f64 {
        f64::from_bits(self.0)
    }

    pub fn unboxed_cell(self) -> CellId {
        CellId::from_bits(self.0)
    }

    pub const fn unboxed_boolean(self) -> bool {
        self.payload() != 0
    }
}

impl fmt::Debug for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Register({:#018x})", self.0)
    }
}
