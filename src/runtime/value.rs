//! Boxed value encoding
//!
//! Values are NaN-boxed into 64 bits:
//!
//! | Pattern                               | Meaning              |
//! |---------------------------------------|----------------------|
//! | `0x0000_0000_0000_0000`               | empty                |
//! | `0x0000_xxxx_xxxx_xxx0` (non-zero)    | cell                 |
//! | `0x02` / `0x06` / `0x07` / `0x0a`     | null/false/true/undefined |
//! | `0x0002_...` through `0xfffd_...`     | double + 2^49        |
//! | `0xfffe_0000_xxxx_xxxx`               | int32                |
//!
//! The narrow representation (two 32-bit words, tag and payload) is decoded
//! by [`JsValue::from_tag_payload`].

use crate::gc::CellId;
use std::fmt;

/// Raw bits of a boxed value
pub type EncodedJsValue = u64;

/// Shift applied to 52-bit integers held in the unboxed `Int52` format
pub const INT52_SHIFT_AMOUNT: u32 = 12;

const NUMBER_TAG: u64 = 0xfffe_0000_0000_0000;
const DOUBLE_ENCODE_OFFSET: u64 = 1 << 49;
const OTHER_TAG: u64 = 0x2;
const BOOL_TAG: u64 = 0x4;
const UNDEFINED_TAG: u64 = 0x8;
const VALUE_FALSE: u64 = OTHER_TAG | BOOL_TAG;
const VALUE_TRUE: u64 = VALUE_FALSE | 1;
const VALUE_UNDEFINED: u64 = OTHER_TAG | UNDEFINED_TAG;
const VALUE_NULL: u64 = OTHER_TAG;
const VALUE_EMPTY: u64 = 0;
const NOT_CELL_MASK: u64 = NUMBER_TAG | OTHER_TAG;

/// Tags of the narrow representation
pub mod narrow_tag {
    pub const INT32: u32 = 0xffff_ffff;
    pub const BOOLEAN: u32 = 0xffff_fffe;
    pub const NULL: u32 = 0xffff_fffd;
    pub const UNDEFINED: u32 = 0xffff_fffc;
    pub const CELL: u32 = 0xffff_fffb;
    pub const EMPTY: u32 = 0xffff_fffa;
    pub const DELETED: u32 = 0xffff_fff9;
    /// Any tag below this is the high word of a double
    pub const LOWEST: u32 = DELETED;
}

/// Canonicalize NaNs so an impure NaN can never alias a tagged value
pub fn purify_nan(value: f64) -> f64 {
    if value.is_nan() {
        f64::NAN
    } else {
        value
    }
}

/// A boxed runtime value
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct JsValue(EncodedJsValue);

impl JsValue {
    pub const fn encode(self) -> EncodedJsValue {
        self.0
    }

    pub const fn decode(bits: EncodedJsValue) -> Self {
        Self(bits)
    }

    pub const fn empty() -> Self {
        Self(VALUE_EMPTY)
    }

    pub const fn undefined() -> Self {
        Self(VALUE_UNDEFINED)
    }

    pub const fn null() -> Self {
        Self(VALUE_NULL)
    }

    pub const fn boolean(value: bool) -> Self {
        Self(if value { VALUE_TRUE } else { VALUE_FALSE })
    }

    pub const fn int32(value: i32) -> Self {
        Self(NUMBER_TAG | value as u32 as u64)
    }

    /// Box a double without trying the int32 form
    pub fn double(value: f64) -> Self {
        Self(purify_nan(value).to_bits().wrapping_add(DOUBLE_ENCODE_OFFSET))
    }

    /// Box a number, preferring the int32 form when it is exact
    pub fn number(value: f64) -> Self {
        let truncated = value as i32;
        if truncated as f64 == value && !(value == 0.0 && value.is_sign_negative()) {
            Self::int32(truncated)
        } else {
            Self::double(value)
        }
    }

    /// Box an integer, preferring the int32 form when it fits
    pub fn number_from_i64(value: i64) -> Self {
        match i32::try_from(value) {
            Ok(small) => Self::int32(small),
            Err(_) => Self::double(value as f64),
        }
    }

    pub fn cell(cell: CellId) -> Self {
        Self(cell.to_bits())
    }

    /// Decode the narrow (tag, payload) representation
    pub fn from_tag_payload(tag: u32, payload: u32) -> Self {
        match tag {
            narrow_tag::INT32 => Self::int32(payload as i32),
            narrow_tag::BOOLEAN => Self::boolean(payload != 0),
            narrow_tag::NULL => Self::null(),
            narrow_tag::UNDEFINED => Self::undefined(),
            narrow_tag::CELL => Self::cell(CellId::from_bits(payload as u64)),
            narrow_tag::EMPTY | narrow_tag::DELETED => Self::empty(),
            _ => Self::double(f64::from_bits(((tag as u64) << 32) | payload as u64)),
        }
    }

    pub const fn is_empty(self) -> bool {
        self.0 == VALUE_EMPTY
    }

    pub const fn is_undefined(self) -> bool {
        self.0 == VALUE_UNDEFINED
    }

    pub const fn is_null(self) -> bool {
        self.0 == VALUE_NULL
    }

    pub const fn is_boolean(self) -> bool {
        (self.0 & !1) == VALUE_FALSE
    }

    pub const fn is_int32(self) -> bool {
        (self.0 & NUMBER_TAG) == NUMBER_TAG
    }

    pub const fn is_number(self) -> bool {
        self.0 & NUMBER_TAG != 0
    }

    pub const fn is_double(self) -> bool {
        self.is_number() && !self.is_int32()
    }

    pub const fn is_cell(self) -> bool {
        self.0 & NOT_CELL_MASK == 0 && self.0 != VALUE_EMPTY
    }

    pub fn as_int32(self) -> i32 {
        assert!(self.is_int32(), "{self:?} is not an int32");
        self.0 as u32 as i32
    }

    pub fn as_double(self) -> f64 {
        assert!(self.is_double(), "{self:?} is not a double");
        f64::from_bits(self.0.wrapping_sub(DOUBLE_ENCODE_OFFSET))
    }

    /// Numeric value of an int32 or double
    pub fn as_number(self) -> f64 {
        if self.is_int32() {
            self.as_int32() as f64
        } else {
            self.as_double()
        }
    }

    pub fn as_boolean(self) -> bool {
        assert!(self.is_boolean(), "{self:?} is not a boolean");
        self.0 == VALUE_TRUE
    }

    pub fn as_cell(self) -> CellId {
        assert!(self.is_cell(), "{self:?} is not a cell");
        CellId::from_bits(self.0)
    }
}

impl Default for JsValue {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Display for JsValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            write!(f, "<JSValue()>")
        } else if self.is_int32() {
            write!(f, "Int32: {}", self.as_int32())
        } else if self.is_double() {
            write!(f, "Double: {}", self.as_double())
        } else if self.is_cell() {
            write!(f, "Cell: {}", self.as_cell())
        } else if self.is_boolean() {
            write!(f, "{}", if self.as_boolean() { "True" } else { "False" })
        } else if self.is_null() {
            write!(f, "Null")
        } else if self.is_undefined() {
            write!(f, "Undefined")
        } else {
            write!(f, "INVALID: {:#018x}", self.0)
        }
    }
}

impl fmt::Debug for JsValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "JsValue({:#018x}: {})", self.0, self)
    }
}
