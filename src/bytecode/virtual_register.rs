//! Bytecode virtual registers
//!
//! A virtual register is a signed offset from the call frame base. Locals
//! grow downward (`loc0` is offset -1), the call frame header occupies
//! offsets 0..5, arguments start at the `this` slot, and offsets at or above
//! [`FIRST_CONSTANT_REGISTER_INDEX`] name entries in the constant pool.

use std::fmt;
use std::ops::{Add, Sub};

/// Offset of the `this` argument (first slot after the call frame header)
pub const THIS_ARGUMENT_OFFSET: i32 = 5;

/// Number of call frame header slots
pub const CALL_FRAME_HEADER_SIZE: i32 = THIS_ARGUMENT_OFFSET;

/// First offset naming a constant pool entry
pub const FIRST_CONSTANT_REGISTER_INDEX: i32 = 0x4000_0000;

const INVALID_OFFSET: i32 = 0x3fff_ffff;

/// A bytecode-level storage slot
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VirtualRegister(i32);

impl VirtualRegister {
    /// Wrap a raw frame offset
    pub const fn new(offset: i32) -> Self {
        Self(offset)
    }

    pub const fn invalid() -> Self {
        Self(INVALID_OFFSET)
    }

    /// The register holding local `index`
    pub const fn local(index: u32) -> Self {
        Self(-1 - index as i32)
    }

    /// The register holding argument `index` (0 is `this`)
    pub const fn argument(index: u32) -> Self {
        Self(THIS_ARGUMENT_OFFSET + index as i32)
    }

    pub const fn this_argument() -> Self {
        Self::argument(0)
    }

    /// The register naming constant pool entry `index`
    pub const fn constant(index: u32) -> Self {
        Self(FIRST_CONSTANT_REGISTER_INDEX + index as i32)
    }

    pub const fn offset(self) -> i32 {
        self.0
    }

    /// Shift by `delta` slots, or `None` if the offset leaves the `i32` range
    pub fn checked_add(self, delta: i32) -> Option<Self> {
        self.0.checked_add(delta).map(VirtualRegister)
    }

    pub const fn is_valid(self) -> bool {
        self.0 != INVALID_OFFSET
    }

    pub const fn is_local(self) -> bool {
        self.0 < 0
    }

    pub const fn is_header(self) -> bool {
        self.0 >= 0 && self.0 < CALL_FRAME_HEADER_SIZE
    }

    pub const fn is_argument(self) -> bool {
        self.0 >= THIS_ARGUMENT_OFFSET && self.0 < FIRST_CONSTANT_REGISTER_INDEX && self.is_valid()
    }

    pub const fn is_constant(self) -> bool {
        self.0 >= FIRST_CONSTANT_REGISTER_INDEX
    }

    /// Local index of this register
    pub fn to_local(self) -> u32 {
        assert!(self.is_local(), "{self:?} is not a local");
        (-1 - self.0) as u32
    }

    /// Argument index of this register (0 is `this`)
    pub fn to_argument(self) -> u32 {
        assert!(self.is_argument(), "{self:?} is not an argument");
        (self.0 - THIS_ARGUMENT_OFFSET) as u32
    }

    pub fn to_constant_index(self) -> u32 {
        assert!(self.is_constant(), "{self:?} is not a constant");
        (self.0 - FIRST_CONSTANT_REGISTER_INDEX) as u32
    }
}

impl Default for VirtualRegister {
    fn default() -> Self {
        Self::invalid()
    }
}

impl Add<i32> for VirtualRegister {
    type Output = VirtualRegister;

    fn add(self, rhs: i32) -> VirtualRegister {
        self.checked_add(rhs)
            .unwrap_or_else(|| panic!("{self} shifted by {rhs} overflows the frame"))
    }
}

impl Sub<i32> for VirtualRegister {
    type Output = VirtualRegister;

    fn sub(self, rhs: i32) -> VirtualRegister {
        match self.0.checked_sub(rhs) {
            Some(offset) => VirtualRegister(offset),
            None => panic!("{self} minus {rhs} overflows the frame"),
        }
    }
}

impl fmt::Display for VirtualRegister {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.is_valid() {
            write!(f, "<invalid>")
        } else if self.is_header() {
            write!(f, "head{}", self.0)
        } else if self.is_constant() {
            write!(f, "const{}", self.to_constant_index())
        } else if self.is_local() {
            write!(f, "loc{}", self.to_local())
        } else if self.to_argument() == 0 {
            write!(f, "this")
        } else {
            write!(f, "arg{}", self.to_argument())
        }
    }
}

impl fmt::Debug for VirtualRegister {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VirtualRegister({}: {})", self.0, self)
    }
}
