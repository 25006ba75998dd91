//! Machine register ids
//!
//! Register numbering follows x86-64: sixteen general-purpose registers and
//! sixteen vector registers used for doubles.

use std::fmt;

pub const NUMBER_OF_GPRS: usize = 16;
pub const NUMBER_OF_FPRS: usize = 16;

const GPR_NAMES: [&str; NUMBER_OF_GPRS] = [
    "rax", "rcx", "rdx", "rbx", "rsp", "rbp", "rsi", "rdi", "r8", "r9", "r10", "r11", "r12",
    "r13", "r14", "r15",
];

/// A general-purpose register
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Gpr(u8);

impl Gpr {
    pub const RAX: Gpr = Gpr(0);
    pub const RCX: Gpr = Gpr(1);
    pub const RDX: Gpr = Gpr(2);
    pub const RBX: Gpr = Gpr(3);
    pub const RSP: Gpr = Gpr(4);
    pub const RBP: Gpr = Gpr(5);
    pub const RSI: Gpr = Gpr(6);
    pub const RDI: Gpr = Gpr(7);
    pub const R8: Gpr = Gpr(8);
    pub const R9: Gpr = Gpr(9);
    pub const R10: Gpr = Gpr(10);
    pub const R11: Gpr = Gpr(11);
    pub const R12: Gpr = Gpr(12);
    pub const R13: Gpr = Gpr(13);
    pub const R14: Gpr = Gpr(14);
    pub const R15: Gpr = Gpr(15);

    pub fn new(index: u8) -> Self {
        assert!((index as usize) < NUMBER_OF_GPRS, "no general register {index}");
        Gpr(index)
    }

    pub const fn index(self) -> u8 {
        self.0
    }

    pub fn name(self) -> &'static str {
        GPR_NAMES[self.0 as usize]
    }
}

impl fmt::Display for Gpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl fmt::Debug for Gpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.name())
    }
}

/// A floating-point register
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fpr(u8);

impl Fpr {
    pub const XMM0: Fpr = Fpr(0);
    pub const XMM1: Fpr = Fpr(1);
    pub const XMM2: Fpr = Fpr(2);
    pub const XMM3: Fpr = Fpr(3);
    pub const XMM15: Fpr = Fpr(15);

    pub fn new(index: u8) -> Self {
        assert!((index as usize) < NUMBER_OF_FPRS, "no float register {index}");
        Fpr(index)
    }

    pub const fn index(self) -> u8 {
        self.0
    }
}

impl fmt::Display for Fpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "xmm{}", self.0)
    }
}

impl fmt::Debug for Fpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%xmm{}", self.0)
    }
}

/// Either kind of machine register
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reg {
    Gpr(Gpr),
    Fpr(Fpr),
}

impl Reg {
    pub const fn is_gpr(self) -> bool {
        matches!(self, Reg::Gpr(_))
    }

    pub const fn is_fpr(self) -> bool {
        matches!(self, Reg::Fpr(_))
    }
}

impl From<Gpr> for Reg {
    fn from(gpr: Gpr) -> Self {
        Reg::Gpr(gpr)
    }
}

impl From<Fpr> for Reg {
    fn from(fpr: Fpr) -> Self {
        Reg::Fpr(fpr)
    }
}

impl fmt::Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reg::Gpr(gpr) => gpr.fmt(f),
            Reg::Fpr(fpr) => fpr.fmt(f),
        }
    }
}
