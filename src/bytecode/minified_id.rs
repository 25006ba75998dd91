use std::fmt;

/// Compact reference to an optimizer node that survives into OSR exit
/// metadata after the graph itself is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MinifiedId(u32);

impl MinifiedId {
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }
}

impl fmt::Display for MinifiedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}
