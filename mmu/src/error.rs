//! MMU builder error types

use core::fmt;

/// Errors raised while building the translation tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MmuError {
    /// Address or size not a multiple of the page size; nothing was written
    Misaligned { virt: u32, phys: u32, size: u32 },
    /// No memory left for descriptor tables; earlier pages stay mapped
    OutOfDescriptorMemory,
}

impl MmuError {
    /// Get a human-readable description of the error
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Misaligned { .. } => "MMU mapping not page aligned",
            Self::OutOfDescriptorMemory => "Out of MMU descriptor memory",
        }
    }
}

impl fmt::Display for MmuError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Misaligned { virt, phys, size } => {
                write!(f, "{} ({:08x} -> {:08x}, {:x})", self.as_str(), virt, phys, size)
            }
            Self::OutOfDescriptorMemory => f.write_str(self.as_str()),
        }
    }
}
