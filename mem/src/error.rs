//! Resource manager error types

use core::fmt;

/// Errors raised by the resource manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemError {
    /// Every pool (free-list and bump path) is exhausted
    OutOfMemory { size: u32 },
    /// The allocation log is full
    TooManyAllocations,
    /// Alignment is not a power of two
    InvalidAlignment,
    /// A bank for this role is already resolved
    BankExists,
    /// A host claim overlaps memory that bank restoration will overwrite
    Overlap { addr: u32, size: u32 },
}

impl MemError {
    /// Get a human-readable description of the error
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::OutOfMemory { .. } => "Out of memory",
            Self::TooManyAllocations => "Too many allocations",
            Self::InvalidAlignment => "Invalid alignment",
            Self::BankExists => "Memory bank already resolved",
            Self::Overlap { .. } => "Allocation overlaps restored memory",
        }
    }
}

impl fmt::Display for MemError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfMemory { size } => write!(f, "{} ({} bytes)", self.as_str(), size),
            Self::Overlap { addr, size } => write!(
                f,
                "{} ({:08x}-{:08x})",
                self.as_str(),
                addr,
                addr.wrapping_add(size.saturating_sub(1))
            ),
            _ => f.write_str(self.as_str()),
        }
    }
}
