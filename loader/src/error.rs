//! Restore error taxonomy

use core::fmt;

use revive_chunk::{ChunkError, Tag};
use revive_mem::{BankRole, MemError};
use revive_mmu::MmuError;

/// Malformed or foreign input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatError {
    /// First chunk is not `ASF `
    NotStatefile,
    /// Stream ended before `END `
    Truncated,
    /// Second memory chunk for the same bank
    DuplicateBank(BankRole),
}

/// Something the snapshot uses that cannot be put back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feature {
    /// Deny-listed chunk
    Chunk(Tag),
    /// Snapshot has an FPU, the machine does not
    Fpu,
}

/// What ran out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shortage {
    /// A bank's address range can't be provided natively or by the MMU
    Bank(BankRole),
    /// No spare pool of at least 512KB
    WorkingMemory,
    /// MMU tables or remap backing sit where a bank will be restored
    RestoreOverlap { addr: u32, size: u32 },
    /// No memory for MMU descriptor tables
    MmuTables,
}

/// Everything that can stop a restore.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreError {
    Format(FormatError),
    UnsupportedFeature(Feature),
    InsufficientResources(Shortage),
    /// An MMU mapping was not page aligned
    Alignment(MmuError),
    /// Short read from the statefile
    Read(ChunkError),
    OutOfMemory { size: u32 },
    /// A pass finished with errors recorded
    Failed { pass: u8, errors: u32 },
}

impl RestoreError {
    /// Get a human-readable description of the error
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Format(FormatError::NotStatefile) => "Not a statefile",
            Self::Format(FormatError::Truncated) => "Statefile ends without END chunk",
            Self::Format(FormatError::DuplicateBank(_)) => "Duplicate memory chunk",
            Self::UnsupportedFeature(Feature::Chunk(_)) => "Unsupported chunk",
            Self::UnsupportedFeature(Feature::Fpu) => "FPU required",
            Self::InsufficientResources(Shortage::Bank(_)) => "Not enough RAM available",
            Self::InsufficientResources(Shortage::WorkingMemory) => {
                "At least 512k RAM not used by statefile required"
            }
            Self::InsufficientResources(Shortage::RestoreOverlap { .. }) => {
                "MMU memory overlaps restored RAM"
            }
            Self::InsufficientResources(Shortage::MmuTables) => "MMU page table allocation failed",
            Self::Alignment(_) => "Misaligned MMU mapping",
            Self::Read(_) => "Read error",
            Self::OutOfMemory { .. } => "Out of memory",
            Self::Failed { .. } => "Pass failed",
        }
    }
}

impl fmt::Display for RestoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Format(FormatError::DuplicateBank(role)) => {
                write!(f, "{} ('{}')", self.as_str(), role.tag())
            }
            Self::UnsupportedFeature(Feature::Chunk(tag)) => write!(f, "{} '{}'", self.as_str(), tag),
            Self::InsufficientResources(Shortage::Bank(role)) => {
                write!(f, "Not enough {} available", role.name())
            }
            Self::InsufficientResources(Shortage::RestoreOverlap { addr, size }) => write!(
                f,
                "{} ({:08x}-{:08x})",
                self.as_str(),
                addr,
                addr.wrapping_add(size.saturating_sub(1))
            ),
            Self::Alignment(e) => write!(f, "{}", e),
            Self::Read(e) => write!(f, "{}", e),
            Self::OutOfMemory { size } => write!(f, "{} ({} bytes)", self.as_str(), size),
            Self::Failed { pass, errors } => write!(f, "Pass #{} failed ({} errors)", pass, errors),
            _ => f.write_str(self.as_str()),
        }
    }
}

impl From<ChunkError> for RestoreError {
    fn from(e: ChunkError) -> Self {
        Self::Read(e)
    }
}

impl From<MmuError> for RestoreError {
    fn from(e: MmuError) -> Self {
        match e {
            MmuError::Misaligned { .. } => Self::Alignment(e),
            MmuError::OutOfDescriptorMemory => Self::InsufficientResources(Shortage::MmuTables),
        }
    }
}

impl From<MemError> for RestoreError {
    fn from(e: MemError) -> Self {
        match e {
            MemError::Overlap { addr, size } => {
                Self::InsufficientResources(Shortage::RestoreOverlap { addr, size })
            }
            MemError::OutOfMemory { size } => Self::OutOfMemory { size },
            _ => Self::OutOfMemory { size: 0 },
        }
    }
}

/// Hardware differences that are reported but do not stop a restore.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompatWarning {
    Cpu { snapshot: u32, host: u32 },
    Fpu { snapshot: u32, host: u32 },
    AgaOnOcsEcs,
    OcsEcsOnAga,
    NtscOnOcsPal,
    PalOnOcsNtsc,
    Rom { snapshot: (u16, u16), host: (u16, u16) },
    SystemType { snapshot: &'static str, host: &'static str },
    /// Chip RAM synthesized by the MMU is invisible to the chipset
    ChipRamRemapped,
}

impl fmt::Display for CompatWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cpu { snapshot, host } => {
                write!(f, "{} CPU statefile but system has {} CPU.", snapshot, host)
            }
            Self::Fpu { snapshot, host } => {
                write!(f, "{} FPU statefile but system has {} FPU.", snapshot, host)
            }
            Self::AgaOnOcsEcs => f.write_str("AGA statefile but system is OCS/ECS."),
            Self::OcsEcsOnAga => f.write_str("OCS/ECS statefile but system is AGA."),
            Self::NtscOnOcsPal => f.write_str("NTSC statefile but system is OCS PAL."),
            Self::PalOnOcsNtsc => f.write_str("PAL statefile but system is OCS NTSC."),
            Self::Rom { snapshot, host } => write!(
                f,
                "ROM version mismatch: {}.{}. System ROM: {}.{}",
                snapshot.0, snapshot.1, host.0, host.1
            ),
            Self::SystemType { snapshot, host } => {
                write!(f, "{} statefile but system is {}.", snapshot, host)
            }
            Self::ChipRamRemapped => {
                f.write_str("Part of Chip RAM remapped, custom chipset can't access it!!")
            }
        }
    }
}
