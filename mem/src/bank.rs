//! Memory banks: the snapshot's RAM, one per role.

use revive_chunk::RamChunk;

use crate::host::AddrRange;

/// Role of a memory bank. Same set as the memory chunk tags.
pub type BankRole = RamChunk;

/// A resolved memory bank.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryBank {
    pub role: BankRole,
    /// Where the bank is restored
    pub target_addr: u32,
    /// Space available at the target, natively or synthesized
    pub target_size: u32,
    /// Inflated size of the snapshot RAM
    pub required_size: u32,
    /// Payload length of the chunk on disk
    pub chunk_len: u32,
    /// File offset of the chunk header
    pub offset: u32,
    pub compressed: bool,
    /// Staging buffer holding header + payload after Pass 2
    pub source: Option<u32>,
    /// Whether any of the target range was synthesized by the MMU
    pub synthesized: bool,
}

impl MemoryBank {
    pub fn new(role: BankRole) -> Self {
        Self {
            role,
            target_addr: role.target_address(),
            target_size: 0,
            required_size: 0,
            chunk_len: 0,
            offset: 0,
            compressed: false,
            source: None,
            synthesized: false,
        }
    }

    /// Range the takeover overwrites.
    pub fn restore_range(&self) -> AddrRange {
        AddrRange::new(self.target_addr, self.required_size)
    }

    /// Header + payload, the size of the staging buffer.
    pub fn staged_len(&self) -> u32 {
        self.chunk_len.saturating_add(revive_chunk::HEADER_LEN)
    }
}

/// At most one bank per role, plus the host region each role owns.
#[derive(Debug, Default, Clone)]
pub struct BankTable {
    banks: [Option<MemoryBank>; 3],
    regions: [Option<AddrRange>; 3],
}

impl BankTable {
    pub const fn new() -> Self {
        Self {
            banks: [None; 3],
            regions: [None; 3],
        }
    }

    pub fn get(&self, role: BankRole) -> Option<&MemoryBank> {
        self.banks[role.index()].as_ref()
    }

    pub fn get_mut(&mut self, role: BankRole) -> Option<&mut MemoryBank> {
        self.banks[role.index()].as_mut()
    }

    /// Install a bank. `false` if the role already has one.
    pub fn insert(&mut self, bank: MemoryBank) -> bool {
        let slot = &mut self.banks[bank.role.index()];
        if slot.is_some() {
            return false;
        }
        *slot = Some(bank);
        true
    }

    pub fn claim_region(&mut self, role: BankRole, range: AddrRange) {
        self.regions[role.index()] = Some(range);
    }

    pub fn claimed_region(&self, role: BankRole) -> Option<AddrRange> {
        self.regions[role.index()]
    }

    /// Whether a host region (by rounded start) belongs to any bank.
    pub fn owns_region(&self, start: u32) -> bool {
        self.regions.iter().flatten().any(|r| r.start == start)
    }

    /// Resolved banks in restore order (chip, slow, fast).
    pub fn iter(&self) -> impl Iterator<Item = &MemoryBank> {
        self.banks.iter().flatten()
    }
}
