//! Translation descriptors
//!
//! Every slot of the tree is one 32-bit long. The low two bits say what it
//! is; what the remaining bits mean depends on the MMU generation:
//!
//! ```text
//!            31            12 11 10  9  8  7  6  5  4  3  2  1  0
//! 68030 page ├─ phys page ──┤              CI          WP  0  1
//! 68040 page ├─ phys page ──┤     G        S  ─CM─      WP  1  1
//! 68030 tbl  ├─ next table address ─────────────────────────┤ 1  0
//! 68040 tbl  ├─ next table address ─────────────────────────┤ 1  1
//! invalid    0xDEAD0000 (any value with the low two bits clear)
//! ```

use bitflags::bitflags;

/// Written into every slot that maps nothing.
pub const INVALID_DESCRIPTOR: u32 = 0xDEAD_0000;

const PAGE_MASK: u32 = 0xfff;

bitflags! {
    /// Attribute bits of a page descriptor.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PageBits: u32 {
        /// 68030 page / low half of the 68040 resident code
        const PAGE_030 = 1 << 0;
        const TABLE_030 = 1 << 1;
        const RESIDENT = (1 << 0) | (1 << 1);
        const WRITE_PROTECT = 1 << 2;
        /// 68040 cache mode field
        const CACHE_MODE = 3 << 5;
        /// 68030 cache inhibit
        const CACHE_INHIBIT = 1 << 6;
        const SUPERVISOR = 1 << 7;
        const GLOBAL = 1 << 10;
    }
}

const CACHE_SHIFT: u32 = 5;

/// Descriptor format, picked from the host CPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MmuGeneration {
    /// 68030: cacheable or not, no supervisor or global bits
    Mmu030,
    /// 68040 and 68060
    Mmu040,
}

/// Cache mode of a page. Ordered: a later mapping may only raise it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
#[repr(u8)]
pub enum CacheMode {
    #[default]
    WriteThrough = 0,
    CopyBack = 1,
    Serialized = 2,
    NonCacheable = 3,
}

impl CacheMode {
    pub const fn from_bits(bits: u32) -> Self {
        match bits & 3 {
            0 => CacheMode::WriteThrough,
            1 => CacheMode::CopyBack,
            2 => CacheMode::Serialized,
            _ => CacheMode::NonCacheable,
        }
    }

    /// The 68030 can only inhibit caching.
    pub const fn inhibits_030(self) -> bool {
        matches!(self, CacheMode::Serialized | CacheMode::NonCacheable)
    }
}

/// Decoded level-C entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageDescriptor {
    pub phys: u32,
    pub write_protect: bool,
    pub supervisor: bool,
    pub cache: CacheMode,
    pub global: bool,
}

/// Decoded slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Descriptor {
    Invalid,
    /// Address of the next-level table
    Table(u32),
    Page(PageDescriptor),
}

/// Whether a raw slot is invalid.
#[inline]
pub const fn is_invalid(raw: u32) -> bool {
    raw & 3 == 0
}

impl Descriptor {
    /// Encode a table pointer.
    pub fn table(generation: MmuGeneration, addr: u32) -> u32 {
        match generation {
            MmuGeneration::Mmu030 => addr | PageBits::TABLE_030.bits(),
            MmuGeneration::Mmu040 => addr | PageBits::RESIDENT.bits(),
        }
    }

    /// Decode a level-A or level-B slot. `align_mask` strips the bits below
    /// the next table's alignment.
    pub fn decode_table(raw: u32, align_mask: u32) -> Descriptor {
        if is_invalid(raw) {
            Descriptor::Invalid
        } else {
            Descriptor::Table(raw & !align_mask)
        }
    }

    /// Decode a level-C slot.
    pub fn decode_page(generation: MmuGeneration, raw: u32) -> Descriptor {
        if is_invalid(raw) {
            return Descriptor::Invalid;
        }
        let bits = PageBits::from_bits_retain(raw);
        let cache = match generation {
            MmuGeneration::Mmu030 if bits.contains(PageBits::CACHE_INHIBIT) => CacheMode::NonCacheable,
            MmuGeneration::Mmu030 => CacheMode::WriteThrough,
            MmuGeneration::Mmu040 => CacheMode::from_bits(raw >> CACHE_SHIFT),
        };
        let is_040 = generation == MmuGeneration::Mmu040;
        Descriptor::Page(PageDescriptor {
            phys: raw & !PAGE_MASK,
            write_protect: bits.contains(PageBits::WRITE_PROTECT),
            supervisor: is_040 && bits.contains(PageBits::SUPERVISOR),
            cache,
            global: is_040 && bits.contains(PageBits::GLOBAL),
        })
    }
}

/// Requested page attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MapAttrs {
    pub write_protect: bool,
    pub supervisor: bool,
    pub cache: CacheMode,
}

impl MapAttrs {
    pub const fn cached(cache: CacheMode) -> Self {
        Self {
            write_protect: false,
            supervisor: false,
            cache,
        }
    }

    pub const fn with_write_protect(mut self, on: bool) -> Self {
        self.write_protect = on;
        self
    }

    pub const fn with_supervisor(mut self, on: bool) -> Self {
        self.supervisor = on;
        self
    }
}

/// Build the new level-C long for `phys`, merged with the slot's previous
/// contents so protection and caching never weaken.
///
/// `global` is decided by the caller (everything but a lone page zero).
pub fn merge_page(generation: MmuGeneration, previous: u32, phys: u32, attrs: MapAttrs, global: bool) -> u32 {
    let was_invalid = is_invalid(previous);
    let old = PageBits::from_bits_retain(if was_invalid { 0 } else { previous });
    let mut raw = phys & !PAGE_MASK;

    match generation {
        MmuGeneration::Mmu030 => {
            let mut bits = PageBits::PAGE_030;
            if attrs.write_protect || old.contains(PageBits::WRITE_PROTECT) {
                bits |= PageBits::WRITE_PROTECT;
            }
            if attrs.cache.inhibits_030() || old.contains(PageBits::CACHE_INHIBIT) {
                bits |= PageBits::CACHE_INHIBIT;
            }
            raw |= bits.bits();
        }
        MmuGeneration::Mmu040 => {
            let mut bits = PageBits::RESIDENT;
            if attrs.write_protect || old.contains(PageBits::WRITE_PROTECT) {
                bits |= PageBits::WRITE_PROTECT;
            }
            if attrs.supervisor || old.contains(PageBits::SUPERVISOR) {
                bits |= PageBits::SUPERVISOR;
            }
            if global {
                bits |= PageBits::GLOBAL;
            }
            let old_cache = CacheMode::from_bits(previous >> CACHE_SHIFT);
            let cache = if was_invalid { attrs.cache } else { attrs.cache.max(old_cache) };
            raw |= bits.bits() | ((cache as u32) << CACHE_SHIFT);
        }
    }
    raw
}
