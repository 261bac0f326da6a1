//! Typed translation tree levels.
//!
//! A 32-bit virtual address is cut into three indices and a page offset:
//!
//! ```text
//!  31        25 24        18 17      12 11           0
//! ├── A (7) ───┼── B (7) ───┼── C (6) ─┼── offset ───┤
//! ```
//!
//! Level A has 128 slots pointing at level-B tables (128 slots each), which
//! point at level-C tables (64 page slots each). Tables live in physical
//! memory and are aligned to their own size.

use core::marker::PhantomData;

use revive_mem::PhysicalMemory;

use crate::descriptor::INVALID_DESCRIPTOR;

/// One level of the tree.
pub trait Level {
    /// Index width
    const BITS: u32;
    /// Shift of the index within a virtual address
    const SHIFT: u32;
    const ENTRIES: u32 = 1 << Self::BITS;
    /// Table size in bytes, also its alignment
    const BYTES: u32 = Self::ENTRIES * 4;
}

pub enum LevelA {}
pub enum LevelB {}
pub enum LevelC {}

impl Level for LevelA {
    const BITS: u32 = 7;
    const SHIFT: u32 = 25;
}

impl Level for LevelB {
    const BITS: u32 = 7;
    const SHIFT: u32 = 18;
}

impl Level for LevelC {
    const BITS: u32 = 6;
    const SHIFT: u32 = 12;
}

/// Virtual address with per-level index accessors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VirtAddr(pub u32);

impl VirtAddr {
    #[inline]
    pub const fn index<L: Level>(self) -> u32 {
        (self.0 >> L::SHIFT) & ((1 << L::BITS) - 1)
    }

    pub const fn a(self) -> u32 {
        self.index::<LevelA>()
    }

    pub const fn b(self) -> u32 {
        self.index::<LevelB>()
    }

    pub const fn c(self) -> u32 {
        self.index::<LevelC>()
    }
}

/// Handle to a table of level `L` in physical memory.
pub struct Table<L: Level> {
    base: u32,
    _level: PhantomData<L>,
}

impl<L: Level> Clone for Table<L> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<L: Level> Copy for Table<L> {}

impl<L: Level> core::fmt::Debug for Table<L> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Table<{}>@{:08x}", L::ENTRIES, self.base)
    }
}

impl<L: Level> Table<L> {
    /// Table at `addr`, with any descriptor type bits stripped.
    pub const fn at(addr: u32) -> Self {
        Self {
            base: addr & !(L::BYTES - 1),
            _level: PhantomData,
        }
    }

    pub const fn base(&self) -> u32 {
        self.base
    }

    fn slot(&self, va: VirtAddr) -> u32 {
        self.base + va.index::<L>() * 4
    }

    pub fn read<P: PhysicalMemory + ?Sized>(&self, mem: &P, va: VirtAddr) -> u32 {
        mem.read_u32(self.slot(va))
    }

    pub fn write<P: PhysicalMemory + ?Sized>(&self, mem: &mut P, va: VirtAddr, raw: u32) {
        mem.write_u32(self.slot(va), raw);
    }

    /// Fill every slot with the invalid pattern.
    pub fn clear<P: PhysicalMemory + ?Sized>(&self, mem: &mut P) {
        for i in 0..L::ENTRIES {
            mem.write_u32(self.base + i * 4, INVALID_DESCRIPTOR);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use revive_mem::sim::SparseMemory;

    #[test]
    fn test_indices() {
        let va = VirtAddr(0xfe03_f000);
        assert_eq!(va.a(), 0x7f);
        assert_eq!(va.b(), 0x00);
        assert_eq!(va.c(), 0x3f);
        let va = VirtAddr(0x0024_5000);
        assert_eq!((va.a(), va.b(), va.c()), (0, 0x9, 0x5));
    }

    #[test]
    fn test_table_sizes() {
        assert_eq!(LevelA::BYTES, 512);
        assert_eq!(LevelB::BYTES, 512);
        assert_eq!(LevelC::BYTES, 256);
    }

    #[test]
    fn test_table_slots() {
        let mut mem = SparseMemory::new();
        let t = Table::<LevelC>::at(0x1103);
        assert_eq!(t.base(), 0x1100);
        t.clear(&mut mem);
        assert_eq!(mem.read_u32(0x1100 + 63 * 4), INVALID_DESCRIPTOR);
        t.write(&mut mem, VirtAddr(0x3000), 0x3001);
        assert_eq!(mem.read_u32(0x110c), 0x3001);
        assert_eq!(t.read(&mem, VirtAddr(0x3000)), 0x3001);
    }
}
