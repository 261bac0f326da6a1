//! Address space construction
//!
//! ```text
//!   Uninitialized ──init()──► Active ──map_region / unmap_region──► Active
//! ```
//!
//! There is no teardown. The tree is handed to the CPU once, at takeover,
//! and the restored system replaces it with its own.
//!
//! Table storage comes from the host eight pages at a time. On the 68040
//! and 68060 the table walker reads through the data cache, so every page
//! of table storage is itself mapped serialized before anything else.

use alloc::vec::Vec;

use revive_mem::{AddrRange, Arena, MemClass, MemoryHost, PhysicalMemory, ResourceManager, PAGE_SIZE};

use crate::descriptor::{is_invalid, merge_page, CacheMode, Descriptor, MapAttrs, MmuGeneration, INVALID_DESCRIPTOR};
use crate::error::MmuError;
use crate::table::{Level, LevelA, LevelB, LevelC, Table, VirtAddr};

/// Pages fetched from the host per storage refill.
pub const REFILL_PAGES: u32 = 8;

/// Hardware I/O windows, always identity mapped non-cacheable.
pub const IO_WINDOWS: [(u32, u32); 3] = [
    (0x00a0_0000, 0x00c0_0000),
    (0x00d8_0000, 0x00e0_0000),
    (0x00e8_0000, 0x00f0_0000),
];

/// ROM windows, identity mapped with the default cache mode.
pub const ROM_WINDOWS: [(u32, u32); 2] = [(0x00e0_0000, 0x00e8_0000), (0x00f8_0000, 0x0100_0000)];

/// An active translation tree.
pub struct AddressSpace {
    generation: MmuGeneration,
    root: Table<LevelA>,
    default_cache: CacheMode,
    storage: Arena,
    chunks: Vec<AddrRange>,
}

impl AddressSpace {
    /// Allocate the root table and install the identity map of everything
    /// the host can reach.
    pub fn init<H, P>(
        rm: &mut ResourceManager<H>,
        mem: &mut P,
        generation: MmuGeneration,
        default_cache: CacheMode,
    ) -> Result<Self, MmuError>
    where
        H: MemoryHost,
        P: PhysicalMemory + ?Sized,
    {
        let mut space = Self {
            generation,
            root: Table::at(0),
            default_cache,
            storage: Arena::empty(),
            chunks: Vec::new(),
        };

        let root = space.alloc_table::<LevelA, H, P>(rm, mem, false)?;
        space.root = Table::at(root);
        log::debug!(target: "mmu", "Level A table at {:08x} ({:?})", root, generation);

        if generation == MmuGeneration::Mmu040 {
            if let Some(first) = space.chunks.first().copied() {
                space.map_table_storage(rm, mem, first)?;
            }
        }

        let regions = rm.native_regions();
        for region in regions {
            space.map_region(rm, mem, region.start, region.start, region.size(), MapAttrs::cached(default_cache))?;
        }
        for (start, end) in IO_WINDOWS {
            space.map_region(rm, mem, start, start, end - start, MapAttrs::cached(CacheMode::NonCacheable))?;
        }
        for (start, end) in ROM_WINDOWS {
            space.map_region(rm, mem, start, start, end - start, MapAttrs::cached(default_cache))?;
        }
        Ok(space)
    }

    pub fn generation(&self) -> MmuGeneration {
        self.generation
    }

    /// Root table address, as loaded into the CPU root pointer.
    pub fn root(&self) -> u32 {
        self.root.base()
    }

    pub fn default_cache(&self) -> CacheMode {
        self.default_cache
    }

    /// Storage chunks obtained from the host so far.
    pub fn storage_chunks(&self) -> &[AddrRange] {
        &self.chunks
    }

    /// Map `[virt, virt + size)` onto `[phys, phys + size)`.
    pub fn map_region<H, P>(
        &mut self,
        rm: &mut ResourceManager<H>,
        mem: &mut P,
        virt: u32,
        phys: u32,
        size: u32,
        attrs: MapAttrs,
    ) -> Result<(), MmuError>
    where
        H: MemoryHost,
        P: PhysicalMemory + ?Sized,
    {
        if virt != phys {
            log::debug!(
                target: "mmu",
                "Remap {:08x}-{:08x} -> {:08x} (WP={},S={})",
                virt,
                virt.wrapping_add(size).wrapping_sub(1),
                phys,
                attrs.write_protect as u8,
                attrs.supervisor as u8
            );
        }
        self.walk(rm, mem, virt, Some(phys), size, attrs).map_err(|e| {
            log::debug!(target: "mmu", "Remap error: {}", e);
            e
        })
    }

    /// Make `[virt, virt + size)` fault.
    pub fn unmap_region<H, P>(&mut self, rm: &mut ResourceManager<H>, mem: &mut P, virt: u32, size: u32) -> Result<(), MmuError>
    where
        H: MemoryHost,
        P: PhysicalMemory + ?Sized,
    {
        log::debug!(target: "mmu", "Unmapped {:08x}-{:08x}", virt, virt.wrapping_add(size).wrapping_sub(1));
        self.walk(rm, mem, virt, None, size, MapAttrs::default())
    }

    /// Decode the level-C slot for `virt`.
    pub fn lookup<P: PhysicalMemory + ?Sized>(&self, mem: &P, virt: u32) -> Descriptor {
        let va = VirtAddr(virt);
        let Descriptor::Table(b) = Descriptor::decode_table(self.root.read(mem, va), LevelB::BYTES - 1) else {
            return Descriptor::Invalid;
        };
        let Descriptor::Table(c) = Descriptor::decode_table(Table::<LevelB>::at(b).read(mem, va), LevelC::BYTES - 1) else {
            return Descriptor::Invalid;
        };
        Descriptor::decode_page(self.generation, Table::<LevelC>::at(c).read(mem, va))
    }

    /// Physical address `virt` translates to, if mapped.
    pub fn translate<P: PhysicalMemory + ?Sized>(&self, mem: &P, virt: u32) -> Option<u32> {
        match self.lookup(mem, virt) {
            Descriptor::Page(p) => Some(p.phys | (virt & (PAGE_SIZE - 1))),
            _ => None,
        }
    }

    /// Walk every page of the range, creating intermediate tables on the
    /// way. `phys == None` invalidates.
    fn walk<H, P>(
        &mut self,
        rm: &mut ResourceManager<H>,
        mem: &mut P,
        virt: u32,
        phys: Option<u32>,
        size: u32,
        attrs: MapAttrs,
    ) -> Result<(), MmuError>
    where
        H: MemoryHost,
        P: PhysicalMemory + ?Sized,
    {
        let mask = PAGE_SIZE - 1;
        let target = phys.unwrap_or(virt);
        if size & mask != 0 || virt & mask != 0 || target & mask != 0 {
            return Err(MmuError::Misaligned {
                virt,
                phys: target,
                size,
            });
        }

        let mut remaining = size as u64;
        let mut va = virt as u64;
        let mut pa = target as u64;
        while remaining > 0 {
            let addr = VirtAddr(va as u32);
            let level_c = self.level_c(rm, mem, addr)?;

            let raw = match phys {
                None => INVALID_DESCRIPTOR,
                Some(_) => {
                    let previous = level_c.read(mem, addr);
                    let global = addr.0 != 0 || remaining != PAGE_SIZE as u64;
                    merge_page(self.generation, previous, pa as u32, attrs, global)
                }
            };
            level_c.write(mem, addr, raw);

            remaining -= PAGE_SIZE as u64;
            va += PAGE_SIZE as u64;
            pa += PAGE_SIZE as u64;
        }
        Ok(())
    }

    /// Level-C table covering `addr`, allocating levels B and C on demand.
    fn level_c<H, P>(&mut self, rm: &mut ResourceManager<H>, mem: &mut P, addr: VirtAddr) -> Result<Table<LevelC>, MmuError>
    where
        H: MemoryHost,
        P: PhysicalMemory + ?Sized,
    {
        let mut a = self.root.read(mem, addr);
        if is_invalid(a) {
            let table = self.alloc_table::<LevelB, H, P>(rm, mem, true)?;
            // A refill may have mapped its own storage through this slot
            a = self.root.read(mem, addr);
            if is_invalid(a) {
                a = Descriptor::table(self.generation, table);
                self.root.write(mem, addr, a);
            }
        }
        let level_b = Table::<LevelB>::at(a);

        let mut b = level_b.read(mem, addr);
        if is_invalid(b) {
            let table = self.alloc_table::<LevelC, H, P>(rm, mem, true)?;
            b = level_b.read(mem, addr);
            if is_invalid(b) {
                b = Descriptor::table(self.generation, table);
                level_b.write(mem, addr, b);
            }
        }
        Ok(Table::<LevelC>::at(b))
    }

    /// Carve a cleared table of level `L` out of descriptor storage.
    fn alloc_table<L, H, P>(&mut self, rm: &mut ResourceManager<H>, mem: &mut P, map_refills: bool) -> Result<u32, MmuError>
    where
        L: Level,
        H: MemoryHost,
        P: PhysicalMemory + ?Sized,
    {
        let size = L::BYTES;
        let addr = loop {
            if let Some(addr) = self.storage.bump(size, size) {
                break addr;
            }
            let chunk = self.refill(rm)?;
            if map_refills && self.generation == MmuGeneration::Mmu040 {
                self.map_table_storage(rm, mem, chunk)?;
            }
        };
        Table::<L>::at(addr).clear(mem);
        Ok(addr)
    }

    fn refill<H: MemoryHost>(&mut self, rm: &mut ResourceManager<H>) -> Result<AddrRange, MmuError> {
        let bytes = REFILL_PAGES * PAGE_SIZE;
        let base = rm
            .allocate_from_host(bytes, PAGE_SIZE, MemClass::Fast)
            .or_else(|_| rm.allocate_from_host(bytes, PAGE_SIZE, MemClass::Any))
            .map_err(|_| MmuError::OutOfDescriptorMemory)?;
        log::debug!(target: "mmu", "Descriptor storage {:08x}-{:08x}", base, base + bytes - 1);
        self.storage = Arena::new(base, bytes);
        let chunk = AddrRange::new(base, bytes);
        self.chunks.push(chunk);
        Ok(chunk)
    }

    fn map_table_storage<H, P>(&mut self, rm: &mut ResourceManager<H>, mem: &mut P, chunk: AddrRange) -> Result<(), MmuError>
    where
        H: MemoryHost,
        P: PhysicalMemory + ?Sized,
    {
        self.walk(rm, mem, chunk.start, Some(chunk.start), chunk.size(), MapAttrs::cached(CacheMode::Serialized))
    }
}
