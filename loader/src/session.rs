//! Restore session
//!
//! One `Session` lives from option parsing to the takeover. Every pass takes
//! it by `&mut`; nothing about a restore is kept anywhere else.

use alloc::vec::Vec;

use revive_chunk::RegisterChunk;
use revive_mem::{align_up, AddrRange, BankRole, MemClass, MemoryHost, PhysicalMemory, ResourceManager, PAGE_SIZE};
use revive_mmu::{AddressSpace, MapAttrs};

use crate::config::{HostCapabilities, LoaderConfig, MmuPolicy, SystemType};
use crate::error::{CompatWarning, RestoreError};
use crate::overlay::ActiveOverlay;

/// A chunk copied into working memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StagedChunk {
    pub addr: u32,
    pub len: u32,
}

/// ROM facts learnt while scanning.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RomState {
    /// Version and revision the snapshot was taken with, when it differs
    /// from the system ROM
    pub wanted: Option<(u16, u16)>,
    /// Image staged for the overlay
    pub image: Option<StagedChunk>,
}

/// State of one restore.
pub struct Session<H: MemoryHost, P: PhysicalMemory> {
    /// Effective options
    pub config: LoaderConfig,
    pub caps: HostCapabilities,
    pub resources: ResourceManager<H>,
    pub memory: P,
    pub mmu: Option<AddressSpace>,
    pub overlay: Option<ActiveOverlay>,
    pub rom: RomState,
    /// Register chunks by slot
    pub chunks: [Option<StagedChunk>; RegisterChunk::SLOTS],
    /// Widened FPU registers
    pub fpu_regs: Option<StagedChunk>,
    pub warnings: Vec<CompatWarning>,
    pub failures: Vec<RestoreError>,
    pub errors: u32,
    /// Snapshot chipset is AGA
    pub aga: bool,
    pub snapshot_system: SystemType,
}

impl<H: MemoryHost, P: PhysicalMemory> Session<H, P> {
    pub fn new(config: LoaderConfig, caps: HostCapabilities, host: H, memory: P) -> Self {
        Self {
            config: config.effective(&caps),
            caps,
            resources: ResourceManager::new(host),
            memory,
            mmu: None,
            overlay: None,
            rom: RomState::default(),
            chunks: [None; RegisterChunk::SLOTS],
            fpu_regs: None,
            warnings: Vec::new(),
            failures: Vec::new(),
            errors: 0,
            aga: false,
            snapshot_system: SystemType::Generic,
        }
    }

    /// Log and keep a compatibility warning.
    pub fn warn(&mut self, warning: CompatWarning) {
        log::warn!(target: "loader", "{}", warning);
        self.warnings.push(warning);
    }

    /// Count an error. The caller has already told the operator.
    pub fn fail(&mut self, error: RestoreError) {
        self.errors += 1;
        self.failures.push(error);
    }

    pub fn staged(&self, chunk: RegisterChunk) -> Option<StagedChunk> {
        self.chunks[chunk.index()]
    }

    pub fn mmu_active(&self) -> bool {
        self.mmu.is_some()
    }

    /// Build the identity address space if the effective options ask for
    /// one. On failure the restore continues without an MMU.
    pub fn init_mmu(&mut self) {
        if !self.config.uses_mmu() {
            return;
        }
        let Some(generation) = self.caps.cpu.mmu_generation() else {
            return;
        };
        let mark = self.resources.allocation_mark();
        match AddressSpace::init(&mut self.resources, &mut self.memory, generation, self.config.default_cache()) {
            Ok(space) => {
                log::info!(target: "loader", "MMU mode enabled.");
                self.mmu = Some(space);
            }
            Err(e) => {
                log::error!(target: "loader", "MMU page table allocation failed.");
                log::debug!(target: "mmu", "{}", e);
                self.resources.release_to(mark);
                self.config.mmu = MmuPolicy::Disabled;
            }
        }
    }

    /// Make `[virt, virt + size)` exist through the MMU.
    ///
    /// Backed by `phys` when given, else by a fresh page-aligned fast RAM
    /// claim. Returns the physical base, `None` without an MMU or memory.
    pub fn remap(&mut self, virt: u32, size: u32, write_protect: bool, phys: Option<u32>) -> Option<u32> {
        let space = self.mmu.as_mut()?;
        let last = virt.wrapping_add(size.saturating_sub(1));
        let size = align_up(size, PAGE_SIZE)?;
        let phys = match phys {
            Some(phys) => phys,
            None => match self.resources.allocate_from_host(size, PAGE_SIZE, MemClass::Fast) {
                Ok(phys) => phys,
                Err(_) => {
                    log::error!(target: "mmu", "MMU: Error allocating remap space for {:08x}-{:08x}.", virt, last);
                    return None;
                }
            },
        };
        let attrs = MapAttrs::cached(space.default_cache()).with_write_protect(write_protect);
        // A failed backing claim stays logged; release_all returns it with the tables
        if let Err(e) = space.map_region(&mut self.resources, &mut self.memory, virt, phys, size, attrs) {
            log::error!(target: "mmu", "MMU: {} ({:08x}-{:08x}).", e, virt, last);
            return None;
        }
        Some(phys)
    }

    /// Every range the takeover will overwrite with snapshot RAM.
    ///
    /// A region claimed for a role without a bank of its own is backing
    /// for another bank's remapped tail (the ECS fold), so it counts too.
    pub fn restore_ranges(&self) -> Vec<AddrRange> {
        let mut ranges: Vec<AddrRange> = self.resources.banks().iter().map(|b| b.restore_range()).collect();
        for role in BankRole::ALL {
            if self.resources.bank(role).is_none() {
                ranges.extend(self.resources.claimed_region(role));
            }
        }
        ranges
    }
}
