//! ROM overlay ("MapROM")
//!
//! When the snapshot was taken with a different Kickstart, the matching
//! image is put where the CPU expects ROM. Two ways exist:
//!
//! ```text
//!   MMU overlay     F80000-FFFFFF ──remap──► 512KB fast RAM (copy at commit)
//!   Board overlay   accelerator RAM at rom_addr, switched in by the board
//! ```
//!
//! The MMU is tried first. Boards are detected by external adapters, one per
//! board family; the first one that answers wins.

use alloc::vec::Vec;

use revive_mem::{with_exclusion, AddrRange, BankRole, MemoryHost, PhysicalMemory};

use crate::config::HostCapabilities;
use crate::session::{Session, StagedChunk};

/// Where the system ROM lives.
pub const ROM_BASE: u32 = 0x00f8_0000;

/// Size of the ROM window an overlay covers.
pub const ROM_WINDOW: u32 = 512 * 1024;

/// Most RAM ranges one board can take off the bus.
pub const MAX_UNAVAILABLE: usize = 2;

/// What a board adapter found.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OverlayDescriptor {
    pub rom_addr: u32,      // overlay RAM the image is copied to
    pub board: u32,         // board control registers
    pub config: u32,        // board-specific switch value
    /// Bit per bank role the image must not be staged in
    pub avoid_banks: u8,
    /// RAM the board takes off the bus once the overlay is active
    pub unavailable: [Option<AddrRange>; MAX_UNAVAILABLE],
}

impl OverlayDescriptor {
    pub fn avoids(&self, role: BankRole) -> bool {
        self.avoid_banks & (1 << role.index()) != 0
    }

    pub fn unavailable_ranges(&self) -> Vec<AddrRange> {
        self.unavailable.iter().flatten().copied().collect()
    }
}

/// A family of accelerator boards with ROM overlay RAM.
pub trait RomOverlayAdapter {
    fn name(&self) -> &'static str;

    /// Look for the board. Runs with task switching off; must not block.
    fn probe(&mut self, caps: &HostCapabilities) -> Option<OverlayDescriptor>;

    /// Copy the staged image into overlay RAM and switch the overlay on.
    ///
    /// Called after the host is shut down; [`copy_rom`] does the copying.
    fn activate(&mut self, desc: &OverlayDescriptor, mem: &mut dyn PhysicalMemory, image: StagedChunk);
}

/// The overlay selected while scanning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActiveOverlay {
    /// ROM window remapped onto `backing`
    Mmu { backing: u32 },
    /// `adapter` indexes the adapter list given to the loader
    Board { adapter: usize, descriptor: OverlayDescriptor },
}

impl ActiveOverlay {
    pub fn avoids(&self, role: BankRole) -> bool {
        match self {
            Self::Mmu { .. } => false,
            Self::Board { descriptor, .. } => descriptor.avoids(role),
        }
    }
}

/// Copy a ROM image to `dst`. A 256KB image is written twice so it fills
/// the whole 512KB window.
pub fn copy_rom(mem: &mut dyn PhysicalMemory, dst: u32, image: StagedChunk) {
    let len = image.len & !15;
    mem.copy(dst, image.addr, len);
    if image.len == ROM_WINDOW / 2 {
        mem.copy(dst.wrapping_add(len), image.addr, len);
    }
}

/// Find overlay hardware. `true` when an overlay is available.
pub fn probe<H, P>(session: &mut Session<H, P>, adapters: &mut [&mut dyn RomOverlayAdapter]) -> bool
where
    H: MemoryHost,
    P: PhysicalMemory,
{
    if session.overlay.is_some() {
        return true;
    }
    if let Some(backing) = probe_mmu(session) {
        session.overlay = Some(ActiveOverlay::Mmu { backing });
        log::debug!(target: "loader", "MapROM MMU. Addr={:08x}", backing);
        return true;
    }
    let caps = session.caps;
    for (i, adapter) in adapters.iter_mut().enumerate() {
        let found = with_exclusion(session.resources.host_mut(), |_| adapter.probe(&caps));
        let Some(descriptor) = found else {
            continue;
        };
        log::debug!(
            target: "loader",
            "MapROM {}. Addr={:08x} Board={:08x} Cfg={:08x}.",
            adapter.name(),
            descriptor.rom_addr,
            descriptor.board,
            descriptor.config
        );
        let unavailable = descriptor.unavailable_ranges();
        if !unavailable.is_empty() {
            session.resources.set_unavailable(&unavailable);
        }
        session.overlay = Some(ActiveOverlay::Board { adapter: i, descriptor });
        return true;
    }
    false
}

fn probe_mmu<H, P>(session: &mut Session<H, P>) -> Option<u32>
where
    H: MemoryHost,
    P: PhysicalMemory,
{
    let space = session.mmu.as_mut()?;
    space
        .unmap_region(&mut session.resources, &mut session.memory, ROM_BASE, ROM_WINDOW)
        .ok()?;
    session.remap(ROM_BASE, ROM_WINDOW, false, None)
}
