//! Takeover
//!
//! Everything up to [`TakeoverPlan::prepare`] can still be abandoned.
//! [`commit`] cannot: it shuts the host down and overwrites its memory.
//!
//! # Layout of the takeover block
//!
//! ```text
//!  code ──► ┌──────────────────────┐
//!           │ relocated code image │  rounded to 8
//!           ├──────────────────────┤
//!           │ stack (6000 bytes)   │  grows down
//!  state ─► ├──────────────────────┤ ◄── initial stack pointer
//!           │ handoff state        │  big-endian longs, see below
//!           └──────────────────────┘
//! ```
//!
//! Handoff state:
//!
//! ```text
//!   0  option flags          4  MMU root (0 = none)      8  MMU format (0/30/40)
//!  12  overlay ROM address  16  ROM image address       20  ROM image length
//!  24  FPU register block   28  3 x bank {target, source, size, flags}
//!  76  26 x chunk {address, length}
//! ```

use revive_chunk::RegisterChunk;
use revive_mem::{align_up, MemoryBank, MemoryHost, PhysicalMemory, DEFAULT_ALIGN};
use revive_mmu::MmuGeneration;

use crate::error::RestoreError;
use crate::overlay::{copy_rom, ActiveOverlay, RomOverlayAdapter};
use crate::session::Session;

/// Stack the takeover code runs on.
pub const TEMP_STACK_SIZE: u32 = 6000;

const BANK_RECORD_LEN: u32 = 16;
const CHUNK_RECORD_LEN: u32 = 8;
const BANKS_OFFSET: u32 = 28;
const CHUNKS_OFFSET: u32 = BANKS_OFFSET + 3 * BANK_RECORD_LEN;

/// Size of the handoff state block.
pub const HANDOFF_STATE_LEN: u32 = CHUNKS_OFFSET + RegisterChunk::SLOTS as u32 * CHUNK_RECORD_LEN;

/// Bits of the option word in the handoff state.
pub mod state_flags {
    pub const NO_CACHE: u32 = 1 << 0;
    pub const NO_CACHE_TAKEOVER: u32 = 1 << 1;
    pub const FORCE_PAL: u32 = 1 << 2;
    pub const FORCE_NTSC: u32 = 1 << 3;
    pub const PAUSE: u32 = 1 << 4;
    pub const NO_FLOPPY: u32 = 1 << 5;
    pub const AGA: u32 = 1 << 6;
}

/// Bank record flag: payload is compressed.
pub const BANK_COMPRESSED: u32 = 1 << 0;

/// The restorer's own resident code, as loaded by the host.
#[derive(Debug, Clone, Copy)]
pub struct CodeImage<'a> {
    pub bytes: &'a [u8],
    /// Address the image currently runs at
    pub load_addr: u32,
    /// Offsets of 32-bit absolute addresses inside the image
    pub fixups: &'a [u32],
    /// Absolute address of the post-takeover entry point
    pub entry: u32,
}

impl CodeImage<'_> {
    fn contains(&self, addr: u32) -> bool {
        addr >= self.load_addr && ((addr - self.load_addr) as usize) < self.bytes.len()
    }
}

/// A prepared takeover block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TakeoverPlan {
    pub code: u32,
    pub code_len: u32,
    pub stack_top: u32,
    pub state: u32,
    /// Relocated entry point
    pub entry: u32,
    pub relocated: u32,
    pub mmu_root: Option<u32>,
    pub mmu_generation: Option<MmuGeneration>,
}

impl TakeoverPlan {
    /// Allocate the takeover block, relocate the code image into it and
    /// write the handoff state.
    pub fn prepare<H, P>(session: &mut Session<H, P>, image: &CodeImage<'_>) -> Result<Self, RestoreError>
    where
        H: MemoryHost,
        P: PhysicalMemory,
    {
        let round = |n: u32| align_up(n, DEFAULT_ALIGN).ok_or(RestoreError::OutOfMemory { size: n });
        let code_len = round(image.bytes.len() as u32)?;
        let stack_len = round(TEMP_STACK_SIZE)?;
        let state_len = round(HANDOFF_STATE_LEN)?;
        let total = code_len + stack_len + state_len;

        let base = session.resources.allocate(total, DEFAULT_ALIGN, true).map_err(|_| {
            log::error!(target: "takeover", "Out of memory for takeover ({} bytes).", total);
            RestoreError::OutOfMemory { size: total }
        })?;

        session.memory.write_bytes(base, image.bytes);
        let delta = base.wrapping_sub(image.load_addr);
        let mut relocated = 0;
        for &offset in image.fixups {
            if offset as usize + 4 > image.bytes.len() {
                continue;
            }
            let at = base + offset;
            let value = session.memory.read_u32(at);
            if image.contains(value) {
                session.memory.write_u32(at, value.wrapping_add(delta));
                relocated += 1;
            }
        }

        let entry = if image.contains(image.entry) {
            image.entry.wrapping_add(delta)
        } else {
            image.entry
        };
        let state = base + code_len + stack_len;
        let plan = Self {
            code: base,
            code_len,
            stack_top: state,
            state,
            entry,
            relocated,
            mmu_root: session.mmu.as_ref().map(|m| m.root()),
            mmu_generation: session.mmu.as_ref().map(|m| m.generation()),
        };
        write_state(session, &plan);
        log::debug!(
            target: "takeover",
            "Code={:08x} Stack={:08x} Data={:08x}, {} fixups applied",
            plan.code,
            plan.stack_top,
            plan.state,
            relocated
        );
        Ok(plan)
    }
}

fn write_state<H, P>(session: &mut Session<H, P>, plan: &TakeoverPlan)
where
    H: MemoryHost,
    P: PhysicalMemory,
{
    let cfg = session.config;
    let mut flags = 0;
    for (on, bit) in [
        (cfg.no_cache, state_flags::NO_CACHE),
        (cfg.no_cache_takeover, state_flags::NO_CACHE_TAKEOVER),
        (cfg.force_pal, state_flags::FORCE_PAL),
        (cfg.force_ntsc, state_flags::FORCE_NTSC),
        (cfg.pause, state_flags::PAUSE),
        (cfg.no_floppy, state_flags::NO_FLOPPY),
        (session.aga, state_flags::AGA),
    ] {
        if on {
            flags |= bit;
        }
    }
    let overlay_addr = match session.overlay {
        Some(ActiveOverlay::Mmu { backing }) => backing,
        Some(ActiveOverlay::Board { descriptor, .. }) => descriptor.rom_addr,
        None => 0,
    };
    let generation = match plan.mmu_generation {
        Some(MmuGeneration::Mmu030) => 30,
        Some(MmuGeneration::Mmu040) => 40,
        None => 0,
    };
    let image = session.rom.image;
    let fpu = session.fpu_regs.map_or(0, |f| f.addr);
    let banks: [Option<MemoryBank>; 3] = revive_mem::BankRole::ALL.map(|r| session.resources.bank(r).copied());
    let chunks = session.chunks;

    let mem = &mut session.memory;
    let s = plan.state;
    mem.fill(s, HANDOFF_STATE_LEN, 0);
    mem.write_u32(s, flags);
    mem.write_u32(s + 4, plan.mmu_root.unwrap_or(0));
    mem.write_u32(s + 8, generation);
    mem.write_u32(s + 12, overlay_addr);
    mem.write_u32(s + 16, image.map_or(0, |i| i.addr));
    mem.write_u32(s + 20, image.map_or(0, |i| i.len));
    mem.write_u32(s + 24, fpu);
    for (i, bank) in banks.iter().enumerate() {
        let Some(bank) = bank else {
            continue;
        };
        let r = s + BANKS_OFFSET + i as u32 * BANK_RECORD_LEN;
        mem.write_u32(r, bank.target_addr);
        mem.write_u32(r + 4, bank.source.unwrap_or(0));
        mem.write_u32(r + 8, bank.required_size);
        mem.write_u32(r + 12, if bank.compressed { BANK_COMPRESSED } else { 0 });
    }
    for (i, chunk) in chunks.iter().enumerate() {
        if let Some(c) = chunk {
            let r = s + CHUNKS_OFFSET + i as u32 * CHUNK_RECORD_LEN;
            mem.write_u32(r, c.addr);
            mem.write_u32(r + 4, c.len);
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// EXTERNAL SERVICES
// ═══════════════════════════════════════════════════════════════════════════

/// Inflates a compressed bank straight to its target.
pub trait Decompressor {
    /// `src` points at the raw deflate stream (zlib header skipped).
    fn inflate(&mut self, mem: &mut dyn PhysicalMemory, dst: u32, src: u32);
}

/// The machine-specific end of the takeover.
pub trait Handoff {
    /// Block until the operator confirms.
    fn wait_for_operator(&mut self);

    /// Shut the host down: caches flushed, display off, blitter owned,
    /// interrupts off, supervisor mode, MMU root loaded when the plan has one.
    ///
    /// Before returning, execution must continue from the relocated copy at
    /// `plan.code` on the stack below `plan.stack_top`. The bank copies that
    /// follow overwrite the host's own code and stack.
    fn shutdown_host(&mut self, plan: &TakeoverPlan);

    /// Apply the staged register chunks and jump into the snapshot. Only
    /// returns on a simulated machine.
    fn resume(&mut self, plan: &TakeoverPlan);
}

/// Point of no return.
///
/// Order: host shutdown, ROM overlay, banks chip/slow/fast, resume.
///
/// Everything after [`Handoff::shutdown_host`] runs from the block
/// [`prepare`] built: the handoff has moved onto `plan.code` and
/// `plan.stack_top` by then, so restoring a bank over the original loader
/// is safe.
pub fn commit<H, P>(
    session: &mut Session<H, P>,
    plan: &TakeoverPlan,
    decompressor: &mut dyn Decompressor,
    adapters: &mut [&mut dyn RomOverlayAdapter],
    handoff: &mut dyn Handoff,
) where
    H: MemoryHost,
    P: PhysicalMemory,
{
    handoff.shutdown_host(plan);

    if let (Some(overlay), Some(image)) = (session.overlay, session.rom.image) {
        match overlay {
            ActiveOverlay::Mmu { backing } => copy_rom(&mut session.memory, backing, image),
            ActiveOverlay::Board { adapter, descriptor } => {
                if let Some(a) = adapters.get_mut(adapter) {
                    a.activate(&descriptor, &mut session.memory, image);
                }
            }
        }
    }

    for role in revive_mem::BankRole::ALL {
        if let Some(bank) = session.resources.bank(role).copied() {
            restore_bank(&mut session.memory, &bank, decompressor);
        }
    }

    handoff.resume(plan);
}

/// Put one bank back at its target address.
pub fn restore_bank(mem: &mut dyn PhysicalMemory, bank: &MemoryBank, decompressor: &mut dyn Decompressor) {
    let Some(source) = bank.source else {
        return;
    };
    let payload = source + revive_chunk::HEADER_LEN;
    if bank.compressed {
        // Inflated length, then the 2-byte zlib header
        decompressor.inflate(mem, bank.target_addr, payload + 4 + 2);
    } else {
        mem.copy(bank.target_addr, payload, bank.chunk_len & !3);
    }
}
