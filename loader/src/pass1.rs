//! Pass 1: scanning
//!
//! Walks the whole statefile once without loading RAM:
//!
//! ```text
//!   ASF ─► CPU/FPU/CHIP/ROM ─► compatibility checks, overlay probe
//!          CRAM/BRAM/FRAM   ─► bank resolution (native, MMU, ECS remap)
//!          deny-listed      ─► error, keep scanning
//!   END ─► pool discovery, working memory check, overlap check
//! ```
//!
//! Errors are counted rather than returned so the operator sees every
//! problem in one run.

use alloc::vec::Vec;

use revive_chunk::{be_u16, be_u32, classify, ChunkHeader, ChunkKind, ChunkReader, ChunkStream, RegisterChunk, Tag};
use revive_mem::{BankRole, MemoryBank, MemoryHost, PhysicalMemory, MIN_POOL_SIZE};

use crate::compat;
use crate::config::{ChipsetId, SystemType};
use crate::error::{CompatWarning, Feature, FormatError, RestoreError, Shortage};
use crate::overlay::RomOverlayAdapter;
use crate::rom;
use crate::session::Session;

/// Bytes of a memory chunk read while scanning.
const MEMORY_PREFIX: u32 = 16;

/// Chip RAM an ECS Agnus can address once slow RAM is folded in.
const ECS_CHIP_HALF: u32 = 512 * 1024;

/// Scan the statefile. `Ok` means Pass 2 may run.
pub fn scan<H, P, S>(
    session: &mut Session<H, P>,
    reader: &mut ChunkReader<S>,
    adapters: &mut [&mut dyn RomOverlayAdapter],
) -> Result<(), RestoreError>
where
    H: MemoryHost,
    P: PhysicalMemory,
    S: ChunkStream,
{
    let mut first = true;
    let mut payload = Vec::new();

    loop {
        let Some(header) = reader.read_chunk_header() else {
            log::error!(target: "loader", "Unexpected end of statefile.");
            return Err(RestoreError::Format(FormatError::Truncated));
        };

        if first {
            if header.tag != Tag::START {
                log::error!(target: "loader", "Not UAE statefile.");
                return Err(RestoreError::Format(FormatError::NotStatefile));
            }
            first = false;
            reader.skip_chunk(header.length)?;
            continue;
        }

        match classify(header.tag) {
            ChunkKind::End => break,
            ChunkKind::Start | ChunkKind::Unknown => reader.skip_chunk(header.length)?,
            ChunkKind::Unsupported => {
                log::error!(
                    target: "loader",
                    "Unsupported chunk '{}', {} bytes, flags {:08x}.",
                    header.tag,
                    header.length,
                    header.flags.bits()
                );
                session.fail(RestoreError::UnsupportedFeature(Feature::Chunk(header.tag)));
                reader.skip_chunk(header.length)?;
            }
            ChunkKind::Memory(role) => {
                log::debug!(
                    target: "loader",
                    "Checking memory chunk '{}', {} bytes, flags {:08x}.",
                    header.tag,
                    header.length,
                    header.flags.bits()
                );
                if read_payload(session, reader, &header, MEMORY_PREFIX, &mut payload) {
                    resolve_bank(session, role, &header, &payload);
                }
            }
            ChunkKind::Register(chunk) => {
                log::debug!(
                    target: "loader",
                    "Reading chunk '{}', {} bytes, flags {:08x}.",
                    header.tag,
                    header.length,
                    header.flags.bits()
                );
                if read_payload(session, reader, &header, u32::MAX, &mut payload) {
                    inspect(session, chunk, &payload, adapters);
                }
            }
        }
    }

    if session.errors > 0 {
        log::error!(target: "loader", "Incompatible hardware configuration.");
        return Err(RestoreError::Failed {
            pass: 1,
            errors: session.errors,
        });
    }

    session.resources.discover_pools();
    let Some(best) = session.resources.best_pool().copied() else {
        log::error!(target: "loader", "At least 512k RAM not used by statefile required.");
        session.fail(RestoreError::InsufficientResources(Shortage::WorkingMemory));
        return Err(RestoreError::Failed {
            pass: 1,
            errors: session.errors,
        });
    };
    debug_assert!(best.size() >= MIN_POOL_SIZE);
    log::debug!(target: "loader", "{}k extra RAM at {:08x}.", best.size() >> 10, best.base());

    let ranges = session.restore_ranges();
    if let Err(e) = session.resources.check_disjoint(&ranges) {
        let e = RestoreError::from(e);
        log::error!(target: "loader", "{}.", e);
        session.fail(e);
        return Err(RestoreError::Failed {
            pass: 1,
            errors: session.errors,
        });
    }
    Ok(())
}

/// Read (a prefix of) a payload, counting a short read as an error.
fn read_payload<H, P, S>(
    session: &mut Session<H, P>,
    reader: &mut ChunkReader<S>,
    header: &ChunkHeader,
    max: u32,
    buf: &mut Vec<u8>,
) -> bool
where
    H: MemoryHost,
    P: PhysicalMemory,
    S: ChunkStream,
{
    match reader.read_chunk_payload(header, max, buf) {
        Ok(_) => true,
        Err(e) => {
            log::error!(target: "loader", "Read error (Chunk '{}', {} bytes).", header.tag, header.length.min(max));
            session.fail(e.into());
            false
        }
    }
}

fn inspect<H, P>(session: &mut Session<H, P>, chunk: RegisterChunk, payload: &[u8], adapters: &mut [&mut dyn RomOverlayAdapter])
where
    H: MemoryHost,
    P: PhysicalMemory,
{
    match chunk {
        RegisterChunk::Cpu => {
            let model = be_u32(payload, 0);
            log::info!(target: "loader", "CPU: {}.", model);
            if let Some(w) = compat::check_cpu(model, session.caps.cpu) {
                session.warn(w);
            }
        }
        RegisterChunk::Fpu => {
            let model = be_u32(payload, 0);
            match compat::check_fpu(model, session.caps.fpu_model()) {
                Ok(Some(w)) => session.warn(w),
                Ok(None) => {}
                Err(e) => {
                    log::error!(target: "loader", "FPU required");
                    session.fail(e);
                }
            }
        }
        RegisterChunk::Chipset => {
            let snapshot = ChipsetId(be_u16(payload, 8));
            log::info!(
                target: "loader",
                "Chipset: {} {} (0x{:04X}).",
                snapshot.name(),
                snapshot.video(),
                snapshot.0
            );
            for w in compat::check_chipset(snapshot, session.caps.chipset) {
                session.warn(w);
            }
            session.aga = snapshot.is_aga();
        }
        RegisterChunk::Rom => rom::check(session, payload, adapters),
        RegisterChunk::Cd32 => note_system(session, SystemType::Cd32),
        RegisterChunk::Cdtv | RegisterChunk::CdtvDmac => note_system(session, SystemType::Cdtv),
        _ => {}
    }
}

fn note_system<H, P>(session: &mut Session<H, P>, system: SystemType)
where
    H: MemoryHost,
    P: PhysicalMemory,
{
    if session.snapshot_system == system {
        return;
    }
    session.snapshot_system = system;
    if let Some(w) = compat::check_system(system, session.caps.system) {
        session.warn(w);
    }
}

/// Decide where a memory bank will live.
fn resolve_bank<H, P>(session: &mut Session<H, P>, role: BankRole, header: &ChunkHeader, prefix: &[u8])
where
    H: MemoryHost,
    P: PhysicalMemory,
{
    if session.resources.bank(role).is_some() {
        log::error!(target: "loader", "Duplicate memory chunk '{}'.", header.tag);
        session.fail(RestoreError::Format(FormatError::DuplicateBank(role)));
        return;
    }

    let addr = role.target_address();
    let size = if header.is_compressed() {
        be_u32(prefix, 0)
    } else {
        header.length
    };
    log::debug!(target: "loader", "Statefile RAM: Address {:08x}, size {}k.", addr, size >> 10);

    let mut bank = MemoryBank::new(role);
    bank.required_size = size;
    bank.chunk_len = header.length;
    bank.offset = header.offset;
    bank.compressed = header.is_compressed();

    let Some(native) = session.resources.native_region_at(addr) else {
        // Nothing there: the MMU creates the whole range
        if session.remap(addr, size, false, None).is_none() {
            log::error!(
                target: "loader",
                "Required RAM address space {:08x}-{:08x} unavailable.",
                addr,
                addr.wrapping_add(size).wrapping_sub(1)
            );
            session.fail(RestoreError::InsufficientResources(Shortage::Bank(role)));
            return;
        }
        bank.target_size = size;
        bank.synthesized = true;
        install(session, bank);
        return;
    };

    session.resources.claim_region(role, native);
    bank.target_size = native.size();
    log::debug!(
        target: "loader",
        "- Detected memory at {:08x}, total size {}k. Offset {}.",
        native.start,
        native.size() >> 10,
        header.offset
    );

    if native.size() >= size {
        let spare = native.size() - size;
        log::debug!(target: "loader", "- Memory is usable ({}k required, {}k unused).", size >> 10, spare >> 10);
        install(session, bank);
        if spare >= MIN_POOL_SIZE {
            session.resources.offer_pool(native.start + size, spare);
        }
        return;
    }

    // Undersized: synthesize the missing tail
    let tail = native.start + native.size();
    let missing = size - native.size();
    let ecs_fold = role == BankRole::Chip
        && session.resources.claimed_region(BankRole::Slow).is_none()
        && native.start == 0
        && native.size() == ECS_CHIP_HALF
        && missing >= ECS_CHIP_HALF
        && session.caps.chipset.is_ecs();
    let mut phys = None;
    if ecs_fold && session.mmu_active() {
        let slow = BankRole::Slow.target_address();
        // Only fold when slow RAM backs the whole missing tail
        if let Some(region) = session
            .resources
            .native_region_at(slow)
            .filter(|r| r.size() >= missing)
        {
            session.resources.claim_region(BankRole::Slow, region);
            log::info!(target: "loader", "- MMU: ECS Agnus 512k to 1M Chip RAM remapping enabled.");
            phys = Some(slow);
        }
    }

    if let Some(out) = session.remap(tail, missing, false, phys) {
        log::info!(
            target: "loader",
            "- MMU remapped missing address space {:08x}-{:08x} -> {:08x}",
            tail,
            tail.wrapping_add(missing).wrapping_sub(1),
            out
        );
        if native.start == 0 && phys.is_none() {
            session.warn(CompatWarning::ChipRamRemapped);
        }
        bank.synthesized = true;
        install(session, bank);
        return;
    }

    log::error!(target: "loader", "Not enough {} available. {}k required.", role.name(), size >> 10);
    session.fail(RestoreError::InsufficientResources(Shortage::Bank(role)));
}

fn install<H, P>(session: &mut Session<H, P>, bank: MemoryBank)
where
    H: MemoryHost,
    P: PhysicalMemory,
{
    if session.resources.resolve_bank(bank).is_err() {
        session.fail(RestoreError::Format(FormatError::DuplicateBank(bank.role)));
    }
}

