//! End-to-end restores against simulated machines.

mod common;

use common::*;
use revive_chunk::{RegisterChunk, SliceStream, StatefileWriter, Tag};
use revive_loader::{
    restore, run, ActiveOverlay, ChipsetId, CompatWarning, CpuModel, Feature, FormatError, LoaderConfig,
    OverlayDescriptor, Outcome, RestoreError, Session, Shortage,
};
use revive_mem::sim::{SimHost, SparseMemory};
use revive_mem::{AddrRange, BankRole, MemClass};

fn no_wait() -> LoaderConfig {
    LoaderConfig::default().with_no_wait(true)
}

fn session(cpu: CpuModel, host: SimHost) -> Session<SimHost, SparseMemory> {
    Session::new(no_wait(), caps(cpu), host, SparseMemory::new())
}

// ───────────────────────────────────────────────────────────────────────────
// Banks
// ───────────────────────────────────────────────────────────────────────────

#[test]
fn native_chip_bank_is_restored_verbatim() {
    let ram = pattern(2 * M, 1);
    let file = StatefileBuilder::new().cpu(68020).ram(b"CRAM", &ram).finish();
    let mut rig = Rig::new();
    let mut s = session(CpuModel::M68020, a1200_host());

    let outcome = restore(&mut s, SliceStream::new(&file), rig.services());

    assert!(matches!(outcome, Outcome::Resumed(_)), "{:?}", outcome);
    assert!(s.mmu.is_none());
    let bank = s.resources.bank(BankRole::Chip).copied().unwrap();
    assert!(!bank.synthesized);
    assert_eq!(bank.target_size, 2 * M);
    assert!(bank.source.unwrap() >= 0x0800_0000);
    assert_eq!(s.memory.read_vec(0, 2 * M), ram);
    assert_eq!(rig.handoff.events, ["shutdown", "resume"]);
    assert_eq!(s.errors, 0);
    assert!(s.warnings.is_empty());
}

#[test]
fn undersized_chip_without_mmu_is_rejected() {
    let host = SimHost::new()
        .with_region(0, M, MemClass::Chip)
        .with_region(0x0800_0000, 4 * M, MemClass::Fast);
    let file = StatefileBuilder::new().ram(b"CRAM", &pattern(2 * M, 1)).finish();
    let mut rig = Rig::new();
    let mut s = session(CpuModel::M68000, host);

    let outcome = restore(&mut s, SliceStream::new(&file), rig.services());

    assert_eq!(outcome, Outcome::Rejected(RestoreError::Failed { pass: 1, errors: 1 }));
    assert_eq!(
        s.failures,
        [RestoreError::InsufficientResources(Shortage::Bank(BankRole::Chip))]
    );
    assert!(s.resources.bank(BankRole::Chip).is_none());
    assert_eq!(s.memory.resident_pages(), 0);
    assert!(rig.handoff.events.is_empty());
}

#[test]
fn deny_listed_chunks_are_skipped_unread() {
    let big = vec![0xaa; 64 * K as usize];
    let file = StatefileBuilder::new()
        .cpu(68020)
        .chunk(b"ZRA2", &big)
        .chunk(b"FRA3", &[1; 32])
        .ram(b"CRAM", &pattern(512 * K, 2))
        .finish();
    let mut stream = CountingStream::new(&file);
    let mut rig = Rig::new();
    let mut s = session(CpuModel::M68020, a1200_host());

    let outcome = restore(&mut s, &mut stream, rig.services());

    assert_eq!(outcome, Outcome::Rejected(RestoreError::Failed { pass: 1, errors: 2 }));
    assert!(s
        .failures
        .contains(&RestoreError::UnsupportedFeature(Feature::Chunk(Tag(*b"ZRA2")))));
    assert!(s
        .failures
        .contains(&RestoreError::UnsupportedFeature(Feature::Chunk(Tag(*b"FRA3")))));
    // Scanning went on past the bad chunks
    assert!(s.resources.bank(BankRole::Chip).is_some());
    assert!(stream.bytes_read < 4 * K, "read {} bytes", stream.bytes_read);
}

#[test]
fn compressed_bank_is_inflated_in_place() {
    let ram = pattern(512 * K, 3);
    let file = StatefileBuilder::new().cpu(68020).compressed_ram(b"CRAM", &ram).finish();
    let mut rig = Rig::new();
    let mut s = session(CpuModel::M68020, a1200_host());

    let outcome = restore(&mut s, SliceStream::new(&file), rig.services());

    assert!(matches!(outcome, Outcome::Resumed(_)), "{:?}", outcome);
    let bank = s.resources.bank(BankRole::Chip).copied().unwrap();
    assert!(bank.compressed);
    assert_eq!(bank.required_size, 512 * K);
    assert_eq!(rig.inflate.calls, [(0, bank.source.unwrap() + 12 + 4 + 2)]);
    assert_eq!(s.memory.read_vec(0, 512 * K), ram);
}

#[test]
fn spare_bank_tail_becomes_a_pool() {
    let file = StatefileBuilder::new().ram(b"CRAM", &pattern(512 * K, 4)).finish();
    let mut rig = Rig::new();
    let mut s = session(CpuModel::M68020, a1200_host());

    restore(&mut s, SliceStream::new(&file), rig.services());

    let bases: Vec<u32> = s.resources.pools().iter().map(|p| p.base()).collect();
    assert_eq!(bases, [0x0800_0000, 512 * K]);
}

#[test]
fn no_spare_memory_is_rejected() {
    let host = SimHost::new().with_region(0, 2 * M, MemClass::Chip);
    let file = StatefileBuilder::new().ram(b"CRAM", &pattern(2 * M, 5)).finish();
    let mut rig = Rig::new();
    let mut s = session(CpuModel::M68020, host);

    let outcome = restore(&mut s, SliceStream::new(&file), rig.services());

    assert!(matches!(outcome, Outcome::Rejected(_)));
    assert_eq!(
        s.failures,
        [RestoreError::InsufficientResources(Shortage::WorkingMemory)]
    );
}

// ───────────────────────────────────────────────────────────────────────────
// MMU
// ───────────────────────────────────────────────────────────────────────────

#[test]
fn ecs_chip_half_is_folded_onto_slow_ram() {
    let mut caps = caps(CpuModel::M68040);
    caps.chipset = ChipsetId(0x2000);
    let file = StatefileBuilder::new()
        .cpu(68040)
        .chipset(0x2000)
        .ram(b"CRAM", &pattern(M, 6))
        .finish();
    let mut rig = Rig::new();
    let mut s = Session::new(no_wait(), caps, ecs_host(), SparseMemory::new());

    let outcome = restore(&mut s, SliceStream::new(&file), rig.services());

    assert!(matches!(outcome, Outcome::Resumed(_)), "{:?}", outcome);
    let bank = s.resources.bank(BankRole::Chip).copied().unwrap();
    assert!(bank.synthesized);
    assert_eq!(bank.target_size, 512 * K);
    assert_eq!(
        s.resources.claimed_region(BankRole::Slow),
        Some(AddrRange::new(0x00c0_0000, 512 * K))
    );
    let space = s.mmu.as_ref().unwrap();
    assert_eq!(space.translate(&s.memory, 0x0008_0000), Some(0x00c0_0000));
    assert_eq!(space.translate(&s.memory, 0x000f_f000), Some(0x00c7_f000));
    assert!(!s.warnings.contains(&CompatWarning::ChipRamRemapped));
    assert!(rig.handoff.plan.and_then(|p| p.mmu_root).is_some());
    // Nothing the host handed out may live in the folded slow RAM
    assert!(!(0x00c0_0000..0x00c8_0000).contains(&bank.source.unwrap()));
    for chunk in space.storage_chunks() {
        assert!(!chunk.overlaps(&AddrRange::new(0x00c0_0000, 512 * K)));
    }
}

#[test]
fn ecs_fold_needs_the_whole_tail_in_slow_ram() {
    let mut caps = caps(CpuModel::M68040);
    caps.chipset = ChipsetId(0x2000);
    // 2M snapshot on 512K chip: the 1.5M tail cannot fold onto 512K slow RAM
    let file = StatefileBuilder::new()
        .cpu(68040)
        .chipset(0x2000)
        .ram(b"CRAM", &pattern(2 * M, 8))
        .finish();
    let mut rig = Rig::new();
    let mut s = Session::new(no_wait(), caps, ecs_host(), SparseMemory::new());

    let outcome = restore(&mut s, SliceStream::new(&file), rig.services());

    assert!(matches!(outcome, Outcome::Resumed(_)), "{:?}", outcome);
    assert_eq!(s.resources.claimed_region(BankRole::Slow), None);
    let bank = s.resources.bank(BankRole::Chip).copied().unwrap();
    assert!(bank.synthesized);
    let slow = 0x00c0_0000..0x00c8_0000;
    let space = s.mmu.as_ref().unwrap();
    for virt in [0x0008_0000, 0x0018_0000, 0x001f_f000] {
        let phys = space.translate(&s.memory, virt).unwrap();
        assert!(!slow.contains(&phys), "{:08x} -> {:08x}", virt, phys);
    }
    assert!(s.warnings.contains(&CompatWarning::ChipRamRemapped));
}

#[test]
fn folded_slow_ram_must_stay_clear() {
    let mut caps = caps(CpuModel::M68040);
    caps.chipset = ChipsetId(0x2000);
    // Slow RAM first: the host puts the MMU tables there
    let host = SimHost::new()
        .with_region(0, 512 * K, MemClass::Chip)
        .with_region(0x00c0_0000, 512 * K, MemClass::Fast)
        .with_region(0x0800_0000, 8 * M, MemClass::Fast);
    let file = StatefileBuilder::new().ram(b"CRAM", &pattern(M, 21)).finish();
    let mut rig = Rig::new();
    let mut s = Session::new(no_wait(), caps, host, SparseMemory::new());

    let outcome = restore(&mut s, SliceStream::new(&file), rig.services());

    assert!(matches!(outcome, Outcome::Rejected(RestoreError::Failed { pass: 1, .. })), "{:?}", outcome);
    assert!(matches!(
        s.failures.as_slice(),
        [RestoreError::InsufficientResources(Shortage::RestoreOverlap { .. })]
    ));
    assert!(rig.handoff.events.is_empty());
}

#[test]
fn ocs_chip_tail_is_remapped_to_fast_ram() {
    let file = StatefileBuilder::new().cpu(68040).ram(b"CRAM", &pattern(M, 7)).finish();
    let mut rig = Rig::new();
    let mut s = session(CpuModel::M68040, ecs_host());

    let outcome = restore(&mut s, SliceStream::new(&file), rig.services());

    assert!(matches!(outcome, Outcome::Resumed(_)), "{:?}", outcome);
    assert!(s.warnings.contains(&CompatWarning::ChipRamRemapped));
    assert_eq!(s.resources.claimed_region(BankRole::Slow), None);
    let phys = s
        .mmu
        .as_ref()
        .and_then(|m| m.translate(&s.memory, 0x0008_0000))
        .unwrap();
    assert_ne!(phys, 0x0008_0000);
}

#[test]
fn missing_fast_bank_is_synthesized() {
    let file = StatefileBuilder::new()
        .cpu(68040)
        .ram(b"CRAM", &pattern(512 * K, 8))
        .ram(b"FRAM", &pattern(M, 9))
        .finish();
    let mut rig = Rig::new();
    let mut s = session(CpuModel::M68040, a1200_host());

    let outcome = restore(&mut s, SliceStream::new(&file), rig.services());

    assert!(matches!(outcome, Outcome::Resumed(_)), "{:?}", outcome);
    let fast = s.resources.bank(BankRole::Fast).copied().unwrap();
    assert!(fast.synthesized);
    assert_eq!(fast.target_size, M);
    let space = s.mmu.as_ref().unwrap();
    let phys = space.translate(&s.memory, 0x0020_0000).unwrap();
    assert_eq!(phys % 4096, 0);
    assert!(phys >= 0x0800_0000);
}

#[test]
fn mmu_rom_overlay_gets_the_image() {
    let image = pattern(256 * K, 10);
    let file = StatefileBuilder::new()
        .cpu(68040)
        .ram(b"CRAM", &pattern(512 * K, 11))
        .rom(34, 5)
        .finish();
    let mut rig = Rig::new();
    rig.roms
        .files
        .insert("DEVS:kickstarts/kick34005.a500".into(), image.clone());
    let mut s = session(CpuModel::M68040, a1200_host());

    let outcome = restore(&mut s, SliceStream::new(&file), rig.services());

    assert!(matches!(outcome, Outcome::Resumed(_)), "{:?}", outcome);
    assert!(s.warnings.contains(&CompatWarning::Rom {
        snapshot: (34, 5),
        host: (40, 68)
    }));
    let Some(ActiveOverlay::Mmu { backing }) = s.overlay else {
        panic!("no MMU overlay: {:?}", s.overlay);
    };
    let space = s.mmu.as_ref().unwrap();
    assert_eq!(space.translate(&s.memory, 0x00f8_0000), Some(backing));
    assert_eq!(s.memory.read_vec(backing, 256 * K), image);
    assert_eq!(s.memory.read_vec(backing + 256 * K, 256 * K), image);
}

// ───────────────────────────────────────────────────────────────────────────
// Overlay boards
// ───────────────────────────────────────────────────────────────────────────

#[test]
fn board_overlay_respects_limits() {
    let host = a1200_host().with_region(0x0020_0000, M, MemClass::Fast);
    let image = pattern(512 * K, 12);
    let file = StatefileBuilder::new()
        .cpu(68020)
        .chipset(0x2300)
        .ram(b"CRAM", &pattern(512 * K, 13))
        .rom(40, 63)
        .finish();
    let mut board = FakeBoard::new(OverlayDescriptor {
        rom_addr: 0x0bf0_0000,
        board: 0x00e9_0000,
        config: 1,
        avoid_banks: 1 << BankRole::Chip.index(),
        unavailable: [Some(AddrRange::new(0x0020_0000, M)), None],
    });
    let mut rig = Rig::new();
    rig.roms.files.insert("kick40063.a1200".into(), image.clone());
    let mut s = session(CpuModel::M68020, host);
    s.caps.chipset = ChipsetId(0x2300);

    let mut services = rig.services();
    services.adapters.push(&mut board);
    let outcome = restore(&mut s, SliceStream::new(&file), services);

    assert!(matches!(outcome, Outcome::Resumed(_)), "{:?}", outcome);
    assert_eq!(board.probes, 1);
    let staged = board.activated.expect("overlay activated");
    assert!(staged.addr >= 2 * M, "staged in chip RAM at {:08x}", staged.addr);
    assert_eq!(s.memory.read_vec(0x0bf0_0000, 512 * K), image);
    assert!(s.resources.pools().iter().all(|p| p.base() != 0x0020_0000));
}

#[test]
fn board_can_take_two_ranges_off_the_bus() {
    let host = a1200_host()
        .with_region(0x0020_0000, M, MemClass::Fast)
        .with_region(0x0040_0000, M, MemClass::Fast);
    let image = pattern(512 * K, 30);
    let file = StatefileBuilder::new()
        .cpu(68020)
        .chipset(0x2300)
        .ram(b"CRAM", &pattern(512 * K, 31))
        .rom(40, 63)
        .finish();
    let gone = [AddrRange::new(0x0020_0000, M), AddrRange::new(0x0040_0000, M)];
    let mut board = FakeBoard::new(OverlayDescriptor {
        rom_addr: 0x0bf0_0000,
        board: 0x00e9_0000,
        config: 1,
        avoid_banks: 0,
        unavailable: [Some(gone[0]), Some(gone[1])],
    });
    let mut rig = Rig::new();
    rig.roms.files.insert("kick40063.a1200".into(), image.clone());
    let mut s = session(CpuModel::M68020, host);
    s.caps.chipset = ChipsetId(0x2300);

    let mut services = rig.services();
    services.adapters.push(&mut board);
    let outcome = restore(&mut s, SliceStream::new(&file), services);

    assert!(matches!(outcome, Outcome::Resumed(_)), "{:?}", outcome);
    assert_eq!(s.resources.unavailable(), &gone[..]);
    for pool in s.resources.pools() {
        let range = AddrRange::new(pool.base(), pool.size());
        assert!(gone.iter().all(|g| !g.overlaps(&range)), "pool at {:08x}", pool.base());
    }
    let staged = board.activated.expect("overlay activated");
    assert!(gone.iter().all(|g| !g.contains(staged.addr)), "staged at {:08x}", staged.addr);
    let addr = s.resources.allocate(64 * K, 8, true).unwrap();
    assert!(gone.iter().all(|g| !g.contains(addr)), "allocated at {:08x}", addr);
    assert_eq!(s.memory.read_vec(0x0bf0_0000, 512 * K), image);
}

#[test]
fn maprom_disabled_skips_probe() {
    let file = StatefileBuilder::new()
        .ram(b"CRAM", &pattern(512 * K, 14))
        .rom(34, 5)
        .finish();
    let mut board = FakeBoard::new(OverlayDescriptor::default());
    let mut rig = Rig::new();
    let mut s = Session::new(
        no_wait().with_maprom(false),
        caps(CpuModel::M68020),
        a1200_host(),
        SparseMemory::new(),
    );

    let mut services = rig.services();
    services.adapters.push(&mut board);
    restore(&mut s, SliceStream::new(&file), services);

    assert_eq!(board.probes, 0);
    assert!(s.overlay.is_none());
    assert_eq!(s.rom.wanted, Some((34, 5)));
}

// ───────────────────────────────────────────────────────────────────────────
// Register chunks and flow
// ───────────────────────────────────────────────────────────────────────────

#[test]
fn register_chunks_are_staged() {
    let file = StatefileBuilder::new()
        .cpu(68040)
        .fpu(68040)
        .chunk(b"CIAA", &[0x11; 24])
        .floppy(0, 12, "DH0:disk.adf")
        .chunk(b"SPR3", &[])
        .ram(b"CRAM", &pattern(512 * K, 15))
        .finish();
    let mut rig = Rig::new();
    let config = LoaderConfig::default().with_test_mode(true).with_mmu(revive_loader::MmuPolicy::Disabled);
    let mut s = Session::new(config, caps(CpuModel::M68040), a1200_host(), SparseMemory::new());

    let outcome = restore(&mut s, SliceStream::new(&file), rig.services());

    assert!(matches!(outcome, Outcome::TestFinished(_)), "{:?}", outcome);
    let cia = s.staged(RegisterChunk::CiaA).unwrap();
    assert_eq!(s.memory.read_vec(cia.addr, cia.len), [0x11; 24]);
    assert!(s.staged(RegisterChunk::Floppy(0)).is_some());
    assert!(s.staged(RegisterChunk::Sprite(3)).is_none());
    assert!(s.staged(RegisterChunk::Rom).is_none());
    assert_eq!(s.fpu_regs.map(|f| f.len), Some(108));
    assert!(rig.handoff.events.is_empty());
}

#[test]
fn test_mode_leaves_memory_alone() {
    let file = StatefileBuilder::new().ram(b"CRAM", &pattern(512 * K, 16)).finish();
    let mut rig = Rig::new();
    let mut s = Session::new(
        LoaderConfig::default().with_test_mode(true),
        caps(CpuModel::M68020),
        a1200_host(),
        SparseMemory::new(),
    );

    let outcome = restore(&mut s, SliceStream::new(&file), rig.services());

    assert!(matches!(outcome, Outcome::TestFinished(_)));
    assert_eq!(s.memory.read_vec(0, 16), [0u8; 16]);
    assert!(rig.handoff.events.is_empty());
}

#[test]
fn operator_is_asked_before_commit() {
    let file = StatefileBuilder::new().ram(b"CRAM", &pattern(512 * K, 17)).finish();
    let mut rig = Rig::new();
    let mut s = Session::new(LoaderConfig::default(), caps(CpuModel::M68020), a1200_host(), SparseMemory::new());

    restore(&mut s, SliceStream::new(&file), rig.services());

    assert_eq!(rig.handoff.events, ["wait", "shutdown", "resume"]);
}

#[test]
fn foreign_file_is_rejected() {
    let mut w = StatefileWriter::new();
    w.chunk(*b"CPU ", &[0; 8]);
    w.end();
    let file = w.finish();
    let mut rig = Rig::new();
    let mut s = session(CpuModel::M68020, a1200_host());

    let outcome = restore(&mut s, SliceStream::new(&file), rig.services());

    assert_eq!(outcome, Outcome::Rejected(RestoreError::Format(FormatError::NotStatefile)));
}

#[test]
fn truncated_file_is_rejected() {
    let file = StatefileBuilder::new()
        .cpu(68020)
        .ram(b"CRAM", &pattern(512 * K, 18))
        .finish_truncated();
    let mut rig = Rig::new();
    let mut s = session(CpuModel::M68020, a1200_host());

    let outcome = restore(&mut s, SliceStream::new(&file), rig.services());

    assert_eq!(outcome, Outcome::Rejected(RestoreError::Format(FormatError::Truncated)));
}

#[test]
fn missing_fpu_is_fatal() {
    let file = StatefileBuilder::new()
        .cpu(68020)
        .fpu(68882)
        .ram(b"CRAM", &pattern(512 * K, 19))
        .finish();
    let mut rig = Rig::new();
    let mut s = session(CpuModel::M68020, a1200_host());

    let outcome = restore(&mut s, SliceStream::new(&file), rig.services());

    assert!(matches!(outcome, Outcome::Rejected(RestoreError::Failed { pass: 1, .. })));
    assert_eq!(s.failures, [RestoreError::UnsupportedFeature(Feature::Fpu)]);
}

#[test]
fn run_always_exits_zero() {
    let good = StatefileBuilder::new().ram(b"CRAM", &pattern(512 * K, 20)).finish();
    let mut rig = Rig::new();
    assert_eq!(
        run(no_wait(), caps(CpuModel::M68020), a1200_host(), SparseMemory::new(), SliceStream::new(&good), rig.services()),
        0
    );
    assert_eq!(rig.handoff.events, ["shutdown", "resume"]);

    let bad = b"not a statefile at all".to_vec();
    let mut rig = Rig::new();
    assert_eq!(
        run(no_wait(), caps(CpuModel::M68020), a1200_host(), SparseMemory::new(), SliceStream::new(&bad), rig.services()),
        0
    );
    assert!(rig.handoff.events.is_empty());
}
