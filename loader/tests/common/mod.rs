//! Statefile builders, simulated machines and recording services shared
//! by the loader tests.

#![allow(dead_code)]

use std::collections::HashMap;

use revive_chunk::{ChunkError, ChunkStream, SliceStream, StatefileWriter};
use revive_loader::{
    CodeImage, CpuModel, Decompressor, Handoff, HostCapabilities, OverlayDescriptor, RomImageSource,
    RomOverlayAdapter, Services, StagedChunk, TakeoverPlan,
};
use revive_mem::sim::SimHost;
use revive_mem::{MemClass, PhysicalMemory};

pub const K: u32 = 1024;
pub const M: u32 = 1024 * K;

/// Where the test "code image" claims to be loaded.
pub const CODE_LOAD: u32 = 0x0040_0000;

// ═══════════════════════════════════════════════════════════════════════════
// STATEFILES
// ═══════════════════════════════════════════════════════════════════════════

/// Deterministic payload of `len` bytes.
pub fn pattern(len: u32, seed: u8) -> Vec<u8> {
    (0..len).map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed ^ (i >> 12) as u8)).collect()
}

/// Well-formed statefile streams.
pub struct StatefileBuilder {
    w: StatefileWriter,
}

impl StatefileBuilder {
    pub fn new() -> Self {
        let mut w = StatefileWriter::new();
        w.start();
        Self { w }
    }

    pub fn chunk(mut self, tag: &[u8; 4], payload: &[u8]) -> Self {
        self.w.chunk(*tag, payload);
        self
    }

    pub fn cpu(self, model: u32) -> Self {
        let mut p = model.to_be_bytes().to_vec();
        p.extend_from_slice(&[0; 4]);
        self.chunk(b"CPU ", &p)
    }

    pub fn fpu(self, model: u32) -> Self {
        let mut p = vec![0u8; 8 + 80 + 12];
        p[0..4].copy_from_slice(&model.to_be_bytes());
        self.chunk(b"FPU ", &p)
    }

    pub fn chipset(self, vposr: u16) -> Self {
        let mut p = vec![0u8; 16];
        p[8..10].copy_from_slice(&vposr.to_be_bytes());
        self.chunk(b"CHIP", &p)
    }

    pub fn ram(self, tag: &[u8; 4], data: &[u8]) -> Self {
        self.chunk(tag, data)
    }

    /// Compressed memory chunk; the "deflate stream" is a 2-byte header
    /// followed by the data as-is, which [`StoredInflate`] understands.
    pub fn compressed_ram(mut self, tag: &[u8; 4], data: &[u8]) -> Self {
        let mut stream = vec![0x78, 0x9c];
        stream.extend_from_slice(data);
        self.w.compressed_chunk(*tag, data.len() as u32, &stream);
        self
    }

    pub fn rom(self, version: u16, revision: u16) -> Self {
        let mut p = Vec::new();
        p.extend_from_slice(&0x00f8_0000u32.to_be_bytes());
        p.extend_from_slice(&(512 * K).to_be_bytes());
        p.extend_from_slice(&0u32.to_be_bytes());
        p.extend_from_slice(&version.to_be_bytes());
        p.extend_from_slice(&revision.to_be_bytes());
        p.extend_from_slice(&0xdead_beefu32.to_be_bytes());
        p.extend_from_slice(b"KS ROM\0kick.rom\0");
        self.chunk(b"ROM ", &p)
    }

    pub fn floppy(self, drive: u8, track: u8, path: &str) -> Self {
        let mut p = vec![0u8; 16];
        p[5] = track;
        p.extend_from_slice(path.as_bytes());
        p.push(0);
        let tag = [b'D', b'S', b'K', b'0' + drive];
        self.chunk(&tag, &p)
    }

    pub fn finish(mut self) -> Vec<u8> {
        self.w.end();
        self.w.finish()
    }

    /// Stream without the closing `END `.
    pub fn finish_truncated(mut self) -> Vec<u8> {
        self.w.finish()
    }
}

/// Counts the bytes actually read from the underlying stream.
pub struct CountingStream<'a> {
    pub inner: SliceStream<'a>,
    pub bytes_read: u32,
}

impl<'a> CountingStream<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            inner: SliceStream::new(data),
            bytes_read: 0,
        }
    }
}

impl ChunkStream for CountingStream<'_> {
    fn read(&mut self, buf: &mut [u8]) -> usize {
        let n = self.inner.read(buf);
        self.bytes_read += n as u32;
        n
    }

    fn seek(&mut self, position: u32) -> Result<(), ChunkError> {
        self.inner.seek(position)
    }

    fn position(&self) -> u32 {
        self.inner.position()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// MACHINES
// ═══════════════════════════════════════════════════════════════════════════

/// 2MB chip, 8MB fast on a 32-bit board.
pub fn a1200_host() -> SimHost {
    SimHost::new()
        .with_region(0, 2 * M, MemClass::Chip)
        .with_region(0x0800_0000, 8 * M, MemClass::Fast)
}

/// 512KB chip, 8MB fast, 512KB slow at 0xC00000. Slow RAM is listed
/// last, like its lower allocation priority on the real machine.
pub fn ecs_host() -> SimHost {
    SimHost::new()
        .with_region(0, 512 * K, MemClass::Chip)
        .with_region(0x0800_0000, 8 * M, MemClass::Fast)
        .with_region(0x00c0_0000, 512 * K, MemClass::Fast)
}

pub fn caps(cpu: CpuModel) -> HostCapabilities {
    HostCapabilities {
        cpu,
        mmu_present: cpu >= CpuModel::M68040,
        rom_version: (40, 68),
        ..HostCapabilities::default()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// SERVICES
// ═══════════════════════════════════════════════════════════════════════════

/// ROM images by path.
#[derive(Default)]
pub struct MemRoms {
    pub files: HashMap<String, Vec<u8>>,
}

impl RomImageSource for MemRoms {
    fn size(&mut self, path: &str) -> Option<u32> {
        self.files.get(path).map(|f| f.len() as u32)
    }

    fn read(&mut self, path: &str, buf: &mut [u8]) -> usize {
        let Some(f) = self.files.get(path) else {
            return 0;
        };
        let n = f.len().min(buf.len());
        buf[..n].copy_from_slice(&f[..n]);
        n
    }
}

/// Understands the stored format written by
/// [`StatefileBuilder::compressed_ram`].
#[derive(Default)]
pub struct StoredInflate {
    pub calls: Vec<(u32, u32)>,
}

impl Decompressor for StoredInflate {
    fn inflate(&mut self, mem: &mut dyn PhysicalMemory, dst: u32, src: u32) {
        let len = mem.read_u32(src - 6);
        mem.copy(dst, src, len);
        self.calls.push((dst, src));
    }
}

#[derive(Default)]
pub struct RecordingHandoff {
    pub events: Vec<&'static str>,
    pub plan: Option<TakeoverPlan>,
}

impl Handoff for RecordingHandoff {
    fn wait_for_operator(&mut self) {
        self.events.push("wait");
    }

    fn shutdown_host(&mut self, plan: &TakeoverPlan) {
        self.events.push("shutdown");
        self.plan = Some(*plan);
    }

    fn resume(&mut self, _plan: &TakeoverPlan) {
        self.events.push("resume");
    }
}

/// Board that always answers the probe.
pub struct FakeBoard {
    pub descriptor: OverlayDescriptor,
    pub probes: u32,
    pub activated: Option<StagedChunk>,
}

impl FakeBoard {
    pub fn new(descriptor: OverlayDescriptor) -> Self {
        Self {
            descriptor,
            probes: 0,
            activated: None,
        }
    }
}

impl RomOverlayAdapter for FakeBoard {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn probe(&mut self, _caps: &HostCapabilities) -> Option<OverlayDescriptor> {
        self.probes += 1;
        Some(self.descriptor)
    }

    fn activate(&mut self, desc: &OverlayDescriptor, mem: &mut dyn PhysicalMemory, image: StagedChunk) {
        revive_loader::copy_rom(mem, desc.rom_addr, image);
        self.activated = Some(image);
    }
}

/// Everything a restore calls out to, owned in one place.
pub struct Rig {
    pub roms: MemRoms,
    pub inflate: StoredInflate,
    pub handoff: RecordingHandoff,
    pub code: Vec<u8>,
    pub fixups: Vec<u32>,
}

impl Rig {
    pub fn new() -> Self {
        Self {
            roms: MemRoms::default(),
            inflate: StoredInflate::default(),
            handoff: RecordingHandoff::default(),
            code: vec![0x4e; 64],
            fixups: Vec::new(),
        }
    }

    pub fn services(&mut self) -> Services<'_> {
        Services {
            adapters: Vec::new(),
            roms: &mut self.roms,
            decompressor: &mut self.inflate,
            handoff: &mut self.handoff,
            image: CodeImage {
                bytes: &self.code,
                load_addr: CODE_LOAD,
                fixups: &self.fixups,
                entry: CODE_LOAD + 8,
            },
        }
    }
}
