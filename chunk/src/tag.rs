//! Chunk tags and their classification.

use core::fmt;

/// Four-character chunk tag.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tag(pub [u8; 4]);

impl Tag {
    pub const START: Tag = Tag(*b"ASF ");
    pub const END: Tag = Tag(*b"END ");
    pub const CPU: Tag = Tag(*b"CPU ");
    pub const FPU: Tag = Tag(*b"FPU ");
    pub const CHIP: Tag = Tag(*b"CHIP");
    pub const AGA_COLORS: Tag = Tag(*b"AGAC");
    pub const CIA_A: Tag = Tag(*b"CIAA");
    pub const CIA_B: Tag = Tag(*b"CIAB");
    pub const ROM: Tag = Tag(*b"ROM ");
    pub const CD32: Tag = Tag(*b"CD32");
    pub const CDTV: Tag = Tag(*b"CDTV");
    pub const DMAC: Tag = Tag(*b"DMAC");
    pub const CHIP_RAM: Tag = Tag(*b"CRAM");
    pub const SLOW_RAM: Tag = Tag(*b"BRAM");
    pub const FAST_RAM: Tag = Tag(*b"FRAM");

    pub const fn new(bytes: [u8; 4]) -> Self {
        Tag(bytes)
    }

    pub const fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }

    /// Tag as text, with non-printable bytes shown as `?`.
    pub fn printable(&self) -> [char; 4] {
        let mut out = ['?'; 4];
        for (o, &b) in out.iter_mut().zip(self.0.iter()) {
            if (0x20..0x7f).contains(&b) {
                *o = b as char;
            }
        }
        out
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for c in self.printable() {
            write!(f, "{}", c)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tag(\"{}\")", self)
    }
}

/// Tags describing hardware this engine cannot put back: extra RAM
/// expansions, board specific RAM and RTG/filesystem state.
pub const DENY_LIST: [Tag; 13] = [
    Tag(*b"FRA2"),
    Tag(*b"FRA3"),
    Tag(*b"FRA4"),
    Tag(*b"ZRA2"),
    Tag(*b"ZRA3"),
    Tag(*b"ZRA4"),
    Tag(*b"ZCRM"),
    Tag(*b"PRAM"),
    Tag(*b"A3K1"),
    Tag(*b"A3K2"),
    Tag(*b"BORO"),
    Tag(*b"P96 "),
    Tag(*b"FSYC"),
];

/// Memory-bearing chunks, one per bank role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RamChunk {
    /// `CRAM`, restored at 0x000000
    Chip,
    /// `BRAM`, restored at 0xC00000
    Slow,
    /// `FRAM`, restored at 0x200000
    Fast,
}

impl RamChunk {
    pub const ALL: [RamChunk; 3] = [RamChunk::Chip, RamChunk::Slow, RamChunk::Fast];

    pub const fn tag(self) -> Tag {
        match self {
            RamChunk::Chip => Tag::CHIP_RAM,
            RamChunk::Slow => Tag::SLOW_RAM,
            RamChunk::Fast => Tag::FAST_RAM,
        }
    }

    /// Fixed physical address the bank is restored to.
    pub const fn target_address(self) -> u32 {
        match self {
            RamChunk::Chip => 0x0000_0000,
            RamChunk::Slow => 0x00c0_0000,
            RamChunk::Fast => 0x0020_0000,
        }
    }

    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn name(self) -> &'static str {
        match self {
            RamChunk::Chip => "Chip RAM",
            RamChunk::Slow => "Slow RAM",
            RamChunk::Fast => "Fast RAM",
        }
    }
}

/// Hardware register chunks staged for the takeover.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterChunk {
    Cpu,
    Fpu,
    Chipset,
    AgaColors,
    CiaA,
    CiaB,
    Rom,
    Floppy(u8),
    Audio(u8),
    Sprite(u8),
    Cd32,
    Cdtv,
    CdtvDmac,
}

impl RegisterChunk {
    /// Number of staging slots.
    pub const SLOTS: usize = 26;

    /// Stable staging slot for this chunk.
    pub const fn index(self) -> usize {
        match self {
            RegisterChunk::Cpu => 0,
            RegisterChunk::Fpu => 1,
            RegisterChunk::Chipset => 2,
            RegisterChunk::AgaColors => 3,
            RegisterChunk::CiaA => 4,
            RegisterChunk::CiaB => 5,
            RegisterChunk::Rom => 6,
            RegisterChunk::Floppy(n) => 7 + (n as usize & 3),
            RegisterChunk::Audio(n) => 11 + (n as usize & 3),
            RegisterChunk::Sprite(n) => 15 + (n as usize & 7),
            RegisterChunk::Cd32 => 23,
            RegisterChunk::Cdtv => 24,
            RegisterChunk::CdtvDmac => 25,
        }
    }
}

/// What a tag means to the loader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkKind {
    Start,
    End,
    Register(RegisterChunk),
    Memory(RamChunk),
    /// Deny-listed: the snapshot needs hardware we cannot restore
    Unsupported,
    /// Skipped silently
    Unknown,
}

fn digit(b: u8, max: u8) -> Option<u8> {
    match b.checked_sub(b'0') {
        Some(n) if n < max => Some(n),
        _ => None,
    }
}

/// Classify a chunk tag.
pub fn classify(tag: Tag) -> ChunkKind {
    if DENY_LIST.contains(&tag) {
        return ChunkKind::Unsupported;
    }
    let b = tag.0;
    match &b {
        b"ASF " => ChunkKind::Start,
        b"END " => ChunkKind::End,
        b"CPU " => ChunkKind::Register(RegisterChunk::Cpu),
        b"FPU " => ChunkKind::Register(RegisterChunk::Fpu),
        b"CHIP" => ChunkKind::Register(RegisterChunk::Chipset),
        b"AGAC" => ChunkKind::Register(RegisterChunk::AgaColors),
        b"CIAA" => ChunkKind::Register(RegisterChunk::CiaA),
        b"CIAB" => ChunkKind::Register(RegisterChunk::CiaB),
        b"ROM " => ChunkKind::Register(RegisterChunk::Rom),
        b"CD32" => ChunkKind::Register(RegisterChunk::Cd32),
        b"CDTV" => ChunkKind::Register(RegisterChunk::Cdtv),
        b"DMAC" => ChunkKind::Register(RegisterChunk::CdtvDmac),
        b"CRAM" => ChunkKind::Memory(RamChunk::Chip),
        b"BRAM" => ChunkKind::Memory(RamChunk::Slow),
        b"FRAM" => ChunkKind::Memory(RamChunk::Fast),
        [b'D', b'S', b'K', n] => match digit(*n, 4) {
            Some(n) => ChunkKind::Register(RegisterChunk::Floppy(n)),
            None => ChunkKind::Unknown,
        },
        [b'A', b'U', b'D', n] => match digit(*n, 4) {
            Some(n) => ChunkKind::Register(RegisterChunk::Audio(n)),
            None => ChunkKind::Unknown,
        },
        [b'S', b'P', b'R', n] => match digit(*n, 8) {
            Some(n) => ChunkKind::Register(RegisterChunk::Sprite(n)),
            None => ChunkKind::Unknown,
        },
        _ => ChunkKind::Unknown,
    }
}
