//! Operator options and host capabilities
//!
//! `LoaderConfig` is what the operator asked for; `HostCapabilities` is what
//! the machine has. [`LoaderConfig::effective`] reconciles the two before
//! anything else runs.

use revive_mmu::{CacheMode, MmuGeneration};

// ═══════════════════════════════════════════════════════════════════════════
// HOST
// ═══════════════════════════════════════════════════════════════════════════

/// CPU family member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum CpuModel {
    M68000,
    M68010,
    M68020,
    M68030,
    M68040,
    M68060,
}

impl CpuModel {
    /// Model number as stored in a statefile (`68020`, ...).
    pub const fn number(self) -> u32 {
        match self {
            Self::M68000 => 68000,
            Self::M68010 => 68010,
            Self::M68020 => 68020,
            Self::M68030 => 68030,
            Self::M68040 => 68040,
            Self::M68060 => 68060,
        }
    }

    pub const fn from_number(n: u32) -> Option<Self> {
        match n {
            68000 => Some(Self::M68000),
            68010 => Some(Self::M68010),
            68020 => Some(Self::M68020),
            68030 => Some(Self::M68030),
            68040 => Some(Self::M68040),
            68060 => Some(Self::M68060),
            _ => None,
        }
    }

    /// MMU format this CPU uses, if it has one.
    pub const fn mmu_generation(self) -> Option<MmuGeneration> {
        match self {
            Self::M68030 => Some(MmuGeneration::Mmu030),
            Self::M68040 | Self::M68060 => Some(MmuGeneration::Mmu040),
            _ => None,
        }
    }
}

/// Machine flavour, as far as a snapshot cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SystemType {
    #[default]
    Generic,
    Cdtv,
    Cd32,
}

impl SystemType {
    pub const fn name(self) -> &'static str {
        match self {
            Self::Generic => "Amiga",
            Self::Cdtv => "CDTV",
            Self::Cd32 => "CD32",
        }
    }
}

/// Chipset identification word (VPOSR).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChipsetId(pub u16);

impl ChipsetId {
    pub const fn is_aga(self) -> bool {
        self.0 & 0x0f00 == 0x0300
    }

    pub const fn is_ecs(self) -> bool {
        self.0 & 0x2000 != 0
    }

    pub const fn is_ntsc(self) -> bool {
        self.0 & 0x1000 != 0
    }

    pub const fn name(self) -> &'static str {
        if self.is_aga() {
            "AGA"
        } else if self.is_ecs() {
            "ECS"
        } else {
            "OCS"
        }
    }

    pub const fn video(self) -> &'static str {
        if self.is_ntsc() {
            "NTSC"
        } else {
            "PAL"
        }
    }
}

/// What the probed machine has.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostCapabilities {
    pub cpu: CpuModel,
    /// External FPU model number (68881, 68882), 0 when none
    pub fpu: u32,
    /// 68040/060: the MMU answered the detection probe
    pub mmu_present: bool,
    pub chipset: ChipsetId,
    /// Version and revision of the ROM at `0xF80000`
    pub rom_version: (u16, u16),
    pub system: SystemType,
    pub os_version: u16,
}

impl HostCapabilities {
    /// FPU as a statefile would describe it. The 68040 and 68060 report
    /// their internal unit.
    pub fn fpu_model(&self) -> u32 {
        match self.cpu {
            CpuModel::M68060 => 68060,
            CpuModel::M68040 => 68040,
            _ => self.fpu,
        }
    }
}

impl Default for HostCapabilities {
    fn default() -> Self {
        Self {
            cpu: CpuModel::M68000,
            fpu: 0,
            mmu_present: false,
            chipset: ChipsetId::default(),
            rom_version: (0, 0),
            system: SystemType::Generic,
            os_version: 0,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// OPTIONS
// ═══════════════════════════════════════════════════════════════════════════

/// When to build an MMU address space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MmuPolicy {
    /// 68040/060 with a working MMU; never the 68030
    #[default]
    Auto,
    /// Also use the 68030 MMU
    Force,
    Disabled,
}

/// Operator options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoaderConfig {
    pub debug: bool,
    /// Stop before the takeover
    pub test_mode: bool,
    /// Don't wait for the operator before the takeover
    pub no_wait: bool,
    pub use_maprom: bool,
    pub mmu: MmuPolicy,
    /// Caches off before starting
    pub no_cache: bool,
    /// Caches off when taking over
    pub no_cache_takeover: bool,
    pub force_pal: bool,
    pub force_ntsc: bool,
    /// Wait for a mouse click after restoring
    pub pause: bool,
    /// Leave the floppy drives alone
    pub no_floppy: bool,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            debug: false,
            test_mode: false,
            no_wait: false,
            use_maprom: true,
            mmu: MmuPolicy::Auto,
            no_cache: false,
            no_cache_takeover: false,
            force_pal: false,
            force_ntsc: false,
            pause: false,
            no_floppy: false,
        }
    }
}

impl LoaderConfig {
    pub fn with_debug(mut self, on: bool) -> Self {
        self.debug = on;
        self
    }

    pub fn with_test_mode(mut self, on: bool) -> Self {
        self.test_mode = on;
        self
    }

    pub fn with_no_wait(mut self, on: bool) -> Self {
        self.no_wait = on;
        self
    }

    pub fn with_maprom(mut self, on: bool) -> Self {
        self.use_maprom = on;
        self
    }

    pub fn with_mmu(mut self, policy: MmuPolicy) -> Self {
        self.mmu = policy;
        self
    }

    pub fn with_no_cache(mut self, on: bool) -> Self {
        self.no_cache = on;
        self
    }

    /// Reconcile the options with the machine.
    ///
    /// The result's `mmu` is `Force` when an address space will be built
    /// and `Disabled` otherwise.
    pub fn effective(&self, caps: &HostCapabilities) -> Self {
        let mut out = *self;
        out.mmu = match (caps.cpu, self.mmu) {
            (_, MmuPolicy::Disabled) => MmuPolicy::Disabled,
            (cpu, _) if cpu < CpuModel::M68030 => MmuPolicy::Disabled,
            (CpuModel::M68030, MmuPolicy::Auto) => MmuPolicy::Disabled,
            (CpuModel::M68030, MmuPolicy::Force) => MmuPolicy::Force,
            (_, _) if caps.mmu_present => MmuPolicy::Force,
            _ => MmuPolicy::Disabled,
        };
        if caps.cpu < CpuModel::M68020 {
            out.no_cache = false;
            out.no_cache_takeover = false;
        }
        out
    }

    /// Whether an effective config builds an address space.
    pub fn uses_mmu(&self) -> bool {
        self.mmu == MmuPolicy::Force
    }

    /// Cache mode of the identity map.
    pub fn default_cache(&self) -> CacheMode {
        if self.no_cache || self.no_cache_takeover {
            CacheMode::NonCacheable
        } else {
            CacheMode::WriteThrough
        }
    }
}
