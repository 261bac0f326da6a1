//! Host layouts shared by the resource manager tests.

#![allow(dead_code)]

use revive_mem::sim::SimHost;
use revive_mem::MemClass;

pub const K: u32 = 1024;
pub const M: u32 = 1024 * K;

/// 2MB chip, 8MB fast on a 32-bit board.
pub fn a1200_with_fast() -> SimHost {
    SimHost::new()
        .with_region(0, 2 * M, MemClass::Chip)
        .with_region(0x0800_0000, 8 * M, MemClass::Fast)
}

/// 512KB chip, 512KB slow at 0xC00000, 1MB fast.
pub fn a500_expanded() -> SimHost {
    SimHost::new()
        .with_region(0, 512 * K, MemClass::Chip)
        .with_region(0x00c0_0000, 512 * K, MemClass::Fast)
        .with_region(0x0020_0000, M, MemClass::Fast)
}
