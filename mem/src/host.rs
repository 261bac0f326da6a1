//! Host Memory Interface
//!
//! The restorer runs as a guest of the host operating system until the
//! takeover. Everything it knows about RAM comes from the host's memory
//! list, and every byte it uses is claimed through the host allocator:
//!
//! ```text
//!   regions() ──► [ chip 000000-1fffff ][ slow c00000-c7ffff ][ fast 200000-... ]
//!                        │                                           │
//!   claim_at(addr, n) ───┘   exact claims (bump pools, bank probes)  │
//!   pool_claim(h, n)  ───────────────── region free-list ────────────┘
//! ```
//!
//! Walking the memory list must happen with task switching disabled; see
//! [`with_exclusion`].

use alloc::vec::Vec;
use core::ops::{Deref, DerefMut};

/// Address-class requested from the host allocator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemClass {
    /// Reachable by the custom chipset
    Chip,
    /// CPU-only memory
    Fast,
    /// No preference
    Any,
}

impl MemClass {
    /// Whether a region of class `self` satisfies a request for `want`.
    pub fn satisfies(self, want: MemClass) -> bool {
        want == MemClass::Any || self == want
    }
}

/// Opaque handle of a host memory region's free-list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PoolHandle(pub u32);

/// Half-open physical address range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AddrRange {
    pub start: u32,
    pub end: u64,
}

impl AddrRange {
    pub const fn new(start: u32, size: u32) -> Self {
        Self {
            start,
            end: start as u64 + size as u64,
        }
    }

    pub const fn size(&self) -> u32 {
        let size = self.end - self.start as u64;
        if size > u32::MAX as u64 {
            u32::MAX
        } else {
            size as u32
        }
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start as u64
    }

    pub fn contains(&self, addr: u32) -> bool {
        addr >= self.start && (addr as u64) < self.end
    }

    pub fn overlaps(&self, other: &AddrRange) -> bool {
        (self.start as u64) < other.end && (other.start as u64) < self.end
    }
}

/// One entry of the host memory list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostRegion {
    /// First usable byte
    pub lower: u32,
    /// One past the last usable byte
    pub upper: u32,
    pub class: MemClass,
    pub handle: PoolHandle,
}

/// Granularity the memory list is rounded to.
pub const REGION_GRANULE: u32 = 0x1_0000;

impl HostRegion {
    /// Region rounded out to 64KB: the header below `lower` and the slack
    /// above `upper` belong to the same physical bank.
    pub fn rounded(&self) -> AddrRange {
        let start = self.lower & !(REGION_GRANULE - 1);
        let end = (self.upper as u64 + (REGION_GRANULE as u64 - 1)) & !(REGION_GRANULE as u64 - 1);
        AddrRange {
            start,
            end: end.max(start as u64),
        }
    }
}

/// The host operating system's memory services.
pub trait MemoryHost {
    /// Snapshot of the memory list. Call inside an exclusion window.
    fn regions(&self) -> Vec<HostRegion>;

    /// Claim exactly `[addr, addr + size)`. `false` if any byte is in use.
    fn claim_at(&mut self, addr: u32, size: u32) -> bool;

    /// Claim `size` bytes anywhere in memory of the given class.
    fn claim_any(&mut self, size: u32, class: MemClass) -> Option<u32>;

    /// Return a claim made with `claim_at` or `claim_any`.
    fn release(&mut self, addr: u32, size: u32);

    /// Sub-allocate from one region's free-list.
    fn pool_claim(&mut self, handle: PoolHandle, size: u32) -> Option<u32>;

    /// Return a `pool_claim` allocation to its region.
    fn pool_release(&mut self, handle: PoolHandle, addr: u32, size: u32);

    /// Stop task switching.
    fn forbid(&mut self);

    /// Resume task switching.
    fn permit(&mut self);
}

/// Holds task switching off until dropped.
pub struct ExclusionGuard<'a, H: MemoryHost + ?Sized> {
    host: &'a mut H,
}

impl<'a, H: MemoryHost + ?Sized> ExclusionGuard<'a, H> {
    pub fn new(host: &'a mut H) -> Self {
        host.forbid();
        Self { host }
    }
}

impl<H: MemoryHost + ?Sized> Drop for ExclusionGuard<'_, H> {
    fn drop(&mut self) {
        self.host.permit();
    }
}

impl<H: MemoryHost + ?Sized> Deref for ExclusionGuard<'_, H> {
    type Target = H;

    fn deref(&self) -> &H {
        self.host
    }
}

impl<H: MemoryHost + ?Sized> DerefMut for ExclusionGuard<'_, H> {
    fn deref_mut(&mut self) -> &mut H {
        self.host
    }
}

/// Execute a closure with task switching disabled.
///
/// The closure must not block: no file I/O, no console input.
#[inline]
pub fn with_exclusion<H, F, R>(host: &mut H, f: F) -> R
where
    H: MemoryHost + ?Sized,
    F: FnOnce(&mut H) -> R,
{
    let mut guard = ExclusionGuard::new(host);
    f(&mut *guard)
}
