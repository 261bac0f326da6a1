//! Simulated host
//!
//! A host memory list with exact claim tracking, and a sparse physical
//! address space. Used by the test suites and by tools that dry-run a
//! statefile on a development machine.
//!
//! ```ignore
//! let host = SimHost::new()
//!     .with_region(0x000000, 2 << 20, MemClass::Chip)
//!     .with_region(0x200000, 8 << 20, MemClass::Fast);
//! ```

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::vec::Vec;

use crate::arena::PAGE_SIZE;
use crate::host::{AddrRange, HostRegion, MemClass, MemoryHost, PoolHandle};
use crate::physical::PhysicalMemory;

/// Claims are handed out on this boundary, like the host allocator does.
const CLAIM_ALIGN: u32 = 8;

// ═══════════════════════════════════════════════════════════════════════════
// HOST MEMORY LIST
// ═══════════════════════════════════════════════════════════════════════════

/// Simulated host memory services.
#[derive(Debug, Default, Clone)]
pub struct SimHost {
    regions: Vec<HostRegion>,
    claims: Vec<AddrRange>,
    forbid_depth: u32,
    windows: u32,
    claim_log: Vec<(u32, u32)>,
    release_log: Vec<(u32, u32)>,
}

impl SimHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a memory list entry covering `[base, base + size)`.
    pub fn with_region(mut self, base: u32, size: u32, class: MemClass) -> Self {
        let handle = PoolHandle(self.regions.len() as u32);
        self.regions.push(HostRegion {
            lower: base,
            upper: base.saturating_add(size),
            class,
            handle,
        });
        self
    }

    /// Mark memory as used by someone else (other tasks, the host itself).
    pub fn occupy(&mut self, addr: u32, size: u32) {
        self.claims.push(AddrRange::new(addr, size));
    }

    pub fn forbid_depth(&self) -> u32 {
        self.forbid_depth
    }

    /// Number of outermost forbid/permit windows entered so far.
    pub fn exclusion_windows(&self) -> u32 {
        self.windows
    }

    /// Successful claims, oldest first.
    pub fn claim_log(&self) -> &[(u32, u32)] {
        &self.claim_log
    }

    /// Releases, oldest first.
    pub fn release_log(&self) -> &[(u32, u32)] {
        &self.release_log
    }

    /// Outstanding claims, including `occupy` ones.
    pub fn claim_count(&self) -> usize {
        self.claims.len()
    }

    pub fn is_claimed(&self, addr: u32) -> bool {
        self.claims.iter().any(|c| c.contains(addr))
    }

    fn region_for(&self, range: &AddrRange) -> Option<&HostRegion> {
        self.regions
            .iter()
            .find(|r| range.start >= r.lower && range.end <= r.upper as u64)
    }

    fn is_free(&self, range: &AddrRange) -> bool {
        !self.claims.iter().any(|c| c.overlaps(range))
    }

    fn first_fit(&self, region: &HostRegion, size: u32) -> Option<u32> {
        let mut candidate = region.lower.checked_add(CLAIM_ALIGN - 1)? & !(CLAIM_ALIGN - 1);
        loop {
            let range = AddrRange::new(candidate, size);
            if range.end > region.upper as u64 {
                return None;
            }
            match self.claims.iter().filter(|c| c.overlaps(&range)).map(|c| c.end).max() {
                Some(end) => {
                    let next = (end + (CLAIM_ALIGN as u64 - 1)) & !(CLAIM_ALIGN as u64 - 1);
                    candidate = u32::try_from(next).ok()?;
                }
                None => return Some(candidate),
            }
        }
    }

    fn take(&mut self, addr: u32, size: u32) {
        self.claims.push(AddrRange::new(addr, size));
        self.claim_log.push((addr, size));
    }

    fn give_back(&mut self, addr: u32, size: u32) {
        let range = AddrRange::new(addr, size);
        if let Some(i) = self.claims.iter().position(|c| *c == range) {
            self.claims.remove(i);
        }
        self.release_log.push((addr, size));
    }
}

impl MemoryHost for SimHost {
    fn regions(&self) -> Vec<HostRegion> {
        self.regions.clone()
    }

    fn claim_at(&mut self, addr: u32, size: u32) -> bool {
        let range = AddrRange::new(addr, size);
        if self.region_for(&range).is_none() || !self.is_free(&range) {
            return false;
        }
        self.take(addr, size);
        true
    }

    fn claim_any(&mut self, size: u32, class: MemClass) -> Option<u32> {
        let addr = self
            .regions
            .iter()
            .filter(|r| r.class.satisfies(class))
            .find_map(|r| self.first_fit(r, size))?;
        self.take(addr, size);
        Some(addr)
    }

    fn release(&mut self, addr: u32, size: u32) {
        self.give_back(addr, size);
    }

    fn pool_claim(&mut self, handle: PoolHandle, size: u32) -> Option<u32> {
        let region = *self.regions.iter().find(|r| r.handle == handle)?;
        let addr = self.first_fit(&region, size)?;
        self.take(addr, size);
        Some(addr)
    }

    fn pool_release(&mut self, _handle: PoolHandle, addr: u32, size: u32) {
        self.give_back(addr, size);
    }

    fn forbid(&mut self) {
        if self.forbid_depth == 0 {
            self.windows += 1;
        }
        self.forbid_depth += 1;
    }

    fn permit(&mut self) {
        self.forbid_depth = self.forbid_depth.saturating_sub(1);
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// SPARSE PHYSICAL MEMORY
// ═══════════════════════════════════════════════════════════════════════════

/// 32-bit address space backed by pages allocated on first write.
/// Unwritten memory reads as zero.
#[derive(Debug, Default, Clone)]
pub struct SparseMemory {
    pages: BTreeMap<u32, Box<[u8; PAGE_SIZE as usize]>>,
}

impl SparseMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of pages touched by writes.
    pub fn resident_pages(&self) -> usize {
        self.pages.len()
    }

    pub fn read_vec(&self, addr: u32, len: u32) -> Vec<u8> {
        let mut v = alloc::vec![0u8; len as usize];
        self.read_bytes(addr, &mut v);
        v
    }

    fn split(addr: u32) -> (u32, usize) {
        (addr & !(PAGE_SIZE - 1), (addr & (PAGE_SIZE - 1)) as usize)
    }
}

impl PhysicalMemory for SparseMemory {
    fn read_bytes(&self, addr: u32, buf: &mut [u8]) {
        let mut done = 0usize;
        while done < buf.len() {
            let (page, off) = Self::split(addr.wrapping_add(done as u32));
            let n = (PAGE_SIZE as usize - off).min(buf.len() - done);
            match self.pages.get(&page) {
                Some(p) => buf[done..done + n].copy_from_slice(&p[off..off + n]),
                None => buf[done..done + n].fill(0),
            }
            done += n;
        }
    }

    fn write_bytes(&mut self, addr: u32, data: &[u8]) {
        let mut done = 0usize;
        while done < data.len() {
            let (page, off) = Self::split(addr.wrapping_add(done as u32));
            let n = (PAGE_SIZE as usize - off).min(data.len() - done);
            let p = self
                .pages
                .entry(page)
                .or_insert_with(|| Box::new([0u8; PAGE_SIZE as usize]));
            p[off..off + n].copy_from_slice(&data[done..done + n]);
            done += n;
        }
    }
}
