//! Resource Manager
//!
//! Tracks every physical memory claim made while preparing a restore, and
//! hands out working memory from spare RAM the snapshot does not use.
//!
//! # Design
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────────┐
//! │                        RESOURCE MANAGER                            │
//! │                                                                    │
//! │  ┌──────────────┐   ┌──────────────────┐   ┌──────────────────┐    │
//! │  │  BankTable   │   │  Pools[4]        │   │ Allocation log   │    │
//! │  │ chip/slow/   │   │ ranked spare RAM │   │ 64 entries, LIFO │    │
//! │  │ fast targets │   │ free-list + bump │   │                  │    │
//! │  └──────────────┘   └──────────────────┘   └──────────────────┘    │
//! │         │                    │                       ▲             │
//! │         └── allocate_in_bank └── allocate ───────────┘             │
//! └────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Pools are ranked so that chip-class memory (below 2MB) is used last;
//! the chipset can only reach chip RAM and the snapshot usually wants all
//! of it. Releases walk the log backwards: a free-list sub-allocation goes
//! back to its region before anything claimed ahead of it.

use alloc::vec::Vec;

use crate::arena::{align_up, Arena, PAGE_SIZE};
use crate::bank::{BankRole, BankTable, MemoryBank};
use crate::error::MemError;
use crate::host::{with_exclusion, AddrRange, MemClass, MemoryHost, PoolHandle};

// ═══════════════════════════════════════════════════════════════════════════
// CONSTANTS
// ═══════════════════════════════════════════════════════════════════════════

/// Maximum number of extra-RAM pools
pub const MAX_POOLS: usize = 4;

/// Maximum number of tracked allocations
pub const MAX_ALLOCATIONS: usize = 64;

/// Smallest spare region worth keeping as a pool
pub const MIN_POOL_SIZE: u32 = 512 * 1024;

/// Default allocation alignment
pub const DEFAULT_ALIGN: u32 = 8;

/// Bump cursor step after a failed claim
const BUMP_STEP: u32 = 8;

/// Probe stride inside a bank's target range
const BANK_PROBE_STRIDE: u32 = PAGE_SIZE;

/// Pools based below this are chip-class and ranked last
const CHIP_CLASS_LIMIT: u32 = 0x0020_0000;

// ═══════════════════════════════════════════════════════════════════════════
// TYPES
// ═══════════════════════════════════════════════════════════════════════════

/// A spare RAM range used for working memory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Pool {
    pub arena: Arena,
    /// Host free-list of the region, when the pool is a whole host region
    pub free_list: Option<PoolHandle>,
}

impl Pool {
    pub fn base(&self) -> u32 {
        self.arena.base()
    }

    pub fn size(&self) -> u32 {
        self.arena.size()
    }

    pub fn is_chip_class(&self) -> bool {
        self.base() < CHIP_CLASS_LIMIT
    }

    fn range(&self) -> AddrRange {
        AddrRange::new(self.base(), self.size())
    }

    /// Rank key: non-chip first, larger first, lower base first.
    fn rank(&self) -> (bool, core::cmp::Reverse<u32>, u32) {
        (self.is_chip_class(), core::cmp::Reverse(self.size()), self.base())
    }
}

/// How a claim was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimKind {
    /// Sub-allocated from a pool region's free-list
    PoolFreeList,
    /// Exact claim at a pool's bump cursor
    PoolBump,
    /// Exact claim inside a bank's target range
    Bank,
    /// Exact claim at a caller-chosen address
    Fixed,
    /// Aligned claim straight from the host (MMU backing and tables)
    Host,
}

/// One entry of the allocation log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Allocation {
    pub addr: u32,
    pub size: u32,
    pub free_list: Option<PoolHandle>,
    pub kind: ClaimKind,
}

impl Allocation {
    const EMPTY: Allocation = Allocation {
        addr: 0,
        size: 0,
        free_list: None,
        kind: ClaimKind::Fixed,
    };

    pub fn range(&self) -> AddrRange {
        AddrRange::new(self.addr, self.size)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// RESOURCE MANAGER
// ═══════════════════════════════════════════════════════════════════════════

/// Owner of the host memory interface for the duration of a restore.
pub struct ResourceManager<H: MemoryHost> {
    host: H,
    banks: BankTable,

    pools: [Pool; MAX_POOLS],
    pool_count: usize,

    allocations: [Allocation; MAX_ALLOCATIONS],
    allocation_count: usize,

    /// Ranges a hardware adapter takes off the bus when activated
    unavailable: Vec<AddrRange>,
}

impl<H: MemoryHost> ResourceManager<H> {
    pub fn new(host: H) -> Self {
        Self {
            host,
            banks: BankTable::new(),
            pools: [Pool::default(); MAX_POOLS],
            pool_count: 0,
            allocations: [Allocation::EMPTY; MAX_ALLOCATIONS],
            allocation_count: 0,
            unavailable: Vec::new(),
        }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn into_host(self) -> H {
        self.host
    }

    // ───────────────────────────────────────────────────────────────────────
    // Banks
    // ───────────────────────────────────────────────────────────────────────

    pub fn banks(&self) -> &BankTable {
        &self.banks
    }

    pub fn bank(&self, role: BankRole) -> Option<&MemoryBank> {
        self.banks.get(role)
    }

    pub fn bank_mut(&mut self, role: BankRole) -> Option<&mut MemoryBank> {
        self.banks.get_mut(role)
    }

    /// Record a bank resolved by the loader.
    pub fn resolve_bank(&mut self, bank: MemoryBank) -> Result<(), MemError> {
        if !self.banks.insert(bank) {
            return Err(MemError::BankExists);
        }
        log::debug!(
            target: "mem",
            "{} bank at {:08x}, {}k available, {}k required",
            bank.role.name(),
            bank.target_addr,
            bank.target_size >> 10,
            bank.required_size >> 10
        );
        Ok(())
    }

    /// Mark a host region as belonging to a bank role; pool discovery skips it.
    pub fn claim_region(&mut self, role: BankRole, range: AddrRange) {
        self.banks.claim_region(role, range);
    }

    pub fn claimed_region(&self, role: BankRole) -> Option<AddrRange> {
        self.banks.claimed_region(role)
    }

    /// Host region (64KB-rounded) starting exactly at `addr`, unless one of
    /// the banks already owns it.
    pub fn native_region_at(&mut self, addr: u32) -> Option<AddrRange> {
        let regions = with_exclusion(&mut self.host, |h| h.regions());
        regions
            .iter()
            .map(|r| r.rounded())
            .find(|r| r.start == addr && !self.banks.owns_region(r.start))
    }

    /// Every host region, 64KB-rounded.
    pub fn native_regions(&mut self) -> Vec<AddrRange> {
        let regions = with_exclusion(&mut self.host, |h| h.regions());
        regions.iter().map(|r| r.rounded()).collect()
    }

    // ───────────────────────────────────────────────────────────────────────
    // Pools
    // ───────────────────────────────────────────────────────────────────────

    /// Pools in rank order.
    pub fn pools(&self) -> &[Pool] {
        &self.pools[..self.pool_count]
    }

    /// Default allocation source.
    pub fn best_pool(&self) -> Option<&Pool> {
        self.pools().first()
    }

    /// Ranges a hardware adapter will remove from the bus.
    pub fn set_unavailable(&mut self, ranges: &[AddrRange]) {
        self.unavailable.clear();
        self.unavailable.extend_from_slice(ranges);
    }

    pub fn unavailable(&self) -> &[AddrRange] {
        &self.unavailable
    }

    fn is_unavailable(&self, range: &AddrRange) -> bool {
        self.unavailable.iter().any(|u| u.overlaps(range))
    }

    /// Find spare RAM: every host region no bank owns and no adapter takes
    /// away, merged into the bounded pool set and ranked.
    pub fn discover_pools(&mut self) {
        let regions = with_exclusion(&mut self.host, |h| h.regions());
        for region in &regions {
            let range = region.rounded();
            if self.banks.owns_region(range.start) || self.is_unavailable(&range) {
                continue;
            }
            self.merge_pool(Pool {
                arena: Arena::new(range.start, range.size()),
                free_list: Some(region.handle),
            });
        }
        self.rank_pools();
    }

    /// Offer a spare bank tail as a pool candidate.
    pub fn offer_pool(&mut self, base: u32, size: u32) {
        self.merge_pool(Pool {
            arena: Arena::new(base, size),
            free_list: None,
        });
        self.rank_pools();
    }

    fn merge_pool(&mut self, pool: Pool) {
        if pool.size() < MIN_POOL_SIZE {
            return;
        }
        let range = pool.range();
        if self.pools().iter().any(|p| p.range().overlaps(&range)) {
            return;
        }
        if self.pool_count < MAX_POOLS {
            self.pools[self.pool_count] = pool;
            self.pool_count += 1;
            log::debug!(target: "mem", "Pool {:08x} {}k", pool.base(), pool.size() >> 10);
            return;
        }
        let smallest = self
            .pools()
            .iter()
            .enumerate()
            .min_by_key(|(_, p)| p.size())
            .map(|(i, p)| (i, p.size()));
        if let Some((i, size)) = smallest {
            if pool.size() > size {
                log::debug!(target: "mem", "Pool {:08x} {}k replaces {:08x}", pool.base(), pool.size() >> 10, self.pools[i].base());
                self.pools[i] = pool;
            }
        }
    }

    fn rank_pools(&mut self) {
        self.pools[..self.pool_count].sort_unstable_by_key(|p| p.rank());
    }

    // ───────────────────────────────────────────────────────────────────────
    // Allocation
    // ───────────────────────────────────────────────────────────────────────

    /// Working memory from the pools, in rank order.
    pub fn allocate(&mut self, size: u32, align: u32, avoid_unavailable: bool) -> Result<u32, MemError> {
        if !align.is_power_of_two() {
            return Err(MemError::InvalidAlignment);
        }
        for i in 0..self.pool_count {
            if let Some(addr) = self.allocate_from_free_list(i, size, align, avoid_unavailable)? {
                return Ok(addr);
            }
            if let Some(addr) = self.allocate_bump(i, size, align, avoid_unavailable)? {
                return Ok(addr);
            }
        }
        log::debug!(target: "mem", "Out of memory ({} bytes)", size);
        Err(MemError::OutOfMemory { size })
    }

    fn allocate_from_free_list(
        &mut self,
        pool: usize,
        size: u32,
        align: u32,
        avoid_unavailable: bool,
    ) -> Result<Option<u32>, MemError> {
        let Some(handle) = self.pools[pool].free_list else {
            return Ok(None);
        };
        let Some(addr) = self.host.pool_claim(handle, size) else {
            return Ok(None);
        };
        let range = AddrRange::new(addr, size);
        if addr & (align - 1) != 0 || (avoid_unavailable && self.is_unavailable(&range)) {
            self.host.pool_release(handle, addr, size);
            return Ok(None);
        }
        self.record(addr, size, Some(handle), ClaimKind::PoolFreeList)?;
        Ok(Some(addr))
    }

    fn allocate_bump(
        &mut self,
        pool: usize,
        size: u32,
        align: u32,
        avoid_unavailable: bool,
    ) -> Result<Option<u32>, MemError> {
        while let Some(addr) = self.pools[pool].arena.peek(size, align) {
            let range = AddrRange::new(addr, size);
            if !(avoid_unavailable && self.is_unavailable(&range)) && self.host.claim_at(addr, size) {
                self.record(addr, size, None, ClaimKind::PoolBump)?;
                let step = align_up(size, DEFAULT_ALIGN).unwrap_or(size);
                self.pools[pool].arena.commit(addr, step);
                return Ok(Some(addr));
            }
            self.pools[pool].arena.advance(addr - self.cursor_u32(pool) + BUMP_STEP);
        }
        Ok(None)
    }

    fn cursor_u32(&self, pool: usize) -> u32 {
        self.pools[pool].arena.cursor().min(u32::MAX as u64) as u32
    }

    /// Working memory inside the unused part of a bank's target range.
    ///
    /// `None` when the bank is absent or too small; callers fall back.
    pub fn allocate_in_bank(&mut self, size: u32, role: BankRole, avoid_unavailable: bool) -> Option<u32> {
        let bank = *self.banks.get(role)?;
        if bank.target_size == 0 {
            return None;
        }
        let mut offset = 0u32;
        loop {
            offset = offset.checked_add(BANK_PROBE_STRIDE)?;
            if offset as u64 + size as u64 >= bank.target_size as u64 {
                return None;
            }
            let addr = bank.target_addr.checked_add(offset)?;
            let range = AddrRange::new(addr, size);
            if avoid_unavailable && self.is_unavailable(&range) {
                continue;
            }
            if self.host.claim_at(addr, size) {
                if self.record(addr, size, None, ClaimKind::Bank).is_err() {
                    return None;
                }
                return Some(addr);
            }
        }
    }

    /// Claim an exact physical range.
    pub fn allocate_fixed(&mut self, size: u32, addr: u32) -> Option<u32> {
        if !self.host.claim_at(addr, size) {
            return None;
        }
        self.record(addr, size, None, ClaimKind::Fixed).ok()?;
        Some(addr)
    }

    /// Aligned memory straight from the host allocator.
    ///
    /// Over-allocates, then swaps the claim for its aligned sub-range with
    /// task switching off so nobody can take it in between.
    pub fn allocate_from_host(&mut self, size: u32, align: u32, class: MemClass) -> Result<u32, MemError> {
        if !align.is_power_of_two() {
            return Err(MemError::InvalidAlignment);
        }
        let padded = size.checked_add(align - 1).ok_or(MemError::OutOfMemory { size })?;
        let raw = self.host.claim_any(padded, class).ok_or(MemError::OutOfMemory { size })?;
        let aligned = with_exclusion(&mut self.host, |h| {
            h.release(raw, padded);
            let aligned = align_up(raw, align)?;
            h.claim_at(aligned, size).then_some(aligned)
        })
        .ok_or(MemError::OutOfMemory { size })?;
        self.record(aligned, size, None, ClaimKind::Host)?;
        Ok(aligned)
    }

    fn record(&mut self, addr: u32, size: u32, free_list: Option<PoolHandle>, kind: ClaimKind) -> Result<(), MemError> {
        if self.allocation_count >= MAX_ALLOCATIONS {
            log::error!(target: "mem", "Too many allocations!");
            match free_list {
                Some(handle) => self.host.pool_release(handle, addr, size),
                None => self.host.release(addr, size),
            }
            return Err(MemError::TooManyAllocations);
        }
        self.allocations[self.allocation_count] = Allocation {
            addr,
            size,
            free_list,
            kind,
        };
        self.allocation_count += 1;
        Ok(())
    }

    /// The allocation log, oldest first.
    pub fn allocations(&self) -> &[Allocation] {
        &self.allocations[..self.allocation_count]
    }

    /// Current length of the allocation log, for [`release_to`](Self::release_to).
    pub fn allocation_mark(&self) -> usize {
        self.allocation_count
    }

    /// Release claims made after `mark`, newest first.
    pub fn release_to(&mut self, mark: usize) {
        while self.allocation_count > mark {
            self.allocation_count -= 1;
            let a = self.allocations[self.allocation_count];
            match a.free_list {
                Some(handle) => self.host.pool_release(handle, a.addr, a.size),
                None => self.host.release(a.addr, a.size),
            }
        }
    }

    /// Release everything, newest first.
    pub fn release_all(&mut self) {
        self.release_to(0);
        for pool in &mut self.pools[..self.pool_count] {
            pool.arena.reset();
        }
    }

    /// Fail if a host-obtained claim (MMU backing or descriptor pages) lies
    /// in memory that restoring the banks will overwrite.
    pub fn check_disjoint(&self, ranges: &[AddrRange]) -> Result<(), MemError> {
        for a in self.allocations().iter().filter(|a| a.kind == ClaimKind::Host) {
            if ranges.iter().any(|r| r.overlaps(&a.range())) {
                return Err(MemError::Overlap {
                    addr: a.addr,
                    size: a.size,
                });
            }
        }
        Ok(())
    }
}
