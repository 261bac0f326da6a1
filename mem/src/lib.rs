//! Physical Memory Resource Manager
//!
//! Everything the restorer needs from RAM goes through here: where each
//! snapshot bank lands, spare memory to unpack into, exact claims, and the
//! rollback when a restore is abandoned.
//!
//! # Layers
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │ ResourceManager   banks, pools, LIFO log      │
//! ├───────────────────────────────────────────────┤
//! │ Arena             base / size / bump cursor   │
//! ├───────────────────────────────────────────────┤
//! │ MemoryHost        host memory list + claims   │
//! │ PhysicalMemory    byte access to the machine  │
//! └───────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use revive_mem::{ResourceManager, DEFAULT_ALIGN};
//!
//! let mut rm = ResourceManager::new(host);
//! rm.discover_pools();
//! let staging = rm.allocate(len, DEFAULT_ALIGN, false)?;
//! // ...
//! rm.release_all();
//! ```

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod arena;
pub mod bank;
pub mod error;
pub mod host;
pub mod physical;
pub mod resources;

#[cfg(any(test, feature = "sim"))]
pub mod sim;

pub use arena::{align_down, align_up, Arena, PAGE_SIZE};
pub use bank::{BankRole, BankTable, MemoryBank};
pub use error::MemError;
pub use host::{
    with_exclusion, AddrRange, ExclusionGuard, HostRegion, MemClass, MemoryHost, PoolHandle,
    REGION_GRANULE,
};
pub use physical::{DirectMemory, PhysicalMemory};
pub use resources::{
    Allocation, ClaimKind, Pool, ResourceManager, DEFAULT_ALIGN, MAX_ALLOCATIONS, MAX_POOLS,
    MIN_POOL_SIZE,
};
