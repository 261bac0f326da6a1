//! MMU Address-Space Builder
//!
//! Builds one fixed translation tree for the 68030 or 68040/060 MMU. It
//! identity maps everything the host can reach, then synthesizes the
//! snapshot RAM the host lacks by pointing those addresses at spare memory.
//! No faults, no demand paging, no second address space.
//!
//! ```text
//!   VirtAddr ──► Level A [128] ──► Level B [128] ──► Level C [64] ──► page
//! ```
//!
//! # Usage
//!
//! ```ignore
//! let mut space = AddressSpace::init(&mut rm, &mut mem, MmuGeneration::Mmu040, CacheMode::WriteThrough)?;
//! // 512KB of chip RAM the machine does not have, backed by fast RAM
//! space.map_region(&mut rm, &mut mem, 0x080000, backing, 0x80000, MapAttrs::default())?;
//! ```

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod descriptor;
pub mod error;
pub mod space;
pub mod table;

pub use descriptor::{
    merge_page, CacheMode, Descriptor, MapAttrs, MmuGeneration, PageBits, PageDescriptor,
    INVALID_DESCRIPTOR,
};
pub use error::MmuError;
pub use space::{AddressSpace, IO_WINDOWS, REFILL_PAGES, ROM_WINDOWS};
pub use table::{Level, LevelA, LevelB, LevelC, Table, VirtAddr};
