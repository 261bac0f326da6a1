//! Statefile Loader
//!
//! Puts a running machine back into the state recorded in an emulator
//! statefile. The restore happens in three steps:
//!
//! ```text
//! ┌──────────┐    ┌──────────────┐    ┌──────────────┐    ┌──────────┐
//! │  Pass 1  │───►│    Pass 2    │───►│   Prepare    │───►│  Commit  │
//! │ scan,    │    │ stage banks, │    │ code, stack, │    │ host off │
//! │ resolve  │    │ ROM, regs    │    │ handoff data │    │ restore  │
//! └──────────┘    └──────────────┘    └──────────────┘    └──────────┘
//!      │                 │                    │
//!      └── errors ───────┴──── "Pass #n failed." / test mode: stop here
//! ```
//!
//! Until the commit the host keeps running and every claim can be given
//! back. The commit does not return on real hardware.
//!
//! # Usage
//!
//! ```ignore
//! use revive_loader::{console, driver, LoaderConfig};
//!
//! console::init_console(&CLI, false);
//! let code = driver::run(LoaderConfig::default(), caps, host, memory, file, services);
//! ```

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod compat;
pub mod config;
pub mod console;
pub mod driver;
pub mod error;
pub mod overlay;
pub mod pass1;
pub mod pass2;
pub mod rom;
pub mod session;
pub mod takeover;

pub use config::{ChipsetId, CpuModel, HostCapabilities, LoaderConfig, MmuPolicy, SystemType};
pub use console::{init_console, ConsoleSink};
pub use driver::{restore, run, Outcome, Services};
pub use error::{CompatWarning, Feature, FormatError, RestoreError, Shortage};
pub use overlay::{copy_rom, ActiveOverlay, OverlayDescriptor, RomOverlayAdapter};
pub use rom::{image_name, RomImageSource, RomInfo};
pub use session::{Session, StagedChunk};
pub use takeover::{commit, CodeImage, Decompressor, Handoff, TakeoverPlan, TEMP_STACK_SIZE};

#[cfg(feature = "sim")]
pub use revive_mem::sim;
