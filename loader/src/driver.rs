//! Restore driver
//!
//! Runs one restore from start to finish. This is the whole program as the
//! operator sees it: options in, console messages out, exit code 0.

use alloc::vec::Vec;

use revive_chunk::{ChunkReader, ChunkStream};
use revive_mem::{MemoryHost, PhysicalMemory};

use crate::config::{HostCapabilities, LoaderConfig};
use crate::console;
use crate::error::RestoreError;
use crate::overlay::RomOverlayAdapter;
use crate::pass1;
use crate::pass2;
use crate::rom::RomImageSource;
use crate::session::Session;
use crate::takeover::{self, CodeImage, Decompressor, Handoff, TakeoverPlan};

/// Machine services the loader calls out to.
pub struct Services<'a> {
    pub adapters: Vec<&'a mut dyn RomOverlayAdapter>,
    pub roms: &'a mut dyn RomImageSource,
    pub decompressor: &'a mut dyn Decompressor,
    pub handoff: &'a mut dyn Handoff,
    pub image: CodeImage<'a>,
}

/// How far a restore got.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Pass 1 failed
    Rejected(RestoreError),
    /// Pass 2 failed
    LoadFailed(RestoreError),
    /// The takeover block could not be prepared
    NotPrepared(RestoreError),
    /// Stopped before the takeover on request
    TestFinished(TakeoverPlan),
    /// The snapshot was resumed
    Resumed(TakeoverPlan),
}

/// Restore one statefile. Always returns exit code 0.
pub fn run<H, P, S>(
    config: LoaderConfig,
    caps: HostCapabilities,
    host: H,
    memory: P,
    stream: S,
    services: Services<'_>,
) -> i32
where
    H: MemoryHost,
    P: PhysicalMemory,
    S: ChunkStream,
{
    let mut session = Session::new(config, caps, host, memory);
    let outcome = restore(&mut session, stream, services);
    log::debug!(target: "loader", "{:?}", outcome);
    session.resources.release_all();
    0
}

/// Restore with an existing session, leaving its allocations in place.
pub fn restore<H, P, S>(session: &mut Session<H, P>, stream: S, mut services: Services<'_>) -> Outcome
where
    H: MemoryHost,
    P: PhysicalMemory,
    S: ChunkStream,
{
    console::set_debug(session.config.debug);
    session.init_mmu();

    let mut reader = ChunkReader::new(stream);
    if let Err(e) = pass1::scan(session, &mut reader, &mut services.adapters) {
        log::info!(target: "loader", "Pass #1 failed.");
        return Outcome::Rejected(e);
    }
    if let Err(e) = pass2::materialize(session, &mut reader, services.roms) {
        log::info!(target: "loader", "Pass #2 failed.");
        return Outcome::LoadFailed(e);
    }

    let plan = match TakeoverPlan::prepare(session, &services.image) {
        Ok(plan) => plan,
        Err(e) => return Outcome::NotPrepared(e),
    };
    if session.config.test_mode {
        log::info!(target: "loader", "Test mode finished. Exiting.");
        return Outcome::TestFinished(plan);
    }
    if !session.config.no_wait {
        if session.config.debug {
            log::info!(
                target: "loader",
                "Code={:08x} Stack={:08x} Data={:08x}. Press RETURN!",
                plan.code,
                plan.stack_top,
                plan.state
            );
        } else {
            log::info!(target: "loader", "Change floppy disk(s) now if needed. Press RETURN to start.");
        }
        services.handoff.wait_for_operator();
    }

    takeover::commit(
        session,
        &plan,
        services.decompressor,
        &mut services.adapters,
        services.handoff,
    );
    Outcome::Resumed(plan)
}
