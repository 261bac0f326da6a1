//! Hardware compatibility checks
//!
//! Compares what a snapshot was taken on with the machine it is restored
//! on. Most differences only earn a warning; a missing FPU is fatal.

use alloc::vec::Vec;

use crate::config::{ChipsetId, CpuModel, SystemType};
use crate::error::{CompatWarning, Feature, RestoreError};

/// Snapshot CPU model vs the host.
pub fn check_cpu(snapshot: u32, host: CpuModel) -> Option<CompatWarning> {
    (snapshot != host.number()).then_some(CompatWarning::Cpu {
        snapshot,
        host: host.number(),
    })
}

/// Snapshot FPU model vs the host FPU (as reported by
/// [`HostCapabilities::fpu_model`](crate::config::HostCapabilities::fpu_model)).
pub fn check_fpu(snapshot: u32, host: u32) -> Result<Option<CompatWarning>, RestoreError> {
    if snapshot != 0 && host == 0 {
        return Err(RestoreError::UnsupportedFeature(Feature::Fpu));
    }
    Ok((snapshot != host).then_some(CompatWarning::Fpu { snapshot, host }))
}

/// Snapshot chipset vs the host chipset.
pub fn check_chipset(snapshot: ChipsetId, host: ChipsetId) -> Vec<CompatWarning> {
    let mut out = Vec::new();
    if snapshot.is_aga() && !host.is_aga() {
        out.push(CompatWarning::AgaOnOcsEcs);
    }
    if !snapshot.is_aga() && host.is_aga() {
        out.push(CompatWarning::OcsEcsOnAga);
    }
    // ECS and AGA switch video mode in software; OCS Agnus is fixed
    let host_ocs = !host.is_aga() && !host.is_ecs();
    if host_ocs && snapshot.is_ntsc() && !host.is_ntsc() {
        out.push(CompatWarning::NtscOnOcsPal);
    }
    if host_ocs && !snapshot.is_ntsc() && host.is_ntsc() {
        out.push(CompatWarning::PalOnOcsNtsc);
    }
    out
}

/// Snapshot machine type vs the host.
pub fn check_system(snapshot: SystemType, host: SystemType) -> Option<CompatWarning> {
    (snapshot != host).then_some(CompatWarning::SystemType {
        snapshot: snapshot.name(),
        host: host.name(),
    })
}
