//! Kickstart ROM handling
//!
//! `ROM ` chunk layout (big-endian):
//!
//! ```text
//!   0   start address
//!   4   length
//!   8   flags
//!  12   version
//!  14   revision
//!  16   CRC32
//!  20   NUL-terminated ROM id, then the image path
//! ```

use alloc::format;
use alloc::string::String;
use alloc::vec;

use revive_chunk::{be_u16, be_u32};
use revive_mem::{BankRole, MemoryHost, PhysicalMemory, DEFAULT_ALIGN};

use crate::overlay::{self, RomOverlayAdapter};
use crate::session::{Session, StagedChunk};

/// Directory searched first for replacement images.
pub const KICKSTART_DIR: &str = "DEVS:kickstarts/";

/// Parsed `ROM ` chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RomInfo {
    pub start: u32,
    pub len: u32,
    pub version: u16,
    pub revision: u16,
    pub crc: u32,
    pub path: String,
}

impl RomInfo {
    pub fn parse(payload: &[u8]) -> Self {
        let mut start = be_u32(payload, 0);
        let len = be_u32(payload, 4);
        // 256KB ROMs are mirrored; the snapshot records the lower copy
        if start == 0x00f8_0000 && len == 256 * 1024 {
            start = 0x00fc_0000;
        }
        let strings = payload.get(20..).unwrap_or(&[]);
        let path = strings
            .split(|&b| b == 0)
            .nth(1)
            .map(|p| String::from_utf8_lossy(p).into_owned())
            .unwrap_or_default();
        Self {
            start,
            len,
            version: be_u16(payload, 12),
            revision: be_u16(payload, 14),
            crc: be_u32(payload, 16),
            path,
        }
    }
}

/// File name of a replacement image, e.g. `kick40068.a1200`.
pub fn image_name(version: u16, revision: u16, aga: bool) -> String {
    format!("kick{}{:03}.{}", version, revision, if aga { "a1200" } else { "a500" })
}

/// Where ROM images come from (the host file system).
pub trait RomImageSource {
    /// Size of the image at `path`, `None` if it can't be opened.
    fn size(&mut self, path: &str) -> Option<u32>;

    /// Read the whole image into `buf`; returns the bytes read.
    fn read(&mut self, path: &str, buf: &mut [u8]) -> usize;
}

/// Compare the snapshot's ROM with the system ROM and look for overlay
/// hardware when they differ.
pub fn check<H, P>(session: &mut Session<H, P>, payload: &[u8], adapters: &mut [&mut dyn RomOverlayAdapter])
where
    H: MemoryHost,
    P: PhysicalMemory,
{
    let info = RomInfo::parse(payload);
    let host = session.caps.rom_version;
    let mismatch = (info.version, info.revision) != host;
    if mismatch {
        session.warn(crate::error::CompatWarning::Rom {
            snapshot: (info.version, info.revision),
            host,
        });
    }
    log::debug!(
        target: "loader",
        "ROM {:08x}-{:08x} {}.{} (CRC={:08x}).",
        info.start,
        info.start.wrapping_add(info.len).wrapping_sub(1),
        info.version,
        info.revision,
        info.crc
    );
    if !mismatch {
        return;
    }
    log::debug!(target: "loader", "- '{}'", info.path);
    session.rom.wanted = Some((info.version, info.revision));
    if !session.config.use_maprom {
        return;
    }
    if overlay::probe(session, adapters) {
        log::info!(target: "loader", "- Map ROM hardware detected.");
    } else {
        log::debug!(target: "loader", "Map ROM support not detected");
    }
}

/// Fetch and stage the replacement image for the overlay.
///
/// Failures are reported but don't stop the restore; the snapshot then
/// runs on the system ROM.
pub fn stage_image<H, P>(session: &mut Session<H, P>, roms: &mut dyn RomImageSource)
where
    H: MemoryHost,
    P: PhysicalMemory,
{
    let Some(active) = session.overlay else {
        return;
    };
    let Some((version, revision)) = session.rom.wanted else {
        return;
    };
    let name = image_name(version, revision, session.aga);
    let preferred = format!("{}{}", KICKSTART_DIR, name);
    let (path, size) = match roms.size(&preferred) {
        Some(size) => (preferred, size),
        None => match roms.size(&name) {
            Some(size) => (name, size),
            None => {
                log::info!(target: "loader", "Couldn't open ROM image '{}'", preferred);
                return;
            }
        },
    };

    let addr = [BankRole::Chip, BankRole::Slow]
        .into_iter()
        .filter(|role| !active.avoids(*role))
        .find_map(|role| session.resources.allocate_in_bank(size, role, true))
        .or_else(|| session.resources.allocate(size, DEFAULT_ALIGN, true).ok());
    let Some(addr) = addr else {
        log::info!(target: "loader", "Couldn't allocate {}k for ROM image '{}'.", size >> 10, path);
        return;
    };
    log::debug!(target: "loader", "MapROM temp {:08x}", addr);

    let mut buf = vec![0u8; size as usize];
    if roms.read(&path, &mut buf) != buf.len() {
        log::info!(target: "loader", "Read error while reading map rom image '{}'", path);
        return;
    }
    session.memory.write_bytes(addr, &buf);
    session.rom.image = Some(StagedChunk { addr, len: size });
    log::info!(target: "loader", "ROM '{}' ({}k) loaded .", path, size >> 10);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rom_chunk(start: u32, len: u32, ver: u16, rev: u16) -> alloc::vec::Vec<u8> {
        let mut p = alloc::vec::Vec::new();
        p.extend_from_slice(&start.to_be_bytes());
        p.extend_from_slice(&len.to_be_bytes());
        p.extend_from_slice(&0u32.to_be_bytes());
        p.extend_from_slice(&ver.to_be_bytes());
        p.extend_from_slice(&rev.to_be_bytes());
        p.extend_from_slice(&0x1234_5678u32.to_be_bytes());
        p.extend_from_slice(b"KS ROM v3.1\0DH0:roms/kick.rom\0");
        p
    }

    #[test]
    fn test_parse() {
        let info = RomInfo::parse(&rom_chunk(0x00f8_0000, 512 * 1024, 40, 68));
        assert_eq!(info.start, 0x00f8_0000);
        assert_eq!((info.version, info.revision), (40, 68));
        assert_eq!(info.crc, 0x1234_5678);
        assert_eq!(info.path, "DH0:roms/kick.rom");
    }

    #[test]
    fn test_parse_256k_start() {
        let info = RomInfo::parse(&rom_chunk(0x00f8_0000, 256 * 1024, 34, 5));
        assert_eq!(info.start, 0x00fc_0000);
    }

    #[test]
    fn test_image_name() {
        assert_eq!(image_name(40, 68, true), "kick40068.a1200");
        assert_eq!(image_name(34, 5, false), "kick34005.a500");
    }
}
