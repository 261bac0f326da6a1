//! Pass 2: materializing
//!
//! Copies everything the takeover needs into memory the host will not
//! touch again: each memory chunk (header included) into a staging buffer,
//! the replacement ROM image, and every register chunk. Nothing is restored
//! yet; the target ranges are still in use by the host.

use alloc::vec::Vec;

use revive_chunk::{classify, ChunkError, ChunkHeader, ChunkKind, ChunkReader, ChunkStream, RegisterChunk};
use revive_mem::{BankRole, MemoryBank, MemoryHost, PhysicalMemory, DEFAULT_ALIGN};

use crate::error::{FormatError, RestoreError};
use crate::rom::{self, RomImageSource};
use crate::session::{Session, StagedChunk};

/// Widened FPU register file: 8 x 12-byte extended + FPCR/FPSR/FPIAR.
pub const FPU_REGS_LEN: u32 = 8 * 12 + 3 * 4;

/// Offset of FP0 in an `FPU ` chunk.
const FPU_REGS_OFFSET: usize = 8;

/// Offset of the image path in a `DSKn` chunk.
const FLOPPY_PATH_OFFSET: usize = 16;

const COPY_BLOCK: usize = 4096;

/// Load everything. `Ok` means the takeover may run.
pub fn materialize<H, P, S>(
    session: &mut Session<H, P>,
    reader: &mut ChunkReader<S>,
    roms: &mut dyn RomImageSource,
) -> Result<(), RestoreError>
where
    H: MemoryHost,
    P: PhysicalMemory,
    S: ChunkStream,
{
    for role in BankRole::ALL {
        if let Some(bank) = session.resources.bank(role).copied() {
            stage_bank(session, reader, bank)?;
        }
    }

    rom::stage_image(session, roms);

    reader.rewind()?;
    loop {
        let Some(header) = reader.read_chunk_header() else {
            log::error!(target: "loader", "Unexpected end of statefile.");
            return Err(RestoreError::Format(FormatError::Truncated));
        };
        match classify(header.tag) {
            ChunkKind::End => break,
            ChunkKind::Register(RegisterChunk::Rom) => reader.skip_chunk(header.length)?,
            ChunkKind::Register(chunk) => stage_register(session, reader, &header, chunk)?,
            _ => reader.skip_chunk(header.length)?,
        }
    }

    if session.errors > 0 {
        return Err(RestoreError::Failed {
            pass: 2,
            errors: session.errors,
        });
    }
    Ok(())
}

/// Copy a memory chunk, header and all, into a staging buffer.
///
/// Chip RAM is restored first, so its copy may sit in the slow or fast
/// bank's target range; slow RAM may sit in the fast range.
fn stage_bank<H, P, S>(session: &mut Session<H, P>, reader: &mut ChunkReader<S>, bank: MemoryBank) -> Result<(), RestoreError>
where
    H: MemoryHost,
    P: PhysicalMemory,
    S: ChunkStream,
{
    let tag = bank.role.tag();
    let len = bank.staged_len();
    log::debug!(
        target: "loader",
        "Memory '{}', size {}k, offset {}. Target {:08x}.",
        tag,
        len >> 10,
        bank.offset,
        bank.target_addr
    );

    let preferred: &[BankRole] = match bank.role {
        BankRole::Chip => &[BankRole::Slow, BankRole::Fast],
        BankRole::Slow => &[BankRole::Fast],
        BankRole::Fast => &[],
    };
    let addr = preferred
        .iter()
        .find_map(|role| session.resources.allocate_in_bank(len, *role, true))
        .or_else(|| session.resources.allocate(len, DEFAULT_ALIGN, true).ok());
    let Some(addr) = addr else {
        log::error!(target: "loader", "Out of memory (Chunk '{}', {} bytes).", tag, len);
        session.fail(RestoreError::OutOfMemory { size: len });
        return Ok(());
    };
    log::debug!(target: "loader", " - Address {:08x} - {:08x}.", addr, addr + len - 1);

    reader.seek(bank.offset)?;
    let got = copy_raw(reader, &mut session.memory, addr, len);
    if got != len {
        log::error!(target: "loader", "Read error (Chunk '{}', {} bytes)", tag, len);
        session.fail(RestoreError::Read(ChunkError::ShortRead { expected: len, got }));
        return Ok(());
    }
    if let Some(b) = session.resources.bank_mut(bank.role) {
        b.source = Some(addr);
    }
    Ok(())
}

fn copy_raw<S, P>(reader: &mut ChunkReader<S>, mem: &mut P, addr: u32, len: u32) -> u32
where
    S: ChunkStream,
    P: PhysicalMemory,
{
    let mut block = [0u8; COPY_BLOCK];
    let mut done = 0u32;
    while done < len {
        let want = ((len - done) as usize).min(COPY_BLOCK);
        let n = reader.read_raw(&mut block[..want]);
        if n == 0 {
            break;
        }
        mem.write_bytes(addr + done, &block[..n]);
        done += n as u32;
    }
    done
}

fn stage_register<H, P, S>(
    session: &mut Session<H, P>,
    reader: &mut ChunkReader<S>,
    header: &ChunkHeader,
    chunk: RegisterChunk,
) -> Result<(), RestoreError>
where
    H: MemoryHost,
    P: PhysicalMemory,
    S: ChunkStream,
{
    if header.length == 0 {
        reader.skip_chunk(0)?;
        return Ok(());
    }
    let mut payload = Vec::new();
    if let Err(e) = reader.read_chunk_payload(header, header.length, &mut payload) {
        log::error!(target: "loader", "Read error (Chunk '{}', {} bytes).", header.tag, header.length);
        session.fail(e.into());
        return Ok(());
    }
    let Ok(addr) = session.resources.allocate(header.length, DEFAULT_ALIGN, true) else {
        log::error!(target: "loader", "Not enough memory (Chunk '{}', {} bytes required).", header.tag, header.length);
        session.fail(RestoreError::OutOfMemory { size: header.length });
        return Ok(());
    };
    session.memory.write_bytes(addr, &payload);
    session.chunks[chunk.index()] = Some(StagedChunk {
        addr,
        len: header.length,
    });

    match chunk {
        RegisterChunk::Fpu => widen_fpu(session, &payload),
        RegisterChunk::Floppy(n) => floppy_info(n, &payload),
        _ => {}
    }
    Ok(())
}

/// Convert the snapshot's 80-bit FP registers to the 96-bit in-memory
/// extended format `fmovem` expects.
pub fn widen_fpu_regs(payload: &[u8]) -> Option<[u8; FPU_REGS_LEN as usize]> {
    let src = payload.get(FPU_REGS_OFFSET..FPU_REGS_OFFSET + 8 * 10 + 3 * 4)?;
    let mut out = [0u8; FPU_REGS_LEN as usize];
    for i in 0..8 {
        let s = &src[i * 10..i * 10 + 10];
        let d = &mut out[i * 12..i * 12 + 12];
        d[0..2].copy_from_slice(&s[0..2]);
        d[4..12].copy_from_slice(&s[2..10]);
    }
    out[96..108].copy_from_slice(&src[80..92]);
    Some(out)
}

fn widen_fpu<H, P>(session: &mut Session<H, P>, payload: &[u8])
where
    H: MemoryHost,
    P: PhysicalMemory,
{
    let Some(regs) = widen_fpu_regs(payload) else {
        log::debug!(target: "loader", "FPU chunk too short ({} bytes)", payload.len());
        return;
    };
    match session.resources.allocate(FPU_REGS_LEN, DEFAULT_ALIGN, true) {
        Ok(addr) => {
            session.memory.write_bytes(addr, &regs);
            session.fpu_regs = Some(StagedChunk {
                addr,
                len: FPU_REGS_LEN,
            });
        }
        Err(_) => {
            log::error!(target: "loader", "Not enough memory (Chunk 'FPU ', {} bytes required).", FPU_REGS_LEN);
            session.fail(RestoreError::OutOfMemory { size: FPU_REGS_LEN });
        }
    }
}

fn floppy_info(drive: u8, payload: &[u8]) {
    let state = payload.get(4).copied().unwrap_or(2);
    let track = payload.get(5).copied().unwrap_or(0);
    // bit 1: drive disabled
    if state & 2 != 0 {
        return;
    }
    let path = payload
        .get(FLOPPY_PATH_OFFSET..)
        .and_then(|p| p.split(|&b| b == 0).next())
        .unwrap_or(&[]);
    if path.is_empty() {
        log::info!(target: "loader", "DF{}: Track {} <empty>", drive, track);
    } else {
        log::info!(
            target: "loader",
            "DF{}: Track {} '{}'.",
            drive,
            track,
            core::str::from_utf8(path).unwrap_or("?")
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_widen_fpu_regs() {
        let mut payload = alloc::vec![0u8; 8 + 80 + 12];
        payload[0..4].copy_from_slice(&68882u32.to_be_bytes());
        for i in 0..8 {
            let r = &mut payload[8 + i * 10..8 + i * 10 + 10];
            for (j, b) in r.iter_mut().enumerate() {
                *b = (i * 16 + j) as u8 + 1;
            }
        }
        payload[88..100].copy_from_slice(&[0xc0; 12]);

        let out = widen_fpu_regs(&payload).unwrap();
        // FP3: exponent word, zero pad, 64-bit mantissa
        let fp3 = &out[36..48];
        assert_eq!(&fp3[0..2], &[0x31, 0x32]);
        assert_eq!(&fp3[2..4], &[0, 0]);
        assert_eq!(&fp3[4..12], &[0x33, 0x34, 0x35, 0x36, 0x37, 0x38, 0x39, 0x3a]);
        assert_eq!(&out[96..108], &[0xc0; 12]);
    }

    #[test]
    fn test_widen_fpu_short_chunk() {
        assert!(widen_fpu_regs(&[0u8; 40]).is_none());
    }
}
