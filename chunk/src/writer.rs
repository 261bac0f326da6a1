//! Statefile writer
//!
//! Produces well-formed chunk streams. The restorer itself never writes a
//! statefile; this exists for tooling and for building test images.

use alloc::vec::Vec;

use crate::reader::{pad_len, ChunkFlags, HEADER_LEN};
use crate::tag::Tag;

/// Builder for an in-memory statefile.
#[derive(Debug, Default, Clone)]
pub struct StatefileWriter {
    buf: Vec<u8>,
}

impl StatefileWriter {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    /// Current length, i.e. the offset the next chunk will start at.
    pub fn len(&self) -> u32 {
        self.buf.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Opening `ASF ` chunk.
    pub fn start(&mut self) -> &mut Self {
        self.chunk(Tag::START.0, &[0, 0, 0, 0])
    }

    /// Closing `END ` chunk.
    pub fn end(&mut self) -> &mut Self {
        self.chunk(Tag::END.0, &[])
    }

    /// Uncompressed chunk.
    pub fn chunk(&mut self, tag: [u8; 4], payload: &[u8]) -> &mut Self {
        self.chunk_with_flags(tag, ChunkFlags::empty(), payload)
    }

    /// Compressed chunk: `data` is the opaque compressed stream, prefixed
    /// here with the inflated length.
    pub fn compressed_chunk(&mut self, tag: [u8; 4], inflated_len: u32, data: &[u8]) -> &mut Self {
        let mut payload = Vec::with_capacity(data.len() + 4);
        payload.extend_from_slice(&inflated_len.to_be_bytes());
        payload.extend_from_slice(data);
        self.chunk_with_flags(tag, ChunkFlags::COMPRESSED, &payload)
    }

    pub fn chunk_with_flags(&mut self, tag: [u8; 4], flags: ChunkFlags, payload: &[u8]) -> &mut Self {
        let len = payload.len() as u32;
        self.raw_header(tag, len + HEADER_LEN, flags.bits());
        self.buf.extend_from_slice(payload);
        self.pad(len)
    }

    /// Header with an arbitrary declared length and flag word, no payload.
    pub fn raw_header(&mut self, tag: [u8; 4], declared_len: u32, flags: u32) -> &mut Self {
        self.buf.extend_from_slice(&tag);
        self.buf.extend_from_slice(&declared_len.to_be_bytes());
        self.buf.extend_from_slice(&flags.to_be_bytes());
        self
    }

    pub fn raw_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(bytes);
        self
    }

    /// Pad bytes following a payload of `len` bytes.
    pub fn pad(&mut self, len: u32) -> &mut Self {
        let n = pad_len(len) as usize;
        self.buf.resize(self.buf.len() + n, 0);
        self
    }

    pub fn finish(&mut self) -> Vec<u8> {
        core::mem::take(&mut self.buf)
    }
}
