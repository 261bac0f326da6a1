//! Chunk Reader
//!
//! Cursor operations over a statefile. Every payload read, taken or
//! skipped, ends on the next 4-byte chunk boundary.
//!
//! # Usage
//!
//! ```ignore
//! let mut reader = ChunkReader::new(stream);
//! let header = reader.read_chunk_header().ok_or(..)?;
//!
//! // Only the first 16 bytes are interesting, the rest is skipped
//! let mut head = Vec::new();
//! reader.read_chunk_payload(&header, 16, &mut head)?;
//! ```

use alloc::vec::Vec;
use bitflags::bitflags;

use crate::error::ChunkError;
use crate::stream::ChunkStream;
use crate::tag::Tag;

/// Size of tag + length + flags.
pub const HEADER_LEN: u32 = 12;

/// Block size used when streaming payloads through a sink.
const STREAM_BLOCK: usize = 4096;

bitflags! {
    /// Chunk flag word.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ChunkFlags: u32 {
        /// Payload is compressed; the first long holds the inflated length.
        const COMPRESSED = 1 << 0;
    }
}

/// Trailing bytes after a payload of `len` bytes.
///
/// Always 1..=4: a chunk already on a boundary still carries four pad bytes.
#[inline]
pub const fn pad_len(len: u32) -> u32 {
    4 - (len & 3)
}

/// A parsed chunk header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    pub tag: Tag,
    /// Payload length (declared total minus the header)
    pub length: u32,
    pub flags: ChunkFlags,
    /// Stream offset of the tag
    pub offset: u32,
}

impl ChunkHeader {
    pub fn is_compressed(&self) -> bool {
        self.flags.contains(ChunkFlags::COMPRESSED)
    }

    /// Header plus payload, as the chunk is laid out on disk before padding.
    pub fn total_len(&self) -> u32 {
        self.length.saturating_add(HEADER_LEN)
    }

    /// Offset of the payload's first byte.
    pub fn payload_offset(&self) -> u32 {
        self.offset.saturating_add(HEADER_LEN)
    }
}

/// Sequential chunk reader.
pub struct ChunkReader<S: ChunkStream> {
    stream: S,
}

impl<S: ChunkStream> ChunkReader<S> {
    pub fn new(stream: S) -> Self {
        Self { stream }
    }

    pub fn into_inner(self) -> S {
        self.stream
    }

    pub fn stream_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    /// Current stream offset
    pub fn position(&self) -> u32 {
        self.stream.position()
    }

    /// Return to the start of the statefile.
    pub fn rewind(&mut self) -> Result<(), ChunkError> {
        self.seek(0)
    }

    pub fn seek(&mut self, position: u32) -> Result<(), ChunkError> {
        self.stream.seek(position)
    }

    /// Read the next chunk header.
    ///
    /// Returns `None` at end of stream (tag or length cut short). A header
    /// without its flag word, or with a declared length below the header
    /// size, is reported as a zero-length chunk without flags.
    pub fn read_chunk_header(&mut self) -> Option<ChunkHeader> {
        let offset = self.stream.position();

        let mut tag = [0u8; 4];
        if self.stream.read_full(&mut tag) != 4 {
            return None;
        }
        let mut word = [0u8; 4];
        if self.stream.read_full(&mut word) != 4 {
            return None;
        }
        let declared = u32::from_be_bytes(word);

        let mut header = ChunkHeader {
            tag: Tag(tag),
            length: 0,
            flags: ChunkFlags::empty(),
            offset,
        };

        if self.stream.read_full(&mut word) != 4 {
            return Some(header);
        }
        if declared < HEADER_LEN {
            return Some(header);
        }
        header.length = declared - HEADER_LEN;
        header.flags = ChunkFlags::from_bits_retain(u32::from_be_bytes(word));

        log::trace!(target: "chunk", "{} len={} flags={:#x}", header.tag, header.length, header.flags.bits());
        Some(header)
    }

    /// Read up to `max_bytes` of the payload into `buf`, then skip the rest
    /// of the chunk.
    ///
    /// `buf` is replaced with what was read. The stream ends on the next chunk
    /// boundary even when the read comes up short.
    pub fn read_chunk_payload(
        &mut self,
        header: &ChunkHeader,
        max_bytes: u32,
        buf: &mut Vec<u8>,
    ) -> Result<u32, ChunkError> {
        let take = header.length.min(max_bytes);
        buf.clear();
        // Grow with what actually arrives; the declared length may be garbage
        let mut got = 0u32;
        while got < take {
            let want = ((take - got) as usize).min(STREAM_BLOCK);
            let at = buf.len();
            buf.resize(at + want, 0);
            let n = self.stream.read_full(&mut buf[at..]);
            buf.truncate(at + n);
            got += n as u32;
            if n < want {
                break;
            }
        }

        self.finish_chunk(header)?;
        if got != take {
            return Err(ChunkError::ShortRead { expected: take, got });
        }
        Ok(got)
    }

    /// Stream the whole payload through `sink` in blocks, then skip the pad.
    ///
    /// The sink receives the payload-relative offset of each block.
    pub fn read_payload_into<F>(&mut self, header: &ChunkHeader, mut sink: F) -> Result<u32, ChunkError>
    where
        F: FnMut(u32, &[u8]),
    {
        let mut block = [0u8; STREAM_BLOCK];
        let mut done = 0u32;
        while done < header.length {
            let want = ((header.length - done) as usize).min(STREAM_BLOCK);
            let n = self.stream.read_full(&mut block[..want]);
            if n == 0 {
                break;
            }
            sink(done, &block[..n]);
            done += n as u32;
        }

        self.finish_chunk(header)?;
        if done != header.length {
            return Err(ChunkError::ShortRead {
                expected: header.length,
                got: done,
            });
        }
        Ok(done)
    }

    /// Skip a payload of `len` bytes plus its pad.
    pub fn skip_chunk(&mut self, len: u32) -> Result<(), ChunkError> {
        self.stream.skip(len.saturating_add(pad_len(len)))
    }

    /// Raw read from the current position, no chunk framing applied.
    pub fn read_raw(&mut self, buf: &mut [u8]) -> usize {
        self.stream.read_full(buf)
    }

    /// Position the stream after the chunk's pad, whatever was consumed.
    fn finish_chunk(&mut self, header: &ChunkHeader) -> Result<(), ChunkError> {
        let end = header
            .payload_offset()
            .saturating_add(header.length)
            .saturating_add(pad_len(header.length));
        self.stream.seek(end)
    }
}
