//! Byte streams the chunk reader walks over.
//!
//! The real tool reads the statefile through the host's buffered file
//! handle; tests and tools read from memory. Both only need sequential reads
//! plus absolute repositioning (Pass 2 rewinds, bank staging jumps back to a
//! recorded chunk offset).

use crate::error::ChunkError;

/// Sequential, seekable byte source.
pub trait ChunkStream {
    /// Read up to `buf.len()` bytes. Returns the number of bytes read, 0 at
    /// end of stream.
    fn read(&mut self, buf: &mut [u8]) -> usize;

    /// Move to an absolute offset. Positions past the end are allowed and
    /// simply read nothing.
    fn seek(&mut self, position: u32) -> Result<(), ChunkError>;

    /// Current absolute offset.
    fn position(&self) -> u32;

    /// Move forward by `count` bytes.
    fn skip(&mut self, count: u32) -> Result<(), ChunkError> {
        let target = self.position().saturating_add(count);
        self.seek(target)
    }

    /// Fill `buf` as far as the stream allows.
    fn read_full(&mut self, buf: &mut [u8]) -> usize {
        let mut done = 0;
        while done < buf.len() {
            let n = self.read(&mut buf[done..]);
            if n == 0 {
                break;
            }
            done += n;
        }
        done
    }
}

impl<S: ChunkStream + ?Sized> ChunkStream for &mut S {
    fn read(&mut self, buf: &mut [u8]) -> usize {
        (**self).read(buf)
    }

    fn seek(&mut self, position: u32) -> Result<(), ChunkError> {
        (**self).seek(position)
    }

    fn position(&self) -> u32 {
        (**self).position()
    }
}

/// In-memory statefile.
#[derive(Debug, Clone)]
pub struct SliceStream<'a> {
    data: &'a [u8],
    position: u32,
}

impl<'a> SliceStream<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    /// Total length of the underlying data.
    pub fn len(&self) -> u32 {
        self.data.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl ChunkStream for SliceStream<'_> {
    fn read(&mut self, buf: &mut [u8]) -> usize {
        let start = self.position as usize;
        if start >= self.data.len() {
            return 0;
        }
        let n = buf.len().min(self.data.len() - start);
        buf[..n].copy_from_slice(&self.data[start..start + n]);
        self.position += n as u32;
        n
    }

    fn seek(&mut self, position: u32) -> Result<(), ChunkError> {
        self.position = position;
        Ok(())
    }

    fn position(&self) -> u32 {
        self.position
    }
}
