//! Chunk reader error types

use core::fmt;

/// Errors raised while moving through a chunk stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkError {
    /// Fewer bytes were available than the chunk declared
    ShortRead { expected: u32, got: u32 },
    /// The stream refused to reposition
    SeekFailed { position: u32 },
}

impl ChunkError {
    /// Get a human-readable description of the error
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ShortRead { .. } => "Short read from statefile",
            Self::SeekFailed { .. } => "Seek failed in statefile",
        }
    }
}

impl fmt::Display for ChunkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ShortRead { expected, got } => {
                write!(f, "{} ({} of {} bytes)", self.as_str(), got, expected)
            }
            Self::SeekFailed { position } => write!(f, "{} (offset {})", self.as_str(), position),
        }
    }
}
