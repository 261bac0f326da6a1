//! Statefile Chunk Protocol
//!
//! A statefile is a flat sequence of tagged chunks:
//!
//! ```text
//! ┌──────────┬──────────────┬──────────────┬─────────────────────┬───────┐
//! │ tag (4)  │ total len BE │ flags BE     │ payload (len - 12)  │ pad   │
//! └──────────┴──────────────┴──────────────┴─────────────────────┴───────┘
//!                                                       pad = 4 - (payload & 3)
//! ```
//!
//! The stream opens with `ASF ` and closes with `END `. Flag bit 0 marks a
//! compressed payload whose first four bytes hold the inflated length.
//!
//! # Usage
//!
//! ```ignore
//! use revive_chunk::{ChunkReader, SliceStream, classify, ChunkKind};
//!
//! let mut reader = ChunkReader::new(SliceStream::new(&bytes));
//! while let Some(header) = reader.read_chunk_header() {
//!     match classify(header.tag) {
//!         ChunkKind::End => break,
//!         ChunkKind::Unknown => reader.skip_chunk(header.length)?,
//!         _ => { /* read or skip */ }
//!     }
//! }
//! ```

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod bytes;
pub mod error;
pub mod reader;
pub mod stream;
pub mod tag;
pub mod writer;

pub use bytes::{be_u16, be_u32};
pub use error::ChunkError;
pub use reader::{pad_len, ChunkFlags, ChunkHeader, ChunkReader, HEADER_LEN};
pub use stream::{ChunkStream, SliceStream};
pub use tag::{classify, ChunkKind, RamChunk, RegisterChunk, Tag, DENY_LIST};
pub use writer::StatefileWriter;
