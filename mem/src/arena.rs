//! Bump arena shared by the extra-RAM pools and the MMU descriptor store.

/// Page size (4KB).
pub const PAGE_SIZE: u32 = 4096;

/// Align a value up to the given power-of-two alignment.
///
/// Returns `None` on overflow.
#[inline]
pub const fn align_up(val: u32, align: u32) -> Option<u32> {
    match val.checked_add(align - 1) {
        Some(v) => Some(v & !(align - 1)),
        None => None,
    }
}

/// Align a value down to the given power-of-two alignment.
#[inline]
pub const fn align_down(val: u32, align: u32) -> u32 {
    val & !(align - 1)
}

/// A contiguous range of physical memory handed out front to back.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Arena {
    base: u32,
    size: u32,
    /// 64-bit so a fully used arena ending at 4GB has a representable cursor
    cursor: u64,
}

impl Arena {
    pub const fn new(base: u32, size: u32) -> Self {
        Self {
            base,
            size,
            cursor: base as u64,
        }
    }

    pub const fn empty() -> Self {
        Self::new(0, 0)
    }

    pub const fn base(&self) -> u32 {
        self.base
    }

    pub const fn size(&self) -> u32 {
        self.size
    }

    /// One past the last byte (64-bit so a range ending at 4GB fits).
    pub const fn end(&self) -> u64 {
        self.base as u64 + self.size as u64
    }

    pub const fn cursor(&self) -> u64 {
        self.cursor
    }

    /// Bytes between the cursor and the end.
    pub fn remaining(&self) -> u32 {
        (self.end() - self.cursor).min(u32::MAX as u64) as u32
    }

    pub fn contains(&self, addr: u32) -> bool {
        addr >= self.base && (addr as u64) < self.end()
    }

    /// Aligned address at which `size` bytes would be handed out, without
    /// moving the cursor.
    pub fn peek(&self, size: u32, align: u32) -> Option<u32> {
        if self.cursor > u32::MAX as u64 {
            return None;
        }
        let addr = align_up(self.cursor as u32, align)?;
        if addr as u64 + size as u64 > self.end() {
            return None;
        }
        Some(addr)
    }

    /// Move the cursor past an allocation made at `addr`.
    pub fn commit(&mut self, addr: u32, size: u32) {
        self.cursor = (addr as u64 + size as u64).min(self.end());
    }

    /// Hand out `size` bytes at `align`.
    pub fn bump(&mut self, size: u32, align: u32) -> Option<u32> {
        let addr = self.peek(size, align)?;
        self.commit(addr, size);
        Some(addr)
    }

    /// Skip `step` bytes (used to step over fragmentation).
    pub fn advance(&mut self, step: u32) {
        self.cursor = (self.cursor + step as u64).min(self.end());
    }

    /// Align the cursor; `false` if that runs off the end.
    pub fn align_cursor(&mut self, align: u32) -> bool {
        let aligned = (self.cursor + align as u64 - 1) & !(align as u64 - 1);
        if aligned <= self.end() {
            self.cursor = aligned;
            true
        } else {
            self.cursor = self.end();
            false
        }
    }

    /// Forget everything handed out.
    pub fn reset(&mut self) {
        self.cursor = self.base as u64;
    }
}
