//! Physical memory access.
//!
//! The MMU builder writes descriptors and the takeover writes restored RAM
//! through this trait, so both can run against a simulated address space.

/// Byte-addressed big-endian physical memory.
pub trait PhysicalMemory {
    fn read_bytes(&self, addr: u32, buf: &mut [u8]);

    fn write_bytes(&mut self, addr: u32, data: &[u8]);

    fn read_u32(&self, addr: u32) -> u32 {
        let mut b = [0u8; 4];
        self.read_bytes(addr, &mut b);
        u32::from_be_bytes(b)
    }

    fn write_u32(&mut self, addr: u32, value: u32) {
        self.write_bytes(addr, &value.to_be_bytes());
    }

    /// Copy `len` bytes from `src` to `dst`. Ranges must not overlap.
    fn copy(&mut self, dst: u32, src: u32, len: u32) {
        let mut block = [0u8; 256];
        let mut done = 0u32;
        while done < len {
            let n = (len - done).min(block.len() as u32) as usize;
            self.read_bytes(src.wrapping_add(done), &mut block[..n]);
            self.write_bytes(dst.wrapping_add(done), &block[..n]);
            done += n as u32;
        }
    }

    fn fill(&mut self, addr: u32, len: u32, byte: u8) {
        let block = [byte; 256];
        let mut done = 0u32;
        while done < len {
            let n = (len - done).min(block.len() as u32) as usize;
            self.write_bytes(addr.wrapping_add(done), &block[..n]);
            done += n as u32;
        }
    }
}

/// The machine's own address space, accessed through raw pointers.
pub struct DirectMemory {
    _private: (),
}

impl DirectMemory {
    /// # Safety
    ///
    /// Every address later passed in must be mapped, and the caller must own
    /// the memory it writes (a claimed allocation, or anything once the host
    /// has been shut down).
    pub unsafe fn new() -> Self {
        Self { _private: () }
    }
}

impl PhysicalMemory for DirectMemory {
    fn read_bytes(&self, addr: u32, buf: &mut [u8]) {
        let src = addr as usize as *const u8;
        for (i, b) in buf.iter_mut().enumerate() {
            // SAFETY: guaranteed by the contract of `DirectMemory::new`
            *b = unsafe { core::ptr::read_volatile(src.add(i)) };
        }
    }

    fn write_bytes(&mut self, addr: u32, data: &[u8]) {
        let dst = addr as usize as *mut u8;
        for (i, &b) in data.iter().enumerate() {
            // SAFETY: guaranteed by the contract of `DirectMemory::new`
            unsafe { core::ptr::write_volatile(dst.add(i), b) };
        }
    }

    fn read_u32(&self, addr: u32) -> u32 {
        // SAFETY: guaranteed by the contract of `DirectMemory::new`; the
        // target is big-endian, long accesses are native.
        unsafe { core::ptr::read_volatile(addr as usize as *const u32) }
    }

    fn write_u32(&mut self, addr: u32, value: u32) {
        // SAFETY: as above
        unsafe { core::ptr::write_volatile(addr as usize as *mut u32, value) }
    }

    fn copy(&mut self, dst: u32, src: u32, len: u32) {
        // SAFETY: guaranteed by the contract of `DirectMemory::new`; the
        // caller promises the ranges do not overlap.
        unsafe {
            core::ptr::copy_nonoverlapping(
                src as usize as *const u8,
                dst as usize as *mut u8,
                len as usize,
            )
        }
    }
}
