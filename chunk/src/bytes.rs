//! Big-endian field access for chunk payloads.
//!
//! Out-of-range reads yield zero rather than panicking; truncated payloads
//! are caught by the length checks of the callers.

/// Read a big-endian u32 at `offset`.
#[inline]
pub fn be_u32(buf: &[u8], offset: usize) -> u32 {
    match buf.get(offset..offset + 4) {
        Some(b) => u32::from_be_bytes([b[0], b[1], b[2], b[3]]),
        None => 0,
    }
}

/// Read a big-endian u16 at `offset`.
#[inline]
pub fn be_u16(buf: &[u8], offset: usize) -> u16 {
    match buf.get(offset..offset + 2) {
        Some(b) => u16::from_be_bytes([b[0], b[1]]),
        None => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_be_fields() {
        let buf = [0x00, 0x01, 0x02, 0x03, 0x04];
        assert_eq!(be_u32(&buf, 0), 0x0001_0203);
        assert_eq!(be_u32(&buf, 1), 0x0102_0304);
        assert_eq!(be_u16(&buf, 3), 0x0304);
    }

    #[test]
    fn test_short_buffer_reads_zero() {
        let buf = [0xff, 0xff];
        assert_eq!(be_u32(&buf, 0), 0);
        assert_eq!(be_u16(&buf, 1), 0);
    }
}
