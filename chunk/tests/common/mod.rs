//! Shared statefile images for the reader tests.

use revive_chunk::StatefileWriter;

/// Deterministic payload of `len` bytes.
pub fn payload(len: u32) -> Vec<u8> {
    (0..len).map(|i| (i * 7 + 3) as u8).collect()
}

/// `ASF `, `lead` odd-sized filler chunks, a `CHIP` chunk of `len` bytes,
/// then `END `.
pub fn image_with_chunks(lead: usize, len: u32) -> Vec<u8> {
    let mut w = StatefileWriter::new();
    w.start();
    for i in 0..lead {
        w.chunk(*b"XTRA", &payload(i as u32 * 3 + 1));
    }
    w.chunk(*b"CHIP", &payload(len));
    w.end();
    w.finish()
}
