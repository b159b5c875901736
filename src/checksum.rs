//! Byte-wise running-sum checksum primitive.
//!
//! Both the PROFIBUS telegram FCS and the host packet FCS are built on the same 8-bit
//! wraparound sum.

/// Add all bytes of `buf` to the running sum `sum`, wrapping on overflow.
#[inline]
pub fn add_bytes(sum: u8, buf: &[u8]) -> u8 {
    buf.iter().copied().fold(sum, u8::wrapping_add)
}
