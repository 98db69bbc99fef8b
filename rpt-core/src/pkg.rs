//! Framed packet layout shared by the client and peer channels.
//!
//! Header (12 bytes, little-endian):
//! - `len`: 4 bytes, body length
//! - `request_id`: 4 bytes, echoed on responses
//! - `tp`: 1 byte, protocol tag
//! - `flags`: 1 byte
//! - `checksum`: 2 bytes, CRC-32 of the first 10 header bytes, truncated

use crate::{crc32c, Packer, Result, RiptideError};
use bytes::Bytes;
use std::ops::{Deref, DerefMut};

pub const PKG_HEADER_SIZE: usize = 12;

/// A sealed packet: header plus TBF body, immutable and cheap to clone.
#[derive(Debug, Clone)]
pub struct Pkg {
    frame: Bytes,
}

impl Pkg {
    /// Build a packet from a raw body.
    #[must_use]
    pub fn new(request_id: u32, tp: u8, flags: u8, body: &[u8]) -> Self {
        let mut frame = Vec::with_capacity(PKG_HEADER_SIZE + body.len());
        frame.extend_from_slice(&[0u8; PKG_HEADER_SIZE]);
        frame.extend_from_slice(body);
        seal_header(&mut frame, request_id, tp, flags);
        Self {
            frame: Bytes::from(frame),
        }
    }

    /// Parse and verify a full frame.
    ///
    /// # Errors
    /// Returns an error if the frame is shorter than the header, the body
    /// length disagrees with the frame length, or the checksum is wrong.
    pub fn parse(frame: Bytes) -> Result<Self> {
        if frame.len() < PKG_HEADER_SIZE {
            return Err(RiptideError::BufferTooSmall {
                required: PKG_HEADER_SIZE,
                available: frame.len(),
            });
        }
        let body_len = u32::from_le_bytes([frame[0], frame[1], frame[2], frame[3]]) as usize;
        if frame.len() != PKG_HEADER_SIZE + body_len {
            return Err(RiptideError::Protocol(format!(
                "frame length {} does not match header body length {}",
                frame.len(),
                body_len
            )));
        }
        let stored = u16::from_le_bytes([frame[10], frame[11]]);
        let computed = header_checksum(&frame[..10]);
        if stored != computed {
            return Err(RiptideError::ChecksumMismatch {
                expected: computed,
                actual: stored,
            });
        }
        Ok(Self { frame })
    }

    #[inline]
    #[must_use]
    pub fn request_id(&self) -> u32 {
        u32::from_le_bytes([self.frame[4], self.frame[5], self.frame[6], self.frame[7]])
    }

    #[inline]
    #[must_use]
    pub fn tp(&self) -> u8 {
        self.frame[8]
    }

    #[inline]
    #[must_use]
    pub fn flags(&self) -> u8 {
        self.frame[9]
    }

    #[inline]
    #[must_use]
    pub fn body(&self) -> &[u8] {
        &self.frame[PKG_HEADER_SIZE..]
    }

    #[inline]
    #[must_use]
    pub fn frame(&self) -> &Bytes {
        &self.frame
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.frame.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frame.len() == PKG_HEADER_SIZE
    }
}

/// A TBF packer whose buffer reserves the packet header up front, so a
/// finished body can be sealed into a [`Pkg`] without copying.
///
/// A pool buffer starts as header + `MAP_OPEN`; a buffer still at that
/// length when the dispatcher runs is the canonical empty buffer.
#[derive(Debug)]
pub struct FramedPacker {
    inner: Packer,
}

impl FramedPacker {
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let mut inner = Packer::with_capacity(PKG_HEADER_SIZE + capacity);
        inner.extend_fragment(&[0u8; PKG_HEADER_SIZE]);
        Self { inner }
    }

    /// True when nothing beyond the framing prelude has been appended.
    #[inline]
    #[must_use]
    pub fn is_empty_body(&self) -> bool {
        self.inner.len() <= PKG_HEADER_SIZE + 1
    }

    #[inline]
    #[must_use]
    pub fn body(&self) -> &[u8] {
        &self.inner.as_slice()[PKG_HEADER_SIZE..]
    }

    /// Seal the reserved header in place and freeze the buffer.
    #[must_use]
    pub fn into_pkg(self, request_id: u32, tp: u8, flags: u8) -> Pkg {
        let mut frame = self.inner.into_inner();
        seal_header(&mut frame, request_id, tp, flags);
        Pkg {
            frame: Bytes::from(frame),
        }
    }
}

impl Deref for FramedPacker {
    type Target = Packer;

    #[inline]
    fn deref(&self) -> &Packer {
        &self.inner
    }
}

impl DerefMut for FramedPacker {
    #[inline]
    fn deref_mut(&mut self) -> &mut Packer {
        &mut self.inner
    }
}

fn seal_header(frame: &mut [u8], request_id: u32, tp: u8, flags: u8) {
    let body_len = (frame.len() - PKG_HEADER_SIZE) as u32;
    frame[0..4].copy_from_slice(&body_len.to_le_bytes());
    frame[4..8].copy_from_slice(&request_id.to_le_bytes());
    frame[8] = tp;
    frame[9] = flags;
    let checksum = header_checksum(&frame[..10]);
    frame[10..12].copy_from_slice(&checksum.to_le_bytes());
}

#[inline]
fn header_checksum(prefix: &[u8]) -> u16 {
    (crc32c(prefix) & 0xFFFF) as u16
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_pkg_roundtrip() {
        let pkg = Pkg::new(17, 0x10, 0x01, b"body-bytes");
        assert_eq!(pkg.request_id(), 17);
        assert_eq!(pkg.tp(), 0x10);
        assert_eq!(pkg.flags(), 0x01);
        assert_eq!(pkg.body(), b"body-bytes");

        let parsed = Pkg::parse(pkg.frame().clone()).unwrap();
        assert_eq!(parsed.body(), b"body-bytes");
    }

    #[test]
    fn test_parse_rejects_bad_checksum() {
        let pkg = Pkg::new(1, 0x10, 0, b"x");
        let mut frame = pkg.frame().to_vec();
        frame[10] ^= 0xFF;
        assert!(Pkg::parse(Bytes::from(frame)).is_err());
    }

    #[test]
    fn test_parse_rejects_length_mismatch() {
        let pkg = Pkg::new(1, 0x10, 0, b"abcdef");
        let mut frame = pkg.frame().to_vec();
        frame.truncate(frame.len() - 2);
        assert!(Pkg::parse(Bytes::from(frame)).is_err());
    }

    #[test]
    fn test_framed_packer_empty_detection() {
        let mut packer = FramedPacker::with_capacity(64);
        packer.add_map_open();
        assert!(packer.is_empty_body());

        packer.add_raw(b"cpu");
        assert!(!packer.is_empty_body());
    }

    #[test]
    fn test_framed_packer_seal() {
        let mut packer = FramedPacker::with_capacity(64);
        packer.add_map_open();
        packer.add_raw(b"cpu");
        let body_len = packer.body().len();

        let pkg = packer.into_pkg(9, 0x12, 0x02);
        assert_eq!(pkg.request_id(), 9);
        assert_eq!(pkg.tp(), 0x12);
        assert_eq!(pkg.body().len(), body_len);
        assert!(Pkg::parse(pkg.frame().clone()).is_ok());
    }
}
