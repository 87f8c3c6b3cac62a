//! Chunk type tags and the fixed parts of the chunk layout.

use core::fmt::{Debug, Display};

/// The 8 bytes at the start of every PNG stream.
pub const PNG_SIGNATURE: [u8; 8] = [137, 80, 78, 71, 13, 10, 26, 10];

/// The largest chunk length the format allows (2^31 - 1).
pub const PNG_MAX_CHUNK_LEN: u32 = 0x7FFF_FFFF;

/// A four letter chunk type.
///
/// Each letter carries a property in its case bit (bit 5, lowercase == set):
/// * first letter: ancillary (safe to ignore) when set, critical when clear.
/// * second letter: private when set.
/// * third letter: reserved, must be clear.
/// * fourth letter: safe to copy when set.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct ChunkType(pub [u8; 4]);
#[allow(nonstandard_style)]
impl ChunkType {
  pub const IHDR: Self = Self(*b"IHDR");
  pub const PLTE: Self = Self(*b"PLTE");
  pub const IDAT: Self = Self(*b"IDAT");
  pub const IEND: Self = Self(*b"IEND");
  pub const tRNS: Self = Self(*b"tRNS");
  pub const bKGD: Self = Self(*b"bKGD");
  pub const sRGB: Self = Self(*b"sRGB");
  pub const gAMA: Self = Self(*b"gAMA");
  pub const sBIT: Self = Self(*b"sBIT");
  pub const hIST: Self = Self(*b"hIST");
  pub const cHRM: Self = Self(*b"cHRM");
  pub const iCCP: Self = Self(*b"iCCP");
}
impl ChunkType {
  const PROPERTY_BIT: u8 = 0x20;

  /// If a decoder may ignore this chunk.
  #[inline]
  #[must_use]
  pub const fn is_ancillary(self) -> bool {
    (self.0[0] & Self::PROPERTY_BIT) != 0
  }
  /// If a decoder must understand this chunk to display the image.
  #[inline]
  #[must_use]
  pub const fn is_critical(self) -> bool {
    !self.is_ancillary()
  }
  /// If this chunk type is privately defined.
  #[inline]
  #[must_use]
  pub const fn is_private(self) -> bool {
    (self.0[1] & Self::PROPERTY_BIT) != 0
  }
  /// If the reserved bit is (incorrectly) set.
  #[inline]
  #[must_use]
  pub const fn is_reserved_set(self) -> bool {
    (self.0[2] & Self::PROPERTY_BIT) != 0
  }
  /// If an editor that doesn't understand this chunk may still copy it.
  #[inline]
  #[must_use]
  pub const fn is_safe_to_copy(self) -> bool {
    (self.0[3] & Self::PROPERTY_BIT) != 0
  }
  /// All four bytes are ASCII letters.
  #[inline]
  #[must_use]
  pub const fn is_valid(self) -> bool {
    let [a, b, c, d] = self.0;
    a.is_ascii_alphabetic()
      && b.is_ascii_alphabetic()
      && c.is_ascii_alphabetic()
      && d.is_ascii_alphabetic()
  }
}
impl Debug for ChunkType {
  fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
    crate::error::write_chunk_name(f, self.0)
  }
}
impl Display for ChunkType {
  #[inline]
  fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
    Debug::fmt(self, f)
  }
}

/// A chunk's length and type, the first 8 bytes of every chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChunkHeader {
  /// Declared data length, excluding the type and the CRC.
  pub length: u32,
  /// The chunk type.
  pub chunk_type: ChunkType,
}
impl From<[u8; 8]> for ChunkHeader {
  #[inline]
  fn from(b: [u8; 8]) -> Self {
    let [l0, l1, l2, l3, t0, t1, t2, t3] = b;
    Self { length: u32::from_be_bytes([l0, l1, l2, l3]), chunk_type: ChunkType([t0, t1, t2, t3]) }
  }
}
impl ChunkHeader {
  #[inline]
  #[must_use]
  pub fn to_bytes(self) -> [u8; 8] {
    let [l0, l1, l2, l3] = self.length.to_be_bytes();
    let [t0, t1, t2, t3] = self.chunk_type.0;
    [l0, l1, l2, l3, t0, t1, t2, t3]
  }
}

/// Appends a complete chunk (length, type, data, CRC) to `out`.
#[inline]
pub fn write_chunk(out: &mut alloc::vec::Vec<u8>, chunk_type: ChunkType, data: &[u8]) {
  let header = ChunkHeader { length: data.len() as u32, chunk_type };
  out.extend_from_slice(&header.to_bytes());
  out.extend_from_slice(data);
  out.extend_from_slice(&crate::crc32::png_crc(chunk_type.0, data).to_be_bytes());
}

#[test]
fn test_chunk_property_bits() {
  assert!(ChunkType::IHDR.is_critical());
  assert!(!ChunkType::IHDR.is_safe_to_copy());
  assert!(ChunkType::tRNS.is_ancillary());
  assert!(!ChunkType::tRNS.is_private());
  assert!(ChunkType::bKGD.is_ancillary());
  let private_copyable = ChunkType(*b"prVt");
  assert!(private_copyable.is_ancillary());
  assert!(private_copyable.is_private());
  assert!(!private_copyable.is_reserved_set());
  assert!(private_copyable.is_safe_to_copy());
  assert!(ChunkType(*b"abcd").is_reserved_set());
  assert!(!ChunkType(*b"ab1d").is_valid());
}

#[test]
fn test_header_bytes() {
  let h = ChunkHeader::from([0, 0, 0, 13, b'I', b'H', b'D', b'R']);
  assert_eq!(h.length, 13);
  assert_eq!(h.chunk_type, ChunkType::IHDR);
  assert_eq!(h.to_bytes(), [0, 0, 0, 13, b'I', b'H', b'D', b'R']);
}
