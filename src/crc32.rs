//! The CRC-32 used by PNG chunks (ISO 3309 / ITU-T V.42 polynomial).

const CRC_TABLE: [u32; 256] = make_crc_table();

const fn make_crc_table() -> [u32; 256] {
  let mut out = [0; 256];
  let mut n = 0;
  while n < 256 {
    let mut c = n as u32;
    let mut k = 0;
    while k < 8 {
      if (c & 1) != 0 {
        c = 0xEDB8_8320_u32 ^ (c >> 1);
      } else {
        c >>= 1;
      }
      //
      k += 1;
    }
    out[n] = c;
    //
    n += 1;
  }
  out
}

#[inline]
fn update_crc(mut crc: u32, bytes: &[u8]) -> u32 {
  for &byte in bytes {
    let i = (crc ^ u32::from(byte)) as u8 as usize;
    crc = CRC_TABLE[i] ^ (crc >> 8);
  }
  crc
}

/// A running chunk CRC.
///
/// The push parser sees chunk data in arbitrary pieces, so the CRC is
/// accumulated piece by piece and only finished when the stored value arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Crc32(u32);
impl Crc32 {
  #[inline]
  #[must_use]
  pub const fn new() -> Self {
    Self(u32::MAX)
  }
  #[inline]
  pub fn update(&mut self, bytes: &[u8]) {
    self.0 = update_crc(self.0, bytes);
  }
  #[inline]
  #[must_use]
  pub const fn finish(self) -> u32 {
    self.0 ^ u32::MAX
  }
}

/// The CRC of a chunk's type and data together.
#[inline]
#[must_use]
pub(crate) fn png_crc(chunk_type: [u8; 4], data: &[u8]) -> u32 {
  let mut crc = Crc32::new();
  crc.update(&chunk_type);
  crc.update(data);
  crc.finish()
}

#[test]
fn test_iend_crc() {
  // every PNG ends with this exact chunk
  assert_eq!(png_crc(*b"IEND", &[]), 0xAE42_6082);
}

#[test]
fn test_crc_in_pieces() {
  let data = b"IHDR\x00\x00\x00\x01\x00\x00\x00\x01\x08\x00\x00\x00\x00";
  let mut crc = Crc32::new();
  for piece in data.chunks(3) {
    crc.update(piece);
  }
  assert_eq!(crc.finish(), png_crc(*b"IHDR", &data[4..]));
}
