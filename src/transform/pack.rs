use crate::row::{get_packed, put_packed, RowDescriptor, RowFormat};

use super::InitStep;

/// One pixel per byte for bit depths below 8, values unchanged.
#[derive(Debug, Clone, Default)]
pub(crate) struct Pack;
impl Pack {
  pub fn init(&mut self, tc: &mut RowDescriptor) -> InitStep {
    if tc.bit_depth >= 8 {
      return InitStep::Inert;
    }
    // an index keeps its meaning; a gray value doesn't
    if !tc.format.contains(RowFormat::COLORMAP) {
      tc.format.insert(RowFormat::RANGE);
    }
    tc.bit_depth = 8;
    InitStep::Keep
  }

  pub fn run(&self, row: &mut [u8], tc: &mut RowDescriptor) {
    let depth = tc.bit_depth;
    let lsb = tc.format.contains(RowFormat::SWAPPED);
    for x in (0..tc.width as usize).rev() {
      row[x] = get_packed(row, x, depth, lsb) as u8;
    }
    if !tc.format.contains(RowFormat::COLORMAP) {
      tc.format.insert(RowFormat::RANGE);
    }
    tc.bit_depth = 8;
  }

  /// Packs one-per-byte pixels back into `input`'s bit depth.
  pub fn run_backwards(&self, row: &mut [u8], tc: &RowDescriptor, input: &RowDescriptor) {
    let depth = input.bit_depth;
    let lsb = input.format.contains(RowFormat::SWAPPED);
    let width = tc.width as usize;
    for x in 0..width {
      let v = u32::from(row[x]);
      if x % usize::from(8 / depth) == 0 {
        row[x * usize::from(depth) / 8] = 0;
      }
      put_packed(row, x, depth, lsb, v);
    }
  }
}

/// Reverses the order of the pixels within each byte.
#[derive(Debug, Clone, Default)]
pub(crate) struct PackSwap;
impl PackSwap {
  pub fn init(&mut self, tc: &mut RowDescriptor) -> InitStep {
    if tc.bit_depth >= 8 {
      return InitStep::Inert;
    }
    tc.format.toggle(RowFormat::SWAPPED);
    InitStep::Keep
  }

  pub fn run(&self, row: &mut [u8], tc: &mut RowDescriptor) {
    swap_pixels(&mut row[..tc.row_bytes()], tc.bit_depth);
    tc.format.toggle(RowFormat::SWAPPED);
  }

  #[inline]
  pub fn run_backwards(&self, row: &mut [u8], tc: &RowDescriptor) {
    swap_pixels(&mut row[..tc.row_bytes()], tc.bit_depth);
  }
}

fn swap_pixels(bytes: &mut [u8], depth: u8) {
  for b in bytes {
    let mut s = *b;
    if depth == 1 {
      s = ((s >> 1) & 0x55) | ((s & 0x55) << 1);
    }
    if depth <= 2 {
      s = ((s >> 2) & 0x33) | ((s & 0x33) << 2);
    }
    *b = (s >> 4) | (s << 4);
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::ihdr::{PngColorType, IHDR};

  fn gray(depth: u8, width: u32) -> RowDescriptor {
    let ihdr = IHDR { width, height: 1, bit_depth: depth, color_type: PngColorType::Y, is_interlaced: false };
    RowDescriptor::for_image(&ihdr, None, 0)
  }

  #[test]
  fn test_unpack_and_pack() {
    let mut tc = gray(2, 5);
    let input = tc;
    let mut row = [0b00_01_10_11, 0b01_000000, 0, 0, 0];
    Pack.run(&mut row, &mut tc);
    assert_eq!(row, [0, 1, 2, 3, 1]);
    assert_eq!(tc.bit_depth, 8);
    Pack.run_backwards(&mut row, &tc, &input);
    assert_eq!(&row[..2], &[0b00_01_10_11, 0b01_000000]);
  }

  #[test]
  fn test_swap_pixels() {
    let mut b = [0b1000_0001, 0b1101_0010];
    swap_pixels(&mut b[..1], 1);
    assert_eq!(b[0], 0b1000_0001);
    swap_pixels(&mut b[1..], 2);
    assert_eq!(b[1], 0b1000_0111);
    let mut c = [0x12];
    swap_pixels(&mut c, 4);
    assert_eq!(c, [0x21]);
  }
}
